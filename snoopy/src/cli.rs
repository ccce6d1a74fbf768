use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::config::{
    DEFAULT_MAX_ARGS, DEFAULT_MAX_ENVS, DEFAULT_QUEUE_CAPACITY, ShutdownPolicy, SnoopyConfig,
};
use crate::error::ConfigError;
use crate::format::OutputFormat;

/// Catching program executions with eBPF
#[derive(Debug, Parser)]
#[command(name = "snoopy", version, about)]
pub struct Cli {
    /// max # of execution arguments to record, 128 at most
    #[arg(long, default_value_t = DEFAULT_MAX_ARGS, allow_negative_numbers = true)]
    pub max_args: i64,

    /// max # of environment variables for the execution to record, 128 at most
    #[arg(long, default_value_t = DEFAULT_MAX_ENVS, allow_negative_numbers = true)]
    pub max_envs: i64,

    /// don't record environment variables (shortcut for --max-envs 0)
    #[arg(long)]
    pub no_envs: bool,

    /// completed events buffered between the sources and the printer
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,

    /// on shutdown, keep printing queued events for up to this long instead
    /// of dropping them
    #[arg(long, value_name = "MS")]
    pub flush_timeout_ms: Option<u64>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// compiled eBPF object to load
    #[arg(long, default_value = "snoopy.bpf.o")]
    pub bpf_object: PathBuf,

    /// log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Cli {
    pub fn config(&self) -> Result<SnoopyConfig, ConfigError> {
        let max_envs = if self.no_envs { 0 } else { self.max_envs };
        let shutdown = match self.flush_timeout_ms {
            Some(ms) => ShutdownPolicy::Flush {
                timeout: Duration::from_millis(ms),
            },
            None => ShutdownPolicy::Drop,
        };
        Ok(SnoopyConfig::new(self.max_args, max_envs)?
            .with_queue_capacity(self.queue_capacity)?
            .with_shutdown(shutdown)
            .with_format(self.format))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("snoopy").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn defaults() {
        let cli = parse(&[]);
        assert_eq!(cli.config().unwrap(), SnoopyConfig::default());
        assert_eq!(cli.bpf_object, PathBuf::from("snoopy.bpf.o"));
    }

    #[test]
    fn no_envs_overrides_max_envs() {
        let config = parse(&["--max-envs", "64", "--no-envs"]).config().unwrap();
        assert_eq!(config.max_envs, 0);
        assert!(!config.print_env());
    }

    #[test]
    fn negative_and_oversized_values_fail() {
        assert!(matches!(
            parse(&["--max-args", "-1"]).config(),
            Err(ConfigError::Negative { name: "max-args", .. })
        ));
        assert!(matches!(
            parse(&["--max-envs", "200"]).config(),
            Err(ConfigError::TooLarge { name: "max-envs", .. })
        ));
    }

    #[test]
    fn flush_timeout_selects_flush_policy() {
        let config = parse(&["--flush-timeout-ms", "250", "--format", "json"])
            .config()
            .unwrap();
        assert_eq!(
            config.shutdown,
            ShutdownPolicy::Flush {
                timeout: Duration::from_millis(250)
            }
        );
        assert_eq!(config.format, OutputFormat::Json);
    }

    #[test]
    fn zero_queue_capacity_fails() {
        assert_eq!(
            parse(&["--queue-capacity", "0"]).config(),
            Err(ConfigError::ZeroQueue)
        );
    }

    #[test]
    fn non_numeric_is_a_parse_error() {
        assert!(Cli::try_parse_from(["snoopy", "--max-args", "many"]).is_err());
    }
}
