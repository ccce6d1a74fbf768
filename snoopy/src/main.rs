use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};

use snoopy::cli::Cli;
use snoopy::logging::init_tracing;
use snoopy::probe::{ExecProbe, raise_memlock_rlimit};
use snoopy::{BootClock, Engine};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level)?;

    // Bounds are checked before anything touches the kernel.
    let config = cli.config().context("invalid configuration")?;

    raise_memlock_rlimit();
    let mut probe = ExecProbe::load(&cli.bpf_object, &config)
        .with_context(|| format!("loading {}", cli.bpf_object.display()))?;

    let engine = Engine::new(config).with_clock(BootClock::detect());
    let sources = probe
        .open_sources(&engine.cancel_token())
        .context("opening perf buffers")?;
    let running = engine.start(sources, tokio::io::stdout());

    info!("Waiting for Ctrl-C...");
    tokio::select! {
        signal = signal::ctrl_c() => {
            signal?;
            info!("Exiting...");
        }
        _ = running.stopped() => warn!("engine stopped, exiting"),
    }

    let report = running.shutdown().await?;
    report.log_summary();
    drop(probe);
    Ok(())
}
