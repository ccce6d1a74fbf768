use std::path::PathBuf;

use thiserror::Error;

use snoopy_common::{CONFIG_LIMIT, HEADER_LEN};

/// A raw record that could not be turned into a [`RawRecord`](crate::decode::RawRecord).
///
/// Always recoverable: the worker logs it and drops the record.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
    #[error("record too short: {size} bytes, header needs {header}", header = HEADER_LEN)]
    Truncated { size: usize },

    #[error("unknown record type: {raw}")]
    UnknownKind { raw: u32 },
}

/// Startup configuration rejected before anything is attached.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max-args and max-envs should be at least 0 (got {name}={value})")]
    Negative { name: &'static str, value: i64 },

    #[error("max-args and max-envs should be at most {limit} (got {name}={value})", limit = CONFIG_LIMIT)]
    TooLarge { name: &'static str, value: i64 },

    #[error("queue capacity must be at least 1")]
    ZeroQueue,
}

/// Failures while loading or attaching the instrumentation program.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("loading bpf object {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: aya::EbpfError,
    },

    #[error("program {0} not found in bpf object")]
    MissingProgram(&'static str),

    #[error("map {0} not found in bpf object")]
    MissingMap(&'static str),

    #[error("attaching {name}: {source}")]
    Attach {
        name: &'static str,
        #[source]
        source: aya::programs::ProgramError,
    },

    #[error(transparent)]
    Map(#[from] aya::maps::MapError),

    #[error(transparent)]
    PerfBuffer(#[from] aya::maps::perf::PerfBufferError),

    #[error("listing online cpus ({context}): {source}")]
    OnlineCpus {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// A worker or the consumer ended abnormally.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("engine task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("writing events: {0}")]
    Sink(#[from] std::io::Error),
}
