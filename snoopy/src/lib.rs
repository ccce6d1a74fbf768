//! Reassembles exec fragments emitted by the snoopy eBPF program into
//! complete execution events.
//!
//! # Modules
//! - [`decode`]: raw record wire format
//! - [`table`]: per-source correlation of fragments by `tid`
//! - [`mux`]: one worker per source stream
//! - [`output`]: bounded queue consumer
//! - [`engine`]: ties the above together under one cancellation token
//! - [`probe`]: loads the eBPF object and feeds its perf buffers into sources

pub mod cli;
pub mod clock;
pub mod config;
pub mod decode;
pub mod engine;
pub mod error;
pub mod event;
pub mod format;
pub mod logging;
pub mod mux;
pub mod output;
pub mod probe;
pub mod stats;
pub mod table;

pub use clock::BootClock;
pub use config::{ShutdownPolicy, SnoopyConfig};
pub use decode::{RawRecord, RecordKind, decode};
pub use engine::{Engine, EngineReport, RunningEngine};
pub use error::{ConfigError, DecodeError, EngineError, ProbeError};
pub use event::Event;
pub use format::{FormatFn, OutputFormat};
pub use mux::{SourceFeed, SourceStream};
pub use table::{Applied, CorrelationTable, PartialEvent};
