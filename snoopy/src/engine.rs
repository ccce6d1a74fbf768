//! Wires sources, the bounded output queue and the consumer together.
//!
//! # Usage
//! ```ignore
//! let engine = Engine::new(config).with_clock(BootClock::detect());
//! let sources = probe.open_sources(&engine.cancel_token())?;
//! let running = engine.start(sources, tokio::io::stdout());
//! tokio::select! {
//!     _ = tokio::signal::ctrl_c() => {}
//!     _ = running.stopped() => {}
//! }
//! let report = running.shutdown().await?;
//! ```

use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::clock::BootClock;
use crate::config::SnoopyConfig;
use crate::error::EngineError;
use crate::format::FormatFn;
use crate::mux::{SourceHandle, SourceReport, SourceStream, spawn_sources};
use crate::output::{Consumer, ConsumerSummary};
use crate::stats::SourceSnapshot;

pub struct Engine {
    config: SnoopyConfig,
    formatter: FormatFn,
    clock: BootClock,
    cancel: CancellationToken,
}

impl Engine {
    pub fn new(config: SnoopyConfig) -> Self {
        Self {
            formatter: config.format.formatter(),
            config,
            clock: BootClock::identity(),
            cancel: CancellationToken::new(),
        }
    }

    /// Replace the formatter picked from `config.format`.
    pub fn with_formatter(mut self, formatter: FormatFn) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn with_clock(mut self, clock: BootClock) -> Self {
        self.clock = clock;
        self
    }

    /// The shutdown broadcast observed by every worker and the consumer.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &SnoopyConfig {
        &self.config
    }

    /// Spawn one worker per source plus the consumer writing to `sink`.
    pub fn start<W>(self, sources: Vec<SourceStream>, sink: W) -> RunningEngine<W>
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (out_tx, out_rx) = mpsc::channel(self.config.queue_capacity);
        let workers = spawn_sources(sources, &out_tx, self.clock, &self.cancel);
        // Only workers hold senders, so the consumer ends once they all have.
        drop(out_tx);

        let consumer = Consumer::new(
            out_rx,
            sink,
            self.formatter,
            self.config.print_env(),
            self.config.shutdown,
        );
        let cancel = self.cancel.clone();
        let consumer = tokio::spawn(async move {
            let result = consumer.run(cancel.clone()).await;
            if let Err(err) = &result {
                error!(%err, "writing events failed, shutting down");
            }
            // Nothing drains the queue any more.
            cancel.cancel();
            result
        });

        info!(
            sources = workers.len(),
            queue_capacity = self.config.queue_capacity,
            max_args = self.config.max_args,
            max_envs = self.config.max_envs,
            "engine started"
        );

        RunningEngine {
            cancel: self.cancel,
            workers,
            consumer,
        }
    }
}

pub struct RunningEngine<W> {
    cancel: CancellationToken,
    workers: Vec<SourceHandle>,
    consumer: JoinHandle<std::io::Result<ConsumerSummary<W>>>,
}

/// Outcome of a finished engine.
#[derive(Debug)]
pub struct EngineReport<W> {
    pub sink: W,
    pub written: u64,
    pub dropped: usize,
    pub sources: Vec<SourceReport>,
}

impl<W> RunningEngine<W> {
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Live counters per source.
    pub fn stats(&self) -> Vec<(&'static str, SourceSnapshot)> {
        self.workers
            .iter()
            .map(|w| (w.stats.name(), w.stats.snapshot()))
            .collect()
    }

    /// Resolves once shutdown has been broadcast, either by a caller or by
    /// the consumer stopping on its own, e.g. after a failed write.
    pub async fn stopped(&self) {
        self.cancel.cancelled().await
    }

    /// Broadcast shutdown and wait for every task.
    pub async fn shutdown(self) -> Result<EngineReport<W>, EngineError> {
        self.cancel.cancel();
        self.wait().await
    }

    /// Wait for the tasks to end on their own, i.e. after every source
    /// stream has closed and the queue is drained.
    pub async fn wait(self) -> Result<EngineReport<W>, EngineError> {
        let mut sources = Vec::with_capacity(self.workers.len());
        for worker in self.workers {
            sources.push(worker.task.await?);
        }
        let summary = self.consumer.await??;
        Ok(EngineReport {
            sink: summary.sink,
            written: summary.written,
            dropped: summary.dropped,
            sources,
        })
    }
}

impl<W> EngineReport<W> {
    pub fn log_summary(&self) {
        for source in &self.sources {
            info!(
                source = source.name,
                records = source.stats.records,
                completed = source.stats.completed,
                orphans = source.stats.orphans,
                decode_errors = source.stats.decode_errors,
                lost = source.stats.lost,
                open = source.open,
                "source summary"
            );
        }
        info!(
            written = self.written,
            dropped = self.dropped,
            "consumer summary"
        );
    }
}
