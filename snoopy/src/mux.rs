//! Source multiplexer: one worker per source stream.
//!
//! ```text
//!  execve records   ──▶ SourceWorker (table) ──┐
//!                                               ├──▶ mpsc::Sender<Event> ──▶ Consumer
//!  execveat records ──▶ SourceWorker (table) ──┘
//! ```
//!
//! Workers share nothing but the output sender. Each one checks the
//! cancellation token before every record and races every push against it,
//! so a full output queue slows a worker down but never keeps it alive past
//! shutdown.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::clock::BootClock;
use crate::decode::decode;
use crate::event::Event;
use crate::stats::{SourceSnapshot, SourceStats};
use crate::table::{Applied, CorrelationTable};

/// Capacity of the loss-count channel next to each record queue.
const LOSS_QUEUE: usize = 16;

/// Inbound side of one source: raw records plus upstream loss counts.
#[derive(Debug)]
pub struct SourceStream {
    pub name: &'static str,
    pub records: mpsc::Receiver<Bytes>,
    pub lost: mpsc::Receiver<u64>,
}

/// Producer handle feeding a [`SourceStream`].
#[derive(Debug, Clone)]
pub struct SourceFeed {
    records: mpsc::Sender<Bytes>,
    lost: mpsc::Sender<u64>,
}

impl SourceStream {
    pub fn channel(name: &'static str, capacity: usize) -> (SourceFeed, SourceStream) {
        let (records_tx, records_rx) = mpsc::channel(capacity);
        let (lost_tx, lost_rx) = mpsc::channel(LOSS_QUEUE);
        (
            SourceFeed {
                records: records_tx,
                lost: lost_tx,
            },
            SourceStream {
                name,
                records: records_rx,
                lost: lost_rx,
            },
        )
    }
}

impl SourceFeed {
    /// Returns `false` once the worker is gone.
    pub async fn record(&self, raw: Bytes) -> bool {
        self.records.send(raw).await.is_ok()
    }

    /// Returns `false` once the worker is gone.
    pub async fn lost(&self, count: u64) -> bool {
        self.lost.send(count).await.is_ok()
    }
}

/// Final state of a source worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceReport {
    pub name: &'static str,
    pub stats: SourceSnapshot,
    /// Execs still waiting for a Ret when the worker stopped.
    pub open: usize,
}

/// A spawned worker and its live counters.
#[derive(Debug)]
pub struct SourceHandle {
    pub stats: Arc<SourceStats>,
    pub task: JoinHandle<SourceReport>,
}

pub struct SourceWorker {
    stream: SourceStream,
    table: CorrelationTable,
    out: mpsc::Sender<Event>,
    clock: BootClock,
    stats: Arc<SourceStats>,
    cancel: CancellationToken,
}

impl SourceWorker {
    pub fn new(
        stream: SourceStream,
        out: mpsc::Sender<Event>,
        clock: BootClock,
        cancel: CancellationToken,
    ) -> Self {
        let stats = Arc::new(SourceStats::new(stream.name));
        Self {
            stream,
            table: CorrelationTable::new(),
            out,
            clock,
            stats,
            cancel,
        }
    }

    pub fn stats(&self) -> Arc<SourceStats> {
        Arc::clone(&self.stats)
    }

    pub fn spawn(self) -> SourceHandle {
        let stats = self.stats();
        SourceHandle {
            stats,
            task: tokio::spawn(self.run()),
        }
    }

    /// Runs until the record queue closes or cancellation is observed.
    pub async fn run(mut self) -> SourceReport {
        let mut lost_open = true;
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                lost = self.stream.lost.recv(), if lost_open => match lost {
                    Some(count) => self.on_lost(count),
                    None => lost_open = false,
                },
                raw = self.stream.records.recv() => {
                    let Some(raw) = raw else { break };
                    if let Some(event) = self.process(raw) {
                        if !self.push(event).await {
                            break;
                        }
                    }
                }
            }
        }

        if !self.table.is_empty() {
            debug!(
                source = self.stream.name,
                open = self.table.len(),
                "discarding incomplete execs"
            );
        }
        SourceReport {
            name: self.stream.name,
            stats: self.stats.snapshot(),
            open: self.table.len(),
        }
    }

    fn process(&mut self, raw: Bytes) -> Option<Event> {
        self.stats.record_received();
        let record = match decode(raw) {
            Ok(record) => record,
            Err(err) => {
                self.stats.record_decode_error();
                warn!(source = self.stream.name, error = %err, "dropping malformed record");
                return None;
            }
        };

        match self.table.apply(record) {
            Applied::Completed(mut event) => {
                event.ts = self.clock.to_wall(event.ts);
                self.stats.record_completed();
                Some(event)
            }
            Applied::Orphaned => {
                self.stats.record_orphan();
                trace!(source = self.stream.name, "orphan fragment discarded");
                None
            }
            Applied::Opened | Applied::Appended => None,
        }
    }

    /// Blocks while the output queue is full, unless cancelled first.
    async fn push(&self, event: Event) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            sent = self.out.send(event) => sent.is_ok(),
        }
    }

    fn on_lost(&self, count: u64) {
        self.stats.record_lost(count);
        warn!(source = self.stream.name, lost = count, "producer dropped records");
    }
}

/// Spawn one worker per stream, all feeding `out`.
pub fn spawn_sources(
    streams: Vec<SourceStream>,
    out: &mpsc::Sender<Event>,
    clock: BootClock,
    cancel: &CancellationToken,
) -> Vec<SourceHandle> {
    streams
        .into_iter()
        .map(|stream| SourceWorker::new(stream, out.clone(), clock, cancel.clone()).spawn())
        .collect()
}
