//! The single consumer draining the bounded output queue.

use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ShutdownPolicy;
use crate::event::Event;
use crate::format::FormatFn;

/// What the consumer did before it stopped. `sink` is handed back so callers
/// can inspect in-memory sinks.
#[derive(Debug)]
pub struct ConsumerSummary<W> {
    pub sink: W,
    pub written: u64,
    /// Events still queued at shutdown and never written.
    pub dropped: usize,
}

pub struct Consumer<W> {
    rx: mpsc::Receiver<Event>,
    sink: W,
    formatter: FormatFn,
    print_env: bool,
    shutdown: ShutdownPolicy,
    written: u64,
}

impl<W> Consumer<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(
        rx: mpsc::Receiver<Event>,
        sink: W,
        formatter: FormatFn,
        print_env: bool,
        shutdown: ShutdownPolicy,
    ) -> Self {
        Self {
            rx,
            sink,
            formatter,
            print_env,
            shutdown,
            written: 0,
        }
    }

    /// Writes events until every sender is gone or `cancel` fires.
    ///
    /// A write still pending when `cancel` fires is abandoned and its event
    /// counted as dropped, so a stuck sink cannot hold up shutdown. The sink
    /// may then end in a partial line, so nothing else is written to it, even
    /// under [`ShutdownPolicy::Flush`].
    pub async fn run(mut self, cancel: CancellationToken) -> io::Result<ConsumerSummary<W>> {
        let mut stop = Stop::Closed;
        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    stop = Stop::Cancelled;
                    break;
                }
                event = self.rx.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            tokio::select! {
                biased;
                written = self.write(&event) => written?,
                _ = cancel.cancelled() => {
                    stop = Stop::Abandoned;
                    break;
                }
            }
        }

        let dropped = match stop {
            Stop::Closed => {
                self.sink.flush().await?;
                0
            }
            Stop::Cancelled => self.on_shutdown().await?,
            Stop::Abandoned => {
                self.rx.close();
                let dropped = 1 + self.rx.len();
                warn!(dropped, "sink stalled, abandoning pending write");
                dropped
            }
        };

        debug!(written = self.written, dropped, "consumer stopped");
        Ok(ConsumerSummary {
            sink: self.sink,
            written: self.written,
            dropped,
        })
    }

    async fn write(&mut self, event: &Event) -> io::Result<()> {
        let mut line = (self.formatter)(event, self.print_env);
        line.push('\n');
        self.sink.write_all(line.as_bytes()).await?;
        self.written += 1;
        Ok(())
    }

    /// Applies the shutdown policy, returning how many queued events were lost.
    ///
    /// The final flush of the sink counts against the same deadline, so a
    /// sink that never drains cannot keep the consumer alive.
    async fn on_shutdown(&mut self) -> io::Result<usize> {
        // No new events from here on; workers blocked on a push see an error.
        self.rx.close();
        let queued = self.rx.len();

        let deadline = match self.shutdown {
            ShutdownPolicy::Drop => {
                if queued > 0 {
                    info!(dropped = queued, "dropping queued events on shutdown");
                }
                // One poll: whatever the sink already buffered goes out if it can.
                match timeout_at(Instant::now(), self.sink.flush()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => debug!(%err, "sink flush failed on shutdown"),
                    Err(_) => debug!("sink not flushed on shutdown"),
                }
                return Ok(queued);
            }
            ShutdownPolicy::Flush { timeout } => Instant::now() + timeout,
        };

        let before = self.written;
        let drained = timeout_at(deadline, async {
            while let Some(event) = self.rx.recv().await {
                self.write(&event).await?;
            }
            self.sink.flush().await
        })
        .await;
        match drained {
            Ok(result) => result.map(|()| 0),
            Err(_) => {
                let dropped = queued.saturating_sub((self.written - before) as usize);
                warn!(dropped, "flush timed out, dropping the rest");
                Ok(dropped)
            }
        }
    }
}

/// How the main loop ended.
enum Stop {
    /// Every sender is gone and the queue is empty.
    Closed,
    Cancelled,
    /// Cancelled while a write was still pending.
    Abandoned,
}
