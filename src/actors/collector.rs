//! CollectorActor - drives one collector on its own ticker
//!
//! ## Message Flow
//!
//! ```text
//! Timer tick → collect() (time-boxed) → CollectorEvent → [MonitorActor]
//!     ↑
//!     └─── Commands (PollNow, UpdateInterval, Shutdown)
//! ```
//!
//! A collector that errors or exceeds its timeout is skipped for that tick; the
//! failure is reported to the monitor so it can be counted. Every collector has
//! its own actor, so a slow collector never delays the others.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{MissedTickBehavior, interval, timeout};
use tracing::{debug, instrument, trace, warn};

use crate::clock::Clock;
use crate::collectors::Collector;
use crate::model::SampleSet;

use super::messages::{CollectorCommand, CollectorEvent};

pub struct CollectorActor {
    collector: Box<dyn Collector>,
    clock: Arc<dyn Clock>,
    command_rx: mpsc::Receiver<CollectorCommand>,
    event_tx: mpsc::Sender<CollectorEvent>,
    interval_duration: Duration,
    timeout: Duration,
}

impl CollectorActor {
    pub fn new(
        collector: Box<dyn Collector>,
        clock: Arc<dyn Clock>,
        command_rx: mpsc::Receiver<CollectorCommand>,
        event_tx: mpsc::Sender<CollectorEvent>,
        interval_duration: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            collector,
            clock,
            command_rx,
            event_tx,
            interval_duration,
            timeout,
        }
    }

    fn ticker(&self) -> tokio::time::Interval {
        let mut ticker = interval(self.interval_duration);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker
    }

    /// Run until a Shutdown command arrives or every handle is dropped
    #[instrument(skip(self), fields(collector = %self.collector.id()))]
    pub async fn run(mut self) {
        debug!("starting collector actor");

        let mut ticker = self.ticker();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.poll().await {
                        trace!("tick skipped: {e:#}");
                    }
                }

                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(CollectorCommand::PollNow { respond_to }) => {
                            debug!("received PollNow command");
                            let result = self.poll().await;
                            let _ = respond_to.send(result);
                        }

                        Some(CollectorCommand::UpdateInterval { interval_ms }) => {
                            debug!("updating interval to {interval_ms}ms");
                            self.interval_duration = Duration::from_millis(interval_ms.max(1));
                            ticker = self.ticker();
                        }

                        Some(CollectorCommand::Shutdown) => {
                            debug!("received shutdown command");
                            break;
                        }

                        None => {
                            debug!("command channel closed, shutting down");
                            break;
                        }
                    }
                }
            }

            if self.event_tx.is_closed() {
                warn!("monitor is gone, stopping collector");
                break;
            }
        }

        debug!("collector actor stopped");
    }

    /// Collect once and submit the result to the monitor
    ///
    /// Returns an error if the collector failed or timed out (the failure has
    /// already been reported to the monitor at that point).
    async fn poll(&mut self) -> Result<()> {
        let id = self.collector.id().to_string();

        let failure = match timeout(self.timeout, self.collector.collect()).await {
            Ok(Ok(values)) => {
                let sample = SampleSet::new(id, self.clock.now(), values);
                trace!("collected {} value(s)", sample.values.len());
                self.event_tx
                    .send(CollectorEvent::Sample(sample))
                    .await
                    .context("failed to submit sample to monitor")?;
                return Ok(());
            }
            Ok(Err(e)) => anyhow!("collector failed: {e:#}"),
            Err(_) => anyhow!("collector timed out after {}ms", self.timeout.as_millis()),
        };

        warn!("{failure}");
        self.event_tx
            .send(CollectorEvent::Failed {
                collector_id: id,
                reason: failure.to_string(),
                timestamp: self.clock.now(),
            })
            .await
            .context("failed to report collector failure to monitor")?;
        Err(failure)
    }
}

/// Handle for controlling a collector actor
#[derive(Debug, Clone)]
pub struct CollectorHandle {
    sender: mpsc::Sender<CollectorCommand>,
    pub collector_id: String,
}

impl CollectorHandle {
    /// Spawn a collector actor submitting to `event_tx`
    pub fn spawn(
        collector: Box<dyn Collector>,
        clock: Arc<dyn Clock>,
        event_tx: mpsc::Sender<CollectorEvent>,
        interval: Duration,
        timeout: Duration,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let collector_id = collector.id().to_string();

        let actor = CollectorActor::new(collector, clock, cmd_rx, event_tx, interval, timeout);
        tokio::spawn(actor.run());

        Self {
            sender: cmd_tx,
            collector_id,
        }
    }

    /// Trigger an immediate collection
    pub async fn poll_now(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(CollectorCommand::PollNow { respond_to: tx })
            .await
            .context("failed to send PollNow command")?;

        rx.await.context("failed to receive response")?
    }

    pub async fn update_interval(&self, interval_ms: u64) -> Result<()> {
        self.sender
            .send(CollectorCommand::UpdateInterval { interval_ms })
            .await
            .context("failed to send UpdateInterval command")?;
        Ok(())
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(CollectorCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}
