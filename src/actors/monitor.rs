//! MonitorActor - the single writer of the monitoring core
//!
//! ## Message Flow
//!
//! ```text
//! [CollectorActor]* ── CollectorEvent ──► MonitorActor ──► SubscriptionRegistry
//!                                          │   ▲   │            (METRICS, ALERT, STATUS)
//!                        anomaly ticker ───┘   │   └──► AlertNotifier (CRITICAL)
//!                        cleanup ticker ───────┤
//!                    aggregation ticker ───────┘
//! ```
//!
//! Samples are appended and evaluated one at a time, so append + threshold
//! check is atomic with respect to other submissions. Alerts are broadcast in
//! the same step that produced them.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};
use tracing::{debug, error, info, instrument, trace, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::Config;
use crate::core::router::{AlertRecord, DeliveryStatus};
use crate::core::store::MetricAggregate;
use crate::core::sweeper::SweepReport;
use crate::core::threshold::Threshold;
use crate::core::{MonitorCore, SystemStatus};
use crate::error::{MonitorError, MonitorResult};
use crate::model::{Alert, AlertLevel, SampleSet};
use crate::notify::AlertNotifier;
use crate::push::SubscriptionRegistry;
use crate::push::protocol::{
    ALERTS_TOPIC, METRICS_TOPIC, OutboundMessage, SYSTEM_TOPIC, alerts_topic, metrics_topic,
};

use super::messages::{CollectorEvent, MonitorCommand};

/// Capacity of the shared collector event queue
pub const EVENT_QUEUE_CAPACITY: usize = 1_024;

/// How long shutdown waits for in-flight notifier deliveries
pub const DELIVERY_DRAIN_TIMEOUT: StdDuration = StdDuration::from_secs(10);

/// Periods of the monitor's own timers
#[derive(Debug, Clone, Copy)]
pub struct MonitorSchedule {
    pub anomaly: StdDuration,
    pub cleanup: StdDuration,
    pub aggregation: StdDuration,
}

impl From<&Config> for MonitorSchedule {
    fn from(config: &Config) -> Self {
        Self {
            anomaly: config.anomaly_interval(),
            cleanup: config.cleanup_interval(),
            aggregation: config.aggregation_interval(),
        }
    }
}

fn ticker(period: StdDuration) -> Interval {
    let period = period.max(StdDuration::from_millis(1));
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

pub struct MonitorActor {
    core: MonitorCore,
    clock: Arc<dyn Clock>,
    registry: SubscriptionRegistry,
    notifier: Option<Arc<dyn AlertNotifier>>,
    schedule: MonitorSchedule,
    event_rx: mpsc::Receiver<CollectorEvent>,
    command_rx: mpsc::Receiver<MonitorCommand>,
    deliveries: JoinSet<(Uuid, DeliveryStatus)>,
}

impl MonitorActor {
    pub fn new(
        core: MonitorCore,
        clock: Arc<dyn Clock>,
        registry: SubscriptionRegistry,
        notifier: Option<Arc<dyn AlertNotifier>>,
        schedule: MonitorSchedule,
        event_rx: mpsc::Receiver<CollectorEvent>,
        command_rx: mpsc::Receiver<MonitorCommand>,
    ) -> Self {
        Self {
            core,
            clock,
            registry,
            notifier,
            schedule,
            event_rx,
            command_rx,
            deliveries: JoinSet::new(),
        }
    }

    /// Run until a Shutdown command arrives or every handle is dropped
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting monitor actor");

        let mut anomaly_ticker = ticker(self.schedule.anomaly);
        let mut cleanup_ticker = ticker(self.schedule.cleanup);
        let mut aggregation_ticker = ticker(self.schedule.aggregation);
        let mut shutdown_ack = None;

        loop {
            tokio::select! {
                Some(event) = self.event_rx.recv() => {
                    self.handle_event(event).await;
                }

                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(MonitorCommand::Shutdown { respond_to }) => {
                            debug!("received shutdown command");
                            shutdown_ack = Some(respond_to);
                            break;
                        }
                        Some(cmd) => self.handle_command(cmd).await,
                        None => {
                            debug!("command channel closed, shutting down");
                            break;
                        }
                    }
                }

                Some(delivery) = self.deliveries.join_next(), if !self.deliveries.is_empty() => {
                    self.finish_delivery(delivery);
                }

                _ = anomaly_ticker.tick() => {
                    self.detect_anomalies().await;
                }

                _ = cleanup_ticker.tick() => {
                    self.sweep();
                }

                _ = aggregation_ticker.tick() => {
                    self.broadcast_status().await;
                }
            }
        }

        self.drain().await;

        info!("monitor actor stopped");
        if let Some(ack) = shutdown_ack {
            let _ = ack.send(());
        }
    }

    /// Apply samples still queued and wait for pending notifier deliveries
    async fn drain(&mut self) {
        let mut drained = 0;
        while let Ok(event) = self.event_rx.try_recv() {
            self.handle_event(event).await;
            drained += 1;
        }
        if drained > 0 {
            debug!("applied {drained} queued collector event(s) before stopping");
        }

        if self.deliveries.is_empty() {
            return;
        }
        debug!("waiting for {} notifier delivery(ies)", self.deliveries.len());
        let finished = tokio::time::timeout(DELIVERY_DRAIN_TIMEOUT, async {
            while let Some(delivery) = self.deliveries.join_next().await {
                self.finish_delivery(delivery);
            }
        })
        .await;

        if finished.is_err() {
            warn!(
                "abandoning {} notifier delivery(ies) after {}s",
                self.deliveries.len(),
                DELIVERY_DRAIN_TIMEOUT.as_secs()
            );
            self.deliveries.abort_all();
        }
    }

    fn finish_delivery(&mut self, delivery: Result<(Uuid, DeliveryStatus), tokio::task::JoinError>) {
        match delivery {
            Ok((id, status)) => {
                self.core.mark_delivery(id, status);
            }
            Err(e) => error!("notifier task failed: {e}"),
        }
    }

    async fn handle_event(&mut self, event: CollectorEvent) {
        match event {
            CollectorEvent::Sample(sample) => {
                // rejected samples are logged and counted by the core
                let _ = self.ingest(sample).await;
            }
            CollectorEvent::Failed {
                collector_id,
                reason,
                timestamp,
            } => {
                trace!("collector {collector_id} failed at {timestamp}");
                self.core.record_failure(&collector_id, reason);
            }
        }
    }

    async fn handle_command(&mut self, cmd: MonitorCommand) {
        let now = self.clock.now();

        match cmd {
            MonitorCommand::Ingest { sample, respond_to } => {
                let result = self.ingest(sample).await;
                let _ = respond_to.send(result);
            }
            MonitorCommand::GetStatus { respond_to } => {
                let _ = respond_to.send(self.status().await);
            }
            MonitorCommand::GetMetrics {
                collector_id,
                since,
                respond_to,
            } => {
                let _ = respond_to.send(self.core.metrics(collector_id.as_deref(), since, now));
            }
            MonitorCommand::GetAlerts {
                level,
                since,
                respond_to,
            } => {
                let _ = respond_to.send(self.core.alerts(level, since, now));
            }
            MonitorCommand::GetAggregate {
                collector_id,
                window,
                respond_to,
            } => {
                let _ = respond_to.send(self.core.aggregate(&collector_id, window, now));
            }
            MonitorCommand::SetThreshold {
                collector_id,
                metric,
                threshold,
                respond_to,
            } => {
                info!("setting threshold for {collector_id}.{metric}: {threshold:?}");
                let _ = respond_to.send(self.core.set_threshold(&collector_id, &metric, threshold));
            }
            MonitorCommand::RemoveThreshold {
                collector_id,
                metric,
                respond_to,
            } => {
                info!("removing threshold for {collector_id}.{metric}");
                let _ = respond_to.send(self.core.remove_threshold(&collector_id, &metric));
            }
            MonitorCommand::DetectAnomalies { respond_to } => {
                let alerts = self.detect_anomalies().await;
                let _ = respond_to.send(alerts);
            }
            MonitorCommand::Sweep { respond_to } => {
                let _ = respond_to.send(self.sweep());
            }
            MonitorCommand::Shutdown { respond_to } => {
                // handled by the run loop
                let _ = respond_to.send(());
            }
        }
    }

    /// Append, evaluate, and broadcast the sample and any resulting alerts
    async fn ingest(&mut self, sample: SampleSet) -> MonitorResult<Vec<Alert>> {
        let now = self.clock.now();
        let alerts = self.core.ingest(sample.clone(), now)?;

        let topic = metrics_topic(&sample.collector_id);
        self.registry
            .broadcast_to_any(&[METRICS_TOPIC, topic.as_str()], &OutboundMessage::metrics(&sample))
            .await;

        self.dispatch(&alerts).await;
        Ok(alerts)
    }

    async fn detect_anomalies(&mut self) -> Vec<Alert> {
        let now = self.clock.now();
        let alerts = self.core.detect_anomalies(now);
        if !alerts.is_empty() {
            info!("anomaly detection raised {} alert(s)", alerts.len());
        }
        self.dispatch(&alerts).await;
        alerts
    }

    fn sweep(&mut self) -> SweepReport {
        self.core.sweep(self.clock.now())
    }

    async fn status(&self) -> SystemStatus {
        let connections = self.registry.connection_count().await;
        self.core.status(self.clock.now(), connections)
    }

    async fn broadcast_status(&self) {
        let status = self.status().await;
        self.registry
            .broadcast(SYSTEM_TOPIC, &OutboundMessage::status(status))
            .await;
    }

    /// Fan alerts out to subscribers and hand CRITICAL ones to the notifier
    async fn dispatch(&mut self, alerts: &[Alert]) {
        for alert in alerts {
            let level_topic = alerts_topic(alert.level);
            let delivered = self
                .registry
                .broadcast_to_any(&[ALERTS_TOPIC, level_topic.as_str()], &OutboundMessage::alert(alert))
                .await;
            debug!("alert {} broadcast to {delivered} subscriber(s)", alert.id);

            if alert.out_of_band {
                self.deliver(alert);
            }
        }
    }

    fn deliver(&mut self, alert: &Alert) {
        let Some(notifier) = self.notifier.clone() else {
            warn!("no notifier configured, alert {} is undeliverable", alert.id);
            self.core.mark_delivery(alert.id, DeliveryStatus::Undeliverable);
            return;
        };

        let alert = alert.clone();
        self.deliveries.spawn(async move {
            let status = match notifier.notify(&alert).await {
                Ok(()) => DeliveryStatus::Delivered,
                Err(e) => {
                    error!("alert {} undeliverable: {e:#}", alert.id);
                    DeliveryStatus::Undeliverable
                }
            };
            (alert.id, status)
        });
    }
}

/// Handle for the monitor actor
#[derive(Debug, Clone)]
pub struct MonitorHandle {
    sender: mpsc::Sender<MonitorCommand>,
    events: mpsc::Sender<CollectorEvent>,
}

impl MonitorHandle {
    pub fn spawn(
        config: &Config,
        clock: Arc<dyn Clock>,
        registry: SubscriptionRegistry,
        notifier: Option<Arc<dyn AlertNotifier>>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);

        let core = MonitorCore::new(config, clock.now());
        let actor = MonitorActor::new(
            core,
            clock,
            registry,
            notifier,
            MonitorSchedule::from(config),
            event_rx,
            cmd_rx,
        );
        tokio::spawn(actor.run());

        Self {
            sender: cmd_tx,
            events: event_tx,
        }
    }

    /// Queue for collector actors
    pub fn event_sender(&self) -> mpsc::Sender<CollectorEvent> {
        self.events.clone()
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> MonitorCommand) -> MonitorResult<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(command(tx))
            .await
            .map_err(|_| MonitorError::ActorUnavailable)?;
        rx.await.map_err(|_| MonitorError::ActorUnavailable)
    }

    /// Append and evaluate a sample; returns the alerts it raised once they
    /// have been broadcast
    pub async fn ingest(&self, sample: SampleSet) -> MonitorResult<Vec<Alert>> {
        self.request(|respond_to| MonitorCommand::Ingest { sample, respond_to })
            .await?
    }

    pub async fn system_status(&self) -> MonitorResult<SystemStatus> {
        self.request(|respond_to| MonitorCommand::GetStatus { respond_to })
            .await
    }

    pub async fn metrics(&self, collector_id: Option<String>, since: Duration) -> MonitorResult<Vec<SampleSet>> {
        self.request(|respond_to| MonitorCommand::GetMetrics {
            collector_id,
            since,
            respond_to,
        })
        .await
    }

    pub async fn alerts(&self, level: Option<AlertLevel>, since: Duration) -> MonitorResult<Vec<AlertRecord>> {
        self.request(|respond_to| MonitorCommand::GetAlerts {
            level,
            since,
            respond_to,
        })
        .await
    }

    pub async fn aggregate(
        &self,
        collector_id: String,
        window: Duration,
    ) -> MonitorResult<BTreeMap<String, MetricAggregate>> {
        self.request(|respond_to| MonitorCommand::GetAggregate {
            collector_id,
            window,
            respond_to,
        })
        .await
    }

    pub async fn set_threshold(
        &self,
        collector_id: impl Into<String>,
        metric: impl Into<String>,
        threshold: Threshold,
    ) -> MonitorResult<Option<Threshold>> {
        self.request(|respond_to| MonitorCommand::SetThreshold {
            collector_id: collector_id.into(),
            metric: metric.into(),
            threshold,
            respond_to,
        })
        .await
    }

    pub async fn remove_threshold(
        &self,
        collector_id: impl Into<String>,
        metric: impl Into<String>,
    ) -> MonitorResult<Option<Threshold>> {
        self.request(|respond_to| MonitorCommand::RemoveThreshold {
            collector_id: collector_id.into(),
            metric: metric.into(),
            respond_to,
        })
        .await
    }

    pub async fn detect_anomalies(&self) -> MonitorResult<Vec<Alert>> {
        self.request(|respond_to| MonitorCommand::DetectAnomalies { respond_to })
            .await
    }

    pub async fn sweep(&self) -> MonitorResult<SweepReport> {
        self.request(|respond_to| MonitorCommand::Sweep { respond_to })
            .await
    }

    /// Stop the actor; returns once its loop has exited
    pub async fn shutdown(&self) -> MonitorResult<()> {
        self.request(|respond_to| MonitorCommand::Shutdown { respond_to })
            .await
    }
}
