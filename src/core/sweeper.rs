use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::debug;

use crate::clock::cutoff;
use crate::core::router::AlertRouter;
use crate::core::store::MetricStore;
use crate::core::threshold::ThresholdEngine;

/// Outcome of a single sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub samples: usize,
    pub alerts: usize,
    pub cooldowns: usize,
}

/// Cumulative sweeper statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepStats {
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub last_sweep: Option<DateTime<Utc>>,
    pub samples_removed: u64,
    pub alerts_removed: u64,
}

/// Age-based eviction of samples, alerts and cooldown records
///
/// The sweeper is the only component deleting samples by age. Entries exactly
/// at `now - retention` are kept.
#[derive(Debug)]
pub struct RetentionSweeper {
    retention: Duration,
    stats: SweepStats,
}

impl RetentionSweeper {
    pub fn new(retention: Duration) -> Self {
        Self {
            retention,
            stats: SweepStats::default(),
        }
    }

    pub fn sweep(
        &mut self,
        now: DateTime<Utc>,
        store: &mut MetricStore,
        router: &mut AlertRouter,
        thresholds: &mut ThresholdEngine,
    ) -> SweepReport {
        let cutoff = cutoff(now, self.retention);

        let report = SweepReport {
            samples: store.evict_before(cutoff),
            alerts: router.evict_before(cutoff),
            cooldowns: thresholds.prune_cooldowns(cutoff, now),
        };

        self.stats.last_sweep = Some(now);
        self.stats.samples_removed += report.samples as u64;
        self.stats.alerts_removed += report.alerts as u64;

        debug!(
            "sweep at {now}: removed {} sample(s), {} alert(s), {} cooldown record(s)",
            report.samples, report.alerts, report.cooldowns
        );
        report
    }

    pub fn stats(&self) -> SweepStats {
        self.stats
    }
}
