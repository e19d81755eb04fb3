use async_trait::async_trait;
use sysinfo::{Components, System};
use tracing::trace;

use crate::collectors::Collector;
use crate::model::MetricValues;

/// Host CPU, memory, swap, load and (if available) temperature
///
/// The `System` handle is kept between ticks, so CPU usage is measured over
/// the interval since the previous tick.
pub struct ResourceCollector {
    id: String,
    system: System,
    components: Components,
}

impl ResourceCollector {
    pub fn new(id: impl Into<String>) -> Self {
        let mut system = System::new();
        system.refresh_cpu_usage();
        system.refresh_memory();

        Self {
            id: id.into(),
            system,
            components: Components::new_with_refreshed_list(),
        }
    }

    fn average_temperature(&self) -> Option<f64> {
        let temperatures: Vec<f32> = self
            .components
            .iter()
            .filter_map(|component| component.temperature())
            .collect();

        if temperatures.is_empty() {
            return None;
        }
        Some(temperatures.iter().map(|t| f64::from(*t)).sum::<f64>() / temperatures.len() as f64)
    }
}

fn percent(used: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    used as f64 / total as f64 * 100.0
}

#[async_trait]
impl Collector for ResourceCollector {
    fn id(&self) -> &str {
        &self.id
    }

    async fn collect(&mut self) -> anyhow::Result<MetricValues> {
        self.system.refresh_cpu_usage();
        self.system.refresh_memory();
        self.components.refresh(false);

        let mut values = MetricValues::new();
        values.insert("cpu_usage".to_string(), f64::from(self.system.global_cpu_usage()));
        values.insert(
            "memory_usage".to_string(),
            percent(self.system.used_memory(), self.system.total_memory()),
        );
        values.insert(
            "swap_usage".to_string(),
            percent(self.system.used_swap(), self.system.total_swap()),
        );
        values.insert("load_average".to_string(), System::load_average().one);

        if let Some(temperature) = self.average_temperature() {
            values.insert("temperature".to_string(), temperature);
        }

        trace!("collected resource metrics: {values:?}");
        Ok(values)
    }
}
