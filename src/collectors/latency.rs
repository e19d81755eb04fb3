use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use tracing::{debug, instrument, trace};

use crate::collectors::Collector;
use crate::model::MetricValues;

/// HTTP GET probe
///
/// An unreachable endpoint is a measurement (`available = 0`), not a
/// collector failure.
pub struct LatencyCollector {
    id: String,
    url: String,
    expect_body: Option<Regex>,
    client: Client,
}

impl LatencyCollector {
    pub fn new(
        id: impl Into<String>,
        url: impl Into<String>,
        expect_body: Option<&str>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let expect_body = expect_body
            .map(Regex::new)
            .transpose()
            .context("invalid expectBody pattern")?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            id: id.into(),
            url: url.into(),
            expect_body,
            client,
        })
    }

    fn body_matches(&self, body: &str) -> bool {
        self.expect_body
            .as_ref()
            .is_none_or(|pattern| pattern.is_match(body))
    }
}

#[async_trait]
impl Collector for LatencyCollector {
    fn id(&self) -> &str {
        &self.id
    }

    #[instrument(skip(self), fields(collector = %self.id, url = %self.url))]
    async fn collect(&mut self) -> anyhow::Result<MetricValues> {
        let start = Instant::now();
        let mut values = MetricValues::new();

        let (status_code, available) = match self.client.get(&self.url).send().await {
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                let matches = self.body_matches(&body);
                if !matches {
                    debug!("response body does not match expected pattern");
                }
                (f64::from(status.as_u16()), status.is_success() && matches)
            }
            Err(err) => {
                debug!("probe failed: {err}");
                (0.0, false)
            }
        };

        let elapsed = start.elapsed().as_secs_f64() * 1_000.0;
        values.insert("response_time".to_string(), elapsed);
        values.insert("status_code".to_string(), status_code);
        values.insert("available".to_string(), if available { 1.0 } else { 0.0 });

        trace!("probe took {elapsed:.1}ms (status {status_code})");
        Ok(values)
    }
}
