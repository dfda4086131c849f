//! Cache → fetch → aggregate orchestration for a single search area.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use crate::cache::{Snapshot, SnapshotCache};
use crate::config::PipelineConfig;
use crate::fetch::{BasicClient, HttpClient, OverpassFetcher};
use crate::model::{SearchArea, TransportStop};
use crate::stats::MetricsSummary;

/// Counters kept across the runs of one [`Pipeline`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct PipelineStats {
    pub api_calls: usize,
    pub cache_hits: usize,
    pub elements_seen: usize,
    pub stops_processed: usize,
    pub stops_dropped: usize,
    pub failures: usize,
}

impl PipelineStats {
    /// Kept stops over all parsed elements; zero before anything was parsed.
    pub fn success_rate(&self) -> f64 {
        if self.elements_seen == 0 {
            0.0
        } else {
            self.stops_processed as f64 / self.elements_seen as f64
        }
    }
}

#[derive(Debug)]
pub struct RunReport {
    pub area: SearchArea,
    pub stops: Vec<TransportStop>,
    pub summary: MetricsSummary,
    pub from_cache: bool,
}

pub struct Pipeline<C> {
    fetcher: OverpassFetcher<C>,
    cache: SnapshotCache,
    stats: PipelineStats,
}

impl Pipeline<BasicClient> {
    /// Builds a pipeline talking to the configured Overpass endpoint.
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let client = BasicClient::new(config.http_timeout()).context("building HTTP client")?;
        Self::with_client(client, config)
    }
}

impl<C: HttpClient> Pipeline<C> {
    pub fn with_client(client: C, config: &PipelineConfig) -> Result<Self> {
        let fetcher = OverpassFetcher::new(client, &config.endpoint)?
            .with_retry(config.retry_policy())
            .with_batch_size(config.batch_size)
            .with_server_timeout(config.server_timeout_secs);
        let cache = SnapshotCache::new(&config.cache_dir, config.cache_ttl(), config.cache_gzip);

        Ok(Self {
            fetcher,
            cache,
            stats: PipelineStats::default(),
        })
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// Loads stops for `area` from cache or Overpass and summarizes them.
    #[tracing::instrument(skip(self, city, area), fields(city = city.unwrap_or("-")))]
    pub async fn run(&mut self, city: Option<&str>, area: SearchArea) -> Result<RunReport> {
        if let Some(snapshot) = self.cache.get(&area) {
            self.stats.cache_hits += 1;
            info!(stops = snapshot.stops.len(), "Serving stops from cache");
            return Ok(Self::report(area, snapshot.stops, true));
        }

        self.stats.api_calls += 1;
        let outcome = match self.fetcher.fetch(&area).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.stats.failures += 1;
                return Err(e).context("fetching transport stops");
            }
        };
        self.stats.elements_seen += outcome.stops.len() + outcome.dropped;
        self.stats.stops_processed += outcome.stops.len();
        self.stats.stops_dropped += outcome.dropped;

        if self.cache.is_enabled() {
            let snapshot = Snapshot::new(area, outcome.stops.clone());
            if let Err(e) = self.cache.put(&snapshot) {
                warn!(error = %e, "Failed to write stop snapshot");
            }
        }

        Ok(Self::report(area, outcome.stops, false))
    }

    fn report(area: SearchArea, stops: Vec<TransportStop>, from_cache: bool) -> RunReport {
        let summary = MetricsSummary::from_stops(&stops);
        info!(
            total = summary.total_stops,
            wheelchair_pct = summary.wheelchair.pct,
            shelter_pct = summary.shelter.pct,
            seating_pct = summary.seating.pct,
            from_cache,
            "Stop metrics computed"
        );
        RunReport {
            area,
            stops,
            summary,
            from_cache,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Always answers with the same body, counting calls.
    struct FixedClient {
        status: u16,
        body: &'static str,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl HttpClient for FixedClient {
        async fn execute(&self, _req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let resp = http::Response::builder()
                .status(self.status)
                .body(self.body.to_string())
                .unwrap();
            Ok(reqwest::Response::from(resp))
        }
    }

    const BODY: &str = r#"{"elements": [
        {"type": "node", "id": 1, "lat": 35.6762, "lon": 139.6503, "tags": {"highway": "bus_stop", "shelter": "yes"}},
        {"type": "node", "id": 2, "lat": 35.6770, "lon": 139.6510, "tags": {"railway": "station", "wheelchair": "yes"}},
        {"type": "relation", "id": 3}
    ]}"#;

    fn config(dir: &tempfile::TempDir, ttl: u64) -> PipelineConfig {
        PipelineConfig {
            retry_attempts: 2,
            retry_base_delay_ms: 0,
            retry_max_delay_ms: 0,
            cache_dir: dir.path().to_path_buf(),
            cache_ttl_secs: ttl,
            ..Default::default()
        }
    }

    fn client(status: u16) -> FixedClient {
        FixedClient {
            status,
            body: BODY,
            calls: AtomicUsize::new(0),
        }
    }

    fn area() -> SearchArea {
        SearchArea::new(35.6762, 139.6503, 1000).unwrap()
    }

    #[tokio::test]
    async fn test_run_fetches_then_hits_cache() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = Pipeline::with_client(client(200), &config(&dir, 3600)).unwrap();

        let first = pipeline.run(Some("tokyo"), area()).await.unwrap();
        assert!(!first.from_cache);
        assert_eq!(first.summary.total_stops, 2);
        assert_eq!(first.summary.shelter.pct, 100.0);

        let second = pipeline.run(Some("tokyo"), area()).await.unwrap();
        assert!(second.from_cache);
        assert_eq!(second.summary, first.summary);

        let stats = pipeline.stats();
        assert_eq!(stats.api_calls, 1);
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.elements_seen, 3);
        assert_eq!(stats.stops_processed, 2);
        assert_eq!(stats.stops_dropped, 1);
        assert!((stats.success_rate() - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(pipeline.fetcher.client().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_without_cache_always_fetches() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = Pipeline::with_client(client(200), &config(&dir, 0)).unwrap();

        pipeline.run(None, area()).await.unwrap();
        pipeline.run(None, area()).await.unwrap();

        assert_eq!(pipeline.stats().api_calls, 2);
        assert_eq!(pipeline.stats().cache_hits, 0);
        assert_eq!(pipeline.stats().elements_seen, 6);
    }

    #[tokio::test]
    async fn test_run_surfaces_exhausted_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = Pipeline::with_client(client(503), &config(&dir, 3600)).unwrap();

        let err = pipeline.run(None, area()).await.unwrap_err();
        let fetch_err = err.downcast_ref::<crate::error::FetchError>().unwrap();
        assert!(matches!(fetch_err, crate::error::FetchError::Exhausted { attempts: 2, .. }));
        assert_eq!(pipeline.stats().failures, 1);
        assert_eq!(pipeline.fetcher.client().calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_success_rate_empty() {
        assert_eq!(PipelineStats::default().success_rate(), 0.0);
    }
}
