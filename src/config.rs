//! Typed pipeline configuration and built-in city presets.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::fetch::{DEFAULT_ENDPOINT, RetryPolicy};

/// Settings for one pipeline invocation.
///
/// The binary fills this from CLI flags and environment variables; library
/// callers can start from [`Default`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub endpoint: String,
    pub radius_meters: u32,
    /// Maximum elements requested per query, 0 = unlimited.
    pub batch_size: usize,
    pub retry_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    /// Client-side HTTP timeout.
    pub http_timeout_secs: u64,
    /// Evaluation timeout sent to Overpass inside the query.
    pub server_timeout_secs: u64,
    pub cache_dir: PathBuf,
    /// Snapshot lifetime; 0 disables the cache.
    pub cache_ttl_secs: u64,
    pub cache_gzip: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            radius_meters: 2000,
            batch_size: 0,
            retry_attempts: 3,
            retry_base_delay_ms: 5_000,
            retry_max_delay_ms: 60_000,
            http_timeout_secs: 120,
            server_timeout_secs: 90,
            cache_dir: PathBuf::from("cache"),
            cache_ttl_secs: 3600,
            cache_gzip: false,
        }
    }
}

impl PipelineConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_attempts,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

/// A named center point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CityPreset {
    pub slug: &'static str,
    pub name: &'static str,
    pub latitude: f64,
    pub longitude: f64,
}

pub const CITY_PRESETS: &[CityPreset] = &[
    CityPreset { slug: "porto", name: "Porto", latitude: 41.1579, longitude: -8.6291 },
    CityPreset { slug: "lisboa", name: "Lisboa", latitude: 38.7223, longitude: -9.1393 },
    CityPreset { slug: "sao_paulo", name: "São Paulo", latitude: -23.5505, longitude: -46.6333 },
    CityPreset { slug: "rio_de_janeiro", name: "Rio de Janeiro", latitude: -22.9068, longitude: -43.1729 },
    CityPreset { slug: "new_york", name: "New York", latitude: 40.7128, longitude: -74.0060 },
    CityPreset { slug: "london", name: "London", latitude: 51.5074, longitude: -0.1278 },
    CityPreset { slug: "tokyo", name: "Tokyo", latitude: 35.6762, longitude: 139.6503 },
];

/// Looks up a preset by slug or display name, ignoring case.
pub fn find_city(query: &str) -> Option<&'static CityPreset> {
    let query = query.trim();
    CITY_PRESETS
        .iter()
        .find(|c| c.slug.eq_ignore_ascii_case(query) || c.name.eq_ignore_ascii_case(query))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.radius_meters, 2000);
        assert_eq!(config.retry_policy().max_attempts, 3);
        assert_eq!(config.retry_policy().base_delay, Duration::from_secs(5));
        assert_eq!(config.cache_ttl(), Duration::from_secs(3600));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"radius_meters": 750, "cache_ttl_secs": 0}"#).unwrap();
        assert_eq!(config.radius_meters, 750);
        assert_eq!(config.cache_ttl(), Duration::ZERO);
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
    }

    #[test]
    fn test_find_city() {
        assert_eq!(find_city("porto").unwrap().name, "Porto");
        assert_eq!(find_city("LONDON").unwrap().slug, "london");
        assert_eq!(find_city("São Paulo").unwrap().slug, "sao_paulo");
        assert!(find_city("atlantis").is_none());
    }
}
