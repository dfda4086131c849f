//! On-disk snapshots of fetched stops, served back while younger than a TTL.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::model::{SearchArea, TransportStop};

/// What gets written for one search area.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub fetched_at: DateTime<Utc>,
    pub area: SearchArea,
    pub stops: Vec<TransportStop>,
}

impl Snapshot {
    pub fn new(area: SearchArea, stops: Vec<TransportStop>) -> Self {
        Self {
            fetched_at: Utc::now(),
            area,
            stops,
        }
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.fetched_at).to_std().unwrap_or(Duration::ZERO)
    }

    /// Reads a snapshot file, gzip or plain JSON depending on extension.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let json = if path.extension().and_then(|e| e.to_str()) == Some("gz") {
            let mut decoded = Vec::new();
            GzDecoder::new(raw.as_slice()).read_to_end(&mut decoded)?;
            decoded
        } else {
            raw
        };
        serde_json::from_slice(&json).with_context(|| format!("decoding {}", path.display()))
    }
}

pub struct SnapshotCache {
    dir: PathBuf,
    ttl: Duration,
    gzip: bool,
}

impl SnapshotCache {
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration, gzip: bool) -> Self {
        Self {
            dir: dir.into(),
            ttl,
            gzip,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    pub fn path_for(&self, area: &SearchArea) -> PathBuf {
        let ext = if self.gzip { "json.gz" } else { "json" };
        self.dir.join(format!("{}.{ext}", area.cache_key()))
    }

    /// Returns cached stops for `area` if a fresh snapshot exists.
    ///
    /// Unreadable or stale snapshots count as a miss.
    #[tracing::instrument(level = "debug", skip(self, area), fields(key = %area.cache_key()))]
    pub fn get(&self, area: &SearchArea) -> Option<Snapshot> {
        if !self.is_enabled() {
            return None;
        }

        let path = self.path_for(area);
        if !path.exists() {
            debug!("Snapshot not found");
            return None;
        }

        let snapshot = match Snapshot::load(&path) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable snapshot");
                return None;
            }
        };

        let age = snapshot.age(Utc::now());
        if age < self.ttl {
            debug!(age_secs = age.as_secs(), "Snapshot found and still fresh");
            Some(snapshot)
        } else {
            debug!(age_secs = age.as_secs(), "Snapshot found but expired");
            None
        }
    }

    /// Writes a snapshot for its area, creating the cache directory if needed.
    #[tracing::instrument(level = "debug", skip(self, snapshot), fields(stops = snapshot.stops.len()))]
    pub fn put(&self, snapshot: &Snapshot) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating cache dir {}", self.dir.display()))?;

        let path = self.path_for(&snapshot.area);
        let json = serde_json::to_vec(snapshot)?;

        let body = if self.gzip {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&json)?;
            encoder.finish()?
        } else {
            json
        };

        fs::write(&path, body).with_context(|| format!("writing {}", path.display()))?;
        debug!(path = %path.display(), "Snapshot written");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Availability, TransportType};
    use std::collections::BTreeSet;

    fn area() -> SearchArea {
        SearchArea::new(51.5074, -0.1278, 1000).unwrap()
    }

    fn stops() -> Vec<TransportStop> {
        vec![TransportStop {
            id: "100".to_string(),
            name: "Charing Cross".to_string(),
            latitude: 51.5080,
            longitude: -0.1247,
            transport_type: TransportType::Train,
            operator: Some("Network Rail".to_string()),
            network: None,
            reference: None,
            wheelchair: Availability::Yes,
            shelter: Availability::Unknown,
            seating: Availability::Unknown,
            tactile_paving: Availability::No,
            routes: BTreeSet::new(),
        }]
    }

    #[test]
    fn test_put_then_get_plain() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SnapshotCache::new(dir.path(), Duration::from_secs(3600), false);

        let path = cache.put(&Snapshot::new(area(), stops())).unwrap();
        assert!(path.to_string_lossy().ends_with(".json"));

        let cached = cache.get(&area()).unwrap();
        assert_eq!(cached.stops, stops());
    }

    #[test]
    fn test_put_then_get_gzip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SnapshotCache::new(dir.path(), Duration::from_secs(3600), true);

        let path = cache.put(&Snapshot::new(area(), stops())).unwrap();
        assert!(path.to_string_lossy().ends_with(".json.gz"));
        assert_eq!(cache.get(&area()).unwrap().stops.len(), 1);
    }

    #[test]
    fn test_expired_snapshot_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SnapshotCache::new(dir.path(), Duration::from_secs(60), false);

        let mut snapshot = Snapshot::new(area(), stops());
        snapshot.fetched_at = Utc::now() - chrono::Duration::minutes(5);
        cache.put(&snapshot).unwrap();

        assert!(cache.get(&area()).is_none());
    }

    #[test]
    fn test_zero_ttl_disables_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SnapshotCache::new(dir.path(), Duration::ZERO, false);
        cache.put(&Snapshot::new(area(), stops())).unwrap();
        assert!(!cache.is_enabled());
        assert!(cache.get(&area()).is_none());
    }

    #[test]
    fn test_corrupt_snapshot_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SnapshotCache::new(dir.path(), Duration::from_secs(60), false);
        fs::write(cache.path_for(&area()), b"not json").unwrap();
        assert!(cache.get(&area()).is_none());
    }

    #[test]
    fn test_other_area_misses() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SnapshotCache::new(dir.path(), Duration::from_secs(3600), false);
        cache.put(&Snapshot::new(area(), stops())).unwrap();

        let elsewhere = SearchArea::new(51.5074, -0.1278, 1500).unwrap();
        assert!(cache.get(&elsewhere).is_none());
    }
}
