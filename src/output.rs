//! Output formatting and persistence for stop metrics.
//!
//! Supports pretty-printing, JSON serialization, and CSV append.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::model::{SearchArea, TransportType};
use crate::stats::MetricsSummary;
use csv::WriterBuilder;
use std::fs::OpenOptions;
use std::path::Path;

/// One CSV row per pipeline run.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub timestamp: DateTime<Utc>,
    pub city: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub radius_meters: u32,
    pub total_stops: usize,

    // stops by type
    pub bus: usize,
    pub metro: usize,
    pub tram: usize,
    pub train: usize,
    pub ferry: usize,

    // accessibility
    pub wheelchair_pct: f64,
    pub shelter_pct: f64,
    pub seating_pct: f64,
    pub tactile_paving_pct: f64,

    pub stops_with_routes: usize,
    pub distinct_routes: usize,
    pub density_per_km2: f64,

    // error tracking
    pub error_type: Option<String>,
    pub error_message: Option<String>,
}

impl SummaryRecord {
    pub fn from_summary(summary: &MetricsSummary, area: &SearchArea) -> Self {
        SummaryRecord {
            timestamp: Utc::now(),
            city: None,
            latitude: area.latitude,
            longitude: area.longitude,
            radius_meters: area.radius_meters,
            total_stops: summary.total_stops,
            bus: summary.count(TransportType::Bus),
            metro: summary.count(TransportType::Metro),
            tram: summary.count(TransportType::Tram),
            train: summary.count(TransportType::Train),
            ferry: summary.count(TransportType::Ferry),
            wheelchair_pct: summary.wheelchair.pct,
            shelter_pct: summary.shelter.pct,
            seating_pct: summary.seating.pct,
            tactile_paving_pct: summary.tactile_paving.pct,
            stops_with_routes: summary.routes.stops_with_routes,
            distinct_routes: summary.routes.distinct_routes,
            density_per_km2: summary.density_per_km2(area),
            error_type: None,
            error_message: None,
        }
    }

    /// Create an error record for a failed run.
    pub fn from_error(area: &SearchArea, error_type: &str, error_message: &str) -> Self {
        SummaryRecord {
            timestamp: Utc::now(),
            latitude: area.latitude,
            longitude: area.longitude,
            radius_meters: area.radius_meters,
            error_type: Some(error_type.to_string()),
            error_message: Some(error_message.to_string()),
            ..Default::default()
        }
    }

    pub fn with_city(mut self, city: &str) -> Self {
        self.city = Some(city.to_string());
        self
    }
}

/// Logs a summary using Rust's debug pretty-print format.
pub fn print_pretty(summary: &MetricsSummary) {
    debug!("{:#?}", summary);
}

/// Logs a summary as pretty-printed JSON.
pub fn print_json(summary: &MetricsSummary) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(summary)?);
    Ok(())
}

/// Appends a [`SummaryRecord`] as a row to a CSV file.
///
/// Creates the file with headers if it does not already exist.
pub fn append_record(path: &str, record: &SummaryRecord) -> Result<()> {
    let file_exists = Path::new(path).exists();
    debug!(path, file_exists, "Appending CSV record");

    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists) // IMPORTANT when appending
        .from_writer(file);

    writer.serialize(record)?;
    writer.flush()?;

    Ok(())
}

/// Reads every row back from a summary CSV.
pub fn read_records(path: &str) -> Result<Vec<SummaryRecord>> {
    let mut rdr = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for result in rdr.deserialize() {
        let record: SummaryRecord = result?;
        rows.push(record);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn area() -> SearchArea {
        SearchArea::new(38.7223, -9.1393, 2000).unwrap()
    }

    fn temp_csv(dir: &tempfile::TempDir, name: &str) -> String {
        dir.path().join(name).display().to_string()
    }

    #[test]
    fn test_print_pretty_does_not_panic() {
        print_pretty(&MetricsSummary::default());
    }

    #[test]
    fn test_print_json_does_not_panic() {
        print_json(&MetricsSummary::from_stops(&[])).unwrap();
    }

    #[test]
    fn test_append_record_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_csv(&dir, "create.csv");

        let record = SummaryRecord::from_summary(&MetricsSummary::from_stops(&[]), &area());
        append_record(&path, &record).unwrap();

        assert!(Path::new(&path).exists());
        let content = fs::read_to_string(&path).unwrap();
        assert!(!content.is_empty());
    }

    #[test]
    fn test_append_record_writes_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_csv(&dir, "header.csv");

        let record = SummaryRecord::from_summary(&MetricsSummary::from_stops(&[]), &area());
        append_record(&path, &record).unwrap();
        append_record(&path, &record).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let header_count = content.lines().filter(|l| l.contains("timestamp")).count();
        assert_eq!(header_count, 1);
        assert_eq!(content.lines().count(), 3);
    }

    #[test]
    fn test_records_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_csv(&dir, "rows.csv");

        let ok = SummaryRecord::from_summary(&MetricsSummary::from_stops(&[]), &area())
            .with_city("lisboa");
        let failed = SummaryRecord::from_error(&area(), "fetch_error", "timed out");
        append_record(&path, &ok).unwrap();
        append_record(&path, &failed).unwrap();

        let rows = read_records(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].city.as_deref(), Some("lisboa"));
        assert_eq!(rows[0].error_type, None);
        assert_eq!(rows[1].error_type.as_deref(), Some("fetch_error"));
        assert_eq!(rows[1].radius_meters, 2000);
    }
}
