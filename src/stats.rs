use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::model::{Availability, SearchArea, TransportStop, TransportType};

/// Tally of one tri-state accessibility flag across a set of stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FlagStats {
    pub yes: usize,
    pub no: usize,
    pub unknown: usize,
    /// Share of `yes` among stops where the flag is known, 0–100.
    pub pct: f64,
}

impl FlagStats {
    fn tally<F>(stops: &[TransportStop], flag: F) -> Self
    where
        F: Fn(&TransportStop) -> Availability,
    {
        let mut s = FlagStats::default();
        for stop in stops {
            match flag(stop) {
                Availability::Yes => s.yes += 1,
                Availability::No => s.no += 1,
                Availability::Unknown => s.unknown += 1,
            }
        }
        s.pct = MetricsSummary::pct(s.yes, s.yes + s.no);
        s
    }

    pub fn known(&self) -> usize {
        self.yes + self.no
    }
}

/// Route information coverage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteCoverage {
    /// Stops serving at least one route.
    pub stops_with_routes: usize,
    pub distinct_routes: usize,
    pub pct: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub total_stops: usize,
    pub by_type: BTreeMap<TransportType, usize>,
    pub wheelchair: FlagStats,
    pub shelter: FlagStats,
    pub seating: FlagStats,
    pub tactile_paving: FlagStats,
    pub routes: RouteCoverage,
}

impl MetricsSummary {
    /// Summarizes `stops`. Pure: the same input always yields the same summary.
    pub fn from_stops(stops: &[TransportStop]) -> Self {
        let mut by_type: BTreeMap<TransportType, usize> =
            TransportType::ALL.iter().map(|t| (*t, 0)).collect();
        let mut distinct = BTreeSet::new();
        let mut stops_with_routes = 0;

        for stop in stops {
            *by_type.entry(stop.transport_type).or_default() += 1;

            if !stop.routes.is_empty() {
                stops_with_routes += 1;
                distinct.extend(stop.routes.iter().map(String::as_str));
            }
        }

        MetricsSummary {
            total_stops: stops.len(),
            by_type,
            wheelchair: FlagStats::tally(stops, |s| s.wheelchair),
            shelter: FlagStats::tally(stops, |s| s.shelter),
            seating: FlagStats::tally(stops, |s| s.seating),
            tactile_paving: FlagStats::tally(stops, |s| s.tactile_paving),
            routes: RouteCoverage {
                stops_with_routes,
                distinct_routes: distinct.len(),
                pct: Self::pct(stops_with_routes, stops.len()),
            },
        }
    }

    /// Percentage rounded to two decimals; zero when `total` is zero.
    pub fn pct(part: usize, total: usize) -> f64 {
        if total == 0 {
            0.0
        } else {
            round2((part as f64 / total as f64) * 100.0)
        }
    }

    pub fn count(&self, transport_type: TransportType) -> usize {
        self.by_type.get(&transport_type).copied().unwrap_or(0)
    }

    /// Stops per square kilometer of the search circle.
    pub fn density_per_km2(&self, area: &SearchArea) -> f64 {
        let km2 = area.area_km2();
        if km2 <= 0.0 {
            0.0
        } else {
            round2(self.total_stops as f64 / km2)
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
