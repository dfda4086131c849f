//! Core data types: transport stops, their accessibility flags, and the
//! geographic area a fetch is scoped to.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

use crate::error::FetchError;

/// Largest search radius accepted by [`SearchArea::new`], in meters.
pub const MAX_RADIUS_METERS: u32 = 50_000;

/// Public transport modes recognized from OpenStreetMap tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportType {
    Bus,
    Metro,
    Tram,
    Train,
    Ferry,
}

impl TransportType {
    pub const ALL: [TransportType; 5] = [
        TransportType::Bus,
        TransportType::Metro,
        TransportType::Tram,
        TransportType::Train,
        TransportType::Ferry,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransportType::Bus => "bus",
            TransportType::Metro => "metro",
            TransportType::Tram => "tram",
            TransportType::Train => "train",
            TransportType::Ferry => "ferry",
        }
    }

    /// Infers the transport mode from an element's tags.
    ///
    /// Explicit stop tags (`highway`, `railway`, `amenity`) win over the
    /// generic `public_transport` platform tagging, which only tells us the
    /// mode through per-mode `bus=yes`, `tram=yes`, ... flags.
    pub fn from_osm_tags(tags: &HashMap<String, String>) -> Option<Self> {
        let tag = |key: &str| tags.get(key).map(String::as_str);

        if tag("highway") == Some("bus_stop") {
            return Some(TransportType::Bus);
        }

        match tag("railway") {
            Some("tram_stop") => return Some(TransportType::Tram),
            Some("halt") => return Some(TransportType::Train),
            Some("station") => {
                let mainline = tag("train") == Some("yes") || tag("station") == Some("train");
                return Some(if mainline {
                    TransportType::Train
                } else {
                    TransportType::Metro
                });
            }
            _ => {}
        }

        if tag("amenity") == Some("ferry_terminal") {
            return Some(TransportType::Ferry);
        }

        if matches!(tag("public_transport"), Some("stop_position" | "platform")) {
            let flagged = |key: &str| tag(key) == Some("yes");
            if flagged("bus") {
                return Some(TransportType::Bus);
            }
            if flagged("tram") {
                return Some(TransportType::Tram);
            }
            if flagged("subway") || flagged("light_rail") {
                return Some(TransportType::Metro);
            }
            if flagged("train") {
                return Some(TransportType::Train);
            }
            if flagged("ferry") {
                return Some(TransportType::Ferry);
            }
        }

        None
    }
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tri-state accessibility attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    Yes,
    No,
    #[default]
    Unknown,
}

impl Availability {
    /// `designated` counts as yes and `limited` as no; anything else the
    /// mappers wrote is treated as unknown.
    pub fn from_tag(value: Option<&str>) -> Self {
        let Some(value) = value else {
            return Availability::Unknown;
        };
        match value.trim().to_ascii_lowercase().as_str() {
            "yes" | "designated" => Availability::Yes,
            "no" | "limited" => Availability::No,
            _ => Availability::Unknown,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Availability::Unknown)
    }
}

/// A public transport boarding point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportStop {
    pub id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub transport_type: TransportType,
    pub operator: Option<String>,
    pub network: Option<String>,
    pub reference: Option<String>,
    pub wheelchair: Availability,
    pub shelter: Availability,
    pub seating: Availability,
    pub tactile_paving: Availability,
    pub routes: BTreeSet<String>,
}

impl TransportStop {
    /// Great-circle distance to `(latitude, longitude)` in meters.
    pub fn distance_meters(&self, latitude: f64, longitude: f64) -> f64 {
        haversine::distance(
            haversine::Location {
                latitude: self.latitude,
                longitude: self.longitude,
            },
            haversine::Location {
                latitude,
                longitude,
            },
            haversine::Units::Kilometers,
        ) * 1000.0
    }
}

/// Returns true when both coordinates are finite and inside WGS84 bounds.
pub fn valid_coordinates(latitude: f64, longitude: f64) -> bool {
    latitude.is_finite()
        && longitude.is_finite()
        && (-90.0..=90.0).contains(&latitude)
        && (-180.0..=180.0).contains(&longitude)
}

/// Center point and radius of a stop search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchArea {
    pub latitude: f64,
    pub longitude: f64,
    pub radius_meters: u32,
}

impl SearchArea {
    pub fn new(latitude: f64, longitude: f64, radius_meters: u32) -> Result<Self, FetchError> {
        if !valid_coordinates(latitude, longitude) {
            return Err(FetchError::InvalidArea(format!(
                "coordinates out of range: ({latitude}, {longitude})"
            )));
        }
        if radius_meters == 0 || radius_meters > MAX_RADIUS_METERS {
            return Err(FetchError::InvalidArea(format!(
                "radius must be between 1 and {MAX_RADIUS_METERS} meters, got {radius_meters}"
            )));
        }
        Ok(Self {
            latitude,
            longitude,
            radius_meters,
        })
    }

    /// Area of the search circle in square kilometers.
    pub fn area_km2(&self) -> f64 {
        let radius_km = self.radius_meters as f64 / 1000.0;
        std::f64::consts::PI * radius_km * radius_km
    }

    pub fn contains(&self, stop: &TransportStop) -> bool {
        stop.distance_meters(self.latitude, self.longitude) <= self.radius_meters as f64
    }

    /// Stable identifier used to key cached snapshots.
    pub fn cache_key(&self) -> String {
        format!(
            "{:.5}_{:.5}_{}",
            self.latitude, self.longitude, self.radius_meters
        )
    }
}
