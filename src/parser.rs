//! JSON parser for Overpass API responses.

use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, trace};

use crate::error::FetchError;
use crate::model::{Availability, SearchArea, TransportStop, TransportType, valid_coordinates};

/// Top-level Overpass `[out:json]` document.
///
/// Elements are kept as raw JSON so that one malformed element cannot fail
/// the whole batch.
#[derive(Debug, Default, Deserialize)]
pub struct OverpassResponse {
    #[serde(default)]
    pub elements: Vec<serde_json::Value>,
    /// Set by Overpass when the query hit a runtime error (timeout, memory).
    #[serde(default)]
    pub remark: Option<String>,
}

impl OverpassResponse {
    /// A runtime error remark with no data is Overpass's way of reporting
    /// an overloaded server inside a 200 response.
    pub fn is_runtime_error(&self) -> bool {
        self.elements.is_empty()
            && self
                .remark
                .as_deref()
                .is_some_and(|r| r.contains("runtime error"))
    }
}

#[derive(Debug, Deserialize)]
struct RawElement {
    #[serde(rename = "type")]
    kind: String,
    id: u64,
    lat: Option<f64>,
    lon: Option<f64>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

/// Stops kept from a response plus the number of elements discarded.
#[derive(Debug, Default)]
pub struct ParseOutcome {
    pub stops: Vec<TransportStop>,
    pub dropped: usize,
}

/// Decodes an Overpass JSON body.
///
/// # Errors
///
/// Returns [`FetchError::Decode`] if the bytes are not a JSON object.
pub fn parse_response(bytes: &[u8]) -> Result<OverpassResponse, FetchError> {
    serde_json::from_slice(bytes).map_err(|e| FetchError::decode(e.to_string()))
}

/// Converts raw elements into stops, dropping anything malformed,
/// unrecognized, or outside `area`.
pub fn stops_from_response(response: &OverpassResponse, area: &SearchArea) -> ParseOutcome {
    let mut outcome = ParseOutcome::default();
    let mut seen = BTreeSet::new();

    for value in &response.elements {
        let Some(stop) = stop_from_element(value) else {
            outcome.dropped += 1;
            continue;
        };

        if !area.contains(&stop) {
            trace!(id = %stop.id, "Stop outside search radius");
            outcome.dropped += 1;
            continue;
        }

        // Stop ids are unique in the output.
        if !seen.insert(stop.id.clone()) {
            outcome.dropped += 1;
            continue;
        }

        outcome.stops.push(stop);
    }

    debug!(
        kept = outcome.stops.len(),
        dropped = outcome.dropped,
        "Parsed Overpass elements"
    );
    outcome
}

/// Builds a single stop from a raw element, or `None` if it doesn't qualify.
pub fn stop_from_element(value: &serde_json::Value) -> Option<TransportStop> {
    let element = RawElement::deserialize(value).ok()?;
    if element.kind != "node" {
        return None;
    }

    let (latitude, longitude) = (element.lat?, element.lon?);
    if !valid_coordinates(latitude, longitude) {
        return None;
    }

    let tags = element.tags;
    let transport_type = TransportType::from_osm_tags(&tags)?;
    let tag = |key: &str| tags.get(key).map(String::as_str);
    let owned = |key: &str| {
        tag(key)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    Some(TransportStop {
        id: element.id.to_string(),
        name: owned("name").unwrap_or_else(|| "Unnamed Stop".to_string()),
        latitude,
        longitude,
        transport_type,
        operator: owned("operator"),
        network: owned("network"),
        reference: owned("ref"),
        wheelchair: Availability::from_tag(tag("wheelchair")),
        shelter: Availability::from_tag(tag("shelter")),
        seating: Availability::from_tag(tag("bench")),
        tactile_paving: Availability::from_tag(tag("tactile_paving")),
        routes: extract_routes(&tags),
    })
}

/// Collects route identifiers from `lines` (`"107M;177H;178"`) and any
/// `*route*` key such as `route_ref`.
pub fn extract_routes(tags: &HashMap<String, String>) -> BTreeSet<String> {
    tags.iter()
        .filter(|(key, _)| *key == "lines" || key.to_lowercase().contains("route"))
        .flat_map(|(_, value)| value.split(';'))
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string)
        .collect()
}
