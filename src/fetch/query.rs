use crate::model::SearchArea;

/// Node selectors unioned into every stop query.
const STOP_SELECTORS: &[&str] = &[
    r#"["public_transport"="stop_position"]"#,
    r#"["public_transport"="platform"]"#,
    r#"["highway"="bus_stop"]"#,
    r#"["railway"="station"]"#,
    r#"["railway"="halt"]"#,
    r#"["railway"="tram_stop"]"#,
    r#"["amenity"="ferry_terminal"]"#,
];

/// Builds the Overpass QL query for all stop nodes inside `area`.
///
/// `batch_size` caps the number of returned elements; `0` means unlimited.
pub fn build_query(area: &SearchArea, server_timeout_secs: u64, batch_size: usize) -> String {
    let around = format!(
        "(around:{},{},{})",
        area.radius_meters, area.latitude, area.longitude
    );

    let mut query = format!("[out:json][timeout:{server_timeout_secs}];\n(\n");
    for selector in STOP_SELECTORS {
        query.push_str(&format!("  node{selector}{around};\n"));
    }
    query.push_str(");\n");

    if batch_size > 0 {
        query.push_str(&format!("out body {batch_size};\n"));
    } else {
        query.push_str("out body;\n");
    }
    query
}
