//! CLI entry point for the urban mobility stop pipeline.
//!
//! Provides subcommands for fetching stops around a point or city preset,
//! listing presets, and summarizing a cached snapshot offline.

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};
use urban_mobility::{
    cache::Snapshot,
    config::{CITY_PRESETS, PipelineConfig, find_city},
    error::FetchError,
    fetch::DEFAULT_ENDPOINT,
    model::SearchArea,
    output::{SummaryRecord, append_record, print_json, print_pretty},
    pipeline::Pipeline,
    stats::MetricsSummary,
};

#[derive(Parser)]
#[command(name = "urban_mobility")]
#[command(about = "Fetch public transport stops from OpenStreetMap and summarize them", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch stops around a point (or city preset) and append a summary row
    Fetch {
        /// Center latitude
        #[arg(long, allow_negative_numbers = true, requires = "lon")]
        lat: Option<f64>,

        /// Center longitude
        #[arg(long, allow_negative_numbers = true, requires = "lat")]
        lon: Option<f64>,

        /// Built-in city preset (see `cities`)
        #[arg(short, long, conflicts_with_all = ["lat", "lon"])]
        preset: Option<String>,

        /// Search radius in meters
        #[arg(short, long, default_value_t = 2000)]
        radius: u32,

        /// City label written to the summary row
        #[arg(long)]
        city: Option<String>,

        /// CSV file to append results to
        #[arg(short, long, default_value = "summary.csv")]
        output: String,

        /// Log the full summary as JSON
        #[arg(long, default_value_t = false)]
        json: bool,

        #[command(flatten)]
        settings: Settings,
    },
    /// List built-in city presets
    Cities,
    /// Summarize a previously cached stop snapshot without network access
    Summarize {
        /// Snapshot file (.json or .json.gz)
        #[arg(value_name = "SNAPSHOT")]
        snapshot: PathBuf,

        /// Log the full summary as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

/// Pipeline tuning, each overridable from the environment.
#[derive(Args)]
struct Settings {
    /// Overpass interpreter endpoint
    #[arg(long, env = "OVERPASS_URL", default_value = DEFAULT_ENDPOINT)]
    endpoint: String,

    /// Total request attempts before giving up
    #[arg(long, env = "UM_RETRY_ATTEMPTS", default_value_t = 3)]
    retry_attempts: u32,

    /// Base backoff delay in milliseconds, doubled per retry
    #[arg(long, env = "UM_RETRY_DELAY_MS", default_value_t = 5_000)]
    retry_delay_ms: u64,

    /// Maximum elements per query (0 = unlimited)
    #[arg(long, env = "UM_BATCH_SIZE", default_value_t = 0)]
    batch_size: usize,

    /// HTTP timeout in seconds
    #[arg(long, env = "UM_HTTP_TIMEOUT_SECS", default_value_t = 120)]
    http_timeout_secs: u64,

    /// Directory for cached stop snapshots
    #[arg(long, env = "UM_CACHE_DIR", default_value = "cache")]
    cache_dir: PathBuf,

    /// Snapshot lifetime in seconds (0 disables the cache)
    #[arg(long, env = "UM_CACHE_TTL_SECS", default_value_t = 3600)]
    cache_ttl_secs: u64,

    /// Gzip compress cached snapshots
    #[arg(long, default_value_t = false)]
    gzip: bool,
}

impl Settings {
    fn into_config(self, radius_meters: u32) -> PipelineConfig {
        PipelineConfig {
            endpoint: self.endpoint,
            radius_meters,
            batch_size: self.batch_size,
            retry_attempts: self.retry_attempts,
            retry_base_delay_ms: self.retry_delay_ms,
            http_timeout_secs: self.http_timeout_secs,
            cache_dir: self.cache_dir,
            cache_ttl_secs: self.cache_ttl_secs,
            cache_gzip: self.gzip,
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/urban_mobility.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("urban_mobility.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Fetch {
            lat,
            lon,
            preset,
            radius,
            city,
            output,
            json,
            settings,
        } => {
            let (latitude, longitude, label) = match (preset, lat, lon) {
                (Some(name), _, _) => {
                    let preset = find_city(&name)
                        .with_context(|| format!("unknown city preset '{name}'"))?;
                    let label = city.unwrap_or_else(|| preset.slug.to_string());
                    (preset.latitude, preset.longitude, Some(label))
                }
                (None, Some(lat), Some(lon)) => (lat, lon, city),
                _ => bail!("either --preset or both --lat and --lon are required"),
            };

            let config = settings.into_config(radius);
            let area = SearchArea::new(latitude, longitude, config.radius_meters)?;
            run_fetch(&config, area, label.as_deref(), &output, json).await?;
        }
        Commands::Cities => {
            for preset in CITY_PRESETS {
                info!(
                    slug = preset.slug,
                    name = preset.name,
                    lat = preset.latitude,
                    lon = preset.longitude,
                    "City preset"
                );
            }
        }
        Commands::Summarize { snapshot, json } => {
            let snapshot = Snapshot::load(&snapshot)?;
            let summary = MetricsSummary::from_stops(&snapshot.stops);
            info!(
                fetched_at = %snapshot.fetched_at,
                total = summary.total_stops,
                density_per_km2 = summary.density_per_km2(&snapshot.area),
                "Snapshot summarized"
            );
            report(&summary, json)?;
        }
    }

    Ok(())
}

/// Runs the pipeline for one area and appends the outcome to `output`,
/// recording an error row when the fetch fails.
#[tracing::instrument(skip(config, json), fields(lat = area.latitude, lon = area.longitude))]
async fn run_fetch(
    config: &PipelineConfig,
    area: SearchArea,
    city: Option<&str>,
    output: &str,
    json: bool,
) -> Result<()> {
    let mut pipeline = Pipeline::from_config(config)?;

    let result = pipeline.run(city, area).await;
    let stats = pipeline.stats();
    info!(
        api_calls = stats.api_calls,
        cache_hits = stats.cache_hits,
        elements_seen = stats.elements_seen,
        stops_processed = stats.stops_processed,
        stops_dropped = stats.stops_dropped,
        success_rate = stats.success_rate(),
        "Pipeline statistics"
    );

    match result {
        Ok(run) => {
            let mut record = SummaryRecord::from_summary(&run.summary, &run.area);
            if let Some(city) = city {
                record = record.with_city(city);
            }
            append_record(output, &record)?;
            report(&run.summary, json)?;
            info!(output, from_cache = run.from_cache, "Summary row written");
            Ok(())
        }
        Err(e) => {
            let kind = e
                .downcast_ref::<FetchError>()
                .map(FetchError::kind)
                .unwrap_or("pipeline_error");
            error!(error = %e, kind, "Pipeline run failed");

            let mut record = SummaryRecord::from_error(&area, kind, &format!("{e:#}"));
            if let Some(city) = city {
                record = record.with_city(city);
            }
            append_record(output, &record)?;
            Err(e)
        }
    }
}

fn report(summary: &MetricsSummary, json: bool) -> Result<()> {
    if json {
        print_json(summary)
    } else {
        print_pretty(summary);
        Ok(())
    }
}
