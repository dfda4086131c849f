//! Overpass stop fetcher with bounded retry.

mod basic;
mod client;
mod query;
mod retry;

pub use basic::{BasicClient, USER_AGENT};
pub use client::HttpClient;
pub use query::build_query;
pub use retry::RetryPolicy;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::error::{FetchError, is_transient_status, is_transient_transport};
use crate::model::{SearchArea, TransportStop};
use crate::parser::{OverpassResponse, ParseOutcome, parse_response, stops_from_response};

pub const DEFAULT_ENDPOINT: &str = "https://overpass-api.de/api/interpreter";

/// Longest error body we keep when Overpass rejects a query.
const MAX_ERROR_BODY: usize = 512;

/// Result of a single request against Overpass.
enum Attempt {
    Done(OverpassResponse),
    Retry {
        reason: String,
        retry_after: Option<Duration>,
    },
    Fail(FetchError),
}

/// Fetches transport stops around a point from an Overpass endpoint.
pub struct OverpassFetcher<C> {
    client: C,
    endpoint: reqwest::Url,
    retry: RetryPolicy,
    server_timeout_secs: u64,
    batch_size: usize,
}

impl<C: HttpClient> OverpassFetcher<C> {
    pub fn new(client: C, endpoint: &str) -> Result<Self, FetchError> {
        let endpoint = endpoint
            .parse()
            .map_err(|e| FetchError::Request(format!("invalid endpoint '{endpoint}': {e}")))?;

        Ok(Self {
            client,
            endpoint,
            retry: RetryPolicy::default(),
            server_timeout_secs: 90,
            batch_size: 0,
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Maximum elements per query; `0` leaves the result unbounded.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Server-side evaluation timeout written into the query header.
    pub fn with_server_timeout(mut self, secs: u64) -> Self {
        self.server_timeout_secs = secs;
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Returns only the stops found inside `area`.
    pub async fn fetch_stops(&self, area: &SearchArea) -> Result<Vec<TransportStop>, FetchError> {
        Ok(self.fetch(area).await?.stops)
    }

    /// Queries Overpass for `area`, retrying transient failures.
    ///
    /// # Errors
    ///
    /// [`FetchError::Exhausted`] once the retry budget is spent,
    /// [`FetchError::Rejected`] for non-retryable statuses and
    /// [`FetchError::Decode`] for bodies that are not Overpass JSON.
    #[tracing::instrument(
        skip(self, area),
        fields(lat = area.latitude, lon = area.longitude, radius = area.radius_meters)
    )]
    pub async fn fetch(&self, area: &SearchArea) -> Result<ParseOutcome, FetchError> {
        let query = build_query(area, self.server_timeout_secs, self.batch_size);
        let attempts = self.retry.attempts();
        let mut last = String::from("no attempt made");

        for attempt in 0..attempts {
            debug!(attempt = attempt + 1, max_attempts = attempts, "Querying Overpass");

            match self.attempt(&query).await {
                Attempt::Done(response) => {
                    let elements = response.elements.len();
                    let outcome = stops_from_response(&response, area);
                    info!(
                        elements,
                        stops = outcome.stops.len(),
                        dropped = outcome.dropped,
                        "Overpass query complete"
                    );
                    return Ok(outcome);
                }
                Attempt::Fail(e) => {
                    error!(error = %e, kind = e.kind(), "Overpass query failed");
                    return Err(e);
                }
                Attempt::Retry {
                    reason,
                    retry_after,
                } => {
                    warn!(attempt = attempt + 1, %reason, "Transient Overpass failure");
                    if attempt + 1 < attempts {
                        let delay = self.retry.delay_for(attempt, retry_after);
                        debug!(delay_ms = delay.as_millis() as u64, "Backing off");
                        tokio::time::sleep(delay).await;
                    }
                    last = reason;
                }
            }
        }

        error!(attempts, last = %last, "Overpass retry budget exhausted");
        Err(FetchError::Exhausted { attempts, last })
    }

    async fn attempt(&self, query: &str) -> Attempt {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair("data", query);
        let req = reqwest::Request::new(reqwest::Method::GET, url);

        let resp = match self.client.execute(req).await {
            Ok(resp) => resp,
            Err(e) if is_transient_transport(&e) => {
                return Attempt::Retry {
                    reason: e.to_string(),
                    retry_after: None,
                };
            }
            Err(e) => return Attempt::Fail(FetchError::Request(e.to_string())),
        };

        let status = resp.status();
        if !status.is_success() {
            let retry_after = retry_after(resp.headers());
            let mut body = resp.text().await.unwrap_or_default();
            body.truncate(floor_char_boundary(&body, MAX_ERROR_BODY));

            return if is_transient_status(status) {
                Attempt::Retry {
                    reason: format!("HTTP {status}"),
                    retry_after,
                }
            } else {
                Attempt::Fail(FetchError::Rejected { status, body })
            };
        }

        let bytes = match resp.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                return Attempt::Retry {
                    reason: e.to_string(),
                    retry_after: None,
                };
            }
        };

        match parse_response(&bytes) {
            Ok(response) if response.is_runtime_error() => Attempt::Retry {
                reason: response.remark.unwrap_or_default(),
                retry_after: None,
            },
            Ok(response) => Attempt::Done(response),
            Err(e) => Attempt::Fail(e),
        }
    }
}

/// `Retry-After` in delta-seconds form; HTTP dates are ignored.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn floor_char_boundary(s: &str, max: usize) -> usize {
    if s.len() <= max {
        return s.len();
    }
    (0..=max).rev().find(|&i| s.is_char_boundary(i)).unwrap_or(0)
}
