use super::client::HttpClient;
use async_trait::async_trait;
use std::time::Duration;

/// Identifies us to Overpass operators, who ask clients to send a UA.
pub const USER_AGENT: &str = concat!("urban_mobility/", env!("CARGO_PKG_VERSION"));

pub struct BasicClient(reqwest::Client);

impl BasicClient {
    pub fn new(timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self(client))
    }
}

#[async_trait]
impl HttpClient for BasicClient {
    async fn execute(&self, req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        self.0.execute(req).await
    }
}
