mod commune;
mod geocode;
mod overpass;

use std::time::Duration;

use anyhow::Context;

pub use commune::{COMMUNE_API_URL, fetch_commune_boundary};
pub use geocode::{FRANCE_BOUNDS, GEOCODE_RATE_DELAY, GeocodeRequest, GeocodeResult, Geocoder};
pub use overpass::{DEFAULT_ENDPOINTS, OverpassGateway, RetryPolicy};

/// Raw reply from a geo service: HTTP status plus body text. Status
/// interpretation is left to the gateway so retry policy stays in one
/// place.
#[derive(Debug, Clone)]
pub struct TransportReply {
    pub status: u16,
    pub body: String,
}

impl TransportReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }
}

/// HTTP seam for the geo gateways. Tests script replies through this
/// trait instead of reaching the network.
pub trait GeoTransport: Send + Sync + 'static {
    fn get(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> impl Future<Output = anyhow::Result<TransportReply>> + Send;

    fn post_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
    ) -> impl Future<Output = anyhow::Result<TransportReply>> + Send;
}

/// Overpass imposes a 25 s server-side timeout; the client allows the
/// same before giving up on a request.
const HTTP_TIMEOUT: Duration = Duration::from_secs(25);

/// Production transport over a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }
}

impl GeoTransport for HttpTransport {
    async fn get(&self, url: &str, query: &[(&str, &str)]) -> anyhow::Result<TransportReply> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .with_context(|| format!("GET {url} failed"))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .with_context(|| format!("Failed to read response body from {url}"))?;
        Ok(TransportReply { status, body })
    }

    async fn post_form(&self, url: &str, form: &[(&str, &str)]) -> anyhow::Result<TransportReply> {
        let response = self
            .client
            .post(url)
            .form(form)
            .send()
            .await
            .with_context(|| format!("POST {url} failed"))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .with_context(|| format!("Failed to read response body from {url}"))?;
        Ok(TransportReply { status, body })
    }
}
