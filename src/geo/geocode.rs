use std::time::Duration;

use anyhow::Context;
use tracing::warn;

use crate::geo::GeoTransport;

const DEFAULT_BASE_URL: &str = "https://data.geopf.fr/geocodage/search";

/// The address API allows 50 req/s; batches pause this long between
/// requests.
pub const GEOCODE_RATE_DELAY: Duration = Duration::from_millis(20);

/// Coordinate envelope of metropolitan France, used to flag suspicious
/// geocoding results.
pub const FRANCE_BOUNDS: (f64, f64, f64, f64) = (41.0, 51.0, -5.0, 10.0);

#[derive(Debug, Clone, PartialEq)]
pub struct GeocodeResult {
    pub lat: f64,
    pub lng: f64,
    pub label: String,
    pub score: f64,
}

#[derive(Debug, Clone)]
pub struct GeocodeRequest {
    pub address: String,
    pub postcode: Option<String>,
}

/// Client for the national address search API.
#[derive(Debug, Clone)]
pub struct Geocoder<T> {
    transport: T,
    base_url: String,
}

impl<T: GeoTransport> Geocoder<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    /// Resolve one address to coordinates. Results outside France are
    /// logged but still returned, since the caller may be geocoding a
    /// border address.
    pub async fn geocode(
        &self,
        address: &str,
        postcode: Option<&str>,
    ) -> anyhow::Result<GeocodeResult> {
        let mut query: Vec<(&str, &str)> =
            vec![("q", address), ("limit", "1"), ("index", "address")];
        if let Some(postcode) = postcode {
            query.push(("postcode", postcode));
        }

        let reply = self
            .transport
            .get(&self.base_url, &query)
            .await
            .context("geocoding request failed")?;
        if !reply.is_success() {
            anyhow::bail!("geocoding failed: HTTP {}", reply.status);
        }

        let data: serde_json::Value =
            serde_json::from_str(&reply.body).context("geocoding reply was not JSON")?;
        let feature = data
            .pointer("/features/0")
            .context("address not found")?;
        let coords = feature
            .pointer("/geometry/coordinates")
            .and_then(|c| c.as_array())
            .context("geocoding reply missing coordinates")?;
        // GeoJSON order is [lng, lat].
        let lng = coords
            .first()
            .and_then(|v| v.as_f64())
            .context("geocoding reply missing longitude")?;
        let lat = coords
            .get(1)
            .and_then(|v| v.as_f64())
            .context("geocoding reply missing latitude")?;

        if !is_in_france(lat, lng) {
            warn!(lat, lng, address, "coordinates outside France bounds");
        }

        let label = feature
            .pointer("/properties/label")
            .and_then(|v| v.as_str())
            .unwrap_or(address)
            .to_string();
        let score = feature
            .pointer("/properties/score")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0);

        Ok(GeocodeResult {
            lat,
            lng,
            label,
            score,
        })
    }

    /// Geocode a batch, one request at a time with the polite delay
    /// between them. A failed address becomes a failed entry in the
    /// result list; the batch itself never aborts.
    pub async fn geocode_batch(
        &self,
        requests: &[GeocodeRequest],
    ) -> Vec<anyhow::Result<GeocodeResult>> {
        let mut results = Vec::with_capacity(requests.len());
        for (i, request) in requests.iter().enumerate() {
            let result = self
                .geocode(&request.address, request.postcode.as_deref())
                .await;
            if let Err(err) = &result {
                warn!(address = %request.address, error = %err, "geocoding failed");
            }
            results.push(result);
            if i < requests.len() - 1 {
                tokio::time::sleep(GEOCODE_RATE_DELAY).await;
            }
        }
        results
    }
}

fn is_in_france(lat: f64, lng: f64) -> bool {
    let (lat_min, lat_max, lng_min, lng_max) = FRANCE_BOUNDS;
    lat >= lat_min && lat <= lat_max && lng >= lng_min && lng <= lng_max
}
