use anyhow::Context;

use crate::geo::GeoTransport;

pub const COMMUNE_API_URL: &str = "https://geo.api.gouv.fr/communes";

/// Fetch a commune's boundary contour as GeoJSON (WGS84) by INSEE
/// code.
pub async fn fetch_commune_boundary<T: GeoTransport>(
    transport: &T,
    insee_code: &str,
) -> anyhow::Result<serde_json::Value> {
    let url = format!("{COMMUNE_API_URL}/{insee_code}");
    let reply = transport
        .get(&url, &[("format", "geojson"), ("geometry", "contour")])
        .await
        .with_context(|| format!("commune boundary request for {insee_code} failed"))?;
    if !reply.is_success() {
        anyhow::bail!(
            "commune boundary lookup for {insee_code} failed: HTTP {}",
            reply.status
        );
    }
    serde_json::from_str(&reply.body)
        .with_context(|| format!("commune boundary reply for {insee_code} was not JSON"))
}
