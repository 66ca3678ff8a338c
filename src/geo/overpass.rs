use std::time::Duration;

use anyhow::Context;
use tracing::warn;

use crate::geo::GeoTransport;
use crate::models::{GeoBounds, PolygonFeature};

/// Public Overpass endpoints, tried in order.
pub const DEFAULT_ENDPOINTS: [&str; 3] = [
    "https://overpass-api.de/api/interpreter",
    "https://overpass.kumi.systems/api/interpreter",
    "https://maps.mail.ru/osm/tools/overpass/api/interpreter",
];

/// Per-endpoint retry behavior. A failed attempt waits
/// `base_delay * attempt_number` before the next try.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
        }
    }
}

/// Client for OpenStreetMap Overpass queries scoped to a zone polygon.
///
/// Queries run against the bounding box of the polygon's exterior
/// ring. Endpoints are tried in order; server errors and transport
/// failures are retried per the policy, while a 4xx reply moves to the
/// next endpoint immediately.
#[derive(Debug, Clone)]
pub struct OverpassGateway<T> {
    transport: T,
    endpoints: Vec<String>,
    retry: RetryPolicy,
}

impl<T: GeoTransport> OverpassGateway<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            endpoints: DEFAULT_ENDPOINTS.iter().map(|s| s.to_string()).collect(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_endpoints(mut self, endpoints: Vec<String>) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Estimate the number of buildings inside the zone.
    pub async fn count_buildings(&self, feature: &PolygonFeature) -> anyhow::Result<u64> {
        let bbox = bounds_of(feature)?.overpass_bbox();
        let query = format!(
            "\n[out:json][timeout:25];\n(\n  way[\"building\"]({bbox});\n  relation[\"building\"]({bbox});\n);\nout count;\n"
        );
        let data = self.run_query(&query).await?;
        Ok(parse_count(&data))
    }

    /// Named streets of the zone's residential road classes, without
    /// duplicates, in French alphabetical order.
    pub async fn street_names(&self, feature: &PolygonFeature) -> anyhow::Result<Vec<String>> {
        let bbox = bounds_of(feature)?.overpass_bbox();
        let query = format!(
            "\n[out:json][timeout:25];\n(\n  way[\"highway\"~\"^(residential|primary|secondary|tertiary|unclassified|living_street)$\"][\"name\"]({bbox});\n);\nout tags;\n"
        );
        let data = self.run_query(&query).await?;
        let mut names: Vec<String> = data
            .get("elements")
            .and_then(|e| e.as_array())
            .map(|elements| {
                elements
                    .iter()
                    .filter_map(|el| el.pointer("/tags/name"))
                    .filter_map(|name| name.as_str())
                    .map(|name| name.to_string())
                    .collect()
            })
            .unwrap_or_default();
        sort_french(&mut names);
        names.dedup();
        Ok(names)
    }

    /// Send one query through the endpoint rotation, returning the
    /// first JSON reply. Every failed attempt is collected into the
    /// final error when no endpoint answers.
    async fn run_query(&self, query: &str) -> anyhow::Result<serde_json::Value> {
        let mut errors = Vec::new();
        for endpoint in &self.endpoints {
            let mut attempt = 0u32;
            loop {
                attempt += 1;
                match self.transport.post_form(endpoint, &[("data", query)]).await {
                    Ok(reply) if reply.is_success() => {
                        match serde_json::from_str(&reply.body) {
                            Ok(data) => return Ok(data),
                            Err(err) => {
                                warn!(endpoint = %endpoint, error = %err, "Overpass reply was not JSON");
                                errors.push(format!("{endpoint}: invalid JSON: {err}"));
                                break;
                            }
                        }
                    }
                    Ok(reply) if reply.is_client_error() => {
                        warn!(endpoint = %endpoint, status = reply.status, "Overpass rejected the query");
                        errors.push(format!("{endpoint}: HTTP {}", reply.status));
                        break;
                    }
                    Ok(reply) => {
                        warn!(endpoint = %endpoint, status = reply.status, attempt, "Overpass server error");
                        errors.push(format!("{endpoint}: HTTP {}", reply.status));
                    }
                    Err(err) => {
                        warn!(endpoint = %endpoint, error = %err, attempt, "Overpass request failed");
                        errors.push(format!("{endpoint}: {err}"));
                    }
                }
                if attempt > self.retry.max_retries {
                    break;
                }
                tokio::time::sleep(self.retry.base_delay * attempt).await;
            }
        }
        anyhow::bail!("all Overpass endpoints unavailable: {}", errors.join(" | "))
    }
}

fn bounds_of(feature: &PolygonFeature) -> anyhow::Result<GeoBounds> {
    GeoBounds::of_feature(feature).context("zone polygon has no exterior ring")
}

/// Extract the count from an `out count` reply. The total arrives as a
/// tag on the single count element; older servers report `ways`
/// instead, and a reply without tags falls back to the element count.
fn parse_count(data: &serde_json::Value) -> u64 {
    let elements = match data.get("elements").and_then(|e| e.as_array()) {
        Some(elements) => elements,
        None => return 0,
    };
    if let Some(tags) = elements.first().and_then(|el| el.get("tags")) {
        if let Some(total) = numeric_tag(tags, "total").or_else(|| numeric_tag(tags, "ways")) {
            return total;
        }
    }
    elements.len() as u64
}

fn numeric_tag(tags: &serde_json::Value, key: &str) -> Option<u64> {
    match tags.get(key)? {
        serde_json::Value::String(s) => s.parse().ok(),
        serde_json::Value::Number(n) => n.as_u64(),
        _ => None,
    }
}

/// Order strings the way a French street list reads: accents fold to
/// their base letter and case is ignored, with the raw string as a
/// tie-break so the order stays total.
pub(crate) fn sort_french(names: &mut [String]) {
    names.sort_by(|a, b| {
        french_sort_key(a)
            .cmp(&french_sort_key(b))
            .then_with(|| a.cmp(b))
    });
}

fn french_sort_key(s: &str) -> String {
    let mut key = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            'à' | 'â' | 'ä' | 'À' | 'Â' | 'Ä' => key.push('a'),
            'ç' | 'Ç' => key.push('c'),
            'é' | 'è' | 'ê' | 'ë' | 'É' | 'È' | 'Ê' | 'Ë' => key.push('e'),
            'î' | 'ï' | 'Î' | 'Ï' => key.push('i'),
            'ô' | 'ö' | 'Ô' | 'Ö' => key.push('o'),
            'ù' | 'û' | 'ü' | 'Ù' | 'Û' | 'Ü' => key.push('u'),
            'ÿ' | 'Ÿ' => key.push('y'),
            'œ' | 'Œ' => key.push_str("oe"),
            'æ' | 'Æ' => key.push_str("ae"),
            _ => key.extend(c.to_lowercase()),
        }
    }
    key
}
