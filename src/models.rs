use serde::{Deserialize, Serialize};

/// A WGS84 coordinate, longitude first to match the GeoJSON axis order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LngLat {
    pub lng: f64,
    pub lat: f64,
}

/// Axis-aligned envelope of a polygon, in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoBounds {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl GeoBounds {
    /// Compute the envelope of a polygon feature's exterior ring.
    /// Returns None for an empty ring.
    pub fn of_feature(feature: &PolygonFeature) -> Option<Self> {
        let ring = feature.geometry.coordinates.first()?;
        let mut bounds: Option<GeoBounds> = None;
        for &[lng, lat] in ring {
            bounds = Some(match bounds {
                None => GeoBounds {
                    south: lat,
                    west: lng,
                    north: lat,
                    east: lng,
                },
                Some(b) => GeoBounds {
                    south: b.south.min(lat),
                    west: b.west.min(lng),
                    north: b.north.max(lat),
                    east: b.east.max(lng),
                },
            });
        }
        bounds
    }

    /// Format as the `south,west,north,east` string Overpass expects.
    pub fn overpass_bbox(&self) -> String {
        format!("{},{},{},{}", self.south, self.west, self.north, self.east)
    }
}

/// GeoJSON polygon geometry. Coordinates are rings of `[lng, lat]` pairs,
/// the first ring being the exterior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolygonGeometry {
    #[serde(rename = "type")]
    pub kind: String,
    pub coordinates: Vec<Vec<[f64; 2]>>,
}

/// GeoJSON feature wrapping a polygon, the shape zones are stored in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolygonFeature {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub properties: serde_json::Map<String, serde_json::Value>,
    pub geometry: PolygonGeometry,
}

impl PolygonFeature {
    pub fn polygon(exterior: Vec<[f64; 2]>) -> Self {
        Self {
            kind: "Feature".to_string(),
            properties: serde_json::Map::new(),
            geometry: PolygonGeometry {
                kind: "Polygon".to_string(),
                coordinates: vec![exterior],
            },
        }
    }

    pub fn is_polygon(&self) -> bool {
        self.geometry.kind == "Polygon"
    }
}

/// Rotation of marker colors for team members.
pub const MEMBER_COLORS: [&str; 8] = [
    "#e6194b", "#3cb44b", "#4363d8", "#f58231", "#911eb4", "#46f0f0", "#f032e6", "#008080",
];

/// Pick a stable color for the member at the given position in the roster.
pub fn member_color(index: usize) -> &'static str {
    MEMBER_COLORS[index % MEMBER_COLORS.len()]
}
