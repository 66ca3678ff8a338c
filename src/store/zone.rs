use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::models::PolygonFeature;

/// A canvassing zone. `geojson` is the authoritative geometry; the
/// member ids in `assigned_members` are held by value and may dangle
/// after a member is removed, so readers filter them against the
/// roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Zone {
    pub id: String,
    pub name: String,
    pub geojson: PolygonFeature,
    #[serde(default)]
    pub assigned_members: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mailbox_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub updated_at: Option<OffsetDateTime>,
    #[serde(skip)]
    pub(super) _guard: (),
}

#[derive(Debug, Clone)]
pub struct NewZone {
    pub name: String,
    pub geojson: PolygonFeature,
    pub assigned_members: Vec<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ZoneUpdate {
    pub name: Option<String>,
    pub geojson: Option<PolygonFeature>,
    pub assigned_members: Option<Vec<String>>,
    pub mailbox_count: Option<Option<u64>>,
    pub notes: Option<Option<String>>,
}
