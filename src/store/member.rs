use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A geocoded campaign team member. Only the store constructs these;
/// the serde derives exist for the persisted document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamMember {
    pub id: String,
    pub name: String,
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub lat: f64,
    pub lng: f64,
    pub geocode_score: f64,
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
pub struct NewTeamMember {
    pub name: String,
    pub address: String,
    pub phone: Option<String>,
    pub lat: f64,
    pub lng: f64,
    pub geocode_score: f64,
}

#[derive(Debug, Clone, Default)]
pub struct TeamMemberUpdate {
    pub name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<Option<String>>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub geocode_score: Option<f64>,
}
