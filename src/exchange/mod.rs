mod csv;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub use csv::{MemberRow, RosterImportReport, RowError, import_roster, parse_roster};

use crate::store::{StorageBackend, Store, TeamMember, Zone};

pub const EXPORT_VERSION: &str = "1.0";

/// The backup file format: a versioned snapshot of the whole state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub version: String,
    #[serde(with = "time::serde::rfc3339")]
    pub exported_at: OffsetDateTime,
    pub team_members: Vec<TeamMember>,
    pub zones: Vec<Zone>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub members: usize,
    pub zones: usize,
}

/// Snapshot the store into an export document.
pub fn export_document<B: StorageBackend>(store: &Store<B>) -> ExportDocument {
    ExportDocument {
        version: EXPORT_VERSION.to_string(),
        exported_at: OffsetDateTime::now_utc(),
        team_members: store.team_members(),
        zones: store.zones(),
    }
}

pub fn export_json<B: StorageBackend>(store: &Store<B>) -> anyhow::Result<String> {
    serde_json::to_string_pretty(&export_document(store)).context("Failed to serialize export")
}

/// Import a backup file, replacing the whole store state.
///
/// The raw document is validated first and rejected as a whole when
/// anything is wrong; every problem is reported in the error and the
/// store is left untouched.
pub fn import_json<B: StorageBackend>(
    store: &Store<B>,
    raw: &str,
) -> anyhow::Result<ImportSummary> {
    let data: serde_json::Value =
        serde_json::from_str(raw).context("import file is not valid JSON")?;

    let problems = validate_document(&data);
    if !problems.is_empty() {
        anyhow::bail!("import rejected:\n{}", problems.join("\n"));
    }

    let members: Vec<TeamMember> = serde_json::from_value(data["teamMembers"].clone())
        .context("import file has malformed team members")?;
    let zones: Vec<Zone> = serde_json::from_value(data["zones"].clone())
        .context("import file has malformed zones")?;

    let summary = ImportSummary {
        members: members.len(),
        zones: zones.len(),
    };
    store.replace_all(members, zones);
    Ok(summary)
}

fn validate_document(data: &serde_json::Value) -> Vec<String> {
    let mut problems = Vec::new();

    let members = match data.get("teamMembers").and_then(|v| v.as_array()) {
        Some(members) => members.as_slice(),
        None => {
            problems.push("missing \"teamMembers\" array".to_string());
            &[]
        }
    };
    for (i, member) in members.iter().enumerate() {
        let entry = i + 1;
        if non_empty_str(member, "id").is_none() {
            problems.push(format!("team member {entry}: missing or empty \"id\""));
        }
        if non_empty_str(member, "name").is_none() {
            problems.push(format!("team member {entry}: missing or empty \"name\""));
        }
    }

    let zones = match data.get("zones").and_then(|v| v.as_array()) {
        Some(zones) => zones.as_slice(),
        None => {
            problems.push("missing \"zones\" array".to_string());
            &[]
        }
    };
    for (i, zone) in zones.iter().enumerate() {
        let entry = i + 1;
        if non_empty_str(zone, "id").is_none() {
            problems.push(format!("zone {entry}: missing or empty \"id\""));
        }
        if non_empty_str(zone, "name").is_none() {
            problems.push(format!("zone {entry}: missing or empty \"name\""));
        }
        let ring_len = zone
            .pointer("/geojson/geometry/coordinates/0")
            .and_then(|ring| ring.as_array())
            .map(|ring| ring.len())
            .unwrap_or(0);
        if ring_len == 0 {
            problems.push(format!("zone {entry}: missing or empty geometry"));
        }
    }

    problems
}

fn non_empty_str<'a>(value: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
}
