use anyhow::Context;
use tracing::warn;

use crate::geo::{GEOCODE_RATE_DELAY, GeoTransport, Geocoder};
use crate::store::{NewTeamMember, StorageBackend, Store};

/// A normalized roster row, headers already resolved to the standard
/// field names.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberRow {
    pub name: String,
    pub address: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RowError {
    pub row: usize,
    pub field: &'static str,
    pub message: String,
}

impl std::fmt::Display for RowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "row {}: {}", self.row, self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RosterImportReport {
    pub added: usize,
    pub failed: usize,
}

const NAME_HEADERS: [&str; 2] = ["nom", "name"];
const ADDRESS_HEADERS: [&str; 2] = ["adresse", "address"];
const PHONE_HEADERS: [&str; 3] = ["telephone", "phone", "tel"];

/// Parse a roster CSV. Headers are matched case-insensitively against
/// the French and English synonyms; rows with an empty name or address
/// are all reported before anything is imported.
pub fn parse_roster(input: &str) -> anyhow::Result<Vec<MemberRow>> {
    let input = input.strip_prefix('\u{feff}').unwrap_or(input);
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(input.as_bytes());

    let headers = reader.headers().context("CSV has no header row")?.clone();
    let name_col = find_column(&headers, &NAME_HEADERS);
    let address_col = find_column(&headers, &ADDRESS_HEADERS);
    let phone_col = find_column(&headers, &PHONE_HEADERS);

    if name_col.is_none() {
        anyhow::bail!("missing required column: \"nom\" or \"name\"");
    }
    if address_col.is_none() {
        anyhow::bail!("missing required column: \"adresse\" or \"address\"");
    }
    let name_col = name_col.expect("checked above");
    let address_col = address_col.expect("checked above");

    let mut rows = Vec::new();
    let mut errors: Vec<RowError> = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let row = i + 1;
        let record = record.with_context(|| format!("failed to parse CSV row {row}"))?;
        let name = record.get(name_col).unwrap_or("").trim();
        let address = record.get(address_col).unwrap_or("").trim();
        if name.is_empty() {
            errors.push(RowError {
                row,
                field: "name",
                message: "missing required field: \"nom\" or \"name\"".to_string(),
            });
        }
        if address.is_empty() {
            errors.push(RowError {
                row,
                field: "address",
                message: "missing required field: \"adresse\" or \"address\"".to_string(),
            });
        }
        let phone = phone_col
            .and_then(|col| record.get(col))
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| p.to_string());
        rows.push(MemberRow {
            name: name.to_string(),
            address: address.to_string(),
            phone,
        });
    }

    if !errors.is_empty() {
        let listing: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        anyhow::bail!("roster validation failed:\n{}", listing.join("\n"));
    }
    Ok(rows)
}

fn find_column(headers: &csv::StringRecord, synonyms: &[&str]) -> Option<usize> {
    headers.iter().position(|header| {
        let lowered = header.trim().to_lowercase();
        synonyms.contains(&lowered.as_str())
    })
}

/// Import a roster: parse and validate, optionally clear the existing
/// roster, then geocode each row and add the member. A row whose
/// address does not geocode is skipped and counted; the import never
/// aborts over one bad address.
pub async fn import_roster<B: StorageBackend, T: GeoTransport>(
    store: &Store<B>,
    geocoder: &Geocoder<T>,
    input: &str,
    replace_existing: bool,
) -> anyhow::Result<RosterImportReport> {
    let rows = parse_roster(input)?;

    if replace_existing {
        for member in store.team_members() {
            store.remove_team_member(&member.id);
        }
    }

    let mut added = 0usize;
    let mut failed = 0usize;
    for (i, row) in rows.iter().enumerate() {
        match geocoder.geocode(&row.address, None).await {
            Ok(geo) => {
                store.add_team_member(NewTeamMember {
                    name: row.name.clone(),
                    address: row.address.clone(),
                    phone: row.phone.clone(),
                    lat: geo.lat,
                    lng: geo.lng,
                    geocode_score: geo.score,
                });
                added += 1;
            }
            Err(err) => {
                warn!(name = %row.name, error = %err, "geocoding failed, member skipped");
                failed += 1;
            }
        }
        if i < rows.len() - 1 {
            tokio::time::sleep(GEOCODE_RATE_DELAY).await;
        }
    }

    Ok(RosterImportReport { added, failed })
}
