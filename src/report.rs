use anyhow::Context;

use crate::store::{StorageBackend, Store, Zone};

/// Resolve a zone's assigned member ids to a display string. Ids no
/// longer on the roster are skipped; an empty result reads "Aucun".
pub fn assigned_member_names<B: StorageBackend>(store: &Store<B>, zone: &Zone) -> String {
    let members = store.team_members();
    let names: Vec<&str> = zone
        .assigned_members
        .iter()
        .filter_map(|id| members.iter().find(|m| &m.id == id))
        .map(|m| m.name.as_str())
        .collect();
    if names.is_empty() {
        "Aucun".to_string()
    } else {
        names.join(", ")
    }
}

/// Build the zone report CSV (columns Zone / Rue / Colistiers). The
/// first data row carries the zone name and assignments; remaining
/// rows list the other streets. Output starts with a UTF-8 BOM so
/// spreadsheet tools pick up the encoding.
pub fn zone_report_csv<B: StorageBackend>(
    store: &Store<B>,
    zone: &Zone,
    streets: &[String],
) -> anyhow::Result<String> {
    let member_names = assigned_member_names(store, zone);

    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .from_writer(Vec::new());
    writer
        .write_record(["Zone", "Rue", "Colistiers"])
        .context("Failed to write report header")?;
    match streets.split_first() {
        None => {
            writer
                .write_record([zone.name.as_str(), "", member_names.as_str()])
                .context("Failed to write report row")?;
        }
        Some((first, rest)) => {
            writer
                .write_record([zone.name.as_str(), first.as_str(), member_names.as_str()])
                .context("Failed to write report row")?;
            for street in rest {
                writer
                    .write_record(["", street.as_str(), ""])
                    .context("Failed to write report row")?;
            }
        }
    }

    let bytes = writer.into_inner().context("Failed to finish report")?;
    let body = String::from_utf8(bytes).expect("CSV writer produced UTF-8");
    Ok(format!("\u{feff}{body}"))
}
