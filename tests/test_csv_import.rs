//! Integration tests for roster CSV import.
//!
//! Tests cover:
//! - Header synonym matching in French and English
//! - BOM and whitespace tolerance
//! - Collecting every row problem before rejecting the file
//! - Append and replace import modes
//! - Skipping rows whose address does not geocode

mod common;

use flyermap::exchange::{import_roster, parse_roster};
use flyermap::geo::Geocoder;

use common::*;

fn test_geocoder(transport: &MockTransport) -> Geocoder<MockTransport> {
    Geocoder::new(transport.clone()).with_base_url("https://geocode.test/search".to_string())
}

#[tokio::test]
async fn test_parse_roster_french_headers() -> anyhow::Result<()> {
    let rows = parse_roster(
        "Nom,Adresse,Telephone\n\
         Alice Martin,1 Rue de la Paix,06 12 34 56 78\n\
         Benoît Durand,2 Avenue de la Gare,\n",
    )?;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].name, "Alice Martin");
    assert_eq!(rows[0].address, "1 Rue de la Paix");
    assert_eq!(rows[0].phone.as_deref(), Some("06 12 34 56 78"));
    assert!(rows[1].phone.is_none(), "empty phone cell reads as absent");

    Ok(())
}

#[tokio::test]
async fn test_parse_roster_english_headers_and_bom() -> anyhow::Result<()> {
    // Headers match case-insensitively and a leading BOM is ignored.
    let rows = parse_roster("\u{feff}NAME,ADDRESS,TEL\nAlice Martin,1 Rue de la Paix,0612345678\n")?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].name, "Alice Martin");
    assert_eq!(rows[0].phone.as_deref(), Some("0612345678"));

    Ok(())
}

#[tokio::test]
async fn test_parse_roster_trims_cells() -> anyhow::Result<()> {
    let rows = parse_roster("name,address\n  Alice Martin  ,  1 Rue de la Paix  \n")?;
    assert_eq!(rows[0].name, "Alice Martin");
    assert_eq!(rows[0].address, "1 Rue de la Paix");

    Ok(())
}

#[tokio::test]
async fn test_parse_roster_requires_name_and_address_columns() -> anyhow::Result<()> {
    let err = parse_roster("address,phone\n1 Rue de la Paix,0612345678\n")
        .expect_err("missing name column should be rejected");
    assert!(err.to_string().contains("\"nom\" or \"name\""));

    let err = parse_roster("name,phone\nAlice Martin,0612345678\n")
        .expect_err("missing address column should be rejected");
    assert!(err.to_string().contains("\"adresse\" or \"address\""));

    Ok(())
}

#[tokio::test]
async fn test_parse_roster_reports_every_bad_row() -> anyhow::Result<()> {
    // Rows 2 and 3 are both broken; both appear in the error.
    let err = parse_roster(
        "name,address\n\
         Alice Martin,1 Rue de la Paix\n\
         ,2 Avenue de la Gare\n\
         Benoît Durand,\n",
    )
    .expect_err("bad rows should be rejected");
    let message = err.to_string();
    assert!(message.contains("roster validation failed"));
    assert!(message.contains("row 2: missing required field: \"nom\" or \"name\""));
    assert!(message.contains("row 3: missing required field: \"adresse\" or \"address\""));

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_import_roster_geocodes_each_row() -> anyhow::Result<()> {
    // 1. Two rows, two geocoding replies
    let (store, _backend) = memory_store().await;
    let transport = MockTransport::new();
    transport.push_reply(200, &geocode_reply(48.8687, 2.3316, "1 Rue de la Paix 75002 Paris", 0.95));
    transport.push_reply(200, &geocode_reply(48.8443, 2.3730, "2 Avenue de la Gare 75012 Paris", 0.88));
    let geocoder = test_geocoder(&transport);

    let report = import_roster(
        &store,
        &geocoder,
        "name,address\nAlice Martin,1 Rue de la Paix\nBenoît Durand,2 Avenue de la Gare\n",
        false,
    )
    .await?;
    assert_eq!(report.added, 2);
    assert_eq!(report.failed, 0);

    // 2. Members carry the geocoded coordinates and score
    let members = store.team_members();
    assert_eq!(members.len(), 2);
    assert_eq!(members[0].name, "Alice Martin");
    assert_eq!(members[0].lat, 48.8687);
    assert_eq!(members[0].lng, 2.3316);
    assert_eq!(members[0].geocode_score, 0.95);

    // 3. One geocoding request per row
    assert_eq!(transport.calls_to("https://geocode.test/search"), 2);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_import_roster_skips_unresolved_addresses() -> anyhow::Result<()> {
    // 1. The second address finds nothing
    let (store, _backend) = memory_store().await;
    let transport = MockTransport::new();
    transport.push_reply(200, &geocode_reply(48.8687, 2.3316, "1 Rue de la Paix", 0.95));
    transport.push_reply(200, r#"{"features":[]}"#);
    let geocoder = test_geocoder(&transport);

    let report = import_roster(
        &store,
        &geocoder,
        "name,address\nAlice Martin,1 Rue de la Paix\nBenoît Durand,Nulle Part\n",
        false,
    )
    .await?;

    // 2. The bad row is counted, not fatal
    assert_eq!(report.added, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(store.team_members().len(), 1);
    assert_eq!(store.team_members()[0].name, "Alice Martin");

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_import_roster_replace_clears_existing() -> anyhow::Result<()> {
    // 1. A pre-existing roster
    let (store, _backend) = memory_store().await;
    store.add_team_member(make_member("Ancien Membre"));

    // 2. Replace mode swaps the roster for the file contents
    let transport = MockTransport::new();
    transport.push_reply(200, &geocode_reply(48.8687, 2.3316, "1 Rue de la Paix", 0.95));
    let geocoder = test_geocoder(&transport);
    let report = import_roster(
        &store,
        &geocoder,
        "name,address\nAlice Martin,1 Rue de la Paix\n",
        true,
    )
    .await?;
    assert_eq!(report.added, 1);

    let members = store.team_members();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].name, "Alice Martin");

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_import_roster_append_keeps_existing() -> anyhow::Result<()> {
    let (store, _backend) = memory_store().await;
    store.add_team_member(make_member("Ancien Membre"));

    let transport = MockTransport::new();
    transport.push_reply(200, &geocode_reply(48.8687, 2.3316, "1 Rue de la Paix", 0.95));
    let geocoder = test_geocoder(&transport);
    import_roster(
        &store,
        &geocoder,
        "name,address\nAlice Martin,1 Rue de la Paix\n",
        false,
    )
    .await?;

    let names: Vec<String> = store.team_members().into_iter().map(|m| m.name).collect();
    assert_eq!(names, vec!["Ancien Membre", "Alice Martin"]);

    Ok(())
}

#[tokio::test]
async fn test_import_roster_rejects_bad_file_before_geocoding() -> anyhow::Result<()> {
    // Validation happens before any network call or roster change.
    let (store, _backend) = memory_store().await;
    store.add_team_member(make_member("Ancien Membre"));
    let transport = MockTransport::new();
    let geocoder = test_geocoder(&transport);

    let result = import_roster(&store, &geocoder, "name,address\n,Nulle Part\n", true).await;
    assert!(result.is_err());
    assert!(transport.calls().is_empty());
    assert_eq!(store.team_members().len(), 1, "replace mode must not have run");

    Ok(())
}
