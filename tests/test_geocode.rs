//! Integration tests for address geocoding and commune boundaries.
//!
//! Tests cover:
//! - Query parameters sent to the address API
//! - Coordinate axis order in replies
//! - Label and score defaults
//! - Error reporting for HTTP failures and unknown addresses
//! - Batch geocoding with per-entry failures
//! - Commune boundary lookup by INSEE code

mod common;

use flyermap::geo::{GeocodeRequest, Geocoder, fetch_commune_boundary};

use common::*;

fn test_geocoder(transport: &MockTransport) -> Geocoder<MockTransport> {
    Geocoder::new(transport.clone()).with_base_url("https://geocode.test/search".to_string())
}

#[tokio::test]
async fn test_geocode_sends_expected_query() -> anyhow::Result<()> {
    // 1. Resolve one address with a postcode filter
    let transport = MockTransport::new();
    transport.push_reply(200, &geocode_reply(48.8687, 2.3316, "1 Rue de la Paix 75002 Paris", 0.95));
    let geocoder = test_geocoder(&transport);
    let result = geocoder.geocode("1 Rue de la Paix", Some("75002")).await?;

    // 2. Coordinates come back lat/lng despite the GeoJSON lng/lat
    //    wire order
    assert_eq!(result.lat, 48.8687);
    assert_eq!(result.lng, 2.3316);
    assert_eq!(result.label, "1 Rue de la Paix 75002 Paris");
    assert_eq!(result.score, 0.95);

    // 3. The request asked for a single address-index match
    let calls = transport.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].method, "GET");
    assert_eq!(calls[0].url, "https://geocode.test/search");
    assert_eq!(
        calls[0].params,
        vec![
            ("q".to_string(), "1 Rue de la Paix".to_string()),
            ("limit".to_string(), "1".to_string()),
            ("index".to_string(), "address".to_string()),
            ("postcode".to_string(), "75002".to_string()),
        ]
    );

    Ok(())
}

#[tokio::test]
async fn test_geocode_defaults_label_and_score() -> anyhow::Result<()> {
    // A minimal feature without properties still resolves.
    let transport = MockTransport::new();
    transport.push_reply(
        200,
        r#"{"features":[{"geometry":{"coordinates":[2.3316,48.8687]}}]}"#,
    );
    let geocoder = test_geocoder(&transport);
    let result = geocoder.geocode("1 Rue de la Paix", None).await?;
    assert_eq!(result.label, "1 Rue de la Paix");
    assert_eq!(result.score, 0.0);

    Ok(())
}

#[tokio::test]
async fn test_geocode_outside_france_still_returns() -> anyhow::Result<()> {
    // Coordinates outside the envelope are logged, not rejected.
    let transport = MockTransport::new();
    transport.push_reply(200, &geocode_reply(52.5200, 13.4050, "Berlin", 0.4));
    let geocoder = test_geocoder(&transport);
    let result = geocoder.geocode("Berlin", None).await?;
    assert_eq!(result.lat, 52.52);

    Ok(())
}

#[tokio::test]
async fn test_geocode_error_paths() -> anyhow::Result<()> {
    // 1. HTTP failure
    let transport = MockTransport::new();
    transport.push_reply(500, "boom");
    let geocoder = test_geocoder(&transport);
    let err = geocoder
        .geocode("1 Rue de la Paix", None)
        .await
        .expect_err("server error should fail");
    assert!(err.to_string().contains("HTTP 500"));

    // 2. No match for the address
    let transport = MockTransport::new();
    transport.push_reply(200, r#"{"features":[]}"#);
    let geocoder = test_geocoder(&transport);
    let err = geocoder
        .geocode("Nulle Part", None)
        .await
        .expect_err("empty feature list should fail");
    assert!(format!("{err:#}").contains("address not found"));

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_geocode_batch_keeps_going_after_failure() -> anyhow::Result<()> {
    // 1. Three requests, the middle one failing
    let transport = MockTransport::new();
    transport.push_reply(200, &geocode_reply(48.8687, 2.3316, "1 Rue de la Paix", 0.95));
    transport.push_failure("connection refused");
    transport.push_reply(200, &geocode_reply(48.8443, 2.3730, "2 Avenue de la Gare", 0.88));
    let geocoder = test_geocoder(&transport);

    let requests = vec![
        GeocodeRequest {
            address: "1 Rue de la Paix".to_string(),
            postcode: None,
        },
        GeocodeRequest {
            address: "Injoignable".to_string(),
            postcode: None,
        },
        GeocodeRequest {
            address: "2 Avenue de la Gare".to_string(),
            postcode: Some("75012".to_string()),
        },
    ];
    let results = geocoder.geocode_batch(&requests).await;

    // 2. Each entry keeps its own outcome, in order
    assert_eq!(results.len(), 3);
    assert!(results[0].is_ok());
    assert!(results[1].is_err());
    assert_eq!(results[2].as_ref().unwrap().lat, 48.8443);

    Ok(())
}

#[tokio::test]
async fn test_commune_boundary_lookup() -> anyhow::Result<()> {
    // 1. The API returns a contour feature
    let transport = MockTransport::new();
    transport.push_reply(
        200,
        r#"{"type":"Feature","properties":{"nom":"Lyon","code":"69123"},"geometry":{"type":"MultiPolygon","coordinates":[]}}"#,
    );
    let boundary = fetch_commune_boundary(&transport, "69123").await?;
    assert_eq!(boundary["properties"]["nom"].as_str(), Some("Lyon"));

    // 2. The request targets the commune by INSEE code and asks for
    //    the contour geometry
    let calls = transport.calls();
    assert_eq!(calls[0].url, "https://geo.api.gouv.fr/communes/69123");
    assert_eq!(
        calls[0].params,
        vec![
            ("format".to_string(), "geojson".to_string()),
            ("geometry".to_string(), "contour".to_string()),
        ]
    );

    Ok(())
}

#[tokio::test]
async fn test_commune_boundary_unknown_code() -> anyhow::Result<()> {
    let transport = MockTransport::new();
    transport.push_reply(404, "not found");
    let err = fetch_commune_boundary(&transport, "00000")
        .await
        .expect_err("unknown code should fail");
    assert!(err.to_string().contains("HTTP 404"));

    Ok(())
}
