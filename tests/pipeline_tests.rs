use mockito::Server;
use playlist_insights as lib;
use lib::api::catalog::Catalog;
use lib::api::client::{ApiClient, StaticTokenSource};
use lib::config::Config;
use lib::models::Mood;
use lib::pipeline;
use lib::util::{CancelToken, TokioDelay};
use lib::Error;
use serde_json::json;
use std::sync::Arc;

const PLAYLIST_ID: &str = "37i9dQZF1DXcBWIGoYBM5M";

fn test_config(base: &str) -> Config {
    toml::from_str(&format!(
        r#"
client_id = "test-client"
auth_base = "{}"
api_base = "{}"
"#,
        base, base
    ))
    .expect("config")
}

fn catalog_for(base: &str) -> Catalog {
    let cfg = test_config(base);
    let client = ApiClient::new(
        &cfg,
        Arc::new(StaticTokenSource::new("tok")),
        Arc::new(TokioDelay),
    )
    .expect("client");
    Catalog::new(client, &cfg)
}

#[test]
fn analyze_runs_collector_fetcher_and_engine() {
    let mut server = Server::new();
    let base = server.url();

    let m_tracks = server
        .mock("GET", format!("/playlists/{}/tracks?limit=100", PLAYLIST_ID).as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "items": [
                    {"track": {"id": "t1", "name": "One", "duration_ms": 210_000,
                               "artists": [{"name": "Alpha"}]}},
                    {"track": {"id": "t2", "name": "Two", "duration_ms": 180_000,
                               "artists": [{"name": "Alpha"}]}},
                    {"track": {"id": "t3", "name": "Three", "duration_ms": 150_000,
                               "artists": [{"name": "Beta"}]}}
                ],
                "next": null
            })
            .to_string(),
        )
        .expect(1)
        .create();
    let m_feats = server
        .mock("GET", "/audio-features?ids=t1,t2,t3")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "audio_features": [
                    {"id": "t1", "energy": 0.9, "valence": 0.7, "danceability": 0.6, "tempo": 118.0},
                    {"id": "t2", "energy": 0.8, "valence": 0.8, "danceability": 0.6, "tempo": 120.0},
                    {"id": "t3", "energy": 0.7, "valence": 0.9, "danceability": 0.6, "tempo": 122.0}
                ]
            })
            .to_string(),
        )
        .expect(1)
        .create();

    let catalog = catalog_for(&base);
    let rt = tokio::runtime::Runtime::new().expect("rt");
    let cancel = CancelToken::new();
    // a share link exercises the reference parser on the way in
    let reference = format!("https://open.spotify.com/playlist/{}?si=xyz", PLAYLIST_ID);
    let report = rt
        .block_on(pipeline::analyze_playlist(&catalog, &reference, &cancel))
        .expect("report");

    assert_eq!(report.playlist_id, PLAYLIST_ID);
    assert_eq!(report.tracks.len(), 3);

    let a = &report.analysis;
    assert_eq!(a.total_tracks, 3);
    assert_eq!(a.total_duration_minutes, 9);
    assert_eq!(a.avg_energy_pct, 80);
    assert_eq!(a.avg_valence_pct, 80);
    assert_eq!(a.avg_danceability_pct, 60);
    assert_eq!(a.avg_tempo_bpm, 120);
    assert_eq!(a.mood, Mood::EnergeticHappy);
    assert_eq!(a.top_artists.len(), 2);
    assert_eq!(a.top_artists[0].artist, "Alpha");
    assert_eq!(a.top_artists[0].count, 2);

    m_tracks.assert();
    m_feats.assert();
}

#[test]
fn empty_playlist_reports_insufficient_data() {
    let mut server = Server::new();
    let base = server.url();

    let _m_tracks = server
        .mock("GET", format!("/playlists/{}/tracks?limit=100", PLAYLIST_ID).as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"items": [], "next": null}).to_string())
        .create();
    // the feature fetcher must never run for an empty playlist
    let m_feats = server
        .mock("GET", mockito::Matcher::Regex("^/audio-features".to_string()))
        .expect(0)
        .create();

    let catalog = catalog_for(&base);
    let rt = tokio::runtime::Runtime::new().expect("rt");
    let cancel = CancelToken::new();
    let res = rt.block_on(pipeline::analyze_playlist(&catalog, PLAYLIST_ID, &cancel));
    assert!(matches!(res, Err(Error::InsufficientData)));
    m_feats.assert();
}

#[test]
fn playlist_with_no_feature_records_reports_insufficient_data() {
    let mut server = Server::new();
    let base = server.url();

    let _m_tracks = server
        .mock("GET", format!("/playlists/{}/tracks?limit=100", PLAYLIST_ID).as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "items": [{"track": {"id": "t1", "name": "One", "duration_ms": 1000, "artists": []}}],
                "next": null
            })
            .to_string(),
        )
        .create();
    let _m_feats = server
        .mock("GET", "/audio-features?ids=t1")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"audio_features": [null]}).to_string())
        .create();

    let catalog = catalog_for(&base);
    let rt = tokio::runtime::Runtime::new().expect("rt");
    let cancel = CancelToken::new();
    let res = rt.block_on(pipeline::analyze_playlist(&catalog, PLAYLIST_ID, &cancel));
    assert!(matches!(res, Err(Error::InsufficientData)));
}

#[test]
fn invalid_reference_fails_without_any_request() {
    let mut server = Server::new();
    let base = server.url();
    let m = server.mock("GET", mockito::Matcher::Any).expect(0).create();

    let catalog = catalog_for(&base);
    let rt = tokio::runtime::Runtime::new().expect("rt");
    let cancel = CancelToken::new();
    let res = rt.block_on(pipeline::analyze_playlist(&catalog, "not a playlist!", &cancel));
    assert!(matches!(res, Err(Error::InvalidInput(_))));
    m.assert();
}

#[test]
fn cancelled_run_does_nothing_observable() {
    let mut server = Server::new();
    let base = server.url();
    let m = server.mock("GET", mockito::Matcher::Any).expect(0).create();

    let catalog = catalog_for(&base);
    let cancel = CancelToken::new();
    cancel.cancel();

    let rt = tokio::runtime::Runtime::new().expect("rt");
    let res = rt.block_on(pipeline::analyze_playlist(&catalog, PLAYLIST_ID, &cancel));
    assert!(matches!(res, Err(Error::Cancelled)));
    m.assert();
}

#[test]
fn overview_returns_profile_and_library_together() {
    let mut server = Server::new();
    let base = server.url();

    let m_me = server
        .mock("GET", "/me")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"id": "user-1", "display_name": "Roman"}).to_string())
        .expect(1)
        .create();
    let m_lists = server
        .mock("GET", "/me/playlists?limit=50")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "items": [{"id": "p1", "name": "Mix", "description": null, "tracks": {"total": 3}}],
                "next": null
            })
            .to_string(),
        )
        .expect(1)
        .create();

    let catalog = catalog_for(&base);
    let rt = tokio::runtime::Runtime::new().expect("rt");
    let cancel = CancelToken::new();
    let (profile, playlists) = rt
        .block_on(pipeline::fetch_overview(&catalog, &cancel))
        .expect("overview");

    assert_eq!(profile.id, "user-1");
    assert_eq!(profile.display_name.as_deref(), Some("Roman"));
    assert_eq!(playlists.len(), 1);
    assert_eq!(playlists[0].name, "Mix");
    m_me.assert();
    m_lists.assert();
}

#[test]
fn overview_fails_when_either_fetch_fails() {
    let mut server = Server::new();
    let base = server.url();

    let _m_me = server.mock("GET", "/me").with_status(500).create();
    let _m_lists = server
        .mock("GET", "/me/playlists?limit=50")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"items": [], "next": null}).to_string())
        .create();

    let catalog = catalog_for(&base);
    let rt = tokio::runtime::Runtime::new().expect("rt");
    let cancel = CancelToken::new();
    let res = rt.block_on(pipeline::fetch_overview(&catalog, &cancel));
    assert!(matches!(res, Err(Error::RemoteServerError { status: 500 })));
}
