use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub client_id: String,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    #[serde(default = "default_auth_base")]
    pub auth_base: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Token-exchange endpoint override. Leave empty to use
    /// `{auth_base}/api/token`; point it at the backend relay when the
    /// exchange must happen server-side.
    #[serde(default)]
    pub token_url: String,

    // path to database file
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    // Network/timing
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    // Paging/batching bounds
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    #[serde(default = "default_feature_batch_size")]
    pub feature_batch_size: usize,
    #[serde(default = "default_tracks_page_limit")]
    pub tracks_page_limit: u32,
    #[serde(default = "default_playlists_page_limit")]
    pub playlists_page_limit: u32,
}

fn default_redirect_uri() -> String { "http://127.0.0.1:8888/callback".into() }
fn default_auth_base() -> String { "https://accounts.spotify.com".into() }
fn default_api_base() -> String { "https://api.spotify.com/v1".into() }
fn default_log_dir() -> PathBuf { "/var/log/playlist-insights".into() }
fn default_request_timeout() -> u64 { 15 }
fn default_max_pages() -> u32 { 50 }
fn default_feature_batch_size() -> usize { 100 }
fn default_tracks_page_limit() -> u32 { 100 }
fn default_playlists_page_limit() -> u32 { 50 }

fn default_scopes() -> Vec<String> {
    vec![
        "playlist-read-private",
        "playlist-read-collaborative",
        "user-read-private",
        "user-read-email",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("/var/lib"))
        .join("playlist-insights")
        .join("insights.db")
}

impl Config {
    pub fn from_path(path: &std::path::Path) -> anyhow::Result<Self> {
        let s = std::fs::read_to_string(path)?;
        let cfg: Config = toml::from_str(&s)?;
        Ok(cfg)
    }
}
