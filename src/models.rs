use serde::{Deserialize, Serialize};

/// Stored OAuth credential. `expires_at_ms` is derived once, at issuance or
/// refresh time, as issued-at + `expires_in` * 1000.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at_ms: i64, // epoch milliseconds
}

impl Credential {
    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at_ms
    }
}

/// One in-flight authorization attempt: the PKCE verifier plus the CSRF
/// state nonce. Written when the flow starts, consumed by the callback.
#[derive(Debug, Clone)]
pub struct PendingAuthorization {
    pub code_verifier: String,
    pub state: String,
}

/// A playlist entry as produced by the track collector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackItem {
    pub id: String,
    pub name: String,
    pub duration_ms: u64,
    pub artist_names: Vec<String>,
}

/// Per-track numeric features consumed by the analysis engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub track_id: String,
    pub energy: f64,
    pub valence: f64,
    pub danceability: f64,
    pub tempo: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistSummary {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub total_tracks: u64,
}

/// Mood bucket from the ordered classification rules (first match wins).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mood {
    EnergeticHappy,
    ChillPositive,
    Intense,
    Melancholic,
    HighEnergy,
    Happy,
    Neutral,
}

impl Mood {
    pub fn label(&self) -> &'static str {
        match self {
            Mood::EnergeticHappy => "Energetic & Happy",
            Mood::ChillPositive => "Chill & Positive",
            Mood::Intense => "Intense",
            Mood::Melancholic => "Melancholic",
            Mood::HighEnergy => "High Energy",
            Mood::Happy => "Happy",
            Mood::Neutral => "Neutral",
        }
    }
}

impl std::fmt::Display for Mood {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistCount {
    pub artist: String,
    pub count: u64,
}

/// Aggregate statistics for one playlist. Recomputed on every request,
/// never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub total_tracks: usize,
    pub total_duration_minutes: u64,
    pub avg_energy_pct: u32,
    pub avg_valence_pct: u32,
    pub avg_danceability_pct: u32,
    pub avg_tempo_bpm: u32,
    pub mood: Mood,
    // length <= 5, ties broken by first appearance in track order
    pub top_artists: Vec<ArtistCount>,
}
