use super::client::ApiClient;
use crate::config::Config;
use crate::error::Result;
use crate::models::{FeatureRecord, PlaylistSummary, TrackItem, UserProfile};
use crate::util::CancelToken;
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// One page of a cursor-paginated collection.
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: DeserializeOwned"))]
struct Page<T> {
    #[serde(default)]
    items: Vec<T>,
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TrackEntry {
    track: Option<TrackPayload>,
}

#[derive(Debug, Deserialize)]
struct TrackPayload {
    id: Option<String>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    duration_ms: u64,
    #[serde(default)]
    artists: Vec<ArtistRef>,
}

#[derive(Debug, Deserialize)]
struct ArtistRef {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct PlaylistEntry {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    description: Option<String>,
    tracks: Option<TracksRef>,
}

#[derive(Debug, Deserialize)]
struct TracksRef {
    #[serde(default)]
    total: u64,
}

#[derive(Debug, Deserialize)]
struct FeaturesEnvelope {
    #[serde(default)]
    audio_features: Vec<Option<FeaturePayload>>,
}

#[derive(Debug, Deserialize)]
struct FeaturePayload {
    id: String,
    energy: f64,
    valence: f64,
    danceability: f64,
    tempo: f64,
}

/// Typed surface over the catalog endpoints the analyzer needs: profile,
/// playlist library, track listing, batched feature lookup.
pub struct Catalog {
    client: ApiClient,
    max_pages: u32,
    feature_batch_size: usize,
    tracks_page_limit: u32,
    playlists_page_limit: u32,
}

impl Catalog {
    pub fn new(client: ApiClient, cfg: &Config) -> Self {
        Self {
            client,
            max_pages: cfg.max_pages,
            feature_batch_size: cfg.feature_batch_size,
            tracks_page_limit: cfg.tracks_page_limit,
            playlists_page_limit: cfg.playlists_page_limit,
        }
    }

    pub async fn fetch_profile(&self) -> Result<UserProfile> {
        self.client.get_json("/me").await
    }

    /// The authenticated user's playlist library, all pages.
    pub async fn fetch_playlists(&self, cancel: &CancelToken) -> Result<Vec<PlaylistSummary>> {
        let path = format!("/me/playlists?limit={}", self.playlists_page_limit);
        let entries: Vec<Option<PlaylistEntry>> = self.collect_pages(path, cancel).await?;
        let playlists = entries
            .into_iter()
            .flatten()
            .filter(|e| !e.id.is_empty())
            .map(|e| PlaylistSummary {
                id: e.id,
                name: e.name,
                description: e.description.filter(|d| !d.is_empty()),
                total_tracks: e.tracks.map(|t| t.total).unwrap_or(0),
            })
            .collect();
        Ok(playlists)
    }

    /// All playable tracks of one playlist, in playlist order. Entries whose
    /// track payload is null or id-less (local files, removed tracks) are
    /// dropped since they cannot be analyzed.
    pub async fn collect_playlist_tracks(
        &self,
        playlist_id: &str,
        cancel: &CancelToken,
    ) -> Result<Vec<TrackItem>> {
        let path = format!(
            "/playlists/{}/tracks?limit={}",
            urlencoding::encode(playlist_id),
            self.tracks_page_limit
        );
        let entries: Vec<TrackEntry> = self.collect_pages(path, cancel).await?;
        let mut tracks = Vec::new();
        for entry in entries {
            let payload = match entry.track {
                Some(p) => p,
                None => continue,
            };
            let id = match payload.id {
                Some(id) if !id.is_empty() => id,
                _ => continue,
            };
            tracks.push(TrackItem {
                id,
                name: payload.name,
                duration_ms: payload.duration_ms,
                artist_names: payload
                    .artists
                    .into_iter()
                    .map(|a| a.name)
                    .filter(|n| !n.is_empty())
                    .collect(),
            });
        }
        debug!("collected {} playable tracks from playlist {}", tracks.len(), playlist_id);
        Ok(tracks)
    }

    /// Feature lookup in fixed-size batches. A failing batch is logged and
    /// skipped so one rate-limited call cannot sink the whole analysis; null
    /// entries (unknown ids) inside a successful reply are dropped.
    pub async fn fetch_audio_features(
        &self,
        ids: &[String],
        cancel: &CancelToken,
    ) -> Result<Vec<FeatureRecord>> {
        let valid: Vec<&str> = ids
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect();
        if valid.is_empty() {
            return Ok(Vec::new());
        }

        let mut features = Vec::new();
        for batch in valid.chunks(self.feature_batch_size) {
            cancel.check()?;
            let path = format!("/audio-features?ids={}", batch.join(","));
            match self.client.get_json::<FeaturesEnvelope>(&path).await {
                Ok(envelope) => {
                    for f in envelope.audio_features.into_iter().flatten() {
                        features.push(FeatureRecord {
                            track_id: f.id,
                            energy: f.energy,
                            valence: f.valence,
                            danceability: f.danceability,
                            tempo: f.tempo,
                        });
                    }
                }
                Err(e) => {
                    warn!("audio-features batch of {} failed, skipping: {}", batch.len(), e);
                }
            }
        }
        Ok(features)
    }

    /// Follow `next` cursors from `initial_path`, concatenating items in
    /// response order, until the cursor is absent or `max_pages` pages have
    /// been fetched. A page failure aborts the whole collection; a partial
    /// list is never returned.
    async fn collect_pages<T: DeserializeOwned>(
        &self,
        initial_path: String,
        cancel: &CancelToken,
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut next: Option<String> = Some(initial_path);
        let mut pages: u32 = 0;

        while let Some(url) = next {
            cancel.check()?;
            if pages >= self.max_pages {
                warn!("pagination cap of {} pages reached, stopping collection", self.max_pages);
                break;
            }
            let page: Page<T> = self.client.get_json(&url).await?;
            pages += 1;
            items.extend(page.items);
            next = page.next;
        }
        Ok(items)
    }
}
