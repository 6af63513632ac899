//! Orchestration for the analyze and overview flows: parse the playlist
//! reference, run collector → feature fetcher → engine, with a cancellation
//! check between stages.

use crate::analysis;
use crate::api::catalog::Catalog;
use crate::error::{Error, Result};
use crate::models::{AnalysisResult, PlaylistSummary, TrackItem, UserProfile};
use crate::util::CancelToken;
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;
use uuid::Uuid;

static PLAYLIST_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9]{16,64}$").unwrap());

/// Extract a playlist id from user input. Accepts a bare id, an
/// `open.spotify.com/playlist/...` share link (locale segments tolerated),
/// or a `spotify:playlist:...` URI.
pub fn parse_playlist_ref(input: &str) -> Result<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidInput("empty playlist reference".into()));
    }

    let candidate = if let Some(rest) = trimmed.strip_prefix("spotify:playlist:") {
        rest.to_string()
    } else if trimmed.contains("open.spotify.com") {
        let url = Url::parse(trimmed)
            .map_err(|e| Error::InvalidInput(format!("unparseable share link: {}", e)))?;
        let segments: Vec<&str> = url.path_segments().map(|s| s.collect()).unwrap_or_default();
        match segments.iter().position(|s| *s == "playlist") {
            Some(i) if i + 1 < segments.len() && !segments[i + 1].is_empty() => {
                segments[i + 1].to_string()
            }
            _ => {
                return Err(Error::InvalidInput(format!(
                    "share link does not point at a playlist: {}",
                    trimmed
                )))
            }
        }
    } else {
        trimmed.to_string()
    };

    if !PLAYLIST_ID_RE.is_match(&candidate) {
        return Err(Error::InvalidInput(format!(
            "'{}' does not look like a playlist id",
            candidate
        )));
    }
    Ok(candidate)
}

/// Everything the analyze flow produces for one playlist.
pub struct PlaylistReport {
    pub playlist_id: String,
    pub tracks: Vec<TrackItem>,
    pub analysis: AnalysisResult,
}

/// Run the full analysis for one playlist reference.
///
/// Stages run strictly in order; an empty playlist or a playlist with no
/// feature records short-circuits to `InsufficientData` instead of handing
/// the engine nothing to work with.
pub async fn analyze_playlist(
    catalog: &Catalog,
    reference: &str,
    cancel: &CancelToken,
) -> Result<PlaylistReport> {
    let playlist_id = parse_playlist_ref(reference)?;
    let run_id = Uuid::new_v4().to_string();
    tracing::info!("analysis run {} started for playlist {}", run_id, playlist_id);

    cancel.check()?;
    let tracks = catalog.collect_playlist_tracks(&playlist_id, cancel).await?;
    if tracks.is_empty() {
        tracing::info!("analysis run {}: playlist {} has no usable tracks", run_id, playlist_id);
        return Err(Error::InsufficientData);
    }

    cancel.check()?;
    let ids: Vec<String> = tracks.iter().map(|t| t.id.clone()).collect();
    let features = catalog.fetch_audio_features(&ids, cancel).await?;
    if features.is_empty() {
        log::warn!(
            "analysis run {}: no feature records for any of {} tracks",
            run_id,
            tracks.len()
        );
        return Err(Error::InsufficientData);
    }

    cancel.check()?;
    let analysis = analysis::analyze(&tracks, &features)?;
    tracing::info!(
        "analysis run {} finished: {} tracks, mood {}",
        run_id,
        analysis.total_tracks,
        analysis.mood
    );

    Ok(PlaylistReport { playlist_id, tracks, analysis })
}

/// Fetch the signed-in user's profile and playlist library. The two calls
/// are independent and run concurrently; either failure fails the overview.
pub async fn fetch_overview(
    catalog: &Catalog,
    cancel: &CancelToken,
) -> Result<(UserProfile, Vec<PlaylistSummary>)> {
    cancel.check()?;
    let (profile, playlists) =
        futures::try_join!(catalog.fetch_profile(), catalog.fetch_playlists(cancel))?;
    Ok((profile, playlists))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_id_passes_through() {
        let id = parse_playlist_ref("37i9dQZF1DXcBWIGoYBM5M").unwrap();
        assert_eq!(id, "37i9dQZF1DXcBWIGoYBM5M");
    }

    #[test]
    fn share_link_is_unwrapped() {
        let id = parse_playlist_ref(
            "https://open.spotify.com/playlist/37i9dQZF1DXcBWIGoYBM5M?si=abc123",
        )
        .unwrap();
        assert_eq!(id, "37i9dQZF1DXcBWIGoYBM5M");
    }

    #[test]
    fn share_link_with_locale_segment_is_unwrapped() {
        let id = parse_playlist_ref(
            "https://open.spotify.com/intl-fr/playlist/37i9dQZF1DXcBWIGoYBM5M",
        )
        .unwrap();
        assert_eq!(id, "37i9dQZF1DXcBWIGoYBM5M");
    }

    #[test]
    fn uri_form_is_unwrapped() {
        let id = parse_playlist_ref("spotify:playlist:37i9dQZF1DXcBWIGoYBM5M").unwrap();
        assert_eq!(id, "37i9dQZF1DXcBWIGoYBM5M");
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        let id = parse_playlist_ref("  37i9dQZF1DXcBWIGoYBM5M\n").unwrap();
        assert_eq!(id, "37i9dQZF1DXcBWIGoYBM5M");
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(parse_playlist_ref(""), Err(Error::InvalidInput(_))));
        assert!(matches!(parse_playlist_ref("   "), Err(Error::InvalidInput(_))));
        assert!(matches!(parse_playlist_ref("not a playlist"), Err(Error::InvalidInput(_))));
        assert!(matches!(parse_playlist_ref("short"), Err(Error::InvalidInput(_))));
        assert!(matches!(
            parse_playlist_ref("https://open.spotify.com/album/37i9dQZF1DXcBWIGoYBM5M"),
            Err(Error::InvalidInput(_))
        ));
    }
}
