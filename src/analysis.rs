use crate::error::{Error, Result};
use crate::models::{AnalysisResult, ArtistCount, FeatureRecord, Mood, TrackItem};
use std::collections::HashMap;

/// Reduce collected tracks and feature records to summary statistics.
/// Pure: no IO, recomputed from scratch on every call.
///
/// Feature means are simple arithmetic means over the records present —
/// tracks without a feature record count toward totals and artist ranks but
/// not toward the averages.
pub fn analyze(tracks: &[TrackItem], features: &[FeatureRecord]) -> Result<AnalysisResult> {
    if features.is_empty() {
        return Err(Error::InsufficientData);
    }

    let n = features.len() as f64;
    let mut energy = 0.0;
    let mut valence = 0.0;
    let mut danceability = 0.0;
    let mut tempo = 0.0;
    for f in features {
        energy += f.energy;
        valence += f.valence;
        danceability += f.danceability;
        tempo += f.tempo;
    }
    let energy = energy / n;
    let valence = valence / n;
    let danceability = danceability / n;
    let tempo = tempo / n;

    let total_ms: u64 = tracks.iter().map(|t| t.duration_ms).sum();

    Ok(AnalysisResult {
        total_tracks: tracks.len(),
        total_duration_minutes: total_ms / 60_000,
        avg_energy_pct: to_pct(energy),
        avg_valence_pct: to_pct(valence),
        avg_danceability_pct: to_pct(danceability),
        avg_tempo_bpm: tempo.round() as u32,
        mood: classify_mood(energy, valence),
        top_artists: top_artists(tracks, 5),
    })
}

fn to_pct(mean: f64) -> u32 {
    (mean * 100.0).round() as u32
}

/// Ordered mood rules; first match wins. The quadrant rules use strict
/// comparisons, so mid-range mixes fall through to the single-axis rules.
fn classify_mood(energy: f64, valence: f64) -> Mood {
    if valence > 0.6 && energy > 0.6 {
        Mood::EnergeticHappy
    } else if valence > 0.6 && energy < 0.4 {
        Mood::ChillPositive
    } else if valence < 0.4 && energy > 0.6 {
        Mood::Intense
    } else if valence < 0.4 && energy < 0.4 {
        Mood::Melancholic
    } else if energy > 0.7 {
        Mood::HighEnergy
    } else if valence > 0.7 {
        Mood::Happy
    } else {
        Mood::Neutral
    }
}

/// Count artist appearances across the track list and keep the `limit` most
/// frequent. Candidates are laid out in first-seen order and the sort is
/// stable, so equal counts rank by first appearance.
fn top_artists(tracks: &[TrackItem], limit: usize) -> Vec<ArtistCount> {
    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<String, u64> = HashMap::new();
    for track in tracks {
        for artist in &track.artist_names {
            if !counts.contains_key(artist) {
                order.push(artist.clone());
            }
            *counts.entry(artist.clone()).or_insert(0) += 1;
        }
    }

    let mut ranked: Vec<ArtistCount> = order
        .into_iter()
        .map(|artist| {
            let count = counts.get(&artist).copied().unwrap_or(0);
            ArtistCount { artist, count }
        })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count));
    ranked.truncate(limit);
    ranked
}
