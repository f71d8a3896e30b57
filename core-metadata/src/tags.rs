//! Maps decoded FLAC metadata onto catalog song fields.

use core_library::models::Song;
use serde::{Deserialize, Serialize};

use crate::flac::{FlacMetadata, VorbisField};

/// Descriptive fields extracted from one FLAC stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SongTags {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub performer: Option<String>,
    pub year: Option<i32>,
    pub track_number: Option<i32>,
    pub track_total: Option<i32>,
    pub disc_number: Option<i32>,
    pub disc_total: Option<i32>,
    pub duration_ms: Option<i64>,
    pub artwork: Option<Vec<u8>>,
}

impl SongTags {
    pub fn from_flac(metadata: &FlacMetadata) -> Self {
        let text = |field| metadata.comment(field).and_then(normalize_text);

        let (track_number, inline_track_total) = metadata
            .comment(VorbisField::TrackNumber)
            .map(parse_position)
            .unwrap_or_default();
        let (disc_number, inline_disc_total) = metadata
            .comment(VorbisField::DiscNumber)
            .map(parse_position)
            .unwrap_or_default();

        Self {
            title: text(VorbisField::Title),
            artist: text(VorbisField::Artist),
            album: text(VorbisField::Album),
            genre: text(VorbisField::Genre),
            performer: text(VorbisField::Performer),
            year: metadata.comment(VorbisField::Date).and_then(parse_year),
            track_number,
            track_total: metadata
                .comment(VorbisField::TrackTotal)
                .and_then(parse_number)
                .or(inline_track_total),
            disc_number,
            disc_total: metadata
                .comment(VorbisField::DiscTotal)
                .and_then(parse_number)
                .or(inline_disc_total),
            duration_ms: metadata
                .stream_info
                .duration()
                .and_then(|d| i64::try_from(d.as_millis()).ok()),
            artwork: metadata
                .picture
                .as_ref()
                .filter(|p| !p.data.is_empty())
                .map(|p| p.data.to_vec()),
        }
    }

    /// Overwrite the song's descriptive fields; absent tags clear stale values.
    pub fn apply_to(&self, song: &mut Song) {
        song.title = self.title.clone();
        song.artist = self.artist.clone();
        song.album = self.album.clone();
        song.genre = self.genre.clone();
        song.performer = self.performer.clone();
        song.year = self.year;
        song.track_number = self.track_number;
        song.disc_number = self.disc_number;
        song.duration_ms = self.duration_ms;
        song.artwork = self.artwork.clone();
    }
}

/// Collapse runs of whitespace and drop control characters.
fn normalize_text(text: &str) -> Option<String> {
    let normalized: String = text
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .filter(|c| !c.is_control())
        .collect();
    (!normalized.is_empty()).then_some(normalized)
}

fn parse_number(text: &str) -> Option<i32> {
    text.trim().parse::<i32>().ok().filter(|n| *n > 0)
}

/// "3" or "3/12".
fn parse_position(text: &str) -> (Option<i32>, Option<i32>) {
    match text.split_once('/') {
        Some((number, total)) => (parse_number(number), parse_number(total)),
        None => (parse_number(text), None),
    }
}

/// Leading four digits of DATE ("1959", "1959-08-17").
fn parse_year(text: &str) -> Option<i32> {
    let digits = text.trim().get(..4)?;
    if digits.bytes().all(|b| b.is_ascii_digit()) {
        digits.parse().ok()
    } else {
        None
    }
}
