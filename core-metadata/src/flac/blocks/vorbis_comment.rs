use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

use crate::error::Result;
use crate::flac::cursor::ByteCursor;

/// Comment fields the catalog understands. Keys match case-sensitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum VorbisField {
    Title,
    Version,
    Album,
    TrackNumber,
    Artist,
    Performer,
    Copyright,
    License,
    Organization,
    Description,
    Genre,
    Date,
    Location,
    Contact,
    Isrc,
    DiscNumber,
    DiscTotal,
    TrackTotal,
}

impl VorbisField {
    pub fn from_key(key: &str) -> Option<Self> {
        let field = match key {
            "TITLE" => VorbisField::Title,
            "VERSION" => VorbisField::Version,
            "ALBUM" => VorbisField::Album,
            "TRACKNUMBER" => VorbisField::TrackNumber,
            "ARTIST" => VorbisField::Artist,
            "PERFORMER" => VorbisField::Performer,
            "COPYRIGHT" => VorbisField::Copyright,
            "LICENSE" => VorbisField::License,
            "ORGANIZATION" => VorbisField::Organization,
            "DESCRIPTION" => VorbisField::Description,
            "GENRE" => VorbisField::Genre,
            "DATE" => VorbisField::Date,
            "LOCATION" => VorbisField::Location,
            "CONTACT" => VorbisField::Contact,
            "ISRC" => VorbisField::Isrc,
            "DISCNUMBER" => VorbisField::DiscNumber,
            "DISCTOTAL" => VorbisField::DiscTotal,
            "TRACKTOTAL" => VorbisField::TrackTotal,
            _ => return None,
        };
        Some(field)
    }

    pub fn key(self) -> &'static str {
        match self {
            VorbisField::Title => "TITLE",
            VorbisField::Version => "VERSION",
            VorbisField::Album => "ALBUM",
            VorbisField::TrackNumber => "TRACKNUMBER",
            VorbisField::Artist => "ARTIST",
            VorbisField::Performer => "PERFORMER",
            VorbisField::Copyright => "COPYRIGHT",
            VorbisField::License => "LICENSE",
            VorbisField::Organization => "ORGANIZATION",
            VorbisField::Description => "DESCRIPTION",
            VorbisField::Genre => "GENRE",
            VorbisField::Date => "DATE",
            VorbisField::Location => "LOCATION",
            VorbisField::Contact => "CONTACT",
            VorbisField::Isrc => "ISRC",
            VorbisField::DiscNumber => "DISCNUMBER",
            VorbisField::DiscTotal => "DISCTOTAL",
            VorbisField::TrackTotal => "TRACKTOTAL",
        }
    }
}

/// VORBIS_COMMENT block. Lengths in this block are little-endian.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VorbisComment {
    pub vendor: String,
    /// Recognised fields only. A repeated key keeps its last value.
    pub comments: BTreeMap<VorbisField, String>,
}

impl VorbisComment {
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut cursor = ByteCursor::new(payload, "VORBIS_COMMENT");

        let vendor_len = cursor.read_u32_le()? as usize;
        let vendor = cursor.read_string_lossy(vendor_len)?;

        let count = cursor.read_u32_le()?;
        let mut comments = BTreeMap::new();

        for index in 0..count {
            let len = cursor.read_u32_le()? as usize;
            let raw = cursor.take(len)?;

            let Ok(entry) = std::str::from_utf8(raw) else {
                warn!(index, "Skipping comment with invalid UTF-8");
                continue;
            };
            let Some((key, value)) = entry.split_once('=') else {
                warn!(index, "Skipping comment without '=' separator");
                continue;
            };
            if let Some(field) = VorbisField::from_key(key) {
                comments.insert(field, value.to_string());
            }
        }

        Ok(Self { vendor, comments })
    }

    pub fn get(&self, field: VorbisField) -> Option<&str> {
        self.comments.get(&field).map(String::as_str)
    }
}
