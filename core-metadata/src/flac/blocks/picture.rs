use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::flac::cursor::ByteCursor;

/// ID3v2 APIC picture types, as reused by FLAC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PictureType {
    Other,
    FileIcon,
    OtherFileIcon,
    FrontCover,
    BackCover,
    LeafletPage,
    Media,
    LeadArtist,
    Artist,
    Conductor,
    Band,
    Composer,
    Lyricist,
    RecordingLocation,
    DuringRecording,
    DuringPerformance,
    ScreenCapture,
    BrightColoredFish,
    Illustration,
    BandLogo,
    PublisherLogo,
}

impl PictureType {
    /// Unknown codes map to `Other`.
    pub fn from_code(code: u32) -> Self {
        match code {
            1 => PictureType::FileIcon,
            2 => PictureType::OtherFileIcon,
            3 => PictureType::FrontCover,
            4 => PictureType::BackCover,
            5 => PictureType::LeafletPage,
            6 => PictureType::Media,
            7 => PictureType::LeadArtist,
            8 => PictureType::Artist,
            9 => PictureType::Conductor,
            10 => PictureType::Band,
            11 => PictureType::Composer,
            12 => PictureType::Lyricist,
            13 => PictureType::RecordingLocation,
            14 => PictureType::DuringRecording,
            15 => PictureType::DuringPerformance,
            16 => PictureType::ScreenCapture,
            17 => PictureType::BrightColoredFish,
            18 => PictureType::Illustration,
            19 => PictureType::BandLogo,
            20 => PictureType::PublisherLogo,
            _ => PictureType::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Picture {
    pub picture_type: PictureType,
    pub mime_type: String,
    /// `None` when the stored description is empty.
    pub description: Option<String>,
    pub width: u32,
    pub height: u32,
    pub color_depth: u32,
    /// 0 for non-indexed images.
    pub colors_used: u32,
    pub data: Bytes,
}

impl Picture {
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut cursor = ByteCursor::new(payload, "PICTURE");

        let picture_type = PictureType::from_code(cursor.read_u32_be()?);

        let mime_len = cursor.read_u32_be()? as usize;
        let mime_type = cursor.read_string_lossy(mime_len)?;

        let description_len = cursor.read_u32_be()? as usize;
        let description = cursor.read_string_lossy(description_len)?;

        let width = cursor.read_u32_be()?;
        let height = cursor.read_u32_be()?;
        let color_depth = cursor.read_u32_be()?;
        let colors_used = cursor.read_u32_be()?;

        let data_len = cursor.read_u32_be()? as usize;
        let data = Bytes::copy_from_slice(cursor.take(data_len)?);

        Ok(Self {
            picture_type,
            mime_type,
            description: (!description.is_empty()).then_some(description),
            width,
            height,
            color_depth,
            colors_used,
            data,
        })
    }
}
