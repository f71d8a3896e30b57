//! Google Drive API response types
//!
//! Data structures for deserializing Google Drive API v3 responses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

const FLAC_MIME_TYPES: &[&str] = &["audio/flac", "audio/x-flac"];

/// Google Drive API file resource
///
/// See: https://developers.google.com/drive/api/v3/reference/files#resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,

    pub name: String,

    pub mime_type: String,

    /// File size in bytes, as a decimal string (omitted for folders)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,

    /// RFC 3339
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_time: Option<String>,

    /// Only present for binary content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5_checksum: Option<String>,

    #[serde(default)]
    pub parents: Vec<String>,

    #[serde(default)]
    pub trashed: bool,
}

impl DriveFile {
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME_TYPE
    }

    /// By MIME type, or by extension when Drive could not sniff the content.
    pub fn is_flac(&self) -> bool {
        if self.is_folder() {
            return false;
        }
        FLAC_MIME_TYPES.contains(&self.mime_type.as_str())
            || self
                .name
                .rsplit_once('.')
                .is_some_and(|(_, ext)| ext.eq_ignore_ascii_case("flac"))
    }

    pub fn size_bytes(&self) -> Option<u64> {
        self.size.as_deref().and_then(|s| s.parse().ok())
    }

    pub fn modified_at(&self) -> Option<i64> {
        self.modified_time
            .as_deref()
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|dt| dt.with_timezone(&Utc).timestamp())
    }

    /// Content checksum, falling back to the modification time. Empty when
    /// Drive reports neither, which makes the song approved on every pass.
    pub fn version(&self) -> String {
        if let Some(md5) = self.md5_checksum.as_deref().filter(|m| !m.is_empty()) {
            return md5.to_string();
        }
        match (self.modified_at(), self.modified_time.as_deref()) {
            (Some(ts), _) => format!("mtime:{}", ts),
            (None, Some(raw)) => format!("mtime:{}", raw),
            (None, None) => String::new(),
        }
    }

    pub fn stem(&self) -> &str {
        self.name
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .filter(|stem| !stem.is_empty())
            .unwrap_or(&self.name)
    }
}

/// Google Drive API files.list response
///
/// See: https://developers.google.com/drive/api/v3/reference/files/list
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilesListResponse {
    #[serde(default)]
    pub files: Vec<DriveFile>,

    #[serde(default)]
    pub next_page_token: Option<String>,

    /// Drive gave up before searching every file the query matches.
    #[serde(default)]
    pub incomplete_search: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(json: &str) -> DriveFile {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_deserialize_drive_file() {
        let f = file(
            r#"{
            "id": "abc123",
            "name": "So What.flac",
            "mimeType": "audio/flac",
            "size": "1024",
            "modifiedTime": "2023-01-02T00:00:00.000Z",
            "md5Checksum": "d41d8cd98f00b204e9800998ecf8427e",
            "parents": ["folder1"]
        }"#,
        );
        assert_eq!(f.id, "abc123");
        assert_eq!(f.size_bytes(), Some(1024));
        assert!(f.is_flac());
        assert!(!f.trashed);
        assert_eq!(f.stem(), "So What");
        assert_eq!(f.version(), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn test_version_falls_back_to_modified_time() {
        let f = file(
            r#"{"id": "a", "name": "a.flac", "mimeType": "application/octet-stream",
                "modifiedTime": "2023-01-02T00:00:00Z"}"#,
        );
        assert!(f.is_flac());
        assert_eq!(f.version(), "mtime:1672617600");

        let f = file(r#"{"id": "b", "name": "b.flac", "mimeType": "audio/flac"}"#);
        assert_eq!(f.version(), "");
    }

    #[test]
    fn test_folders_are_not_songs() {
        let f = file(
            r#"{"id": "f", "name": "Jazz.flac", "mimeType": "application/vnd.google-apps.folder"}"#,
        );
        assert!(f.is_folder());
        assert!(!f.is_flac());
    }

    #[test]
    fn test_deserialize_files_list_response() {
        let response: FilesListResponse = serde_json::from_str(
            r#"{
            "files": [{"id": "file1", "name": "song1.mp3", "mimeType": "audio/mpeg"}],
            "nextPageToken": "token123"
        }"#,
        )
        .unwrap();
        assert_eq!(response.files.len(), 1);
        assert_eq!(response.next_page_token.as_deref(), Some("token123"));
        assert!(!response.files[0].is_flac());
    }
}
