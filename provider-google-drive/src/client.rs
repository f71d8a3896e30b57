//! Thin Drive v3 REST client over the host's `HttpClient`.

use std::sync::Arc;
use std::time::Duration;

use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse, RetryPolicy};
use tokio::io::AsyncRead;
use tracing::{debug, instrument, warn};

use crate::error::{GoogleDriveError, Result};
use crate::types::{DriveFile, FilesListResponse};

pub const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";

/// Google Drive API limit
const MAX_PAGE_SIZE: u32 = 1000;

const FILE_FIELDS: &str = "id,name,mimeType,size,modifiedTime,md5Checksum,parents,trashed";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct DriveClient {
    http_client: Arc<dyn HttpClient>,
    /// OAuth 2.0 access token with `drive.readonly` scope
    access_token: String,
    api_base: String,
    retry_policy: RetryPolicy,
}

impl DriveClient {
    pub fn new(http_client: Arc<dyn HttpClient>, access_token: impl Into<String>) -> Self {
        Self {
            http_client,
            access_token: access_token.into(),
            api_base: DRIVE_API_BASE.to_string(),
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn media_url(&self, file_id: &str) -> String {
        format!("{}/files/{}?alt=media", self.api_base, urlencoding::encode(file_id))
    }

    fn request(&self, url: String) -> HttpRequest {
        HttpRequest::get(url)
            .bearer_token(&self.access_token)
            .header("Accept", "application/json")
            .timeout(REQUEST_TIMEOUT)
    }

    /// GET with exponential backoff on 429/5xx and transport errors.
    #[instrument(skip(self), fields(url = %url))]
    async fn get_with_retry(&self, url: String, file_id: &str) -> Result<HttpResponse> {
        let max_attempts = self.retry_policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.http_client.execute(self.request(url.clone())).await {
                Ok(response) if response.is_success() => {
                    debug!(status = response.status, "API request succeeded");
                    return Ok(response);
                }
                Ok(response) if response.is_retryable() => {
                    if attempt >= max_attempts {
                        warn!(status = response.status, attempts = attempt, "Giving up on API request");
                        return Err(GoogleDriveError::RetriesExhausted {
                            attempts: attempt,
                            status_code: response.status,
                        });
                    }
                    let delay = self.retry_policy.delay_for(attempt);
                    warn!(
                        status = response.status,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "API request throttled, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Ok(response) => {
                    warn!(status = response.status, "API request failed");
                    return Err(GoogleDriveError::from_status(
                        response.status,
                        &response.body,
                        file_id,
                    ));
                }
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = self.retry_policy.delay_for(attempt);
                    warn!(error = %e, attempt, "API request failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub async fn get_file(&self, file_id: &str) -> Result<DriveFile> {
        let url = format!(
            "{}/files/{}?fields={}",
            self.api_base,
            urlencoding::encode(file_id),
            FILE_FIELDS
        );
        let response = self.get_with_retry(url, file_id).await?;
        serde_json::from_slice(&response.body)
            .map_err(|e| GoogleDriveError::ParseError(format!("file {}: {}", file_id, e)))
    }

    /// Every non-trashed direct child of `folder_id`, across all pages.
    #[instrument(skip(self))]
    pub async fn list_children(&self, folder_id: &str) -> Result<Vec<DriveFile>> {
        let query = format!("'{}' in parents and trashed=false", folder_id.replace('\'', "\\'"));
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = format!(
                "{}/files?q={}&pageSize={}&fields=nextPageToken,incompleteSearch,files({})",
                self.api_base,
                urlencoding::encode(&query),
                MAX_PAGE_SIZE,
                FILE_FIELDS
            );
            if let Some(token) = &page_token {
                url.push_str(&format!("&pageToken={}", urlencoding::encode(token)));
            }

            let response = self.get_with_retry(url, folder_id).await?;
            let page: FilesListResponse = serde_json::from_slice(&response.body).map_err(|e| {
                GoogleDriveError::ParseError(format!("listing of {}: {}", folder_id, e))
            })?;
            if page.incomplete_search {
                warn!(folder_id, "Drive reported an incomplete listing");
            }

            files.extend(page.files.into_iter().filter(|f| !f.trashed));
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!(folder_id, count = files.len(), "Listed folder");
        Ok(files)
    }

    /// Open the file content as a stream. Dropping the reader cancels the
    /// transfer.
    pub async fn open_media(&self, file_id: &str) -> Result<Box<dyn AsyncRead + Send + Unpin>> {
        let request = HttpRequest::get(self.media_url(file_id)).bearer_token(&self.access_token);
        Ok(self.http_client.download_stream(request).await?)
    }
}
