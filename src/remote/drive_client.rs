//! Paginated folder listing against the Drive v3 `files` endpoint.
//!
//! Pages are requested until the server stops returning a `nextPageToken` or
//! the record cap is reached. Pages are concatenated in server order. Any
//! failing page aborts the whole listing; nothing partial is returned.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, trace, warn};

use crate::error::SyncError;
use crate::models::{PhotoRecord, PhotoUrls};
use crate::remote::{Credentials, PhotoSource};

/// Default listing endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://www.googleapis.com/drive/v3/files";

/// Records requested per page.
pub const PAGE_SIZE: u32 = 100;

/// Stop paginating once this many records have been collected.
pub const MAX_RECORDS: usize = 1000;

/// Fields requested for each file.
const FILE_FIELDS: &str =
    "nextPageToken, files(id, name, mimeType, thumbnailLink, webContentLink, createdTime, modifiedTime, size)";

/// Longest error body echoed back into an error message.
const MAX_ERROR_BODY: usize = 200;

/// Configuration for the listing client.
#[derive(Debug, Clone)]
pub struct ListingConfig {
    pub endpoint: String,
    pub page_size: u32,
    pub max_records: usize,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            page_size: PAGE_SIZE,
            max_records: MAX_RECORDS,
            timeout: Duration::from_secs(30),
        }
    }
}

/// One page of a `files.list` response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileListPage {
    #[serde(default)]
    pub files: Vec<DriveFile>,
    pub next_page_token: Option<String>,
}

/// A raw file entry as returned by the listing API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub mime_type: Option<String>,
    pub thumbnail_link: Option<String>,
    pub web_content_link: Option<String>,
    pub created_time: Option<String>,
    pub modified_time: Option<String>,
    /// int64 values are encoded as JSON strings by this API.
    pub size: Option<String>,
}

impl DriveFile {
    fn is_image(&self) -> bool {
        self.mime_type
            .as_deref()
            .map_or(true, |mime| mime.starts_with("image/"))
    }
}

impl From<DriveFile> for PhotoRecord {
    fn from(file: DriveFile) -> Self {
        let urls = PhotoUrls::derive(
            &file.id,
            file.thumbnail_link.as_deref(),
            file.web_content_link.as_deref(),
        );
        PhotoRecord {
            size: file.size.as_deref().and_then(|s| s.parse().ok()),
            id: file.id,
            name: file.name,
            mime_type: file.mime_type,
            created_time: file.created_time,
            modified_time: file.modified_time,
            urls,
        }
    }
}

/// HTTP client for the remote folder listing.
pub struct DriveClient {
    http: reqwest::Client,
    config: ListingConfig,
}

impl DriveClient {
    /// Creates a client with default configuration.
    pub fn new() -> Result<Self, SyncError> {
        Self::with_config(ListingConfig::default())
    }

    /// Creates a client with custom configuration.
    pub fn with_config(config: ListingConfig) -> Result<Self, SyncError> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { http, config })
    }

    /// Builds the query string for one page request.
    pub fn query_params(
        &self,
        credentials: &Credentials,
        page_token: Option<&str>,
    ) -> Vec<(&'static str, String)> {
        let folder = credentials.folder_id.replace('\'', "\\'");
        let mut params = vec![
            (
                "q",
                format!("'{folder}' in parents and mimeType contains 'image/' and trashed = false"),
            ),
            ("fields", FILE_FIELDS.to_string()),
            ("pageSize", self.config.page_size.to_string()),
            ("orderBy", "modifiedTime desc".to_string()),
            ("key", credentials.api_key.clone()),
        ];
        if let Some(token) = page_token {
            params.push(("pageToken", token.to_string()));
        }
        params
    }

    /// Requests a single page.
    async fn fetch_page(
        &self,
        credentials: &Credentials,
        page_token: Option<String>,
    ) -> Result<FileListPage, SyncError> {
        let params = self.query_params(credentials, page_token.as_deref());
        let response = self
            .http
            .get(&self.config.endpoint)
            .query(&params)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let mut message: String = body.chars().take(MAX_ERROR_BODY).collect();
            if message.is_empty() {
                message = status
                    .canonical_reason()
                    .unwrap_or("unknown status")
                    .to_string();
            }
            return Err(SyncError::Transport {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str(&body).map_err(|e| SyncError::Decode(e.to_string()))
    }
}

#[async_trait]
impl PhotoSource for DriveClient {
    async fn list_photos(&self, credentials: &Credentials) -> Result<Vec<PhotoRecord>, SyncError> {
        credentials.validate()?;

        let files = collect_pages(self.config.max_records, |token| {
            self.fetch_page(credentials, token)
        })
        .await
        .map_err(|err| {
            warn!(error = ?err, "Folder listing failed");
            err
        })?;

        let photos: Vec<PhotoRecord> = files
            .into_iter()
            .filter(DriveFile::is_image)
            .map(PhotoRecord::from)
            .collect();

        info!("Listed {} photos from folder {}", photos.len(), credentials.folder_id);
        Ok(photos)
    }
}

/// Drives pagination: calls `fetch_page` with the previous page's token until
/// there is none or `max_records` entries have been collected.
///
/// The first call receives `None`. An error from any page is returned as-is
/// and everything collected so far is dropped.
pub async fn collect_pages<F, Fut>(max_records: usize, mut fetch_page: F) -> Result<Vec<DriveFile>, SyncError>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<FileListPage, SyncError>>,
{
    let mut files = Vec::new();
    let mut page_token: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let page = fetch_page(page_token.take()).await?;
        pages += 1;
        trace!(
            "Page {}: {} files, more = {}",
            pages,
            page.files.len(),
            page.next_page_token.is_some()
        );
        files.extend(page.files);

        if files.len() >= max_records {
            debug!("Reached record cap of {} after {} pages", max_records, pages);
            files.truncate(max_records);
            break;
        }

        match page.next_page_token {
            Some(token) if !token.is_empty() => page_token = Some(token),
            _ => break,
        }
    }

    Ok(files)
}
