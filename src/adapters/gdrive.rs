//! Google Drive adapter
//!
//! - `gdrive://files` - search (`query`, `pageSize`, `pageToken`)
//! - `gdrive://files/{fileId}` - readFile
//!
//! `query` is passed to Drive verbatim (Drive query syntax). Google-native
//! documents are exported to a portable format before download.

use super::{
    encode_content, expect_segments, optional_u32, page_token, required_segment, required_str,
    unsupported_operation, Page, ServiceAdapter,
};
use crate::dispatch::{NormalizedResult, Params};
use crate::error::GatewayError;
use crate::google::GoogleClient;
use crate::locator::{ResourceLocator, Scheme};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

pub const OPERATIONS: &[&str] = &["search", "readFile"];

/// Collection segment addressing Drive files
pub const FILES_SEGMENT: &str = "files";

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

const SEARCH_FIELDS: &str = "nextPageToken, files(id, name, mimeType, modifiedTime, size)";

const GOOGLE_APPS_PREFIX: &str = "application/vnd.google-apps.";

/// Export format for Google-native documents, `None` when not exportable
pub fn export_mime_type(mime_type: &str) -> Option<&'static str> {
    match mime_type.strip_prefix(GOOGLE_APPS_PREFIX)? {
        "document" => Some("text/plain"),
        "spreadsheet" => Some("text/csv"),
        "presentation" => Some("text/plain"),
        "drawing" => Some("image/png"),
        _ => None,
    }
}

/// Downloaded file and its metadata
#[derive(Debug, Clone, Default)]
pub struct DriveFile {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    /// Target format when the file was exported rather than downloaded
    pub exported_as: Option<String>,
    pub bytes: Vec<u8>,
}

/// Calls the Drive adapter needs
#[async_trait]
pub trait DriveBackend: Send + Sync {
    async fn search(&self, query: &str, page_size: u32, page_token: Option<String>) -> Result<Page, GatewayError>;

    async fn read_file(&self, file_id: &str) -> Result<DriveFile, GatewayError>;
}

pub struct DriveAdapter {
    backend: Arc<dyn DriveBackend>,
}

impl DriveAdapter {
    pub fn new(backend: Arc<dyn DriveBackend>) -> Self {
        Self { backend }
    }
}

fn expect_files_root(locator: &ResourceLocator) -> Result<(), GatewayError> {
    if locator.segment(0) == Some(FILES_SEGMENT) {
        Ok(())
    } else {
        Err(GatewayError::invalid_parameters(format!(
            "'{}' is not under gdrive://{}",
            locator, FILES_SEGMENT
        )))
    }
}

fn page_size(params: &Params) -> Result<u32, GatewayError> {
    match optional_u32(params, "pageSize")? {
        None => Ok(DEFAULT_PAGE_SIZE),
        Some(0) => Err(GatewayError::invalid_parameters("pageSize must be at least 1")),
        Some(n) => Ok(n.min(MAX_PAGE_SIZE)),
    }
}

#[async_trait]
impl ServiceAdapter for DriveAdapter {
    fn scheme(&self) -> Scheme {
        Scheme::GDrive
    }

    fn operations(&self) -> &'static [&'static str] {
        OPERATIONS
    }

    fn default_operation(&self, locator: &ResourceLocator) -> Option<&'static str> {
        if locator.segment(0) != Some(FILES_SEGMENT) {
            return None;
        }
        match locator.segments().len() {
            1 => Some("search"),
            2 => Some("readFile"),
            _ => None,
        }
    }

    async fn resolve(
        &self,
        locator: &ResourceLocator,
        operation: &str,
        params: &Params,
    ) -> Result<NormalizedResult, GatewayError> {
        match operation {
            "search" => {
                expect_files_root(locator)?;
                expect_segments(locator, 1, "gdrive://files")?;
                let query = required_str(params, "query")?;
                if query.trim().is_empty() {
                    return Err(GatewayError::invalid_parameters("query must not be empty"));
                }
                let size = page_size(params)?;
                let page = self.backend.search(query, size, page_token(params)?).await?;
                Ok(page.into_result("files"))
            },
            "readFile" => {
                expect_files_root(locator)?;
                expect_segments(locator, 2, "gdrive://files/{fileId}")?;
                let file_id = required_segment(locator, 1, "file id")?;
                let file = self.backend.read_file(file_id).await?;
                let (encoding, content) = encode_content(file.bytes);
                Ok(NormalizedResult::new(json!({
                    "fileId": file.id,
                    "filename": file.name,
                    "mimeType": file.mime_type,
                    "exportedAs": file.exported_as,
                    "encoding": encoding,
                    "content": content,
                })))
            },
            other => Err(unsupported_operation(Scheme::GDrive, other)),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileMetadata {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    mime_type: String,
}

/// Drive v3 over REST
pub struct RestDriveBackend {
    client: GoogleClient,
}

impl RestDriveBackend {
    pub fn new(client: GoogleClient) -> Self {
        Self { client }
    }

    fn file_url(&self, file_id: &str, suffix: &str) -> String {
        let path = format!("files/{}{}", urlencoding::encode(file_id), suffix);
        self.client.endpoints().drive_url(&path)
    }
}

#[async_trait]
impl DriveBackend for RestDriveBackend {
    async fn search(&self, query: &str, page_size: u32, page_token: Option<String>) -> Result<Page, GatewayError> {
        let mut params = vec![
            ("q", query.to_string()),
            ("pageSize", page_size.to_string()),
            ("fields", SEARCH_FIELDS.to_string()),
        ];
        if let Some(token) = page_token {
            params.push(("pageToken", token));
        }

        let url = self.client.endpoints().drive_url("files");
        let response = self.client.get_json(&url, &params).await?;

        let files = response["files"].as_array().cloned().unwrap_or_default();
        let next = response["nextPageToken"].as_str().map(str::to_string);
        Ok(Page::new(files, next))
    }

    async fn read_file(&self, file_id: &str) -> Result<DriveFile, GatewayError> {
        let metadata = self
            .client
            .get_json(
                &self.file_url(file_id, ""),
                &[("fields", "id, name, mimeType".to_string())],
            )
            .await?;
        let metadata: FileMetadata = serde_json::from_value(metadata)?;

        let (download, exported_as) = if metadata.mime_type.starts_with(GOOGLE_APPS_PREFIX) {
            let Some(target) = export_mime_type(&metadata.mime_type) else {
                return Err(GatewayError::invalid_parameters(format!(
                    "'{}' ({}) has no downloadable content",
                    metadata.name, metadata.mime_type
                )));
            };
            let download = self
                .client
                .get_bytes(
                    &self.file_url(file_id, "/export"),
                    &[("mimeType", target.to_string())],
                )
                .await?;
            (download, Some(target.to_string()))
        } else {
            let download = self
                .client
                .get_bytes(&self.file_url(file_id, ""), &[("alt", "media".to_string())])
                .await?;
            (download, None)
        };

        tracing::debug!("Read Drive file {} ({} bytes)", metadata.id, download.bytes.len());

        Ok(DriveFile {
            id: metadata.id,
            name: metadata.name,
            mime_type: metadata.mime_type,
            exported_as,
            bytes: download.bytes,
        })
    }
}
