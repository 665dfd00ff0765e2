//! Google Drive API client.

use futures::StreamExt;
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use std::sync::Arc;

use cloudbox_common::{Error, FolderId, Result};

use crate::provider::{ByteStream, NewFile};

use super::auth::TokenManager;

/// Google Drive API base URL.
const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";
/// Google Drive upload API base URL.
const DRIVE_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

/// Chunk size for resumable uploads (must be a multiple of 256KB).
const CHUNK_SIZE: usize = 8 * 256 * 1024; // 2MB

/// Fields requested for every file resource.
const FILE_FIELDS: &str = "id,name";

/// Google Drive file metadata from API.
#[derive(Debug, Clone, Deserialize)]
pub struct DriveFile {
    /// File ID.
    pub id: String,
    /// File name.
    #[serde(default)]
    pub name: String,
}

/// Response from listing files.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileListResponse {
    #[serde(default)]
    files: Vec<DriveFile>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// Query string selecting the children of a folder.
pub(crate) fn children_query(folder_id: &FolderId, include_trashed: bool) -> String {
    if include_trashed {
        format!("'{}' in parents", folder_id)
    } else {
        format!("'{}' in parents and trashed = false", folder_id)
    }
}

/// `Content-Range` header value for a chunk starting at `start_byte`.
pub(crate) fn content_range(start_byte: u64, len: usize, total_size: u64) -> String {
    if len == 0 {
        return format!("bytes */{}", total_size);
    }
    let end_byte = start_byte + len as u64 - 1;
    format!("bytes {}-{}/{}", start_byte, end_byte, total_size)
}

/// Google Drive API client.
pub struct DriveClient {
    http: Client,
    token_manager: Arc<TokenManager>,
    api_base: String,
    upload_base: String,
}

impl DriveClient {
    /// Create a new Drive client.
    ///
    /// # Errors
    /// - HTTP client construction failed
    pub fn new(token_manager: Arc<TokenManager>) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("CloudBox/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            token_manager,
            api_base: DRIVE_API_BASE.to_string(),
            upload_base: DRIVE_UPLOAD_BASE.to_string(),
        })
    }

    /// Point the client at different metadata and upload endpoints.
    pub fn with_base_urls(
        mut self,
        api_base: impl Into<String>,
        upload_base: impl Into<String>,
    ) -> Self {
        self.api_base = api_base.into();
        self.upload_base = upload_base.into();
        self
    }

    /// Get authorization header.
    async fn auth_header(&self) -> Result<String> {
        let token = self.token_manager.get_access_token().await?;
        Ok(format!("Bearer {}", token))
    }

    /// List files in a folder, following every result page.
    pub async fn list_folder(
        &self,
        folder_id: &FolderId,
        include_trashed: bool,
    ) -> Result<Vec<DriveFile>> {
        let mut all_files = Vec::new();
        let mut page_token: Option<String> = None;
        let query = children_query(folder_id, include_trashed);
        let fields = format!("files({}),nextPageToken", FILE_FIELDS);

        loop {
            let url = format!("{}/files", self.api_base);
            let auth = self.auth_header().await?;

            let mut request = self
                .http
                .get(&url)
                .header(header::AUTHORIZATION, auth)
                .query(&[
                    ("q", query.as_str()),
                    ("fields", fields.as_str()),
                    ("pageSize", "1000"),
                ]);

            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let response = request
                .send()
                .await
                .map_err(|e| Error::Network(format!("Failed to list folder: {}", e)))?;

            let list_response: FileListResponse = self.handle_response(response).await?;
            tracing::debug!("Listed {} entries", list_response.files.len());
            all_files.extend(list_response.files);

            match list_response.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(all_files)
    }

    /// Start a resumable upload session.
    ///
    /// Returns the session URI chunks are sent to.
    pub async fn start_resumable_upload(
        &self,
        metadata: &NewFile,
        total_size: u64,
    ) -> Result<String> {
        let url = format!("{}/files", self.upload_base);
        let auth = self.auth_header().await?;

        let response = self
            .http
            .post(&url)
            .header(header::AUTHORIZATION, auth)
            .header("X-Upload-Content-Length", total_size.to_string())
            .query(&[("uploadType", "resumable"), ("fields", FILE_FIELDS)])
            .json(metadata)
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to start resumable upload: {}", e)))?;

        if !response.status().is_success() {
            return Err(self.error_from_response(response).await);
        }

        // Extract upload URI from Location header
        let upload_uri = response
            .headers()
            .get(header::LOCATION)
            .ok_or_else(|| Error::Network("No upload URI in response".to_string()))?
            .to_str()
            .map_err(|e| Error::Network(format!("Invalid upload URI: {}", e)))?
            .to_string();

        Ok(upload_uri)
    }

    /// Upload a chunk to a resumable upload session.
    ///
    /// Returns the created file once the final chunk has been accepted.
    pub async fn upload_chunk(
        &self,
        upload_uri: &str,
        data: Vec<u8>,
        start_byte: u64,
        total_size: u64,
    ) -> Result<Option<DriveFile>> {
        let len = data.len();

        let response = self
            .http
            .put(upload_uri)
            .header(header::CONTENT_LENGTH, len.to_string())
            .header(header::CONTENT_RANGE, content_range(start_byte, len, total_size))
            .body(data)
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to upload chunk: {}", e)))?;

        let status = response.status();

        if status == StatusCode::OK || status == StatusCode::CREATED {
            // Upload complete
            let file: DriveFile = response
                .json()
                .await
                .map_err(|e| Error::Network(format!("Failed to parse upload response: {}", e)))?;
            Ok(Some(file))
        } else if status == StatusCode::PERMANENT_REDIRECT {
            // More chunks needed (308 Resume Incomplete)
            tracing::debug!("Chunk accepted: {} bytes at offset {}", len, start_byte);
            Ok(None)
        } else {
            Err(self.error_from_response(response).await)
        }
    }

    /// Upload a file using resumable upload with streaming.
    pub async fn upload_resumable(
        &self,
        metadata: &NewFile,
        mut stream: ByteStream,
        total_size: u64,
    ) -> Result<DriveFile> {
        let upload_uri = self.start_resumable_upload(metadata, total_size).await?;

        if total_size == 0 {
            return self
                .upload_chunk(&upload_uri, Vec::new(), 0, 0)
                .await?
                .ok_or_else(|| Error::Network("Upload did not complete".to_string()));
        }

        let mut bytes_uploaded = 0u64;
        let mut buffer = Vec::with_capacity(CHUNK_SIZE);

        while let Some(chunk) = stream.next().await {
            let data = chunk?;
            buffer.extend_from_slice(&data);

            // Flush every full chunk
            while buffer.len() >= CHUNK_SIZE {
                let chunk_to_upload: Vec<u8> = buffer.drain(..CHUNK_SIZE).collect();
                let len = chunk_to_upload.len() as u64;
                let result = self
                    .upload_chunk(&upload_uri, chunk_to_upload, bytes_uploaded, total_size)
                    .await?;

                bytes_uploaded += len;

                if let Some(file) = result {
                    return Ok(file);
                }
            }
        }

        // Upload remaining bytes
        if !buffer.is_empty() {
            let result = self
                .upload_chunk(&upload_uri, buffer, bytes_uploaded, total_size)
                .await?;

            if let Some(file) = result {
                return Ok(file);
            }
        }

        Err(Error::Network(format!(
            "Upload did not complete: sent {} of {} bytes",
            bytes_uploaded, total_size
        )))
    }

    /// Handle API response with error checking.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        if response.status().is_success() {
            response
                .json()
                .await
                .map_err(|e| Error::Network(format!("Failed to parse response: {}", e)))
        } else {
            Err(self.error_from_response(response).await)
        }
    }

    /// Map a non-success response onto the common error type.
    async fn error_from_response(&self, response: reqwest::Response) -> Error {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        status_error(status, &body)
    }
}

pub(crate) fn status_error(status: StatusCode, body: &str) -> Error {
    match status {
        StatusCode::NOT_FOUND => Error::NotFound("Resource not found".to_string()),
        StatusCode::UNAUTHORIZED => Error::Authentication("Invalid or expired token".to_string()),
        StatusCode::FORBIDDEN => Error::PermissionDenied(format!("Access denied: {}", body)),
        _ => Error::Network(format!("API error: {} - {}", status, body)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::Tokens;
    use crate::gdrive::provider::DriveStorage;
    use crate::provider::{Authorizer, Content, ListQuery, StorageClient};
    use async_trait::async_trait;
    use axum::{
        body::Bytes,
        extract::{DefaultBodyLimit, Query, State},
        http::HeaderMap,
        response::{IntoResponse, Response},
        routing::{get, post, put},
        Json, Router,
    };
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tokio::sync::oneshot;

    #[test]
    fn test_drive_file_with_only_id() {
        let file: DriveFile = serde_json::from_str(r#"{"id": "abc123"}"#).unwrap();
        assert_eq!(file.id, "abc123");
        assert!(file.name.is_empty());
    }

    #[test]
    fn test_list_response_parsing() {
        let json = r#"{
            "files": [
                {"id": "a", "name": "one.txt"},
                {"id": "b", "name": "two.txt"}
            ],
            "nextPageToken": "page-2"
        }"#;
        let response: FileListResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.files.len(), 2);
        assert_eq!(response.next_page_token.as_deref(), Some("page-2"));

        let empty: FileListResponse = serde_json::from_str("{}").unwrap();
        assert!(empty.files.is_empty());
        assert!(empty.next_page_token.is_none());
    }

    #[test]
    fn test_children_query() {
        let folder = FolderId::new("folder-1").unwrap();
        assert_eq!(
            children_query(&folder, false),
            "'folder-1' in parents and trashed = false"
        );
        assert_eq!(children_query(&folder, true), "'folder-1' in parents");
    }

    #[test]
    fn test_content_range() {
        assert_eq!(content_range(0, 10, 100), "bytes 0-9/100");
        assert_eq!(content_range(90, 10, 100), "bytes 90-99/100");
        assert_eq!(content_range(0, 0, 0), "bytes */0");
    }

    #[test]
    fn test_status_error_mapping() {
        assert!(matches!(
            status_error(StatusCode::NOT_FOUND, ""),
            Error::NotFound(_)
        ));
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, ""),
            Error::Authentication(_)
        ));
        assert!(matches!(
            status_error(StatusCode::FORBIDDEN, "insufficientPermissions"),
            Error::PermissionDenied(_)
        ));
        match status_error(StatusCode::INTERNAL_SERVER_ERROR, "boom") {
            Error::Network(message) => assert!(message.contains("boom")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    struct NoopAuthorizer;

    #[async_trait]
    impl Authorizer for NoopAuthorizer {
        async fn refresh(&self, _tokens: &Tokens) -> Result<Tokens> {
            Err(Error::Authentication("refresh disabled".to_string()))
        }

        async fn login(&self) -> Result<Tokens> {
            Err(Error::Authentication("login disabled".to_string()))
        }
    }

    /// What the fake Drive saw.
    #[derive(Default)]
    struct Recorded {
        authorizations: Vec<String>,
        list_queries: Vec<HashMap<String, String>>,
        upload_query: HashMap<String, String>,
        declared_size: Option<String>,
        metadata: Option<serde_json::Value>,
        ranges: Vec<String>,
        received: Vec<u8>,
    }

    #[derive(Clone)]
    struct FakeState {
        base: String,
        reject_uploads: bool,
        recorded: Arc<Mutex<Recorded>>,
    }

    /// Drive API stand-in served on a random local port.
    struct FakeDrive {
        base: String,
        recorded: Arc<Mutex<Recorded>>,
        shutdown_tx: Option<oneshot::Sender<()>>,
    }

    impl FakeDrive {
        async fn start(reject_uploads: bool) -> Self {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let base = format!("http://{}", listener.local_addr().unwrap());
            let recorded = Arc::new(Mutex::new(Recorded::default()));

            let state = FakeState {
                base: base.clone(),
                reject_uploads,
                recorded: recorded.clone(),
            };

            let app = Router::new()
                .route("/drive/v3/files", get(list_files))
                .route("/upload/drive/v3/files", post(start_upload))
                .route("/session/1", put(put_chunk))
                .layer(DefaultBodyLimit::max(4 * CHUNK_SIZE))
                .with_state(state);

            let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
            tokio::spawn(async move {
                axum::serve(listener, app)
                    .with_graceful_shutdown(async {
                        shutdown_rx.await.ok();
                    })
                    .await
                    .unwrap();
            });

            Self {
                base,
                recorded,
                shutdown_tx: Some(shutdown_tx),
            }
        }

        fn client(&self) -> DriveClient {
            let tokens = Tokens::new(
                "test_access",
                None,
                Utc::now() + chrono::Duration::hours(1),
            );
            let manager = TokenManager::new(Arc::new(NoopAuthorizer), tokens);

            DriveClient::new(Arc::new(manager))
                .unwrap()
                .with_base_urls(
                    format!("{}/drive/v3", self.base),
                    format!("{}/upload/drive/v3", self.base),
                )
        }

        fn recorded(&self) -> std::sync::MutexGuard<'_, Recorded> {
            self.recorded.lock().unwrap()
        }
    }

    impl Drop for FakeDrive {
        fn drop(&mut self) {
            if let Some(tx) = self.shutdown_tx.take() {
                let _ = tx.send(());
            }
        }
    }

    fn bearer(headers: &HeaderMap) -> String {
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    }

    async fn list_files(
        State(state): State<FakeState>,
        Query(query): Query<HashMap<String, String>>,
        headers: HeaderMap,
    ) -> Json<serde_json::Value> {
        let mut recorded = state.recorded.lock().unwrap();
        recorded.authorizations.push(bearer(&headers));
        let page = query.get("pageToken").cloned();
        recorded.list_queries.push(query);

        Json(match page.as_deref() {
            None => serde_json::json!({
                "files": [{"id": "a", "name": "one.txt"}],
                "nextPageToken": "page-2"
            }),
            Some(_) => serde_json::json!({
                "files": [{"id": "b", "name": "two.txt"}]
            }),
        })
    }

    async fn start_upload(
        State(state): State<FakeState>,
        Query(query): Query<HashMap<String, String>>,
        headers: HeaderMap,
        Json(metadata): Json<serde_json::Value>,
    ) -> Response {
        if state.reject_uploads {
            return (StatusCode::FORBIDDEN, "storageQuotaExceeded").into_response();
        }

        let mut recorded = state.recorded.lock().unwrap();
        recorded.authorizations.push(bearer(&headers));
        recorded.upload_query = query;
        recorded.declared_size = headers
            .get("x-upload-content-length")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        recorded.metadata = Some(metadata);

        (
            StatusCode::OK,
            [(header::LOCATION, format!("{}/session/1", state.base))],
        )
            .into_response()
    }

    async fn put_chunk(State(state): State<FakeState>, headers: HeaderMap, body: Bytes) -> Response {
        let mut recorded = state.recorded.lock().unwrap();
        let range = headers
            .get(header::CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        recorded.ranges.push(range.clone());
        recorded.received.extend_from_slice(&body);

        let name = recorded
            .metadata
            .as_ref()
            .and_then(|m| m["name"].as_str())
            .unwrap_or_default()
            .to_string();
        let created = Json(serde_json::json!({"id": "uploaded-1", "name": name}));

        // "bytes */N" finalizes an empty upload
        let spec = range.trim_start_matches("bytes ");
        let (span, total) = spec.split_once('/').unwrap();
        if span == "*" {
            return (StatusCode::OK, created).into_response();
        }

        let (_, end) = span.split_once('-').unwrap();
        let end: u64 = end.parse().unwrap();
        let total: u64 = total.parse().unwrap();

        if end + 1 == total {
            (StatusCode::CREATED, created).into_response()
        } else {
            (
                StatusCode::PERMANENT_REDIRECT,
                [(header::RANGE, format!("bytes=0-{}", end))],
            )
                .into_response()
        }
    }

    #[tokio::test]
    async fn test_upload_resumable_in_chunks() {
        let drive = FakeDrive::start(false).await;
        let client = drive.client();
        let folder = FolderId::new("folder-1").unwrap();

        let data: Vec<u8> = (0..2 * CHUNK_SIZE + 100).map(|i| (i % 251) as u8).collect();
        let total = data.len() as u64;
        let content = Content::from_bytes(data.clone());

        let file = client
            .upload_resumable(
                &NewFile::in_folder("report.pdf", &folder),
                content.stream,
                content.size,
            )
            .await
            .unwrap();

        assert_eq!(file.id, "uploaded-1");
        assert_eq!(file.name, "report.pdf");

        let recorded = drive.recorded();
        assert_eq!(
            recorded.ranges,
            vec![
                format!("bytes 0-{}/{}", CHUNK_SIZE - 1, total),
                format!("bytes {}-{}/{}", CHUNK_SIZE, 2 * CHUNK_SIZE - 1, total),
                format!("bytes {}-{}/{}", 2 * CHUNK_SIZE, total - 1, total),
            ]
        );
        assert!(recorded.received == data);
        assert_eq!(recorded.declared_size, Some(total.to_string()));
        assert_eq!(
            recorded.upload_query.get("uploadType").map(String::as_str),
            Some("resumable")
        );
        assert_eq!(
            recorded.metadata,
            Some(serde_json::json!({"name": "report.pdf", "parents": ["folder-1"]}))
        );
        assert_eq!(recorded.authorizations, vec!["Bearer test_access"]);
    }

    #[tokio::test]
    async fn test_upload_empty_file() {
        let drive = FakeDrive::start(false).await;
        let client = drive.client();
        let folder = FolderId::new("folder-1").unwrap();
        let content = Content::from_bytes(Vec::new());

        let file = client
            .upload_resumable(
                &NewFile::in_folder("empty.txt", &folder),
                content.stream,
                content.size,
            )
            .await
            .unwrap();

        assert_eq!(file.id, "uploaded-1");
        let recorded = drive.recorded();
        assert_eq!(recorded.ranges, vec!["bytes */0"]);
        assert!(recorded.received.is_empty());
        assert_eq!(recorded.declared_size.as_deref(), Some("0"));
    }

    #[tokio::test]
    async fn test_upload_rejected_at_session_start() {
        let drive = FakeDrive::start(true).await;
        let client = drive.client();
        let folder = FolderId::new("folder-1").unwrap();
        let content = Content::from_bytes(vec![1, 2, 3]);

        let result = client
            .upload_resumable(
                &NewFile::in_folder("a.txt", &folder),
                content.stream,
                content.size,
            )
            .await;

        match result {
            Err(Error::PermissionDenied(message)) => {
                assert!(message.contains("storageQuotaExceeded"))
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(drive.recorded().ranges.is_empty());
    }

    #[tokio::test]
    async fn test_list_folder_follows_pages() {
        let drive = FakeDrive::start(false).await;
        let client = drive.client();
        let folder = FolderId::new("folder-1").unwrap();

        let files = client.list_folder(&folder, false).await.unwrap();

        let ids: Vec<&str> = files.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);

        let recorded = drive.recorded();
        assert_eq!(recorded.list_queries.len(), 2);
        assert!(recorded.list_queries[0].get("pageToken").is_none());
        assert_eq!(
            recorded.list_queries[1].get("pageToken").map(String::as_str),
            Some("page-2")
        );
        assert_eq!(
            recorded.list_queries[0].get("q").map(String::as_str),
            Some("'folder-1' in parents and trashed = false")
        );
        assert!(recorded
            .authorizations
            .iter()
            .all(|auth| auth == "Bearer test_access"));
    }

    #[tokio::test]
    async fn test_storage_lists_remote_objects() {
        let drive = FakeDrive::start(false).await;
        let storage = DriveStorage::with_client(drive.client());
        let folder = FolderId::new("folder-1").unwrap();

        let objects = storage
            .list_files(&ListQuery::in_parent(&folder))
            .await
            .unwrap();

        let names: Vec<&str> = objects.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["one.txt", "two.txt"]);
    }
}
