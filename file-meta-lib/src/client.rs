use log::debug;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use warp::http::StatusCode;

use crate::http_api::ErrorBody;
use crate::{FileMetaError, FileMetaResult, FileMetadataRecord, InodeId};

/// Typed client for the `/api/files` endpoints.
#[derive(Clone)]
pub struct FileMetaClient {
    base_url: String,
    client: Client,
}

impl FileMetaClient {
    /// `base_url` is the server root, e.g. `http://127.0.0.1:8080`.
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    fn url(&self, action: &str) -> String {
        format!("{}/api/files/{}", self.base_url, action)
    }

    pub async fn create_file(&self, file_name: &str) -> FileMetaResult<FileMetadataRecord> {
        let resp = self
            .client
            .post(self.url("create"))
            .query(&[("fileName", file_name)])
            .send()
            .await
            .map_err(|e| FileMetaError::RemoteError(format!("create {}: {}", file_name, e)))?;
        Self::decode(resp).await
    }

    pub async fn link_file(
        &self,
        old_file_name: &str,
        new_file_name: &str,
    ) -> FileMetaResult<FileMetadataRecord> {
        let resp = self
            .client
            .post(self.url("link"))
            .query(&[("oldFileName", old_file_name), ("newFileName", new_file_name)])
            .send()
            .await
            .map_err(|e| {
                FileMetaError::RemoteError(format!(
                    "link {} -> {}: {}",
                    new_file_name, old_file_name, e
                ))
            })?;
        Self::decode(resp).await
    }

    pub async fn delete_file(&self, file_name: &str) -> FileMetaResult<()> {
        let resp = self
            .client
            .delete(self.url("delete"))
            .query(&[("fileName", file_name)])
            .send()
            .await
            .map_err(|e| FileMetaError::RemoteError(format!("delete {}: {}", file_name, e)))?;
        if resp.status().is_success() {
            return Ok(());
        }
        Err(Self::error_from(resp).await)
    }

    pub async fn stat_file(&self, file_name: &str) -> FileMetaResult<FileMetadataRecord> {
        let resp = self
            .client
            .get(self.url("stat"))
            .query(&[("fileName", file_name)])
            .send()
            .await
            .map_err(|e| FileMetaError::RemoteError(format!("stat {}: {}", file_name, e)))?;
        Self::decode(resp).await
    }

    pub async fn find_by_inode(&self, inode: InodeId) -> FileMetaResult<FileMetadataRecord> {
        let resp = self
            .client
            .get(self.url("inode"))
            .query(&[("inode", inode)])
            .send()
            .await
            .map_err(|e| FileMetaError::RemoteError(format!("inode {}: {}", inode, e)))?;
        Self::decode(resp).await
    }

    async fn decode<T: DeserializeOwned>(resp: Response) -> FileMetaResult<T> {
        if !resp.status().is_success() {
            return Err(Self::error_from(resp).await);
        }
        resp.json::<T>()
            .await
            .map_err(|e| FileMetaError::InvalidData(format!("decode response failed: {}", e)))
    }

    async fn error_from(resp: Response) -> FileMetaError {
        // reqwest and warp sit on different `http` majors
        let code = StatusCode::from_u16(resp.status().as_u16())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let text = resp.text().await.unwrap_or_default();
        let info = serde_json::from_str::<ErrorBody>(&text)
            .map(|body| body.message)
            .unwrap_or(text);
        debug!("file meta server answered {}: {}", code, info);
        FileMetaError::from_http_status(code, info)
    }
}
