use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::RequestBuilder;
use tracing::{debug, instrument};

use super::model::FileList;
use super::{join_segments, GoogleHttp};
use crate::catalog::{BlobEntry, BlobStore};

const LIST_FIELDS: &str = "nextPageToken,files(id,name,createdTime)";
const PAGE_SIZE: &str = "1000";

/// Drive folder listing and download as a blob store.
#[derive(Debug, Clone)]
pub struct DriveClient {
    api: GoogleHttp,
}

/// Drive query literal: backslash and single quote are escaped.
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

pub fn list_query(folder_id: &str, name: Option<&str>) -> String {
    let mut q = format!("{} in parents and trashed = false", quote(folder_id));
    if let Some(name) = name {
        q.push_str(&format!(" and name = {}", quote(name)));
    }
    q
}

impl DriveClient {
    pub fn new(api: GoogleHttp) -> Self {
        Self { api }
    }

    fn list_request(&self, query: &str, page_token: Option<&str>) -> Result<RequestBuilder> {
        let url = join_segments(&self.api.endpoints().drive, &["files"])?;
        let mut builder = self.api.get(url).query(&[
            ("q", query),
            ("fields", LIST_FIELDS),
            ("pageSize", PAGE_SIZE),
            ("supportsAllDrives", "true"),
            ("includeItemsFromAllDrives", "true"),
        ]);
        if let Some(token) = page_token {
            builder = builder.query(&[("pageToken", token)]);
        }
        Ok(builder)
    }
}

#[async_trait]
impl BlobStore for DriveClient {
    #[instrument(skip_all, fields(folder_id = folder_id, name = name.unwrap_or("")))]
    async fn list_by_parent_and_name(&self, folder_id: &str, name: Option<&str>) -> Result<Vec<BlobEntry>> {
        let query = list_query(folder_id, name);
        let mut entries = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let page: FileList = self
                .api
                .send_json(self.list_request(&query, page_token.as_deref())?, "drive list")
                .await?;
            entries.extend(page.files.into_iter().map(|f| BlobEntry {
                id: f.id,
                name: f.name,
                created_time: f.created_time,
            }));
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        debug!(count = entries.len(), "drive files listed");
        Ok(entries)
    }

    async fn download(&self, blob_id: &str) -> Result<Vec<u8>> {
        let url = join_segments(&self.api.endpoints().drive, &["files", blob_id])?;
        let builder = self
            .api
            .get(url)
            .query(&[("alt", "media"), ("supportsAllDrives", "true")]);
        let res = self.api.send(builder, "drive download").await?;
        let bytes = res
            .bytes()
            .await
            .with_context(|| format!("failed to read file {}", blob_id))?;
        debug!(blob_id, bytes = bytes.len(), "file downloaded");
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_for_folder_only() {
        assert_eq!(list_query("folder-1", None), "'folder-1' in parents and trashed = false");
    }

    #[test]
    fn query_escapes_names() {
        assert_eq!(
            list_query("f", Some("it's.mp4")),
            "'f' in parents and trashed = false and name = 'it\\'s.mp4'"
        );
    }

    #[test]
    fn list_request_carries_page_token() {
        let client = DriveClient::new(GoogleHttp::new("t".into()).unwrap());
        let req = client
            .list_request("q", Some("next"))
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(req.url().path(), "/drive/v3/files");
        let pairs: Vec<(String, String)> = req.url().query_pairs().into_owned().collect();
        assert!(pairs.contains(&("pageToken".to_string(), "next".to_string())));
        assert!(pairs.contains(&("pageSize".to_string(), "1000".to_string())));
    }
}
