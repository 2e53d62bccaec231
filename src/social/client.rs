use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::{Client, Url};
use serde_json::json;
use std::fmt;
use tracing::debug;

use super::model::ApiResponse;
use crate::signer::{self, Credentials, ParamValue};

const UPLOAD_ENDPOINT: &str = "https://upload.twitter.com/1.1/media/upload.json";
const POST_ENDPOINT: &str = "https://api.twitter.com/2/tweets";

/// Chunked media upload protocol plus post creation. Transport failures are
/// errors; HTTP statuses are returned as-is.
#[async_trait]
pub trait MediaUploadApi: Send + Sync {
    async fn init(&self, total_bytes: u64, media_type: &str, media_category: &str) -> Result<ApiResponse>;

    async fn append(&self, media_id: &str, segment_index: usize, chunk: &[u8]) -> Result<ApiResponse>;

    async fn finalize(&self, media_id: &str) -> Result<ApiResponse>;

    async fn status(&self, media_id: &str) -> Result<ApiResponse>;

    async fn create_post(&self, text: &str, media_ids: &[String]) -> Result<ApiResponse>;
}

#[derive(Clone)]
pub struct XClient {
    http: Client,
    upload_url: Url,
    post_url: Url,
    credentials: Credentials,
}

impl fmt::Debug for XClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XClient")
            .field("upload_url", &self.upload_url)
            .field("post_url", &self.post_url)
            .finish_non_exhaustive()
    }
}

impl XClient {
    pub fn new(credentials: Credentials) -> Result<Self> {
        let upload_url = Url::parse(UPLOAD_ENDPOINT).context("invalid upload endpoint")?;
        let post_url = Url::parse(POST_ENDPOINT).context("invalid post endpoint")?;
        Self::with_endpoints(credentials, upload_url, post_url)
    }

    pub fn with_endpoints(credentials: Credentials, upload_url: Url, post_url: Url) -> Result<Self> {
        let http = Client::builder()
            .user_agent("nightly-publisher/0.1")
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            upload_url,
            post_url,
            credentials,
        })
    }

    /// Signed form POST against the upload endpoint; every text field is signed.
    pub fn build_upload_request(&self, params: &[(&str, ParamValue)]) -> Result<reqwest::Request> {
        let auth = signer::sign(self.upload_url.as_str(), "POST", params, &self.credentials);
        let form: Vec<(&str, &str)> = params
            .iter()
            .filter_map(|(k, v)| match v {
                ParamValue::Text(s) => Some((*k, s.as_str())),
                ParamValue::Binary(_) => None,
            })
            .collect();
        self.http
            .post(self.upload_url.clone())
            .header("Authorization", auth)
            .form(&form)
            .build()
            .context("failed to build upload request")
    }

    async fn execute(&self, request: reqwest::Request, phase: &str) -> Result<ApiResponse> {
        debug!(phase, url = %request.url(), "sending request");
        let res = self
            .http
            .execute(request)
            .await
            .with_context(|| format!("failed to reach X during {}", phase))?;
        let status = res.status().as_u16();
        let body = res
            .text()
            .await
            .with_context(|| format!("failed to read X {} response", phase))?;
        debug!(phase, status, "response received");
        Ok(ApiResponse { status, body })
    }
}

#[async_trait]
impl MediaUploadApi for XClient {
    async fn init(&self, total_bytes: u64, media_type: &str, media_category: &str) -> Result<ApiResponse> {
        let params: Vec<(&str, ParamValue)> = vec![
            ("command", "INIT".into()),
            ("media_type", media_type.into()),
            ("media_category", media_category.into()),
            ("total_bytes", total_bytes.to_string().into()),
        ];
        let request = self.build_upload_request(&params)?;
        self.execute(request, "INIT").await
    }

    async fn append(&self, media_id: &str, segment_index: usize, chunk: &[u8]) -> Result<ApiResponse> {
        let params: Vec<(&str, ParamValue)> = vec![
            ("command", "APPEND".into()),
            ("media_id", media_id.into()),
            ("segment_index", segment_index.to_string().into()),
            ("media", BASE64.encode(chunk).into()),
        ];
        let request = self.build_upload_request(&params)?;
        self.execute(request, "APPEND").await
    }

    async fn finalize(&self, media_id: &str) -> Result<ApiResponse> {
        let params: Vec<(&str, ParamValue)> =
            vec![("command", "FINALIZE".into()), ("media_id", media_id.into())];
        let request = self.build_upload_request(&params)?;
        self.execute(request, "FINALIZE").await
    }

    async fn status(&self, media_id: &str) -> Result<ApiResponse> {
        let params: Vec<(&str, ParamValue)> =
            vec![("command", "STATUS".into()), ("media_id", media_id.into())];
        let auth = signer::sign(self.upload_url.as_str(), "GET", &params, &self.credentials);
        let request = self
            .http
            .get(self.upload_url.clone())
            .header("Authorization", auth)
            .query(&[("command", "STATUS"), ("media_id", media_id)])
            .build()
            .context("failed to build status request")?;
        self.execute(request, "STATUS").await
    }

    async fn create_post(&self, text: &str, media_ids: &[String]) -> Result<ApiResponse> {
        // JSON bodies are not part of the signature base.
        let auth = signer::sign(self.post_url.as_str(), "POST", &[], &self.credentials);
        let body = json!({ "text": text, "media": { "media_ids": media_ids } });
        let request = self
            .http
            .post(self.post_url.clone())
            .header("Authorization", auth)
            .json(&body)
            .build()
            .context("failed to build post request")?;
        self.execute(request, "POST").await
    }
}
