//! Thin bearer-token REST clients for the catalog (Sheets), the media folder
//! (Drive) and the video platform (YouTube).

pub mod drive;
pub mod model;
pub mod sheets;
pub mod youtube;

use anyhow::{anyhow, Context, Result};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::fmt;
use tracing::warn;

pub use drive::DriveClient;
pub use sheets::SheetsClient;
pub use youtube::YouTubeClient;

const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/";
const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3/";
const YOUTUBE_API_BASE: &str = "https://www.googleapis.com/youtube/v3/";
const UPLOAD_API_BASE: &str = "https://www.googleapis.com/upload/youtube/v3/";

#[derive(Debug, Clone)]
pub struct Endpoints {
    pub sheets: Url,
    pub drive: Url,
    pub youtube: Url,
    pub upload: Url,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            sheets: Url::parse(SHEETS_API_BASE).expect("valid default Sheets URL"),
            drive: Url::parse(DRIVE_API_BASE).expect("valid default Drive URL"),
            youtube: Url::parse(YOUTUBE_API_BASE).expect("valid default YouTube URL"),
            upload: Url::parse(UPLOAD_API_BASE).expect("valid default upload URL"),
        }
    }
}

/// Shared HTTP client and bearer token.
#[derive(Clone)]
pub struct GoogleHttp {
    http: Client,
    token: String,
    endpoints: Endpoints,
}

impl fmt::Debug for GoogleHttp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoogleHttp")
            .field("endpoints", &self.endpoints)
            .finish_non_exhaustive()
    }
}

impl GoogleHttp {
    pub fn new(token: String) -> Result<Self> {
        Self::with_endpoints(token, Endpoints::default())
    }

    pub fn with_endpoints(token: String, endpoints: Endpoints) -> Result<Self> {
        let http = Client::builder()
            .user_agent("nightly-publisher/0.1")
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            token,
            endpoints,
        })
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.bearer_auth(&self.token)
    }

    pub fn get(&self, url: Url) -> RequestBuilder {
        self.authorized(self.http.get(url))
    }

    pub fn post(&self, url: Url) -> RequestBuilder {
        self.authorized(self.http.post(url))
    }

    pub fn put(&self, url: Url) -> RequestBuilder {
        self.authorized(self.http.put(url))
    }

    /// Send and fail on any non-success status, keeping the response body.
    pub async fn send(&self, builder: RequestBuilder, what: &str) -> Result<Response> {
        let res = builder
            .send()
            .await
            .with_context(|| format!("failed to reach Google during {}", what))?;
        if res.status() == StatusCode::UNAUTHORIZED {
            return Err(anyhow!(
                "{}: Google access token rejected (expired or revoked)",
                what
            ));
        }
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            warn!(%status, what, "Google API error");
            return Err(anyhow!("{} failed {}: {}", what, status, body));
        }
        Ok(res)
    }

    pub async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder, what: &str) -> Result<T> {
        let res = self.send(builder, what).await?;
        res.json::<T>()
            .await
            .with_context(|| format!("invalid JSON in {} response", what))
    }
}

/// `base` joined with `path`, each segment percent-encoded.
pub(crate) fn join_segments(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| anyhow!("base URL {} cannot take path segments", base))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segments_are_encoded() {
        let base = Url::parse("https://sheets.googleapis.com/").unwrap();
        let url = join_segments(&base, &["v4", "spreadsheets", "abc", "values", "My Sheet!A2:J420"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/abc/values/My%20Sheet!A2:J420"
        );
    }

    #[test]
    fn requests_carry_bearer_token() {
        let http = GoogleHttp::new("tok".into()).unwrap();
        let req = http
            .get(Url::parse("https://example.com/x").unwrap())
            .build()
            .unwrap();
        assert_eq!(
            req.headers().get("Authorization").and_then(|h| h.to_str().ok()),
            Some("Bearer tok")
        );
        assert!(!format!("{:?}", http).contains("tok\""));
    }
}
