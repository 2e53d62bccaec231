use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::header::LOCATION;
use reqwest::Url;
use serde_json::{json, Value};
use tracing::{debug, info, instrument};

use super::model::{CaptionItem, Created, ItemList, VideoItem};
use super::{join_segments, GoogleHttp};
use crate::video::{RemoteVideo, VideoMetadata, VideoPublisher};

const VIDEO_PARTS: &str = "snippet,status,recordingDetails";
const VIDEO_CONTENT_TYPE: &str = "video/mp4";
const CAPTION_CONTENT_TYPE: &str = "application/octet-stream";

/// Video platform client: resumable uploads plus the plain metadata calls.
#[derive(Debug, Clone)]
pub struct YouTubeClient {
    api: GoogleHttp,
}

pub fn build_video_resource(metadata: &VideoMetadata, video_id: Option<&str>) -> Value {
    let mut status = json!({
        "privacyStatus": metadata.privacy_status,
        "selfDeclaredMadeForKids": false,
    });
    // Scheduling is only accepted on private videos.
    if metadata.privacy_status == "private" {
        status["publishAt"] = json!(metadata.publish_at.to_rfc3339());
    }
    let mut body = json!({
        "snippet": {
            "title": metadata.title,
            "description": metadata.description,
            "tags": metadata.tags,
            "categoryId": metadata.category_id,
            "defaultLanguage": metadata.language,
            "defaultAudioLanguage": metadata.language,
        },
        "status": status,
        "recordingDetails": {
            "recordingDate": metadata.recording_date.to_rfc3339(),
        },
    });
    if let Some(id) = video_id {
        body["id"] = json!(id);
    }
    body
}

pub fn build_caption_resource(video_id: &str, language: &str, name: &str) -> Value {
    json!({
        "snippet": {
            "videoId": video_id,
            "language": language,
            "name": name,
            "isDraft": false,
        }
    })
}

pub fn build_playlist_item(playlist_id: &str, video_id: &str) -> Value {
    json!({
        "snippet": {
            "playlistId": playlist_id,
            "resourceId": {
                "kind": "youtube#video",
                "videoId": video_id,
            }
        }
    })
}

impl YouTubeClient {
    pub fn new(api: GoogleHttp) -> Self {
        Self { api }
    }

    fn url(&self, resource: &str) -> Result<Url> {
        join_segments(&self.api.endpoints().youtube, &[resource])
    }

    /// Two-step resumable upload: open a session with the resource JSON, then
    /// send the bytes to the session URL.
    async fn resumable_upload(
        &self,
        resource: &str,
        parts: &str,
        body: &Value,
        content_type: &str,
        data: Vec<u8>,
    ) -> Result<Created> {
        let url = join_segments(&self.api.endpoints().upload, &[resource])?;
        let open = self
            .api
            .post(url)
            .query(&[("uploadType", "resumable"), ("part", parts)])
            .header("X-Upload-Content-Type", content_type)
            .header("X-Upload-Content-Length", data.len().to_string())
            .json(body);
        let res = self.api.send(open, "upload session").await?;
        let session = res
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| anyhow!("upload session response without Location header"))?;
        let session = Url::parse(session).context("invalid upload session URL")?;
        debug!(resource, bytes = data.len(), "upload session opened");

        let put = self
            .api
            .put(session)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(data);
        self.api.send_json(put, "upload").await
    }
}

#[async_trait]
impl VideoPublisher for YouTubeClient {
    #[instrument(skip_all, fields(title = %metadata.title))]
    async fn create(&self, metadata: &VideoMetadata, media: Vec<u8>) -> Result<String> {
        let body = build_video_resource(metadata, None);
        let created = self
            .resumable_upload("videos", VIDEO_PARTS, &body, VIDEO_CONTENT_TYPE, media)
            .await?;
        info!(video_id = %created.id, "video created");
        Ok(created.id)
    }

    async fn get(&self, video_id: &str) -> Result<Option<RemoteVideo>> {
        let builder = self
            .api
            .get(self.url("videos")?)
            .query(&[("part", "snippet,status"), ("id", video_id)]);
        let list: ItemList<VideoItem> = self.api.send_json(builder, "video lookup").await?;
        Ok(list.items.into_iter().next().map(|item| RemoteVideo {
            id: item.id,
            title: item.snippet.map(|s| s.title).unwrap_or_default(),
            privacy_status: item.status.and_then(|s| s.privacy_status),
        }))
    }

    async fn update(&self, video_id: &str, metadata: &VideoMetadata) -> Result<()> {
        let builder = self
            .api
            .put(self.url("videos")?)
            .query(&[("part", VIDEO_PARTS)])
            .json(&build_video_resource(metadata, Some(video_id)));
        self.api.send(builder, "video update").await?;
        Ok(())
    }

    async fn add_caption(&self, video_id: &str, language: &str, name: &str, data: Vec<u8>) -> Result<()> {
        let body = build_caption_resource(video_id, language, name);
        let created = self
            .resumable_upload("captions", "snippet", &body, CAPTION_CONTENT_TYPE, data)
            .await?;
        debug!(caption_id = %created.id, video_id, "caption added");
        Ok(())
    }

    async fn caption_languages(&self, video_id: &str) -> Result<Vec<String>> {
        let builder = self
            .api
            .get(self.url("captions")?)
            .query(&[("part", "snippet"), ("videoId", video_id)]);
        let list: ItemList<CaptionItem> = self.api.send_json(builder, "caption list").await?;
        Ok(list.items.into_iter().map(|c| c.snippet.language).collect())
    }

    async fn add_to_playlist(&self, playlist_id: &str, video_id: &str) -> Result<()> {
        let builder = self
            .api
            .post(self.url("playlistItems")?)
            .query(&[("part", "snippet")])
            .json(&build_playlist_item(playlist_id, video_id));
        self.api.send(builder, "playlist insert").await?;
        Ok(())
    }
}
