//! Video-platform publishing: metadata construction and the publish / refresh
//! sequences on top of the `VideoPublisher` collaborator.
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::catalog::{BlobStore, RowStore, SlotWriter};
use crate::config::ProjectConfig;
use crate::error::PublishError;
use crate::model::Slot;

/// Platform limit per tag.
pub const MAX_TAG_CHARS: usize = 30;
pub const FOOTER_SEPARATOR: &str = "\n\n---------------------\n";
pub const CAPTION_NAME: &str = "Original";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VideoMetadata {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub category_id: String,
    pub language: String,
    pub privacy_status: String,
    pub publish_at: DateTime<FixedOffset>,
    pub recording_date: DateTime<FixedOffset>,
}

/// What the platform currently holds for a video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteVideo {
    pub id: String,
    pub title: String,
    pub privacy_status: Option<String>,
}

#[async_trait]
pub trait VideoPublisher: Send + Sync {
    /// Upload a new video and return its platform id.
    async fn create(&self, metadata: &VideoMetadata, media: Vec<u8>) -> Result<String>;

    async fn get(&self, video_id: &str) -> Result<Option<RemoteVideo>>;

    async fn update(&self, video_id: &str, metadata: &VideoMetadata) -> Result<()>;

    async fn add_caption(&self, video_id: &str, language: &str, name: &str, data: Vec<u8>) -> Result<()>;

    /// Languages of the captions already attached to a video.
    async fn caption_languages(&self, video_id: &str) -> Result<Vec<String>>;

    async fn add_to_playlist(&self, playlist_id: &str, video_id: &str) -> Result<()>;
}

fn split_tags(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|t| !t.is_empty())
}

/// Project default tags first, then the slot's own; duplicates dropped.
pub fn merge_tags(slot: &Slot, project: &ProjectConfig) -> Result<Vec<String>, PublishError> {
    let mut tags: Vec<String> = Vec::new();
    let mut too_long: Vec<&str> = Vec::new();
    for tag in split_tags(&project.default_tags).chain(split_tags(&slot.tags_raw)) {
        if tag.chars().count() > MAX_TAG_CHARS {
            too_long.push(tag);
            continue;
        }
        if !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }
    if !too_long.is_empty() {
        return Err(PublishError::validation(format!(
            "slot #{} has tags longer than {} characters: {:?} (raw: {:?}, defaults: {:?})",
            slot.nr, MAX_TAG_CHARS, too_long, slot.tags_raw, project.default_tags
        )));
    }
    if tags.is_empty() {
        if let Some(fallback) = project.fallback_tag.as_deref().filter(|t| !t.trim().is_empty()) {
            tags.push(fallback.trim().to_string());
        }
    }
    Ok(tags)
}

impl VideoMetadata {
    pub fn build(slot: &Slot, project: &ProjectConfig) -> Result<Self, PublishError> {
        let title = if slot.title.is_empty() {
            format!("{} #{}", project.fallback_title, slot.nr)
        } else {
            slot.title.clone()
        };
        let mut description = slot.description.clone();
        if !project.footer_text.is_empty() {
            description.push_str(FOOTER_SEPARATOR);
            description.push_str(&project.footer_text);
        }
        Ok(Self {
            title: format!("{} {} - {}", project.title_prefix, slot.nr, title),
            description,
            tags: merge_tags(slot, project)?,
            category_id: project.category_id.clone(),
            language: project.language.clone(),
            privacy_status: "private".into(),
            publish_at: slot.publish_date,
            recording_date: slot.publish_date,
        })
    }
}

/// Metadata a publish of `slot` would send. Read-only.
pub fn preview_video(slot: &Slot, project: &ProjectConfig) -> Result<VideoMetadata, PublishError> {
    VideoMetadata::build(slot, project)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoAck {
    Published {
        video_id: String,
        planned_for: DateTime<FixedOffset>,
        playlist: bool,
        subtitle: bool,
    },
    Mock {
        message: String,
    },
    AlreadyPublished {
        video_id: String,
    },
}

impl VideoAck {
    pub fn detail(&self) -> String {
        match self {
            VideoAck::Published {
                video_id,
                planned_for,
                playlist,
                subtitle,
            } => format!(
                "uploaded as {} (planned for {}{}{})",
                video_id,
                planned_for.format("%d.%m.%Y %H:%M"),
                if *playlist { "" } else { ", not in playlist" },
                if *subtitle { ", with subtitle" } else { "" }
            ),
            VideoAck::Mock { message } => message.clone(),
            VideoAck::AlreadyPublished { video_id } => format!("already published as {}", video_id),
        }
    }

    pub fn is_mock(&self) -> bool {
        matches!(self, VideoAck::Mock { .. })
    }
}

/// Publish one slot. In `mock` mode every check runs but nothing is uploaded or
/// written back.
#[instrument(skip_all, fields(project = %project.id, nr = slot.nr))]
pub async fn publish_video(
    project: &ProjectConfig,
    slot: &Slot,
    rows: &dyn RowStore,
    blobs: &dyn BlobStore,
    video: &dyn VideoPublisher,
    mock: bool,
) -> Result<VideoAck, PublishError> {
    let metadata = VideoMetadata::build(slot, project)?;
    if let Some(video_id) = &slot.video_platform_id {
        return Ok(VideoAck::AlreadyPublished {
            video_id: video_id.clone(),
        });
    }
    let Some(blob_id) = slot.media_blob_id.as_deref() else {
        return Err(PublishError::validation(format!("file {} not found", slot.media_name())));
    };
    if mock {
        return Ok(VideoAck::Mock {
            message: format!("[MOCK] video #{} would be uploaded now", slot.nr),
        });
    }

    let media = blobs.download(blob_id).await?;
    info!(bytes = media.len(), "uploading video");
    let video_id = video.create(&metadata, media).await?;
    // Persist first: a later failure must not lead to a duplicate upload next run.
    SlotWriter::new(rows, project).write_video_id(slot, &video_id).await?;
    info!(%video_id, "video uploaded");

    let playlist = add_to_playlist(project, video, &video_id).await;
    let subtitle = match slot.subtitle_blob_id.as_deref() {
        Some(srt) => match upload_caption(project, blobs, video, &video_id, srt).await {
            Ok(()) => true,
            Err(err) => {
                warn!(?err, %video_id, "caption upload failed");
                false
            }
        },
        None => false,
    };

    Ok(VideoAck::Published {
        video_id,
        planned_for: slot.publish_date,
        playlist,
        subtitle,
    })
}

async fn add_to_playlist(project: &ProjectConfig, video: &dyn VideoPublisher, video_id: &str) -> bool {
    if project.playlist_id.is_empty() {
        return false;
    }
    match video.add_to_playlist(&project.playlist_id, video_id).await {
        Ok(()) => true,
        Err(err) => {
            // Typically "already in playlist".
            warn!(?err, video_id, "playlist insert failed");
            false
        }
    }
}

async fn upload_caption(
    project: &ProjectConfig,
    blobs: &dyn BlobStore,
    video: &dyn VideoPublisher,
    video_id: &str,
    blob_id: &str,
) -> Result<()> {
    let data = blobs.download(blob_id).await?;
    video
        .add_caption(video_id, &project.language, CAPTION_NAME, data)
        .await
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptionStatus {
    NoSubtitleFile,
    AlreadyPresent,
    Uploaded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshAck {
    pub video_id: String,
    pub caption: CaptionStatus,
}

impl RefreshAck {
    pub fn detail(&self) -> String {
        let caption = match self.caption {
            CaptionStatus::NoSubtitleFile => "no subtitle file",
            CaptionStatus::AlreadyPresent => "subtitle already present",
            CaptionStatus::Uploaded => "subtitle uploaded",
        };
        format!("updated {} ({})", self.video_id, caption)
    }
}

/// Push the catalog's current metadata onto an already published video.
#[instrument(skip_all, fields(project = %project.id, nr = slot.nr))]
pub async fn refresh_video(
    project: &ProjectConfig,
    slot: &Slot,
    blobs: &dyn BlobStore,
    video: &dyn VideoPublisher,
) -> Result<RefreshAck, PublishError> {
    let Some(video_id) = slot.video_platform_id.clone() else {
        return Err(PublishError::validation(format!("slot #{} has no video id", slot.nr)));
    };
    let mut metadata = VideoMetadata::build(slot, project)?;
    let Some(remote) = video.get(&video_id).await? else {
        return Err(PublishError::validation(format!(
            "video {} not found on the platform",
            video_id
        )));
    };
    if let Some(privacy) = remote.privacy_status {
        metadata.privacy_status = privacy;
    }
    video.update(&video_id, &metadata).await?;
    info!(%video_id, "video metadata updated");

    add_to_playlist(project, video, &video_id).await;

    let caption = match slot.subtitle_blob_id.as_deref() {
        None => CaptionStatus::NoSubtitleFile,
        Some(srt) => {
            let languages = video.caption_languages(&video_id).await?;
            if languages.iter().any(|l| l == &project.language) {
                CaptionStatus::AlreadyPresent
            } else {
                upload_caption(project, blobs, video, &video_id, srt).await?;
                CaptionStatus::Uploaded
            }
        }
    };

    Ok(RefreshAck { video_id, caption })
}
