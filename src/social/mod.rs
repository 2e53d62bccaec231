//! Posting a slot to the microblogging platform: resumable media upload followed
//! by post creation, with the checkpoint kept in the catalog row.

pub mod client;
pub mod model;
pub mod upload;

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{info, instrument};

use crate::catalog::{BlobStore, RowStore, SlotWriter};
use crate::clock::Clock;
use crate::config::{AppSettings, ProjectConfig};
use crate::error::PublishError;
use crate::model::Slot;

pub use client::{MediaUploadApi, XClient};
pub use model::{ApiResponse, ProcessingState, UploadCheckpoint};
pub use upload::{
    CheckpointStore, FinalState, MediaSource, PollPolicy, UploadResult, UploadState, UploadStateMachine,
};

use model::CreatePostResponse;

/// Downloads a slot's media from the blob store on demand.
pub struct BlobMedia<'a> {
    blobs: &'a dyn BlobStore,
    blob_id: &'a str,
}

impl<'a> BlobMedia<'a> {
    pub fn new(blobs: &'a dyn BlobStore, blob_id: &'a str) -> Self {
        Self { blobs, blob_id }
    }
}

#[async_trait]
impl MediaSource for BlobMedia<'_> {
    async fn fetch(&self) -> Result<Vec<u8>> {
        self.blobs.download(self.blob_id).await
    }
}

/// Checkpoint stored in the slot's catalog row.
pub struct SlotCheckpoint<'a> {
    writer: SlotWriter<'a>,
    row: u32,
}

impl<'a> SlotCheckpoint<'a> {
    pub fn new(writer: SlotWriter<'a>, row: u32) -> Self {
        Self { writer, row }
    }
}

#[async_trait]
impl CheckpointStore for SlotCheckpoint<'_> {
    async fn save(&self, media_handle: &str) -> Result<()> {
        self.writer.write_checkpoint(self.row, media_handle).await
    }

    async fn clear(&self) -> Result<()> {
        self.writer.clear_checkpoint(self.row).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostAck {
    Posted {
        post_id: String,
        media_id: String,
        resumed: bool,
    },
    Mock {
        message: String,
    },
    AlreadyPosted {
        post_id: String,
    },
    /// Media still processing; the checkpoint stays for the next run.
    StillProcessing {
        media_id: String,
    },
}

impl PostAck {
    pub fn detail(&self) -> String {
        match self {
            PostAck::Posted {
                post_id,
                media_id,
                resumed,
            } => format!(
                "posted as {} with media {}{}",
                post_id,
                media_id,
                if *resumed { " (resumed upload)" } else { "" }
            ),
            PostAck::Mock { message } => message.clone(),
            PostAck::AlreadyPosted { post_id } => format!("already posted as {}", post_id),
            PostAck::StillProcessing { media_id } => {
                format!("media {} still processing; checkpoint kept for next run", media_id)
            }
        }
    }
}

/// Everything `post_slot` talks to.
#[derive(Clone, Copy)]
pub struct PostContext<'a> {
    pub settings: &'a AppSettings,
    pub rows: &'a dyn RowStore,
    pub blobs: &'a dyn BlobStore,
    pub api: &'a dyn MediaUploadApi,
    pub clock: &'a dyn Clock,
}

/// Post one slot with its video. In `mock` mode the checks run but nothing is
/// uploaded or written back.
#[instrument(skip_all, fields(project = %project.id, nr = slot.nr))]
pub async fn post_slot(
    ctx: PostContext<'_>,
    project: &ProjectConfig,
    slot: &Slot,
    mock: bool,
) -> Result<PostAck, PublishError> {
    if let Some(post_id) = &slot.post_id {
        return Ok(PostAck::AlreadyPosted {
            post_id: post_id.clone(),
        });
    }
    let Some(blob_id) = slot.media_blob_id.as_deref() else {
        return Err(PublishError::validation(format!("file {} not found", slot.media_name())));
    };
    if mock {
        return Ok(PostAck::Mock {
            message: format!("[MOCK] slot #{} would be posted now", slot.nr),
        });
    }

    let writer = SlotWriter::new(ctx.rows, project);
    let checkpoint = SlotCheckpoint::new(writer, slot.row);
    let source = BlobMedia::new(ctx.blobs, blob_id);
    let policy = PollPolicy::from(&ctx.settings.poll).with_deadline(Duration::from_secs(ctx.settings.budget_seconds));
    let mut machine = UploadStateMachine::new(ctx.api, ctx.clock, policy);
    let upload = machine
        .upload_or_resume(&source, slot.upload_checkpoint.as_deref(), &checkpoint)
        .await?;

    if upload.final_state == FinalState::StillProcessing && !ctx.settings.post_while_processing {
        return Ok(PostAck::StillProcessing {
            media_id: upload.media_handle,
        });
    }

    let resp = ctx
        .api
        .create_post(&slot.description, std::slice::from_ref(&upload.media_handle))
        .await?;
    if resp.status != 201 {
        return Err(PublishError::RemoteProtocol {
            phase: "POST",
            status: resp.status,
            body: resp.body,
        });
    }
    let post_id = resp
        .json::<CreatePostResponse>()
        .map(|r| r.data.id)
        .map_err(|_| PublishError::MissingField {
            phase: "POST",
            field: "data.id",
        })?;

    writer.write_post_id(slot, &post_id).await?;
    checkpoint.clear().await?;
    info!(%post_id, media_id = %upload.media_handle, "slot posted");

    Ok(PostAck::Posted {
        post_id,
        media_id: upload.media_handle,
        resumed: upload.resumed,
    })
}
