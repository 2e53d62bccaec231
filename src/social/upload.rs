//! Resumable chunked media upload: INIT, APPEND, FINALIZE, then STATUS polling.
//!
//! The media handle is persisted right after INIT, before any bytes are sent.
//! A later run that finds that handle asks STATUS first and never re-sends
//! bytes for a handle the remote side still considers alive.
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use super::client::MediaUploadApi;
use super::model::{ApiResponse, MediaResponse, ProcessingInfo, ProcessingState, UploadCheckpoint};
use crate::clock::Clock;
use crate::config::PollSettings;
use crate::error::PublishError;

pub const CHUNK_SIZE: usize = 4 * 1024 * 1024;
pub const MEDIA_TYPE: &str = "video/mp4";
pub const MEDIA_CATEGORY: &str = "tweet_video";

/// Bounded STATUS polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub max_attempts: u32,
    /// Used when the provider suggests no interval.
    pub default_interval: Duration,
    /// Upper bound for a single wait.
    pub max_interval: Duration,
    /// Elapsed run time no wait may extend past.
    pub deadline: Option<Duration>,
}

impl PollPolicy {
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Whether a wait of `wait` starting at `elapsed` still ends within the deadline.
    pub fn allows(&self, elapsed: Duration, wait: Duration) -> bool {
        self.deadline.map_or(true, |deadline| elapsed + wait <= deadline)
    }

    pub fn interval(&self, suggested_secs: Option<u64>) -> Duration {
        suggested_secs
            .map(Duration::from_secs)
            .unwrap_or(self.default_interval)
            .min(self.max_interval)
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        PollPolicy::from(&PollSettings::default())
    }
}

impl From<&PollSettings> for PollPolicy {
    fn from(s: &PollSettings) -> Self {
        Self {
            max_attempts: s.max_attempts,
            default_interval: Duration::from_secs(s.default_interval_seconds),
            max_interval: Duration::from_secs(s.max_interval_seconds),
            deadline: None,
        }
    }
}

/// Lazily fetched media bytes; not touched when an upload is resumed.
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<u8>>;
}

/// External home of the resumption handle.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn save(&self, media_handle: &str) -> Result<()>;

    async fn clear(&self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    NotStarted,
    Initiated,
    Appending,
    Finalized,
    Polling,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalState {
    Succeeded,
    /// Poll cap reached while the remote side was still working.
    StillProcessing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    pub media_handle: String,
    pub final_state: FinalState,
    /// True when an existing checkpoint was reused and no bytes were sent.
    pub resumed: bool,
}

pub struct UploadStateMachine<'a> {
    api: &'a dyn MediaUploadApi,
    clock: &'a dyn Clock,
    policy: PollPolicy,
    state: UploadState,
}

fn expect_success(phase: &'static str, resp: &ApiResponse) -> Result<(), PublishError> {
    if resp.is_success() {
        Ok(())
    } else {
        Err(PublishError::RemoteProtocol {
            phase,
            status: resp.status,
            body: resp.body.clone(),
        })
    }
}

fn parse_media(phase: &'static str, resp: &ApiResponse) -> Result<MediaResponse, PublishError> {
    resp.json::<MediaResponse>()
        .map_err(|err| PublishError::Remote(anyhow::anyhow!("invalid {} response JSON: {}", phase, err)))
}

fn failure_payload(info: &ProcessingInfo) -> String {
    info.error
        .as_ref()
        .map(|e| e.to_string())
        .unwrap_or_else(|| "no error details".to_string())
}

impl<'a> UploadStateMachine<'a> {
    pub fn new(api: &'a dyn MediaUploadApi, clock: &'a dyn Clock, policy: PollPolicy) -> Self {
        Self {
            api,
            clock,
            policy,
            state: UploadState::NotStarted,
        }
    }

    pub fn state(&self) -> UploadState {
        self.state
    }

    fn transition(&mut self, next: UploadState) {
        debug!(from = ?self.state, to = ?next, "upload state");
        self.state = next;
    }

    /// Upload `source`, or resume the upload behind `existing` if the remote
    /// side still knows it.
    #[instrument(skip_all, fields(checkpoint = existing.unwrap_or("")))]
    pub async fn upload_or_resume(
        &mut self,
        source: &dyn MediaSource,
        existing: Option<&str>,
        checkpoints: &dyn CheckpointStore,
    ) -> Result<UploadResult, PublishError> {
        let result = self.run(source, existing, checkpoints).await;
        if let Err(PublishError::ProcessingFailed(_)) = &result {
            self.transition(UploadState::Failed);
            // The handle is dead; the next run must start over.
            checkpoints.clear().await?;
        }
        result
    }

    async fn run(
        &mut self,
        source: &dyn MediaSource,
        existing: Option<&str>,
        checkpoints: &dyn CheckpointStore,
    ) -> Result<UploadResult, PublishError> {
        if let Some(handle) = existing.map(str::trim).filter(|h| !h.is_empty()) {
            match self.query_status(handle).await {
                Some(cp) if cp.processing_state == ProcessingState::Succeeded => {
                    info!(media_id = handle, "resuming finished upload");
                    self.transition(UploadState::Succeeded);
                    return Ok(UploadResult {
                        media_handle: cp.media_handle,
                        final_state: FinalState::Succeeded,
                        resumed: true,
                    });
                }
                Some(cp) if cp.processing_state.is_waiting() => {
                    info!(media_id = handle, state = ?cp.processing_state, "resuming upload still processing");
                    let final_state = self.poll(handle, cp.check_after_seconds).await?;
                    return Ok(UploadResult {
                        media_handle: cp.media_handle,
                        final_state,
                        resumed: true,
                    });
                }
                Some(cp) => {
                    warn!(media_id = handle, state = ?cp.processing_state, "checkpoint unusable; uploading again");
                    checkpoints.clear().await?;
                }
                None => {
                    warn!(media_id = handle, "checkpoint unknown to remote; uploading again");
                    checkpoints.clear().await?;
                }
            }
        }
        self.fresh_upload(source, checkpoints).await
    }

    /// STATUS for a stored handle. A failed call means the handle cannot be
    /// trusted; a success without processing info means processing is done.
    async fn query_status(&self, handle: &str) -> Option<UploadCheckpoint> {
        let resp = match self.api.status(handle).await {
            Ok(resp) => resp,
            Err(err) => {
                warn!(?err, media_id = handle, "STATUS unreachable");
                return None;
            }
        };
        if !resp.is_success() {
            warn!(media_id = handle, status = resp.status, body = %resp.body, "STATUS rejected");
            return None;
        }
        let media = match resp.json::<MediaResponse>() {
            Ok(media) => media,
            Err(err) => {
                warn!(?err, media_id = handle, "STATUS response unreadable");
                return None;
            }
        };
        let (processing_state, check_after_seconds) = match media.processing_info {
            Some(info) => (info.state, info.check_after_secs),
            None => (ProcessingState::Succeeded, None),
        };
        Some(UploadCheckpoint {
            media_handle: handle.to_string(),
            processing_state,
            check_after_seconds,
        })
    }

    async fn fresh_upload(
        &mut self,
        source: &dyn MediaSource,
        checkpoints: &dyn CheckpointStore,
    ) -> Result<UploadResult, PublishError> {
        let media = source.fetch().await?;
        if media.is_empty() {
            return Err(PublishError::validation("media file is empty"));
        }

        let resp = self
            .api
            .init(media.len() as u64, MEDIA_TYPE, MEDIA_CATEGORY)
            .await?;
        expect_success("INIT", &resp)?;
        let handle = parse_media("INIT", &resp)?
            .media_id_string
            .filter(|id| !id.is_empty())
            .ok_or(PublishError::MissingField {
                phase: "INIT",
                field: "media_id_string",
            })?;
        checkpoints.save(&handle).await?;
        self.transition(UploadState::Initiated);
        info!(media_id = %handle, bytes = media.len(), "upload initiated");

        self.transition(UploadState::Appending);
        for (segment, chunk) in media.chunks(CHUNK_SIZE).enumerate() {
            let resp = self.api.append(&handle, segment, chunk).await?;
            if !resp.is_success() {
                return Err(PublishError::Upload {
                    segment,
                    status: resp.status,
                    body: resp.body,
                });
            }
            debug!(media_id = %handle, segment, "segment appended");
        }

        let resp = self.api.finalize(&handle).await?;
        expect_success("FINALIZE", &resp)?;
        self.transition(UploadState::Finalized);

        let final_state = match parse_media("FINALIZE", &resp)?.processing_info {
            None => {
                self.transition(UploadState::Succeeded);
                FinalState::Succeeded
            }
            Some(info) => match info.state {
                ProcessingState::Succeeded => {
                    self.transition(UploadState::Succeeded);
                    FinalState::Succeeded
                }
                ProcessingState::Failed => {
                    return Err(PublishError::ProcessingFailed(failure_payload(&info)));
                }
                _ => self.poll(&handle, info.check_after_secs).await?,
            },
        };

        Ok(UploadResult {
            media_handle: handle,
            final_state,
            resumed: false,
        })
    }

    /// Poll STATUS until processing ends or the attempt cap is hit.
    async fn poll(&mut self, handle: &str, first_check_after: Option<u64>) -> Result<FinalState, PublishError> {
        self.transition(UploadState::Polling);
        let mut check_after = first_check_after;
        for attempt in 1..=self.policy.max_attempts {
            let wait = self.policy.interval(check_after);
            let elapsed = self.clock.elapsed();
            if !self.policy.allows(elapsed, wait) {
                info!(media_id = handle, attempt, elapsed = elapsed.as_secs(), "run budget exhausted while polling");
                return Ok(FinalState::StillProcessing);
            }
            self.clock.sleep(wait).await;

            let resp = self.api.status(handle).await?;
            expect_success("STATUS", &resp)?;
            let Some(info) = parse_media("STATUS", &resp)?.processing_info else {
                self.transition(UploadState::Succeeded);
                return Ok(FinalState::Succeeded);
            };
            debug!(media_id = handle, attempt, state = ?info.state, progress = ?info.progress_percent, "status polled");
            match info.state {
                ProcessingState::Succeeded => {
                    self.transition(UploadState::Succeeded);
                    return Ok(FinalState::Succeeded);
                }
                ProcessingState::Failed => {
                    return Err(PublishError::ProcessingFailed(failure_payload(&info)));
                }
                ProcessingState::Pending | ProcessingState::InProgress => {
                    check_after = info.check_after_secs;
                }
            }
        }
        info!(media_id = handle, attempts = self.policy.max_attempts, "media still processing");
        Ok(FinalState::StillProcessing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_interval_is_capped() {
        let policy = PollPolicy::default();
        assert_eq!(policy.interval(Some(3)), Duration::from_secs(3));
        assert_eq!(policy.interval(Some(60)), Duration::from_secs(15));
        assert_eq!(policy.interval(None), Duration::from_secs(5));
        assert_eq!(policy.max_attempts, 30);
    }

    #[test]
    fn deadline_bounds_waits() {
        let policy = PollPolicy::default().with_deadline(Duration::from_secs(600));
        assert!(policy.allows(Duration::from_secs(585), Duration::from_secs(15)));
        assert!(!policy.allows(Duration::from_secs(586), Duration::from_secs(15)));
        assert!(PollPolicy::default().allows(Duration::from_secs(10_000), Duration::from_secs(15)));
    }
}
