//! The nightly run: every configured project in turn, video phase first, then
//! at most one social post, all inside one wall-clock budget.
//!
//! Nothing raises past [`Orchestrator::run`]. Slot failures become `ERROR`
//! entries, project failures land in [`ProjectReport::error`], and running out
//! of time is a `SKIPPED` entry that the next run picks up again.
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

use crate::catalog::{find_slot, list_catalog, load_slots, BlobStore, CatalogEntry, RowStore};
use crate::clock::Clock;
use crate::config::{AppSettings, ProjectConfig};
use crate::eligibility::{select_for_social_post, select_for_video_publish, SocialSelection};
use crate::error::PublishError;
use crate::model::{ProjectMode, ProjectReport, ProjectStatus, RunReport, RunType, Slot, TargetResult};
use crate::social::{post_slot, MediaUploadApi, PostAck, PostContext};
use crate::video::{preview_video, publish_video, refresh_video, RefreshAck, VideoAck, VideoMetadata, VideoPublisher};

/// Remote services a run talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub rows: Arc<dyn RowStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub video: Arc<dyn VideoPublisher>,
    pub social: Arc<dyn MediaUploadApi>,
}

pub struct Orchestrator {
    settings: AppSettings,
    services: Collaborators,
    clock: Arc<dyn Clock>,
}

/// Error text for reports, including the anyhow context chain.
pub fn describe(err: &PublishError) -> String {
    match err {
        PublishError::Remote(inner) => format!("{:#}", inner),
        other => other.to_string(),
    }
}

pub fn video_result(nr: u32, ack: &VideoAck) -> TargetResult {
    match ack {
        VideoAck::Published { .. } | VideoAck::Mock { .. } => {
            TargetResult::processed(nr, ack.detail(), ack.is_mock())
        }
        VideoAck::AlreadyPublished { .. } => TargetResult::skipped(Some(nr), ack.detail()),
    }
}

pub fn post_result(nr: u32, ack: &PostAck) -> TargetResult {
    match ack {
        PostAck::Posted { .. } => TargetResult::processed(nr, ack.detail(), false),
        PostAck::Mock { .. } => TargetResult::processed(nr, ack.detail(), true),
        PostAck::AlreadyPosted { .. } | PostAck::StillProcessing { .. } => {
            TargetResult::skipped(Some(nr), ack.detail())
        }
    }
}

impl Orchestrator {
    pub fn new(settings: AppSettings, services: Collaborators, clock: Arc<dyn Clock>) -> Self {
        Self {
            settings,
            services,
            clock,
        }
    }

    fn post_context(&self) -> PostContext<'_> {
        PostContext {
            settings: &self.settings,
            rows: self.services.rows.as_ref(),
            blobs: self.services.blobs.as_ref(),
            api: self.services.social.as_ref(),
            clock: self.clock.as_ref(),
        }
    }

    #[instrument(skip_all, fields(run_type = %run_type, reference_time = %reference_time))]
    pub async fn run(&self, projects: &[ProjectConfig], reference_time: DateTime<Utc>, run_type: RunType) -> RunReport {
        let mut reports = Vec::with_capacity(projects.len());
        for project in projects {
            reports.push(self.run_project(project, reference_time, run_type).await);
        }
        let elapsed_seconds = self.clock.elapsed().as_secs_f64();
        info!(projects = reports.len(), elapsed_seconds, "nightly run finished");
        RunReport {
            reference_time,
            run_type,
            elapsed_seconds,
            projects: reports,
        }
    }

    #[instrument(skip_all, fields(project = %project.id, mode = project.mode.as_str()))]
    async fn run_project(&self, project: &ProjectConfig, reference_time: DateTime<Utc>, run_type: RunType) -> ProjectReport {
        if project.mode == ProjectMode::Off {
            info!("project switched off");
            return ProjectReport::new(&project.id, project.display_title(), ProjectStatus::Off);
        }
        let mut report = ProjectReport::new(&project.id, project.display_title(), ProjectStatus::Active);
        let wants_video = project.video_active && run_type.includes_video();
        let wants_social = project.social_active && run_type.includes_social();
        if !wants_video && !wants_social {
            return report;
        }

        let slots = match load_slots(project, self.services.rows.as_ref(), self.services.blobs.as_ref()).await {
            Ok(slots) => slots,
            Err(err) => {
                error!(?err, "catalog could not be loaded");
                report.error = Some(format!("{:#}", err));
                return report;
            }
        };
        let mock = project.mode == ProjectMode::Mock;

        if wants_video {
            report.video = self.video_phase(project, &slots, mock).await;
        }
        if wants_social {
            report.social = self.social_phase(project, &slots, reference_time, mock).await;
        }
        report
    }

    /// Oldest first; the first failure ends the phase so no slot overtakes an
    /// earlier one.
    async fn video_phase(&self, project: &ProjectConfig, slots: &[Slot], mock: bool) -> Vec<TargetResult> {
        let ceiling = Duration::from_secs(self.settings.video_phase_ceiling_seconds);
        let due = select_for_video_publish(slots);
        let mut results = Vec::with_capacity(due.len());
        for (idx, slot) in due.iter().enumerate() {
            let elapsed = self.clock.elapsed();
            if elapsed > ceiling {
                warn!(nr = slot.nr, elapsed = elapsed.as_secs(), "video time limit reached");
                results.extend(due[idx..].iter().map(|s| {
                    TargetResult::skipped(
                        Some(s.nr),
                        format!("time limit reached after {}s; left for the next run", elapsed.as_secs()),
                    )
                }));
                break;
            }
            match publish_video(
                project,
                slot,
                self.services.rows.as_ref(),
                self.services.blobs.as_ref(),
                self.services.video.as_ref(),
                mock,
            )
            .await
            {
                Ok(ack) => results.push(video_result(slot.nr, &ack)),
                Err(err) => {
                    error!(?err, nr = slot.nr, "video publish failed; stopping video phase");
                    results.push(TargetResult::error(slot.nr, describe(&err)));
                    break;
                }
            }
        }
        results
    }

    async fn social_phase(
        &self,
        project: &ProjectConfig,
        slots: &[Slot],
        reference_time: DateTime<Utc>,
        mock: bool,
    ) -> Vec<TargetResult> {
        let budget = self.settings.budget_seconds;
        let reserve = self.settings.social_min_remaining_seconds;
        let elapsed = self.clock.elapsed();
        if elapsed >= Duration::from_secs(budget.saturating_sub(reserve)) {
            warn!(elapsed = elapsed.as_secs(), "not enough budget left for the social phase");
            return vec![TargetResult::skipped(
                None,
                format!(
                    "time limit: {}s elapsed, less than {}s of the {}s budget left",
                    elapsed.as_secs(),
                    reserve,
                    budget
                ),
            )];
        }

        // Calendar dates are judged in the catalog's own offset.
        let reference = reference_time.with_timezone(project.start_date.offset());
        let slot = match select_for_social_post(slots, reference, project.social_policy) {
            SocialSelection::Candidate(slot) => slot,
            SocialSelection::NoEligibleCandidate => {
                info!("no unposted slot is due");
                return vec![TargetResult::skipped(None, "no unposted slot is due")];
            }
            SocialSelection::NotDueToday { date } => {
                info!(%date, "nothing to post for today");
                return vec![TargetResult::skipped(
                    None,
                    format!("no unposted slot scheduled for {}", date),
                )];
            }
        };

        match post_slot(self.post_context(), project, slot, mock).await {
            Ok(ack) => vec![post_result(slot.nr, &ack)],
            Err(err) => {
                error!(?err, nr = slot.nr, "social post failed");
                vec![TargetResult::error(slot.nr, describe(&err))]
            }
        }
    }

    async fn slots(&self, project: &ProjectConfig) -> Result<Vec<Slot>, PublishError> {
        if project.mode == ProjectMode::Off {
            return Err(PublishError::validation(format!("project {} is switched off", project.id)));
        }
        Ok(load_slots(project, self.services.rows.as_ref(), self.services.blobs.as_ref()).await?)
    }

    pub async fn list(&self, project: &ProjectConfig) -> Result<Vec<CatalogEntry>, PublishError> {
        Ok(list_catalog(&self.slots(project).await?))
    }

    pub async fn preview(&self, project: &ProjectConfig, nr: u32) -> Result<VideoMetadata, PublishError> {
        let slots = self.slots(project).await?;
        preview_video(find_slot(&slots, nr)?, project)
    }

    /// Manual publish of a single slot, outside the nightly order.
    #[instrument(skip_all, fields(project = %project.id, nr = nr))]
    pub async fn publish_one(&self, project: &ProjectConfig, nr: u32) -> Result<VideoAck, PublishError> {
        let slots = self.slots(project).await?;
        let slot = find_slot(&slots, nr)?;
        publish_video(
            project,
            slot,
            self.services.rows.as_ref(),
            self.services.blobs.as_ref(),
            self.services.video.as_ref(),
            project.mode == ProjectMode::Mock,
        )
        .await
    }

    #[instrument(skip_all, fields(project = %project.id, nr = nr))]
    pub async fn post_one(&self, project: &ProjectConfig, nr: u32) -> Result<PostAck, PublishError> {
        let slots = self.slots(project).await?;
        let slot = find_slot(&slots, nr)?;
        post_slot(self.post_context(), project, slot, project.mode == ProjectMode::Mock).await
    }

    #[instrument(skip_all, fields(project = %project.id, nr = nr))]
    pub async fn refresh_one(&self, project: &ProjectConfig, nr: u32) -> Result<RefreshAck, PublishError> {
        let slots = self.slots(project).await?;
        let slot = find_slot(&slots, nr)?;
        if project.mode == ProjectMode::Mock {
            return Err(PublishError::validation(format!(
                "project {} is in MOCK mode; refresh would modify the published video",
                project.id
            )));
        }
        refresh_video(project, slot, self.services.blobs.as_ref(), self.services.video.as_ref()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    #[test]
    fn acks_map_to_outcomes() {
        let published = VideoAck::Published {
            video_id: "v".into(),
            planned_for: DateTime::parse_from_rfc3339("2026-01-02T21:21:00+01:00").unwrap(),
            playlist: true,
            subtitle: false,
        };
        assert_eq!(video_result(2, &published).outcome, crate::model::Outcome::Processed);
        let mock = video_result(2, &VideoAck::Mock { message: "m".into() });
        assert!(mock.mock);
        let waiting = post_result(3, &PostAck::StillProcessing { media_id: "m1".into() });
        assert_eq!(waiting.outcome, crate::model::Outcome::Skipped);
        assert_eq!(waiting.nr, Some(3));
    }

    #[test]
    fn remote_errors_keep_their_context() {
        let err = PublishError::Remote(anyhow::anyhow!("status 500").context("drive download"));
        assert_eq!(describe(&err), "drive download: status 500");
    }
}
