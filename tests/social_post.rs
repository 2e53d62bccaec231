mod common;

use common::{processing, project, FakeBlobs, FakeClock, Journal, RecordingRows, ScriptedUploadApi, UploadCall};
use nightly_publisher::catalog::load_slots;
use nightly_publisher::clock::Clock;
use nightly_publisher::config::{AppSettings, ProjectConfig};
use nightly_publisher::error::PublishError;
use nightly_publisher::model::{ProjectMode, Slot};
use nightly_publisher::social::{post_slot, ApiResponse, PostAck, PostContext};
use std::time::Duration;

struct Fixture {
    journal: Journal,
    rows: RecordingRows,
    blobs: FakeBlobs,
    api: ScriptedUploadApi,
    clock: FakeClock,
    settings: AppSettings,
    project: ProjectConfig,
}

impl Fixture {
    async fn new(mode: ProjectMode, checkpoint: &str) -> Self {
        let journal = Journal::default();
        let rows = RecordingRows::new(journal.clone());
        let blobs = FakeBlobs::default();
        let project = project("btc", mode);
        rows.set_sheet(
            &project.sheet_id,
            &[
                ["1", "Genesis", "Der Anfang", "", "vid-1", "post-0", ""],
                ["2", "Halving", "Alle vier Jahre", "", "vid-2", "", checkpoint],
            ],
        )
        .await;
        blobs.add(&project.folder_id, "1.mp4", vec![1; 16]).await;
        blobs.add(&project.folder_id, "2.mp4", vec![2; 16]).await;
        Self {
            api: ScriptedUploadApi::new(journal.clone()),
            journal,
            rows,
            blobs,
            clock: FakeClock::default(),
            settings: AppSettings::default(),
            project,
        }
    }

    fn ctx(&self) -> PostContext<'_> {
        PostContext {
            settings: &self.settings,
            rows: &self.rows,
            blobs: &self.blobs,
            api: &self.api,
            clock: &self.clock,
        }
    }

    async fn slot(&self, nr: u32) -> Slot {
        let slots = load_slots(&self.project, &self.rows, &self.blobs).await.unwrap();
        slots.into_iter().find(|s| s.nr == nr).unwrap()
    }
}

#[tokio::test]
async fn finished_checkpoint_posts_without_uploading() {
    let fx = Fixture::new(ProjectMode::Live, "media-7").await;
    fx.api.script_status(processing("succeeded", None)).await;
    let slot = fx.slot(2).await;

    let ack = post_slot(fx.ctx(), &fx.project, &slot, false).await.unwrap();

    assert_eq!(
        ack,
        PostAck::Posted {
            post_id: "post-1".into(),
            media_id: "media-7".into(),
            resumed: true
        }
    );
    let calls = fx.api.calls().await;
    assert!(!calls.iter().any(|c| matches!(c, UploadCall::Init { .. } | UploadCall::Append { .. })));
    assert_eq!(
        calls.last(),
        Some(&UploadCall::Post {
            text: "Alle vier Jahre".into(),
            media_ids: vec!["media-7".into()]
        })
    );
    assert!(fx.blobs.downloads().await.is_empty());
    assert_eq!(
        fx.rows.writes().await,
        vec![
            ("Themen!I3".to_string(), "post-1".to_string()),
            ("Themen!J3".to_string(), String::new()),
        ]
    );
    assert_eq!(fx.rows.cell(&fx.project.sheet_id, 3, 9).await, "");
}

#[tokio::test]
async fn fresh_upload_records_checkpoint_then_posts() {
    let fx = Fixture::new(ProjectMode::Live, "").await;
    let slot = fx.slot(2).await;

    let ack = post_slot(fx.ctx(), &fx.project, &slot, false).await.unwrap();

    assert!(matches!(ack, PostAck::Posted { resumed: false, .. }));
    assert_eq!(fx.blobs.downloads().await, vec!["btc-folder/2.mp4".to_string()]);
    let save = fx.journal.position("write Themen!J3=media-1").await.unwrap();
    let append = fx.journal.position("APPEND 0").await.unwrap();
    let post = fx.journal.position("POST").await.unwrap();
    let post_id = fx.journal.position("write Themen!I3=post-1").await.unwrap();
    let cleared = fx.journal.position("write Themen!J3=").await.unwrap();
    assert!(save < append && append < post && post < post_id && post_id < cleared);
}

#[tokio::test]
async fn mock_mode_touches_nothing() {
    let fx = Fixture::new(ProjectMode::Mock, "media-7").await;
    let slot = fx.slot(2).await;

    let ack = post_slot(fx.ctx(), &fx.project, &slot, true).await.unwrap();

    match ack {
        PostAck::Mock { message } => assert!(message.contains("#2")),
        other => panic!("unexpected ack {other:?}"),
    }
    assert!(fx.api.calls().await.is_empty());
    assert!(fx.rows.writes().await.is_empty());
    assert!(fx.blobs.downloads().await.is_empty());
}

#[tokio::test]
async fn already_posted_slot_is_left_alone() {
    let fx = Fixture::new(ProjectMode::Live, "").await;
    let slot = fx.slot(1).await;

    let ack = post_slot(fx.ctx(), &fx.project, &slot, false).await.unwrap();

    assert_eq!(ack, PostAck::AlreadyPosted { post_id: "post-0".into() });
    assert!(fx.api.calls().await.is_empty());
}

#[tokio::test]
async fn still_processing_keeps_checkpoint_for_next_run() {
    let mut fx = Fixture::new(ProjectMode::Live, "media-7").await;
    fx.settings.poll.max_attempts = 2;
    for _ in 0..3 {
        fx.api.script_status(processing("in_progress", Some(5))).await;
    }
    let slot = fx.slot(2).await;

    let ack = post_slot(fx.ctx(), &fx.project, &slot, false).await.unwrap();

    assert_eq!(ack, PostAck::StillProcessing { media_id: "media-7".into() });
    assert!(!fx.api.calls().await.iter().any(|c| matches!(c, UploadCall::Post { .. })));
    assert!(fx.rows.writes().await.is_empty());
    assert_eq!(fx.rows.cell(&fx.project.sheet_id, 3, 9).await, "media-7");
}

#[tokio::test]
async fn polling_late_in_the_run_stops_at_the_budget() {
    let fx = Fixture::new(ProjectMode::Live, "").await;
    fx.clock.advance(Duration::from_secs(549));
    fx.api.script_finalize(processing("in_progress", Some(15))).await;
    for _ in 0..30 {
        fx.api.script_status(processing("in_progress", Some(15))).await;
    }
    let slot = fx.slot(2).await;

    let ack = post_slot(fx.ctx(), &fx.project, &slot, false).await.unwrap();

    assert_eq!(ack, PostAck::StillProcessing { media_id: "media-1".into() });
    assert!(fx.clock.elapsed() <= Duration::from_secs(fx.settings.budget_seconds));
    assert_eq!(fx.clock.sleeps().await, vec![Duration::from_secs(15); 3]);
    assert!(!fx.api.calls().await.iter().any(|c| matches!(c, UploadCall::Post { .. })));
    assert_eq!(fx.rows.cell(&fx.project.sheet_id, 3, 9).await, "media-1");
}

#[tokio::test]
async fn still_processing_posts_when_allowed() {
    let mut fx = Fixture::new(ProjectMode::Live, "media-7").await;
    fx.settings.poll.max_attempts = 1;
    fx.settings.post_while_processing = true;
    for _ in 0..2 {
        fx.api.script_status(processing("pending", None)).await;
    }
    let slot = fx.slot(2).await;

    let ack = post_slot(fx.ctx(), &fx.project, &slot, false).await.unwrap();

    assert!(matches!(ack, PostAck::Posted { .. }));
}

#[tokio::test]
async fn rejected_post_keeps_uploaded_media() {
    let fx = Fixture::new(ProjectMode::Live, "").await;
    fx.api.script_post(ApiResponse::new(403, "duplicate content")).await;
    let slot = fx.slot(2).await;

    let err = post_slot(fx.ctx(), &fx.project, &slot, false).await.unwrap_err();

    match err {
        PublishError::RemoteProtocol { phase, status, body } => {
            assert_eq!(phase, "POST");
            assert_eq!(status, 403);
            assert_eq!(body, "duplicate content");
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(fx.rows.cell(&fx.project.sheet_id, 3, 9).await, "media-1");
    assert_eq!(fx.rows.cell(&fx.project.sheet_id, 3, 8).await, "");
}

#[tokio::test]
async fn post_without_id_is_a_protocol_error() {
    let fx = Fixture::new(ProjectMode::Live, "").await;
    fx.api.script_post(ApiResponse::new(201, r#"{"data":{}}"#)).await;
    let slot = fx.slot(2).await;

    let err = post_slot(fx.ctx(), &fx.project, &slot, false).await.unwrap_err();

    assert!(matches!(
        err,
        PublishError::MissingField {
            phase: "POST",
            field: "data.id"
        }
    ));
}
