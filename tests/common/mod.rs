#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use nightly_publisher::catalog::{BlobEntry, BlobStore, RowStore};
use nightly_publisher::clock::Clock;
use nightly_publisher::config::{self, ProjectConfig};
use nightly_publisher::model::ProjectMode;
use nightly_publisher::social::{ApiResponse, MediaUploadApi};
use nightly_publisher::video::{RemoteVideo, VideoMetadata, VideoPublisher};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Ordered record of every remote side effect across all fakes.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub async fn push(&self, entry: impl Into<String>) {
        self.0.lock().await.push(entry.into());
    }

    pub async fn entries(&self) -> Vec<String> {
        self.0.lock().await.clone()
    }

    pub async fn position(&self, entry: &str) -> Option<usize> {
        self.0.lock().await.iter().position(|e| e == entry)
    }
}

pub fn project(id: &str, mode: ProjectMode) -> ProjectConfig {
    let cfg = config::parse(config::example()).unwrap();
    let mut p = cfg.project("bitcoin").unwrap().clone();
    p.id = id.to_string();
    p.sheet_id = format!("{id}-sheet");
    p.folder_id = format!("{id}-folder");
    p.mode = mode;
    p
}

pub fn at(s: &str) -> DateTime<FixedOffset> {
    DateTime::parse_from_rfc3339(s).unwrap()
}

/// Manually advanced clock; `sleep` advances it and is recorded.
#[derive(Clone, Default)]
pub struct FakeClock {
    millis: Arc<AtomicU64>,
    sleeps: Arc<Mutex<Vec<Duration>>>,
}

impl FakeClock {
    pub fn at_seconds(secs: u64) -> Self {
        let clock = Self::default();
        clock.advance(Duration::from_secs(secs));
        clock
    }

    pub fn advance(&self, by: Duration) {
        self.millis.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    pub async fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().await.clone()
    }
}

#[async_trait]
impl Clock for FakeClock {
    fn elapsed(&self) -> Duration {
        Duration::from_millis(self.millis.load(Ordering::SeqCst))
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().await.push(duration);
        self.advance(duration);
    }
}

/// In-memory sheets keyed by store id; writes land in the grid so a second
/// read sees them.
#[derive(Clone, Default)]
pub struct RecordingRows {
    sheets: Arc<Mutex<HashMap<String, Vec<Vec<String>>>>>,
    writes: Arc<Mutex<Vec<(String, String)>>>,
    reads: Arc<Mutex<u32>>,
    failing: Arc<Mutex<Vec<String>>>,
    journal: Journal,
}

impl RecordingRows {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            ..Default::default()
        }
    }

    /// Rows as (nr, title, description, tags, video id, post id, checkpoint).
    pub async fn set_sheet(&self, store_id: &str, rows: &[[&str; 7]]) {
        let grid = rows
            .iter()
            .map(|[nr, title, desc, tags, video, post, checkpoint]| {
                vec![
                    nr.to_string(),
                    String::new(),
                    title.to_string(),
                    desc.to_string(),
                    String::new(),
                    String::new(),
                    tags.to_string(),
                    video.to_string(),
                    post.to_string(),
                    checkpoint.to_string(),
                ]
            })
            .collect();
        self.sheets.lock().await.insert(store_id.to_string(), grid);
    }

    pub async fn fail_reads_for(&self, store_id: &str) {
        self.failing.lock().await.push(store_id.to_string());
    }

    pub async fn writes(&self) -> Vec<(String, String)> {
        self.writes.lock().await.clone()
    }

    pub async fn reads(&self) -> u32 {
        *self.reads.lock().await
    }

    pub async fn cell(&self, store_id: &str, row: u32, col: usize) -> String {
        let sheets = self.sheets.lock().await;
        sheets
            .get(store_id)
            .and_then(|grid| grid.get(row as usize - 2))
            .and_then(|r| r.get(col))
            .cloned()
            .unwrap_or_default()
    }
}

/// "Sheet!H8" -> (7, 8)
fn parse_cell(range: &str) -> (usize, u32) {
    let cell = range.rsplit('!').next().unwrap();
    let col = (cell.as_bytes()[0] - b'A') as usize;
    (col, cell[1..].parse().unwrap())
}

#[async_trait]
impl RowStore for RecordingRows {
    async fn read_range(&self, store_id: &str, _range: &str) -> Result<Vec<Vec<String>>> {
        *self.reads.lock().await += 1;
        if self.failing.lock().await.iter().any(|s| s == store_id) {
            return Err(anyhow!("sheet {} unavailable", store_id));
        }
        Ok(self.sheets.lock().await.get(store_id).cloned().unwrap_or_default())
    }

    async fn write_cell(&self, store_id: &str, range: &str, value: &str) -> Result<()> {
        self.journal.push(format!("write {}={}", range, value)).await;
        self.writes.lock().await.push((range.to_string(), value.to_string()));
        let (col, row) = parse_cell(range);
        let mut sheets = self.sheets.lock().await;
        let grid = sheets.entry(store_id.to_string()).or_default();
        let idx = row as usize - 2;
        while grid.len() <= idx {
            grid.push(Vec::new());
        }
        let r = &mut grid[idx];
        while r.len() <= col {
            r.push(String::new());
        }
        r[col] = value.to_string();
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct FakeBlobs {
    folders: Arc<Mutex<HashMap<String, Vec<BlobEntry>>>>,
    data: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    downloads: Arc<Mutex<Vec<String>>>,
    lists: Arc<Mutex<u32>>,
}

impl FakeBlobs {
    pub async fn add(&self, folder_id: &str, name: &str, data: Vec<u8>) {
        let id = format!("{folder_id}/{name}");
        self.folders
            .lock()
            .await
            .entry(folder_id.to_string())
            .or_default()
            .push(BlobEntry {
                id: id.clone(),
                name: name.to_string(),
                created_time: None,
            });
        self.data.lock().await.insert(id, data);
    }

    pub async fn downloads(&self) -> Vec<String> {
        self.downloads.lock().await.clone()
    }

    pub async fn lists(&self) -> u32 {
        *self.lists.lock().await
    }
}

#[async_trait]
impl BlobStore for FakeBlobs {
    async fn list_by_parent_and_name(&self, folder_id: &str, name: Option<&str>) -> Result<Vec<BlobEntry>> {
        *self.lists.lock().await += 1;
        let folders = self.folders.lock().await;
        Ok(folders
            .get(folder_id)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| name.map_or(true, |n| e.name == n))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn download(&self, blob_id: &str) -> Result<Vec<u8>> {
        self.downloads.lock().await.push(blob_id.to_string());
        self.data
            .lock()
            .await
            .get(blob_id)
            .cloned()
            .ok_or_else(|| anyhow!("blob {} not found", blob_id))
    }
}

/// Video platform fake. `create` answers from the queue (default `vid-N`) and
/// can advance a clock to simulate slow uploads.
#[derive(Clone, Default)]
pub struct RecordingVideo {
    responses: Arc<Mutex<VecDeque<Result<String>>>>,
    created: Arc<Mutex<Vec<VideoMetadata>>>,
    playlist: Arc<Mutex<Vec<(String, String)>>>,
    captions: Arc<Mutex<Vec<(String, String)>>>,
    clock: Option<(FakeClock, Duration)>,
    journal: Journal,
}

impl RecordingVideo {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            ..Default::default()
        }
    }

    pub fn with_responses(journal: Journal, responses: Vec<Result<String>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::from(responses))),
            journal,
            ..Default::default()
        }
    }

    pub fn slow(mut self, clock: FakeClock, per_upload: Duration) -> Self {
        self.clock = Some((clock, per_upload));
        self
    }

    pub async fn created(&self) -> Vec<VideoMetadata> {
        self.created.lock().await.clone()
    }

    pub async fn playlist(&self) -> Vec<(String, String)> {
        self.playlist.lock().await.clone()
    }

    pub async fn captions(&self) -> Vec<(String, String)> {
        self.captions.lock().await.clone()
    }
}

#[async_trait]
impl VideoPublisher for RecordingVideo {
    async fn create(&self, metadata: &VideoMetadata, _media: Vec<u8>) -> Result<String> {
        self.journal.push(format!("create {}", metadata.title)).await;
        if let Some((clock, by)) = &self.clock {
            clock.advance(*by);
        }
        let mut created = self.created.lock().await;
        created.push(metadata.clone());
        let n = created.len();
        drop(created);
        self.responses
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Ok(format!("vid-{n}")))
    }

    async fn get(&self, video_id: &str) -> Result<Option<RemoteVideo>> {
        Ok(Some(RemoteVideo {
            id: video_id.to_string(),
            title: String::new(),
            privacy_status: Some("public".into()),
        }))
    }

    async fn update(&self, video_id: &str, _metadata: &VideoMetadata) -> Result<()> {
        self.journal.push(format!("update {}", video_id)).await;
        Ok(())
    }

    async fn add_caption(&self, video_id: &str, language: &str, _name: &str, _data: Vec<u8>) -> Result<()> {
        self.captions
            .lock()
            .await
            .push((video_id.to_string(), language.to_string()));
        Ok(())
    }

    async fn caption_languages(&self, _video_id: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn add_to_playlist(&self, playlist_id: &str, video_id: &str) -> Result<()> {
        self.playlist
            .lock()
            .await
            .push((playlist_id.to_string(), video_id.to_string()));
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadCall {
    Init { total_bytes: u64 },
    Append { media_id: String, segment: usize, len: usize },
    Finalize { media_id: String },
    Status { media_id: String },
    Post { text: String, media_ids: Vec<String> },
}

/// Scripted media protocol. Unscripted calls succeed: INIT returns
/// `media-1`, APPEND 204, FINALIZE without processing info, STATUS
/// succeeded, POST 201 with `post-1`.
#[derive(Clone, Default)]
pub struct ScriptedUploadApi {
    calls: Arc<Mutex<Vec<UploadCall>>>,
    init: Arc<Mutex<VecDeque<ApiResponse>>>,
    append: Arc<Mutex<VecDeque<ApiResponse>>>,
    finalize: Arc<Mutex<VecDeque<ApiResponse>>>,
    status: Arc<Mutex<VecDeque<ApiResponse>>>,
    post: Arc<Mutex<VecDeque<ApiResponse>>>,
    journal: Journal,
}

pub fn processing(state: &str, check_after: Option<u64>) -> ApiResponse {
    let info = match check_after {
        Some(secs) => format!(r#"{{"state":"{state}","check_after_secs":{secs}}}"#),
        None => format!(r#"{{"state":"{state}"}}"#),
    };
    ApiResponse::new(200, format!(r#"{{"media_id_string":"media-1","processing_info":{info}}}"#))
}

impl ScriptedUploadApi {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            ..Default::default()
        }
    }

    pub async fn script_init(&self, resp: ApiResponse) {
        self.init.lock().await.push_back(resp);
    }

    pub async fn script_append(&self, resp: ApiResponse) {
        self.append.lock().await.push_back(resp);
    }

    pub async fn script_finalize(&self, resp: ApiResponse) {
        self.finalize.lock().await.push_back(resp);
    }

    pub async fn script_status(&self, resp: ApiResponse) {
        self.status.lock().await.push_back(resp);
    }

    pub async fn script_post(&self, resp: ApiResponse) {
        self.post.lock().await.push_back(resp);
    }

    pub async fn calls(&self) -> Vec<UploadCall> {
        self.calls.lock().await.clone()
    }

    pub async fn appends(&self) -> usize {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|c| matches!(c, UploadCall::Append { .. }))
            .count()
    }

    async fn record(&self, call: UploadCall) {
        let label = match &call {
            UploadCall::Init { .. } => "INIT".to_string(),
            UploadCall::Append { segment, .. } => format!("APPEND {segment}"),
            UploadCall::Finalize { .. } => "FINALIZE".to_string(),
            UploadCall::Status { .. } => "STATUS".to_string(),
            UploadCall::Post { .. } => "POST".to_string(),
        };
        self.journal.push(label).await;
        self.calls.lock().await.push(call);
    }
}

async fn next(queue: &Mutex<VecDeque<ApiResponse>>, default: ApiResponse) -> ApiResponse {
    queue.lock().await.pop_front().unwrap_or(default)
}

#[async_trait]
impl MediaUploadApi for ScriptedUploadApi {
    async fn init(&self, total_bytes: u64, _media_type: &str, _media_category: &str) -> Result<ApiResponse> {
        self.record(UploadCall::Init { total_bytes }).await;
        Ok(next(&self.init, ApiResponse::new(202, r#"{"media_id_string":"media-1"}"#)).await)
    }

    async fn append(&self, media_id: &str, segment_index: usize, chunk: &[u8]) -> Result<ApiResponse> {
        self.record(UploadCall::Append {
            media_id: media_id.to_string(),
            segment: segment_index,
            len: chunk.len(),
        })
        .await;
        Ok(next(&self.append, ApiResponse::new(204, "")).await)
    }

    async fn finalize(&self, media_id: &str) -> Result<ApiResponse> {
        self.record(UploadCall::Finalize {
            media_id: media_id.to_string(),
        })
        .await;
        Ok(next(&self.finalize, ApiResponse::new(201, r#"{"media_id_string":"media-1"}"#)).await)
    }

    async fn status(&self, media_id: &str) -> Result<ApiResponse> {
        self.record(UploadCall::Status {
            media_id: media_id.to_string(),
        })
        .await;
        Ok(next(&self.status, processing("succeeded", None)).await)
    }

    async fn create_post(&self, text: &str, media_ids: &[String]) -> Result<ApiResponse> {
        self.record(UploadCall::Post {
            text: text.to_string(),
            media_ids: media_ids.to_vec(),
        })
        .await;
        Ok(next(&self.post, ApiResponse::new(201, r#"{"data":{"id":"post-1","text":"t"}}"#)).await)
    }
}
