use chrono::{DateTime, Duration, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProjectMode {
    #[default]
    Off,
    Mock,
    Live,
}

impl ProjectMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectMode::Off => "OFF",
            ProjectMode::Mock => "MOCK",
            ProjectMode::Live => "LIVE",
        }
    }
}

/// Which unposted slot the social phase picks on a given night.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SocialPolicy {
    /// Oldest due slot without a post, draining the backlog one per night.
    #[default]
    BacklogOldest,
    /// Only the slot scheduled for the reference date; older slots are left alone.
    TodayOnly,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunType {
    #[default]
    All,
    Video,
    Social,
}

impl RunType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunType::All => "all",
            RunType::Video => "video",
            RunType::Social => "social",
        }
    }

    pub fn includes_video(&self) -> bool {
        matches!(self, RunType::All | RunType::Video)
    }

    pub fn includes_social(&self) -> bool {
        matches!(self, RunType::All | RunType::Social)
    }
}

impl FromStr for RunType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(RunType::All),
            "video" | "youtube" => Ok(RunType::Video),
            "social" | "x" => Ok(RunType::Social),
            other => Err(format!("unknown run type '{other}' (expected all, video or social)")),
        }
    }
}

impl fmt::Display for RunType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One dated, numbered row of the catalog joined with its blob-store files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Slot {
    pub nr: u32,
    /// 1-based sheet row holding this slot.
    pub row: u32,
    pub title: String,
    pub description: String,
    pub tags_raw: String,
    pub publish_date: DateTime<FixedOffset>,
    pub media_blob_id: Option<String>,
    pub subtitle_blob_id: Option<String>,
    pub video_platform_id: Option<String>,
    pub post_id: Option<String>,
    pub upload_checkpoint: Option<String>,
}

impl Slot {
    pub fn has_media(&self) -> bool {
        self.media_blob_id.is_some()
    }

    pub fn has_subtitle(&self) -> bool {
        self.subtitle_blob_id.is_some()
    }

    pub fn media_name(&self) -> String {
        format!("{}.mp4", self.nr)
    }

    pub fn subtitle_name(&self) -> String {
        format!("{}.srt", self.nr)
    }
}

/// `start + (nr - 1)` days. `nr` is 1-based. `None` when the date is out of range.
pub fn publish_date_for(start: DateTime<FixedOffset>, nr: u32) -> Option<DateTime<FixedOffset>> {
    start.checked_add_signed(Duration::days(i64::from(nr.max(1)) - 1))
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Processed,
    Error,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TargetResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nr: Option<u32>,
    pub outcome: Outcome,
    pub detail: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub mock: bool,
}

impl TargetResult {
    pub fn processed(nr: u32, detail: impl Into<String>, mock: bool) -> Self {
        Self {
            nr: Some(nr),
            outcome: Outcome::Processed,
            detail: detail.into(),
            mock,
        }
    }

    pub fn error(nr: u32, detail: impl Into<String>) -> Self {
        Self {
            nr: Some(nr),
            outcome: Outcome::Error,
            detail: detail.into(),
            mock: false,
        }
    }

    pub fn skipped(nr: Option<u32>, detail: impl Into<String>) -> Self {
        Self {
            nr,
            outcome: Outcome::Skipped,
            detail: detail.into(),
            mock: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProjectStatus {
    Off,
    Active,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectReport {
    pub id: String,
    pub title: String,
    pub status: ProjectStatus,
    pub video: Vec<TargetResult>,
    pub social: Vec<TargetResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProjectReport {
    pub fn new(id: &str, title: &str, status: ProjectStatus) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            status,
            video: Vec::new(),
            social: Vec::new(),
            error: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunReport {
    pub reference_time: DateTime<Utc>,
    pub run_type: RunType,
    pub elapsed_seconds: f64,
    pub projects: Vec<ProjectReport>,
}
