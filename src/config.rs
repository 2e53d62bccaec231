//! Configuration loader and validator for the nightly publisher.
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::model::{ProjectMode, SocialPolicy};
use crate::signer::Credentials;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
    #[error("Invalid configuration for project '{project}': {reason}")]
    InvalidProject {
        project: String,
        reason: &'static str,
    },
    #[error("Project configuration not found for ID: {0}")]
    UnknownProject(String),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub app: AppSettings,
    #[serde(default)]
    pub google: Google,
    pub x: Credentials,
    pub projects: Vec<ProjectConfig>,
}

/// Run-wide limits shared by every project.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppSettings {
    pub budget_seconds: u64,
    /// No further video slot is started once this much time has elapsed.
    pub video_phase_ceiling_seconds: u64,
    /// The social phase only starts while at least this much budget is left.
    pub social_min_remaining_seconds: u64,
    pub poll: PollSettings,
    /// Post even if the media is still processing after the last poll.
    pub post_while_processing: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            budget_seconds: 600,
            video_phase_ceiling_seconds: 500,
            social_min_remaining_seconds: 50,
            poll: PollSettings::default(),
            post_while_processing: false,
        }
    }
}

/// Media processing status polling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PollSettings {
    pub max_attempts: u32,
    pub default_interval_seconds: u64,
    pub max_interval_seconds: u64,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            default_interval_seconds: 5,
            max_interval_seconds: 15,
        }
    }
}

/// Catalog/blob/video provider access. Token acquisition happens elsewhere.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Google {
    pub access_token: String,
}

impl std::fmt::Debug for Google {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Google").finish_non_exhaustive()
    }
}

/// One publishing project: its catalog, its files and what the nightly run may do.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectConfig {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    pub sheet_id: String,
    #[serde(default = "default_sheet_name")]
    pub sheet_name: String,
    pub folder_id: String,
    #[serde(default)]
    pub playlist_id: String,
    #[serde(default = "default_start_date")]
    pub start_date: DateTime<FixedOffset>,
    #[serde(default)]
    pub mode: ProjectMode,
    #[serde(default)]
    pub video_active: bool,
    #[serde(default)]
    pub social_active: bool,
    #[serde(default)]
    pub social_policy: SocialPolicy,
    #[serde(default)]
    pub default_tags: String,
    #[serde(default)]
    pub footer_text: String,
    #[serde(default = "default_title_prefix")]
    pub title_prefix: String,
    #[serde(default = "default_fallback_title")]
    pub fallback_title: String,
    #[serde(default)]
    pub fallback_tag: Option<String>,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_category_id")]
    pub category_id: String,
}

fn default_sheet_name() -> String {
    "Themen".into()
}

fn default_start_date() -> DateTime<FixedOffset> {
    DateTime::parse_from_rfc3339("2026-01-01T21:21:00+01:00").expect("valid default start date")
}

fn default_title_prefix() -> String {
    "Tag".into()
}

fn default_fallback_title() -> String {
    "Short".into()
}

fn default_language() -> String {
    "de".into()
}

fn default_category_id() -> String {
    "27".into()
}

impl ProjectConfig {
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.id)
    }
}

impl Config {
    pub fn project(&self, id: &str) -> Result<&ProjectConfig, ConfigError> {
        self.projects
            .iter()
            .find(|p| p.id == id)
            .ok_or_else(|| ConfigError::UnknownProject(id.to_string()))
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    parse(&content)
}

/// Parse and validate configuration from YAML text.
pub fn parse(content: &str) -> Result<Config, ConfigError> {
    let cfg: Config = serde_yaml::from_str(content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    let app = &cfg.app;
    if app.budget_seconds == 0 {
        return Err(ConfigError::Invalid("app.budget_seconds must be > 0"));
    }
    if app.video_phase_ceiling_seconds >= app.budget_seconds {
        return Err(ConfigError::Invalid(
            "app.video_phase_ceiling_seconds must be below app.budget_seconds",
        ));
    }
    if app.social_min_remaining_seconds >= app.budget_seconds {
        return Err(ConfigError::Invalid(
            "app.social_min_remaining_seconds must be below app.budget_seconds",
        ));
    }
    if app.poll.max_attempts == 0 {
        return Err(ConfigError::Invalid("app.poll.max_attempts must be > 0"));
    }
    if app.poll.max_interval_seconds == 0 {
        return Err(ConfigError::Invalid("app.poll.max_interval_seconds must be > 0"));
    }

    if cfg.projects.is_empty() {
        return Err(ConfigError::Invalid("projects must not be empty"));
    }

    let mut seen = HashSet::new();
    for p in &cfg.projects {
        let invalid = |reason| ConfigError::InvalidProject {
            project: p.id.clone(),
            reason,
        };
        if p.id.trim().is_empty() {
            return Err(ConfigError::Invalid("projects[].id must be non-empty"));
        }
        if !seen.insert(p.id.as_str()) {
            return Err(invalid("duplicate project id"));
        }
        if p.sheet_id.trim().is_empty() {
            return Err(invalid("sheet_id must be non-empty"));
        }
        if p.sheet_name.trim().is_empty() {
            return Err(invalid("sheet_name must be non-empty"));
        }
        if p.folder_id.trim().is_empty() {
            return Err(invalid("folder_id must be non-empty"));
        }
        if p.video_active && p.playlist_id.trim().is_empty() {
            return Err(invalid("playlist_id must be set when video_active is true"));
        }
    }

    if cfg.projects.iter().any(|p| p.social_active) {
        let x = &cfg.x;
        if x.consumer_key.trim().is_empty() || x.consumer_secret.trim().is_empty() {
            return Err(ConfigError::Invalid("x.consumer_key and x.consumer_secret must be non-empty"));
        }
        if x.access_token.trim().is_empty() || x.access_secret.trim().is_empty() {
            return Err(ConfigError::Invalid("x.access_token and x.access_secret must be non-empty"));
        }
    }

    Ok(())
}

/// Returns a documented example configuration.
pub fn example() -> &'static str {
    r#"app:
  budget_seconds: 600
  video_phase_ceiling_seconds: 500
  social_min_remaining_seconds: 50
  post_while_processing: false
  poll:
    max_attempts: 30
    default_interval_seconds: 5
    max_interval_seconds: 15

google:
  # Overridden by the GOOGLE_ACCESS_TOKEN environment variable when set.
  access_token: "YOUR_GOOGLE_ACCESS_TOKEN"

x:
  consumer_key: "YOUR_CONSUMER_KEY"
  consumer_secret: "YOUR_CONSUMER_SECRET"
  access_token: "YOUR_ACCESS_TOKEN"
  access_secret: "YOUR_ACCESS_SECRET"

projects:
  - id: "bitcoin"
    title: "Bitcoin Shorts"
    sheet_id: "SPREADSHEET_ID"
    sheet_name: "Themen"
    folder_id: "DRIVE_FOLDER_ID"
    playlist_id: "PLAYLIST_ID"
    start_date: "2026-01-01T21:21:00+01:00"
    mode: MOCK
    video_active: true
    social_active: true
    social_policy: backlog_oldest
    default_tags: "Bitcoin, Shorts"
    footer_text: "Alle Folgen in der Playlist."
    fallback_tag: "Bitcoin"
  - id: "archive"
    sheet_id: "ARCHIVE_SPREADSHEET_ID"
    folder_id: "ARCHIVE_FOLDER_ID"
    mode: "OFF"
"#
}
