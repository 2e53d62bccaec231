use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, instrument, warn};

use super::store::{
    data_range, BlobEntry, BlobStore, RowStore, COL_CHECKPOINT, COL_DESCRIPTION, COL_NR,
    COL_POST_ID, COL_TAGS, COL_TITLE, COL_VIDEO_ID, FIRST_DATA_ROW,
};
use crate::config::ProjectConfig;
use crate::error::PublishError;
use crate::model::{publish_date_for, Slot};

static SLOT_FILE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(\d+)\.(mp4|srt)$").expect("valid slot file regex"));

#[derive(Debug, Default, Clone)]
struct SlotFiles {
    mp4: Option<String>,
    srt: Option<String>,
}

/// Group blob ids by slot number; the first listed file of a name wins.
fn index_files(entries: &[BlobEntry]) -> HashMap<u32, SlotFiles> {
    let mut files: HashMap<u32, SlotFiles> = HashMap::new();
    for entry in entries {
        let Some(caps) = SLOT_FILE.captures(entry.name.trim()) else {
            continue;
        };
        let Ok(nr) = caps[1].parse::<u32>() else {
            continue;
        };
        let slot = files.entry(nr).or_default();
        let target = if caps[2].eq_ignore_ascii_case("mp4") {
            &mut slot.mp4
        } else {
            &mut slot.srt
        };
        if target.is_none() {
            *target = Some(entry.id.clone());
        }
    }
    files
}

fn cell(row: &[String], col: usize) -> &str {
    row.get(col).map(|s| s.trim()).unwrap_or("")
}

fn optional_cell(row: &[String], col: usize) -> Option<String> {
    Some(cell(row, col)).filter(|s| !s.is_empty()).map(str::to_string)
}

/// Build slots from raw rows (first element = first data row) and blob listing.
pub fn build_slots(
    rows: &[Vec<String>],
    blobs: &[BlobEntry],
    start_date: DateTime<FixedOffset>,
) -> Vec<Slot> {
    let files = index_files(blobs);
    let mut slots: Vec<Slot> = rows
        .iter()
        .enumerate()
        .filter_map(|(idx, row)| {
            let raw_nr = cell(row, COL_NR);
            if raw_nr.is_empty() {
                return None;
            }
            let nr = match raw_nr.parse::<u32>() {
                Ok(nr) if nr > 0 => nr,
                _ => {
                    warn!(row = idx as u32 + FIRST_DATA_ROW, value = raw_nr, "skipping row with invalid nr");
                    return None;
                }
            };
            let Some(publish_date) = publish_date_for(start_date, nr) else {
                warn!(row = idx as u32 + FIRST_DATA_ROW, nr, "skipping row with out-of-range nr");
                return None;
            };
            let slot_files = files.get(&nr).cloned().unwrap_or_default();
            Some(Slot {
                nr,
                row: idx as u32 + FIRST_DATA_ROW,
                title: cell(row, COL_TITLE).to_string(),
                description: row.get(COL_DESCRIPTION).cloned().unwrap_or_default(),
                tags_raw: cell(row, COL_TAGS).to_string(),
                publish_date,
                media_blob_id: slot_files.mp4,
                subtitle_blob_id: slot_files.srt,
                video_platform_id: optional_cell(row, COL_VIDEO_ID),
                post_id: optional_cell(row, COL_POST_ID),
                upload_checkpoint: optional_cell(row, COL_CHECKPOINT),
            })
        })
        .collect();
    slots.sort_by_key(|s| s.nr);
    slots
}

/// Load the full catalog snapshot for a project, ascending by `nr`.
#[instrument(skip_all, fields(project = %project.id))]
pub async fn load_slots(
    project: &ProjectConfig,
    rows: &dyn RowStore,
    blobs: &dyn BlobStore,
) -> Result<Vec<Slot>> {
    let range = data_range(&project.sheet_name);
    let raw = rows
        .read_range(&project.sheet_id, &range)
        .await
        .with_context(|| format!("failed to read catalog range {}", range))?;
    let files = blobs
        .list_by_parent_and_name(&project.folder_id, None)
        .await
        .context("failed to list media folder")?;
    let slots = build_slots(&raw, &files, project.start_date);
    debug!(rows = raw.len(), files = files.len(), slots = slots.len(), "catalog loaded");
    Ok(slots)
}

pub fn find_slot(slots: &[Slot], nr: u32) -> Result<&Slot, PublishError> {
    slots
        .iter()
        .find(|s| s.nr == nr)
        .ok_or_else(|| PublishError::validation(format!("slot #{} not found in catalog", nr)))
}

/// Display row for the catalog listing.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CatalogEntry {
    pub nr: u32,
    pub title: String,
    pub publish_date: DateTime<FixedOffset>,
    pub has_media: bool,
    pub has_subtitle: bool,
    pub video_platform_id: Option<String>,
    pub post_id: Option<String>,
    pub upload_pending: bool,
}

/// Newest slot first, as an operator wants to see it.
pub fn list_catalog(slots: &[Slot]) -> Vec<CatalogEntry> {
    let mut entries: Vec<CatalogEntry> = slots
        .iter()
        .map(|s| CatalogEntry {
            nr: s.nr,
            title: if s.title.is_empty() {
                "Kein Titel".to_string()
            } else {
                s.title.clone()
            },
            publish_date: s.publish_date,
            has_media: s.has_media(),
            has_subtitle: s.has_subtitle(),
            video_platform_id: s.video_platform_id.clone(),
            post_id: s.post_id.clone(),
            upload_pending: s.upload_checkpoint.is_some(),
        })
        .collect();
    entries.sort_by(|a, b| b.nr.cmp(&a.nr));
    entries
}
