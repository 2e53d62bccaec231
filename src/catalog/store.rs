use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::config::ProjectConfig;
use crate::model::Slot;

/// Sheet columns, zero-based as returned by `read_range`.
pub const COL_NR: usize = 0;
pub const COL_TITLE: usize = 2;
pub const COL_DESCRIPTION: usize = 3;
pub const COL_TAGS: usize = 6;
pub const COL_VIDEO_ID: usize = 7;
pub const COL_POST_ID: usize = 8;
pub const COL_CHECKPOINT: usize = 9;

/// Data rows start below the header row.
pub const FIRST_DATA_ROW: u32 = 2;
pub const LAST_DATA_ROW: u32 = 420;

#[async_trait]
pub trait RowStore: Send + Sync {
    /// Ordered rows of cells; trailing empty cells may be omitted.
    async fn read_range(&self, store_id: &str, range: &str) -> Result<Vec<Vec<String>>>;

    async fn write_cell(&self, store_id: &str, range: &str, value: &str) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobEntry {
    pub id: String,
    pub name: String,
    pub created_time: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Files under `folder_id`, optionally restricted to an exact name.
    async fn list_by_parent_and_name(
        &self,
        folder_id: &str,
        name: Option<&str>,
    ) -> Result<Vec<BlobEntry>>;

    async fn download(&self, blob_id: &str) -> Result<Vec<u8>>;
}

/// Column letter for a zero-based column index (A..Z is all the sheet uses).
fn column_letter(col: usize) -> char {
    (b'A' + col as u8) as char
}

pub fn data_range(sheet_name: &str) -> String {
    format!(
        "{}!{}{}:{}{}",
        sheet_name,
        column_letter(COL_NR),
        FIRST_DATA_ROW,
        column_letter(COL_CHECKPOINT),
        LAST_DATA_ROW
    )
}

/// Writes single cells of one slot's row. Never rewrites ranges, so concurrent
/// manual edits elsewhere in the sheet survive.
#[derive(Clone, Copy)]
pub struct SlotWriter<'a> {
    rows: &'a dyn RowStore,
    project: &'a ProjectConfig,
}

impl<'a> SlotWriter<'a> {
    pub fn new(rows: &'a dyn RowStore, project: &'a ProjectConfig) -> Self {
        Self { rows, project }
    }

    pub fn cell(&self, col: usize, row: u32) -> String {
        format!("{}!{}{}", self.project.sheet_name, column_letter(col), row)
    }

    #[instrument(skip_all, fields(project = %self.project.id, row = row))]
    async fn write(&self, col: usize, row: u32, value: &str) -> Result<()> {
        let range = self.cell(col, row);
        debug!(%range, "writing catalog cell");
        self.rows
            .write_cell(&self.project.sheet_id, &range, value)
            .await
            .with_context(|| format!("failed to write catalog cell {}", range))
    }

    pub async fn write_video_id(&self, slot: &Slot, video_id: &str) -> Result<()> {
        self.write(COL_VIDEO_ID, slot.row, video_id).await
    }

    pub async fn write_post_id(&self, slot: &Slot, post_id: &str) -> Result<()> {
        self.write(COL_POST_ID, slot.row, post_id).await
    }

    pub async fn write_checkpoint(&self, row: u32, media_handle: &str) -> Result<()> {
        self.write(COL_CHECKPOINT, row, media_handle).await
    }

    pub async fn clear_checkpoint(&self, row: u32) -> Result<()> {
        self.write(COL_CHECKPOINT, row, "").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_range_spans_all_columns() {
        assert_eq!(data_range("Themen"), "Themen!A2:J420");
    }

    #[test]
    fn column_letters() {
        assert_eq!(column_letter(COL_VIDEO_ID), 'H');
        assert_eq!(column_letter(COL_POST_ID), 'I');
        assert_eq!(column_letter(COL_CHECKPOINT), 'J');
    }
}
