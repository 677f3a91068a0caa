#![forbid(unsafe_code)]

//! Converges the worksheet onto the fetched upload list: append what is
//! missing, then refresh thumbnails and view counts for every row.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info};

use crate::error::SyncResult;
use crate::model::{
    DEFAULT_VIEW_COUNT, SheetRow, THUMBNAIL_COLUMN, VIEWS_COLUMN, VideoRecord, ViewCountMap,
    hq_thumbnail_formula, row_video_id,
};
use crate::sheets::{ColumnRange, SheetStore, ValueInput};
use crate::youtube::{VideoCatalog, fetch_view_counts};

/// What a reconciliation pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub header_inserted: bool,
    pub appended: usize,
    pub refreshed: usize,
}

pub fn reconcile(
    store: &mut impl SheetStore,
    catalog: &impl VideoCatalog,
    videos: &[VideoRecord],
) -> SyncResult<ReconcileSummary> {
    let mut summary = ReconcileSummary::default();

    let mut rows = store.read_all_rows()?;
    if rows.is_empty() {
        let header = SheetRow::header().into_cells();
        store.append_rows(std::slice::from_ref(&header), ValueInput::Raw)?;
        rows.push(header);
        summary.header_inserted = true;
        info!("worksheet was empty, wrote header row");
    }

    let existing = existing_rows(&rows);
    let new_rows = missing_rows(videos, &existing);
    if !new_rows.is_empty() {
        store.append_rows(&new_rows, ValueInput::Raw)?;
    }
    summary.appended = new_rows.len();

    let current = store.read_all_rows()?;
    let data_rows = current.get(1..).unwrap_or_default();
    let ids = distinct_ids(data_rows);
    let views = fetch_view_counts(catalog, &ids)?;

    if data_rows.is_empty() {
        info!("no video rows to refresh");
        return Ok(summary);
    }

    let (thumbnails, counts) = refreshed_columns(data_rows, &views);
    store.write_range(
        ColumnRange::below_header(THUMBNAIL_COLUMN, thumbnails.len()),
        &thumbnails,
        ValueInput::UserEntered,
    )?;
    store.write_range(
        ColumnRange::below_header(VIEWS_COLUMN, counts.len()),
        &counts,
        ValueInput::Raw,
    )?;
    summary.refreshed = data_rows.len();
    info!(rows = summary.refreshed, "refreshed thumbnails and view counts");

    Ok(summary)
}

/// Video id → 1-based row number. Data starts at row 2; the first row wins
/// if an id somehow appears twice.
fn existing_rows(rows: &[Vec<String>]) -> HashMap<String, usize> {
    let mut existing = HashMap::new();
    for (index, row) in rows.iter().enumerate().skip(1) {
        if let Some(id) = row_video_id(row) {
            existing.entry(id.to_string()).or_insert(index + 1);
        }
    }
    existing
}

/// Rows for videos not yet in the sheet, in fetch order. A repeated id in the
/// fetched list is only appended once.
fn missing_rows(videos: &[VideoRecord], existing: &HashMap<String, usize>) -> Vec<Vec<String>> {
    let mut queued = HashSet::new();
    let mut rows = Vec::new();
    for video in videos {
        if let Some(row) = existing.get(&video.id) {
            debug!(id = %video.id, row, "video already in sheet");
            continue;
        }
        if !queued.insert(video.id.as_str()) {
            continue;
        }
        info!(id = %video.id, title = %video.title, "adding new video");
        rows.push(video.to_row().into_cells());
    }
    rows
}

fn distinct_ids(data_rows: &[Vec<String>]) -> Vec<String> {
    let mut seen = HashSet::new();
    data_rows
        .iter()
        .filter_map(|row| row_video_id(row))
        .filter(|id| seen.insert(*id))
        .map(str::to_string)
        .collect()
}

/// Column F and column G values, one single-cell row per data row. Rows
/// without an id keep their position with a blank thumbnail and zero views.
fn refreshed_columns(
    data_rows: &[Vec<String>],
    views: &ViewCountMap,
) -> (Vec<Vec<String>>, Vec<Vec<String>>) {
    data_rows
        .iter()
        .map(|row| match row_video_id(row) {
            Some(id) => (
                vec![hq_thumbnail_formula(id)],
                vec![
                    views
                        .get(id)
                        .cloned()
                        .unwrap_or_else(|| DEFAULT_VIEW_COUNT.to_string()),
                ],
            ),
            None => (vec![String::new()], vec![DEFAULT_VIEW_COUNT.to_string()]),
        })
        .unzip()
}
