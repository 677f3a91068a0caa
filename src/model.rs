#![forbid(unsafe_code)]

//! Records moved between the video API and the worksheet.
//!
//! The worksheet layout is positional: seven columns, one header row, one row
//! per video keyed by the id in column B.

use std::collections::HashMap;

/// Header written to an empty worksheet.
pub const HEADER: [&str; 7] = [
    "Назва",
    "ID відео",
    "Посилання",
    "Дата",
    "Час",
    "Обкладинка",
    "Перегляди",
];

/// Zero-based index of the id cell within a row.
pub const ID_COLUMN: usize = 1;
/// Column letters for the two columns refreshed on every run.
pub const THUMBNAIL_COLUMN: char = 'F';
pub const VIEWS_COLUMN: char = 'G';
/// View count for freshly appended rows and ids the statistics API skipped.
pub const DEFAULT_VIEW_COUNT: &str = "0";

/// Video id → view count as reported by the statistics endpoint.
pub type ViewCountMap = HashMap<String, String>;

/// One upload, normalized for the worksheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoRecord {
    pub id: String,
    pub title: String,
    pub url: String,
    pub published_date: String,
    pub published_time: String,
    pub thumbnail_formula: String,
}

impl VideoRecord {
    /// Row appended for a video the sheet has not seen yet.
    pub fn to_row(&self) -> SheetRow {
        SheetRow([
            self.title.clone(),
            self.id.clone(),
            self.url.clone(),
            self.published_date.clone(),
            self.published_time.clone(),
            self.thumbnail_formula.clone(),
            DEFAULT_VIEW_COUNT.to_string(),
        ])
    }
}

/// Full seven-cell row in worksheet order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetRow(pub [String; 7]);

impl SheetRow {
    pub fn header() -> Self {
        SheetRow(HEADER.map(str::to_string))
    }

    pub fn into_cells(self) -> Vec<String> {
        self.0.into()
    }
}

/// Reads the id cell from a raw row. The Sheets API drops trailing empty
/// cells, so short rows are expected.
pub fn row_video_id(row: &[String]) -> Option<&str> {
    row.get(ID_COLUMN)
        .map(|cell| cell.trim())
        .filter(|id| !id.is_empty())
}

pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}

pub fn image_formula(image_url: &str) -> String {
    format!("=IMAGE(\"{image_url}\")")
}

/// Thumbnail formula rebuilt from the id alone, independent of what the
/// search response advertised.
pub fn hq_thumbnail_formula(video_id: &str) -> String {
    image_formula(&format!("https://i.ytimg.com/vi/{video_id}/hqdefault.jpg"))
}
