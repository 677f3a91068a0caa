#![forbid(unsafe_code)]

//! Worksheet storage. [`SheetStore`] is the narrow surface the reconciler
//! needs; [`GoogleSheet`] implements it over the Sheets v4 values API.

use std::fmt;

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::error::{Service, SyncError, SyncResult};

pub const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// How the Sheets API should interpret written strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueInput {
    /// Stored verbatim; `=IMAGE(...)` stays text.
    Raw,
    /// Parsed as if typed into the UI; formulas are evaluated.
    UserEntered,
}

impl ValueInput {
    pub fn as_str(self) -> &'static str {
        match self {
            ValueInput::Raw => "RAW",
            ValueInput::UserEntered => "USER_ENTERED",
        }
    }
}

/// Single-column block such as `F2:F10`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnRange {
    pub column: char,
    pub first_row: usize,
    pub last_row: usize,
}

impl ColumnRange {
    /// Range covering `len` data rows below the header.
    pub fn below_header(column: char, len: usize) -> Self {
        Self {
            column,
            first_row: 2,
            last_row: len + 1,
        }
    }

    pub fn column_index(&self) -> usize {
        (self.column as u8 - b'A') as usize
    }

    pub fn len(&self) -> usize {
        (self.last_row + 1).saturating_sub(self.first_row)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for ColumnRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{col}{first}:{col}{last}",
            col = self.column,
            first = self.first_row,
            last = self.last_row
        )
    }
}

pub trait SheetStore {
    /// Every row up to the last non-empty one, header included. Blank rows
    /// in between come back as empty vectors so positions stay aligned.
    fn read_all_rows(&mut self) -> SyncResult<Vec<Vec<String>>>;

    /// Appends rows after the last non-empty row.
    fn append_rows(&mut self, rows: &[Vec<String>], input: ValueInput) -> SyncResult<()>;

    /// Overwrites `range` with one single-cell row per entry of `values`.
    fn write_range(
        &mut self,
        range: ColumnRange,
        values: &[Vec<String>],
        input: ValueInput,
    ) -> SyncResult<()>;
}

#[derive(Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetMeta>,
}

#[derive(Deserialize)]
struct SheetMeta {
    properties: SheetProperties,
}

#[derive(Deserialize)]
struct SheetProperties {
    title: String,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

/// Handle on one worksheet, opened once per run and closed at the end.
pub struct GoogleSheet {
    agent: ureq::Agent,
    bearer: String,
    spreadsheet_id: String,
    worksheet: String,
    requests: usize,
}

impl fmt::Debug for GoogleSheet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoogleSheet")
            .field("spreadsheet_id", &self.spreadsheet_id)
            .field("worksheet", &self.worksheet)
            .field("requests", &self.requests)
            .finish_non_exhaustive()
    }
}

impl GoogleSheet {
    /// Connects to `spreadsheet_id` and checks that `worksheet` exists.
    pub fn open(
        agent: ureq::Agent,
        access_token: &str,
        spreadsheet_id: &str,
        worksheet: &str,
    ) -> SyncResult<Self> {
        let mut sheet = Self {
            agent,
            bearer: format!("Bearer {access_token}"),
            spreadsheet_id: spreadsheet_id.to_string(),
            worksheet: worksheet.to_string(),
            requests: 0,
        };

        let url = format!("{SHEETS_API}/{}", urlencoding::encode(spreadsheet_id));
        let request = sheet
            .agent
            .get(&url)
            .query("fields", "sheets.properties.title");
        let meta: SpreadsheetMeta = sheet.send(request, None)?;
        if !meta
            .sheets
            .iter()
            .any(|entry| entry.properties.title == worksheet)
        {
            return Err(SyncError::api(
                Service::Sheets,
                format!("worksheet {worksheet:?} not found in spreadsheet {spreadsheet_id}"),
            ));
        }

        info!(spreadsheet = %spreadsheet_id, worksheet, "opened worksheet");
        Ok(sheet)
    }

    /// Ends the session. Every write is committed as it is sent, so this only
    /// reports how much traffic the run produced.
    pub fn close(self) {
        info!(
            worksheet = %self.worksheet,
            requests = self.requests,
            "closed worksheet"
        );
    }

    fn values_url(&self, a1: &str, suffix: &str) -> String {
        format!(
            "{SHEETS_API}/{}/values/{}{suffix}",
            urlencoding::encode(&self.spreadsheet_id),
            urlencoding::encode(a1)
        )
    }

    fn send<T: serde::de::DeserializeOwned>(
        &mut self,
        request: ureq::Request,
        body: Option<Value>,
    ) -> SyncResult<T> {
        self.requests += 1;
        let request = request.set("Authorization", &self.bearer);
        let response = match body {
            Some(body) => request.send_json(body),
            None => request.call(),
        }
        .map_err(|err| SyncError::from_http(Service::Sheets, err))?;
        response
            .into_json()
            .map_err(|err| SyncError::api(Service::Sheets, format!("decoding response: {err}")))
    }
}

impl SheetStore for GoogleSheet {
    fn read_all_rows(&mut self) -> SyncResult<Vec<Vec<String>>> {
        let url = self.values_url(&quote_sheet_name(&self.worksheet), "");
        let request = self.agent.get(&url).query("majorDimension", "ROWS");
        let range: ValueRange = self.send(request, None)?;
        let rows: Vec<Vec<String>> = range
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect();
        debug!(rows = rows.len(), "read worksheet");
        Ok(rows)
    }

    fn append_rows(&mut self, rows: &[Vec<String>], input: ValueInput) -> SyncResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let url = self.values_url(&quote_sheet_name(&self.worksheet), ":append");
        let request = self
            .agent
            .post(&url)
            .query("valueInputOption", input.as_str())
            .query("insertDataOption", "INSERT_ROWS");
        let _: Value = self.send(request, Some(json!({ "values": rows })))?;
        debug!(rows = rows.len(), "appended rows");
        Ok(())
    }

    fn write_range(
        &mut self,
        range: ColumnRange,
        values: &[Vec<String>],
        input: ValueInput,
    ) -> SyncResult<()> {
        let a1 = format!("{}!{range}", quote_sheet_name(&self.worksheet));
        let url = self.values_url(&a1, "");
        let request = self
            .agent
            .put(&url)
            .query("valueInputOption", input.as_str());
        let body = json!({
            "range": a1,
            "majorDimension": "ROWS",
            "values": values,
        });
        let _: Value = self.send(request, Some(body))?;
        debug!(%range, cells = values.len(), "wrote range");
        Ok(())
    }
}

/// A1 notation requires quoting titles with spaces or non-ASCII letters;
/// quoting every title is always valid.
pub fn quote_sheet_name(title: &str) -> String {
    format!("'{}'", title.replace('\'', "''"))
}

fn cell_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// In-memory worksheet used by tests across the crate.
#[cfg(test)]
pub(crate) mod memory {
    use super::*;

    #[derive(Debug, Default)]
    pub(crate) struct MemorySheet {
        pub rows: Vec<Vec<String>>,
        pub reads: usize,
        pub appends: Vec<(usize, ValueInput)>,
        pub writes: Vec<(ColumnRange, ValueInput)>,
        pub fail_writes: bool,
    }

    impl MemorySheet {
        pub(crate) fn with_rows(rows: &[&[&str]]) -> Self {
            Self {
                rows: rows
                    .iter()
                    .map(|row| row.iter().map(|cell| cell.to_string()).collect())
                    .collect(),
                ..Self::default()
            }
        }

        pub(crate) fn ids(&self) -> Vec<String> {
            self.rows
                .iter()
                .skip(1)
                .map(|row| row.get(1).cloned().unwrap_or_default())
                .collect()
        }

        pub(crate) fn column(&self, index: usize) -> Vec<String> {
            self.rows
                .iter()
                .skip(1)
                .map(|row| row.get(index).cloned().unwrap_or_default())
                .collect()
        }
    }

    impl SheetStore for MemorySheet {
        fn read_all_rows(&mut self) -> SyncResult<Vec<Vec<String>>> {
            self.reads += 1;
            Ok(self.rows.clone())
        }

        fn append_rows(&mut self, rows: &[Vec<String>], input: ValueInput) -> SyncResult<()> {
            self.appends.push((rows.len(), input));
            self.rows.extend(rows.iter().cloned());
            Ok(())
        }

        fn write_range(
            &mut self,
            range: ColumnRange,
            values: &[Vec<String>],
            input: ValueInput,
        ) -> SyncResult<()> {
            if self.fail_writes {
                return Err(SyncError::api(Service::Sheets, "HTTP 429: quota"));
            }
            assert_eq!(range.len(), values.len(), "range/value size mismatch");
            let column = range.column_index();
            for (offset, value) in values.iter().enumerate() {
                let row_index = range.first_row - 1 + offset;
                if self.rows.len() <= row_index {
                    self.rows.resize(row_index + 1, Vec::new());
                }
                let row = &mut self.rows[row_index];
                if row.len() <= column {
                    row.resize(column + 1, String::new());
                }
                row[column] = value.first().cloned().unwrap_or_default();
            }
            self.writes.push((range, input));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_range_renders_a1() {
        let range = ColumnRange::below_header('F', 3);
        assert_eq!(range.to_string(), "F2:F4");
        assert_eq!(range.len(), 3);
        assert_eq!(range.column_index(), 5);
    }

    #[test]
    fn empty_column_range_has_no_cells() {
        let range = ColumnRange::below_header('G', 0);
        assert!(range.is_empty());
        assert_eq!(range.to_string(), "G2:G1");
    }

    #[test]
    fn sheet_names_are_quoted_and_escaped() {
        assert_eq!(quote_sheet_name("Відео"), "'Відео'");
        assert_eq!(quote_sheet_name("Bob's list"), "'Bob''s list'");
    }

    #[test]
    fn cells_render_as_text() {
        assert_eq!(cell_text(Value::from("abc")), "abc");
        assert_eq!(cell_text(Value::from(42)), "42");
        assert_eq!(cell_text(Value::Null), "");
    }

    #[test]
    fn value_ranges_without_values_are_empty() -> anyhow::Result<()> {
        let range: ValueRange =
            serde_json::from_str(r#"{"range":"'Відео'!A1:Z1000","majorDimension":"ROWS"}"#)?;
        assert!(range.values.is_empty());
        Ok(())
    }

    #[test]
    fn blank_rows_inside_the_range_keep_their_slot() -> anyhow::Result<()> {
        let range: ValueRange = serde_json::from_str(
            r#"{"range":"'Відео'!A1:G4","majorDimension":"ROWS","values":[["h"],["A","a"],[],["C","c"]]}"#,
        )?;
        let rows: Vec<Vec<String>> = range
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect();
        assert_eq!(rows.len(), 4);
        assert!(rows[2].is_empty());
        assert_eq!(rows[3], vec!["C", "c"]);
        Ok(())
    }

    #[test]
    fn memory_sheet_pads_short_rows_on_write() -> anyhow::Result<()> {
        let mut sheet = memory::MemorySheet::with_rows(&[&["h1", "h2"], &["t", "id"]]);
        sheet.write_range(
            ColumnRange::below_header('G', 1),
            &[vec!["9".to_string()]],
            ValueInput::Raw,
        )?;
        assert_eq!(sheet.rows[1], vec!["t", "id", "", "", "", "", "9"]);
        Ok(())
    }
}
