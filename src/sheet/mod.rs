//! Record source: the spreadsheet the dispatcher scans and marks.
//!
//! The [`RecordSource`] trait is the narrow read/write contract the dispatch
//! loop depends on. [`GoogleSheetsSource`] talks to the Sheets REST API;
//! [`InMemorySheet`] keeps a grid in process for tests and local runs.

pub mod google;
pub mod memory;
pub mod range;

pub use google::GoogleSheetsSource;
pub use memory::InMemorySheet;

use async_trait::async_trait;

/// How the source should interpret written values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueInputMode {
    /// Store values verbatim.
    Raw,
    /// Parse values as if typed into the UI (formulas, dates).
    UserEntered,
}

impl ValueInputMode {
    /// Value for the Sheets API `valueInputOption` parameter.
    #[must_use]
    pub fn as_api_str(self) -> &'static str {
        match self {
            Self::Raw => "RAW",
            Self::UserEntered => "USER_ENTERED",
        }
    }
}

/// A rectangular (but possibly ragged) snapshot of the sheet.
///
/// Row 0 is the header; rows past it are data rows. Trailing empty cells are
/// commonly omitted by the source, so rows may be shorter than the header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    rows: Vec<Vec<String>>,
}

impl Table {
    #[must_use]
    pub fn new(rows: Vec<Vec<String>>) -> Self {
        Self { rows }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of rows including the header.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn header(&self) -> Option<&[String]> {
        self.rows.first().map(Vec::as_slice)
    }

    /// Data rows paired with their 1-based sheet row number (header is row 1).
    pub fn data_rows(&self) -> impl Iterator<Item = (usize, &[String])> {
        self.rows
            .iter()
            .enumerate()
            .skip(1)
            .map(|(idx, row)| (idx + 1, row.as_slice()))
    }

    #[must_use]
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }
}

/// Read a cell, treating out-of-range positions as absent.
#[must_use]
pub fn cell(row: &[String], column: Option<usize>) -> Option<&str> {
    column.and_then(|c| row.get(c)).map(String::as_str)
}

/// Source of notification records.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Stable identifier for logs (e.g. `google-sheets`).
    fn id(&self) -> &'static str;

    /// Read the full region. An empty sheet yields an empty [`Table`].
    ///
    /// # Errors
    ///
    /// Returns `NotifyError::SourceUnavailable` on network or auth failure.
    async fn fetch_table(&self, range: &str) -> crate::Result<Table>;

    /// Overwrite the cells starting at `range` with `values` (row-major).
    ///
    /// # Errors
    ///
    /// Returns `NotifyError::SourceUnavailable` or `NotifyError::WriteConflict`.
    async fn write_cells(
        &self,
        range: &str,
        mode: ValueInputMode,
        values: Vec<Vec<String>>,
    ) -> crate::Result<()>;
}
