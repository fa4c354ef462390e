//! In-process sheet backed by a grid of strings.
//!
//! Mirrors the behaviour of the hosted source closely enough to drive the
//! dispatcher end to end: reads drop trailing empty cells and rows, writes
//! grow the grid as needed. Failures can be injected per read or per row.

use crate::error::NotifyError;
use crate::sheet::range::{last_column, parse_span, split_range};
use crate::sheet::{RecordSource, Table, ValueInputMode};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;

/// A write observed by the in-memory sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedWrite {
    pub range: String,
    pub mode: ValueInputMode,
    pub values: Vec<Vec<String>>,
}

#[derive(Debug, Default)]
struct SheetState {
    grid: Vec<Vec<String>>,
    writes: Vec<RecordedWrite>,
    reads: usize,
    failing_reads: usize,
    failing_rows: HashSet<usize>,
    conflict_rows: HashSet<usize>,
}

/// Grid-backed [`RecordSource`].
#[derive(Debug, Default)]
pub struct InMemorySheet {
    state: Mutex<SheetState>,
}

impl InMemorySheet {
    /// Create a sheet holding `rows` (row 0 is the header).
    #[must_use]
    pub fn new(rows: Vec<Vec<&str>>) -> Self {
        let grid = rows
            .into_iter()
            .map(|r| r.into_iter().map(str::to_owned).collect())
            .collect();
        Self {
            state: Mutex::new(SheetState {
                grid,
                ..SheetState::default()
            }),
        }
    }

    /// Current grid, exactly as a fresh read would return it.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Vec<String>> {
        self.state
            .lock()
            .map(|s| normalized(&s.grid))
            .unwrap_or_default()
    }

    /// Cell at a 1-based row and zero-based column, empty when unset.
    #[must_use]
    pub fn cell(&self, row_number: usize, column: usize) -> String {
        self.state
            .lock()
            .ok()
            .and_then(|s| {
                s.grid
                    .get(row_number.checked_sub(1)?)
                    .and_then(|r| r.get(column))
                    .cloned()
            })
            .unwrap_or_default()
    }

    /// Overwrite a single cell, as a human editing the sheet would.
    pub fn set_cell(&self, row_number: usize, column: usize, value: &str) {
        if let Ok(mut s) = self.state.lock() {
            put(&mut s.grid, row_number.saturating_sub(1), column, value);
        }
    }

    /// Append a data row.
    pub fn push_row(&self, row: Vec<&str>) {
        if let Ok(mut s) = self.state.lock() {
            s.grid.push(row.into_iter().map(str::to_owned).collect());
        }
    }

    /// Every write accepted so far, oldest first.
    #[must_use]
    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.state
            .lock()
            .map(|s| s.writes.clone())
            .unwrap_or_default()
    }

    /// Number of `fetch_table` calls, including failed ones.
    #[must_use]
    pub fn read_count(&self) -> usize {
        self.state.lock().map(|s| s.reads).unwrap_or_default()
    }

    /// Make the next `n` reads fail with `SourceUnavailable`.
    pub fn fail_next_reads(&self, n: usize) {
        if let Ok(mut s) = self.state.lock() {
            s.failing_reads = n;
        }
    }

    /// Make writes touching `row_number` fail with `SourceUnavailable`.
    pub fn fail_writes_to_row(&self, row_number: usize) {
        if let Ok(mut s) = self.state.lock() {
            s.failing_rows.insert(row_number);
        }
    }

    /// Make writes touching `row_number` fail with `WriteConflict`.
    pub fn conflict_writes_to_row(&self, row_number: usize) {
        if let Ok(mut s) = self.state.lock() {
            s.conflict_rows.insert(row_number);
        }
    }

    /// Clear injected write failures.
    pub fn heal_writes(&self) {
        if let Ok(mut s) = self.state.lock() {
            s.failing_rows.clear();
            s.conflict_rows.clear();
        }
    }
}

fn put(grid: &mut Vec<Vec<String>>, row: usize, column: usize, value: &str) {
    while grid.len() <= row {
        grid.push(Vec::new());
    }
    let cells = &mut grid[row];
    while cells.len() <= column {
        cells.push(String::new());
    }
    cells[column] = value.to_owned();
}

/// Drop trailing empty cells in each row, then trailing empty rows.
fn normalized(grid: &[Vec<String>]) -> Vec<Vec<String>> {
    let mut rows: Vec<Vec<String>> = grid
        .iter()
        .map(|row| {
            let keep = row
                .iter()
                .rposition(|c| !c.is_empty())
                .map_or(0, |p| p + 1);
            row[..keep].to_vec()
        })
        .collect();
    while rows.last().is_some_and(Vec::is_empty) {
        rows.pop();
    }
    rows
}

#[async_trait]
impl RecordSource for InMemorySheet {
    fn id(&self) -> &'static str {
        "in-memory"
    }

    async fn fetch_table(&self, range: &str) -> crate::Result<Table> {
        let mut s = self
            .state
            .lock()
            .map_err(|_| NotifyError::SourceUnavailable("sheet lock poisoned".to_owned()))?;
        s.reads += 1;
        if s.failing_reads > 0 {
            s.failing_reads -= 1;
            return Err(NotifyError::SourceUnavailable(
                "injected read failure".to_owned(),
            ));
        }

        let (_, cells) = split_range(range);
        let max_column = last_column(cells);

        let rows = s
            .grid
            .iter()
            .map(|row| match max_column {
                Some(max) => row.iter().take(max + 1).cloned().collect(),
                None => row.clone(),
            })
            .collect::<Vec<_>>();
        Ok(Table::new(normalized(&rows)))
    }

    async fn write_cells(
        &self,
        range: &str,
        mode: ValueInputMode,
        values: Vec<Vec<String>>,
    ) -> crate::Result<()> {
        let (_, cells) = split_range(range);
        let (start, _) = parse_span(cells)
            .ok_or_else(|| NotifyError::SourceUnavailable(format!("bad range: {range}")))?;
        let first_row = start.row.unwrap_or(1);

        let mut s = self
            .state
            .lock()
            .map_err(|_| NotifyError::SourceUnavailable("sheet lock poisoned".to_owned()))?;

        let touched = first_row..first_row + values.len().max(1);
        if touched.clone().any(|r| s.conflict_rows.contains(&r)) {
            return Err(NotifyError::WriteConflict(format!(
                "row changed concurrently: {range}"
            )));
        }
        if touched.clone().any(|r| s.failing_rows.contains(&r)) {
            return Err(NotifyError::SourceUnavailable(format!(
                "injected write failure: {range}"
            )));
        }

        for (dr, row) in values.iter().enumerate() {
            for (dc, value) in row.iter().enumerate() {
                put(&mut s.grid, first_row - 1 + dr, start.column + dc, value);
            }
        }
        s.writes.push(RecordedWrite {
            range: range.to_owned(),
            mode,
            values,
        });
        Ok(())
    }
}
