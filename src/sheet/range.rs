//! A1-notation helpers for building and parsing sheet ranges.

/// Convert a zero-based column index to its A1 letters (`0 → A`, `26 → AA`).
#[must_use]
pub fn column_letters(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// Convert A1 column letters back to a zero-based index.
#[must_use]
pub fn column_index(letters: &str) -> Option<usize> {
    if letters.is_empty() {
        return None;
    }
    let mut n: usize = 0;
    for c in letters.chars() {
        if !c.is_ascii_alphabetic() {
            return None;
        }
        let digit = (c.to_ascii_uppercase() as u8 - b'A') as usize + 1;
        n = n.checked_mul(26)?.checked_add(digit)?;
    }
    Some(n - 1)
}

/// Quote a tab name for use in a range when it is not a plain identifier.
#[must_use]
pub fn quote_tab(tab: &str) -> String {
    let plain = !tab.is_empty() && tab.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if plain {
        tab.to_owned()
    } else {
        format!("'{}'", tab.replace('\'', "''"))
    }
}

/// `Tab!A:Z` style range covering whole columns.
#[must_use]
pub fn table_range(tab: &str, columns: &str) -> String {
    format!("{}!{}", quote_tab(tab), columns)
}

/// Anchor for a header rewrite: the first cell of row 1.
#[must_use]
pub fn header_range(tab: &str) -> String {
    format!("{}!A1", quote_tab(tab))
}

/// Single cell, addressed by 1-based sheet row and zero-based column.
#[must_use]
pub fn cell_range(tab: &str, row_number: usize, column: usize) -> String {
    format!("{}!{}{}", quote_tab(tab), column_letters(column), row_number)
}

/// Split `Tab!A1` into the (unquoted) tab and the cell part.
#[must_use]
pub fn split_range(range: &str) -> (Option<String>, &str) {
    match range.rfind('!') {
        Some(pos) => {
            let tab = &range[..pos];
            let tab = tab
                .strip_prefix('\'')
                .and_then(|t| t.strip_suffix('\''))
                .map(|t| t.replace("''", "'"))
                .unwrap_or_else(|| tab.to_owned());
            (Some(tab), &range[pos + 1..])
        }
        None => (None, range),
    }
}

/// A parsed A1 cell or column reference (`E2`, `AA`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRef {
    /// Zero-based column.
    pub column: usize,
    /// 1-based row, absent for whole-column references.
    pub row: Option<usize>,
}

impl CellRef {
    /// Parse a single A1 reference. Returns `None` for malformed input.
    #[must_use]
    pub fn parse(a1: &str) -> Option<Self> {
        let a1 = a1.trim().replace('$', "");
        let split = a1
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(a1.len());
        let (letters, digits) = a1.split_at(split);
        let column = column_index(letters)?;
        let row = if digits.is_empty() {
            None
        } else {
            let row: usize = digits.parse().ok()?;
            if row == 0 {
                return None;
            }
            Some(row)
        };
        Some(Self { column, row })
    }
}

/// Parse `A:Z` / `B2:D9` / `E2` into start and optional end references.
#[must_use]
pub fn parse_span(cells: &str) -> Option<(CellRef, Option<CellRef>)> {
    match cells.split_once(':') {
        Some((start, end)) => Some((CellRef::parse(start)?, Some(CellRef::parse(end)?))),
        None => Some((CellRef::parse(cells)?, None)),
    }
}

/// Rightmost column a span covers (`A:Z → 25`, `E2 → 4`).
#[must_use]
pub fn last_column(cells: &str) -> Option<usize> {
    let (start, end) = parse_span(cells)?;
    Some(end.unwrap_or(start).column)
}
