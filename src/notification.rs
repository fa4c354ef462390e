//! Per-row notification records.
//!
//! A record is derived from one data row during an iteration, used for a
//! single send, and dropped.

use crate::schema::ColumnIndex;
use crate::sheet::cell;

/// Display text substituted for a blank patron name, amount or payment option.
pub const FALLBACK_TEXT: &str = "N/A";

/// Value written to the tracking cell after a confirmed send.
pub const SENT_MARKER: &str = "true";

/// A row is pending when its tracking flag is blank or `false` (any case).
#[must_use]
pub fn is_pending(flag: Option<&str>) -> bool {
    match flag.map(str::trim) {
        None | Some("") => true,
        Some(value) => value.eq_ignore_ascii_case("false"),
    }
}

/// Everything needed to send one receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRecord {
    /// 1-based sheet row.
    pub row_number: usize,
    pub patron_name: String,
    pub amount: String,
    pub payment_option: String,
    pub contact_number: String,
}

impl NotificationRecord {
    /// Receipt sentence sent to the patron.
    #[must_use]
    pub fn message(&self) -> String {
        format!(
            "Dear {}, we have received {} via {}.",
            self.patron_name, self.amount, self.payment_option
        )
    }

    /// Chat address: the contact number verbatim plus the transport domain.
    #[must_use]
    pub fn destination(&self, chat_domain: &str) -> String {
        format!("{}@{}", self.contact_number, chat_domain)
    }
}

/// What a data row calls for in this iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowCandidate {
    /// Already marked sent.
    NotPending,
    /// Pending, but there is nobody to send to.
    MissingContact,
    Ready(NotificationRecord),
}

/// Classify a data row.
#[must_use]
pub fn evaluate_row(row_number: usize, row: &[String], index: &ColumnIndex) -> RowCandidate {
    if !is_pending(cell(row, Some(index.notification_sent))) {
        return RowCandidate::NotPending;
    }

    let contact_number = cell(row, index.contact_number).unwrap_or_default();
    if contact_number.trim().is_empty() {
        return RowCandidate::MissingContact;
    }

    let display = |column: Option<usize>| {
        cell(row, column)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(FALLBACK_TEXT)
            .to_owned()
    };

    RowCandidate::Ready(NotificationRecord {
        row_number,
        patron_name: display(index.patron_name),
        amount: display(index.amount),
        payment_option: display(index.payment_option),
        contact_number: contact_number.to_owned(),
    })
}
