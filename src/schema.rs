//! Header-row resolution.
//!
//! Maps the human-readable headers to column positions once per iteration and
//! decides whether the tracking column still has to be provisioned.

use crate::config::ColumnNames;

/// Zero-based positions of the logical fields within a data row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnIndex {
    pub patron_name: Option<usize>,
    pub amount: Option<usize>,
    pub payment_option: Option<usize>,
    pub contact_number: Option<usize>,
    /// Always present once resolution succeeds.
    pub notification_sent: usize,
}

impl ColumnIndex {
    /// Logical names of the display/contact columns the header lacks.
    #[must_use]
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.patron_name.is_none() {
            missing.push("patron_name");
        }
        if self.amount.is_none() {
            missing.push("amount");
        }
        if self.payment_option.is_none() {
            missing.push("payment_option");
        }
        if self.contact_number.is_none() {
            missing.push("contact_number");
        }
        missing
    }
}

/// Result of resolving a header row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaResolution {
    /// All positions known; the snapshot can be scanned.
    Ready(ColumnIndex),
    /// The tracking column is absent. `header` is the row to persist; the
    /// current snapshot must not be scanned.
    NeedsTrackingColumn { header: Vec<String> },
}

/// Resolve `header` against the configured column names.
///
/// Matching is exact after trimming the header cell. The first matching
/// column wins.
#[must_use]
pub fn resolve(header: &[String], names: &ColumnNames) -> SchemaResolution {
    let position = |name: &str| {
        let name = name.trim();
        header.iter().position(|h| h.trim() == name)
    };

    let Some(notification_sent) = position(&names.notification_sent) else {
        let mut extended = header.to_vec();
        extended.push(names.notification_sent.trim().to_owned());
        return SchemaResolution::NeedsTrackingColumn { header: extended };
    };

    SchemaResolution::Ready(ColumnIndex {
        patron_name: position(&names.patron_name),
        amount: position(&names.amount),
        payment_option: position(&names.payment_option),
        contact_number: position(&names.contact_number),
        notification_sent,
    })
}
