//! Shared helpers for integration tests.

use async_trait::async_trait;
use patron_notify::config::NotifyConfig;
use patron_notify::observer::SentMessages;
use patron_notify::sheet::{InMemorySheet, RecordSource};
use patron_notify::transport::{MessageHandle, SessionStatus, Transport};
use patron_notify::{Dispatcher, NotifyError};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// Header row in the column order the payments sheet ships with.
pub(crate) const HEADER: [&str; 5] = [
    "Patron Name",
    "Amount",
    "Payment Option (Cash, Cheque, UPI)",
    "Contact Number",
    "Notification Sent",
];

/// Zero-based column of `Notification Sent` in [`HEADER`].
pub(crate) const SENT_COLUMN: usize = 4;

/// Default config pointed at a real-looking sheet id.
pub(crate) fn config() -> NotifyConfig {
    let mut config = NotifyConfig::default();
    config.sheet.sheet_id = "1TestSheetId".to_owned();
    config
}

/// In-memory sheet with [`HEADER`] followed by `rows`.
pub(crate) fn sheet_with(rows: Vec<Vec<&str>>) -> Arc<InMemorySheet> {
    let mut all = vec![HEADER.to_vec()];
    all.extend(rows);
    Arc::new(InMemorySheet::new(all))
}

pub(crate) fn dispatcher(
    config: &NotifyConfig,
    sheet: &Arc<InMemorySheet>,
    transport: &Arc<ScriptedTransport>,
) -> Dispatcher {
    let source: Arc<dyn RecordSource> = sheet.clone();
    let transport: Arc<dyn Transport> = transport.clone();
    Dispatcher::new(config, source, transport, Arc::new(SentMessages::default()))
}

/// A send the transport accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SentText {
    pub destination: String,
    pub text: String,
}

/// Transport double with scripted failures, hangs and a hold point.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    sent: Mutex<Vec<SentText>>,
    attempts: AtomicUsize,
    failing: Mutex<HashSet<String>>,
    hang: AtomicBool,
    hold: AtomicBool,
    /// Signalled when a held send starts.
    pub entered: Notify,
    /// Signal to let a held send finish.
    pub release: Notify,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn sent(&self) -> Vec<SentText> {
        self.sent.lock().unwrap().clone()
    }

    /// Sends attempted, including failed ones.
    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub(crate) fn fail_for(&self, destination: &str) {
        self.failing.lock().unwrap().insert(destination.to_owned());
    }

    pub(crate) fn recover(&self) {
        self.failing.lock().unwrap().clear();
        self.hang.store(false, Ordering::SeqCst);
    }

    /// Make every send stall far past any request timeout.
    pub(crate) fn hang(&self) {
        self.hang.store(true, Ordering::SeqCst);
    }

    /// Hold the next sends until [`ScriptedTransport::release`] is notified.
    pub(crate) fn hold(&self) {
        self.hold.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn id(&self) -> &'static str {
        "scripted"
    }

    async fn send(&self, destination: &str, text: &str) -> patron_notify::Result<MessageHandle> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;

        if self.hold.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        if self.hang.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if self.failing.lock().unwrap().contains(destination) {
            return Err(NotifyError::Transport(format!(
                "gateway rejected {destination}"
            )));
        }

        self.sent.lock().unwrap().push(SentText {
            destination: destination.to_owned(),
            text: text.to_owned(),
        });
        Ok(MessageHandle::new(format!("msg-{attempt}")))
    }

    async fn session_status(&self) -> patron_notify::Result<SessionStatus> {
        Ok(SessionStatus::Working)
    }
}
