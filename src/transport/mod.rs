//! Messaging transport: outbound sends plus the inbound event stream.
//!
//! [`Transport`] is the send/probe contract the dispatcher uses. Session and
//! delivery callbacks arrive separately as [`TransportEvent`]s on a broadcast
//! channel, fed by the [`webhook`] receiver and consumed by the delivery
//! observer.

pub mod waha;
pub mod webhook;

pub use waha::WahaTransport;

use async_trait::async_trait;
use std::fmt;
use tokio::sync::broadcast;

/// Capacity of the transport event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Opaque identifier the transport assigns to a sent message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageHandle(String);

impl MessageHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Delivery progress of a sent message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    Failed,
    Queued,
    SentToServer,
    Delivered,
    Read,
    Played,
    Unknown(i64),
}

impl DeliveryState {
    /// Map a gateway acknowledgement code.
    #[must_use]
    pub fn from_ack(code: i64) -> Self {
        match code {
            -1 => Self::Failed,
            0 => Self::Queued,
            1 => Self::SentToServer,
            2 => Self::Delivered,
            3 => Self::Read,
            4 => Self::Played,
            other => Self::Unknown(other),
        }
    }

    /// Position in the normal progression. `Failed` and `Unknown` sit outside it.
    #[must_use]
    pub fn rank(self) -> Option<u8> {
        match self {
            Self::Queued => Some(1),
            Self::SentToServer => Some(2),
            Self::Delivered => Some(3),
            Self::Read => Some(4),
            Self::Played => Some(5),
            Self::Failed | Self::Unknown(_) => None,
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Failed => "failed",
            Self::Queued => "queued",
            Self::SentToServer => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
            Self::Played => "played",
            Self::Unknown(_) => "unknown",
        }
    }
}

impl fmt::Display for DeliveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(code) => write!(f, "unknown({code})"),
            other => f.write_str(other.label()),
        }
    }
}

/// Session state reported by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Starting,
    ScanQrCode,
    Working,
    Failed,
    Stopped,
    Other(String),
}

impl SessionStatus {
    #[must_use]
    pub fn from_api(status: &str) -> Self {
        match status.trim().to_ascii_uppercase().as_str() {
            "STARTING" => Self::Starting,
            "SCAN_QR_CODE" => Self::ScanQrCode,
            "WORKING" => Self::Working,
            "FAILED" => Self::Failed,
            "STOPPED" => Self::Stopped,
            _ => Self::Other(status.trim().to_owned()),
        }
    }

    /// Only a working session accepts sends.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Working)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Starting => f.write_str("STARTING"),
            Self::ScanQrCode => f.write_str("SCAN_QR_CODE"),
            Self::Working => f.write_str("WORKING"),
            Self::Failed => f.write_str("FAILED"),
            Self::Stopped => f.write_str("STOPPED"),
            Self::Other(s) => f.write_str(s),
        }
    }
}

/// Callback from the transport session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    SessionReady,
    Authenticated,
    AuthFailure(String),
    Disconnected(String),
    /// Pairing challenge. Only its length is ever logged.
    QrChallenge(String),
    DeliveryStatus {
        handle: MessageHandle,
        to: Option<String>,
        state: DeliveryState,
    },
}

/// Create the broadcast channel transport events flow through.
#[must_use]
pub fn event_channel() -> (
    broadcast::Sender<TransportEvent>,
    broadcast::Receiver<TransportEvent>,
) {
    broadcast::channel(EVENT_CHANNEL_CAPACITY)
}

/// Outbound messaging session.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Stable identifier for logs.
    fn id(&self) -> &'static str;

    /// Send `text` to `destination` (a chat id such as `9998887777@c.us`).
    ///
    /// # Errors
    ///
    /// Returns `NotifyError::Transport` when the gateway rejects or fails the send.
    async fn send(&self, destination: &str, text: &str) -> crate::Result<MessageHandle>;

    /// Current session state.
    async fn session_status(&self) -> crate::Result<SessionStatus>;
}
