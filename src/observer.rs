//! Delivery confirmation observer.
//!
//! Consumes the transport event stream on its own task and logs session state
//! changes and per-message delivery progress. Sent messages are remembered in
//! a bounded registry so acknowledgements can be tied back to a sheet row.

use crate::transport::{DeliveryState, MessageHandle, TransportEvent};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// A message the dispatcher handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub handle: MessageHandle,
    /// 1-based sheet row the message was sent for.
    pub row_number: usize,
    pub destination: String,
    pub sent_at: DateTime<Utc>,
    /// Most recent delivery state seen for this message.
    pub last_state: Option<DeliveryState>,
}

/// What the registry knew when a delivery update arrived.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Observation {
    /// The tracked message, as it was before this update.
    pub message: Option<SentMessage>,
    /// `true` when the new state ranks below the previously seen one.
    pub out_of_order: bool,
}

/// Bounded registry of recently sent messages (oldest evicted first).
#[derive(Debug)]
pub struct SentMessages {
    entries: Mutex<VecDeque<SentMessage>>,
    capacity: usize,
}

impl SentMessages {
    pub const DEFAULT_CAPACITY: usize = 500;

    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Remember a sent message, evicting the oldest if at capacity.
    pub fn record(&self, handle: MessageHandle, row_number: usize, destination: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            if entries.len() >= self.capacity {
                entries.pop_front();
            }
            entries.push_back(SentMessage {
                handle,
                row_number,
                destination: destination.to_owned(),
                sent_at: Utc::now(),
                last_state: None,
            });
        }
    }

    /// Apply a delivery update and report the prior entry.
    pub fn observe(&self, handle: &MessageHandle, state: DeliveryState) -> Observation {
        let Ok(mut entries) = self.entries.lock() else {
            return Observation::default();
        };
        let Some(entry) = entries.iter_mut().find(|m| &m.handle == handle) else {
            return Observation::default();
        };

        let before = entry.clone();
        let out_of_order = matches!(
            (before.last_state.and_then(DeliveryState::rank), state.rank()),
            (Some(previous), Some(current)) if current < previous
        );
        entry.last_state = Some(state);
        Observation {
            message: Some(before),
            out_of_order,
        }
    }

    #[must_use]
    pub fn get(&self, handle: &MessageHandle) -> Option<SentMessage> {
        self.entries
            .lock()
            .ok()
            .and_then(|entries| entries.iter().find(|m| &m.handle == handle).cloned())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SentMessages {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

/// Logs transport events as they arrive.
#[derive(Debug, Clone)]
pub struct DeliveryObserver {
    sent: Arc<SentMessages>,
}

impl DeliveryObserver {
    pub fn new(sent: Arc<SentMessages>) -> Self {
        Self { sent }
    }

    /// Log one event and update the registry.
    pub fn handle_event(&self, event: &TransportEvent) {
        match event {
            TransportEvent::SessionReady => info!("whatsapp session ready"),
            TransportEvent::Authenticated => info!("whatsapp session authenticated"),
            TransportEvent::AuthFailure(reason) => {
                error!(%reason, "whatsapp authentication failed");
            }
            TransportEvent::Disconnected(reason) => {
                warn!(%reason, "whatsapp session disconnected");
            }
            TransportEvent::QrChallenge(payload) => {
                info!(
                    payload_len = payload.len(),
                    "whatsapp session needs pairing; scan the QR code in the gateway"
                );
            }
            TransportEvent::DeliveryStatus { handle, to, state } => {
                let observation = self.sent.observe(handle, *state);
                let destination = to
                    .clone()
                    .or_else(|| observation.message.as_ref().map(|m| m.destination.clone()))
                    .unwrap_or_else(|| "unknown".to_owned());
                let row = observation.message.as_ref().map(|m| m.row_number);

                if observation.out_of_order {
                    warn!(
                        %handle,
                        %destination,
                        state = %state,
                        previous = ?observation.message.as_ref().and_then(|m| m.last_state),
                        "delivery state arrived out of order"
                    );
                }

                match (row, state) {
                    (_, DeliveryState::Failed) => {
                        warn!(%handle, %destination, row, "message delivery failed");
                    }
                    (Some(row), _) => {
                        info!(%handle, %destination, row, state = %state, "delivery update");
                    }
                    (None, _) => {
                        debug!(%handle, %destination, state = %state, "delivery update for untracked message");
                    }
                }
            }
        }
    }

    /// Consume `events` until cancelled or the channel closes.
    pub fn spawn(
        self,
        mut events: broadcast::Receiver<TransportEvent>,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("delivery observer cancelled");
                        break;
                    }
                    received = events.recv() => match received {
                        Ok(event) => self.handle_event(&event),
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "delivery observer lagged; events dropped");
                        }
                        Err(RecvError::Closed) => {
                            debug!("transport event stream closed");
                            break;
                        }
                    }
                }
            }
        })
    }
}
