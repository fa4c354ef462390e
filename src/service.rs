//! Process wiring: builds the adapters from config and runs the long-lived
//! tasks (webhook receiver, delivery observer, poll loop) under one
//! cancellation token.

use crate::auth::{AccessTokenSource, OAuthTokenCache, StaticToken};
use crate::config::NotifyConfig;
use crate::dispatch::runner::PollStats;
use crate::dispatch::{Dispatcher, IterationReport, PollLoop};
use crate::error::NotifyError;
use crate::observer::{DeliveryObserver, SentMessages};
use crate::sheet::{GoogleSheetsSource, RecordSource};
use crate::transport::webhook::{self, WebhookState};
use crate::transport::{SessionStatus, Transport, TransportEvent, WahaTransport, event_channel};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct NotifyService {
    config: NotifyConfig,
    dispatcher: Arc<Dispatcher>,
    transport: Arc<dyn Transport>,
    events: broadcast::Sender<TransportEvent>,
    sent: Arc<SentMessages>,
}

impl NotifyService {
    /// Build the Google Sheets source and WhatsApp gateway transport.
    ///
    /// # Errors
    ///
    /// Returns `NotifyError::Auth` when no usable Google credentials are found.
    pub fn from_config(config: NotifyConfig) -> crate::Result<Self> {
        let timeout = Duration::from_secs(config.poll.request_timeout_secs.max(1));
        let tokens: Arc<dyn AccessTokenSource> = match config
            .auth
            .access_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
        {
            Some(token) => Arc::new(StaticToken::new(token)),
            None => Arc::new(OAuthTokenCache::load(&config.auth)?),
        };
        let source = GoogleSheetsSource::with_timeout(&config.sheet, tokens, timeout)?;
        let transport = WahaTransport::with_timeout(&config.transport, timeout)?;
        Ok(Self::new(config, Arc::new(source), Arc::new(transport)))
    }

    pub fn new(
        config: NotifyConfig,
        source: Arc<dyn RecordSource>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let sent = Arc::new(SentMessages::default());
        let dispatcher = Arc::new(Dispatcher::new(
            &config,
            source,
            Arc::clone(&transport),
            Arc::clone(&sent),
        ));
        let (events, _) = event_channel();
        Self {
            config,
            dispatcher,
            transport,
            events,
            sent,
        }
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Sender side of the transport event stream.
    #[must_use]
    pub fn events(&self) -> broadcast::Sender<TransportEvent> {
        self.events.clone()
    }

    /// Run a single iteration.
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::run_iteration`].
    pub async fn run_once(&self) -> crate::Result<IterationReport> {
        self.dispatcher.run_iteration().await
    }

    /// Probe the transport session once.
    ///
    /// # Errors
    ///
    /// Returns `Transport` if the gateway cannot be reached, or `Timeout`.
    pub async fn probe_session(&self) -> crate::Result<SessionStatus> {
        let secs = self.config.poll.request_timeout_secs.max(1);
        tokio::time::timeout(Duration::from_secs(secs), self.transport.session_status())
            .await
            .map_err(|_| NotifyError::Timeout {
                operation: "session_status",
                secs,
            })?
    }

    /// Run until `cancel` fires.
    ///
    /// Starts the webhook receiver (when enabled) and the delivery observer,
    /// waits for the transport session to become ready, then polls.
    ///
    /// # Errors
    ///
    /// Returns `NotifyError::Io` if the webhook address cannot be bound.
    pub async fn run(self, cancel: CancellationToken) -> crate::Result<PollStats> {
        let mut ready_rx = self.events.subscribe();
        let observer = DeliveryObserver::new(Arc::clone(&self.sent))
            .spawn(self.events.subscribe(), cancel.clone());

        let webhook_task = if self.config.webhook.enabled {
            let listener = webhook::bind(&self.config.webhook).await?;
            let state = WebhookState::new(
                self.events.clone(),
                self.config.webhook.bearer_token.clone(),
            );
            Some(tokio::spawn(webhook::serve(listener, state, cancel.clone())))
        } else {
            info!("webhook receiver disabled; delivery updates will not be observed");
            None
        };

        let stats = if self.wait_until_ready(&mut ready_rx, &cancel).await {
            let interval = Duration::from_secs(self.config.poll.interval_secs.max(1));
            PollLoop::new(Arc::clone(&self.dispatcher), interval, cancel.clone())
                .run()
                .await
        } else {
            PollStats::default()
        };

        cancel.cancel();
        if let Some(task) = webhook_task {
            match task.await {
                Ok(Err(e)) => warn!(error = %e, "webhook receiver failed"),
                Err(e) => warn!(error = %e, "webhook task panicked"),
                Ok(Ok(())) => {}
            }
        }
        if let Err(e) = observer.await {
            warn!(error = %e, "delivery observer panicked");
        }
        Ok(stats)
    }

    /// Block until the session reports ready, either through an event or a
    /// status probe. Returns `false` if cancelled first.
    async fn wait_until_ready(
        &self,
        events: &mut broadcast::Receiver<TransportEvent>,
        cancel: &CancellationToken,
    ) -> bool {
        let mut probe =
            tokio::time::interval(Duration::from_secs(self.config.poll.ready_probe_secs.max(1)));
        probe.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut last_status: Option<SessionStatus> = None;
        let mut stream_open = true;

        info!(transport = self.transport.id(), "waiting for messaging session");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return false,
                received = events.recv(), if stream_open => match received {
                    Ok(TransportEvent::SessionReady) => {
                        info!("messaging session ready");
                        return true;
                    }
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => stream_open = false,
                },
                _ = probe.tick() => match self.probe_session().await {
                    Ok(status) if status.is_ready() => {
                        info!("messaging session ready");
                        return true;
                    }
                    Ok(status) => {
                        if last_status.as_ref() != Some(&status) {
                            match status {
                                SessionStatus::ScanQrCode => {
                                    info!("session needs pairing; scan the QR code in the gateway");
                                }
                                ref other => info!(status = %other, "session not ready yet"),
                            }
                            last_status = Some(status);
                        }
                    }
                    Err(e) => debug!(error = %e, "session probe failed"),
                },
            }
        }
    }
}
