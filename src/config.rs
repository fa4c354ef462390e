//! Configuration types for the notification service.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Sheet id shipped in the sample config; treated as "not configured".
pub const PLACEHOLDER_SHEET_ID: &str = "YOUR_GOOGLE_SHEET_ID_HERE";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Which spreadsheet and tab to scan.
    pub sheet: SheetConfig,
    /// Header names for each logical column.
    pub columns: ColumnNames,
    /// Polling cadence and per-call timeouts.
    pub poll: PollConfig,
    /// Google authorization material.
    pub auth: AuthConfig,
    /// WhatsApp gateway settings.
    pub transport: TransportConfig,
    /// Inbound webhook for gateway events.
    pub webhook: WebhookConfig,
    /// Log output.
    pub logging: LoggingConfig,
}

/// Spreadsheet location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetConfig {
    /// Target spreadsheet id (the long token in the sheet URL).
    pub sheet_id: String,
    /// Worksheet (tab) to scan.
    pub tab_name: String,
    /// Column span to read. Kept wide so added columns are still seen.
    pub read_columns: String,
    /// Sheets API base URL.
    pub api_base_url: String,
}

impl Default for SheetConfig {
    fn default() -> Self {
        Self {
            sheet_id: PLACEHOLDER_SHEET_ID.to_owned(),
            tab_name: "Sheet1".to_owned(),
            read_columns: "A:Z".to_owned(),
            api_base_url: "https://sheets.googleapis.com".to_owned(),
        }
    }
}

impl SheetConfig {
    /// Returns `true` when the sheet id is empty or still the placeholder.
    #[must_use]
    pub fn sheet_id_is_unset(&self) -> bool {
        let id = self.sheet_id.trim();
        id.is_empty() || id == PLACEHOLDER_SHEET_ID
    }
}

/// Human-readable header text for each logical field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnNames {
    pub patron_name: String,
    pub amount: String,
    pub payment_option: String,
    pub contact_number: String,
    /// Tracking column; appended to the header when missing.
    pub notification_sent: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            patron_name: "Patron Name".to_owned(),
            amount: "Amount".to_owned(),
            payment_option: "Payment Option (Cash, Cheque, UPI)".to_owned(),
            contact_number: "Contact Number".to_owned(),
            notification_sent: "Notification Sent".to_owned(),
        }
    }
}

/// Polling cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Seconds between iterations.
    pub interval_secs: u64,
    /// Upper bound for any single network call.
    pub request_timeout_secs: u64,
    /// How often to probe the transport session while waiting for it to come up.
    pub ready_probe_secs: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            request_timeout_secs: 30,
            ready_probe_secs: 5,
        }
    }
}

/// Google OAuth material produced by the (external) consent flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// OAuth client secrets (`installed` or `web` block).
    pub credentials_path: PathBuf,
    /// Cached token written by the consent flow; refreshed in place.
    pub token_cache_path: PathBuf,
    /// Static access token; bypasses the token cache when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            credentials_path: PathBuf::from("credentials.json"),
            token_cache_path: PathBuf::from("token.json"),
            access_token: None,
        }
    }
}

/// WhatsApp HTTP gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Gateway base URL.
    pub base_url: String,
    /// Gateway session name.
    pub session: String,
    /// Sent as `X-Api-Key` when non-empty.
    pub api_key: String,
    /// Suffix appended to the contact number to form the chat id.
    pub chat_domain: String,
    /// Outbound cap per rolling minute; `0` disables the limit.
    pub max_messages_per_minute: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_owned(),
            session: "default".to_owned(),
            api_key: String::new(),
            chat_domain: "c.us".to_owned(),
            max_messages_per_minute: 0,
        }
    }
}

/// Webhook receiver for gateway callbacks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    /// Required `Authorization: Bearer` value, if set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_owned(),
            port: 8765,
            bearer_token: None,
        }
    }
}

/// Log output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    /// Directory for a daily rolling log file, in addition to stderr.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "patron_notify=info".to_owned(),
            log_dir: None,
        }
    }
}

impl NotifyConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::NotifyError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::NotifyError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/patron-notify/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config)
                .join("patron-notify")
                .join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("patron-notify")
                .join("config.toml")
        } else {
            PathBuf::from("/tmp/patron-notify/config.toml")
        }
    }

    /// List configuration problems. An empty list means the config is usable.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.sheet.sheet_id_is_unset() {
            problems.push(format!(
                "sheet.sheet_id is unset; replace {PLACEHOLDER_SHEET_ID} with the id from the sheet URL"
            ));
        }
        if crate::sheet::range::last_column(&self.sheet.read_columns).is_none() {
            problems.push(format!(
                "sheet.read_columns {:?} is not an A1 column span such as A:Z",
                self.sheet.read_columns
            ));
        }
        if self.sheet.tab_name.trim().is_empty() {
            problems.push("sheet.tab_name must not be empty".to_owned());
        }
        if self.columns.notification_sent.trim().is_empty() {
            problems.push("columns.notification_sent must not be empty".to_owned());
        }
        if self.poll.interval_secs == 0 {
            problems.push("poll.interval_secs must be at least 1".to_owned());
        }
        if self.poll.request_timeout_secs == 0 {
            problems.push("poll.request_timeout_secs must be at least 1".to_owned());
        }
        if self.transport.base_url.trim().is_empty() {
            problems.push("transport.base_url must not be empty".to_owned());
        }
        if self.transport.chat_domain.trim().is_empty() {
            problems.push("transport.chat_domain must not be empty".to_owned());
        }
        problems
    }
}
