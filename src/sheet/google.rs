use crate::auth::AccessTokenSource;
use crate::config::SheetConfig;
use crate::error::NotifyError;
use crate::sheet::{RecordSource, Table, ValueInputMode};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Google Sheets REST (v4) adapter.
///
/// Reads use `values.get` with row-major output; writes use `values.update`.
/// Neither carries a revision token, so concurrent writers are last-write-wins.
#[derive(Clone)]
pub struct GoogleSheetsSource {
    client: reqwest::Client,
    base_url: String,
    sheet_id: String,
    tokens: Arc<dyn AccessTokenSource>,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

impl GoogleSheetsSource {
    pub fn new(config: &SheetConfig, tokens: Arc<dyn AccessTokenSource>) -> Self {
        Self::with_client(reqwest::Client::new(), config, tokens)
    }

    /// Build with a client carrying its own request timeout.
    pub fn with_timeout(
        config: &SheetConfig,
        tokens: Arc<dyn AccessTokenSource>,
        timeout: Duration,
    ) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self::with_client(client, config, tokens))
    }

    fn with_client(
        client: reqwest::Client,
        config: &SheetConfig,
        tokens: Arc<dyn AccessTokenSource>,
    ) -> Self {
        Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_owned(),
            sheet_id: config.sheet_id.trim().to_owned(),
            tokens,
        }
    }

    fn values_url(&self, range: &str) -> String {
        format!(
            "{}/v4/spreadsheets/{}/values/{}",
            self.base_url,
            urlencoding::encode(&self.sheet_id),
            urlencoding::encode(range)
        )
    }

    async fn bearer(&self) -> crate::Result<String> {
        let token = self.tokens.access_token().await?;
        Ok(format!("Bearer {token}"))
    }
}

fn cell_text(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

async fn error_for_status(
    response: reqwest::Response,
    operation: &str,
) -> crate::Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    if status == reqwest::StatusCode::CONFLICT {
        return Err(NotifyError::WriteConflict(format!(
            "{operation} rejected ({status}): {body}"
        )));
    }
    Err(NotifyError::SourceUnavailable(format!(
        "{operation} failed ({status}): {body}"
    )))
}

#[async_trait]
impl RecordSource for GoogleSheetsSource {
    fn id(&self) -> &'static str {
        "google-sheets"
    }

    async fn fetch_table(&self, range: &str) -> crate::Result<Table> {
        let response = self
            .client
            .get(self.values_url(range))
            .header("Authorization", self.bearer().await?)
            .query(&[("majorDimension", "ROWS")])
            .send()
            .await
            .map_err(|e| NotifyError::SourceUnavailable(format!("sheet read failed: {e}")))?;
        let response = error_for_status(response, "sheet read").await?;

        let body: ValueRange = response
            .json()
            .await
            .map_err(|e| NotifyError::SourceUnavailable(format!("bad sheet response: {e}")))?;

        let rows = body
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect();
        Ok(Table::new(rows))
    }

    async fn write_cells(
        &self,
        range: &str,
        mode: ValueInputMode,
        values: Vec<Vec<String>>,
    ) -> crate::Result<()> {
        let body = serde_json::json!({
            "range": range,
            "majorDimension": "ROWS",
            "values": values,
        });
        let response = self
            .client
            .put(self.values_url(range))
            .header("Authorization", self.bearer().await?)
            .query(&[("valueInputOption", mode.as_api_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| NotifyError::SourceUnavailable(format!("sheet write failed: {e}")))?;
        error_for_status(response, "sheet write").await?;
        Ok(())
    }
}
