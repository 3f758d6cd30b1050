//! Google Sheets append provider

use async_trait::async_trait;
use std::env;
use std::time::Duration;

use super::openai::retry_after_secs;
use crate::api::{ApiError, SpreadsheetAppend};

const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const PROVIDER_NAME: &str = "sheets";
const TOKEN_ENV: &str = "MARKETFLOW_SHEETS_TOKEN";

/// Appends rows with `values:append`. The OAuth access token is supplied
/// externally through MARKETFLOW_SHEETS_TOKEN.
pub struct GoogleSheetsAppender {
    token: String,
    client: reqwest::Client,
    base_url: String,
    spreadsheet_id: String,
    range: String,
    timeout_secs: u64,
}

impl GoogleSheetsAppender {
    pub fn new(
        spreadsheet_id: impl Into<String>,
        range: impl Into<String>,
        token: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, ApiError> {
        let mut builder = reqwest::Client::builder().user_agent("marketflow/0.1");
        if timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(timeout_secs));
        }
        let client = builder
            .build()
            .map_err(|e| ApiError::network(PROVIDER_NAME, e.to_string()))?;

        Ok(Self {
            token: token.into(),
            client,
            base_url: SHEETS_API_BASE.to_string(),
            spreadsheet_id: spreadsheet_id.into(),
            range: range.into(),
            timeout_secs,
        })
    }

    pub fn from_env(
        spreadsheet_id: &str,
        range: &str,
        timeout_secs: u64,
    ) -> Result<Option<Self>, ApiError> {
        if spreadsheet_id.is_empty() {
            return Ok(None);
        }
        match env::var(TOKEN_ENV) {
            Ok(token) if !token.is_empty() => Ok(Some(Self::new(
                spreadsheet_id,
                range,
                token,
                timeout_secs,
            )?)),
            _ => Ok(None),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn append_url(&self) -> String {
        format!(
            "{}/{}/values/{}:append",
            self.base_url, self.spreadsheet_id, self.range
        )
    }
}

#[async_trait]
impl SpreadsheetAppend for GoogleSheetsAppender {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn append(&self, rows: &[Vec<String>]) -> Result<(), ApiError> {
        if rows.is_empty() {
            return Ok(());
        }

        let response = self
            .client
            .post(self.append_url())
            .query(&[
                ("valueInputOption", "RAW"),
                ("insertDataOption", "INSERT_ROWS"),
            ])
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "values": rows }))
            .send()
            .await
            .map_err(|e| ApiError::from_reqwest(PROVIDER_NAME, &e, self.timeout_secs))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let retry_after = retry_after_secs(response.headers());
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::from_status(
            PROVIDER_NAME,
            status.as_u16(),
            retry_after,
            body,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_url() {
        let sheets = GoogleSheetsAppender::new("sheet-1", "Topics!A1", "tok", 30).unwrap();
        assert_eq!(
            sheets.append_url(),
            "https://sheets.googleapis.com/v4/spreadsheets/sheet-1/values/Topics!A1:append"
        );
    }

    #[tokio::test]
    async fn test_empty_append_is_noop() {
        let sheets = GoogleSheetsAppender::new("sheet-1", "Topics!A1", "tok", 30)
            .unwrap()
            .with_base_url("http://127.0.0.1:9");
        assert!(sheets.append(&[]).await.is_ok());
    }
}
