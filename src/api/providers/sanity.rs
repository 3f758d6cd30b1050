//! Sanity CMS document store

use async_trait::async_trait;
use serde::Deserialize;
use std::env;
use std::time::Duration;

use super::openai::retry_after_secs;
use crate::api::{ApiError, DocumentStore};

const PROVIDER_NAME: &str = "sanity";
const API_VERSION: &str = "v2021-06-07";
const TOKEN_ENV: &str = "MARKETFLOW_SANITY_TOKEN";

/// Writes documents through the Sanity mutation API.
///
/// Documents are sent as `createOrReplace`, so a retried publish with the same
/// `_id` overwrites instead of duplicating.
pub struct SanityDocumentStore {
    token: String,
    client: reqwest::Client,
    base_url: String,
    timeout_secs: u64,
}

#[derive(Deserialize)]
struct MutateResponse {
    #[serde(default)]
    results: Vec<MutateResult>,
}

#[derive(Deserialize)]
struct MutateResult {
    id: String,
}

impl SanityDocumentStore {
    pub fn new(
        project_id: &str,
        dataset: &str,
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
            base_url: format!(
                "https://{}.api.sanity.io/{}/data/mutate/{}",
                project_id, API_VERSION, dataset
            ),
            timeout_secs,
        })
    }

    /// Create from MARKETFLOW_SANITY_TOKEN; `None` when the token or project is missing
    pub fn from_env(
        project_id: &str,
        dataset: &str,
        timeout_secs: u64,
    ) -> Result<Option<Self>, ApiError> {
        if project_id.is_empty() {
            return Ok(None);
        }
        match env::var(TOKEN_ENV) {
            Ok(token) if !token.is_empty() => {
                Ok(Some(Self::new(project_id, dataset, token, timeout_secs)?))
            }
            _ => Ok(None),
        }
    }

    /// Override the full mutate endpoint URL
    pub fn with_endpoint(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[async_trait]
impl DocumentStore for SanityDocumentStore {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn create(&self, document: &serde_json::Value) -> Result<String, ApiError> {
        let body = serde_json::json!({
            "mutations": [{ "createOrReplace": document }]
        });

        let response = self
            .client
            .post(&self.base_url)
            .query(&[("returnIds", "true")])
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| ApiError::from_reqwest(PROVIDER_NAME, &e, self.timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = retry_after_secs(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(
                PROVIDER_NAME,
                status.as_u16(),
                retry_after,
                body,
            ));
        }

        let parsed: MutateResponse = response
            .json()
            .await
            .map_err(|e| ApiError::invalid_response(PROVIDER_NAME, e.to_string()))?;

        parsed
            .results
            .into_iter()
            .next()
            .map(|r| r.id)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ApiError::invalid_response(PROVIDER_NAME, "no document id returned"))
    }
}
