//! Gemini (Imagen) image generation provider

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use super::openai::retry_after_secs;
use crate::api::{ApiError, ImageAsset, ImageGenerator, ImageParams};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const PROVIDER_NAME: &str = "gemini";
const API_KEY_ENV: &str = "MARKETFLOW_GEMINI_API_KEY";

pub struct GeminiImageGenerator {
    api_key: String,
    client: reqwest::Client,
    base_url: String,
    timeout_secs: u64,
}

#[derive(Serialize)]
struct PredictRequest<'a> {
    instances: Vec<PredictInstance<'a>>,
    parameters: PredictParameters<'a>,
}

#[derive(Serialize)]
struct PredictInstance<'a> {
    prompt: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PredictParameters<'a> {
    sample_count: u8,
    aspect_ratio: &'a str,
}

#[derive(Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Prediction {
    bytes_base64_encoded: Option<String>,
    mime_type: Option<String>,
}

impl GeminiImageGenerator {
    pub fn new(api_key: impl Into<String>, timeout_secs: u64) -> Result<Self, ApiError> {
        let mut builder = reqwest::Client::builder().user_agent("marketflow/0.1");
        if timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(timeout_secs));
        }
        let client = builder
            .build()
            .map_err(|e| ApiError::network(PROVIDER_NAME, e.to_string()))?;

        Ok(Self {
            api_key: api_key.into(),
            client,
            base_url: GEMINI_API_BASE.to_string(),
            timeout_secs,
        })
    }

    /// Create provider from the MARKETFLOW_GEMINI_API_KEY environment variable
    pub fn from_env(timeout_secs: u64) -> Result<Option<Self>, ApiError> {
        match env::var(API_KEY_ENV) {
            Ok(key) if !key.is_empty() => Ok(Some(Self::new(key, timeout_secs)?)),
            _ => Ok(None),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Convert predictions into assets, rejecting payloads that are not valid base64
    fn into_assets(predictions: Vec<Prediction>) -> Result<Vec<ImageAsset>, ApiError> {
        let engine = base64::engine::general_purpose::STANDARD;
        predictions
            .into_iter()
            .filter_map(|p| p.bytes_base64_encoded.map(|data| (data, p.mime_type)))
            .map(|(data, mime)| {
                engine.decode(data.as_bytes()).map_err(|e| {
                    ApiError::invalid_response(PROVIDER_NAME, format!("bad image payload: {}", e))
                })?;
                Ok(ImageAsset::Inline {
                    mime_type: mime.unwrap_or_else(|| "image/png".to_string()),
                    data_base64: data,
                })
            })
            .collect()
    }
}

#[async_trait]
impl ImageGenerator for GeminiImageGenerator {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn generate(
        &self,
        prompt: &str,
        params: &ImageParams,
    ) -> Result<Vec<ImageAsset>, ApiError> {
        let url = format!("{}/models/{}:predict", self.base_url, params.model);
        let body = PredictRequest {
            instances: vec![PredictInstance { prompt }],
            parameters: PredictParameters {
                sample_count: params.count.max(1),
                aspect_ratio: &params.aspect_ratio,
            },
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
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

        let parsed: PredictResponse = response
            .json()
            .await
            .map_err(|e| ApiError::invalid_response(PROVIDER_NAME, e.to_string()))?;

        let assets = Self::into_assets(parsed.predictions)?;
        if assets.is_empty() {
            return Err(ApiError::invalid_response(
                PROVIDER_NAME,
                "response contained no images",
            ));
        }
        Ok(assets)
    }
}
