//! External collaborators consumed by the pipeline
//!
//! Every stage executor talks to the outside world through one of these
//! traits. Concrete HTTP adapters live in [`providers`]; tests substitute
//! in-memory fakes.

pub mod error;
pub mod providers;

pub use error::ApiError;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Generation parameters forwarded to a text model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// A single text generation call: developer instructions plus user input
#[derive(Debug, Clone, PartialEq)]
pub struct TextRequest {
    pub instructions: String,
    pub input: String,
    pub params: ModelParams,
}

/// Text generation collaborator (blog, SEO, visual descriptions, social, topic ideas)
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Provider name used in logs and errors
    fn name(&self) -> &str;

    async fn generate(&self, request: &TextRequest) -> Result<String, ApiError>;

    /// Stream the response as text deltas.
    ///
    /// Providers without native streaming deliver the whole response as one chunk.
    fn generate_stream<'a>(
        &'a self,
        request: &'a TextRequest,
    ) -> BoxStream<'a, Result<String, ApiError>> {
        stream::once(async move { self.generate(request).await }).boxed()
    }
}

/// Image generation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageParams {
    pub model: String,
    pub count: u8,
    pub aspect_ratio: String,
}

/// An image produced (or not) by the visual stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImageAsset {
    /// Image bytes returned inline, base64 encoded
    Inline {
        mime_type: String,
        data_base64: String,
    },
    /// Image hosted by the provider
    Remote { url: String },
    /// No image could be produced; never rendered as a real asset
    Placeholder { reason: String },
}

impl ImageAsset {
    pub fn placeholder(reason: impl Into<String>) -> Self {
        ImageAsset::Placeholder {
            reason: reason.into(),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, ImageAsset::Placeholder { .. })
    }
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &str, params: &ImageParams)
        -> Result<Vec<ImageAsset>, ApiError>;
}

/// CMS collaborator: persists a structured document and returns its id
#[async_trait]
pub trait DocumentStore: Send + Sync {
    fn name(&self) -> &str;

    async fn create(&self, document: &serde_json::Value) -> Result<String, ApiError>;
}

/// Spreadsheet collaborator: appends rows to a sheet
#[async_trait]
pub trait SpreadsheetAppend: Send + Sync {
    fn name(&self) -> &str;

    async fn append(&self, rows: &[Vec<String>]) -> Result<(), ApiError>;
}
