//! HTTP adapters for the collaborator traits
//!
//! Credentials come from the environment; each `from_env` returns `Ok(None)`
//! when its provider is not configured so callers can fall back or fail
//! explicitly per stage.

pub mod gemini;
pub mod openai;
pub mod sanity;
pub mod sheets;

pub use gemini::GeminiImageGenerator;
pub use openai::OpenAiTextGenerator;
pub use sanity::SanityDocumentStore;
pub use sheets::GoogleSheetsAppender;
