use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use super::{
    configured, strip_code_fences, truncate_chars, truncate_with_marker, PipelineError,
    StageExecutor, PLACEHOLDER_LABEL,
};
use crate::api::{ModelParams, TextGenerator, TextRequest};
use crate::prompts::{PromptKind, PromptSet};
use crate::session::Session;
use crate::topics::Topic;
use crate::workflow::Stage;

pub const META_TITLE_MAX_CHARS: usize = 160;
pub const META_DESCRIPTION_MAX_CHARS: usize = 320;
const KEYWORD_MAX_WORDS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SeoData {
    pub meta_title: String,
    pub meta_description: String,
    pub keywords: Vec<String>,
    /// The collaborator's response, capped for display
    pub raw_excerpt: String,
}

/// Validate an SEO response.
///
/// Missing fields become empty values; anything that is not a JSON object
/// is rejected.
pub fn parse_seo(
    response: &str,
    max_chars: usize,
    max_keywords: usize,
) -> Result<SeoData, PipelineError> {
    let value: serde_json::Value = serde_json::from_str(strip_code_fences(response))
        .map_err(|e| PipelineError::validation(format!("SEO response was not JSON: {}", e)))?;
    let object = value
        .as_object()
        .ok_or_else(|| PipelineError::validation("SEO response was not a JSON object"))?;

    let text_field = |key: &str, limit: usize| {
        object
            .get(key)
            .and_then(|v| v.as_str())
            .map(|s| truncate_chars(s.trim(), limit).to_string())
            .unwrap_or_default()
    };

    let mut keywords: Vec<String> = Vec::new();
    if let Some(list) = object.get("keywords").and_then(|v| v.as_array()) {
        for keyword in list.iter().filter_map(|v| v.as_str()) {
            if keywords.len() >= max_keywords {
                break;
            }
            let words: Vec<&str> = keyword.split_whitespace().collect();
            if words.is_empty() || words.len() > KEYWORD_MAX_WORDS {
                continue;
            }
            let keyword = words.join(" ");
            if !keywords.contains(&keyword) {
                keywords.push(keyword);
            }
        }
    }

    Ok(SeoData {
        meta_title: text_field("metaTitle", META_TITLE_MAX_CHARS),
        meta_description: text_field("metaDescription", META_DESCRIPTION_MAX_CHARS),
        keywords,
        raw_excerpt: truncate_with_marker(response, max_chars),
    })
}

pub struct SeoInput {
    topic: Topic,
    request: TextRequest,
}

pub struct SeoExecutor {
    text: Option<Arc<dyn TextGenerator>>,
    prompts: Arc<PromptSet>,
    params: ModelParams,
    max_chars: usize,
    max_keywords: usize,
}

impl SeoExecutor {
    pub fn new(
        text: Option<Arc<dyn TextGenerator>>,
        prompts: Arc<PromptSet>,
        params: ModelParams,
        max_chars: usize,
        max_keywords: usize,
    ) -> Self {
        Self {
            text,
            prompts,
            params,
            max_chars,
            max_keywords,
        }
    }
}

#[async_trait]
impl StageExecutor for SeoExecutor {
    const STAGE: Stage = Stage::Seo;

    type Input = SeoInput;
    type Output = SeoData;

    fn provider(&self) -> &str {
        self.text.as_ref().map(|t| t.name()).unwrap_or("text")
    }

    fn prepare(&self, session: &Session) -> Result<SeoInput, PipelineError> {
        let topic = session.active_topic()?.clone();
        let blog = session
            .blog()
            .ok_or_else(|| PipelineError::validation("no blog post to optimize"))?;

        let instructions = self
            .prompts
            .render(
                PromptKind::Seo,
                &serde_json::json!({ "max_keywords": self.max_keywords }),
            )
            .map_err(|e| PipelineError::validation(format!("{:#}", e)))?;

        Ok(SeoInput {
            request: TextRequest {
                instructions,
                input: format!("Title: {}\n\n{}", topic.title, blog.markdown),
                params: self.params.clone(),
            },
            topic,
        })
    }

    async fn invoke(&self, input: &SeoInput) -> Result<SeoData, PipelineError> {
        let text = configured(&self.text, "text")?;
        let response = text.generate(&input.request).await?;
        parse_seo(&response, self.max_chars, self.max_keywords)
    }

    fn fallback(&self, input: &SeoInput) -> Option<SeoData> {
        Some(SeoData {
            meta_title: truncate_chars(&input.topic.title, META_TITLE_MAX_CHARS).to_string(),
            meta_description: format!("{} SEO metadata could not be generated.", PLACEHOLDER_LABEL),
            keywords: Vec::new(),
            raw_excerpt: String::new(),
        })
    }
}
