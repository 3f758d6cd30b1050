use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use super::{configured, truncate_chars, PipelineError, StageExecutor};
use crate::api::{ModelParams, TextGenerator, TextRequest};
use crate::prompts::{PromptKind, PromptSet};
use crate::richtext::blocks_to_plain_text;
use crate::session::Session;
use crate::workflow::Stage;

/// Section tags, in the order posts are requested
pub const SOCIAL_PLATFORMS: [&str; 4] = ["LINKEDIN", "TWITTER", "INSTAGRAM", "FACEBOOK"];

const DEFAULT_LINKEDIN: &str = "We just published a new article on our blog. Read it and share your thoughts.";
const DEFAULT_TWITTER: &str = "New on the blog today. Have a read!";
const DEFAULT_INSTAGRAM: &str = "Fresh article on the blog. Link in bio.";
const DEFAULT_FACEBOOK: &str = "Our latest blog post is live. Check it out and let us know what you think.";

static SECTION_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?mi)^[ \t]*\[(LINKEDIN|TWITTER|INSTAGRAM|FACEBOOK)\][ \t]*:?")
        .expect("section tag pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SocialPosts {
    pub linkedin: String,
    pub twitter: String,
    pub instagram: String,
    pub facebook: String,
}

impl Default for SocialPosts {
    fn default() -> Self {
        Self {
            linkedin: DEFAULT_LINKEDIN.to_string(),
            twitter: DEFAULT_TWITTER.to_string(),
            instagram: DEFAULT_INSTAGRAM.to_string(),
            facebook: DEFAULT_FACEBOOK.to_string(),
        }
    }
}

/// Split a response into per-platform posts. Missing or empty sections keep
/// the platform default; the first occurrence of a tag wins.
pub fn parse_social(response: &str) -> SocialPosts {
    let tags: Vec<(String, usize, usize)> = SECTION_TAG
        .captures_iter(response)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let name = caps.get(1)?.as_str().to_ascii_uppercase();
            Some((name, whole.start(), whole.end()))
        })
        .collect();

    let mut posts = SocialPosts::default();
    let mut filled: Vec<String> = Vec::new();
    for (i, (name, _, body_start)) in tags.iter().enumerate() {
        if filled.contains(name) {
            continue;
        }
        let body_end = tags.get(i + 1).map(|(_, start, _)| *start).unwrap_or(response.len());
        let body = response[*body_start..body_end].trim();
        if body.is_empty() {
            continue;
        }

        let slot = match name.as_str() {
            "LINKEDIN" => &mut posts.linkedin,
            "TWITTER" => &mut posts.twitter,
            "INSTAGRAM" => &mut posts.instagram,
            _ => &mut posts.facebook,
        };
        *slot = body.to_string();
        filled.push(name.clone());
    }
    posts
}

pub struct SocialInput {
    request: TextRequest,
}

pub struct SocialExecutor {
    text: Option<Arc<dyn TextGenerator>>,
    prompts: Arc<PromptSet>,
    params: ModelParams,
    input_chars: usize,
}

impl SocialExecutor {
    pub fn new(
        text: Option<Arc<dyn TextGenerator>>,
        prompts: Arc<PromptSet>,
        params: ModelParams,
        input_chars: usize,
    ) -> Self {
        Self {
            text,
            prompts,
            params,
            input_chars,
        }
    }
}

#[async_trait]
impl StageExecutor for SocialExecutor {
    const STAGE: Stage = Stage::Social;

    type Input = SocialInput;
    type Output = SocialPosts;

    fn provider(&self) -> &str {
        self.text.as_ref().map(|t| t.name()).unwrap_or("text")
    }

    fn prepare(&self, session: &Session) -> Result<SocialInput, PipelineError> {
        let blog = session
            .blog()
            .ok_or_else(|| PipelineError::validation("no blog post to promote"))?;
        let plain = blocks_to_plain_text(&blog.blocks);
        if plain.trim().is_empty() {
            return Err(PipelineError::validation("blog post has no text"));
        }

        let instructions = self
            .prompts
            .render(
                PromptKind::Social,
                &serde_json::json!({ "platforms": SOCIAL_PLATFORMS }),
            )
            .map_err(|e| PipelineError::validation(format!("{:#}", e)))?;

        Ok(SocialInput {
            request: TextRequest {
                instructions,
                input: truncate_chars(&plain, self.input_chars).to_string(),
                params: self.params.clone(),
            },
        })
    }

    async fn invoke(&self, input: &SocialInput) -> Result<SocialPosts, PipelineError> {
        let text = configured(&self.text, "text")?;
        let response = text.generate(&input.request).await?;
        Ok(parse_social(&response))
    }

    fn fallback(&self, _input: &SocialInput) -> Option<SocialPosts> {
        Some(SocialPosts::default())
    }
}
