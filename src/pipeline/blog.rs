use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use utoipa::ToSchema;

use super::{configured, PipelineError, StageExecutor, PLACEHOLDER_LABEL};
use crate::api::{ModelParams, TextGenerator, TextRequest};
use crate::prompts::{PromptKind, PromptSet};
use crate::richtext::{markdown_to_blocks, Block};
use crate::session::Session;
use crate::topics::Topic;
use crate::workflow::Stage;

/// Generated blog post: the raw Markdown plus its rich-text rendering
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BlogDocument {
    pub markdown: String,
    pub blocks: Vec<Block>,
}

impl BlogDocument {
    pub fn from_markdown(markdown: impl Into<String>) -> Self {
        let markdown = markdown.into();
        let blocks = markdown_to_blocks(&markdown);
        Self { markdown, blocks }
    }

    fn placeholder(topic: &Topic) -> Self {
        Self::from_markdown(format!(
            "# {}\n\n{} The blog post could not be generated. Run this stage again to retry.",
            topic.title, PLACEHOLDER_LABEL
        ))
    }
}

/// Snapshot published while a blog post streams in.
///
/// Each snapshot replaces the previous one; the last has `complete = true`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct BlogProgress {
    pub blocks: Vec<Block>,
    pub complete: bool,
}

pub struct BlogInput {
    topic: Topic,
    request: TextRequest,
}

pub struct BlogExecutor {
    text: Option<Arc<dyn TextGenerator>>,
    prompts: Arc<PromptSet>,
    params: ModelParams,
}

impl BlogExecutor {
    pub fn new(
        text: Option<Arc<dyn TextGenerator>>,
        prompts: Arc<PromptSet>,
        params: ModelParams,
    ) -> Self {
        Self {
            text,
            prompts,
            params,
        }
    }

    /// Streaming variant: the same stage, reporting partial documents on `progress`
    pub fn streaming(&self, progress: watch::Sender<BlogProgress>) -> StreamingBlogExecutor<'_> {
        StreamingBlogExecutor {
            inner: self,
            progress,
        }
    }

    fn finish(markdown: String) -> Result<BlogDocument, PipelineError> {
        if markdown.trim().is_empty() {
            return Err(PipelineError::validation("blog response was empty"));
        }
        Ok(BlogDocument::from_markdown(markdown))
    }
}

#[async_trait]
impl StageExecutor for BlogExecutor {
    const STAGE: Stage = Stage::Blog;

    type Input = BlogInput;
    type Output = BlogDocument;

    fn provider(&self) -> &str {
        self.text.as_ref().map(|t| t.name()).unwrap_or("text")
    }

    fn prepare(&self, session: &Session) -> Result<BlogInput, PipelineError> {
        let topic = session.active_topic()?.clone();
        let instructions = self
            .prompts
            .render(PromptKind::Blog, &topic)
            .map_err(|e| PipelineError::validation(format!("{:#}", e)))?;

        let input = format!(
            "Title: {}\nContent brief: {}",
            topic.title, topic.content_brief
        );

        Ok(BlogInput {
            request: TextRequest {
                instructions,
                input,
                params: self.params.clone(),
            },
            topic,
        })
    }

    async fn invoke(&self, input: &BlogInput) -> Result<BlogDocument, PipelineError> {
        let text = configured(&self.text, "text")?;
        let markdown = text.generate(&input.request).await?;
        Self::finish(markdown)
    }

    fn fallback(&self, input: &BlogInput) -> Option<BlogDocument> {
        Some(BlogDocument::placeholder(&input.topic))
    }
}

/// Blog executor that streams the response and publishes each partial document
pub struct StreamingBlogExecutor<'a> {
    inner: &'a BlogExecutor,
    progress: watch::Sender<BlogProgress>,
}

#[async_trait]
impl StageExecutor for StreamingBlogExecutor<'_> {
    const STAGE: Stage = Stage::Blog;

    type Input = BlogInput;
    type Output = BlogDocument;

    fn provider(&self) -> &str {
        self.inner.provider()
    }

    fn prepare(&self, session: &Session) -> Result<BlogInput, PipelineError> {
        self.inner.prepare(session)
    }

    async fn invoke(&self, input: &BlogInput) -> Result<BlogDocument, PipelineError> {
        let text = configured(&self.inner.text, "text")?;
        let mut stream = text.generate_stream(&input.request);

        let mut markdown = String::new();
        while let Some(chunk) = stream.next().await {
            markdown.push_str(&chunk?);
            self.progress.send_replace(BlogProgress {
                blocks: markdown_to_blocks(&markdown),
                complete: false,
            });
        }

        let document = BlogExecutor::finish(markdown)?;
        self.progress.send_replace(BlogProgress {
            blocks: document.blocks.clone(),
            complete: true,
        });
        Ok(document)
    }

    fn fallback(&self, input: &BlogInput) -> Option<BlogDocument> {
        self.inner.fallback(input)
    }
}
