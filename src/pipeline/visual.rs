use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use super::{configured, strip_code_fences, PipelineError, StageExecutor};
use crate::api::{
    ImageAsset, ImageGenerator, ImageParams, ModelParams, TextGenerator, TextRequest,
};
use crate::prompts::{PromptKind, PromptSet};
use crate::session::Session;
use crate::topics::Topic;
use crate::workflow::Stage;

/// Operator guidance for the art direction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VisualHints {
    #[serde(default)]
    pub scene: Option<String>,
    #[serde(default)]
    pub body_language: Option<String>,
}

/// One image description record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct VisualDescription {
    #[serde(rename = "Image Name")]
    pub image_name: String,
    #[serde(rename = "Caption Plan")]
    pub caption_plan: String,
    #[serde(rename = "Target Audience")]
    pub target_audience: String,
    #[serde(rename = "Keywords")]
    pub keywords: String,
    #[serde(rename = "Platform")]
    pub platform: String,
}

impl VisualDescription {
    fn is_complete(&self) -> bool {
        [
            &self.image_name,
            &self.caption_plan,
            &self.target_audience,
            &self.keywords,
            &self.platform,
        ]
        .iter()
        .all(|field| !field.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct VisualOutput {
    pub descriptions: Vec<VisualDescription>,
    /// Rendering of the first description; a placeholder when none could be made
    pub image: ImageAsset,
}

/// Validate a description response. Incomplete records are dropped.
pub fn parse_descriptions(response: &str) -> Result<Vec<VisualDescription>, PipelineError> {
    let entries: Vec<serde_json::Value> = serde_json::from_str(strip_code_fences(response))
        .map_err(|e| {
            PipelineError::validation(format!("visual descriptions were not a JSON array: {}", e))
        })?;

    let total = entries.len();
    let descriptions: Vec<VisualDescription> = entries
        .into_iter()
        .filter_map(|entry| serde_json::from_value::<VisualDescription>(entry).ok())
        .filter(VisualDescription::is_complete)
        .collect();

    if descriptions.len() < total {
        tracing::warn!(
            dropped = total - descriptions.len(),
            "incomplete visual description records dropped"
        );
    }
    if descriptions.is_empty() {
        return Err(PipelineError::validation(
            "no complete visual description records in response",
        ));
    }
    Ok(descriptions)
}

/// Export descriptions as CSV with the record field names as header
pub fn descriptions_to_csv(descriptions: &[VisualDescription]) -> anyhow::Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for description in descriptions {
        writer
            .serialize(description)
            .context("failed to write visual description row")?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("failed to flush CSV writer: {}", e))?;
    String::from_utf8(bytes).context("CSV output was not UTF-8")
}

pub struct VisualInput {
    topic: Topic,
    request: TextRequest,
}

pub struct VisualExecutor {
    text: Option<Arc<dyn TextGenerator>>,
    image: Option<Arc<dyn ImageGenerator>>,
    prompts: Arc<PromptSet>,
    text_params: ModelParams,
    image_params: ImageParams,
    hints: VisualHints,
}

impl VisualExecutor {
    pub fn new(
        text: Option<Arc<dyn TextGenerator>>,
        image: Option<Arc<dyn ImageGenerator>>,
        prompts: Arc<PromptSet>,
        text_params: ModelParams,
        image_params: ImageParams,
        hints: VisualHints,
    ) -> Self {
        Self {
            text,
            image,
            prompts,
            text_params,
            image_params,
            hints,
        }
    }

    fn image_prompt(topic: &Topic, description: &VisualDescription) -> String {
        format!(
            "{}. {} Audience: {}. Style cues: {}.",
            description.image_name, topic.visual_brief, description.target_audience, description.keywords
        )
    }

    /// Render the first description; any failure becomes a placeholder
    async fn render_image(&self, topic: &Topic, description: &VisualDescription) -> ImageAsset {
        let Some(image) = self.image.as_ref() else {
            return ImageAsset::placeholder("image generation is not configured");
        };

        let prompt = Self::image_prompt(topic, description);
        match image.generate(&prompt, &self.image_params).await {
            Ok(assets) => assets
                .into_iter()
                .next()
                .unwrap_or_else(|| ImageAsset::placeholder("no image was returned")),
            Err(e) => {
                tracing::warn!(provider = image.name(), error = %e, "image generation failed; using placeholder");
                ImageAsset::placeholder(e.to_string())
            }
        }
    }
}

#[async_trait]
impl StageExecutor for VisualExecutor {
    const STAGE: Stage = Stage::Visual;

    type Input = VisualInput;
    type Output = VisualOutput;

    fn provider(&self) -> &str {
        self.text.as_ref().map(|t| t.name()).unwrap_or("text")
    }

    fn prepare(&self, session: &Session) -> Result<VisualInput, PipelineError> {
        let topic = session.active_topic()?.clone();
        let instructions = self
            .prompts
            .render(PromptKind::Visual, &self.hints)
            .map_err(|e| PipelineError::validation(format!("{:#}", e)))?;

        let mut input = format!(
            "Title: {}\nVisual concept: {}",
            topic.title, topic.visual_brief
        );
        if let Some(scene) = self.hints.scene.as_deref().filter(|s| !s.trim().is_empty()) {
            input.push_str(&format!("\nScene: {}", scene.trim()));
        }
        if let Some(body) = self
            .hints
            .body_language
            .as_deref()
            .filter(|s| !s.trim().is_empty())
        {
            input.push_str(&format!("\nBody language: {}", body.trim()));
        }

        Ok(VisualInput {
            request: TextRequest {
                instructions,
                input,
                params: self.text_params.clone(),
            },
            topic,
        })
    }

    async fn invoke(&self, input: &VisualInput) -> Result<VisualOutput, PipelineError> {
        let text = configured(&self.text, "text")?;
        let response = text.generate(&input.request).await?;
        let descriptions = parse_descriptions(&response)?;
        let image = self.render_image(&input.topic, &descriptions[0]).await;
        Ok(VisualOutput {
            descriptions,
            image,
        })
    }
}
