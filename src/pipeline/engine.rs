//! The pipeline as a whole: shared session, collaborators and configuration

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use super::{
    run, BlogDocument, BlogExecutor, BlogProgress, PipelineError, PublishExecutor, SeoExecutor,
    SocialExecutor, StageOutcome, VisualExecutor, VisualHints,
};
use crate::api::providers::{
    GeminiImageGenerator, GoogleSheetsAppender, OpenAiTextGenerator, SanityDocumentStore,
};
use crate::api::{
    ApiError, DocumentStore, ImageGenerator, ImageParams, ModelParams, SpreadsheetAppend,
    TextGenerator,
};
use crate::config::Config;
use crate::prompts::PromptSet;
use crate::session::{Session, SharedSession, StageOutput};
use crate::topics::{AmplifyResult, TopicAmplifier};
use crate::workflow::Stage;

/// External services available to the stages. Absent collaborators make
/// their stages fail (or fall back) with `NotConfigured`.
#[derive(Clone, Default)]
pub struct Collaborators {
    pub text: Option<Arc<dyn TextGenerator>>,
    pub image: Option<Arc<dyn ImageGenerator>>,
    pub documents: Option<Arc<dyn DocumentStore>>,
    /// Content calendar rows written after publication
    pub calendar: Option<Arc<dyn SpreadsheetAppend>>,
    /// Destination for topic list exports
    pub topic_sheet: Option<Arc<dyn SpreadsheetAppend>>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("text", &self.text.as_ref().map(|c| c.name().to_string()))
            .field("image", &self.image.as_ref().map(|c| c.name().to_string()))
            .field("documents", &self.documents.as_ref().map(|c| c.name().to_string()))
            .field("calendar", &self.calendar.is_some())
            .field("topic_sheet", &self.topic_sheet.is_some())
            .finish()
    }
}

impl Collaborators {
    /// Build the HTTP adapters whose credentials are present in the environment
    pub fn from_config(config: &Config) -> Result<Self, ApiError> {
        let timeout = config.pipeline.call_timeout_secs;

        let text = OpenAiTextGenerator::from_env(timeout)?.map(|provider| {
            let provider = match config.ai.text_base_url.as_deref() {
                Some(url) => provider.with_base_url(url),
                None => provider,
            };
            Arc::new(provider) as Arc<dyn TextGenerator>
        });
        let image = GeminiImageGenerator::from_env(timeout)?
            .map(|provider| Arc::new(provider) as Arc<dyn ImageGenerator>);
        let documents =
            SanityDocumentStore::from_env(&config.cms.project_id, &config.cms.dataset, timeout)?
                .map(|provider| Arc::new(provider) as Arc<dyn DocumentStore>);
        let calendar = GoogleSheetsAppender::from_env(
            &config.sheets.spreadsheet_id,
            &config.sheets.calendar_range,
            timeout,
        )?
        .map(|provider| Arc::new(provider) as Arc<dyn SpreadsheetAppend>);
        let topic_sheet = GoogleSheetsAppender::from_env(
            &config.sheets.spreadsheet_id,
            &config.sheets.topics_range,
            timeout,
        )?
        .map(|provider| Arc::new(provider) as Arc<dyn SpreadsheetAppend>);

        let collaborators = Self {
            text,
            image,
            documents,
            calendar,
            topic_sheet,
        };
        tracing::debug!(?collaborators, "collaborators configured");
        Ok(collaborators)
    }
}

/// Entry point used by the CLI and the REST API
#[derive(Clone)]
pub struct Pipeline {
    session: SharedSession,
    collaborators: Collaborators,
    prompts: Arc<PromptSet>,
    config: Arc<Config>,
}

impl Pipeline {
    pub fn new(config: Arc<Config>, prompts: Arc<PromptSet>, collaborators: Collaborators) -> Self {
        Self {
            session: Session::shared(Session::new()),
            collaborators,
            prompts,
            config,
        }
    }

    pub fn session(&self) -> &SharedSession {
        &self.session
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn text_params(&self, max_tokens: Option<u32>) -> ModelParams {
        ModelParams {
            model: self.config.ai.text_model.clone(),
            temperature: Some(self.config.ai.temperature),
            max_tokens,
        }
    }

    fn call_timeout(&self) -> Option<Duration> {
        match self.config.pipeline.call_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn blog_executor(&self) -> BlogExecutor {
        BlogExecutor::new(
            self.collaborators.text.clone(),
            self.prompts.clone(),
            self.text_params(Some(self.config.ai.blog_max_tokens)),
        )
    }

    pub fn seo_executor(&self) -> SeoExecutor {
        SeoExecutor::new(
            self.collaborators.text.clone(),
            self.prompts.clone(),
            self.text_params(None),
            self.config.pipeline.seo_max_chars,
            self.config.pipeline.seo_max_keywords,
        )
    }

    pub fn visual_executor(&self, hints: VisualHints) -> VisualExecutor {
        VisualExecutor::new(
            self.collaborators.text.clone(),
            self.collaborators.image.clone(),
            self.prompts.clone(),
            self.text_params(None),
            ImageParams {
                model: self.config.ai.image_model.clone(),
                count: self.config.ai.image_count,
                aspect_ratio: self.config.ai.image_aspect_ratio.clone(),
            },
            hints,
        )
    }

    pub fn social_executor(&self) -> SocialExecutor {
        SocialExecutor::new(
            self.collaborators.text.clone(),
            self.prompts.clone(),
            self.text_params(None),
            self.config.pipeline.social_input_chars,
        )
    }

    pub fn publish_executor(&self) -> PublishExecutor {
        PublishExecutor::new(
            self.collaborators.documents.clone(),
            self.collaborators.calendar.clone(),
            self.config.cms.document_type.clone(),
        )
    }

    /// Run any stage after `topic`. `hints` only affect the visual stage.
    pub async fn run_stage(
        &self,
        stage: Stage,
        hints: VisualHints,
    ) -> Result<StageOutcome<StageOutput>, PipelineError> {
        let timeout = self.call_timeout();
        match stage {
            Stage::Topic => Err(PipelineError::validation(
                "the topic stage completes when a topic is selected",
            )),
            Stage::Blog => Ok(run(&self.session, &self.blog_executor(), timeout)
                .await?
                .map(StageOutput::Blog)),
            Stage::Seo => Ok(run(&self.session, &self.seo_executor(), timeout)
                .await?
                .map(StageOutput::Seo)),
            Stage::Visual => Ok(run(&self.session, &self.visual_executor(hints), timeout)
                .await?
                .map(StageOutput::Visual)),
            Stage::Social => Ok(run(&self.session, &self.social_executor(), timeout)
                .await?
                .map(StageOutput::Social)),
            Stage::Cms => Ok(run(&self.session, &self.publish_executor(), timeout)
                .await?
                .map(StageOutput::Publish)),
        }
    }

    /// Blog stage with partial documents published on `progress`
    pub async fn run_blog_streaming(
        &self,
        progress: watch::Sender<BlogProgress>,
    ) -> Result<StageOutcome<BlogDocument>, PipelineError> {
        let blog = self.blog_executor();
        run(&self.session, &blog.streaming(progress), self.call_timeout()).await
    }

    /// Ask for topic ideas and hold them as candidates until accepted
    pub async fn amplify(&self, keyword: &str) -> Result<AmplifyResult, PipelineError> {
        let text = super::configured(&self.collaborators.text, "text")?.clone();
        let amplifier = TopicAmplifier::new(
            text,
            self.prompts.clone(),
            self.text_params(None),
            self.config.pipeline.amplify_count,
        );
        let result = amplifier.amplify(keyword).await?;

        self.session
            .lock()
            .await
            .topics_mut()
            .stage_candidates(result.candidates.clone());
        Ok(result)
    }

    /// Append the current topic list to the configured spreadsheet
    pub async fn export_topics_to_sheet(&self) -> Result<usize, PipelineError> {
        let sheet = super::configured(&self.collaborators.topic_sheet, "sheets")?;
        let rows: Vec<Vec<String>> = {
            let session = self.session.lock().await;
            session.topics().topics().iter().map(|t| t.to_row()).collect()
        };
        sheet.append(&rows).await?;
        tracing::info!(rows = rows.len(), "topics exported to spreadsheet");
        Ok(rows.len())
    }
}
