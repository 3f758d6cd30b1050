//! Drives the whole pipeline against in-memory collaborators

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

use marketflow::api::{
    ApiError, DocumentStore, ImageAsset, ImageGenerator, ImageParams, SpreadsheetAppend,
    TextGenerator, TextRequest,
};
use marketflow::config::Config;
use marketflow::pipeline::{
    document_id_for, Collaborators, Pipeline, PipelineError, StageOutcome, VisualHints,
};
use marketflow::prompts::PromptSet;
use marketflow::session::{Confirmation, StageOutput};
use marketflow::workflow::Stage;

const TOPICS_CSV: &str = "id,title,contentBrief,visualBrief\n\
t1,Rust for marketers,Why Rust matters,Crab at a desk\n\
t2,Async in practice,Tokio basics,Threads as rivers\n";

const BLOG: &str = "# Rust for marketers\n\n## Why now\n\nFast and safe.\n";

const SEO: &str = r#"{"metaTitle":"Rust for marketers","metaDescription":"Fast, safe software for campaigns","keywords":["rust","content marketing"]}"#;

const VISUAL: &str = r#"[{"Image Name":"crab-desk","Caption Plan":"Crab typing","Target Audience":"Marketers","Keywords":"rust, crab","Platform":"LinkedIn"}]"#;

const SOCIAL: &str = "[LINKEDIN] Long post\n[TWITTER] Short post\n[INSTAGRAM] Visual post\n[FACEBOOK] Friendly post\n";

/// Stage the prompt was rendered for, recognised from its opening line
fn stage_of(request: &TextRequest) -> Stage {
    let instructions = request.instructions.as_str();
    if instructions.contains("content marketer") {
        Stage::Blog
    } else if instructions.contains("SEO specialist") {
        Stage::Seo
    } else if instructions.contains("art director") {
        Stage::Visual
    } else {
        Stage::Social
    }
}

/// Canned text per stage, with optional failures and a gate that holds a
/// stage's call open until the test releases it
#[derive(Default)]
struct ScriptedText {
    failing: Mutex<HashSet<Stage>>,
    gated: Option<(Stage, Arc<Notify>, Arc<Notify>)>,
}

impl ScriptedText {
    fn failing(stage: Stage) -> Self {
        let text = Self::default();
        text.failing.lock().unwrap().insert(stage);
        text
    }

    /// Returns (text, entered, release)
    fn gated(stage: Stage) -> (Self, Arc<Notify>, Arc<Notify>) {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let text = Self {
            gated: Some((stage, entered.clone(), release.clone())),
            ..Self::default()
        };
        (text, entered, release)
    }

    fn recover(&self, stage: Stage) {
        self.failing.lock().unwrap().remove(&stage);
    }
}

#[async_trait]
impl TextGenerator for ScriptedText {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: &TextRequest) -> Result<String, ApiError> {
        let stage = stage_of(request);

        if let Some((gated, entered, release)) = &self.gated {
            if *gated == stage {
                entered.notify_one();
                release.notified().await;
            }
        }

        if self.failing.lock().unwrap().contains(&stage) {
            return Err(ApiError::http("scripted", 500, "unavailable"));
        }

        Ok(match stage {
            Stage::Blog => BLOG,
            Stage::Seo => SEO,
            Stage::Visual => VISUAL,
            _ => SOCIAL,
        }
        .to_string())
    }
}

struct StaticImage;

#[async_trait]
impl ImageGenerator for StaticImage {
    fn name(&self) -> &str {
        "static-image"
    }

    async fn generate(&self, _prompt: &str, _params: &ImageParams) -> Result<Vec<ImageAsset>, ApiError> {
        Ok(vec![ImageAsset::Remote {
            url: "https://images.example/crab.png".to_string(),
        }])
    }
}

/// Keeps documents by `_id`, replacing on repeat like `createOrReplace`
#[derive(Default)]
struct MemoryStore {
    documents: Mutex<Vec<serde_json::Value>>,
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn name(&self) -> &str {
        "memory-cms"
    }

    async fn create(&self, document: &serde_json::Value) -> Result<String, ApiError> {
        let id = document["_id"].as_str().unwrap_or_default().to_string();
        let mut documents = self.documents.lock().unwrap();
        documents.retain(|d| d["_id"] != document["_id"]);
        documents.push(document.clone());
        Ok(id)
    }
}

#[derive(Default)]
struct RecordingSheet {
    rows: Mutex<Vec<Vec<String>>>,
    broken: bool,
    delay: Option<Duration>,
}

#[async_trait]
impl SpreadsheetAppend for RecordingSheet {
    fn name(&self) -> &str {
        "recording-sheet"
    }

    async fn append(&self, rows: &[Vec<String>]) -> Result<(), ApiError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.broken {
            return Err(ApiError::network("recording-sheet", "connection reset"));
        }
        self.rows.lock().unwrap().extend_from_slice(rows);
        Ok(())
    }
}

struct Harness {
    pipeline: Pipeline,
    store: Arc<MemoryStore>,
    calendar: Arc<RecordingSheet>,
}

async fn harness_with(text: Arc<ScriptedText>, calendar: RecordingSheet) -> Harness {
    harness_configured(text, calendar, Config::default()).await
}

async fn harness_configured(
    text: Arc<ScriptedText>,
    calendar: RecordingSheet,
    config: Config,
) -> Harness {
    let store = Arc::new(MemoryStore::default());
    let calendar = Arc::new(calendar);
    let collaborators = Collaborators {
        text: Some(text),
        image: Some(Arc::new(StaticImage)),
        documents: Some(store.clone()),
        calendar: Some(calendar.clone()),
        topic_sheet: None,
    };
    let pipeline = Pipeline::new(
        Arc::new(config),
        Arc::new(PromptSet::builtin().unwrap()),
        collaborators,
    );

    {
        let mut session = pipeline.session().lock().await;
        assert_eq!(
            session
                .import_topics(TOPICS_CSV, Confirmation::Confirmed)
                .loaded(),
            2
        );
        session.select_topic("t1", Confirmation::Confirmed).unwrap();
    }

    Harness {
        pipeline,
        store,
        calendar,
    }
}

async fn harness() -> Harness {
    harness_with(Arc::new(ScriptedText::default()), RecordingSheet::default()).await
}

async fn run_through(pipeline: &Pipeline, last: Stage) {
    for stage in Stage::ALL
        .into_iter()
        .filter(|s| *s != Stage::Topic && s.index() <= last.index())
    {
        let outcome = pipeline
            .run_stage(stage, VisualHints::default())
            .await
            .unwrap();
        assert!(outcome.is_completed(), "{stage} did not complete");
    }
}

#[tokio::test]
async fn test_full_pipeline_publishes_document() {
    let h = harness().await;
    run_through(&h.pipeline, Stage::Cms).await;

    let session = h.pipeline.session().lock().await;
    assert!(session.workflow().is_complete(Stage::Cms));
    assert!(session.is_consistent());

    let seo = session.seo().unwrap();
    assert_eq!(seo.meta_title, "Rust for marketers");
    assert_eq!(seo.keywords, vec!["rust", "content marketing"]);
    assert_eq!(session.social().unwrap().twitter, "Short post");
    assert!(!session.visual().unwrap().image.is_placeholder());

    let receipt = session.publish().unwrap();
    assert_eq!(receipt.document_id, document_id_for("t1"));

    let documents = h.store.documents.lock().unwrap();
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0]["title"], "Rust for marketers");
    assert_eq!(documents[0]["mainImage"]["url"], "https://images.example/crab.png");

    let rows = h.calendar.rows.lock().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][1], "t1");
    assert_eq!(rows[0][3], receipt.document_id);
}

#[tokio::test]
async fn test_stage_before_prerequisite_is_rejected() {
    let h = harness().await;

    let err = h
        .pipeline
        .run_stage(Stage::Social, VisualHints::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::PrerequisiteNotMet {
            stage: Stage::Social,
            requires: Stage::Visual,
        }
    ));
}

#[tokio::test]
async fn test_collaborator_failure_falls_back_without_committing() {
    let text = Arc::new(ScriptedText::failing(Stage::Seo));
    let h = harness_with(text.clone(), RecordingSheet::default()).await;
    run_through(&h.pipeline, Stage::Blog).await;

    let outcome = h
        .pipeline
        .run_stage(Stage::Seo, VisualHints::default())
        .await
        .unwrap();
    match &outcome {
        StageOutcome::Fallback {
            placeholder: StageOutput::Seo(seo),
            error,
        } => {
            assert!(seo.meta_description.starts_with("[placeholder]"));
            assert!(error.is_collaborator());
        }
        other => panic!("expected SEO fallback, got {other:?}"),
    }

    {
        let session = h.pipeline.session().lock().await;
        assert!(session.seo().is_none());
        assert!(!session.workflow().is_complete(Stage::Seo));
        assert!(!session.is_loading(Stage::Seo));
        assert!(session.blog().is_some());
        assert!(session.is_consistent());
    }

    // Retry succeeds once the collaborator recovers
    text.recover(Stage::Seo);
    let retry = h
        .pipeline
        .run_stage(Stage::Seo, VisualHints::default())
        .await
        .unwrap();
    assert!(retry.is_completed());
}

#[tokio::test]
async fn test_publish_failure_has_no_fallback() {
    let store_less = Collaborators {
        text: Some(Arc::new(ScriptedText::default())),
        image: None,
        documents: None,
        calendar: None,
        topic_sheet: None,
    };
    let pipeline = Pipeline::new(
        Arc::new(Config::default()),
        Arc::new(PromptSet::builtin().unwrap()),
        store_less,
    );
    {
        let mut session = pipeline.session().lock().await;
        session.import_topics(TOPICS_CSV, Confirmation::Confirmed);
        session.select_topic("t1", Confirmation::Confirmed).unwrap();
    }
    run_through(&pipeline, Stage::Social).await;

    // No image collaborator: visuals still complete with a placeholder image
    assert!(pipeline
        .session()
        .lock()
        .await
        .visual()
        .unwrap()
        .image
        .is_placeholder());

    let err = pipeline
        .run_stage(Stage::Cms, VisualHints::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Collaborator(ApiError::NotConfigured { .. })
    ));

    let session = pipeline.session().lock().await;
    assert!(!session.workflow().is_complete(Stage::Cms));
    assert!(!session.is_loading(Stage::Cms));
}

#[tokio::test]
async fn test_calendar_failure_does_not_fail_publish() {
    let broken = RecordingSheet {
        broken: true,
        ..RecordingSheet::default()
    };
    let h = harness_with(Arc::new(ScriptedText::default()), broken).await;
    run_through(&h.pipeline, Stage::Cms).await;

    let session = h.pipeline.session().lock().await;
    assert!(session.workflow().is_complete(Stage::Cms));
    assert_eq!(h.store.documents.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_slow_calendar_does_not_time_out_publish() {
    let mut config = Config::default();
    config.pipeline.call_timeout_secs = 1;
    let slow = RecordingSheet {
        delay: Some(Duration::from_secs(5)),
        ..RecordingSheet::default()
    };
    let h = harness_configured(Arc::new(ScriptedText::default()), slow, config).await;
    run_through(&h.pipeline, Stage::Cms).await;

    let session = h.pipeline.session().lock().await;
    assert!(session.workflow().is_complete(Stage::Cms));
    assert!(session.publish().is_some());
    assert_eq!(h.store.documents.lock().unwrap().len(), 1);
    assert!(h.calendar.rows.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_republish_replaces_document() {
    let h = harness().await;
    run_through(&h.pipeline, Stage::Cms).await;

    let reset = h
        .pipeline
        .session()
        .lock()
        .await
        .reset(Stage::Cms, Confirmation::Confirmed)
        .unwrap();
    assert!(matches!(
        reset,
        marketflow::session::ResetOutcome::Reset { .. }
    ));

    let again = h
        .pipeline
        .run_stage(Stage::Cms, VisualHints::default())
        .await
        .unwrap();
    assert!(again.is_completed());

    let documents = h.store.documents.lock().unwrap();
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0]["_id"], json!(document_id_for("t1")));
}

#[tokio::test]
async fn test_completed_stage_must_be_reset_before_rerun() {
    let h = harness().await;
    run_through(&h.pipeline, Stage::Blog).await;

    let err = h
        .pipeline
        .run_stage(Stage::Blog, VisualHints::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::AlreadyComplete(Stage::Blog)));
}

#[tokio::test]
async fn test_second_request_while_in_flight_is_rejected() {
    let (text, entered, release) = ScriptedText::gated(Stage::Blog);
    let h = harness_with(Arc::new(text), RecordingSheet::default()).await;

    let pipeline = h.pipeline.clone();
    let first =
        tokio::spawn(async move { pipeline.run_stage(Stage::Blog, VisualHints::default()).await });
    entered.notified().await;

    let err = h
        .pipeline
        .run_stage(Stage::Blog, VisualHints::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::AlreadyInFlight(Stage::Blog)));

    release.notify_one();
    let outcome = first.await.unwrap().unwrap();
    assert!(outcome.is_completed());
}

#[tokio::test]
async fn test_abandoned_request_frees_stage_for_retry() {
    let (text, entered, release) = ScriptedText::gated(Stage::Blog);
    let h = harness_with(Arc::new(text), RecordingSheet::default()).await;

    let abandoned = tokio::time::timeout(
        Duration::from_millis(50),
        h.pipeline.run_stage(Stage::Blog, VisualHints::default()),
    )
    .await;
    assert!(abandoned.is_err());
    entered.notified().await;

    {
        let session = h.pipeline.session().lock().await;
        assert!(!session.is_loading(Stage::Blog));
        assert!(session.blog().is_none());
        assert!(session.is_consistent());
    }

    release.notify_one();
    let retry = h
        .pipeline
        .run_stage(Stage::Blog, VisualHints::default())
        .await
        .unwrap();
    assert!(retry.is_completed());
}

#[tokio::test]
async fn test_response_after_topic_switch_is_discarded() {
    let (text, entered, release) = ScriptedText::gated(Stage::Blog);
    let h = harness_with(Arc::new(text), RecordingSheet::default()).await;

    let pipeline = h.pipeline.clone();
    let pending =
        tokio::spawn(async move { pipeline.run_stage(Stage::Blog, VisualHints::default()).await });
    entered.notified().await;

    h.pipeline
        .session()
        .lock()
        .await
        .select_topic("t2", Confirmation::Confirmed)
        .unwrap();
    release.notify_one();

    let err = pending.await.unwrap().unwrap_err();
    assert!(matches!(err, PipelineError::Stale(Stage::Blog)));

    let session = h.pipeline.session().lock().await;
    assert_eq!(session.topics().active_id(), Some("t2"));
    assert!(session.blog().is_none());
    assert!(!session.workflow().is_complete(Stage::Blog));
    assert!(!session.is_loading(Stage::Blog));
    assert!(session.is_consistent());
}

#[tokio::test]
async fn test_reset_cascades_downstream() {
    let h = harness().await;
    run_through(&h.pipeline, Stage::Social).await;

    let mut session = h.pipeline.session().lock().await;
    let outcome = session.reset(Stage::Seo, Confirmation::Unconfirmed).unwrap();
    assert!(matches!(
        outcome,
        marketflow::session::ResetOutcome::NeedsConfirmation { .. }
    ));
    assert!(session.seo().is_some());

    session.reset(Stage::Seo, Confirmation::Confirmed).unwrap();
    assert!(session.blog().is_some());
    assert!(session.seo().is_none());
    assert!(session.visual().is_none());
    assert!(session.social().is_none());
    assert!(session.workflow().is_complete(Stage::Blog));
    assert!(!session.workflow().is_complete(Stage::Seo));
    assert!(session.is_consistent());
}
