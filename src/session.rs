//! In-memory session: topics, workflow flags, stage content and in-flight calls.
//!
//! Every mutation that touches more than one of these goes through a single
//! `&mut Session` method so flags and content never disagree:
//!
//! - [`Session::select_topic`] starts a new generation with only `topic` complete
//! - [`Session::commit`] stores a stage's output and sets its flag together
//! - [`Session::reset`] clears a stage and everything after it

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use utoipa::ToSchema;

use crate::pipeline::{
    BlogDocument, PipelineError, PublishReceipt, SeoData, SocialPosts, VisualOutput,
};
use crate::topics::{csv, Topic, TopicStore};
use crate::workflow::{Stage, WorkflowState};

/// Session shared between concurrently running stages
pub type SharedSession = Arc<Mutex<Session>>;

/// Content produced by one stage
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum StageOutput {
    Blog(BlogDocument),
    Seo(SeoData),
    Visual(VisualOutput),
    Social(SocialPosts),
    Publish(PublishReceipt),
}

impl StageOutput {
    /// The stage whose slot this output belongs in
    pub fn stage(&self) -> Stage {
        match self {
            StageOutput::Blog(_) => Stage::Blog,
            StageOutput::Seo(_) => Stage::Seo,
            StageOutput::Visual(_) => Stage::Visual,
            StageOutput::Social(_) => Stage::Social,
            StageOutput::Publish(_) => Stage::Cms,
        }
    }
}

impl From<BlogDocument> for StageOutput {
    fn from(value: BlogDocument) -> Self {
        StageOutput::Blog(value)
    }
}

impl From<SeoData> for StageOutput {
    fn from(value: SeoData) -> Self {
        StageOutput::Seo(value)
    }
}

impl From<VisualOutput> for StageOutput {
    fn from(value: VisualOutput) -> Self {
        StageOutput::Visual(value)
    }
}

impl From<SocialPosts> for StageOutput {
    fn from(value: SocialPosts) -> Self {
        StageOutput::Social(value)
    }
}

impl From<PublishReceipt> for StageOutput {
    fn from(value: PublishReceipt) -> Self {
        StageOutput::Publish(value)
    }
}

/// Whether the caller has agreed to discard existing content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed,
    Unconfirmed,
}

impl From<bool> for Confirmation {
    fn from(confirmed: bool) -> Self {
        if confirmed {
            Confirmation::Confirmed
        } else {
            Confirmation::Unconfirmed
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum SelectOutcome {
    /// The topic became active and the pipeline restarted
    Selected { discarded: Vec<Stage> },
    /// The topic was already active; nothing changed
    Unchanged,
    /// Selecting would discard these stages' content; nothing changed
    NeedsConfirmation { discarding: Vec<Stage> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ResetOutcome {
    Reset { cleared: Vec<Stage> },
    NeedsConfirmation { discarding: Vec<Stage> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ImportOutcome {
    /// The list was replaced; `cleared` stages lost content because the
    /// active topic was removed or edited
    Imported { loaded: usize, cleared: Vec<Stage> },
    /// Importing would discard these stages' content; nothing changed
    NeedsConfirmation { discarding: Vec<Stage> },
}

impl ImportOutcome {
    /// Topics now in the list, or 0 when the import was held back
    pub fn loaded(&self) -> usize {
        match self {
            ImportOutcome::Imported { loaded, .. } => *loaded,
            ImportOutcome::NeedsConfirmation { .. } => 0,
        }
    }
}

/// Identifies one in-flight stage call.
///
/// A ticket stops being current when the topic changes or its stage is
/// reset; results carried by a stale ticket are discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTicket {
    stage: Stage,
    generation: u64,
    epoch: u64,
}

impl StageTicket {
    pub fn stage(&self) -> Stage {
        self.stage
    }
}

/// Serializable view of the session
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub active_topic: Option<Topic>,
    #[schema(value_type = Object)]
    pub workflow: WorkflowState,
    pub loading: Vec<Stage>,
    #[schema(value_type = Object)]
    pub content: BTreeMap<Stage, StageOutput>,
    pub candidates: Vec<Topic>,
    pub generation: u64,
}

#[derive(Debug, Default)]
pub struct Session {
    topics: TopicStore,
    workflow: WorkflowState,
    content: BTreeMap<Stage, StageOutput>,
    loading: [bool; Stage::ALL.len()],
    generation: u64,
    epochs: [u64; Stage::ALL.len()],
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(session: Session) -> SharedSession {
        Arc::new(Mutex::new(session))
    }

    pub fn topics(&self) -> &TopicStore {
        &self.topics
    }

    pub fn topics_mut(&mut self) -> &mut TopicStore {
        &mut self.topics
    }

    pub fn workflow(&self) -> &WorkflowState {
        &self.workflow
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn active_topic(&self) -> Result<&Topic, PipelineError> {
        self.topics.active().ok_or(PipelineError::NoActiveTopic)
    }

    pub fn is_loading(&self, stage: Stage) -> bool {
        self.loading[stage.index()]
    }

    pub fn content(&self, stage: Stage) -> Option<&StageOutput> {
        self.content.get(&stage)
    }

    pub fn blog(&self) -> Option<&BlogDocument> {
        match self.content.get(&Stage::Blog) {
            Some(StageOutput::Blog(doc)) => Some(doc),
            _ => None,
        }
    }

    pub fn seo(&self) -> Option<&SeoData> {
        match self.content.get(&Stage::Seo) {
            Some(StageOutput::Seo(seo)) => Some(seo),
            _ => None,
        }
    }

    pub fn visual(&self) -> Option<&VisualOutput> {
        match self.content.get(&Stage::Visual) {
            Some(StageOutput::Visual(visual)) => Some(visual),
            _ => None,
        }
    }

    pub fn social(&self) -> Option<&SocialPosts> {
        match self.content.get(&Stage::Social) {
            Some(StageOutput::Social(posts)) => Some(posts),
            _ => None,
        }
    }

    pub fn publish(&self) -> Option<&PublishReceipt> {
        match self.content.get(&Stage::Cms) {
            Some(StageOutput::Publish(receipt)) => Some(receipt),
            _ => None,
        }
    }

    /// Replace the topic list from CSV.
    ///
    /// If the active topic disappears the pipeline is cleared; if its fields
    /// changed the pipeline restarts from `blog`. Either way, content that
    /// would be lost needs confirmation first.
    pub fn import_topics(&mut self, raw: &str, confirmation: Confirmation) -> ImportOutcome {
        let topics = csv::parse_topics(raw);
        let invalidated = self
            .topics
            .active()
            .is_some_and(|active| topics.iter().find(|t| t.id == active.id) != Some(active));

        let discarding = if invalidated {
            self.content_from(Stage::Blog)
        } else {
            Vec::new()
        };
        if !discarding.is_empty() && confirmation == Confirmation::Unconfirmed {
            return ImportOutcome::NeedsConfirmation { discarding };
        }

        if self.topics.replace(topics) {
            tracing::info!("active topic no longer in list; pipeline cleared");
            self.restart(WorkflowState::default());
        } else if invalidated {
            tracing::info!("active topic edited; pipeline restarted from blog");
            self.restart(WorkflowState::for_selected_topic());
        }

        ImportOutcome::Imported {
            loaded: self.topics.topics().len(),
            cleared: discarding,
        }
    }

    /// Stages from `stage` onward that currently hold content
    fn content_from(&self, stage: Stage) -> Vec<Stage> {
        stage
            .downstream_of()
            .filter(|s| self.content.contains_key(s))
            .collect()
    }

    /// Make `topic_id` the active topic.
    ///
    /// A different topic restarts the pipeline with only `topic` complete.
    pub fn select_topic(
        &mut self,
        topic_id: &str,
        confirmation: Confirmation,
    ) -> Result<SelectOutcome, PipelineError> {
        if self.topics.get(topic_id).is_none() {
            return Err(PipelineError::UnknownTopic(topic_id.to_string()));
        }
        if self.topics.active_id() == Some(topic_id) {
            return Ok(SelectOutcome::Unchanged);
        }

        let discarding = self.content_from(Stage::Blog);
        if !discarding.is_empty() && confirmation == Confirmation::Unconfirmed {
            return Ok(SelectOutcome::NeedsConfirmation { discarding });
        }

        self.topics.set_active(topic_id)?;
        self.restart(WorkflowState::for_selected_topic());
        tracing::info!(topic = topic_id, generation = self.generation, "topic selected");
        Ok(SelectOutcome::Selected {
            discarded: discarding,
        })
    }

    fn restart(&mut self, workflow: WorkflowState) {
        self.generation += 1;
        self.workflow = workflow;
        self.content.clear();
        self.loading = [false; Stage::ALL.len()];
    }

    /// Clear `stage` and every later stage: flags, content and in-flight calls
    pub fn reset(
        &mut self,
        stage: Stage,
        confirmation: Confirmation,
    ) -> Result<ResetOutcome, PipelineError> {
        if stage == Stage::Topic {
            return Err(PipelineError::TopicResetNotAllowed);
        }

        let discarding = self.content_from(stage);
        if !discarding.is_empty() && confirmation == Confirmation::Unconfirmed {
            return Ok(ResetOutcome::NeedsConfirmation { discarding });
        }

        self.workflow.reset_from(stage);
        for s in stage.downstream_of() {
            self.content.remove(&s);
            self.loading[s.index()] = false;
            self.epochs[s.index()] += 1;
        }
        tracing::info!(%stage, cleared = ?discarding, "stages reset");
        Ok(ResetOutcome::Reset {
            cleared: discarding,
        })
    }

    /// Check that `stage` could start now, without changing anything
    pub fn ensure_runnable(&self, stage: Stage) -> Result<(), PipelineError> {
        if stage == Stage::Topic {
            return Err(PipelineError::validation(
                "the topic stage completes when a topic is selected",
            ));
        }
        self.active_topic()?;
        if let Some(requires) = stage.prerequisite() {
            if !self.workflow.is_complete(requires) {
                return Err(PipelineError::PrerequisiteNotMet { stage, requires });
            }
        }
        if self.is_loading(stage) {
            return Err(PipelineError::AlreadyInFlight(stage));
        }
        if self.workflow.is_complete(stage) {
            return Err(PipelineError::AlreadyComplete(stage));
        }
        Ok(())
    }

    /// Mark `stage` in flight and issue its ticket
    pub fn begin(&mut self, stage: Stage) -> Result<StageTicket, PipelineError> {
        self.ensure_runnable(stage)?;
        self.loading[stage.index()] = true;
        Ok(StageTicket {
            stage,
            generation: self.generation,
            epoch: self.epochs[stage.index()],
        })
    }

    fn is_current(&self, ticket: &StageTicket) -> bool {
        ticket.generation == self.generation && ticket.epoch == self.epochs[ticket.stage.index()]
    }

    /// Store a stage's output and mark it complete.
    ///
    /// A stale ticket is rejected without touching the current generation.
    pub fn commit(
        &mut self,
        ticket: &StageTicket,
        output: StageOutput,
    ) -> Result<(), PipelineError> {
        let stage = ticket.stage;
        if !self.is_current(ticket) {
            tracing::debug!(%stage, "discarding stale stage output");
            return Err(PipelineError::Stale(stage));
        }

        self.loading[stage.index()] = false;
        if output.stage() != stage {
            return Err(PipelineError::validation(format!(
                "output for '{}' cannot be stored as '{}'",
                output.stage(),
                stage
            )));
        }
        self.workflow.unlock(stage)?;
        self.content.insert(stage, output);
        Ok(())
    }

    /// Release a ticket without output. Returns `false` if the ticket was stale.
    pub fn abandon(&mut self, ticket: &StageTicket) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        self.loading[ticket.stage.index()] = false;
        true
    }

    /// Flags and content agree, and the flags respect the stage order
    pub fn is_consistent(&self) -> bool {
        let topic_ok = self.workflow.is_complete(Stage::Topic) == self.topics.active().is_some();
        let content_ok = Stage::ALL
            .into_iter()
            .skip(1)
            .all(|s| self.workflow.is_complete(s) == self.content.contains_key(&s));
        topic_ok && content_ok && self.workflow.check_invariant()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            active_topic: self.topics.active().cloned(),
            workflow: self.workflow,
            loading: Stage::ALL
                .into_iter()
                .filter(|s| self.is_loading(*s))
                .collect(),
            content: self.content.clone(),
            candidates: self.topics.candidates().to_vec(),
            generation: self.generation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ImageAsset;
    use chrono::Utc;
    use proptest::prelude::*;

    fn sample_output(stage: Stage) -> StageOutput {
        match stage {
            Stage::Topic | Stage::Blog => BlogDocument::from_markdown("# T\n\nBody").into(),
            Stage::Seo => SeoData {
                meta_title: "t".to_string(),
                meta_description: "d".to_string(),
                keywords: vec![],
                raw_excerpt: String::new(),
            }
            .into(),
            Stage::Visual => VisualOutput {
                descriptions: vec![],
                image: ImageAsset::placeholder("test"),
            }
            .into(),
            Stage::Social => SocialPosts::default().into(),
            Stage::Cms => PublishReceipt {
                document_id: "doc".to_string(),
                published_at: Utc::now(),
            }
            .into(),
        }
    }

    fn session_with_topics() -> Session {
        let mut session = Session::new();
        session.topics_mut().replace(vec![
            Topic::new("a", "Alpha", "brief", "visual"),
            Topic::new("b", "Beta", "brief", "visual"),
        ]);
        session
    }

    fn complete(session: &mut Session, stage: Stage) -> Result<(), PipelineError> {
        let ticket = session.begin(stage)?;
        session.commit(&ticket, sample_output(stage))
    }

    fn complete_through(session: &mut Session, last: Stage) {
        for stage in Stage::ALL.into_iter().skip(1) {
            if stage > last {
                break;
            }
            complete(session, stage).unwrap();
        }
    }

    #[test]
    fn test_select_initializes_workflow() {
        let mut session = session_with_topics();
        assert!(session.is_consistent());
        assert!(session.workflow().completed().is_empty());

        let outcome = session.select_topic("a", Confirmation::Unconfirmed).unwrap();
        assert_eq!(outcome, SelectOutcome::Selected { discarded: vec![] });
        assert_eq!(session.workflow().completed(), vec![Stage::Topic]);
        assert!(session.is_consistent());
    }

    #[test]
    fn test_reselect_same_topic_is_noop() {
        let mut session = session_with_topics();
        session.select_topic("a", Confirmation::Confirmed).unwrap();
        complete_through(&mut session, Stage::Seo);

        let generation = session.generation();
        let outcome = session.select_topic("a", Confirmation::Confirmed).unwrap();
        assert_eq!(outcome, SelectOutcome::Unchanged);
        assert_eq!(session.generation(), generation);
        assert!(session.seo().is_some());
    }

    #[test]
    fn test_switch_requires_confirmation_then_clears() {
        let mut session = session_with_topics();
        session.select_topic("a", Confirmation::Confirmed).unwrap();
        complete_through(&mut session, Stage::Visual);

        let outcome = session.select_topic("b", Confirmation::Unconfirmed).unwrap();
        assert_eq!(
            outcome,
            SelectOutcome::NeedsConfirmation {
                discarding: vec![Stage::Blog, Stage::Seo, Stage::Visual]
            }
        );
        assert_eq!(session.topics().active_id(), Some("a"));
        assert!(session.visual().is_some());

        session.select_topic("b", Confirmation::Confirmed).unwrap();
        assert_eq!(session.workflow().completed(), vec![Stage::Topic]);
        assert!(session.blog().is_none());
        assert!(session.is_consistent());
    }

    const TOPICS_CSV: &str = "id,title,contentBrief,visualBrief\n\
                              a,Alpha,brief,visual\n\
                              b,Beta,brief,visual\n";

    #[test]
    fn test_import_keeps_content_when_active_topic_unchanged() {
        let mut session = session_with_topics();
        session.select_topic("a", Confirmation::Confirmed).unwrap();
        complete_through(&mut session, Stage::Seo);

        let outcome = session.import_topics(
            &format!("{TOPICS_CSV}c,Gamma,brief,visual\n"),
            Confirmation::Unconfirmed,
        );
        assert_eq!(
            outcome,
            ImportOutcome::Imported {
                loaded: 3,
                cleared: vec![]
            }
        );
        assert!(session.seo().is_some());
    }

    #[test]
    fn test_import_editing_active_topic_restarts_from_blog() {
        let mut session = session_with_topics();
        session.select_topic("a", Confirmation::Confirmed).unwrap();
        complete_through(&mut session, Stage::Seo);
        let generation = session.generation();
        let edited = TOPICS_CSV.replace("a,Alpha,brief", "a,Alpha,a sharper brief");

        let outcome = session.import_topics(&edited, Confirmation::Unconfirmed);
        assert_eq!(
            outcome,
            ImportOutcome::NeedsConfirmation {
                discarding: vec![Stage::Blog, Stage::Seo]
            }
        );
        assert_eq!(session.active_topic().unwrap().content_brief, "brief");
        assert!(session.seo().is_some());

        let outcome = session.import_topics(&edited, Confirmation::Confirmed);
        assert_eq!(outcome.loaded(), 2);
        assert_eq!(session.topics().active_id(), Some("a"));
        assert_eq!(session.active_topic().unwrap().content_brief, "a sharper brief");
        assert_eq!(session.workflow().completed(), vec![Stage::Topic]);
        assert!(session.blog().is_none());
        assert!(session.generation() > generation);
        assert!(session.is_consistent());
    }

    #[test]
    fn test_import_dropping_active_topic_needs_confirmation() {
        let mut session = session_with_topics();
        session.select_topic("a", Confirmation::Confirmed).unwrap();
        complete_through(&mut session, Stage::Blog);
        let without_a = "id,title\nb,Beta\n";

        assert!(matches!(
            session.import_topics(without_a, Confirmation::Unconfirmed),
            ImportOutcome::NeedsConfirmation { .. }
        ));
        assert_eq!(session.topics().topics().len(), 2);

        let outcome = session.import_topics(without_a, Confirmation::Confirmed);
        assert_eq!(
            outcome,
            ImportOutcome::Imported {
                loaded: 1,
                cleared: vec![Stage::Blog]
            }
        );
        assert!(session.topics().active_id().is_none());
        assert!(session.workflow().completed().is_empty());
        assert!(session.is_consistent());
    }

    #[test]
    fn test_import_invalidates_in_flight_call() {
        let mut session = session_with_topics();
        session.select_topic("a", Confirmation::Confirmed).unwrap();
        let ticket = session.begin(Stage::Blog).unwrap();

        let edited = TOPICS_CSV.replace("a,Alpha", "a,Alpha v2");
        session.import_topics(&edited, Confirmation::Unconfirmed);

        assert!(!session.is_loading(Stage::Blog));
        assert!(session.commit(&ticket, sample_output(Stage::Blog)).is_err());
    }

    #[test]
    fn test_unknown_topic() {
        let mut session = session_with_topics();
        assert!(matches!(
            session.select_topic("zzz", Confirmation::Confirmed),
            Err(PipelineError::UnknownTopic(_))
        ));
    }

    #[test]
    fn test_reset_cascades_downstream_only() {
        let mut session = session_with_topics();
        session.select_topic("a", Confirmation::Confirmed).unwrap();
        complete_through(&mut session, Stage::Cms);

        let outcome = session.reset(Stage::Seo, Confirmation::Confirmed).unwrap();
        assert_eq!(
            outcome,
            ResetOutcome::Reset {
                cleared: vec![Stage::Seo, Stage::Visual, Stage::Social, Stage::Cms]
            }
        );
        assert_eq!(session.workflow().completed(), vec![Stage::Topic, Stage::Blog]);
        assert!(session.blog().is_some());
        assert!(session.publish().is_none());
        assert!(session.is_consistent());
    }

    #[test]
    fn test_reset_needs_confirmation_and_refuses_topic() {
        let mut session = session_with_topics();
        session.select_topic("a", Confirmation::Confirmed).unwrap();
        complete_through(&mut session, Stage::Blog);

        let outcome = session.reset(Stage::Blog, Confirmation::Unconfirmed).unwrap();
        assert_eq!(
            outcome,
            ResetOutcome::NeedsConfirmation {
                discarding: vec![Stage::Blog]
            }
        );
        assert!(session.blog().is_some());

        // Nothing to discard: no confirmation needed
        let outcome = session.reset(Stage::Seo, Confirmation::Unconfirmed).unwrap();
        assert_eq!(outcome, ResetOutcome::Reset { cleared: vec![] });

        assert!(matches!(
            session.reset(Stage::Topic, Confirmation::Confirmed),
            Err(PipelineError::TopicResetNotAllowed)
        ));
    }

    #[test]
    fn test_guards() {
        let mut session = session_with_topics();
        assert!(matches!(
            session.begin(Stage::Blog),
            Err(PipelineError::NoActiveTopic)
        ));

        session.select_topic("a", Confirmation::Confirmed).unwrap();
        assert!(matches!(
            session.begin(Stage::Seo),
            Err(PipelineError::PrerequisiteNotMet {
                stage: Stage::Seo,
                requires: Stage::Blog
            })
        ));

        let ticket = session.begin(Stage::Blog).unwrap();
        assert!(matches!(
            session.begin(Stage::Blog),
            Err(PipelineError::AlreadyInFlight(Stage::Blog))
        ));
        session.commit(&ticket, sample_output(Stage::Blog)).unwrap();
        assert!(matches!(
            session.begin(Stage::Blog),
            Err(PipelineError::AlreadyComplete(Stage::Blog))
        ));
    }

    #[test]
    fn test_stale_ticket_after_topic_switch() {
        let mut session = session_with_topics();
        session.select_topic("a", Confirmation::Confirmed).unwrap();
        let old = session.begin(Stage::Blog).unwrap();

        session.select_topic("b", Confirmation::Confirmed).unwrap();
        let current = session.begin(Stage::Blog).unwrap();

        assert!(matches!(
            session.commit(&old, sample_output(Stage::Blog)),
            Err(PipelineError::Stale(Stage::Blog))
        ));
        assert!(!session.abandon(&old));
        // The new generation's call is still in flight
        assert!(session.is_loading(Stage::Blog));
        assert!(session.blog().is_none());

        session.commit(&current, sample_output(Stage::Blog)).unwrap();
        assert!(session.is_consistent());
    }

    #[test]
    fn test_reset_invalidates_in_flight_call() {
        let mut session = session_with_topics();
        session.select_topic("a", Confirmation::Confirmed).unwrap();
        complete_through(&mut session, Stage::Blog);
        let seo = session.begin(Stage::Seo).unwrap();

        session.reset(Stage::Blog, Confirmation::Confirmed).unwrap();
        assert!(!session.is_loading(Stage::Seo));
        assert!(matches!(
            session.commit(&seo, sample_output(Stage::Seo)),
            Err(PipelineError::Stale(Stage::Seo))
        ));
        assert!(session.is_consistent());
    }

    #[test]
    fn test_mismatched_output_is_rejected() {
        let mut session = session_with_topics();
        session.select_topic("a", Confirmation::Confirmed).unwrap();
        let ticket = session.begin(Stage::Blog).unwrap();
        assert!(session
            .commit(&ticket, sample_output(Stage::Seo))
            .is_err());
        assert!(!session.is_loading(Stage::Blog));
        assert!(session.is_consistent());
    }

    #[test]
    fn test_snapshot_serializes() {
        let mut session = session_with_topics();
        session.select_topic("a", Confirmation::Confirmed).unwrap();
        complete_through(&mut session, Stage::Blog);

        let json = serde_json::to_value(session.snapshot()).unwrap();
        assert_eq!(json["activeTopic"]["id"], "a");
        assert_eq!(json["workflow"]["blog"], true);
        assert_eq!(json["workflow"]["seo"], false);
        assert_eq!(json["content"]["blog"]["kind"], "blog");
    }

    #[derive(Debug, Clone)]
    enum Op {
        Select(usize, bool),
        Reset(Stage, bool),
        Complete(Stage),
        BeginThenSwitch(Stage),
    }

    fn stage_strategy() -> impl Strategy<Value = Stage> {
        prop::sample::select(Stage::ALL.to_vec())
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0..2usize, any::<bool>()).prop_map(|(i, c)| Op::Select(i, c)),
            (stage_strategy(), any::<bool>()).prop_map(|(s, c)| Op::Reset(s, c)),
            stage_strategy().prop_map(Op::Complete),
            stage_strategy().prop_map(Op::BeginThenSwitch),
        ]
    }

    proptest! {
        #[test]
        fn prop_flags_stay_ordered_and_match_content(ops in prop::collection::vec(op_strategy(), 0..40)) {
            let mut session = session_with_topics();
            let ids = ["a", "b"];

            for op in ops {
                let before = *session.workflow();
                let generation = session.generation();
                let is_reset = matches!(op, Op::Reset(..));
                match op {
                    Op::Select(i, confirmed) => {
                        let _ = session.select_topic(ids[i], confirmed.into());
                    }
                    Op::Reset(stage, confirmed) => {
                        let _ = session.reset(stage, confirmed.into());
                    }
                    Op::Complete(stage) => {
                        // A stage only completes when its prerequisite was complete
                        if complete(&mut session, stage).is_ok() {
                            prop_assert!(before.is_unlocked(stage));
                        }
                    }
                    Op::BeginThenSwitch(stage) => {
                        if let Ok(ticket) = session.begin(stage) {
                            let other = if session.topics().active_id() == Some("a") { "b" } else { "a" };
                            session.select_topic(other, Confirmation::Confirmed).unwrap();
                            prop_assert!(session.commit(&ticket, sample_output(stage)).is_err());
                        }
                    }
                }

                prop_assert!(session.is_consistent());

                // Within one generation, flags only move backwards through a reset
                if session.generation() == generation && !is_reset {
                    for stage in Stage::ALL {
                        prop_assert!(!before.is_complete(stage) || session.workflow().is_complete(stage));
                    }
                }
            }
        }
    }
}
