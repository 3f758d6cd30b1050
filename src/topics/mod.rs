//! Topic store: the list of topics an operator can run through the pipeline.

mod amplify;
pub mod csv;

pub use amplify::{AmplifyResult, TopicAmplifier};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::pipeline::PipelineError;

/// A title / brief / visual-concept triple
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    pub id: String,
    pub title: String,
    pub content_brief: String,
    pub visual_brief: String,
}

impl Topic {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        content_brief: impl Into<String>,
        visual_brief: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            content_brief: content_brief.into(),
            visual_brief: visual_brief.into(),
        }
    }

    /// Row layout shared by CSV export and spreadsheet append
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.title.clone(),
            self.content_brief.clone(),
            self.visual_brief.clone(),
        ]
    }
}

/// Loaded topics, the active selection, and amplified candidates awaiting acceptance
#[derive(Debug, Clone, Default)]
pub struct TopicStore {
    topics: Vec<Topic>,
    active: Option<String>,
    candidates: Vec<Topic>,
}

impl TopicStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the topic list. Returns `true` if the active topic was
    /// dropped because it is no longer in the list.
    pub fn replace(&mut self, topics: Vec<Topic>) -> bool {
        self.topics = topics;
        self.retain_active()
    }

    fn retain_active(&mut self) -> bool {
        let still_present = self
            .active
            .as_deref()
            .map(|id| self.topics.iter().any(|t| t.id == id))
            .unwrap_or(true);
        if !still_present {
            self.active = None;
        }
        !still_present
    }

    pub fn topics(&self) -> &[Topic] {
        &self.topics
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Topic> {
        self.topics.iter().find(|t| t.id == id)
    }

    pub fn active(&self) -> Option<&Topic> {
        self.active.as_deref().and_then(|id| self.get(id))
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// Point the active selection at `id`. Returns whether the selection changed.
    pub(crate) fn set_active(&mut self, id: &str) -> Result<bool, PipelineError> {
        if self.get(id).is_none() {
            return Err(PipelineError::UnknownTopic(id.to_string()));
        }
        if self.active.as_deref() == Some(id) {
            return Ok(false);
        }
        self.active = Some(id.to_string());
        Ok(true)
    }

    /// Hold amplified candidates until the operator accepts them. A new
    /// batch replaces whatever was still pending.
    pub fn stage_candidates(&mut self, candidates: Vec<Topic>) {
        self.candidates = candidates;
    }

    pub fn candidates(&self) -> &[Topic] {
        &self.candidates
    }

    /// Move the named candidates into the topic list.
    ///
    /// Unknown ids are ignored. Returns the topics that were added.
    pub fn accept(&mut self, candidate_ids: &[String]) -> Vec<Topic> {
        let (accepted, remaining): (Vec<Topic>, Vec<Topic>) = std::mem::take(&mut self.candidates)
            .into_iter()
            .partition(|c| candidate_ids.contains(&c.id));
        self.candidates = remaining;

        let mut added = Vec::new();
        for topic in accepted {
            if self.get(&topic.id).is_some() {
                tracing::warn!(id = %topic.id, "candidate id already in topic list; skipped");
                continue;
            }
            self.topics.push(topic.clone());
            added.push(topic);
        }
        added
    }

    /// Drop candidates without adding them
    pub fn discard_candidates(&mut self) {
        self.candidates.clear();
    }
}
