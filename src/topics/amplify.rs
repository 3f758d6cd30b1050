//! Keyword amplification: ask the text collaborator for new topic ideas

use serde::Deserialize;
use std::sync::Arc;

use super::Topic;
use crate::api::{ModelParams, TextGenerator, TextRequest};
use crate::pipeline::{strip_code_fences, PipelineError};
use crate::prompts::{PromptKind, PromptSet};

/// Candidates produced by one amplify call
#[derive(Debug, Clone, PartialEq)]
pub struct AmplifyResult {
    pub candidates: Vec<Topic>,
    /// Entries in the response that failed validation
    pub rejected: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCandidate {
    title: Option<serde_json::Value>,
    content_brief: Option<serde_json::Value>,
    visual_brief: Option<serde_json::Value>,
}

fn non_blank(value: Option<&serde_json::Value>) -> Option<String> {
    value
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl RawCandidate {
    fn validate(self) -> Option<Topic> {
        Some(Topic {
            id: format!("amp-{}", uuid::Uuid::new_v4()),
            title: non_blank(self.title.as_ref())?,
            content_brief: non_blank(self.content_brief.as_ref())?,
            visual_brief: non_blank(self.visual_brief.as_ref())?,
        })
    }
}

pub struct TopicAmplifier {
    text: Arc<dyn TextGenerator>,
    prompts: Arc<PromptSet>,
    params: ModelParams,
    count: usize,
}

impl TopicAmplifier {
    pub fn new(
        text: Arc<dyn TextGenerator>,
        prompts: Arc<PromptSet>,
        params: ModelParams,
        count: usize,
    ) -> Self {
        Self {
            text,
            prompts,
            params,
            count,
        }
    }

    /// Request topic ideas for `keyword`. The caller decides whether to stage them.
    pub async fn amplify(&self, keyword: &str) -> Result<AmplifyResult, PipelineError> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Err(PipelineError::validation("keyword must not be empty"));
        }

        let instructions = self
            .prompts
            .render(
                PromptKind::Amplify,
                &serde_json::json!({ "count": self.count }),
            )
            .map_err(|e| PipelineError::validation(format!("{:#}", e)))?;

        let request = TextRequest {
            instructions,
            input: keyword.to_string(),
            params: self.params.clone(),
        };

        tracing::info!(keyword, provider = self.text.name(), "amplifying keyword");
        let response = self.text.generate(&request).await?;
        let result = parse_candidates(&response)?;

        if result.rejected > 0 {
            tracing::warn!(
                rejected = result.rejected,
                accepted = result.candidates.len(),
                "some topic candidates failed validation"
            );
        }
        Ok(result)
    }
}

/// Validate an amplify response into candidates
pub fn parse_candidates(response: &str) -> Result<AmplifyResult, PipelineError> {
    let entries: Vec<serde_json::Value> = serde_json::from_str(strip_code_fences(response))
        .map_err(|e| {
            PipelineError::validation(format!("topic ideas were not a JSON array: {}", e))
        })?;

    let total = entries.len();
    let candidates: Vec<Topic> = entries
        .into_iter()
        .filter_map(|entry| serde_json::from_value::<RawCandidate>(entry).ok())
        .filter_map(RawCandidate::validate)
        .collect();

    Ok(AmplifyResult {
        rejected: total - candidates.len(),
        candidates,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Canned {
        reply: String,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TextGenerator for Canned {
        fn name(&self) -> &str {
            "canned"
        }

        async fn generate(&self, _request: &TextRequest) -> Result<String, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.reply.clone())
        }
    }

    fn amplifier(reply: &str) -> (TopicAmplifier, Arc<Canned>) {
        let text = Arc::new(Canned {
            reply: reply.to_string(),
            calls: AtomicUsize::new(0),
        });
        let amplifier = TopicAmplifier::new(
            text.clone(),
            Arc::new(PromptSet::builtin().unwrap()),
            ModelParams {
                model: "test".to_string(),
                temperature: None,
                max_tokens: None,
            },
            3,
        );
        (amplifier, text)
    }

    #[test]
    fn test_parse_rejects_invalid_entries() {
        let response = r#"```json
[
  {"title": "Edge caching", "contentBrief": "CDN basics", "visualBrief": "Globe"},
  {"title": "", "contentBrief": "blank title", "visualBrief": "x"},
  {"title": "No visual", "contentBrief": "b"},
  {"title": 42, "contentBrief": "b", "visualBrief": "v"},
  "not an object"
]
```"#;
        let result = parse_candidates(response).unwrap();
        assert_eq!(result.candidates.len(), 1);
        assert_eq!(result.rejected, 4);
        assert!(result.candidates[0].id.starts_with("amp-"));
        assert_eq!(result.candidates[0].title, "Edge caching");
    }

    #[test]
    fn test_parse_non_array_is_validation() {
        assert!(matches!(
            parse_candidates("sorry, I can't help"),
            Err(PipelineError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_keyword_makes_no_call() {
        let (amplifier, text) = amplifier("[]");
        let err = amplifier.amplify("   ").await.unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
        assert_eq!(text.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_amplify_returns_candidates() {
        let (amplifier, text) = amplifier(
            r#"[{"title":"A","contentBrief":"B","visualBrief":"C"},{"title":"D","contentBrief":"E","visualBrief":"F"}]"#,
        );
        let result = amplifier.amplify("observability").await.unwrap();
        assert_eq!(result.candidates.len(), 2);
        assert_eq!(result.rejected, 0);
        assert_ne!(result.candidates[0].id, result.candidates[1].id);
        assert_eq!(text.calls.load(Ordering::SeqCst), 1);
    }
}
