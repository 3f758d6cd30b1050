use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use utoipa::ToSchema;

use super::{
    configured, BlogDocument, PipelineError, SeoData, SocialPosts, StageExecutor, VisualOutput,
};
use crate::api::{DocumentStore, ImageAsset, SpreadsheetAppend};
use crate::session::Session;
use crate::topics::Topic;
use crate::workflow::Stage;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PublishReceipt {
    pub document_id: String,
    pub published_at: DateTime<Utc>,
}

/// Stable CMS document id for a topic, so a retried publish replaces the
/// earlier document instead of creating a second one
pub fn document_id_for(topic_id: &str) -> String {
    let digest = Sha256::digest(topic_id.as_bytes());
    let hex: String = digest.iter().take(12).map(|b| format!("{:02x}", b)).collect();
    format!("marketflow-{}", hex)
}

pub struct PublishInput {
    topic: Topic,
    document: serde_json::Value,
}

pub struct PublishExecutor {
    documents: Option<Arc<dyn DocumentStore>>,
    calendar: Option<Arc<dyn SpreadsheetAppend>>,
    document_type: String,
}

impl PublishExecutor {
    pub fn new(
        documents: Option<Arc<dyn DocumentStore>>,
        calendar: Option<Arc<dyn SpreadsheetAppend>>,
        document_type: impl Into<String>,
    ) -> Self {
        Self {
            documents,
            calendar,
            document_type: document_type.into(),
        }
    }

    fn build_document(
        &self,
        topic: &Topic,
        blog: &BlogDocument,
        seo: &SeoData,
        visual: &VisualOutput,
        social: &SocialPosts,
    ) -> serde_json::Value {
        let main_image = match &visual.image {
            ImageAsset::Placeholder { .. } => serde_json::Value::Null,
            asset => serde_json::to_value(asset).unwrap_or(serde_json::Value::Null),
        };

        serde_json::json!({
            "_id": document_id_for(&topic.id),
            "_type": self.document_type,
            "title": topic.title,
            "topicId": topic.id,
            "body": blog.blocks,
            "seo": {
                "metaTitle": seo.meta_title,
                "metaDescription": seo.meta_description,
                "keywords": seo.keywords,
            },
            "visuals": visual.descriptions,
            "mainImage": main_image,
            "social": social,
        })
    }

    /// Record the publication in the content calendar. Failures are logged only.
    async fn append_calendar_row(&self, topic: &Topic, receipt: &PublishReceipt) {
        let Some(calendar) = self.calendar.as_ref() else {
            return;
        };
        let row = vec![
            receipt.published_at.to_rfc3339(),
            topic.id.clone(),
            topic.title.clone(),
            receipt.document_id.clone(),
        ];
        if let Err(e) = calendar.append(&[row]).await {
            tracing::warn!(provider = calendar.name(), error = %e, "content calendar update failed");
        }
    }
}

#[async_trait]
impl StageExecutor for PublishExecutor {
    const STAGE: Stage = Stage::Cms;

    type Input = PublishInput;
    type Output = PublishReceipt;

    fn provider(&self) -> &str {
        self.documents.as_ref().map(|d| d.name()).unwrap_or("cms")
    }

    fn prepare(&self, session: &Session) -> Result<PublishInput, PipelineError> {
        let topic = session.active_topic()?.clone();
        let missing = |what: &str| PipelineError::validation(format!("no {} to publish", what));
        let blog = session.blog().ok_or_else(|| missing("blog post"))?;
        let seo = session.seo().ok_or_else(|| missing("SEO data"))?;
        let visual = session.visual().ok_or_else(|| missing("visuals"))?;
        let social = session.social().ok_or_else(|| missing("social posts"))?;

        let document = self.build_document(&topic, blog, seo, visual, social);
        Ok(PublishInput { topic, document })
    }

    async fn invoke(&self, input: &PublishInput) -> Result<PublishReceipt, PipelineError> {
        let documents = configured(&self.documents, "cms")?;
        let document_id = documents.create(&input.document).await?;

        let receipt = PublishReceipt {
            document_id,
            published_at: Utc::now(),
        };
        tracing::info!(topic = %input.topic.id, document = %receipt.document_id, "published");
        Ok(receipt)
    }

    async fn after_commit(&self, input: &PublishInput, receipt: &PublishReceipt) {
        self.append_calendar_row(&input.topic, receipt).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_id_is_deterministic() {
        let a = document_id_for("topic-1");
        assert_eq!(a, document_id_for("topic-1"));
        assert_ne!(a, document_id_for("topic-2"));
        assert!(a.starts_with("marketflow-"));
        assert_eq!(a.len(), "marketflow-".len() + 24);
    }

    #[test]
    fn test_document_shape() {
        let executor = PublishExecutor::new(None, None, "post");
        let topic = Topic::new("t1", "Rust", "brief", "visual");
        let blog = BlogDocument::from_markdown("# Rust\n\nBody");
        let seo = SeoData {
            meta_title: "Rust".to_string(),
            meta_description: "desc".to_string(),
            keywords: vec!["rust".to_string()],
            raw_excerpt: String::new(),
        };
        let visual = VisualOutput {
            descriptions: Vec::new(),
            image: ImageAsset::placeholder("none"),
        };

        let doc = executor.build_document(&topic, &blog, &seo, &visual, &SocialPosts::default());
        assert_eq!(doc["_id"], document_id_for("t1"));
        assert_eq!(doc["_type"], "post");
        assert_eq!(doc["body"].as_array().unwrap().len(), 2);
        assert_eq!(doc["seo"]["keywords"][0], "rust");
        assert!(doc["mainImage"].is_null());
    }
}
