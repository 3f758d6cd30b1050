//! Stage executors and the runner they share.
//!
//! Every stage follows the same contract, implemented once in [`run`]:
//!
//! 1. Under the session lock: check the prerequisite and single-flight guards,
//!    build the stage input, mark the stage loading and take a [`StageTicket`].
//! 2. Release the lock and call the collaborator (optionally under a timeout).
//! 3. Re-acquire the lock. Success commits content and flag together; failure
//!    clears loading and, for stages that have one, returns a placeholder
//!    that is never committed. Tickets from an older topic or reset are stale.

mod blog;
mod engine;
mod error;
mod publish;
mod seo;
mod social;
mod visual;

pub use blog::{BlogDocument, BlogExecutor, BlogProgress};
pub use engine::{Collaborators, Pipeline};
pub use error::PipelineError;
pub use publish::{document_id_for, PublishExecutor, PublishReceipt};
pub use seo::{parse_seo, SeoData, SeoExecutor};
pub use social::{parse_social, SocialPosts, SocialExecutor, SOCIAL_PLATFORMS};
pub use visual::{
    descriptions_to_csv, parse_descriptions, VisualDescription, VisualExecutor, VisualHints,
    VisualOutput,
};

use async_trait::async_trait;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::api::ApiError;
use crate::session::{SharedSession, Session, StageOutput, StageTicket};
use crate::workflow::Stage;

/// Appended to text that was cut short
pub const TRUNCATION_MARKER: &str = "…[truncated]";

/// Prefix on every placeholder shown in place of a failed stage
pub const PLACEHOLDER_LABEL: &str = "[placeholder]";

/// Result of running one stage
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageOutcome<T> {
    /// Output committed and the stage flag set
    Completed { output: T },
    /// The collaborator failed; `placeholder` is for display only and was not committed
    Fallback {
        placeholder: T,
        #[serde(serialize_with = "serialize_error")]
        error: PipelineError,
    },
}

fn serialize_error<S: serde::Serializer>(
    error: &PipelineError,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&error.to_string())
}

impl<T> StageOutcome<T> {
    pub fn is_completed(&self) -> bool {
        matches!(self, StageOutcome::Completed { .. })
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> StageOutcome<U> {
        match self {
            StageOutcome::Completed { output } => StageOutcome::Completed { output: f(output) },
            StageOutcome::Fallback { placeholder, error } => StageOutcome::Fallback {
                placeholder: f(placeholder),
                error,
            },
        }
    }
}

/// One pipeline stage: how to build its input from the session and how to
/// turn that input into output through a collaborator
#[async_trait]
pub trait StageExecutor: Send + Sync {
    const STAGE: Stage;

    type Input: Send + Sync;
    type Output: Clone + Send + Sync + Into<StageOutput>;

    /// Collaborator name, used for timeout errors and logs
    fn provider(&self) -> &str;

    /// Build the stage input. Runs under the session lock and must not block.
    fn prepare(&self, session: &Session) -> Result<Self::Input, PipelineError>;

    /// Call the collaborator and validate its response
    async fn invoke(&self, input: &Self::Input) -> Result<Self::Output, PipelineError>;

    /// Display-only stand-in used when the collaborator fails
    fn fallback(&self, _input: &Self::Input) -> Option<Self::Output> {
        None
    }

    /// Best-effort work after the output is committed. Runs outside the
    /// session lock; failures must be handled (logged) by the executor.
    async fn after_commit(&self, _input: &Self::Input, _output: &Self::Output) {}
}

/// Releases a ticket if the run is dropped while its call is pending
struct InFlight {
    session: SharedSession,
    ticket: Option<StageTicket>,
}

impl InFlight {
    fn new(session: &SharedSession, ticket: StageTicket) -> Self {
        Self {
            session: session.clone(),
            ticket: Some(ticket),
        }
    }

    /// The run reached the session again and settles the ticket itself
    fn disarm(&mut self) {
        self.ticket = None;
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let Some(ticket) = self.ticket.take() else {
            return;
        };
        let stage = ticket.stage();
        tracing::debug!(%stage, "stage request dropped before completion");

        if let Ok(mut session) = self.session.try_lock() {
            session.abandon(&ticket);
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let session = self.session.clone();
                handle.spawn(async move {
                    session.lock().await.abandon(&ticket);
                });
            }
            Err(_) => tracing::warn!(%stage, "no runtime to release dropped stage request"),
        }
    }
}

/// Run one stage against the shared session
pub async fn run<E: StageExecutor>(
    session: &SharedSession,
    executor: &E,
    timeout: Option<Duration>,
) -> Result<StageOutcome<E::Output>, PipelineError> {
    let stage = E::STAGE;

    let (ticket, input) = {
        let mut guard = session.lock().await;
        guard.ensure_runnable(stage)?;
        let input = executor.prepare(&guard)?;
        let ticket = guard.begin(stage)?;
        (ticket, input)
    };
    let mut in_flight = InFlight::new(session, ticket);

    tracing::info!(%stage, provider = executor.provider(), "stage started");

    let result = within(timeout, executor.provider(), executor.invoke(&input)).await;

    let mut guard = session.lock().await;
    in_flight.disarm();
    match result {
        Ok(output) => {
            guard.commit(&ticket, output.clone().into())?;
            drop(guard);
            tracing::info!(%stage, "stage completed");

            if within(timeout, executor.provider(), async {
                executor.after_commit(&input, &output).await;
                Ok::<(), PipelineError>(())
            })
            .await
            .is_err()
            {
                tracing::warn!(%stage, "follow-up after commit timed out");
            }
            Ok(StageOutcome::Completed { output })
        }
        Err(error) => {
            if !guard.abandon(&ticket) {
                tracing::debug!(%stage, %error, "failure from a superseded request ignored");
                return Err(PipelineError::Stale(stage));
            }
            tracing::warn!(%stage, %error, "stage failed");

            if error.is_collaborator() {
                if let Some(placeholder) = executor.fallback(&input) {
                    return Ok(StageOutcome::Fallback { placeholder, error });
                }
            }
            Err(error)
        }
    }
}

/// Await `call`, turning an elapsed `timeout` into a collaborator timeout
async fn within<T>(
    timeout: Option<Duration>,
    provider: &str,
    call: impl Future<Output = Result<T, PipelineError>>,
) -> Result<T, PipelineError> {
    match timeout {
        Some(limit) => match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(ApiError::timeout(provider, limit.as_secs()).into()),
        },
        None => call.await,
    }
}

/// Borrow an optional collaborator, or report it as not configured
pub(crate) fn configured<'a, T: ?Sized>(
    collaborator: &'a Option<Arc<T>>,
    provider: &str,
) -> Result<&'a Arc<T>, ApiError> {
    collaborator
        .as_ref()
        .ok_or_else(|| ApiError::not_configured(provider))
}

/// Longest prefix of `text` with at most `max_chars` characters
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Cap `text` at `max_chars` characters, appending [`TRUNCATION_MARKER`] when cut
pub fn truncate_with_marker(text: &str, max_chars: usize) -> String {
    let kept = truncate_chars(text, max_chars);
    if kept.len() == text.len() {
        text.to_string()
    } else {
        format!("{}{}", kept, TRUNCATION_MARKER)
    }
}

/// Remove a surrounding Markdown code fence (```json ... ```), if any
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. "json") on the opening line
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    body.trim_end().trim_end_matches("```").trim()
}
