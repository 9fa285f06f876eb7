use std::future::Future;
use std::time::Duration;

use crate::batch::Indexed;
use crate::error::AppError;
use crate::pool::{Credential, EgressRoute};

/// A single prompt sent to the completion service.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub prompt: String,
    pub credential: Credential,
    pub egress: EgressRoute,
    pub timeout: Duration,
}

/// Sends a prompt to an OpenAI-compatible chat-completions endpoint.
///
/// Implementations must map HTTP 429 to [`AppError::RateLimitExceeded`] so the
/// dispatcher can tell throttling apart from other failures.
pub trait CompletionClient: Send + Sync + Clone + 'static {
    /// Returns the raw `choices[0].message.content` text.
    fn complete(
        &self,
        request: CompletionRequest,
    ) -> impl Future<Output = Result<String, AppError>> + Send;
}

/// Describes one kind of batched request: how to phrase it and how to read
/// the answer back into per-item records.
pub trait BatchWorkload: Send + Sync + 'static {
    type Item: Send + Sync + 'static;
    type Output: Send + 'static;

    /// Short name used in logs (e.g. `"resume_parse"`).
    fn name(&self) -> &'static str;

    /// Per-request timeout for this workload.
    fn timeout(&self) -> Duration;

    /// Build the prompt for one batch.
    fn prompt(&self, items: &[Indexed<Self::Item>]) -> Result<String, AppError>;

    /// Split the completion content into records keyed by original index.
    ///
    /// Content that cannot be read at all is an error and fails the batch;
    /// individual records may be dropped, so the output can be shorter than
    /// `items`.
    fn parse(
        &self,
        items: &[Indexed<Self::Item>],
        content: &str,
    ) -> Result<Vec<Indexed<Self::Output>>, AppError>;
}
