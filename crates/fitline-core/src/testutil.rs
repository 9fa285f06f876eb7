//! Test utilities: mock completion client and a minimal workload.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

use crate::batch::Indexed;
use crate::error::AppError;
use crate::extract::{extract_json, split_keyed};
use crate::pool::{Credential, EgressRoute};
use crate::traits::{BatchWorkload, CompletionClient, CompletionRequest};

// ---------------------------------------------------------------------------
// MockCompletionClient
// ---------------------------------------------------------------------------

/// One scripted answer from the mock service.
#[derive(Debug)]
pub enum MockReply {
    /// Answer with the prompt itself.
    Echo,
    Content(String),
    Throttled,
    Error(AppError),
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub prompt: String,
    pub credential: Credential,
    pub egress: EgressRoute,
    pub timeout: Duration,
    pub at: Instant,
}

type LatencyFn = dyn Fn(&str) -> Duration + Send + Sync;

/// Mock completion service.
///
/// Each call pops the next scripted reply; once the script is exhausted every
/// call echoes its prompt.
#[derive(Clone)]
pub struct MockCompletionClient {
    script: Arc<Mutex<VecDeque<MockReply>>>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    latency: Arc<LatencyFn>,
}

impl MockCompletionClient {
    pub fn echo() -> Self {
        Self::scripted(Vec::new())
    }

    pub fn scripted(replies: Vec<MockReply>) -> Self {
        Self {
            script: Arc::new(Mutex::new(replies.into())),
            calls: Arc::new(Mutex::new(Vec::new())),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
            latency: Arc::new(|_| Duration::ZERO),
        }
    }

    /// Every call takes `latency` before answering.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.with_latency_fn(move |_| latency)
    }

    /// Call latency chosen from the prompt.
    pub fn with_latency_fn(
        mut self,
        latency: impl Fn(&str) -> Duration + Send + Sync + 'static,
    ) -> Self {
        self.latency = Arc::new(latency);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Highest number of calls observed in progress at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl CompletionClient for MockCompletionClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, AppError> {
        let reply = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(MockReply::Echo);
        self.calls.lock().unwrap().push(RecordedCall {
            prompt: request.prompt.clone(),
            credential: request.credential.clone(),
            egress: request.egress.clone(),
            timeout: request.timeout,
            at: Instant::now(),
        });

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let delay = (self.latency)(&request.prompt);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match reply {
            MockReply::Echo => Ok(request.prompt),
            MockReply::Content(content) => Ok(content),
            MockReply::Throttled => Err(AppError::RateLimitExceeded),
            MockReply::Error(e) => Err(e),
        }
    }
}

// ---------------------------------------------------------------------------
// EchoWorkload
// ---------------------------------------------------------------------------

/// Workload whose prompt is already a valid response: `{"item1": 10, ...}`.
///
/// Paired with [`MockReply::Echo`] every item comes back unchanged.
pub struct EchoWorkload;

impl BatchWorkload for EchoWorkload {
    type Item = u32;
    type Output = u32;

    fn name(&self) -> &'static str {
        "echo"
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(5)
    }

    fn prompt(&self, items: &[Indexed<u32>]) -> Result<String, AppError> {
        let records: serde_json::Map<String, Value> = items
            .iter()
            .enumerate()
            .map(|(position, item)| (format!("item{}", position + 1), Value::from(item.value)))
            .collect();
        Ok(serde_json::to_string(&records)?)
    }

    fn parse(&self, items: &[Indexed<u32>], content: &str) -> Result<Vec<Indexed<u32>>, AppError> {
        let records = split_keyed(extract_json(content)?, items, |n| format!("item{n}"))?;
        Ok(records
            .into_iter()
            .filter_map(|record| {
                let index = record.index;
                record
                    .value
                    .as_u64()
                    .and_then(|v| u32::try_from(v).ok())
                    .map(|v| Indexed::new(index, v))
            })
            .collect())
    }
}
