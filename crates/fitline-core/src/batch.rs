use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::pool::{Credential, EgressRoute};

/// Default number of items sent in one completion request.
pub const DEFAULT_BATCH_SIZE: usize = 4;

/// Lifecycle of one batch in the dispatcher.
///
/// `Queued → Dispatched → {Succeeded | Throttled → Dispatched | Failed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Queued,
    Dispatched,
    Throttled,
    Succeeded,
    Failed,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Queued => "queued",
            BatchStatus::Dispatched => "dispatched",
            BatchStatus::Throttled => "throttled",
            BatchStatus::Succeeded => "succeeded",
            BatchStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchStatus::Succeeded | BatchStatus::Failed)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: BatchStatus) -> bool {
        use BatchStatus::*;
        matches!(
            (self, next),
            (Queued, Dispatched)
                | (Queued, Failed)
                | (Dispatched, Succeeded)
                | (Dispatched, Throttled)
                | (Dispatched, Failed)
                | (Throttled, Dispatched)
                | (Throttled, Failed)
        )
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "queued" => Ok(BatchStatus::Queued),
            "dispatched" => Ok(BatchStatus::Dispatched),
            "throttled" => Ok(BatchStatus::Throttled),
            "succeeded" => Ok(BatchStatus::Succeeded),
            "failed" => Ok(BatchStatus::Failed),
            _ => Err(format!("Unknown batch status: {}", s)),
        }
    }
}

/// A value tagged with its position in the caller's original input list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Indexed<T> {
    pub index: usize,
    pub value: T,
}

impl<T> Indexed<T> {
    pub fn new(index: usize, value: T) -> Self {
        Self { index, value }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Indexed<U> {
        Indexed {
            index: self.index,
            value: f(self.value),
        }
    }
}

/// One group of input items sent together in a single external request.
#[derive(Debug, Clone)]
pub struct BatchJob<T> {
    /// Position of this batch in planning order (0-based).
    pub batch_index: usize,
    pub items: Vec<Indexed<T>>,
    pub credential: Option<Credential>,
    pub egress: Option<EgressRoute>,
    /// Number of dispatch attempts made so far.
    pub attempts: u32,
    pub status: BatchStatus,
}

impl<T> BatchJob<T> {
    pub fn new(batch_index: usize, items: Vec<Indexed<T>>) -> Self {
        Self {
            batch_index,
            items,
            credential: None,
            egress: None,
            attempts: 0,
            status: BatchStatus::Queued,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Original indices of the items in this batch, in batch order.
    pub fn indices(&self) -> Vec<usize> {
        self.items.iter().map(|item| item.index).collect()
    }

    /// Move to `next`, logging (and refusing) transitions the state machine forbids.
    pub fn transition(&mut self, next: BatchStatus) -> bool {
        if !self.status.can_transition_to(next) {
            tracing::warn!(
                batch = self.batch_index,
                from = %self.status,
                to = %next,
                "Ignoring invalid batch transition"
            );
            return false;
        }
        if next == BatchStatus::Dispatched {
            self.attempts += 1;
        }
        self.status = next;
        true
    }
}

/// Split `items` into consecutive batches of at most `batch_size`.
///
/// Each item keeps its original index. A `batch_size` of zero is treated as 1.
pub fn plan<T>(items: Vec<T>, batch_size: usize) -> Vec<BatchJob<T>> {
    let batch_size = batch_size.max(1);
    let mut batches: Vec<BatchJob<T>> = Vec::with_capacity(items.len().div_ceil(batch_size));
    let mut current = Vec::with_capacity(batch_size);

    for (index, item) in items.into_iter().enumerate() {
        current.push(Indexed::new(index, item));
        if current.len() == batch_size {
            let full = std::mem::replace(&mut current, Vec::with_capacity(batch_size));
            batches.push(BatchJob::new(batches.len(), full));
        }
    }
    if !current.is_empty() {
        batches.push(BatchJob::new(batches.len(), current));
    }

    batches
}
