//! Reassembly of per-batch outcomes into one ordered result.
//!
//! Batches finish in any order. Records are placed by the original index they
//! carry, never by arrival order, and a failed batch only removes its own
//! items from the output.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use crate::batch::Indexed;
use crate::error::AppError;

/// What one batch produced once it left the dispatcher.
#[derive(Debug)]
pub struct BatchOutcome<T> {
    pub batch_index: usize,
    pub indices: Vec<usize>,
    pub attempts: u32,
    pub result: Result<Vec<Indexed<T>>, AppError>,
}

impl<T> BatchOutcome<T> {
    pub fn succeeded(
        batch_index: usize,
        indices: Vec<usize>,
        attempts: u32,
        records: Vec<Indexed<T>>,
    ) -> Self {
        Self {
            batch_index,
            indices,
            attempts,
            result: Ok(records),
        }
    }

    pub fn failed(batch_index: usize, indices: Vec<usize>, attempts: u32, error: AppError) -> Self {
        Self {
            batch_index,
            indices,
            attempts,
            result: Err(error),
        }
    }
}

/// A batch that contributed nothing to the output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedBatch {
    pub batch_index: usize,
    pub indices: Vec<usize>,
    pub attempts: u32,
    pub error: String,
    /// Never dispatched because the run was cancelled.
    pub cancelled: bool,
}

/// Final, index-ordered output of a dispatch run.
#[derive(Debug, Serialize)]
pub struct Aggregated<T> {
    pub total_items: usize,
    pub total_batches: usize,
    /// Records sorted by original index; at most one per index.
    pub records: Vec<Indexed<T>>,
    /// Failed and cancelled batches, sorted by batch index.
    pub failed: Vec<FailedBatch>,
}

impl<T> Aggregated<T> {
    /// Number of batches that failed after being dispatched.
    pub fn failure_count(&self) -> usize {
        self.failed.iter().filter(|b| !b.cancelled).count()
    }

    /// Number of batches skipped because the run was cancelled.
    pub fn cancelled_count(&self) -> usize {
        self.failed.iter().filter(|b| b.cancelled).count()
    }

    pub fn succeeded_batches(&self) -> usize {
        self.total_batches.saturating_sub(self.failed.len())
    }

    pub fn is_complete(&self) -> bool {
        self.records.len() == self.total_items
    }

    /// Original indices with no record, for callers that want to resubmit.
    pub fn missing_indices(&self) -> Vec<usize> {
        let present: HashSet<usize> = self.records.iter().map(|r| r.index).collect();
        (0..self.total_items)
            .filter(|i| !present.contains(i))
            .collect()
    }

    pub fn into_values(self) -> Vec<T> {
        self.records.into_iter().map(|r| r.value).collect()
    }
}

/// Folds batch outcomes, in any completion order, into an [`Aggregated`].
#[derive(Debug)]
pub struct Aggregator<T> {
    total_items: usize,
    total_batches: usize,
    records: BTreeMap<usize, T>,
    failed: Vec<FailedBatch>,
}

impl<T> Aggregator<T> {
    pub fn new(total_items: usize, total_batches: usize) -> Self {
        Self {
            total_items,
            total_batches,
            records: BTreeMap::new(),
            failed: Vec::new(),
        }
    }

    /// Fold one finished batch.
    ///
    /// Records tagged with an index that does not belong to the batch, or that
    /// is already filled, are dropped with a warning.
    pub fn record(&mut self, outcome: BatchOutcome<T>) {
        match outcome.result {
            Ok(records) => {
                let allowed: HashSet<usize> = outcome.indices.iter().copied().collect();
                for record in records {
                    if !allowed.contains(&record.index) {
                        tracing::warn!(
                            batch = outcome.batch_index,
                            index = record.index,
                            "Dropping record for an index outside its batch"
                        );
                        continue;
                    }
                    if self.records.contains_key(&record.index) {
                        tracing::warn!(
                            batch = outcome.batch_index,
                            index = record.index,
                            "Dropping duplicate record"
                        );
                        continue;
                    }
                    self.records.insert(record.index, record.value);
                }
            }
            Err(error) => {
                self.failed.push(FailedBatch {
                    batch_index: outcome.batch_index,
                    indices: outcome.indices,
                    attempts: outcome.attempts,
                    cancelled: matches!(error, AppError::Cancelled),
                    error: error.to_string(),
                });
            }
        }
    }

    /// Record a batch that went missing (its task died) so it is still counted.
    pub fn record_lost(&mut self, batch_index: usize, indices: Vec<usize>) {
        self.failed.push(FailedBatch {
            batch_index,
            indices,
            attempts: 0,
            error: "Batch task terminated unexpectedly".to_string(),
            cancelled: false,
        });
    }

    pub fn finish(mut self) -> Aggregated<T> {
        self.failed.sort_by_key(|b| b.batch_index);
        Aggregated {
            total_items: self.total_items,
            total_batches: self.total_batches,
            records: self
                .records
                .into_iter()
                .map(|(index, value)| Indexed::new(index, value))
                .collect(),
            failed: self.failed,
        }
    }
}
