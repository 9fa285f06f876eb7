//! Concurrency-limited dispatch of batches to the completion service.
//!
//! Batches are admitted in planning order through a semaphore sized to
//! `max_concurrent`. Each admitted batch draws a credential and an egress
//! route, waits a jittered delay, and sends its prompt. Throttled batches
//! back off linearly and retry up to the attempt ceiling; every other error
//! fails the batch at once. Results are folded by [`Aggregator`] so one
//! failed batch never aborts its siblings.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::aggregate::{Aggregated, Aggregator, BatchOutcome};
use crate::backoff::{Jitter, RetryPolicy};
use crate::batch::{BatchJob, BatchStatus, Indexed, plan};
use crate::error::AppError;
use crate::pool::{Credential, CredentialPool, EgressPool, EgressRoute};
use crate::traits::{BatchWorkload, CompletionClient, CompletionRequest};

/// Default number of batches in flight for resume parsing.
pub const DEFAULT_MAX_CONCURRENT: usize = 3;

/// Result of a single request attempt, as seen by the retry state machine.
#[derive(Debug)]
pub enum AttemptOutcome<T> {
    Success(T),
    Throttled,
    Failure(AppError),
}

impl<T> AttemptOutcome<T> {
    pub fn from_result(result: Result<T, AppError>) -> Self {
        match result {
            Ok(value) => AttemptOutcome::Success(value),
            Err(e) if e.is_throttled() => AttemptOutcome::Throttled,
            Err(e) => AttemptOutcome::Failure(e),
        }
    }
}

/// Tuning for a dispatch run.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub max_concurrent: usize,
    pub retry: RetryPolicy,
    pub jitter: Jitter,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            retry: RetryPolicy::default(),
            jitter: Jitter::default(),
        }
    }
}

impl DispatchConfig {
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }
}

/// Events emitted by the dispatcher for monitoring/logging.
#[derive(Debug, Clone)]
pub enum DispatchEvent<'a> {
    RunStarted {
        run_id: Uuid,
        workload: &'a str,
        items: usize,
        batches: usize,
        max_concurrent: usize,
    },
    BatchDispatched {
        run_id: Uuid,
        batch: usize,
        attempt: u32,
        items: usize,
        credential: &'a Credential,
        egress: &'a EgressRoute,
    },
    BatchThrottled {
        run_id: Uuid,
        batch: usize,
        attempt: u32,
        wait: Duration,
        will_retry: bool,
    },
    BatchSucceeded {
        run_id: Uuid,
        batch: usize,
        attempts: u32,
        records: usize,
    },
    BatchFailed {
        run_id: Uuid,
        batch: usize,
        attempts: u32,
        indices: &'a [usize],
        error: &'a str,
    },
    BatchCancelled {
        run_id: Uuid,
        batch: usize,
        indices: &'a [usize],
    },
    RunFinished {
        run_id: Uuid,
        workload: &'a str,
        items: usize,
        records: usize,
        failed_batches: usize,
        cancelled_batches: usize,
    },
}

/// Trait for receiving dispatcher events (decoupled logging).
pub trait DispatchReporter: Send + Sync {
    fn report(&self, event: DispatchEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDispatchReporter;

impl DispatchReporter for TracingDispatchReporter {
    fn report(&self, event: DispatchEvent<'_>) {
        match event {
            DispatchEvent::RunStarted {
                run_id,
                workload,
                items,
                batches,
                max_concurrent,
            } => {
                tracing::info!(%run_id, %workload, items, batches, max_concurrent, "Dispatch started");
            }
            DispatchEvent::BatchDispatched {
                run_id,
                batch,
                attempt,
                items,
                credential,
                egress,
            } => {
                tracing::info!(%run_id, batch, attempt, items, %credential, %egress, "Batch dispatched");
            }
            DispatchEvent::BatchThrottled {
                run_id,
                batch,
                attempt,
                wait,
                will_retry,
            } => {
                tracing::warn!(
                    %run_id,
                    batch,
                    attempt,
                    wait_ms = %wait.as_millis(),
                    will_retry,
                    "Batch throttled"
                );
            }
            DispatchEvent::BatchSucceeded {
                run_id,
                batch,
                attempts,
                records,
            } => {
                tracing::info!(%run_id, batch, attempts, records, "Batch succeeded");
            }
            DispatchEvent::BatchFailed {
                run_id,
                batch,
                attempts,
                indices,
                error,
            } => {
                tracing::error!(%run_id, batch, attempts, ?indices, %error, "Batch failed");
            }
            DispatchEvent::BatchCancelled {
                run_id,
                batch,
                indices,
            } => {
                tracing::info!(%run_id, batch, ?indices, "Batch cancelled before dispatch");
            }
            DispatchEvent::RunFinished {
                run_id,
                workload,
                items,
                records,
                failed_batches,
                cancelled_batches,
            } => {
                tracing::info!(
                    %run_id,
                    %workload,
                    items,
                    records,
                    failed_batches,
                    cancelled_batches,
                    "Dispatch finished"
                );
            }
        }
    }
}

/// Runs batches of a [`BatchWorkload`] against a [`CompletionClient`].
#[derive(Clone)]
pub struct Dispatcher<C: CompletionClient> {
    client: C,
    credentials: CredentialPool,
    egress: EgressPool,
    config: DispatchConfig,
    reporter: Arc<dyn DispatchReporter>,
}

impl<C: CompletionClient> Dispatcher<C> {
    pub fn new(
        client: C,
        credentials: CredentialPool,
        egress: EgressPool,
        config: DispatchConfig,
    ) -> Self {
        Self {
            client,
            credentials,
            egress,
            config,
            reporter: Arc::new(TracingDispatchReporter),
        }
    }

    pub fn with_reporter(mut self, reporter: impl DispatchReporter + 'static) -> Self {
        self.reporter = Arc::new(reporter);
        self
    }

    /// Same pools and client, different tuning (e.g. wider fan-out for matching).
    pub fn with_config(&self, config: DispatchConfig) -> Self {
        Self {
            config,
            ..self.clone()
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Plan `items` into batches and run them to completion.
    pub async fn run<W: BatchWorkload>(
        &self,
        workload: Arc<W>,
        items: Vec<W::Item>,
        batch_size: usize,
    ) -> Aggregated<W::Output> {
        self.run_batches(workload, plan(items, batch_size), CancellationToken::new())
            .await
    }

    /// Like [`run`](Self::run), but stops admitting new batches once `cancel` fires.
    ///
    /// Batches already in flight are allowed to drain.
    pub async fn run_with_cancel<W: BatchWorkload>(
        &self,
        workload: Arc<W>,
        items: Vec<W::Item>,
        batch_size: usize,
        cancel: CancellationToken,
    ) -> Aggregated<W::Output> {
        self.run_batches(workload, plan(items, batch_size), cancel)
            .await
    }

    /// Send a single item as its own batch and return its record.
    ///
    /// Goes through the same rotation, jitter and backoff as a batched run.
    pub async fn run_one<W: BatchWorkload>(
        &self,
        workload: &W,
        item: W::Item,
    ) -> Result<W::Output, AppError> {
        let job = BatchJob::new(0, vec![Indexed::new(0, item)]);
        let outcome = self.drive(Uuid::new_v4(), workload, job).await;
        outcome
            .result?
            .into_iter()
            .next()
            .map(|record| record.value)
            .ok_or_else(|| AppError::MalformedResponse("Response contained no record".into()))
    }

    /// Run pre-planned batches.
    pub async fn run_batches<W: BatchWorkload>(
        &self,
        workload: Arc<W>,
        jobs: Vec<BatchJob<W::Item>>,
        cancel: CancellationToken,
    ) -> Aggregated<W::Output> {
        let run_id = Uuid::new_v4();
        let total_items: usize = jobs.iter().map(BatchJob::len).sum();
        let total_batches = jobs.len();
        let max_concurrent = self.config.max_concurrent.max(1);

        self.reporter.report(DispatchEvent::RunStarted {
            run_id,
            workload: workload.name(),
            items: total_items,
            batches: total_batches,
            max_concurrent,
        });

        let semaphore = Arc::new(Semaphore::new(max_concurrent));
        let mut aggregator = Aggregator::new(total_items, total_batches);
        let mut in_flight: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        let mut tasks = JoinSet::new();
        let mut queue = jobs.into_iter();

        while let Some(mut job) = queue.next() {
            let permit = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };

            let Some(permit) = permit else {
                self.cancel_job(run_id, &mut job, &mut aggregator);
                for mut rest in queue.by_ref() {
                    self.cancel_job(run_id, &mut rest, &mut aggregator);
                }
                break;
            };

            in_flight.insert(job.batch_index, job.indices());
            let this = self.clone();
            let workload = Arc::clone(&workload);
            tasks.spawn(async move {
                let _permit = permit;
                this.drive(run_id, workload.as_ref(), job).await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => {
                    in_flight.remove(&outcome.batch_index);
                    aggregator.record(outcome);
                }
                Err(e) => tracing::error!(%run_id, error = %e, "Batch task panicked"),
            }
        }
        for (batch_index, indices) in in_flight {
            aggregator.record_lost(batch_index, indices);
        }

        let result = aggregator.finish();
        self.reporter.report(DispatchEvent::RunFinished {
            run_id,
            workload: workload.name(),
            items: total_items,
            records: result.records.len(),
            failed_batches: result.failure_count(),
            cancelled_batches: result.cancelled_count(),
        });
        result
    }

    fn cancel_job<T, O>(
        &self,
        run_id: Uuid,
        job: &mut BatchJob<T>,
        aggregator: &mut Aggregator<O>,
    ) {
        job.transition(BatchStatus::Failed);
        let indices = job.indices();
        self.reporter.report(DispatchEvent::BatchCancelled {
            run_id,
            batch: job.batch_index,
            indices: &indices,
        });
        aggregator.record(BatchOutcome::failed(
            job.batch_index,
            indices,
            job.attempts,
            AppError::Cancelled,
        ));
    }

    /// Drive one batch through `Dispatched → {Succeeded | Throttled → … | Failed}`.
    async fn drive<W: BatchWorkload>(
        &self,
        run_id: Uuid,
        workload: &W,
        mut job: BatchJob<W::Item>,
    ) -> BatchOutcome<W::Output> {
        let prompt = match workload.prompt(&job.items) {
            Ok(prompt) => prompt,
            Err(e) => {
                job.transition(BatchStatus::Failed);
                return self.fail(run_id, job, e);
            }
        };
        let policy = &self.config.retry;

        loop {
            job.transition(BatchStatus::Dispatched);
            let credential = self.credentials.next();
            let egress = self.egress.next();
            self.reporter.report(DispatchEvent::BatchDispatched {
                run_id,
                batch: job.batch_index,
                attempt: job.attempts,
                items: job.len(),
                credential: &credential,
                egress: &egress,
            });
            job.credential = Some(credential.clone());
            job.egress = Some(egress.clone());

            tokio::time::sleep(self.config.jitter.sample()).await;

            let request = CompletionRequest {
                prompt: prompt.clone(),
                credential,
                egress,
                timeout: workload.timeout(),
            };
            let result = self
                .client
                .complete(request)
                .await
                .and_then(|content| workload.parse(&job.items, &content));

            let (error, backoff) = match AttemptOutcome::from_result(result) {
                AttemptOutcome::Success(records) => {
                    job.transition(BatchStatus::Succeeded);
                    self.reporter.report(DispatchEvent::BatchSucceeded {
                        run_id,
                        batch: job.batch_index,
                        attempts: job.attempts,
                        records: records.len(),
                    });
                    return BatchOutcome::succeeded(
                        job.batch_index,
                        job.indices(),
                        job.attempts,
                        records,
                    );
                }
                AttemptOutcome::Throttled => (AppError::RateLimitExceeded, true),
                AttemptOutcome::Failure(e) => {
                    let transient = policy.retry_transient && e.is_retryable();
                    (e, transient)
                }
            };

            if !backoff {
                job.transition(BatchStatus::Failed);
                return self.fail(run_id, job, error);
            }

            job.transition(BatchStatus::Throttled);
            let wait = policy.delay_for_attempt(job.attempts);
            let will_retry = job.attempts < policy.max_attempts;
            self.reporter.report(DispatchEvent::BatchThrottled {
                run_id,
                batch: job.batch_index,
                attempt: job.attempts,
                wait,
                will_retry,
            });
            tokio::time::sleep(wait).await;

            if !will_retry {
                job.transition(BatchStatus::Failed);
                return self.fail(run_id, job, error);
            }
        }
    }

    fn fail<T, O>(&self, run_id: Uuid, job: BatchJob<T>, error: AppError) -> BatchOutcome<O> {
        let indices = job.indices();
        let message = error.to_string();
        self.reporter.report(DispatchEvent::BatchFailed {
            run_id,
            batch: job.batch_index,
            attempts: job.attempts,
            indices: &indices,
            error: &message,
        });
        BatchOutcome::failed(job.batch_index, indices, job.attempts, error)
    }
}
