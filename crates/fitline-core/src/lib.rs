pub mod aggregate;
pub mod backoff;
pub mod batch;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod extract;
pub mod models;
pub mod pool;
pub mod scoring;
pub mod traits;
pub mod workload;

#[cfg(test)]
pub mod testutil;

pub use aggregate::{Aggregated, FailedBatch};
pub use backoff::{Jitter, RetryPolicy};
pub use batch::{BatchJob, BatchStatus, Indexed, plan};
pub use config::FitlineConfig;
pub use dispatch::{
    AttemptOutcome, DispatchConfig, DispatchEvent, DispatchReporter, Dispatcher,
    TracingDispatchReporter,
};
pub use error::AppError;
pub use models::{
    CandidateProfile, ExternalAssessment, MatchResult, ParsedResume, PositionCriteria, SubScores,
    compute_hash,
};
pub use pool::{Credential, CredentialPool, EgressPool, EgressRoute, RoundRobinPool};
pub use scoring::{score, score_at};
pub use traits::{BatchWorkload, CompletionClient, CompletionRequest};
