//! Batched request kinds sent to the completion service.
//!
//! Each workload knows how to phrase one batch as a prompt and how to read
//! the answer back into records tagged with their original index.

mod interview;
mod matching;
mod resume;
mod vacancy;

pub use interview::{InterviewAnswers, InterviewReview, InterviewScores};
pub use matching::{CandidateMatch, CandidateMatching, MatchCandidate, score_all};
pub use resume::{RESUME_PROMPT_CHARS, ResumeParsing};
pub use vacancy::{DerivedRequirements, SalaryRange, VacancyAnalysis, VacancyDescription};

const PREAMBLE: &str = "No additional commentary is required.";

/// Find the batch item a keyed record belongs to.
fn item_for<T>(items: &[crate::batch::Indexed<T>], index: usize) -> Option<&T> {
    items.iter().find(|item| item.index == index).map(|item| &item.value)
}
