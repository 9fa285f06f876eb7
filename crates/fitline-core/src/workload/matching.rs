use std::time::Duration;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::batch::Indexed;
use crate::error::AppError;
use crate::extract::{clamp_score, extract_json, split_keyed};
use crate::models::{CandidateProfile, ExternalAssessment, MatchResult, PositionCriteria};
use crate::scoring::score_at;
use crate::traits::BatchWorkload;

use super::{PREAMBLE, item_for};

const RESPONSE_FORMAT: &str = r#"{
  "candidate_1": {
    "overall_score": 85.5,
    "technical_match_score": 90.0,
    "experience_match_score": 80.0,
    "soft_skills_match_score": 85.0,
    "matched_skills": ["Python", "FastAPI", ...],
    "missing_skills": ["Docker", "Kubernetes", ...],
    "ai_recommendation": "Short recommendation",
    "ai_pros": ["Advantage 1", ...],
    "ai_cons": ["Drawback 1", ...]
  },
  "candidate_2": { ... }
}"#;

/// A candidate submitted for matching against one position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub candidate_id: u64,
    pub profile: CandidateProfile,
}

/// Match output for one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateMatch {
    pub candidate_id: u64,
    pub result: MatchResult,
}

/// Score every candidate locally, without the completion service.
pub fn score_all(
    candidates: &[MatchCandidate],
    criteria: &PositionCriteria,
    as_of: NaiveDate,
) -> Vec<CandidateMatch> {
    candidates
        .iter()
        .map(|candidate| CandidateMatch {
            candidate_id: candidate.candidate_id,
            result: score_at(&candidate.profile, criteria, as_of),
        })
        .collect()
}

/// Asks the completion service to assess candidates against one position,
/// then folds each assessment into the local deterministic score.
#[derive(Debug, Clone)]
pub struct CandidateMatching {
    criteria: PositionCriteria,
    as_of: NaiveDate,
}

impl CandidateMatching {
    pub fn new(criteria: PositionCriteria) -> Self {
        Self {
            criteria,
            as_of: Utc::now().date_naive(),
        }
    }

    /// Evaluate age as of a fixed date instead of today.
    pub fn with_as_of(mut self, as_of: NaiveDate) -> Self {
        self.as_of = as_of;
        self
    }

    pub fn criteria(&self) -> &PositionCriteria {
        &self.criteria
    }
}

impl BatchWorkload for CandidateMatching {
    type Item = MatchCandidate;
    type Output = CandidateMatch;

    fn name(&self) -> &'static str {
        "candidate_match"
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(120)
    }

    fn prompt(&self, items: &[Indexed<MatchCandidate>]) -> Result<String, AppError> {
        let mut candidates = String::new();
        for (position, item) in items.iter().enumerate() {
            candidates.push_str(&format!(
                "\n--- CANDIDATE {} (ID: {}) ---\n{}",
                position + 1,
                item.value.candidate_id,
                serde_json::to_string_pretty(&item.value.profile)?
            ));
        }

        Ok(format!(
            "{PREAMBLE}\n\
             Rate how well each of the {count} candidates fits the vacancy on a 0-100 scale.\n\n\
             VACANCY REQUIREMENTS:\n{requirements}\n\n\
             CANDIDATES:\n{candidates}\n\n\
             Return ONLY JSON in this format:\n{RESPONSE_FORMAT}\n",
            count = items.len(),
            requirements = serde_json::to_string_pretty(&self.criteria)?,
        ))
    }

    fn parse(
        &self,
        items: &[Indexed<MatchCandidate>],
        content: &str,
    ) -> Result<Vec<Indexed<CandidateMatch>>, AppError> {
        let records = split_keyed(extract_json(content)?, items, |n| format!("candidate_{n}"))?;

        let mut out = Vec::with_capacity(records.len());
        for record in records {
            let index = record.index;
            let Some(candidate) = item_for(items, index) else {
                continue;
            };
            let Some(assessment) = read_assessment(&record.value) else {
                tracing::warn!(
                    index,
                    candidate_id = candidate.candidate_id,
                    "Dropping assessment without a usable overall_score"
                );
                continue;
            };

            let result = score_at(&candidate.profile, &self.criteria, self.as_of)
                .with_assessment(assessment);
            out.push(Indexed::new(
                index,
                CandidateMatch {
                    candidate_id: candidate.candidate_id,
                    result,
                },
            ));
        }
        Ok(out)
    }
}

/// Validate one keyed record. Scores are clamped to [0, 100]; a record with
/// no readable overall score is rejected.
fn read_assessment(value: &Value) -> Option<ExternalAssessment> {
    let record = value.as_object()?;
    let score = |key: &str| record.get(key).and_then(clamp_score);
    let list = |key: &str| -> Vec<String> {
        record
            .get(key)
            .and_then(Value::as_array)
            .map(|values| {
                values
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    };
    let text = |keys: &[&str]| {
        keys.iter()
            .find_map(|key| record.get(*key).and_then(Value::as_str))
            .map(str::to_string)
    };

    let mut pros = list("ai_pros");
    if pros.is_empty() {
        pros = list("pros");
    }
    let mut cons = list("ai_cons");
    if cons.is_empty() {
        cons = list("cons");
    }

    Some(ExternalAssessment {
        overall_score: score("overall_score")?,
        technical_match_score: score("technical_match_score"),
        experience_match_score: score("experience_match_score"),
        soft_skills_match_score: score("soft_skills_match_score"),
        matched_skills: list("matched_skills"),
        missing_skills: list("missing_skills"),
        recommendation: text(&["ai_recommendation", "recommendation"]),
        pros,
        cons,
    })
}
