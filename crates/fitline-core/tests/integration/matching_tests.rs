use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::{Map, Value, json};
use tokio_util::sync::CancellationToken;

use fitline_core::models::{LanguageLevel, LanguageRequirement, LanguageSkill};
use fitline_core::workload::{CandidateMatching, MatchCandidate, score_all};
use fitline_core::{AppError, CandidateProfile, CompletionRequest, PositionCriteria};

use crate::integration::common::{FakeService, dispatcher, sections};

fn as_of() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 15).unwrap()
}

fn criteria() -> PositionCriteria {
    PositionCriteria {
        required_technical_skills: vec!["Rust".into(), "Tokio".into()],
        required_languages: vec![LanguageRequirement {
            language: "English".into(),
            min_level: LanguageLevel::B1,
        }],
        min_experience_years: 2,
        min_age: Some(20),
        max_age: Some(40),
        ..Default::default()
    }
}

fn candidates(n: u64) -> Vec<MatchCandidate> {
    (0..n)
        .map(|i| MatchCandidate {
            candidate_id: 1000 + i,
            profile: CandidateProfile {
                technical_skills: vec!["Rust".into()],
                languages: vec![LanguageSkill {
                    language: "English".into(),
                    level: "C1".into(),
                }],
                experience_years: 4,
                birth_date: NaiveDate::from_ymd_opt(1995, 3, 1),
                ..Default::default()
            },
        })
        .collect()
}

/// Scores each candidate `50 + (id % 100)` so results can be traced back.
fn assess_all(request: &CompletionRequest) -> Result<String, AppError> {
    let mut records = Map::new();
    for (n, body) in sections(&request.prompt, "--- CANDIDATE ") {
        let id: u64 = body
            .split_once("(ID: ")
            .and_then(|(_, rest)| rest.split(')').next())
            .and_then(|id| id.parse().ok())
            .unwrap_or_default();
        records.insert(
            format!("candidate_{n}"),
            json!({
                "overall_score": 50 + id % 100,
                "technical_match_score": 61.6,
                "matched_skills": ["Rust"],
                "missing_skills": ["Tokio"],
                "ai_recommendation": "Invite",
                "ai_pros": ["Rust"],
                "ai_cons": ["No Tokio"]
            }),
        );
    }
    Ok(Value::Object(records).to_string())
}

#[tokio::test(start_paused = true)]
async fn external_matching_merges_into_local_scores() {
    let service = FakeService::new(assess_all);
    let workload = CandidateMatching::new(criteria()).with_as_of(as_of());

    let result = dispatcher(service.clone(), &["k"], 10)
        .run(Arc::new(workload), candidates(9), 4)
        .await;

    assert_eq!(service.request_count(), 3);
    assert!(result.is_complete());
    for (i, record) in result.records.iter().enumerate() {
        let matched = &record.value;
        assert_eq!(matched.candidate_id, 1000 + i as u64);
        assert_eq!(matched.result.overall_score, 50 + i as u8);
        assert_eq!(matched.result.scores.technical, 62);
        assert_eq!(matched.result.scores.language, 100);
        assert_eq!(matched.result.scores.age, 100);
        assert_eq!(matched.result.matched_languages, vec!["English (C1)"]);
        assert_eq!(matched.result.missing_technical_skills, vec!["Tokio"]);
        assert_eq!(
            matched.result.assessment.as_ref().unwrap().recommendation.as_deref(),
            Some("Invite")
        );
    }
}

#[test]
fn local_matching_is_deterministic() {
    let pool = candidates(3);
    let first = score_all(&pool, &criteria(), as_of());
    let second = score_all(&pool, &criteria(), as_of());
    assert_eq!(first, second);

    // experience 100*30, technical 50*40, soft 100*20, language 100*10 -> 80.
    assert!(first.iter().all(|m| m.result.overall_score == 80));
    assert_eq!(first[0].result.scores.technical, 50);
}

#[tokio::test(start_paused = true)]
async fn cancelled_run_skips_queued_batches() {
    let service = FakeService::new(assess_all);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = dispatcher(service.clone(), &["k"], 2)
        .run_with_cancel(
            Arc::new(CandidateMatching::new(criteria())),
            candidates(8),
            4,
            cancel,
        )
        .await;

    assert_eq!(service.request_count(), 0);
    assert!(result.records.is_empty());
    assert_eq!(result.cancelled_count(), 2);
    assert!(result.failed.iter().all(|b| b.cancelled && b.attempts == 0));
}
