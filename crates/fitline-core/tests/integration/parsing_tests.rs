use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value, json};

use fitline_core::workload::ResumeParsing;
use fitline_core::{AppError, CompletionRequest, compute_hash};

use crate::integration::common::{FakeService, dispatcher, sections};

fn resume_text(i: usize) -> String {
    format!("Name: Candidate {i}\nSkills: Rust, SQL\nExperience: {i} years\n")
}

/// Answers every resume in the prompt, echoing the name line back.
fn parse_all(request: &CompletionRequest) -> Result<String, AppError> {
    let mut records = Map::new();
    for (n, body) in sections(&request.prompt, "=== RESUME ") {
        let name = body
            .split_once("Name: ")
            .and_then(|(_, rest)| rest.lines().next())
            .unwrap_or_default();
        records.insert(
            format!("resume{n}"),
            json!({
                "full_name": name,
                "technical_skills": ["Rust", "SQL"],
                "languages": [{"language": "English", "level": "B2"}],
                "experience_years": 3
            }),
        );
    }
    Ok(format!(
        "```json\n{}\n```",
        serde_json::to_string_pretty(&Value::Object(records)).unwrap()
    ))
}

#[tokio::test(start_paused = true)]
async fn parses_ten_resumes_in_three_batches_in_input_order() {
    let service = FakeService::new(parse_all);
    let texts: Vec<String> = (0..10).map(resume_text).collect();

    let result = dispatcher(service.clone(), &["k1", "k2"], 3)
        .run(Arc::new(ResumeParsing), texts.clone(), 4)
        .await;

    assert_eq!(service.request_count(), 3);
    assert_eq!(result.total_batches, 3);
    assert!(result.is_complete());
    assert_eq!(result.failure_count(), 0);
    for (i, record) in result.records.iter().enumerate() {
        assert_eq!(record.index, i);
        assert_eq!(record.value.full_name.as_deref(), Some(format!("Candidate {i}").as_str()));
        assert_eq!(record.value.source_hash, compute_hash(&texts[i]));
        assert_eq!(record.value.to_profile().experience_years, 3);
    }
    assert!(
        service
            .requests
            .lock()
            .unwrap()
            .iter()
            .all(|r| r.timeout == Duration::from_secs(180))
    );
}

#[tokio::test(start_paused = true)]
async fn throttled_batch_fails_alone_after_three_attempts() {
    let service = FakeService::new(|request| {
        if request.prompt.contains("Candidate 5\n") {
            Err(AppError::RateLimitExceeded)
        } else {
            parse_all(request)
        }
    });

    let started = tokio::time::Instant::now();
    let result = dispatcher(service.clone(), &["k1"], 3)
        .run(Arc::new(ResumeParsing), (0..10).map(resume_text).collect(), 4)
        .await;

    // 2 good batches + 3 attempts of the throttled one.
    assert_eq!(service.request_count(), 5);
    assert_eq!(started.elapsed(), Duration::from_secs(10 + 20 + 30));

    assert_eq!(result.failure_count(), 1);
    let failed = &result.failed[0];
    assert_eq!(failed.batch_index, 1);
    assert_eq!(failed.indices, vec![4, 5, 6, 7]);
    assert_eq!(failed.attempts, 3);
    assert_eq!(result.missing_indices(), vec![4, 5, 6, 7]);

    let indices: Vec<usize> = result.records.iter().map(|r| r.index).collect();
    assert_eq!(indices, vec![0, 1, 2, 3, 8, 9]);
}

#[tokio::test(start_paused = true)]
async fn missing_and_invalid_records_are_dropped_individually() {
    let service = FakeService::new(|_| {
        Ok(json!({
            "resume1": {"full_name": "Kept"},
            "resume2": ["not", "an", "object"]
        })
        .to_string())
    });

    let result = dispatcher(service, &["k1"], 1)
        .run(Arc::new(ResumeParsing), (0..3).map(resume_text).collect(), 4)
        .await;

    assert_eq!(result.failure_count(), 0);
    assert_eq!(result.records.len(), 1);
    assert_eq!(result.records[0].index, 0);
    assert_eq!(result.missing_indices(), vec![1, 2]);
}

#[tokio::test(start_paused = true)]
async fn credentials_rotate_in_order_across_batches() {
    let service = FakeService::new(parse_all);

    dispatcher(service.clone(), &["a", "b", "c"], 1)
        .run(Arc::new(ResumeParsing), (0..6).map(resume_text).collect(), 1)
        .await;

    assert_eq!(service.credentials_used(), vec!["a", "b", "c", "a", "b", "c"]);
}
