use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::batch::Indexed;
use crate::error::AppError;
use crate::extract::parse_score_pair;
use crate::traits::BatchWorkload;

use super::PREAMBLE;

/// A candidate's written answers to interview questions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterviewAnswers {
    pub position_title: String,
    pub questions: Vec<String>,
    pub answers: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterviewScores {
    pub soft_skills_score: u8,
    pub confidence_score: u8,
}

/// Scores interview answers for soft skills and fit, one interview per request.
#[derive(Debug, Clone, Default)]
pub struct InterviewReview;

impl BatchWorkload for InterviewReview {
    type Item = InterviewAnswers;
    type Output = InterviewScores;

    fn name(&self) -> &'static str {
        "interview_review"
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(60)
    }

    fn prompt(&self, items: &[Indexed<InterviewAnswers>]) -> Result<String, AppError> {
        let [item] = items else {
            return Err(AppError::Generic(format!(
                "Interview review takes exactly one interview per request, got {}",
                items.len()
            )));
        };
        let interview = &item.value;
        let questions: Vec<String> = interview
            .questions
            .iter()
            .enumerate()
            .map(|(i, q)| format!("{}. {q}", i + 1))
            .collect();

        Ok(format!(
            "{PREAMBLE}\n\
             Review the candidate's interview answers for the position \"{title}\".\n\n\
             Questions:\n{questions}\n\n\
             Candidate answers:\n{answers}\n\n\
             Rate:\n\
             1. Soft skills (communication, structure, argumentation) from 0 to 100\n\
             2. Confidence score (fit for the position, confidence) from 0 to 100\n\n\
             Answer STRICTLY in the format: <soft skills score> <confidence score>\n\
             For example: 85 78\n",
            title = interview.position_title,
            questions = questions.join("\n"),
            answers = interview.answers,
        ))
    }

    fn parse(
        &self,
        items: &[Indexed<InterviewAnswers>],
        content: &str,
    ) -> Result<Vec<Indexed<InterviewScores>>, AppError> {
        let Some(item) = items.first() else {
            return Ok(Vec::new());
        };
        let (soft_skills_score, confidence_score) = parse_score_pair(content.trim())?;
        Ok(vec![Indexed::new(
            item.index,
            InterviewScores {
                soft_skills_score,
                confidence_score,
            },
        )])
    }
}
