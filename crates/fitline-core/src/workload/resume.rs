use std::time::Duration;

use crate::batch::Indexed;
use crate::error::AppError;
use crate::extract::{extract_json, split_keyed};
use crate::models::{ParsedResume, compute_hash};
use crate::traits::BatchWorkload;

use super::{PREAMBLE, item_for};

/// Characters of each resume included in the prompt.
pub const RESUME_PROMPT_CHARS: usize = 2000;

const RESPONSE_FORMAT: &str = r#"{
  "resume1": {
    "full_name": "...",
    "contact_email": "...",
    "contact_phone": "...",
    "birth_date": "YYYY-MM-DD" or null,

    "education": "free-text description of education",
    "work_experience": "free-text description of experience",
    "skills": "general description of skills",

    "technical_skills": ["Python", "FastAPI", "PostgreSQL", ...],
    "soft_skills": ["Teamwork", "Communication", ...],
    "languages": [{"language": "English", "level": "B2"}, ...],
    "certifications": ["AWS Certified", "IELTS 7.0", ...],
    "projects": [
      {"name": "Project name", "description": "Short description", "technologies": ["tech1", "tech2"]},
      ...
    ],
    "desired_position": "Backend Developer" or null,
    "desired_salary": 150000 or null,
    "experience_years": 5,

    "ai_summary": "Two or three sentence summary of the candidate",
    "ai_strengths": ["Strength 1", "Strength 2", ...],
    "ai_weaknesses": ["Weakness 1", "Weakness 2", ...]
  },
  "resume2": { ... }
}"#;

/// Extracts structured records from raw resume texts.
#[derive(Debug, Clone, Default)]
pub struct ResumeParsing;

impl BatchWorkload for ResumeParsing {
    type Item = String;
    type Output = ParsedResume;

    fn name(&self) -> &'static str {
        "resume_parse"
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(180)
    }

    fn prompt(&self, items: &[Indexed<String>]) -> Result<String, AppError> {
        let texts: Vec<String> = items
            .iter()
            .enumerate()
            .map(|(position, item)| {
                let excerpt: String = item.value.chars().take(RESUME_PROMPT_CHARS).collect();
                format!("=== RESUME {} ===\n{excerpt}", position + 1)
            })
            .collect();

        Ok(format!(
            "{PREAMBLE}\n\
             Analyse the following {count} resumes in detail and extract as much \
             information as possible for candidate analysis.\n\n\
             Return JSON in this format:\n{RESPONSE_FORMAT}\n\n\
             If a field is missing, use null or an empty array [].\n\n\
             Resume texts:\n{texts}\n",
            count = items.len(),
            texts = texts.join("\n"),
        ))
    }

    fn parse(
        &self,
        items: &[Indexed<String>],
        content: &str,
    ) -> Result<Vec<Indexed<ParsedResume>>, AppError> {
        let records = split_keyed(extract_json(content)?, items, |n| format!("resume{n}"))?;

        let mut out = Vec::with_capacity(records.len());
        for record in records {
            let index = record.index;
            if !record.value.is_object() {
                tracing::warn!(index, "Dropping resume record that is not a JSON object");
                continue;
            }
            match serde_json::from_value::<ParsedResume>(record.value) {
                Ok(mut resume) => {
                    resume.source_hash = item_for(items, index)
                        .map(|text| compute_hash(text))
                        .unwrap_or_default();
                    out.push(Indexed::new(index, resume));
                }
                Err(e) => {
                    tracing::warn!(index, error = %e, "Dropping resume record that failed validation");
                }
            }
        }
        Ok(out)
    }
}
