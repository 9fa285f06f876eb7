use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::batch::Indexed;
use crate::error::AppError;
use crate::extract::extract_json;
use crate::models::{
    LanguageLevel, LanguageRequirement, LanguageSkill, PositionCriteria, lenient_u64,
    null_as_default,
};
use crate::traits::BatchWorkload;

use super::PREAMBLE;

const RESPONSE_FORMAT: &str = r#"{
  "required_technical_skills": ["Python", "FastAPI", ...],
  "optional_technical_skills": ["Docker", "Kubernetes", ...],
  "required_soft_skills": ["Teamwork", "Communication", ...],
  "required_experience_years": 3,
  "required_languages": [{"language": "English", "level": "B2"}],
  "salary_range": {"min": 100000, "max": 200000} or null,
  "position_category": "Backend Developer" / "Frontend Developer" / etc
}"#;

/// Free-text vacancy as written by a recruiter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VacancyDescription {
    pub title: String,
    pub description: String,
    pub requirements: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SalaryRange {
    #[serde(deserialize_with = "lenient_u64")]
    pub min: Option<u64>,
    #[serde(deserialize_with = "lenient_u64")]
    pub max: Option<u64>,
}

/// Structured requirements derived from a vacancy description.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DerivedRequirements {
    #[serde(deserialize_with = "null_as_default")]
    pub required_technical_skills: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub optional_technical_skills: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub required_soft_skills: Vec<String>,
    #[serde(deserialize_with = "lenient_u64")]
    pub required_experience_years: Option<u64>,
    #[serde(deserialize_with = "null_as_default")]
    pub required_languages: Vec<LanguageSkill>,
    pub salary_range: Option<SalaryRange>,
    pub position_category: Option<String>,
}

impl DerivedRequirements {
    /// Turn derived requirements into scoring criteria with default weights.
    ///
    /// Language levels that are not CEFR codes are read as A1 (any knowledge).
    pub fn into_criteria(self) -> PositionCriteria {
        let required_languages = self
            .required_languages
            .into_iter()
            .map(|skill| {
                let min_level = skill.level.parse().unwrap_or_else(|_| {
                    tracing::debug!(
                        language = %skill.language,
                        level = %skill.level,
                        "Unrecognised language level, using A1"
                    );
                    LanguageLevel::A1
                });
                LanguageRequirement {
                    language: skill.language,
                    min_level,
                }
            })
            .collect();

        PositionCriteria {
            required_technical_skills: self.required_technical_skills,
            optional_technical_skills: self.optional_technical_skills,
            required_soft_skills: self.required_soft_skills,
            required_languages,
            min_experience_years: self
                .required_experience_years
                .map(|y| u32::try_from(y).unwrap_or(u32::MAX))
                .unwrap_or(0),
            ..Default::default()
        }
    }
}

/// Derives structured requirements from one vacancy per request.
#[derive(Debug, Clone, Default)]
pub struct VacancyAnalysis;

impl BatchWorkload for VacancyAnalysis {
    type Item = VacancyDescription;
    type Output = DerivedRequirements;

    fn name(&self) -> &'static str {
        "vacancy_analysis"
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(60)
    }

    fn prompt(&self, items: &[Indexed<VacancyDescription>]) -> Result<String, AppError> {
        let [item] = items else {
            return Err(AppError::Generic(format!(
                "Vacancy analysis takes exactly one vacancy per request, got {}",
                items.len()
            )));
        };
        let vacancy = &item.value;

        Ok(format!(
            "{PREAMBLE}\n\
             Analyse the vacancy and extract structured requirements for candidate analysis.\n\n\
             Position: {title}\n\
             Description: {description}\n\
             Requirements: {requirements}\n\n\
             Return ONLY JSON:\n{RESPONSE_FORMAT}\n",
            title = vacancy.title,
            description = vacancy.description,
            requirements = vacancy.requirements,
        ))
    }

    fn parse(
        &self,
        items: &[Indexed<VacancyDescription>],
        content: &str,
    ) -> Result<Vec<Indexed<DerivedRequirements>>, AppError> {
        let Some(item) = items.first() else {
            return Ok(Vec::new());
        };
        let value = extract_json(content)?;
        if !value.is_object() {
            return Err(AppError::MalformedResponse(
                "Expected a JSON object of requirements".to_string(),
            ));
        }
        let derived: DerivedRequirements = serde_json::from_value(value)
            .map_err(|e| AppError::MalformedResponse(format!("Invalid requirements: {e}")))?;
        Ok(vec![Indexed::new(item.index, derived)])
    }
}
