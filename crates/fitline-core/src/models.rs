use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};

/// CEFR language level, ordered A1 < A2 < B1 < B2 < C1 < C2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LanguageLevel {
    A1,
    A2,
    B1,
    B2,
    C1,
    C2,
}

impl LanguageLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LanguageLevel::A1 => "A1",
            LanguageLevel::A2 => "A2",
            LanguageLevel::B1 => "B1",
            LanguageLevel::B2 => "B2",
            LanguageLevel::C1 => "C1",
            LanguageLevel::C2 => "C2",
        }
    }
}

impl fmt::Display for LanguageLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for LanguageLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "A1" => Ok(LanguageLevel::A1),
            "A2" => Ok(LanguageLevel::A2),
            "B1" => Ok(LanguageLevel::B1),
            "B2" => Ok(LanguageLevel::B2),
            "C1" => Ok(LanguageLevel::C1),
            "C2" => Ok(LanguageLevel::C2),
            _ => Err(format!("Unknown language level: {}", s)),
        }
    }
}

/// A language a candidate lists. The level is kept as written because
/// parsed resumes regularly contain things like "Native" or "fluent".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageSkill {
    #[serde(default, deserialize_with = "null_as_default")]
    pub language: String,
    #[serde(default = "default_language_level", deserialize_with = "level_or_a1")]
    pub level: String,
}

fn default_language_level() -> String {
    LanguageLevel::A1.as_str().to_string()
}

fn level_or_a1<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(default_language_level))
}

/// A language a position requires, with the lowest acceptable level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageRequirement {
    pub language: String,
    #[serde(alias = "level")]
    pub min_level: LanguageLevel,
}

/// Specific higher-education level a position can require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EducationLevel {
    #[serde(alias = "Бакалавр", alias = "bachelor")]
    Bachelor,
    #[serde(alias = "Магистр", alias = "master")]
    Master,
    #[serde(alias = "Специалист", alias = "specialist")]
    Specialist,
}

/// Immutable snapshot of a candidate used as scoring input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CandidateProfile {
    pub technical_skills: Vec<String>,
    pub soft_skills: Vec<String>,
    pub languages: Vec<LanguageSkill>,
    pub experience_years: u32,
    pub birth_date: Option<NaiveDate>,
    pub education: String,
    pub desired_position: Option<String>,
    pub ai_summary: Option<String>,
    pub ai_strengths: Vec<String>,
    pub ai_weaknesses: Vec<String>,
}

/// Relative weight of each criterion in the overall score. Intended to sum to 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub experience: u32,
    pub technical: u32,
    pub soft_skills: u32,
    pub languages: u32,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            experience: 30,
            technical: 40,
            soft_skills: 20,
            languages: 10,
        }
    }
}

impl ScoringWeights {
    pub fn total(&self) -> u32 {
        self.experience + self.technical + self.soft_skills + self.languages
    }
}

/// A position's requirements and scoring weights.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionCriteria {
    pub required_technical_skills: Vec<String>,
    pub optional_technical_skills: Vec<String>,
    pub required_soft_skills: Vec<String>,
    pub required_languages: Vec<LanguageRequirement>,
    pub min_experience_years: u32,
    pub max_experience_years: Option<u32>,
    pub min_age: Option<u32>,
    pub max_age: Option<u32>,
    pub education_required: bool,
    pub education_level: Option<EducationLevel>,
    pub weights: ScoringWeights,
}

/// Per-criterion subscores, each in [0, 100].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubScores {
    pub experience: u8,
    pub technical: u8,
    pub soft_skills: u8,
    pub language: u8,
    pub education: u8,
    pub age: u8,
}

/// Supplementary scores and commentary computed by the completion service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalAssessment {
    pub overall_score: u8,
    pub technical_match_score: Option<u8>,
    pub experience_match_score: Option<u8>,
    pub soft_skills_match_score: Option<u8>,
    pub matched_skills: Vec<String>,
    pub missing_skills: Vec<String>,
    pub recommendation: Option<String>,
    pub pros: Vec<String>,
    pub cons: Vec<String>,
}

/// Scored output for one (candidate, position) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    pub overall_score: u8,
    pub scores: SubScores,
    pub matched_technical_skills: Vec<String>,
    pub missing_technical_skills: Vec<String>,
    pub matched_soft_skills: Vec<String>,
    pub matched_languages: Vec<String>,
    pub ai_summary: Option<String>,
    pub ai_strengths: Vec<String>,
    pub ai_weaknesses: Vec<String>,
    /// Present only when the completion service scored this pair.
    pub assessment: Option<ExternalAssessment>,
    /// Owned by the caller; scoring always leaves these unset.
    pub invited: bool,
    pub rejected: bool,
}

impl MatchResult {
    /// Fold an external assessment into a locally computed result.
    ///
    /// The external overall, technical, experience and soft-skill scores
    /// replace the local ones; language, education and age stay local
    /// because the service does not score them.
    pub fn with_assessment(mut self, assessment: ExternalAssessment) -> Self {
        self.overall_score = assessment.overall_score;
        if let Some(score) = assessment.technical_match_score {
            self.scores.technical = score;
        }
        if let Some(score) = assessment.experience_match_score {
            self.scores.experience = score;
        }
        if let Some(score) = assessment.soft_skills_match_score {
            self.scores.soft_skills = score;
        }
        if !assessment.matched_skills.is_empty() {
            self.matched_technical_skills = assessment.matched_skills.clone();
        }
        if !assessment.missing_skills.is_empty() {
            self.missing_technical_skills = assessment.missing_skills.clone();
        }
        self.assessment = Some(assessment);
        self
    }
}

/// A project listed on a resume.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResumeProject {
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    pub description: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub technologies: Vec<String>,
}

/// Structured record extracted from one resume text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParsedResume {
    pub full_name: Option<String>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    #[serde(deserialize_with = "lenient_date")]
    pub birth_date: Option<NaiveDate>,
    pub education: Option<String>,
    pub work_experience: Option<String>,
    pub skills: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub technical_skills: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub soft_skills: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub languages: Vec<LanguageSkill>,
    #[serde(deserialize_with = "null_as_default")]
    pub certifications: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub projects: Vec<ResumeProject>,
    pub desired_position: Option<String>,
    #[serde(deserialize_with = "lenient_u64")]
    pub desired_salary: Option<u64>,
    #[serde(deserialize_with = "lenient_u64")]
    pub experience_years: Option<u64>,
    pub ai_summary: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub ai_strengths: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub ai_weaknesses: Vec<String>,
    /// SHA-256 of the source text, so storage can recognise a known candidate.
    #[serde(deserialize_with = "null_as_default")]
    pub source_hash: String,
}

impl ParsedResume {
    /// Project the parsed record onto the scoring input.
    pub fn to_profile(&self) -> CandidateProfile {
        CandidateProfile {
            technical_skills: self.technical_skills.clone(),
            soft_skills: self.soft_skills.clone(),
            languages: self.languages.clone(),
            experience_years: self
                .experience_years
                .map(|y| u32::try_from(y).unwrap_or(u32::MAX))
                .unwrap_or(0),
            birth_date: self.birth_date,
            education: self.education.clone().unwrap_or_default(),
            desired_position: self.desired_position.clone(),
            ai_summary: self.ai_summary.clone(),
            ai_strengths: self.ai_strengths.clone(),
            ai_weaknesses: self.ai_weaknesses.clone(),
        }
    }
}

/// Treats an explicit `null` like an absent field.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accepts `"YYYY-MM-DD"`, `null`, or anything else (treated as unknown).
pub(crate) fn lenient_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw
        .as_ref()
        .and_then(|v| v.as_str())
        .and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()))
}

/// Accepts a non-negative number or numeric string; fractions are truncated.
pub(crate) fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    let number = match raw {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(number.filter(|n| n.is_finite() && *n >= 0.0).map(|n| n as u64))
}

/// Compute a SHA-256 hash of a string, returned as 64-char hex.
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
