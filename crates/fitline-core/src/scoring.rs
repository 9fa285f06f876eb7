//! Deterministic suitability scoring.
//!
//! Every function here is pure: identical inputs (including the evaluation
//! date) always produce an identical [`MatchResult`]. All arithmetic is done
//! on integers so results are reproducible bit-for-bit across platforms.

use chrono::{Datelike, NaiveDate, Utc};

use crate::models::{
    CandidateProfile, EducationLevel, LanguageLevel, LanguageRequirement, LanguageSkill,
    MatchResult, PositionCriteria, SubScores,
};

/// Words that indicate some form of higher education, in any language we see.
const HIGHER_EDUCATION_KEYWORDS: &[&str] = &["университет", "институт", "university", "высшее"];

/// Penalty and floor applied to experience above the position's maximum.
const OVERQUALIFIED_PENALTY_PER_YEAR: u32 = 5;
const OVERQUALIFIED_MAX_PENALTY: u32 = 20;
const OVERQUALIFIED_FLOOR: u32 = 80;

/// Maximum bonus earned from optional technical skills.
const OPTIONAL_SKILL_BONUS: usize = 20;

fn level_keywords(level: EducationLevel) -> &'static [&'static str] {
    match level {
        EducationLevel::Bachelor => &["бакалавр", "bachelor"],
        EducationLevel::Master => &["магистр", "master"],
        EducationLevel::Specialist => &["специалист", "specialist"],
    }
}

fn normalize(label: &str) -> String {
    label.trim().to_lowercase()
}

fn ratio_percent(matched: usize, total: usize) -> u8 {
    if total == 0 {
        100
    } else {
        (matched * 100 / total) as u8
    }
}

/// Score experience against the required range.
///
/// Below the minimum the score is proportional; within the range it is 100;
/// above an explicit maximum a capped "overqualified" penalty applies.
pub fn experience_score(years: u32, min_required: u32, max_required: Option<u32>) -> u8 {
    if years < min_required {
        // min_required > 0 here, since years >= 0
        return (u64::from(years) * 100 / u64::from(min_required)) as u8;
    }

    let Some(max) = max_required else {
        return 100;
    };

    if years <= max {
        return 100;
    }

    let penalty = (OVERQUALIFIED_PENALTY_PER_YEAR.saturating_mul(years - max))
        .min(OVERQUALIFIED_MAX_PENALTY);
    (100 - penalty).max(OVERQUALIFIED_FLOOR) as u8
}

/// Whole years between `birth_date` and `as_of`.
pub fn age_on(birth_date: NaiveDate, as_of: NaiveDate) -> i32 {
    let before_birthday = (as_of.month(), as_of.day()) < (birth_date.month(), birth_date.day());
    as_of.year() - birth_date.year() - i32::from(before_birthday)
}

/// Hard age cutoff: 100 inside the bounds, 0 outside or when unknown.
pub fn age_score(
    birth_date: Option<NaiveDate>,
    min_age: Option<u32>,
    max_age: Option<u32>,
    as_of: NaiveDate,
) -> u8 {
    if min_age.is_none() && max_age.is_none() {
        return 100;
    }

    let Some(birth_date) = birth_date else {
        return 0;
    };

    let age = i64::from(age_on(birth_date, as_of));

    if let Some(min) = min_age {
        if age < i64::from(min) {
            return 0;
        }
    }
    if let Some(max) = max_age {
        if age > i64::from(max) {
            return 0;
        }
    }

    100
}

/// Keyword-based education check.
pub fn education_score(education: &str, required: bool, level: Option<EducationLevel>) -> u8 {
    if !required {
        return 100;
    }

    let text = education.trim().to_lowercase();
    if text.is_empty() {
        return 0;
    }

    let has_higher_education = HIGHER_EDUCATION_KEYWORDS.iter().any(|k| text.contains(k));

    match level {
        Some(level) => {
            if level_keywords(level).iter().any(|k| text.contains(k)) {
                100
            } else if has_higher_education {
                70
            } else {
                30
            }
        }
        None if has_higher_education => 100,
        None => 30,
    }
}

/// Technical skill coverage plus an optional-skill bonus.
///
/// Returns `(score, matched, missing)` where `matched` lists matched required
/// skills followed by matched optional skills, and `missing` lists required
/// skills the candidate lacks. Labels are reported as the position spells them.
pub fn technical_skills_score(
    candidate: &[String],
    required: &[String],
    optional: &[String],
) -> (u8, Vec<String>, Vec<String>) {
    let have: Vec<String> = candidate.iter().map(|s| normalize(s)).collect();
    let has = |skill: &String| have.contains(&normalize(skill));

    let (matched_required, missing_required): (Vec<String>, Vec<String>) =
        required.iter().cloned().partition(|s| has(s));
    let matched_optional: Vec<String> = optional.iter().filter(|s| has(*s)).cloned().collect();

    let base = usize::from(ratio_percent(matched_required.len(), required.len()));
    let bonus = if optional.is_empty() {
        0
    } else {
        matched_optional.len() * OPTIONAL_SKILL_BONUS / optional.len()
    };
    let score = (base + bonus).min(100) as u8;

    let mut matched = matched_required;
    matched.extend(matched_optional);
    (score, matched, missing_required)
}

/// Share of required soft skills the candidate lists. Returns `(score, matched)`.
pub fn soft_skills_score(candidate: &[String], required: &[String]) -> (u8, Vec<String>) {
    if required.is_empty() {
        return (100, Vec::new());
    }

    let have: Vec<String> = candidate.iter().map(|s| normalize(s)).collect();
    let matched: Vec<String> = required
        .iter()
        .filter(|s| have.contains(&normalize(s)))
        .cloned()
        .collect();

    (ratio_percent(matched.len(), required.len()), matched)
}

fn language_names_match(required: &str, candidate: &str) -> bool {
    !required.is_empty()
        && !candidate.is_empty()
        && (candidate.contains(required) || required.contains(candidate))
}

/// Share of required languages held at or above the minimum level.
///
/// Returns `(score, matched)` where each matched entry reads `"English (B2)"`.
pub fn language_score(
    candidate: &[LanguageSkill],
    required: &[LanguageRequirement],
) -> (u8, Vec<String>) {
    if required.is_empty() {
        return (100, Vec::new());
    }

    let mut matched = Vec::new();
    for requirement in required {
        let wanted = normalize(&requirement.language);
        let satisfied = candidate.iter().find(|skill| {
            language_names_match(&wanted, &normalize(&skill.language))
                && skill
                    .level
                    .parse::<LanguageLevel>()
                    .is_ok_and(|level| level >= requirement.min_level)
        });
        if let Some(skill) = satisfied {
            matched.push(format!("{} ({})", requirement.language, skill.level.trim()));
        }
    }

    (ratio_percent(matched.len(), required.len()), matched)
}

/// Combine subscores into the overall score.
///
/// Weighted sum rounded half-up, then halved if the age cutoff failed, then
/// cut to 70% if required education scored below 50. Both penalties truncate.
pub fn overall_score(scores: &SubScores, criteria: &PositionCriteria) -> u8 {
    let w = &criteria.weights;
    let weighted = u64::from(scores.experience) * u64::from(w.experience)
        + u64::from(scores.technical) * u64::from(w.technical)
        + u64::from(scores.soft_skills) * u64::from(w.soft_skills)
        + u64::from(scores.language) * u64::from(w.languages);
    let mut overall = (weighted + 50) / 100;

    if scores.age == 0 {
        overall = overall * 5 / 10;
    }
    if criteria.education_required && scores.education < 50 {
        overall = overall * 7 / 10;
    }

    overall.min(100) as u8
}

/// Score a candidate against a position as of today (UTC).
pub fn score(candidate: &CandidateProfile, criteria: &PositionCriteria) -> MatchResult {
    score_at(candidate, criteria, Utc::now().date_naive())
}

/// Score a candidate against a position, evaluating age as of `as_of`.
pub fn score_at(
    candidate: &CandidateProfile,
    criteria: &PositionCriteria,
    as_of: NaiveDate,
) -> MatchResult {
    let (technical, matched_technical, missing_technical) = technical_skills_score(
        &candidate.technical_skills,
        &criteria.required_technical_skills,
        &criteria.optional_technical_skills,
    );
    let (soft_skills, matched_soft) =
        soft_skills_score(&candidate.soft_skills, &criteria.required_soft_skills);
    let (language, matched_languages) =
        language_score(&candidate.languages, &criteria.required_languages);

    let scores = SubScores {
        experience: experience_score(
            candidate.experience_years,
            criteria.min_experience_years,
            criteria.max_experience_years,
        ),
        technical,
        soft_skills,
        language,
        education: education_score(
            &candidate.education,
            criteria.education_required,
            criteria.education_level,
        ),
        age: age_score(candidate.birth_date, criteria.min_age, criteria.max_age, as_of),
    };

    MatchResult {
        overall_score: overall_score(&scores, criteria),
        scores,
        matched_technical_skills: matched_technical,
        missing_technical_skills: missing_technical,
        matched_soft_skills: matched_soft,
        matched_languages,
        ai_summary: candidate.ai_summary.clone(),
        ai_strengths: candidate.ai_strengths.clone(),
        ai_weaknesses: candidate.ai_weaknesses.clone(),
        assessment: None,
        invited: false,
        rejected: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScoringWeights;

    fn skills(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn experience_below_minimum_is_proportional() {
        assert_eq!(experience_score(2, 4, None), 50);
        assert_eq!(experience_score(1, 3, Some(5)), 33);
        assert_eq!(experience_score(0, 0, None), 100);
    }

    #[test]
    fn experience_within_range_is_full() {
        assert_eq!(experience_score(5, 3, Some(10)), 100);
        assert_eq!(experience_score(10, 3, Some(10)), 100);
        assert_eq!(experience_score(30, 3, None), 100);
    }

    #[test]
    fn experience_above_maximum_is_penalised_and_floored() {
        assert_eq!(experience_score(12, 3, Some(10)), 90);
        assert_eq!(experience_score(14, 3, Some(10)), 80);
        assert_eq!(experience_score(40, 3, Some(10)), 80);
    }

    #[test]
    fn age_is_ignored_without_bounds() {
        assert_eq!(age_score(None, None, None, date(2024, 1, 1)), 100);
    }

    #[test]
    fn age_missing_birth_date_fails_when_bounded() {
        assert_eq!(age_score(None, Some(25), None, date(2024, 1, 1)), 0);
    }

    #[test]
    fn age_is_a_hard_cutoff() {
        let as_of = date(2024, 6, 1);
        assert_eq!(age_score(Some(date(1995, 5, 15)), Some(25), Some(45), as_of), 100);
        assert_eq!(age_score(Some(date(1974, 1, 1)), Some(25), Some(45), as_of), 0);
        assert_eq!(age_score(Some(date(2002, 1, 1)), Some(25), None, as_of), 0);
    }

    #[test]
    fn age_counts_birthday_boundary() {
        assert_eq!(age_on(date(2000, 6, 2), date(2024, 6, 1)), 23);
        assert_eq!(age_on(date(2000, 6, 1), date(2024, 6, 1)), 24);
    }

    #[test]
    fn education_levels() {
        use EducationLevel::*;
        assert_eq!(education_score("", false, None), 100);
        assert_eq!(education_score("  ", true, None), 0);
        assert_eq!(education_score("MSU, Bachelor of CS", true, Some(Bachelor)), 100);
        assert_eq!(education_score("МГУ, Бакалавр, 2017", true, Some(Bachelor)), 100);
        assert_eq!(education_score("State University, PhD", true, Some(Master)), 70);
        assert_eq!(education_score("Coding bootcamp", true, Some(Master)), 30);
        assert_eq!(education_score("Высшее техническое", true, None), 100);
        assert_eq!(education_score("Self-taught", true, None), 30);
    }

    #[test]
    fn technical_skills_without_optional_match() {
        let (score, matched, missing) = technical_skills_score(
            &skills(&["Python", "FastAPI"]),
            &skills(&["Python", "FastAPI", "PostgreSQL"]),
            &skills(&["Docker"]),
        );
        assert_eq!(score, 66);
        assert_eq!(matched, skills(&["Python", "FastAPI"]));
        assert_eq!(missing, skills(&["PostgreSQL"]));
    }

    #[test]
    fn technical_skills_bonus_is_capped() {
        let (score, matched, missing) = technical_skills_score(
            &skills(&["python ", "fastapi", "postgresql", "Docker"]),
            &skills(&["Python", "FastAPI", "PostgreSQL"]),
            &skills(&["Docker", "Kubernetes"]),
        );
        assert_eq!(score, 100);
        assert_eq!(matched, skills(&["Python", "FastAPI", "PostgreSQL", "Docker"]));
        assert!(missing.is_empty());

        let (score, _, _) = technical_skills_score(
            &skills(&["Python", "Docker"]),
            &skills(&["Python", "Go"]),
            &skills(&["Docker", "Kubernetes"]),
        );
        assert_eq!(score, 60);
    }

    #[test]
    fn technical_skills_empty_requirements() {
        let (score, matched, missing) = technical_skills_score(&skills(&["Rust"]), &[], &[]);
        assert_eq!(score, 100);
        assert!(matched.is_empty());
        assert!(missing.is_empty());
    }

    #[test]
    fn soft_skills_share() {
        let (score, matched) = soft_skills_score(
            &skills(&["Teamwork"]),
            &skills(&["teamwork", "Leadership", "Communication"]),
        );
        assert_eq!(score, 33);
        assert_eq!(matched, skills(&["teamwork"]));
        assert_eq!(soft_skills_score(&[], &[]), (100, vec![]));
    }

    #[test]
    fn language_levels_and_substring_names() {
        let candidate = vec![
            LanguageSkill {
                language: "English (US)".into(),
                level: "B2".into(),
            },
            LanguageSkill {
                language: "German".into(),
                level: "fluent".into(),
            },
        ];
        let required = vec![
            LanguageRequirement {
                language: "english".into(),
                min_level: LanguageLevel::B1,
            },
            LanguageRequirement {
                language: "German".into(),
                min_level: LanguageLevel::A1,
            },
        ];
        let (score, matched) = language_score(&candidate, &required);
        assert_eq!(score, 50);
        assert_eq!(matched, vec!["english (B2)".to_string()]);

        let strict = vec![LanguageRequirement {
            language: "English".into(),
            min_level: LanguageLevel::C1,
        }];
        assert_eq!(language_score(&candidate, &strict).0, 0);
        assert_eq!(language_score(&candidate, &[]).0, 100);
    }

    fn unconstrained_criteria() -> PositionCriteria {
        PositionCriteria {
            weights: ScoringWeights {
                experience: 30,
                technical: 40,
                soft_skills: 20,
                languages: 10,
            },
            ..Default::default()
        }
    }

    #[test]
    fn overall_is_rounded_weighted_sum() {
        let scores = SubScores {
            experience: 50,
            technical: 66,
            soft_skills: 100,
            language: 100,
            education: 100,
            age: 100,
        };
        assert_eq!(overall_score(&scores, &unconstrained_criteria()), 71);
    }

    #[test]
    fn overall_applies_age_then_education_penalty() {
        let mut criteria = unconstrained_criteria();
        criteria.education_required = true;
        let scores = SubScores {
            experience: 100,
            technical: 100,
            soft_skills: 100,
            language: 100,
            education: 30,
            age: 0,
        };
        // 100 -> 50 -> 35
        assert_eq!(overall_score(&scores, &criteria), 35);
    }

    #[test]
    fn overall_is_clamped_when_weights_overshoot() {
        let mut criteria = unconstrained_criteria();
        criteria.weights.technical = 200;
        let scores = SubScores {
            experience: 100,
            technical: 100,
            soft_skills: 100,
            language: 100,
            education: 100,
            age: 100,
        };
        assert_eq!(overall_score(&scores, &criteria), 100);
    }

    #[test]
    fn score_end_to_end() {
        let candidate = CandidateProfile {
            technical_skills: skills(&["Python", "FastAPI"]),
            soft_skills: skills(&["Teamwork"]),
            languages: vec![LanguageSkill {
                language: "English".into(),
                level: "B2".into(),
            }],
            experience_years: 2,
            ..Default::default()
        };
        let criteria = PositionCriteria {
            required_technical_skills: skills(&["Python", "FastAPI", "PostgreSQL"]),
            optional_technical_skills: skills(&["Docker"]),
            required_soft_skills: skills(&["Teamwork"]),
            required_languages: vec![LanguageRequirement {
                language: "English".into(),
                min_level: LanguageLevel::B1,
            }],
            min_experience_years: 4,
            ..unconstrained_criteria()
        };

        let result = score_at(&candidate, &criteria, date(2024, 6, 1));
        assert_eq!(result.scores.experience, 50);
        assert_eq!(result.scores.technical, 66);
        assert_eq!(result.scores.soft_skills, 100);
        assert_eq!(result.scores.language, 100);
        assert_eq!(result.scores.age, 100);
        assert_eq!(result.scores.education, 100);
        assert_eq!(result.overall_score, 71);
        assert_eq!(result.missing_technical_skills, skills(&["PostgreSQL"]));
        assert!(!result.invited && !result.rejected);
    }

    #[test]
    fn age_cutoff_halves_overall() {
        let candidate = CandidateProfile {
            birth_date: Some(date(1974, 3, 1)),
            ..Default::default()
        };
        let mut criteria = unconstrained_criteria();
        let as_of = date(2024, 6, 1);

        let unbounded = score_at(&candidate, &criteria, as_of);
        criteria.min_age = Some(25);
        criteria.max_age = Some(45);
        let bounded = score_at(&candidate, &criteria, as_of);

        assert_eq!(bounded.scores.age, 0);
        assert_eq!(unbounded.overall_score, 100);
        assert_eq!(bounded.overall_score, unbounded.overall_score / 2);
    }

    #[test]
    fn score_is_deterministic() {
        let candidate = CandidateProfile {
            technical_skills: skills(&["Rust", "Tokio", "Postgres"]),
            soft_skills: skills(&["Mentoring"]),
            experience_years: 12,
            birth_date: Some(date(1990, 2, 28)),
            education: "University, Master of Science".into(),
            ..Default::default()
        };
        let criteria = PositionCriteria {
            required_technical_skills: skills(&["Rust", "Kafka"]),
            optional_technical_skills: skills(&["Tokio"]),
            required_soft_skills: skills(&["Mentoring", "Ownership"]),
            min_experience_years: 3,
            max_experience_years: Some(10),
            min_age: Some(21),
            education_required: true,
            education_level: Some(EducationLevel::Bachelor),
            ..unconstrained_criteria()
        };
        let as_of = date(2024, 6, 1);
        assert_eq!(
            score_at(&candidate, &criteria, as_of),
            score_at(&candidate, &criteria, as_of)
        );
    }
}
