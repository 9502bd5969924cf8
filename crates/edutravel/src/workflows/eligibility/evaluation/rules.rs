use std::collections::BTreeMap;

use chrono::NaiveDate;

use super::super::domain::{
    AcademicRecord, EducationLevel, ProgramRequirements, RequirementCheck, RequirementKind,
    TestType,
};
use super::config::ScoringTable;

/// Facts derived from a user's record once per run and reused for every program.
pub(crate) struct AcademicSignals {
    pub highest_level: Option<EducationLevel>,
    pub level_source: LevelSource,
    pub best_scores: BTreeMap<TestType, f32>,
    pub expired_tests: Vec<TestType>,
    pub fields: Vec<String>,
    pub countries: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LevelSource {
    History,
    SelfReported,
}

pub(crate) fn academic_signals(record: &AcademicRecord, today: NaiveDate) -> AcademicSignals {
    let (highest_level, level_source) = if record.education_history.is_empty() {
        (
            record.profile.highest_education_level,
            LevelSource::SelfReported,
        )
    } else {
        let attained = record
            .education_history
            .iter()
            .filter(|entry| entry.graduated)
            .map(|entry| entry.level)
            .max();
        (attained, LevelSource::History)
    };

    let mut best_scores: BTreeMap<TestType, f32> = BTreeMap::new();
    let mut expired_tests = Vec::new();
    for score in &record.test_scores {
        if score.is_expired(today) {
            expired_tests.push(score.test_type);
            continue;
        }
        best_scores
            .entry(score.test_type)
            .and_modify(|best| *best = best.max(score.overall_score))
            .or_insert(score.overall_score);
    }

    let mut fields: Vec<String> = record
        .profile
        .field_of_study
        .iter()
        .chain(
            record
                .education_history
                .iter()
                .map(|entry| &entry.field_of_study),
        )
        .map(|field| normalize(field))
        .filter(|field| !field.is_empty())
        .collect();
    fields.sort();
    fields.dedup();

    let countries = record
        .profile
        .preferred_countries
        .iter()
        .map(|country| normalize(country))
        .filter(|country| !country.is_empty())
        .collect();

    AcademicSignals {
        highest_level,
        level_source,
        best_scores,
        expired_tests,
        fields,
        countries,
    }
}

pub(crate) fn score_requirements(
    signals: &AcademicSignals,
    requirements: &ProgramRequirements,
    table: &ScoringTable,
) -> (Vec<RequirementCheck>, u32, u32) {
    let mut breakdown = Vec::new();

    if let Some(minimum) = requirements.minimum_education_level {
        let met = signals
            .highest_level
            .map(|level| level >= minimum)
            .unwrap_or(false);
        let source = match signals.level_source {
            LevelSource::History => "education history",
            LevelSource::SelfReported => "self-reported profile",
        };
        let notes = match signals.highest_level {
            Some(level) if met => format!(
                "{} from {source} meets minimum {}",
                level.label(),
                minimum.label()
            ),
            Some(level) => format!(
                "{} from {source} below minimum {}",
                level.label(),
                minimum.label()
            ),
            None => format!("no attained education level; minimum {}", minimum.label()),
        };
        breakdown.push(check(
            RequirementKind::EducationLevel,
            met,
            true,
            table.education_level,
            notes,
        ));
    }

    let test_count = requirements.test_requirements.len();
    for (index, requirement) in requirements.test_requirements.iter().enumerate() {
        let points = table.test_points(index, test_count);
        let code = requirement.test_type.code();
        let best = signals.best_scores.get(&requirement.test_type).copied();
        let (met, notes) = match (best, requirement.minimum_score) {
            (Some(score), Some(minimum)) if score >= minimum => {
                (true, format!("{code} {score:.1} meets minimum {minimum:.1}"))
            }
            (Some(score), Some(minimum)) => {
                (false, format!("{code} {score:.1} below minimum {minimum:.1}"))
            }
            (Some(score), None) => (true, format!("{code} {score:.1} on file")),
            (None, _) if signals.expired_tests.contains(&requirement.test_type) => {
                (false, format!("{code} score on file has expired"))
            }
            (None, _) => (false, format!("no {code} score on file")),
        };
        breakdown.push(check(
            RequirementKind::TestScore(requirement.test_type),
            met,
            requirement.required,
            points,
            notes,
        ));
    }

    if !requirements.fields_of_study.is_empty() {
        let matched = requirements
            .fields_of_study
            .iter()
            .map(|field| normalize(field))
            .filter(|field| !field.is_empty())
            .find(|accepted| signals.fields.iter().any(|field| fields_match(field, accepted)));
        let notes = match &matched {
            Some(accepted) => format!("field of study matches '{accepted}'"),
            None => "no declared field of study matches the program".to_string(),
        };
        breakdown.push(check(
            RequirementKind::FieldOfStudy,
            matched.is_some(),
            false,
            table.field_of_study,
            notes,
        ));
    }

    if !requirements.countries.is_empty() {
        let matched = requirements
            .countries
            .iter()
            .map(|country| normalize(country))
            .find(|country| signals.countries.contains(country));
        let notes = match &matched {
            Some(country) => format!("preferred country '{country}' offered"),
            None => "no preferred country offered by the program".to_string(),
        };
        breakdown.push(check(
            RequirementKind::Country,
            matched.is_some(),
            false,
            table.country,
            notes,
        ));
    }

    let max_score = breakdown.iter().map(|line| line.points).sum::<u32>();
    let score = breakdown
        .iter()
        .filter(|line| line.met)
        .map(|line| line.points)
        .sum::<u32>();

    // Unmet lines keep their weight in `points` for max_score; zero them for the stored row.
    for line in &mut breakdown {
        if !line.met {
            line.points = 0;
        }
    }

    (breakdown, score, max_score)
}

fn check(
    requirement: RequirementKind,
    met: bool,
    mandatory: bool,
    points: u32,
    notes: String,
) -> RequirementCheck {
    RequirementCheck {
        requirement,
        met,
        mandatory,
        points,
        notes,
    }
}

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

fn fields_match(declared: &str, accepted: &str) -> bool {
    declared == accepted || declared.contains(accepted) || accepted.contains(declared)
}
