use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::identity::UserId;

/// Identifier wrapper for catalog programs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProgramId(pub String);

impl fmt::Display for ProgramId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordered education levels; declaration order is rank order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EducationLevel {
    HighSchool,
    Foundation,
    Diploma,
    Undergraduate,
    PostgraduateDiploma,
    Masters,
    Doctorate,
}

impl EducationLevel {
    pub const fn ordered() -> [Self; 7] {
        [
            Self::HighSchool,
            Self::Foundation,
            Self::Diploma,
            Self::Undergraduate,
            Self::PostgraduateDiploma,
            Self::Masters,
            Self::Doctorate,
        ]
    }

    pub const fn code(self) -> &'static str {
        match self {
            Self::HighSchool => "HIGH_SCHOOL",
            Self::Foundation => "FOUNDATION",
            Self::Diploma => "DIPLOMA",
            Self::Undergraduate => "UNDERGRADUATE",
            Self::PostgraduateDiploma => "POSTGRADUATE_DIPLOMA",
            Self::Masters => "MASTERS",
            Self::Doctorate => "DOCTORATE",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::HighSchool => "High School",
            Self::Foundation => "Foundation",
            Self::Diploma => "Diploma",
            Self::Undergraduate => "Undergraduate",
            Self::PostgraduateDiploma => "Postgraduate Diploma",
            Self::Masters => "Masters",
            Self::Doctorate => "Doctorate",
        }
    }
}

impl FromStr for EducationLevel {
    type Err = UnknownVariant;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw
            .trim()
            .to_ascii_uppercase()
            .replace(|c: char| c == ' ' || c == '-', "_");
        Self::ordered()
            .into_iter()
            .find(|level| level.code() == normalized)
            .ok_or_else(|| UnknownVariant::new("education level", raw))
    }
}

/// Standardized tests accepted by partner programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestType {
    Ielts,
    Toefl,
    Pte,
    Duolingo,
    Gre,
    Gmat,
    Sat,
}

impl TestType {
    pub const fn all() -> [Self; 7] {
        [
            Self::Ielts,
            Self::Toefl,
            Self::Pte,
            Self::Duolingo,
            Self::Gre,
            Self::Gmat,
            Self::Sat,
        ]
    }

    pub const fn code(self) -> &'static str {
        match self {
            Self::Ielts => "IELTS",
            Self::Toefl => "TOEFL",
            Self::Pte => "PTE",
            Self::Duolingo => "DUOLINGO",
            Self::Gre => "GRE",
            Self::Gmat => "GMAT",
            Self::Sat => "SAT",
        }
    }
}

impl FromStr for TestType {
    type Err = UnknownVariant;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_uppercase();
        Self::all()
            .into_iter()
            .find(|test| test.code() == normalized)
            .ok_or_else(|| UnknownVariant::new("test type", raw))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Self-reported academic profile; exactly one per user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcademicProfile {
    pub user_id: UserId,
    pub current_education_level: Option<EducationLevel>,
    pub highest_education_level: Option<EducationLevel>,
    pub intended_education_level: Option<EducationLevel>,
    pub field_of_study: Option<String>,
    pub preferred_countries: Vec<String>,
}

impl AcademicProfile {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            current_education_level: None,
            highest_education_level: None,
            intended_education_level: None,
            field_of_study: None,
            preferred_countries: Vec::new(),
        }
    }

    pub fn apply(&mut self, patch: ProfilePatch) {
        let ProfilePatch {
            current_education_level,
            highest_education_level,
            intended_education_level,
            field_of_study,
            preferred_countries,
        } = patch;

        if let Some(level) = current_education_level {
            self.current_education_level = Some(level);
        }
        if let Some(level) = highest_education_level {
            self.highest_education_level = Some(level);
        }
        if let Some(level) = intended_education_level {
            self.intended_education_level = Some(level);
        }
        if let Some(field) = field_of_study {
            let trimmed = field.trim();
            self.field_of_study = (!trimmed.is_empty()).then(|| trimmed.to_string());
        }
        if let Some(countries) = preferred_countries {
            self.preferred_countries = countries
                .into_iter()
                .map(|country| country.trim().to_string())
                .filter(|country| !country.is_empty())
                .collect();
        }
    }
}

/// Fields a user may change on their profile. Anything else in the body is rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ProfilePatch {
    #[serde(default)]
    pub current_education_level: Option<EducationLevel>,
    #[serde(default)]
    pub highest_education_level: Option<EducationLevel>,
    #[serde(default)]
    pub intended_education_level: Option<EducationLevel>,
    #[serde(default)]
    pub field_of_study: Option<String>,
    #[serde(default)]
    pub preferred_countries: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EducationHistoryEntry {
    pub id: String,
    pub level: EducationLevel,
    pub institution: String,
    pub field_of_study: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub graduated: bool,
    pub grade: Option<String>,
}

/// Inbound shape for a new history entry; the id is assigned by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct NewEducationEntry {
    pub level: EducationLevel,
    pub institution: String,
    pub field_of_study: String,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub graduated: bool,
    #[serde(default)]
    pub grade: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestScore {
    pub id: String,
    pub test_type: TestType,
    pub sub_scores: BTreeMap<String, f32>,
    pub overall_score: f32,
    pub test_date: Option<NaiveDate>,
    pub expiry_date: Option<NaiveDate>,
}

impl TestScore {
    /// A score expiring today is still usable today.
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.expiry_date.map(|expiry| expiry < today).unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct NewTestScore {
    pub test_type: TestType,
    #[serde(default)]
    pub sub_scores: BTreeMap<String, f32>,
    pub overall_score: f32,
    #[serde(default)]
    pub test_date: Option<NaiveDate>,
    #[serde(default)]
    pub expiry_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentKind {
    Passport,
    Transcript,
    Certificate,
    TestReport,
    RecommendationLetter,
    PersonalStatement,
    Cv,
    FinancialStatement,
    Other,
}

/// Uploaded supporting document. Only administrators flip `verified`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub kind: DocumentKind,
    pub name: String,
    pub storage_key: String,
    pub verified: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct NewDocument {
    pub kind: DocumentKind,
    pub name: String,
    pub storage_key: String,
}

/// Everything the calculator reads for one user, loaded in one pass.
#[derive(Debug, Clone, PartialEq)]
pub struct AcademicRecord {
    pub profile: AcademicProfile,
    pub education_history: Vec<EducationHistoryEntry>,
    pub test_scores: Vec<TestScore>,
    pub documents: Vec<Document>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub id: ProgramId,
    pub name: String,
    pub active: bool,
    pub requirements: ProgramRequirements,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgramRequirements {
    #[serde(default)]
    pub minimum_education_level: Option<EducationLevel>,
    #[serde(default)]
    pub test_requirements: Vec<TestRequirement>,
    #[serde(default)]
    pub fields_of_study: Vec<String>,
    #[serde(default)]
    pub countries: Vec<String>,
}

/// A required requirement must carry a threshold; optional ones may check presence only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRequirement {
    pub test_type: TestType,
    pub minimum_score: Option<f32>,
    pub required: bool,
}

/// Requirement a breakdown line refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "test_type", rename_all = "snake_case")]
pub enum RequirementKind {
    EducationLevel,
    TestScore(TestType),
    FieldOfStudy,
    Country,
}

/// One sub-check outcome, kept for transparent audits of the score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementCheck {
    pub requirement: RequirementKind,
    pub met: bool,
    pub mandatory: bool,
    pub points: u32,
    pub notes: String,
}

/// Derived row, one per (user, program). Carries no timestamps so reruns compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityResult {
    pub user_id: UserId,
    pub program_id: ProgramId,
    pub score: u32,
    pub max_score: u32,
    pub is_eligible: bool,
    pub breakdown: Vec<RequirementCheck>,
}
