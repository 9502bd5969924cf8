use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::NaiveDate;
use serde_json::Value;

use crate::identity::UserId;
use crate::workflows::eligibility::domain::{
    AcademicProfile, AcademicRecord, Document, EducationHistoryEntry, EducationLevel,
    EligibilityResult, Program, ProgramId, ProgramRequirements, TestRequirement, TestScore,
    TestType,
};
use crate::workflows::eligibility::repository::{
    AcademicRepository, EligibilityStore, ProgramCatalog, RepositoryError,
};
use crate::workflows::eligibility::{eligibility_router, EligibilityService, ScoringTable};

pub(super) fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 19).expect("valid date")
}

pub(super) fn user() -> UserId {
    UserId::new("user-ama")
}

pub(super) fn profile() -> AcademicProfile {
    AcademicProfile {
        user_id: user(),
        current_education_level: Some(EducationLevel::Undergraduate),
        highest_education_level: Some(EducationLevel::Diploma),
        intended_education_level: Some(EducationLevel::Masters),
        field_of_study: Some("Computer Science".to_string()),
        preferred_countries: vec!["Canada".to_string(), "United Kingdom".to_string()],
    }
}

pub(super) fn undergraduate_entry() -> EducationHistoryEntry {
    EducationHistoryEntry {
        id: "edu-1".to_string(),
        level: EducationLevel::Undergraduate,
        institution: "University of Ghana".to_string(),
        field_of_study: "Computer Science".to_string(),
        start_date: NaiveDate::from_ymd_opt(2019, 9, 1).expect("valid"),
        end_date: NaiveDate::from_ymd_opt(2023, 7, 31),
        graduated: true,
        grade: Some("Second Class Upper".to_string()),
    }
}

pub(super) fn ielts(overall: f32, expiry_date: Option<NaiveDate>) -> TestScore {
    let mut sub_scores = BTreeMap::new();
    sub_scores.insert("listening".to_string(), overall);
    sub_scores.insert("reading".to_string(), overall);
    TestScore {
        id: format!("ielts-{overall}"),
        test_type: TestType::Ielts,
        sub_scores,
        overall_score: overall,
        test_date: NaiveDate::from_ymd_opt(2024, 5, 10),
        expiry_date,
    }
}

pub(super) fn record() -> AcademicRecord {
    AcademicRecord {
        profile: profile(),
        education_history: vec![undergraduate_entry()],
        test_scores: vec![ielts(7.0, NaiveDate::from_ymd_opt(2027, 5, 10))],
        documents: Vec::new(),
    }
}

pub(super) fn masters_program() -> Program {
    Program {
        id: ProgramId("msc-data-science".to_string()),
        name: "MSc Data Science".to_string(),
        active: true,
        requirements: ProgramRequirements {
            minimum_education_level: Some(EducationLevel::Undergraduate),
            test_requirements: vec![TestRequirement {
                test_type: TestType::Ielts,
                minimum_score: Some(6.0),
                required: true,
            }],
            fields_of_study: vec!["computer".to_string(), "mathematics".to_string()],
            countries: vec!["canada".to_string()],
        },
    }
}

pub(super) fn foundation_program() -> Program {
    Program {
        id: ProgramId("foundation-business".to_string()),
        name: "Foundation in Business".to_string(),
        active: true,
        requirements: ProgramRequirements {
            minimum_education_level: Some(EducationLevel::HighSchool),
            test_requirements: Vec::new(),
            fields_of_study: Vec::new(),
            countries: vec!["Malaysia".to_string()],
        },
    }
}

pub(super) fn malformed_program() -> Program {
    Program {
        id: ProgramId("mba-broken".to_string()),
        name: "MBA (missing GMAT threshold)".to_string(),
        active: true,
        requirements: ProgramRequirements {
            minimum_education_level: Some(EducationLevel::Undergraduate),
            test_requirements: vec![TestRequirement {
                test_type: TestType::Gmat,
                minimum_score: None,
                required: true,
            }],
            fields_of_study: Vec::new(),
            countries: Vec::new(),
        },
    }
}

#[derive(Default)]
pub(super) struct MemoryAcademics {
    records: Mutex<HashMap<UserId, AcademicRecord>>,
}

impl MemoryAcademics {
    pub(super) fn with_record(record: AcademicRecord) -> Self {
        let academics = Self::default();
        academics
            .records
            .lock()
            .expect("academics mutex poisoned")
            .insert(record.profile.user_id.clone(), record);
        academics
    }
}

impl AcademicRepository for MemoryAcademics {
    fn load_record(&self, user_id: &UserId) -> Result<Option<AcademicRecord>, RepositoryError> {
        let guard = self.records.lock().expect("academics mutex poisoned");
        Ok(guard.get(user_id).cloned())
    }

    fn fetch_profile(&self, user_id: &UserId) -> Result<Option<AcademicProfile>, RepositoryError> {
        let guard = self.records.lock().expect("academics mutex poisoned");
        Ok(guard.get(user_id).map(|record| record.profile.clone()))
    }

    fn save_profile(&self, profile: AcademicProfile) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("academics mutex poisoned");
        match guard.get_mut(&profile.user_id) {
            Some(record) => record.profile = profile,
            None => {
                guard.insert(
                    profile.user_id.clone(),
                    AcademicRecord {
                        profile,
                        education_history: Vec::new(),
                        test_scores: Vec::new(),
                        documents: Vec::new(),
                    },
                );
            }
        }
        Ok(())
    }

    fn insert_education_entry(
        &self,
        user_id: &UserId,
        entry: EducationHistoryEntry,
    ) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("academics mutex poisoned");
        let record = guard.get_mut(user_id).ok_or(RepositoryError::NotFound)?;
        record.education_history.push(entry);
        Ok(())
    }

    fn delete_education_entry(
        &self,
        user_id: &UserId,
        entry_id: &str,
    ) -> Result<bool, RepositoryError> {
        let mut guard = self.records.lock().expect("academics mutex poisoned");
        let Some(record) = guard.get_mut(user_id) else {
            return Ok(false);
        };
        let before = record.education_history.len();
        record.education_history.retain(|entry| entry.id != entry_id);
        Ok(record.education_history.len() != before)
    }

    fn insert_test_score(&self, user_id: &UserId, score: TestScore) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("academics mutex poisoned");
        let record = guard.get_mut(user_id).ok_or(RepositoryError::NotFound)?;
        record.test_scores.push(score);
        Ok(())
    }

    fn delete_test_score(&self, user_id: &UserId, score_id: &str) -> Result<bool, RepositoryError> {
        let mut guard = self.records.lock().expect("academics mutex poisoned");
        let Some(record) = guard.get_mut(user_id) else {
            return Ok(false);
        };
        let before = record.test_scores.len();
        record.test_scores.retain(|score| score.id != score_id);
        Ok(record.test_scores.len() != before)
    }

    fn insert_document(
        &self,
        user_id: &UserId,
        document: Document,
    ) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("academics mutex poisoned");
        let record = guard.get_mut(user_id).ok_or(RepositoryError::NotFound)?;
        record.documents.push(document);
        Ok(())
    }

    fn set_document_verified(
        &self,
        user_id: &UserId,
        document_id: &str,
        verified: bool,
    ) -> Result<bool, RepositoryError> {
        let mut guard = self.records.lock().expect("academics mutex poisoned");
        let document = guard.get_mut(user_id).and_then(|record| {
            record
                .documents
                .iter_mut()
                .find(|document| document.id == document_id)
        });
        match document {
            Some(document) => {
                document.verified = verified;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[derive(Default)]
pub(super) struct MemoryCatalog {
    pub(super) programs: Mutex<Vec<Program>>,
}

impl MemoryCatalog {
    pub(super) fn with_programs(programs: Vec<Program>) -> Self {
        Self {
            programs: Mutex::new(programs),
        }
    }
}

impl ProgramCatalog for MemoryCatalog {
    fn active_programs(&self) -> Result<Vec<Program>, RepositoryError> {
        let guard = self.programs.lock().expect("catalog mutex poisoned");
        Ok(guard.iter().filter(|program| program.active).cloned().collect())
    }
}

#[derive(Default)]
pub(super) struct MemoryResults {
    rows: Mutex<BTreeMap<(UserId, ProgramId), EligibilityResult>>,
    pub(super) writes: Mutex<usize>,
}

impl MemoryResults {
    pub(super) fn rows(&self) -> Vec<EligibilityResult> {
        let guard = self.rows.lock().expect("results mutex poisoned");
        guard.values().cloned().collect()
    }

    pub(super) fn write_count(&self) -> usize {
        *self.writes.lock().expect("results mutex poisoned")
    }
}

impl EligibilityStore for MemoryResults {
    fn upsert(&self, result: EligibilityResult) -> Result<(), RepositoryError> {
        let mut guard = self.rows.lock().expect("results mutex poisoned");
        guard.insert(
            (result.user_id.clone(), result.program_id.clone()),
            result,
        );
        *self.writes.lock().expect("results mutex poisoned") += 1;
        Ok(())
    }

    fn prune(&self, user_id: &UserId, keep: &[ProgramId]) -> Result<(), RepositoryError> {
        let mut guard = self.rows.lock().expect("results mutex poisoned");
        guard.retain(|(owner, program_id), _| owner != user_id || keep.contains(program_id));
        Ok(())
    }

    fn results_for(&self, user_id: &UserId) -> Result<Vec<EligibilityResult>, RepositoryError> {
        let guard = self.rows.lock().expect("results mutex poisoned");
        Ok(guard
            .values()
            .filter(|result| &result.user_id == user_id)
            .cloned()
            .collect())
    }
}

pub(super) struct UnavailableAcademics;

impl AcademicRepository for UnavailableAcademics {
    fn load_record(&self, _user_id: &UserId) -> Result<Option<AcademicRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch_profile(
        &self,
        _user_id: &UserId,
    ) -> Result<Option<AcademicProfile>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn save_profile(&self, _profile: AcademicProfile) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn insert_education_entry(
        &self,
        _user_id: &UserId,
        _entry: EducationHistoryEntry,
    ) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn delete_education_entry(
        &self,
        _user_id: &UserId,
        _entry_id: &str,
    ) -> Result<bool, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn insert_test_score(
        &self,
        _user_id: &UserId,
        _score: TestScore,
    ) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn delete_test_score(
        &self,
        _user_id: &UserId,
        _score_id: &str,
    ) -> Result<bool, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn insert_document(
        &self,
        _user_id: &UserId,
        _document: Document,
    ) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn set_document_verified(
        &self,
        _user_id: &UserId,
        _document_id: &str,
        _verified: bool,
    ) -> Result<bool, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

pub(super) type MemoryService = EligibilityService<MemoryAcademics, MemoryCatalog, MemoryResults>;

pub(super) fn build_service(
    academics: MemoryAcademics,
    programs: Vec<Program>,
) -> (MemoryService, Arc<MemoryAcademics>, Arc<MemoryResults>) {
    let academics = Arc::new(academics);
    let catalog = Arc::new(MemoryCatalog::with_programs(programs));
    let results = Arc::new(MemoryResults::default());
    let service = EligibilityService::new(
        academics.clone(),
        catalog,
        results.clone(),
        ScoringTable::default(),
    );
    (service, academics, results)
}

pub(super) fn eligibility_router_with_service(service: MemoryService) -> axum::Router {
    eligibility_router(Arc::new(service))
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
