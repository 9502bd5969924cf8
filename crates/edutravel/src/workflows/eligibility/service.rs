use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::domain::{
    AcademicProfile, Document, EducationHistoryEntry, EligibilityResult, NewDocument,
    NewEducationEntry, NewTestScore, ProfilePatch, ProgramId, TestScore,
};
use super::evaluation::{EligibilityEngine, ScoringTable, SkippedProgram};
use super::repository::{AcademicRepository, EligibilityStore, ProgramCatalog, RepositoryError};
use crate::error::ErrorKind;
use crate::identity::{Caller, UserId};

/// Outcome of one recompute pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecomputeSummary {
    pub updated: Vec<ProgramId>,
    pub skipped: Vec<ProgramId>,
}

/// Service composing the academic repository, program catalog, result store and scoring engine.
///
/// Every mutation writes first and then recomputes, so a stored result never reflects an
/// older version of the record. Writes and recomputes for one user run one at a time; other
/// users proceed in parallel.
pub struct EligibilityService<A, C, S> {
    academics: Arc<A>,
    catalog: Arc<C>,
    store: Arc<S>,
    engine: Arc<EligibilityEngine>,
    user_locks: Mutex<HashMap<UserId, Arc<Mutex<()>>>>,
}

static RECORD_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_record_id(prefix: &str) -> String {
    let id = RECORD_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{id:06}")
}

impl<A, C, S> EligibilityService<A, C, S>
where
    A: AcademicRepository + 'static,
    C: ProgramCatalog + 'static,
    S: EligibilityStore + 'static,
{
    pub fn new(academics: Arc<A>, catalog: Arc<C>, store: Arc<S>, table: ScoringTable) -> Self {
        Self {
            academics,
            catalog,
            store,
            engine: Arc::new(EligibilityEngine::new(table)),
            user_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Runs `work` while holding the user's lock.
    fn for_user<T>(&self, user_id: &UserId, work: impl FnOnce() -> T) -> T {
        let lock = {
            let mut locks = self
                .user_locks
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(user_id.clone()).or_default())
        };
        let _serialized = lock.lock().unwrap_or_else(PoisonError::into_inner);
        work()
    }

    /// Re-evaluate every active program for the user and persist one row per program.
    pub fn recompute(
        &self,
        user_id: &UserId,
        today: NaiveDate,
    ) -> Result<RecomputeSummary, EligibilityServiceError> {
        self.for_user(user_id, || self.recompute_locked(user_id, today))
    }

    fn recompute_locked(
        &self,
        user_id: &UserId,
        today: NaiveDate,
    ) -> Result<RecomputeSummary, EligibilityServiceError> {
        let record = self
            .academics
            .load_record(user_id)?
            .ok_or_else(|| EligibilityServiceError::ProfileNotFound(user_id.clone()))?;

        let programs = self.catalog.active_programs()?;
        let active = programs.iter().filter(|program| program.active);
        let (results, skipped) = self.engine.evaluate_all(&record, active, today);

        for SkippedProgram { program_id, reason } in &skipped {
            warn!(user_id = %user_id, program_id = %program_id, %reason, "skipping malformed program");
        }

        let mut updated = Vec::with_capacity(results.len());
        for result in results {
            updated.push(result.program_id.clone());
            self.store.upsert(result)?;
        }
        self.store.prune(user_id, &updated)?;

        let skipped: Vec<ProgramId> = skipped.into_iter().map(|skip| skip.program_id).collect();
        info!(
            user_id = %user_id,
            updated = updated.len(),
            skipped = skipped.len(),
            "eligibility recomputed"
        );

        Ok(RecomputeSummary { updated, skipped })
    }

    pub fn recompute_now(
        &self,
        user_id: &UserId,
    ) -> Result<RecomputeSummary, EligibilityServiceError> {
        self.recompute(user_id, Utc::now().date_naive())
    }

    /// Stored results ranked eligible-first, then by score, so close matches surface early.
    pub fn results(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<EligibilityResult>, EligibilityServiceError> {
        let mut results = self.store.results_for(user_id)?;
        results.sort_by(rank);
        Ok(results)
    }

    /// Fetch the profile, creating the default one on first use.
    pub fn ensure_profile(
        &self,
        user_id: &UserId,
    ) -> Result<AcademicProfile, EligibilityServiceError> {
        if let Some(profile) = self.academics.fetch_profile(user_id)? {
            return Ok(profile);
        }

        let profile = AcademicProfile::new(user_id.clone());
        self.academics.save_profile(profile.clone())?;
        debug!(user_id = %user_id, "created default academic profile");
        Ok(profile)
    }

    pub fn update_profile(
        &self,
        user_id: &UserId,
        patch: ProfilePatch,
        today: NaiveDate,
    ) -> Result<(AcademicProfile, RecomputeSummary), EligibilityServiceError> {
        self.for_user(user_id, || -> Result<_, EligibilityServiceError> {
            let mut profile = self.ensure_profile(user_id)?;
            profile.apply(patch);
            self.academics.save_profile(profile.clone())?;

            let summary = self.recompute_locked(user_id, today)?;
            Ok((profile, summary))
        })
    }

    pub fn add_education_entry(
        &self,
        user_id: &UserId,
        entry: NewEducationEntry,
        today: NaiveDate,
    ) -> Result<(EducationHistoryEntry, RecomputeSummary), EligibilityServiceError> {
        let NewEducationEntry {
            level,
            institution,
            field_of_study,
            start_date,
            end_date,
            graduated,
            grade,
        } = entry;

        let institution = institution.trim().to_string();
        if institution.is_empty() {
            return Err(EligibilityServiceError::Validation(
                "institution must not be empty".to_string(),
            ));
        }
        if end_date.map(|end| end < start_date).unwrap_or(false) {
            return Err(EligibilityServiceError::Validation(
                "end date precedes start date".to_string(),
            ));
        }

        self.ensure_profile(user_id)?;
        let entry = EducationHistoryEntry {
            id: next_record_id("edu"),
            level,
            institution,
            field_of_study: field_of_study.trim().to_string(),
            start_date,
            end_date,
            graduated,
            grade,
        };
        self.for_user(user_id, || -> Result<_, EligibilityServiceError> {
            self.academics
                .insert_education_entry(user_id, entry.clone())?;

            let summary = self.recompute_locked(user_id, today)?;
            Ok((entry, summary))
        })
    }

    pub fn remove_education_entry(
        &self,
        user_id: &UserId,
        entry_id: &str,
        today: NaiveDate,
    ) -> Result<RecomputeSummary, EligibilityServiceError> {
        self.for_user(user_id, || -> Result<_, EligibilityServiceError> {
            if !self.academics.delete_education_entry(user_id, entry_id)? {
                return Err(EligibilityServiceError::RecordNotFound(format!(
                    "education history entry {entry_id}"
                )));
            }
            self.recompute_locked(user_id, today)
        })
    }

    pub fn add_test_score(
        &self,
        user_id: &UserId,
        score: NewTestScore,
        today: NaiveDate,
    ) -> Result<(TestScore, RecomputeSummary), EligibilityServiceError> {
        let NewTestScore {
            test_type,
            sub_scores,
            overall_score,
            test_date,
            expiry_date,
        } = score;

        let valid = |value: f32| value.is_finite() && value >= 0.0;
        if !valid(overall_score) || !sub_scores.values().all(|value| valid(*value)) {
            return Err(EligibilityServiceError::Validation(
                "scores must be non-negative numbers".to_string(),
            ));
        }

        self.ensure_profile(user_id)?;
        let score = TestScore {
            id: next_record_id("score"),
            test_type,
            sub_scores,
            overall_score,
            test_date,
            expiry_date,
        };
        self.for_user(user_id, || -> Result<_, EligibilityServiceError> {
            self.academics.insert_test_score(user_id, score.clone())?;

            let summary = self.recompute_locked(user_id, today)?;
            Ok((score, summary))
        })
    }

    pub fn remove_test_score(
        &self,
        user_id: &UserId,
        score_id: &str,
        today: NaiveDate,
    ) -> Result<RecomputeSummary, EligibilityServiceError> {
        self.for_user(user_id, || -> Result<_, EligibilityServiceError> {
            if !self.academics.delete_test_score(user_id, score_id)? {
                return Err(EligibilityServiceError::RecordNotFound(format!(
                    "test score {score_id}"
                )));
            }
            self.recompute_locked(user_id, today)
        })
    }

    pub fn add_document(
        &self,
        user_id: &UserId,
        document: NewDocument,
        today: NaiveDate,
    ) -> Result<(Document, RecomputeSummary), EligibilityServiceError> {
        let NewDocument {
            kind,
            name,
            storage_key,
        } = document;

        if storage_key.trim().is_empty() {
            return Err(EligibilityServiceError::Validation(
                "storage key must not be empty".to_string(),
            ));
        }

        self.ensure_profile(user_id)?;
        let document = Document {
            id: next_record_id("doc"),
            kind,
            name: name.trim().to_string(),
            storage_key,
            verified: false,
        };
        self.for_user(user_id, || -> Result<_, EligibilityServiceError> {
            self.academics.insert_document(user_id, document.clone())?;

            let summary = self.recompute_locked(user_id, today)?;
            Ok((document, summary))
        })
    }

    /// Administrators only.
    pub fn verify_document(
        &self,
        caller: &Caller,
        user_id: &UserId,
        document_id: &str,
        today: NaiveDate,
    ) -> Result<RecomputeSummary, EligibilityServiceError> {
        if !caller.is_admin() {
            return Err(EligibilityServiceError::Forbidden);
        }

        self.for_user(user_id, || -> Result<_, EligibilityServiceError> {
            if !self
                .academics
                .set_document_verified(user_id, document_id, true)?
            {
                return Err(EligibilityServiceError::RecordNotFound(format!(
                    "document {document_id}"
                )));
            }
            info!(user_id = %user_id, document_id, verified_by = %caller.user_id, "document verified");

            self.recompute_locked(user_id, today)
        })
    }

    pub fn scoring_table(&self) -> &ScoringTable {
        self.engine.table()
    }
}

fn rank(left: &EligibilityResult, right: &EligibilityResult) -> CmpOrdering {
    right
        .is_eligible
        .cmp(&left.is_eligible)
        .then_with(|| right.score.cmp(&left.score))
        .then_with(|| left.program_id.cmp(&right.program_id))
}

/// Error raised by the eligibility service.
#[derive(Debug, thiserror::Error)]
pub enum EligibilityServiceError {
    #[error("profile not found")]
    ProfileNotFound(UserId),
    #[error("{0} not found")]
    RecordNotFound(String),
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("administrator role required")]
    Forbidden,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl EligibilityServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EligibilityServiceError::ProfileNotFound(_)
            | EligibilityServiceError::RecordNotFound(_)
            | EligibilityServiceError::Repository(RepositoryError::NotFound) => ErrorKind::NotFound,
            EligibilityServiceError::Validation(_) => ErrorKind::ValidationError,
            EligibilityServiceError::Forbidden => ErrorKind::Forbidden,
            EligibilityServiceError::Repository(RepositoryError::Conflict) => {
                ErrorKind::ConflictError
            }
            EligibilityServiceError::Repository(RepositoryError::Unavailable(_)) => {
                ErrorKind::Internal
            }
        }
    }
}
