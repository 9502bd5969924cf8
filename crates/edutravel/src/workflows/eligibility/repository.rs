use serde::Serialize;

use super::domain::{
    AcademicProfile, AcademicRecord, Document, EducationHistoryEntry, EligibilityResult, Program,
    ProgramId, TestScore,
};
use super::evaluation::summarize;
use crate::identity::UserId;
pub use crate::storage::RepositoryError;

/// Storage for a user's academic data so the service can be exercised in isolation.
pub trait AcademicRepository: Send + Sync {
    /// Profile plus history, scores, and documents, or `None` when no profile exists.
    fn load_record(&self, user_id: &UserId) -> Result<Option<AcademicRecord>, RepositoryError>;
    fn fetch_profile(&self, user_id: &UserId) -> Result<Option<AcademicProfile>, RepositoryError>;
    fn save_profile(&self, profile: AcademicProfile) -> Result<(), RepositoryError>;
    fn insert_education_entry(
        &self,
        user_id: &UserId,
        entry: EducationHistoryEntry,
    ) -> Result<(), RepositoryError>;
    /// Returns `false` when the entry does not belong to the user.
    fn delete_education_entry(
        &self,
        user_id: &UserId,
        entry_id: &str,
    ) -> Result<bool, RepositoryError>;
    fn insert_test_score(&self, user_id: &UserId, score: TestScore) -> Result<(), RepositoryError>;
    fn delete_test_score(&self, user_id: &UserId, score_id: &str) -> Result<bool, RepositoryError>;
    fn insert_document(&self, user_id: &UserId, document: Document)
        -> Result<(), RepositoryError>;
    fn set_document_verified(
        &self,
        user_id: &UserId,
        document_id: &str,
        verified: bool,
    ) -> Result<bool, RepositoryError>;
}

/// Read-only view of the program catalog during evaluation.
pub trait ProgramCatalog: Send + Sync {
    fn active_programs(&self) -> Result<Vec<Program>, RepositoryError>;
}

/// Durable home of derived eligibility rows.
///
/// The service serializes recomputes per user, so implementations need not order
/// concurrent writers for the same user.
pub trait EligibilityStore: Send + Sync {
    /// Replace the whole row for (user, program).
    fn upsert(&self, result: EligibilityResult) -> Result<(), RepositoryError>;
    /// Drop the user's rows for every program not in `keep`.
    fn prune(&self, user_id: &UserId, keep: &[ProgramId]) -> Result<(), RepositoryError>;
    fn results_for(&self, user_id: &UserId) -> Result<Vec<EligibilityResult>, RepositoryError>;
}

/// Sanitized representation of a stored result for API responses.
#[derive(Debug, Clone, Serialize)]
pub struct EligibilityView {
    pub program_id: ProgramId,
    pub score: u32,
    pub max_score: u32,
    pub is_eligible: bool,
    pub rationale: String,
    pub breakdown: Vec<super::domain::RequirementCheck>,
}

impl From<EligibilityResult> for EligibilityView {
    fn from(result: EligibilityResult) -> Self {
        Self {
            rationale: summarize(&result.breakdown),
            program_id: result.program_id,
            score: result.score,
            max_score: result.max_score,
            is_eligible: result.is_eligible,
            breakdown: result.breakdown,
        }
    }
}
