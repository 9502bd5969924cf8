//! Academic profile tracking and program eligibility scoring.
//!
//! The engine compares a user's education history, unexpired test scores and stated
//! preferences against each active program's requirements. Results are derived data: every
//! mutation of the inputs triggers a full recompute for that user.

pub mod domain;
pub(crate) mod evaluation;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use domain::{
    AcademicProfile, AcademicRecord, Document, DocumentKind, EducationHistoryEntry,
    EducationLevel, EligibilityResult, NewDocument, NewEducationEntry, NewTestScore,
    ProfilePatch, Program, ProgramId, ProgramRequirements, RequirementCheck, RequirementKind,
    TestRequirement, TestScore, TestType, UnknownVariant,
};
pub use evaluation::{
    summarize, EligibilityEngine, MalformedRequirement, ScoringTable, SkippedProgram,
};
pub use repository::{
    AcademicRepository, EligibilityStore, EligibilityView, ProgramCatalog, RepositoryError,
};
pub use router::eligibility_router;
pub use service::{EligibilityService, EligibilityServiceError, RecomputeSummary};
