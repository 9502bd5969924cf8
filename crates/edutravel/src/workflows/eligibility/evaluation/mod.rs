mod config;
mod policy;
mod rules;

pub use config::ScoringTable;
pub use policy::{summarize, MalformedRequirement, SkippedProgram};

use chrono::NaiveDate;

use super::domain::{AcademicRecord, EligibilityResult, Program};
use policy::{decide_eligibility, validate_program};
use rules::{academic_signals, score_requirements, AcademicSignals};

/// Stateless calculator that applies the scoring table to a user's record.
pub struct EligibilityEngine {
    table: ScoringTable,
}

impl EligibilityEngine {
    pub fn new(table: ScoringTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &ScoringTable {
        &self.table
    }

    /// Evaluate every program against one record. Malformed programs are reported, not scored.
    pub fn evaluate_all<'a>(
        &self,
        record: &AcademicRecord,
        programs: impl IntoIterator<Item = &'a Program>,
        today: NaiveDate,
    ) -> (Vec<EligibilityResult>, Vec<SkippedProgram>) {
        let signals = academic_signals(record, today);
        let mut results = Vec::new();
        let mut skipped = Vec::new();

        for program in programs {
            match self.evaluate_with(&signals, record, program) {
                Ok(result) => results.push(result),
                Err(skip) => skipped.push(skip),
            }
        }

        (results, skipped)
    }

    pub fn evaluate(
        &self,
        record: &AcademicRecord,
        program: &Program,
        today: NaiveDate,
    ) -> Result<EligibilityResult, SkippedProgram> {
        let signals = academic_signals(record, today);
        self.evaluate_with(&signals, record, program)
    }

    fn evaluate_with(
        &self,
        signals: &AcademicSignals,
        record: &AcademicRecord,
        program: &Program,
    ) -> Result<EligibilityResult, SkippedProgram> {
        validate_program(program)?;

        let (breakdown, score, max_score) =
            score_requirements(signals, &program.requirements, &self.table);
        let is_eligible = decide_eligibility(&breakdown);

        Ok(EligibilityResult {
            user_id: record.profile.user_id.clone(),
            program_id: program.id.clone(),
            score,
            max_score,
            is_eligible,
            breakdown,
        })
    }
}
