use serde::{Deserialize, Serialize};

use super::super::domain::{Program, ProgramId, RequirementCheck, TestType};

/// Why a program's requirement data cannot be evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
pub enum MalformedRequirement {
    #[error("required {test_type:?} requirement has no minimum score")]
    MissingThreshold { test_type: TestType },
    #[error("{test_type:?} minimum score {minimum} is not a valid threshold")]
    InvalidThreshold { test_type: TestType, minimum: f32 },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("program {program_id} skipped: {reason}")]
pub struct SkippedProgram {
    pub program_id: ProgramId,
    pub reason: MalformedRequirement,
}

pub(crate) fn validate_program(program: &Program) -> Result<(), SkippedProgram> {
    for requirement in &program.requirements.test_requirements {
        let reason = match requirement.minimum_score {
            None if requirement.required => Some(MalformedRequirement::MissingThreshold {
                test_type: requirement.test_type,
            }),
            Some(minimum) if !minimum.is_finite() || minimum < 0.0 => {
                Some(MalformedRequirement::InvalidThreshold {
                    test_type: requirement.test_type,
                    minimum,
                })
            }
            _ => None,
        };

        if let Some(reason) = reason {
            return Err(SkippedProgram {
                program_id: program.id.clone(),
                reason,
            });
        }
    }

    Ok(())
}

/// Eligible only when every mandatory sub-check passed; the score never overrides this.
pub(crate) fn decide_eligibility(breakdown: &[RequirementCheck]) -> bool {
    breakdown
        .iter()
        .filter(|line| line.mandatory)
        .all(|line| line.met)
}

pub fn summarize(breakdown: &[RequirementCheck]) -> String {
    let unmet: Vec<&str> = breakdown
        .iter()
        .filter(|line| line.mandatory && !line.met)
        .map(|line| line.notes.as_str())
        .collect();

    if unmet.is_empty() {
        "all mandatory requirements met".to_string()
    } else {
        format!("unmet mandatory requirements: {}", unmet.join("; "))
    }
}
