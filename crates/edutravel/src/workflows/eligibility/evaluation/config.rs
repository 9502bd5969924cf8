use serde::{Deserialize, Serialize};

/// Points awarded per satisfied sub-check. The single source of scoring weights.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringTable {
    pub education_level: u32,
    /// Shared evenly across the test requirements a program declares.
    pub test_scores: u32,
    pub field_of_study: u32,
    pub country: u32,
}

impl Default for ScoringTable {
    fn default() -> Self {
        Self {
            education_level: 40,
            test_scores: 30,
            field_of_study: 15,
            country: 15,
        }
    }
}

impl ScoringTable {
    /// Points for the `index`-th of `count` test requirements; the remainder goes to the first.
    pub(crate) fn test_points(&self, index: usize, count: usize) -> u32 {
        if count == 0 {
            return 0;
        }
        let count = count as u32;
        let share = self.test_scores / count;
        if index == 0 {
            share + self.test_scores % count
        } else {
            share
        }
    }
}
