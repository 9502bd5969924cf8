pub mod eligibility;
pub mod payments;
