//! Alert rules, evaluation, and dispatch.

pub mod condition;
pub mod manager;
pub mod rule;
pub mod store;

pub use condition::{ComparisonOp, Condition};
pub use manager::{AlertManager, HandleSummary, RuleId};
pub use rule::{Evaluation, Rule};
pub use store::RuleRecord;
