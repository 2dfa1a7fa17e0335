//! Track-aware score aggregation shared by the review and due-diligence workflows.

mod aggregate;
mod import;
mod rubric;

pub use aggregate::{aggregate, ensure_complete, CategoryTotal, ScoreBreakdown, ScoringError};
pub use import::{RubricImportError, RubricImporter};
pub use rubric::{Criterion, Rubric, RubricCategory, RubricConfig, RubricError};
