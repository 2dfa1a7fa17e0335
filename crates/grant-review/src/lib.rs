//! Review and due-diligence orchestration for grant application evaluation.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
