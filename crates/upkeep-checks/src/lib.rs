//! upkeep-checks - the validation suite runner
//!
//! Provides:
//! - a registry of named checks, each wrapping one external tool
//! - the aggregate `all` check, iterating the same registry
//! - the `self` check, proving registry, aggregate body and CI workflows agree

pub mod consistency;
pub mod error;
pub mod fakes;
pub mod registry;
pub mod runner;
pub mod stage;
pub mod suite;
pub mod workflow;

// Re-export key types
pub use consistency::{ConsistencyReport, ConsistencyViolation};
pub use error::{Result, SuiteError};
pub use registry::{CheckEntry, CheckKind, CheckRegistry, AGGREGATE_CHECK, SELF_CHECK};
pub use runner::{OutputMode, ProcessExecutor, StageResult, ToolExecutor};
pub use stage::{BuiltinCheck, StageConfig};
pub use suite::CheckSuite;
pub use workflow::{JobRef, WorkflowReferences};
