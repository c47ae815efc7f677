//! Data models for zqa-ts
//!
//! - Task record and its status state machine
//! - Analysis report payload

pub mod report;
pub mod task;

pub use report::{AnalysisReport, IssueCounts};
pub use task::{InvalidTransition, StateTransition, Task, TaskId, TaskStatus};
