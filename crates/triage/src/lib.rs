//! Alert triage engine for infrastructure incidents.
//!
//! Alerts enter through a bounded queue and are processed by worker loops
//! running a fixed pipeline: gather context, analyze logs and metrics,
//! retrieve similar past incidents, plan a remediation, and gate it
//! through a safety validator. Results persist behind [`store::TriageStore`]
//! and are queryable and reviewable over the HTTP API in [`server`].
//!
//! Nothing here executes remediations. The engine's terminal output is a
//! decision: auto-approved, requires approval, or rejected.

pub mod alert;
pub mod analyzer;
pub mod config;
pub mod detector;
pub mod error;
pub mod gather;
pub mod observe;
pub mod pipeline;
pub mod planner;
pub mod queue;
pub mod retriever;
pub mod server;
pub mod state;
pub mod store;
pub mod synthetic;
pub mod validator;
pub mod worker;

pub use alert::{AlertEvent, Severity};
pub use config::TriageConfig;
pub use error::{Result, TriageError};
pub use pipeline::TriagePipeline;
pub use state::{Decision, TriageResult, TriageStatus};
