//! poflow-core: the orchestration engine (C5) and the trait seams the
//! persistence, adapters, and infra crates implement against.
//!
//! Mirrors `chem-core`'s role for the teacher: the engine, its error model,
//! and the contracts (`StepDefinition`/`EventStore`/`FlowRepository` there;
//! `StageProcessor`/`ProgressPublisher`/`WorkflowMetadataStore`/`Queue`/
//! `WorkflowRepository` here) live in one crate so adapters and infra can
//! each depend on it without depending on each other.

pub mod errors;
pub mod kv;
pub mod orchestrator;
pub mod progress_fabric;
pub mod queue;
pub mod repo;
pub mod stage;

pub use errors::{ErrorClass, WorkflowError};
pub use kv::WorkflowMetadataStore;
pub use orchestrator::Orchestrator;
pub use progress_fabric::ProgressPublisher;
pub use queue::{Queue, QueueJob};
pub use repo::{PurchaseOrderRepository, WorkflowRepository};
pub use stage::{ExecutionMode, Job, StageContext, StageOutcome, StageProcessor};
