//! poflow-infra: the in-process KV/Progress Fabric (C1), queue (C4/C9), and
//! the three scheduling components (C6 Sequential Runner, C7 Janitor, C8
//! Tick Dispatcher) built on `poflow_core`'s trait seams. Every concrete
//! type here is an in-memory stand-in for infrastructure a real deployment
//! would run externally (Redis, SQS, a cron-scheduled job) — swapping any
//! one of them out means implementing the matching `poflow_core` trait, not
//! touching the orchestrator or stage processors.

pub mod config;
pub mod janitor;
pub mod kv_progress;
pub mod queue;
pub mod sequential_runner;
pub mod tick_dispatcher;
pub mod upload_source;

pub use config::OrchestratorConfig;
pub use janitor::{Janitor, JanitorReport};
pub use kv_progress::InMemoryKvProgressFabric;
pub use queue::InMemoryQueue;
pub use sequential_runner::{SequentialRunSummary, SequentialRunner};
pub use tick_dispatcher::{TickDispatcher, TickReport};
pub use upload_source::{FakeUploadSource, PendingUpload, UploadSource};
