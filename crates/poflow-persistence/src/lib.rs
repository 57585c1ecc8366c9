//! poflow-persistence: Postgres-backed implementations of the core's
//! repository traits (C2/C3), plus the supplier fuzzy-match engines C3
//! depends on.
//!
//! Mirrors `chem-persistence`'s role for the teacher: the only crate that
//! knows Diesel exists.

pub mod conn;
pub mod config;
pub mod error;
pub mod fuzzy;
pub mod migrations;
pub mod persistence_service;
pub mod repo_pg;
pub mod schema;

pub use conn::ConnectionManager;
pub use config::{init_dotenv, DbConfig};
pub use persistence_service::PgPurchaseOrderRepository;
pub use poflow_domain::FuzzyEngine;
pub use repo_pg::PgWorkflowRepository;
