//! The Connection Manager (C2): a warmed-up, staleness-checked wrapper
//! around an r2d2 Postgres pool.
//!
//! Builds the pool the way the teacher's `pg::build_pool` does (min/max
//! validated, migrations run on first checkout), then layers the warmup and
//! retry contract spec §4.2 asks for on top — the teacher's own pool has
//! neither, since chemflow's event log tolerates a cold first query. Every
//! blocking Diesel call is pushed onto `spawn_blocking`: r2d2/Diesel give no
//! async story of their own.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use diesel::connection::SimpleConnection;
use diesel::pg::PgConnection;
use diesel::r2d2::{self, ConnectionManager as DieselConnectionManager};
use diesel::{OptionalExtension, RunQueryDsl};
use log::{info, warn};
use poflow_core::WorkflowError;
use tokio::sync::Mutex;
use tokio::time::sleep;

use crate::error::is_retryable_message;
use crate::migrations::run_pending_migrations;

pub type PgPool = r2d2::Pool<DieselConnectionManager<PgConnection>>;
pub type PooledConn = r2d2::PooledConnection<DieselConnectionManager<PgConnection>>;

const STALE_AFTER: Duration = Duration::from_secs(5 * 60);
const WARMUP_WAIT: Duration = Duration::from_millis(1000);
const MAX_RETRIES: u32 = 5;
const BASE_BACKOFF_MS: u64 = 100;
const MAX_BACKOFF: Duration = Duration::from_secs(3);

struct PoolState {
    pool: PgPool,
    last_verified: Instant,
}

/// Serializes refreshes (`tokio::sync::Mutex`) so concurrent callers await
/// the same in-flight warmup rather than racing to rebuild the pool (spec
/// §4.2 "concurrent callers await the in-flight refresh").
pub struct ConnectionManager {
    state: Mutex<PoolState>,
    ready: AtomicBool,
    database_url: String,
    min_connections: u32,
    max_connections: u32,
}

impl ConnectionManager {
    pub async fn connect(database_url: String, min_connections: u32, max_connections: u32) -> Result<Self, WorkflowError> {
        let pool = Self::build_and_warm(&database_url, min_connections, max_connections).await?;
        Ok(Self {
            state: Mutex::new(PoolState { pool, last_verified: Instant::now() }),
            ready: AtomicBool::new(true),
            database_url,
            min_connections,
            max_connections,
        })
    }

    async fn build_and_warm(database_url: &str, min: u32, max: u32) -> Result<PgPool, WorkflowError> {
        let url = database_url.to_string();
        let pool = tokio::task::spawn_blocking(move || -> Result<PgPool, WorkflowError> {
            let validated_min = min.max(1).min(max.max(1));
            let manager = DieselConnectionManager::<PgConnection>::new(&url);
            let pool = r2d2::Pool::builder()
                .min_idle(Some(validated_min))
                .max_size(max.max(1))
                .build(manager)
                .map_err(|e| WorkflowError::TransientConnection(format!("pool build: {e}")))?;
            let mut conn = pool
                .get()
                .map_err(|e| WorkflowError::TransientConnection(format!("pool get for migrations: {e}")))?;
            run_pending_migrations(&mut conn)?;
            Ok(pool)
        })
        .await
        .map_err(|e| WorkflowError::Internal(format!("pool build task panicked: {e}")))??;

        // Warmup protocol (spec §4.2): wait for the engine to settle, then
        // run a phase-1 trivial query and a phase-2 model-level lookup that
        // tolerates not-found.
        sleep(WARMUP_WAIT).await;

        let verify_pool = pool.clone();
        tokio::task::spawn_blocking(move || -> Result<(), WorkflowError> {
            let mut conn = verify_pool
                .get()
                .map_err(|e| WorkflowError::TransientConnection(format!("pool get for warmup: {e}")))?;
            diesel::sql_query("SELECT 1")
                .execute(&mut conn)
                .map_err(crate::error::from_diesel)?;
            use crate::schema::workflows::dsl::*;
            let _ = workflows
                .select(id)
                .first::<String>(&mut conn)
                .optional()
                .map_err(crate::error::from_diesel)?;
            Ok(())
        })
        .await
        .map_err(|e| WorkflowError::Internal(format!("warmup task panicked: {e}")))??;

        info!("connection pool warmed up");
        Ok(pool)
    }

    /// Returns a pool handle, rebuilding first if the pool is stale.
    pub async fn get_client(&self) -> Result<PgPool, WorkflowError> {
        self.refresh_if_stale().await?;
        let state = self.state.lock().await;
        Ok(state.pool.clone())
    }

    /// Tears down and rebuilds the pool if its last-verified age exceeds the
    /// staleness threshold. Serialized: a refresh in progress is awaited by
    /// every other caller rather than triggering a second rebuild.
    pub async fn refresh_if_stale(&self) -> Result<(), WorkflowError> {
        let mut state = self.state.lock().await;
        if state.last_verified.elapsed() < STALE_AFTER && self.ready.load(Ordering::SeqCst) {
            return Ok(());
        }
        warn!("connection pool stale, rebuilding");
        let pool = Self::build_and_warm(&self.database_url, self.min_connections, self.max_connections).await?;
        state.pool = pool;
        state.last_verified = Instant::now();
        self.ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Runs a blocking Diesel operation with retry/backoff on transient
    /// errors (spec §4.2: 100ms × 2^n, capped at 3s, up to 5 attempts).
    pub async fn with_retry<F, T>(&self, op: F) -> Result<T, WorkflowError>
    where
        F: Fn(&mut PgConnection) -> Result<T, WorkflowError> + Send + Sync + 'static,
        T: Send + 'static,
    {
        let op = std::sync::Arc::new(op);
        let mut attempt = 0u32;
        loop {
            let pool = self.get_client().await?;
            let op = op.clone();
            let result = tokio::task::spawn_blocking(move || -> Result<T, WorkflowError> {
                let mut conn = pool
                    .get()
                    .map_err(|e| WorkflowError::TransientConnection(format!("pool get: {e}")))?;
                op(&mut conn)
            })
            .await
            .map_err(|e| WorkflowError::Internal(format!("blocking task panicked: {e}")))?;

            match result {
                Ok(v) => return Ok(v),
                Err(e) if is_retryable(&e) && attempt < MAX_RETRIES => {
                    let delay = (BASE_BACKOFF_MS * 2u64.pow(attempt)).min(MAX_BACKOFF.as_millis() as u64);
                    warn!("retryable error (attempt {}/{MAX_RETRIES}): {e}, retrying in {delay}ms", attempt + 1);
                    sleep(Duration::from_millis(delay)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn is_retryable(e: &WorkflowError) -> bool {
    match e {
        WorkflowError::TransientConnection(_) => true,
        WorkflowError::Internal(msg) => is_retryable_message(msg),
        _ => false,
    }
}
