//! Connection manager smoke test. Requires a reachable `DATABASE_URL`;
//! skips itself otherwise, the same guard `chem-persistence`'s own
//! `connection_tests.rs` uses.

use poflow_persistence::{ConnectionManager, DbConfig};

#[tokio::test]
async fn warms_up_and_runs_a_trivial_query() {
    if std::env::var("DATABASE_URL").is_err() {
        eprintln!("DATABASE_URL not set: skipping");
        return;
    }
    let cfg = DbConfig::from_env();
    let mgr = ConnectionManager::connect(cfg.url, cfg.min_connections, cfg.max_connections)
        .await
        .expect("connection manager");
    mgr.get_client().await.expect("pool handle");
}
