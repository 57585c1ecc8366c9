//! Orchestration-level configuration loaded from the environment (spec §6
//! Configuration Surface). Knobs owned by other crates — `FUZZY_MATCH_ENGINE`
//! / `FUZZY_MATCH_ROLLOUT_PERCENT` (`poflow_policies::EngineSelectionConfig`),
//! the datasource pool knobs (`poflow_persistence::DbConfig`) — are loaded
//! where they're consumed, not duplicated here. This covers the rest: the
//! dispatch mode flag and the timing knobs the Sequential Runner, Janitor,
//! and Tick Dispatcher read.

use dotenvy::dotenv;
use once_cell::sync::Lazy;
use std::env;
use std::time::Duration;

static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenv();
});

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// `SEQUENTIAL_EXECUTION` (spec §6): routes newly started workflows
    /// through the Sequential Runner instead of queue dispatch.
    pub sequential_execution: bool,
    /// `WORKFLOW_METADATA_TTL_SECONDS`, default 1800.
    pub workflow_metadata_ttl: Duration,
    /// `EXECUTION_BUDGET_MS`, default 270000 (spec §4.6 Sequential Runner).
    pub execution_budget: Duration,
    /// `TICK_PERIOD_SECONDS`, default 60 (spec §4.9 Tick Dispatcher).
    pub tick_period: Duration,
    /// `JANITOR_STUCK_THRESHOLD_SECONDS`, default 600 (spec §4.8 Janitor).
    pub janitor_stuck_threshold: Duration,
}

impl OrchestratorConfig {
    pub fn from_env() -> Self {
        Lazy::force(&DOTENV_LOADED);

        let sequential_execution = env::var("SEQUENTIAL_EXECUTION")
            .ok()
            .map(|v| v.eq_ignore_ascii_case("on") || v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let workflow_metadata_ttl = Duration::from_secs(
            env::var("WORKFLOW_METADATA_TTL_SECONDS").ok().and_then(|v| v.parse().ok()).unwrap_or(1800),
        );

        let execution_budget = Duration::from_millis(
            env::var("EXECUTION_BUDGET_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(270_000),
        );

        let tick_period =
            Duration::from_secs(env::var("TICK_PERIOD_SECONDS").ok().and_then(|v| v.parse().ok()).unwrap_or(60));

        let janitor_stuck_threshold = Duration::from_secs(
            env::var("JANITOR_STUCK_THRESHOLD_SECONDS").ok().and_then(|v| v.parse().ok()).unwrap_or(600),
        );

        Self { sequential_execution, workflow_metadata_ttl, execution_budget, tick_period, janitor_stuck_threshold }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        env::remove_var("SEQUENTIAL_EXECUTION");
        env::remove_var("WORKFLOW_METADATA_TTL_SECONDS");
        env::remove_var("EXECUTION_BUDGET_MS");
        env::remove_var("TICK_PERIOD_SECONDS");
        env::remove_var("JANITOR_STUCK_THRESHOLD_SECONDS");

        let cfg = OrchestratorConfig::from_env();
        assert!(!cfg.sequential_execution);
        assert_eq!(cfg.workflow_metadata_ttl, Duration::from_secs(1800));
        assert_eq!(cfg.execution_budget, Duration::from_millis(270_000));
        assert_eq!(cfg.tick_period, Duration::from_secs(60));
        assert_eq!(cfg.janitor_stuck_threshold, Duration::from_secs(600));
    }
}
