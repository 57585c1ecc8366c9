//! Root crate: the workspace's top-level demo binary. Mirrors the
//! teacher's own split between a root `main-core` binary and its `chem-cli`
//! crate — this binary is the Postgres-backed counterpart to
//! `poflow-cli`'s always-runnable in-memory demo.
//!
//! There is no library surface here; everything the pipeline needs lives in
//! the `poflow-*` crates. This file exists only so `cargo doc`/IDE tooling
//! has a crate root to attach to alongside `main.rs`.
