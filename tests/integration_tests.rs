//! Integration tests for sqlsage.
//!
//! The pipeline runs end to end against the mock LLM client and an
//! in-memory SQLite database or a scripted warehouse, so no network is
//! needed. Postgres tests additionally need DATABASE_URL and skip otherwise.
//!
//! Run with: `cargo test --test integration_tests`

mod integration;
