//! Integration tests for sqlsage.

pub mod config_test;
pub mod pipeline_test;
pub mod postgres_test;
pub mod warehouse_test;
