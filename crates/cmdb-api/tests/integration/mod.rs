//! Integration test modules.

pub mod auth_tests;
pub mod common;
pub mod health_tests;
pub mod migration_tests;
