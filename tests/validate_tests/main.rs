//! Tests for the pre-import checks

#[path = "../common/mod.rs"]
mod common;

mod schema_check_tests;
