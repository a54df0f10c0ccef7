//! Tests for source discovery, parsing and region splitting

#[path = "../common/mod.rs"]
mod common;

mod csv_tests;
mod region_tests;
mod sql_tests;
