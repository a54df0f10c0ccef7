//! Tests for key encoding, row encoding, checksums and column mapping

#[path = "../common/mod.rs"]
mod common;

mod checksum_tests;
