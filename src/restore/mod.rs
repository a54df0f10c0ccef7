//! Restore Module
//!
//! The driver on top of the pipeline: tables → engines → chunks.
//!
//! ## Responsibilities
//! - Plan tables that have no checkpoint yet
//! - Restore pending chunks under table/region/io concurrency limits
//! - Close, import and clean up engines; import the index engine last
//! - Verify imported tables against their local checksum
//! - Keep other tables going when one fails, and summarize failures
//! - Enforce the local disk quota while engines are being written

mod controller;
mod summary;
mod table;

pub use controller::{large_engines, Clock, Controller};
pub use summary::{ErrorSummaries, ErrorSummary};
pub use table::TableRestore;
