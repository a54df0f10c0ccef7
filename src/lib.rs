//! # dumpload
//!
//! A resumable bulk loader for SQL and CSV dump files:
//! - Splits source files into row-addressable chunks grouped into engines
//! - Encodes rows into key-value pairs and streams them into engine writers
//! - Checkpoints delivered progress so interrupted runs resume
//! - Holds off every writer while a disk quota pass imports large engines
//! - Verifies imported tables against the checksum of what was delivered
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Restore Controller                       │
//! │          (tables → engines → chunks, quota checker)          │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                     Chunk Planner                            │
//! │        (regions, row id reservations, engine packing)        │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ per chunk
//!          ┌────────────┴────────────┐
//!          ▼                         ▼
//!   ┌─────────────┐   batches  ┌─────────────┐
//!   │ encode_loop │ ─────────► │deliver_loop │ ──► SaveCheckpoint
//!   │ (RowParser) │            │ (quota lock)│
//!   └─────────────┘            └──────┬──────┘
//!                                     │
//!                                     ▼
//!                             ┌─────────────┐
//!                             │   Backend   │
//!                             │  (engines)  │
//!                             └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod concurrency;
pub mod source;
pub mod schema;
pub mod kv;
pub mod checkpoint;
pub mod planner;
pub mod pipeline;
pub mod backend;
pub mod validate;
pub mod restore;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{LoadError, Result};
pub use config::Config;
pub use restore::Controller;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of dumpload
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
