//! FarmTrace Ledger - a tamper-evident, proof-of-work sealed audit trail for
//! agricultural supply-chain events
//!
//! # Architecture
//!
//! The crate is organized into logical modules:
//!
//! ## Core Ledger
//! - [`blockchain`] - Hashed blocks, the ledger, integrity validation and queries
//! - [`transaction`] - Event payloads, canonical digest encoding, intake checks
//!
//! ## Consensus
//! - [`miner`] - Proof-of-work sealing
//!
//! ## State Management
//! - [`persistence`] - JSON file, SQLite and in-memory snapshot stores
//! - [`recorder`] - Typed recording surface used by the supply-chain workflows
//!
//! ## Integration
//! - `api` - Read-only HTTP audit endpoints (feature `api`)
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Core Ledger
// ============================================================================
pub mod blockchain;
pub mod transaction;

// ============================================================================
// Consensus & Mining
// ============================================================================
pub mod miner;

// ============================================================================
// State Management
// ============================================================================
pub mod persistence;
pub mod recorder;

// ============================================================================
// Integration
// ============================================================================
#[cfg(feature = "api")]
pub mod api;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod config;
pub mod error;

pub use blockchain::{HashedBlock, Ledger};
pub use error::{LedgerError, Result};
pub use recorder::{Recorder, SharedLedger};
pub use transaction::{EventKind, LedgerEvent, Transaction};
