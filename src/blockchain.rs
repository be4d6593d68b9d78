// Thin re-export module: implementation is in `blockchain/core.rs`, split into
// the chain itself, integrity validation and read-only queries.

pub mod core;
pub use core::*;
