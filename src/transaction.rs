//! Transaction module split into payload types and the canonical digest encoding

pub mod canonical;
pub mod types;
pub mod validation;

pub use canonical::{format_timestamp, CanonicalEncode, CanonicalHasher};
pub use types::*;
pub use validation::MAX_TRANSACTION_SIZE;
