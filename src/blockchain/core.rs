// core.rs splits ledger responsibilities into submodules.
pub mod chain;
pub mod query;
pub mod validation;

pub use chain::*;
pub use query::*;
pub use validation::*;
