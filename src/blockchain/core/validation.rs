use crate::error::{LedgerError, Result};

use super::chain::{HashedBlock, Ledger, GENESIS_PREVIOUS_HASH};

/// Walk `chain` and report the first block that no longer matches its stored
/// digest or no longer links to its predecessor. Read-only; nothing is
/// repaired.
pub fn validate_chain(chain: &[HashedBlock]) -> Result<()> {
    let genesis = match chain.first() {
        Some(b) => b,
        None => return Err(LedgerError::integrity(0, "chain has no genesis block")),
    };

    if genesis.index != 0 {
        return Err(LedgerError::integrity(
            genesis.index,
            "first block is not at index 0",
        ));
    }
    if genesis.previous_hash != GENESIS_PREVIOUS_HASH {
        return Err(LedgerError::integrity(
            0,
            "genesis previous hash is not the sentinel",
        ));
    }

    for (position, pair) in chain.windows(2).enumerate() {
        let (previous, current) = (&pair[0], &pair[1]);
        let expected_index = position as u64 + 1;

        if current.index != expected_index {
            return Err(LedgerError::integrity(
                expected_index,
                format!("stored index is {}", current.index),
            ));
        }

        let recalculated = current.calculate_hash();
        if recalculated != current.hash {
            return Err(LedgerError::integrity(
                expected_index,
                format!(
                    "hash mismatch: stored {}, recalculated {}",
                    current.hash, recalculated
                ),
            ));
        }

        if current.previous_hash != previous.hash {
            return Err(LedgerError::integrity(
                expected_index,
                format!(
                    "previous hash {} does not match block {} hash {}",
                    current.previous_hash, previous.index, previous.hash
                ),
            ));
        }
    }

    Ok(())
}

impl Ledger {
    /// Full integrity check, naming the offending block on failure.
    pub fn validate(&self) -> Result<()> {
        validate_chain(self.full_chain())
    }

    /// `true` when every block still hashes to its stored digest and links to
    /// its predecessor.
    pub fn is_valid(&self) -> bool {
        match self.validate() {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "ledger.integrity_violation");
                false
            }
        }
    }
}
