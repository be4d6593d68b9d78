//! Read paths over the sealed chain. None of these mine or touch the store.

use crate::transaction::{EventKind, Transaction};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::chain::Ledger;

/// A sealed transaction together with where it sits in the chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotatedTransaction {
    #[serde(flatten)]
    pub transaction: Transaction,
    pub block_index: u64,
    pub block_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainStats {
    pub total_blocks: usize,
    pub total_transactions: usize,
    pub is_valid: bool,
    pub last_block_hash: String,
    pub pending_transactions: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verification {
    pub is_valid: bool,
    pub stats: ChainStats,
}

impl Ledger {
    /// Every sealed transaction that references `batch_code`, in chain order,
    /// annotated with its block's index, hash and seal time.
    pub fn transactions_for_batch(&self, batch_code: &str) -> Vec<AnnotatedTransaction> {
        self.full_chain()
            .iter()
            .flat_map(|block| {
                block
                    .transactions
                    .iter()
                    .filter(|tx| tx.batch_code() == Some(batch_code))
                    .map(move |tx| AnnotatedTransaction {
                        transaction: tx.clone(),
                        block_index: block.index,
                        block_hash: block.hash.clone(),
                        block_timestamp: Some(block.sealed_at),
                    })
            })
            .collect()
    }

    /// Every sealed transaction of `kind`, in chain order.
    pub fn transactions_by_type(&self, kind: EventKind) -> Vec<AnnotatedTransaction> {
        self.full_chain()
            .iter()
            .flat_map(|block| {
                block
                    .transactions
                    .iter()
                    .filter(|tx| tx.kind() == kind)
                    .map(move |tx| AnnotatedTransaction {
                        transaction: tx.clone(),
                        block_index: block.index,
                        block_hash: block.hash.clone(),
                        block_timestamp: None,
                    })
            })
            .collect()
    }

    pub fn total_transactions(&self) -> usize {
        self.full_chain()
            .iter()
            .map(|block| block.transactions.len())
            .sum()
    }

    pub fn stats(&self) -> ChainStats {
        ChainStats {
            total_blocks: self.len(),
            total_transactions: self.total_transactions(),
            is_valid: self.is_valid(),
            last_block_hash: self
                .latest_block()
                .map(|b| b.hash.clone())
                .unwrap_or_default(),
            pending_transactions: self.pending().len(),
        }
    }

    pub fn verify(&self) -> Verification {
        let stats = self.stats();
        Verification {
            is_valid: stats.is_valid,
            stats,
        }
    }
}
