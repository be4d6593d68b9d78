use crate::config::{Config, MAX_DIFFICULTY};
use crate::error::{LedgerError, Result};
use crate::miner::mine_block;
use crate::persistence::{open_store, InMemoryPersistence, Persistence};
use crate::transaction::{now_utc, CanonicalEncode, CanonicalHasher, LedgerEvent, Transaction};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

/// `previous_hash` of the genesis block.
pub const GENESIS_PREVIOUS_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

pub const GENESIS_MESSAGE: &str = "FarmTrace Jaipur Blockchain Genesis Block";

/// A sealed, self-hashing batch of transactions linked to its predecessor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HashedBlock {
    pub index: u64,
    pub sealed_at: DateTime<Utc>,
    pub transactions: Vec<Transaction>,
    pub previous_hash: String,
    pub nonce: u64,
    pub hash: String,
}

impl HashedBlock {
    /// Build an unsealed candidate. `sealed_at` is stamped here, right before
    /// the miner starts searching.
    pub fn new(index: u64, previous_hash: String, transactions: Vec<Transaction>) -> Self {
        let mut block = HashedBlock {
            index,
            sealed_at: now_utc(),
            transactions,
            previous_hash,
            nonce: 0,
            hash: String::new(),
        };
        block.hash = block.calculate_hash();
        block
    }

    /// Mined genesis block carrying the single genesis marker transaction.
    pub fn genesis(difficulty: usize) -> Self {
        let marker = Transaction::new(LedgerEvent::Genesis {
            message: GENESIS_MESSAGE.to_string(),
            created_at: now_utc(),
        });
        HashedBlock::new(0, GENESIS_PREVIOUS_HASH.to_string(), vec![marker]).seal(difficulty)
    }

    /// Digest state covering every field except `nonce`, which is encoded
    /// last. The miner reuses it across attempts.
    pub fn prefix_hasher(&self) -> CanonicalHasher {
        let mut h = CanonicalHasher::new();
        h.u64(self.index);
        h.str(&self.previous_hash);
        h.timestamp(&self.sealed_at);
        h.u64(self.transactions.len() as u64);
        for tx in &self.transactions {
            tx.encode(&mut h);
        }
        h
    }

    pub fn hash_with_nonce(prefix: &CanonicalHasher, nonce: u64) -> String {
        let mut h = prefix.clone();
        h.u64(nonce);
        h.finalize_hex()
    }

    /// Recompute the digest from the block's current fields.
    pub fn calculate_hash(&self) -> String {
        Self::hash_with_nonce(&self.prefix_hasher(), self.nonce)
    }

    /// Search for a nonce meeting `difficulty`. CPU-bound and uninterruptible.
    pub fn seal(self, difficulty: usize) -> Self {
        mine_block(self, difficulty)
    }
}

/// The append-only chain of sealed blocks plus the buffer of transactions
/// waiting to be sealed.
pub struct Ledger {
    chain: Vec<HashedBlock>,
    pending: Vec<Transaction>,
    difficulty: usize,
    persistence: Box<dyn Persistence>,
}

impl Ledger {
    /// Hydrate from `persistence`, or mine and store a fresh genesis block
    /// when no durable record exists yet.
    ///
    /// A record that exists but cannot be parsed fails with
    /// [`LedgerError::LoadCorruption`]; it is never replaced by a new chain.
    pub fn open(difficulty: usize, persistence: Box<dyn Persistence>) -> Result<Self> {
        if difficulty == 0 || difficulty > MAX_DIFFICULTY {
            return Err(LedgerError::ConfigError(format!(
                "difficulty must be between 1 and {}, got {}",
                MAX_DIFFICULTY, difficulty
            )));
        }

        match persistence.load_chain()? {
            Some(chain) => {
                if chain.is_empty() {
                    return Err(LedgerError::LoadCorruption(format!(
                        "{} holds an empty chain",
                        persistence.describe()
                    )));
                }

                let ledger = Ledger {
                    chain,
                    pending: Vec::new(),
                    difficulty,
                    persistence,
                };

                match ledger.validate() {
                    Ok(()) => info!(
                        blocks = ledger.chain.len(),
                        store = %ledger.persistence.describe(),
                        "ledger.hydrated"
                    ),
                    Err(e) => warn!(
                        store = %ledger.persistence.describe(),
                        error = %e,
                        "ledger.hydrated_with_integrity_violation"
                    ),
                }
                Ok(ledger)
            }
            None => {
                let genesis = HashedBlock::genesis(difficulty);
                persistence.save_chain(std::slice::from_ref(&genesis))?;
                info!(
                    hash = %genesis.hash,
                    store = %persistence.describe(),
                    "ledger.genesis_created"
                );
                Ok(Ledger {
                    chain: vec![genesis],
                    pending: Vec::new(),
                    difficulty,
                    persistence,
                })
            }
        }
    }

    /// Open the store named by `config` and hydrate from it.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let store = open_store(&config.storage)?;
        Self::open(config.ledger.difficulty, store)
    }

    /// A ledger backed only by process memory.
    pub fn in_memory(difficulty: usize) -> Result<Self> {
        Self::open(difficulty, Box::new(InMemoryPersistence::new()))
    }

    /// Check `event`, stamp it with a fresh id and intake time and buffer it
    /// for the next block.
    ///
    /// Events failing [`LedgerEvent::validate`] are rejected with
    /// [`LedgerError::InvalidEvent`] and never reach the buffer. Among other
    /// things this keeps non-finite numbers, which JSON cannot represent, out
    /// of every stored snapshot.
    pub fn add_transaction(&mut self, event: LedgerEvent) -> Result<Transaction> {
        event.validate()?;
        let tx = Transaction::new(event);
        self.pending.push(tx.clone());
        Ok(tx)
    }

    /// Drop a still-pending transaction by id, returning it if it was found.
    /// Sealed transactions cannot be removed.
    pub fn discard_pending(&mut self, tx_id: &str) -> Option<Transaction> {
        let position = self.pending.iter().position(|tx| tx.tx_id == tx_id)?;
        Some(self.pending.remove(position))
    }

    /// Seal every buffered transaction into one new block and persist the
    /// whole chain.
    ///
    /// Returns `Ok(None)` without doing any work when nothing is pending. On a
    /// persistence failure the new block is discarded and the buffered
    /// transactions stay pending, so the call can be retried.
    pub fn mine_pending(&mut self) -> Result<Option<HashedBlock>> {
        if self.pending.is_empty() {
            return Ok(None);
        }

        let previous_hash = self
            .chain
            .last()
            .map(|b| b.hash.clone())
            .unwrap_or_else(|| GENESIS_PREVIOUS_HASH.to_string());
        let candidate =
            HashedBlock::new(self.chain.len() as u64, previous_hash, self.pending.clone());
        let block = candidate.seal(self.difficulty);

        self.chain.push(block);
        if let Err(e) = self.persistence.save_chain(&self.chain) {
            self.chain.pop();
            error!(
                pending = self.pending.len(),
                error = %e,
                "ledger.commit_failed"
            );
            return Err(e);
        }
        self.pending.clear();

        let block = self.chain.last().cloned();
        if let Some(b) = &block {
            info!(
                index = b.index,
                hash = %b.hash,
                nonce = b.nonce,
                transactions = b.transactions.len(),
                "ledger.block_sealed"
            );
        }
        Ok(block)
    }

    /// The whole chain, for external audit.
    pub fn full_chain(&self) -> &[HashedBlock] {
        &self.chain
    }

    pub fn latest_block(&self) -> Option<&HashedBlock> {
        self.chain.last()
    }

    pub fn pending(&self) -> &[Transaction] {
        &self.pending
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    pub fn difficulty(&self) -> usize {
        self.difficulty
    }
}
