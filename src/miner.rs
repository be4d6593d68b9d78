//! Proof-of-work sealing.
//!
//! The search is synchronous and CPU-bound: it runs on the caller's thread
//! until a nonce is found and cannot be interrupted part way. Expected work
//! is `16^difficulty` hash attempts, so difficulty must stay low.

use crate::blockchain::HashedBlock;
use std::time::Instant;

/// `true` when `hash` starts with `difficulty` `'0'` hex digits.
pub fn meets_difficulty(hash: &str, difficulty: usize) -> bool {
    hash.len() >= difficulty && hash.bytes().take(difficulty).all(|b| b == b'0')
}

/// Seal `block`: count `nonce` up from 0 until the block digest meets
/// `difficulty`, then store that digest as the block's `hash`. Every other
/// field is left untouched.
pub fn mine_block(mut block: HashedBlock, difficulty: usize) -> HashedBlock {
    let started = Instant::now();
    let prefix = block.prefix_hasher();

    let mut nonce: u64 = 0;
    let hash = loop {
        let candidate = HashedBlock::hash_with_nonce(&prefix, nonce);
        if meets_difficulty(&candidate, difficulty) {
            break candidate;
        }
        nonce = nonce.wrapping_add(1);
    };

    block.nonce = nonce;
    block.hash = hash;

    tracing::debug!(
        index = block.index,
        attempts = nonce + 1,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "miner.sealed"
    );
    block
}
