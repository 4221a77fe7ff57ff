// Copyright 2021. The Sesame Project
//
// Redistribution and use in source and binary forms, with or without modification, are permitted provided that the
// following conditions are met:
//
// 1. Redistributions of source code must retain the above copyright notice, this list of conditions and the following
// disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright notice, this list of conditions and the
// following disclaimer in the documentation and/or other materials provided with the distribution.
//
// 3. Neither the name of the copyright holder nor the names of its contributors may be used to endorse or promote
// products derived from this software without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES,
// INCLUDING, BUT NOT LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
// DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
// SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR
// SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY,
// WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE
// USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

//! Bookkeeping for blocks that cannot be committed yet.
//!
//! A received header waits here until either its ancestor arrives or its relevant coin additions
//! and removals are resolved. Pending successors of a missing ancestor are tracked per previous
//! hash so that committing a block can immediately release its children, in arrival order. The
//! cache also owns the sync-scoped state (header skeleton, proof hashes and per-height receive
//! signals) which is reset at the start of every sync run.

use crate::{
    blocks::{BlockRecord, HeaderBlock, ProofHashTriple, TransactionsFilter},
    util::watch::Watch,
};
use sesame_common_types::types::HeaderHash;
use std::{
    collections::HashMap,
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

/// Committed blocks this far below the tip have their cache entries evicted in steady state.
pub const MAX_CACHED_BLOCK_AGE: u32 = 100;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Block cache read lock error: {0}")]
    ReadLock(String),
    #[error("Block cache write lock error: {0}")]
    WriteLock(String),
}

/// A block awaiting commitment, together with everything needed to replay it through the header
/// handler.
#[derive(Debug, Clone)]
pub struct CachedBlock {
    pub block_record: BlockRecord,
    pub header_block: HeaderBlock,
    pub transactions_filter: TransactionsFilter,
}

#[derive(Debug, Default)]
struct CacheInner {
    cached_blocks: HashMap<HeaderHash, CachedBlock>,
    // Successors per missing ancestor, in arrival order
    future_block_hashes: HashMap<HeaderHash, Vec<HeaderHash>>,
    header_hashes: Vec<HeaderHash>,
    header_hashes_error: bool,
    proof_hashes: Vec<ProofHashTriple>,
    potential_blocks_received: HashMap<u32, Watch<bool>>,
    potential_header_hashes: HashMap<u32, HeaderHash>,
}

/// Shared handle to the block cache. All methods take short, non-suspending critical sections.
#[derive(Debug, Clone, Default)]
pub struct BlockCache {
    inner: Arc<RwLock<CacheInner>>,
}

impl BlockCache {
    pub fn new() -> Self {
        Default::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, CacheInner>, CacheError> {
        self.inner.read().map_err(|e| CacheError::ReadLock(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, CacheInner>, CacheError> {
        self.inner.write().map_err(|e| CacheError::WriteLock(e.to_string()))
    }

    pub fn insert_block(&self, hash: HeaderHash, block: CachedBlock) -> Result<(), CacheError> {
        self.write()?.cached_blocks.insert(hash, block);
        Ok(())
    }

    pub fn get_block(&self, hash: &HeaderHash) -> Result<Option<CachedBlock>, CacheError> {
        Ok(self.read()?.cached_blocks.get(hash).cloned())
    }

    pub fn contains_block(&self, hash: &HeaderHash) -> Result<bool, CacheError> {
        Ok(self.read()?.cached_blocks.contains_key(hash))
    }

    pub fn cached_blocks(&self) -> Result<HashMap<HeaderHash, CachedBlock>, CacheError> {
        Ok(self.read()?.cached_blocks.clone())
    }

    /// Record that `next` is waiting for the currently missing block `prev`.
    pub fn add_future_successor(&self, prev: HeaderHash, next: HeaderHash) -> Result<(), CacheError> {
        let mut lock = self.write()?;
        let successors = lock.future_block_hashes.entry(prev).or_default();
        if !successors.contains(&next) {
            successors.push(next);
        }
        Ok(())
    }

    /// Remove and return the cached successors of a block that has just been committed.
    pub fn take_successors(&self, hash: &HeaderHash) -> Result<Vec<CachedBlock>, CacheError> {
        let mut lock = self.write()?;
        let successors = lock.future_block_hashes.remove(hash).unwrap_or_default();
        Ok(successors
            .into_iter()
            .filter_map(|next| lock.cached_blocks.remove(&next))
            .collect())
    }

    pub fn future_block_hashes(&self) -> Result<HashMap<HeaderHash, Vec<HeaderHash>>, CacheError> {
        Ok(self.read()?.future_block_hashes.clone())
    }

    /// Evict cached entries that have fallen too far behind the committed tip.
    pub fn evict_stale(&self, tip_height: u32) -> Result<(), CacheError> {
        self.write()?
            .cached_blocks
            .retain(|_, cached| tip_height.saturating_sub(cached.block_record.height) <= MAX_CACHED_BLOCK_AGE);
        Ok(())
    }

    /// Reset all sync-scoped state. Called at the start of every sync run.
    pub fn clear_sync_state(&self) -> Result<(), CacheError> {
        let mut lock = self.write()?;
        lock.header_hashes.clear();
        lock.header_hashes_error = false;
        lock.proof_hashes.clear();
        lock.potential_blocks_received.clear();
        lock.potential_header_hashes.clear();
        Ok(())
    }

    pub fn set_header_hashes(&self, hashes: Vec<HeaderHash>) -> Result<(), CacheError> {
        self.write()?.header_hashes = hashes;
        Ok(())
    }

    pub fn header_hashes(&self) -> Result<Vec<HeaderHash>, CacheError> {
        Ok(self.read()?.header_hashes.clone())
    }

    pub fn header_hash_at(&self, height: u32) -> Result<Option<HeaderHash>, CacheError> {
        Ok(self.read()?.header_hashes.get(height as usize).copied())
    }

    pub fn header_hashes_len(&self) -> Result<usize, CacheError> {
        Ok(self.read()?.header_hashes.len())
    }

    pub fn set_header_hashes_error(&self) -> Result<(), CacheError> {
        self.write()?.header_hashes_error = true;
        Ok(())
    }

    pub fn header_hashes_error(&self) -> Result<bool, CacheError> {
        Ok(self.read()?.header_hashes_error)
    }

    pub fn set_proof_hashes(&self, proof_hashes: Vec<ProofHashTriple>) -> Result<(), CacheError> {
        self.write()?.proof_hashes = proof_hashes;
        Ok(())
    }

    pub fn proof_hashes(&self) -> Result<Vec<ProofHashTriple>, CacheError> {
        Ok(self.read()?.proof_hashes.clone())
    }

    pub fn proof_hashes_len(&self) -> Result<usize, CacheError> {
        Ok(self.read()?.proof_hashes.len())
    }

    /// Create a fresh receive signal for every height up to and including the sync target.
    pub fn init_block_signals(&self, tip_height: u32) -> Result<(), CacheError> {
        let mut lock = self.write()?;
        for height in 0..=tip_height {
            lock.potential_blocks_received.insert(height, Watch::new(false));
        }
        Ok(())
    }

    pub fn block_received_signal(&self, height: u32) -> Result<Option<Watch<bool>>, CacheError> {
        Ok(self.read()?.potential_blocks_received.get(&height).cloned())
    }

    pub fn is_block_received(&self, height: u32) -> Result<bool, CacheError> {
        Ok(self
            .read()?
            .potential_blocks_received
            .get(&height)
            .map(|signal| signal.is_set())
            .unwrap_or(false))
    }

    /// Record the header hash received for a height and wake any sync waiter. The hash is stored
    /// before the signal fires so a woken waiter always observes it.
    pub fn mark_block_received(&self, height: u32, hash: HeaderHash) -> Result<(), CacheError> {
        let signal = {
            let mut lock = self.write()?;
            match lock.potential_blocks_received.get(&height).cloned() {
                Some(signal) => {
                    lock.potential_header_hashes.insert(height, hash);
                    Some(signal)
                },
                None => None,
            }
        };
        if let Some(signal) = signal {
            signal.set();
        }
        Ok(())
    }

    pub fn potential_header_hash(&self, height: u32) -> Result<Option<HeaderHash>, CacheError> {
        Ok(self.read()?.potential_header_hashes.get(&height).copied())
    }

    pub fn potential_header_hashes(&self) -> Result<HashMap<u32, HeaderHash>, CacheError> {
        Ok(self.read()?.potential_header_hashes.clone())
    }
}
