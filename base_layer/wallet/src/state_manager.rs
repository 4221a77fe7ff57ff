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

//! The interface to the wallet's persistent state.
//!
//! The state manager owns the block-record store, the transaction and action stores and the user
//! settings, and is the component that ultimately accepts or rejects a block record. This crate
//! only drives it; implementations live elsewhere (the production one is backed by the wallet
//! database, the test one is in memory).

use crate::{
    blocks::{BlockRecord, HeaderBlock, ProofHashTriple, TransactionsFilter},
    cache::CachedBlock,
    config::{ConsensusConstants, WalletNodeConfig},
    keychain::PrivateKey,
    models::{TransactionRecord, WalletAction, WalletBackup},
    util::watch::Watch,
};
use async_trait::async_trait;
use sesame_common_types::types::{CoinId, HeaderHash};
use std::{
    collections::HashMap,
    fmt::{Display, Error, Formatter},
    path::PathBuf,
    sync::Arc,
};
use tokio::sync::mpsc;

#[derive(Debug, thiserror::Error)]
pub enum StateManagerError {
    #[error("Wallet database error: {0}")]
    DatabaseError(String),
    #[error("Backup import failed: {0}")]
    BackupImportFailed(String),
}

/// The verdict of the consensus layer on a submitted block record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveBlockResult {
    AddedToHead,
    AddedAsOrphan,
    AlreadyHave,
    Disconnected,
    Invalid,
}

impl Display for ReceiveBlockResult {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result<(), Error> {
        let result = match self {
            ReceiveBlockResult::AddedToHead => "added to head",
            ReceiveBlockResult::AddedAsOrphan => "added as orphan",
            ReceiveBlockResult::AlreadyHave => "already have",
            ReceiveBlockResult::Disconnected => "disconnected",
            ReceiveBlockResult::Invalid => "invalid",
        };
        fmt.write_str(result)
    }
}

#[derive(Debug, Clone, Default)]
pub struct BackupSettings {
    pub user_initialized: bool,
}

/// Facade over the wallet's persistent state, consumed by the sync engine. All methods are
/// serialized by the implementation (the engine treats it as a single writer).
#[async_trait]
pub trait WalletStateManager: Send + Sync + 'static {
    /// Highest height at which the given alternate skeleton (indexed by height from genesis)
    /// agrees with the locally committed chain.
    async fn find_fork_point_alternate_chain(&self, header_hashes: &[HeaderHash]) -> u32;

    /// Statistically verify a sampled chain prefix. Implementations must check, for every sampled
    /// odd height `h`:
    /// 1. the cached header block recorded for `h` self-hashes to the hash recorded during
    ///    download;
    /// 2. `proof_hashes[h]` equals the header's proof-of-space hash, declared difficulty change
    ///    and `total_iters`, with `total_iters` strictly increasing;
    /// 3. the proof of space at `h` chains to the `new_challenge_hash` of the block at `h − 1`
    ///    (which is why predecessors are downloaded alongside);
    /// 4. the work delta between `h − 1` and `h` is consistent with the difficulty active at `h`.
    async fn validate_select_proofs(
        &self,
        proof_hashes: &[ProofHashTriple],
        sampled_odd_heights: &[u32],
        cached_blocks: &HashMap<HeaderHash, CachedBlock>,
        potential_header_hashes: &HashMap<u32, HeaderHash>,
    ) -> bool;

    /// Submit a block record (with its header block, when one exists) for acceptance.
    async fn receive_block(&self, block_record: BlockRecord, header_block: Option<HeaderBlock>) -> ReceiveBlockResult;

    /// The subsets of the block's coin additions and removals that are relevant to the wallet's
    /// watched set, as implied by the transactions filter.
    async fn get_filter_additions_removals(
        &self,
        block_record: &BlockRecord,
        filter: &TransactionsFilter,
    ) -> (Vec<CoinId>, Vec<CoinId>);

    async fn has_block_record(&self, hash: &HeaderHash) -> bool;
    async fn get_block_record(&self, hash: &HeaderHash) -> Option<BlockRecord>;

    /// The wallet's current best accepted tip.
    async fn lca(&self) -> BlockRecord;
    async fn block_hash_at_height(&self, height: u32) -> Option<HeaderHash>;
    async fn max_block_height(&self) -> u32;

    fn sync_mode(&self) -> bool;
    fn set_sync_mode(&self, sync_mode: bool);
    fn is_new_wallet(&self) -> bool;
    fn set_new_wallet(&self, new_wallet: bool);

    /// Unconfirmed wallet transactions that still need to reach a full node.
    async fn get_not_sent_transactions(&self) -> Vec<TransactionRecord>;
    async fn get_all_pending_actions(&self) -> Vec<WalletAction>;

    async fn backup_settings(&self) -> BackupSettings;
    async fn user_created_new_wallet(&self);
    async fn user_skipped_backup_import(&self);
    async fn import_backup_info(&self, backup: &WalletBackup) -> Result<(), StateManagerError>;

    /// Register the channel the state manager pings whenever a new pending transaction appears.
    fn set_pending_tx_sender(&self, sender: mpsc::UnboundedSender<()>);

    async fn close_all_stores(&self);
}

/// Creates a state manager for a selected key. Injected into the node so implementations can be
/// swapped out wholesale in tests.
#[async_trait]
pub trait StateManagerFactory: Send + Sync + 'static {
    type StateManager: WalletStateManager;

    async fn create(
        &self,
        private_key: PrivateKey,
        config: &WalletNodeConfig,
        db_path: PathBuf,
        constants: ConsensusConstants,
    ) -> Result<Self::StateManager, StateManagerError>;
}

/// Shared, clearable reference to the active state manager. The engine re-reads this at every
/// suspension point and bails out when the node has been closed underneath it. Backed by a
/// watch channel, so reading and replacing it cannot fail.
#[derive(Debug)]
pub struct StateManagerHandle<W> {
    inner: Watch<Option<Arc<W>>>,
}

impl<W> Clone for StateManagerHandle<W> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<W: Send + Sync + 'static> Default for StateManagerHandle<W> {
    fn default() -> Self {
        Self {
            inner: Watch::new(None),
        }
    }
}

impl<W: Send + Sync + 'static> StateManagerHandle<W> {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn set(&self, state_manager: Arc<W>) {
        self.inner.send(Some(state_manager));
    }

    pub fn clear(&self) {
        self.inner.send(None);
    }

    pub fn get(&self) -> Option<Arc<W>> {
        self.inner.current()
    }
}
