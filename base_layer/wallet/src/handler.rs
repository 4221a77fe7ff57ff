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

//! Handles everything full nodes send back to the wallet.
//!
//! Header responses run through an iterative loop rather than recursion: committing a block can
//! release cached successors, and a long reorg unwind must not grow the stack. A header whose
//! ancestor is missing is parked in the block cache; in steady state the handler walks backward
//! one header at a time while the gap to the LCA stays below the short-sync threshold, and asks
//! the sync orchestrator to take over once it does not.

use crate::{
    blocks::{BlockRecord, HeaderBlock},
    cache::{BlockCache, CacheError, CachedBlock},
    connectivity::{InboundMessage, PeerConnection},
    protocol::{RespondHeader, WalletRequest, WalletResponse},
    state_manager::{ReceiveBlockResult, StateManagerHandle, WalletStateManager},
    sync::SyncRequest,
};
use log::*;
use sesame_common_types::types::to_hex;
use sesame_shutdown::ShutdownSignal;
use std::collections::VecDeque;
use tokio::sync::mpsc;

const LOG_TARGET: &str = "wallet::handler";

pub struct InboundHandler<W> {
    state_manager: StateManagerHandle<W>,
    cache: BlockCache,
    sync_request_tx: mpsc::UnboundedSender<SyncRequest>,
    short_sync_threshold: u32,
    shutdown: ShutdownSignal,
}

impl<W> Clone for InboundHandler<W> {
    fn clone(&self) -> Self {
        Self {
            state_manager: self.state_manager.clone(),
            cache: self.cache.clone(),
            sync_request_tx: self.sync_request_tx.clone(),
            short_sync_threshold: self.short_sync_threshold,
            shutdown: self.shutdown.clone(),
        }
    }
}

impl<W: WalletStateManager> InboundHandler<W> {
    pub fn new(
        state_manager: StateManagerHandle<W>,
        cache: BlockCache,
        sync_request_tx: mpsc::UnboundedSender<SyncRequest>,
        short_sync_threshold: u32,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            state_manager,
            cache,
            sync_request_tx,
            short_sync_threshold,
            shutdown,
        }
    }

    pub async fn handle_message(&self, message: InboundMessage) -> Result<(), CacheError> {
        let InboundMessage { peer, message } = message;
        match message {
            WalletResponse::AllHeaderHashes(hashes) => {
                debug!(
                    target: LOG_TARGET,
                    "Received {} header hash(es) from {}",
                    hashes.len(),
                    peer.peer_info()
                );
                self.cache.set_header_hashes(hashes)?;
            },
            WalletResponse::RejectAllHeaderHashesAfter { start_height, .. } => {
                warn!(
                    target: LOG_TARGET,
                    "{} rejected the header hash request starting at height {}",
                    peer.peer_info(),
                    start_height
                );
                self.cache.set_header_hashes_error()?;
            },
            WalletResponse::AllProofHashes(proof_hashes) => {
                debug!(
                    target: LOG_TARGET,
                    "Received {} proof hash triple(s) from {}",
                    proof_hashes.len(),
                    peer.peer_info()
                );
                self.cache.set_proof_hashes(proof_hashes)?;
            },
            WalletResponse::Header(response) => self.respond_header(*response, peer).await?,
        }
        Ok(())
    }

    /// Process a `respond_header` message. The block cannot be finished until the additions and
    /// removals relevant to the wallet are known; until then it lives in the block cache. Safe
    /// under redelivery.
    pub async fn respond_header(&self, response: RespondHeader, peer: PeerConnection) -> Result<(), CacheError> {
        let mut queue = VecDeque::new();
        queue.push_back(response);

        // Each committed block may release cached successors, which are processed on subsequent
        // turns of this loop.
        while let Some(response) = queue.pop_front() {
            if self.shutdown.is_triggered() {
                return Ok(());
            }
            let state_manager = match self.state_manager.get() {
                Some(state_manager) => state_manager,
                None => return Ok(()),
            };
            let RespondHeader {
                header_block: block,
                transactions_filter,
            } = response;

            let header_hash = block.header_hash();
            // Genesis is installed by the state manager, not synced
            if block.height < 1 || state_manager.has_block_record(&header_hash).await {
                continue;
            }

            let block_record = BlockRecord {
                hash: header_hash,
                prev_hash: block.prev_header_hash,
                height: block.height,
                weight: block.weight,
                additions: None,
                removals: None,
                total_iters: block.data.total_iters,
                new_challenge_hash: Some(block.challenge.hash()),
                timestamp: block.data.timestamp,
            };

            if state_manager.sync_mode() {
                self.cache.mark_block_received(block.height, header_hash)?;
            }

            self.cache.insert_block(header_hash, CachedBlock {
                block_record: block_record.clone(),
                header_block: block.clone(),
                transactions_filter: transactions_filter.clone(),
            })?;

            if !state_manager.has_block_record(&block.prev_header_hash).await {
                // The ancestor is missing. Park this block; committing the ancestor releases it.
                // During sync the orchestrator is already requesting the previous blocks, in
                // steady state we walk backward ourselves while the gap is short.
                self.cache.add_future_successor(block.prev_header_hash, header_hash)?;

                if !state_manager.sync_mode() {
                    let lca = state_manager.lca().await;
                    let gap = block_record.height.saturating_sub(lca.height);
                    if gap < self.short_sync_threshold {
                        let request = WalletRequest::RequestHeader {
                            height: block_record.height - 1,
                            header_hash: block_record.prev_hash,
                        };
                        if let Err(e) = peer.send(request) {
                            warn!(
                                target: LOG_TARGET,
                                "Could not request previous header from {}: {}",
                                peer.peer_info(),
                                e
                            );
                        }
                    } else {
                        debug!(
                            target: LOG_TARGET,
                            "Header #{} is {} block(s) ahead of the LCA, requesting a full sync",
                            block_record.height,
                            gap
                        );
                        let _ = self.sync_request_tx.send(SyncRequest { peer: peer.clone() });
                    }
                }
                continue;
            }

            let (additions, removals) = state_manager
                .get_filter_additions_removals(&block_record, &transactions_filter)
                .await;
            if !additions.is_empty() || !removals.is_empty() {
                // The additions/removals responders finish this block once the details arrive
                debug!(
                    target: LOG_TARGET,
                    "Block #{} is relevant to the wallet ({} addition(s), {} removal(s))",
                    block.height,
                    additions.len(),
                    removals.len()
                );
                let request = WalletRequest::RequestAdditions {
                    height: block.height,
                    header_hash,
                    coin_ids: additions,
                };
                if let Err(e) = peer.send(request) {
                    warn!(
                        target: LOG_TARGET,
                        "Could not request additions from {}: {}",
                        peer.peer_info(),
                        e
                    );
                }
                continue;
            }

            let mut finished = block_record;
            finished.additions = Some(Vec::new());
            finished.removals = Some(Vec::new());
            queue.extend(self.block_finished(finished, block).await?);
        }
        Ok(())
    }

    /// Submit a completed block record to the state manager and release any cached successors
    /// that were waiting for it. Also invoked by the additions/removals responders once a
    /// relevant block's coin details have been resolved.
    pub async fn block_finished(
        &self,
        block_record: BlockRecord,
        header_block: HeaderBlock,
    ) -> Result<Vec<RespondHeader>, CacheError> {
        let state_manager = match self.state_manager.get() {
            Some(state_manager) => state_manager,
            None => return Ok(Vec::new()),
        };
        if !block_record.is_finished() {
            error!(
                target: LOG_TARGET,
                "Tried to finish block #{} before its additions and removals were resolved", block_record.height
            );
            return Ok(Vec::new());
        }

        let hash = block_record.hash;
        let height = block_record.height;
        match state_manager.receive_block(block_record, Some(header_block)).await {
            ReceiveBlockResult::Disconnected => {
                error!(target: LOG_TARGET, "Attempted to add disconnected block #{}", height);
                return Ok(Vec::new());
            },
            ReceiveBlockResult::Invalid => {
                error!(target: LOG_TARGET, "Attempted to add invalid block #{}", height);
                return Ok(Vec::new());
            },
            ReceiveBlockResult::AlreadyHave => return Ok(Vec::new()),
            ReceiveBlockResult::AddedAsOrphan => {
                info!(
                    target: LOG_TARGET,
                    "Added orphan {} at height {}",
                    to_hex(&hash),
                    height
                );
            },
            ReceiveBlockResult::AddedToHead => {
                info!(
                    target: LOG_TARGET,
                    "Updated LCA to {} at height {}",
                    to_hex(&hash),
                    height
                );
                if !state_manager.sync_mode() {
                    self.cache.evict_stale(height)?;
                }
            },
        }

        Ok(self
            .cache
            .take_successors(&hash)?
            .into_iter()
            .map(|cached| RespondHeader {
                header_block: cached.header_block,
                transactions_filter: cached.transactions_filter,
            })
            .collect())
    }
}
