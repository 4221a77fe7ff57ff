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

//! The full-sync orchestrator.
//!
//! A sync run downloads the peer's header hash skeleton, finds the fork point with the local
//! chain, statistically validates the prefix below `starting_height` by sampling proofs weighted
//! by difficulty, and then validates the remainder header by header through a pipelined download
//! window. Every wait observes the shutdown signal and the phase's wall-clock budget.

use crate::{
    blocks::BlockRecord,
    cache::BlockCache,
    config::{ConsensusConstants, WalletNodeConfig},
    connectivity::{PeerConnection, WalletComms},
    handler::InboundHandler,
    protocol::{RespondHeader, WalletRequest},
    state_manager::{ReceiveBlockResult, StateManagerHandle, WalletStateManager},
    sync::{sampler, SyncError},
    util::watch::Watch,
};
use log::*;
use rand::rngs::OsRng;
use sesame_common_types::types::{to_hex, HeaderHash};
use sesame_shutdown::ShutdownSignal;
use std::{
    cmp,
    time::{Duration, Instant},
};
use tokio::time;

const LOG_TARGET: &str = "wallet::sync";

// How often the skeleton and proof-hash waits re-check for a response
const RESPONSE_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Ask the sync task to synchronize against the given peer.
#[derive(Debug, Clone)]
pub struct SyncRequest {
    pub peer: PeerConnection,
}

/// Drives one full sync against a single peer. The orchestrator shares the block cache and the
/// inbound handler with the message dispatcher; downloaded headers arrive through the handler
/// while the orchestrator paces requests and enforces budgets.
pub struct WalletSynchronizer<W> {
    config: WalletNodeConfig,
    constants: ConsensusConstants,
    state_manager: StateManagerHandle<W>,
    cache: BlockCache,
    comms: WalletComms,
    handler: InboundHandler<W>,
    starting_height: Watch<u32>,
    shutdown: ShutdownSignal,
}

#[derive(Default)]
struct PipelineState {
    last_request_time: Option<Instant>,
    highest_height_requested: Option<u32>,
    request_made: bool,
}

impl<W: WalletStateManager> WalletSynchronizer<W> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: WalletNodeConfig,
        constants: ConsensusConstants,
        state_manager: StateManagerHandle<W>,
        cache: BlockCache,
        comms: WalletComms,
        handler: InboundHandler<W>,
        starting_height: Watch<u32>,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            config,
            constants,
            state_manager,
            cache,
            comms,
            handler,
            starting_height,
            shutdown,
        }
    }

    /// Sync the wallet up to (almost) the peer's tip. Returns quietly when the node shuts down
    /// mid-sync; every other abort reason is an error the caller may retry on the next trigger.
    pub async fn synchronize(&mut self, peer: PeerConnection) -> Result<(), SyncError> {
        let state_manager = match self.state_manager.get() {
            Some(state_manager) => state_manager,
            None => return Ok(()),
        };

        // Phase A: the header hash skeleton anchors everything that follows
        self.cache.clear_sync_state()?;
        debug!(
            target: LOG_TARGET,
            "Starting wallet sync, requesting header hashes from {}",
            peer.peer_info()
        );
        peer.send(WalletRequest::RequestAllHeaderHashesAfter {
            start_height: 0,
            challenge_hash: self.constants.genesis_challenge_hash,
        })?;
        self.wait_for_header_hashes().await?;
        if self.shutdown.is_triggered() {
            return Ok(());
        }
        let header_hashes = self.cache.header_hashes()?;

        // Phase B: find where the peer's chain agrees with ours, and trail the tip a little to
        // absorb micro-reorgs
        let fork_point_height = state_manager.find_fork_point_alternate_chain(&header_hashes).await;
        let fork_point_hash = header_hashes
            .get(fork_point_height as usize)
            .copied()
            .ok_or(SyncError::MissingHeaderHash(fork_point_height))?;
        let tip_height = sync_target_height(header_hashes.len());

        if state_manager.is_new_wallet() && fork_point_height == 0 {
            // A brand-new wallet has no history to find, so only the recent chain is validated
            // header by header
            let starting_height = tip_height.saturating_sub(self.config.start_height_buffer);
            self.starting_height.send(starting_height);
        }
        info!(
            target: LOG_TARGET,
            "Fork point: {} at height {}. Will sync up to height {}",
            to_hex(&fork_point_hash),
            fork_point_height,
            tip_height
        );
        self.cache.init_block_signals(tip_height)?;

        let starting_height = self.starting_height.current();
        let header_validate_start_height = if starting_height == 0 {
            fork_point_height
        } else {
            cmp::min(
                cmp::max(fork_point_height, starting_height.saturating_sub(1)),
                tip_height + 1,
            )
        };

        // Phase C: statistically validate the prefix below the starting height instead of
        // downloading it
        if starting_height > 0 {
            self.fast_sync(
                &peer,
                &header_hashes,
                fork_point_height,
                fork_point_hash,
                tip_height,
                header_validate_start_height,
            )
            .await?;
            if self.shutdown.is_triggered() {
                return Ok(());
            }
        }

        // Phase D: validate the remainder header by header
        self.header_pipeline(&peer, &header_hashes, header_validate_start_height, tip_height)
            .await?;
        if self.shutdown.is_triggered() {
            return Ok(());
        }

        let state_manager = match self.state_manager.get() {
            Some(state_manager) => state_manager,
            None => return Ok(()),
        };
        info!(
            target: LOG_TARGET,
            "Finished sync process up to height {}",
            state_manager.max_block_height().await
        );
        Ok(())
    }

    async fn wait_for_header_hashes(&self) -> Result<(), SyncError> {
        let start = Instant::now();
        loop {
            if self.shutdown.is_triggered() {
                return Ok(());
            }
            if self.cache.header_hashes_error()? {
                return Err(SyncError::HeaderHashesRejected);
            }
            if self.cache.header_hashes_len()? > 0 {
                return Ok(());
            }
            if start.elapsed() > self.config.sync_request_timeout {
                return Err(SyncError::Timeout("header hashes"));
            }
            time::sleep(RESPONSE_POLL_INTERVAL).await;
        }
    }

    async fn wait_for_proof_hashes(&self, tip_height: u32) -> Result<(), SyncError> {
        let start = Instant::now();
        loop {
            if self.shutdown.is_triggered() {
                return Ok(());
            }
            let got = self.cache.proof_hashes_len()?;
            if got > 0 {
                if got < tip_height as usize {
                    return Err(SyncError::NotEnoughProofHashes {
                        expected: tip_height as usize,
                        got,
                    });
                }
                return Ok(());
            }
            if start.elapsed() > self.config.sync_request_timeout {
                return Err(SyncError::Timeout("proof hashes"));
            }
            time::sleep(RESPONSE_POLL_INTERVAL).await;
        }
    }

    /// Send requests for every height in the window that is still missing and due for a retry, or
    /// that has never been requested.
    fn request_window<I: IntoIterator<Item = u32>>(
        &self,
        window: I,
        header_hashes: &[HeaderHash],
        pipeline: &mut PipelineState,
    ) -> Result<(), SyncError> {
        for height in window {
            if self.shutdown.is_triggered() {
                return Ok(());
            }
            let missing = !self.cache.is_block_received(height)?;
            let due = pipeline
                .last_request_time
                .map(|at| at.elapsed() > self.config.sync_probe_interval)
                .unwrap_or(true);
            let beyond = pipeline
                .highest_height_requested
                .map(|highest| height > highest)
                .unwrap_or(true);
            if (due && missing) || beyond {
                let header_hash = match header_hashes.get(height as usize) {
                    Some(hash) => *hash,
                    None => {
                        debug!(target: LOG_TARGET, "Skeleton ends before height {}", height);
                        continue;
                    },
                };
                if beyond {
                    pipeline.highest_height_requested = Some(height);
                }
                pipeline.request_made = true;
                debug!(target: LOG_TARGET, "Requesting sync header #{}", height);
                self.comms.send_to_all(WalletRequest::RequestHeader { height, header_hash })?;
            }
        }
        if pipeline.request_made {
            pipeline.last_request_time = Some(Instant::now());
            pipeline.request_made = false;
        }
        Ok(())
    }

    /// Phase C. Downloads a difficulty-weighted sample of headers, has the state manager verify
    /// them against the proof hashes, and then installs synthesized records for the skipped
    /// prefix.
    async fn fast_sync(
        &mut self,
        peer: &PeerConnection,
        header_hashes: &[HeaderHash],
        fork_point_height: u32,
        fork_point_hash: HeaderHash,
        tip_height: u32,
        header_validate_start_height: u32,
    ) -> Result<(), SyncError> {
        peer.send(WalletRequest::RequestAllProofHashes)?;
        self.wait_for_proof_hashes(tip_height).await?;
        if self.shutdown.is_triggered() {
            return Ok(());
        }
        let proof_hashes = self.cache.proof_hashes()?;

        let (heights, weights) = sampler::candidate_heights(&proof_hashes, fork_point_height, tip_height);
        let sample_size = cmp::min(sampler::MAX_PROOF_SAMPLES, heights.len());
        let sampled_odd_heights = sampler::sample_heights(&mut OsRng, &heights, &weights, sample_size);
        let query_heights = sampler::with_predecessors(&sampled_odd_heights);
        debug!(
            target: LOG_TARGET,
            "Sampled {} odd height(s) out of {} candidate(s) for proof validation",
            sampled_odd_heights.len(),
            heights.len()
        );

        self.download_sampled_headers(&query_heights, header_hashes).await?;
        if self.shutdown.is_triggered() {
            return Ok(());
        }

        let state_manager = match self.state_manager.get() {
            Some(state_manager) => state_manager,
            None => return Ok(()),
        };
        let cached_blocks = self.cache.cached_blocks()?;
        let potential_header_hashes = self.cache.potential_header_hashes()?;
        if !state_manager
            .validate_select_proofs(&proof_hashes, &sampled_odd_heights, &cached_blocks, &potential_header_hashes)
            .await
        {
            return Err(SyncError::SampleValidationFailed);
        }
        info!(target: LOG_TARGET, "All sampled proofs validated successfully");

        // The sampler vouches for the skipped prefix, so its records are synthesized from the
        // skeleton alone and submitted one at a time
        let fork_record = state_manager
            .get_block_record(&fork_point_hash)
            .await
            .ok_or_else(|| SyncError::MissingBlockRecord(to_hex(&fork_point_hash)))?;
        let mut weight = fork_record.weight;
        let mut difficulty = if fork_point_height == 0 {
            self.constants.difficulty_starting
        } else {
            let parent = state_manager
                .get_block_record(&fork_record.prev_hash)
                .await
                .ok_or_else(|| SyncError::MissingBlockRecord(to_hex(&fork_record.prev_hash)))?;
            (weight - parent.weight) as u64
        };

        for height in (fork_point_height + 1)..=header_validate_start_height {
            if self.shutdown.is_triggered() {
                return Ok(());
            }
            let triple = proof_hashes
                .get(height as usize)
                .ok_or(SyncError::NotEnoughProofHashes {
                    expected: header_validate_start_height as usize + 1,
                    got: proof_hashes.len(),
                })?;
            if let Some(change) = triple.difficulty_change {
                difficulty = change;
            }
            weight += difficulty as u128;

            let hash = header_hashes
                .get(height as usize)
                .copied()
                .ok_or(SyncError::MissingHeaderHash(height))?;
            let block_record = BlockRecord {
                hash,
                prev_hash: header_hashes[height as usize - 1],
                height,
                weight,
                additions: Some(Vec::new()),
                removals: Some(Vec::new()),
                total_iters: triple.total_iters,
                new_challenge_hash: None,
                timestamp: 0,
            };
            let result = state_manager.receive_block(block_record, None).await;
            match result {
                ReceiveBlockResult::AddedToHead | ReceiveBlockResult::AddedAsOrphan => {},
                result => return Err(SyncError::CommitRejected { height, result }),
            }
            // Sampled headers that were waiting for this height can commit right away, which also
            // keeps committed hashes out of the pending-successor index
            for released in self.cache.take_successors(&hash)? {
                let response = RespondHeader {
                    header_block: released.header_block,
                    transactions_filter: released.transactions_filter,
                };
                self.handler.respond_header(response, peer.clone()).await?;
            }
        }
        info!(
            target: LOG_TARGET,
            "Fast sync successful up to height {}", header_validate_start_height
        );
        Ok(())
    }

    async fn download_sampled_headers(
        &self,
        query_heights: &[u32],
        header_hashes: &[HeaderHash],
    ) -> Result<(), SyncError> {
        let mut pipeline = PipelineState::default();
        for (index, &height) in query_heights.iter().enumerate() {
            let mut total_time_slept = Duration::from_secs(0);
            loop {
                if self.shutdown.is_triggered() {
                    return Ok(());
                }
                if total_time_slept > self.config.sync_request_timeout {
                    return Err(SyncError::Timeout("sampled headers"));
                }
                let window_end = cmp::min(index + self.config.num_sync_batches, query_heights.len());
                self.request_window(
                    query_heights[index..window_end].iter().copied(),
                    header_hashes,
                    &mut pipeline,
                )?;
                if self.shutdown.is_triggered() {
                    return Ok(());
                }
                let signal = self
                    .cache
                    .block_received_signal(height)?
                    .ok_or(SyncError::MissingHeaderHash(height))?;
                match time::timeout(self.config.sync_probe_interval, signal.wait_until_set()).await {
                    Ok(_) => break,
                    Err(_) => {
                        total_time_slept += self.config.sync_probe_interval;
                        debug!(target: LOG_TARGET, "Did not receive sampled header #{} yet", height);
                    },
                }
            }
        }
        Ok(())
    }

    /// Phase D. Headers are requested a window at a time and each checkpoint must be confirmed
    /// committed, not merely downloaded: a header whose ancestor went missing is re-driven
    /// through the handler from the cache.
    async fn header_pipeline(
        &self,
        peer: &PeerConnection,
        header_hashes: &[HeaderHash],
        header_validate_start_height: u32,
        tip_height: u32,
    ) -> Result<(), SyncError> {
        let mut pipeline = PipelineState::default();
        for height_checkpoint in (header_validate_start_height + 1)..=tip_height {
            let mut total_time_slept = Duration::from_secs(0);
            loop {
                if self.shutdown.is_triggered() {
                    return Ok(());
                }
                if total_time_slept > self.config.sync_request_timeout {
                    return Err(SyncError::Timeout("header pipeline"));
                }
                let window_end = cmp::min(
                    height_checkpoint.saturating_add(self.config.num_sync_batches as u32),
                    tip_height + 1,
                );
                self.request_window(height_checkpoint..window_end, header_hashes, &mut pipeline)?;
                if self.shutdown.is_triggered() {
                    return Ok(());
                }

                let signal = self
                    .cache
                    .block_received_signal(height_checkpoint)?
                    .ok_or(SyncError::MissingHeaderHash(height_checkpoint))?;
                if time::timeout(self.config.sync_probe_interval, signal.wait_until_set())
                    .await
                    .is_err()
                {
                    total_time_slept += self.config.sync_probe_interval;
                    debug!(
                        target: LOG_TARGET,
                        "Did not receive desired header #{}", height_checkpoint
                    );
                    continue;
                }

                // Downloaded. Now confirm it was added to the chain.
                let state_manager = match self.state_manager.get() {
                    Some(state_manager) => state_manager,
                    None => return Ok(()),
                };
                let header_hash = self
                    .cache
                    .potential_header_hash(height_checkpoint)?
                    .ok_or(SyncError::MissingHeaderHash(height_checkpoint))?;
                if state_manager.has_block_record(&header_hash).await {
                    break;
                }
                time::sleep(self.config.short_probe_interval).await;
                if self.shutdown.is_triggered() {
                    return Ok(());
                }
                total_time_slept += self.config.short_probe_interval;
                if state_manager.has_block_record(&header_hash).await {
                    break;
                }
                match self.cache.get_block(&header_hash)? {
                    Some(cached) => {
                        warn!(
                            target: LOG_TARGET,
                            "Received header #{}, but it has not been added to the chain. Retrying",
                            height_checkpoint
                        );
                        let response = RespondHeader {
                            header_block: cached.header_block,
                            transactions_filter: cached.transactions_filter,
                        };
                        self.handler.respond_header(response, peer.clone()).await?;
                    },
                    None => {
                        debug!(
                            target: LOG_TARGET,
                            "Header #{} is neither committed nor cached, re-requesting", height_checkpoint
                        );
                    },
                }
            }
        }
        Ok(())
    }
}

/// The sync target trails the end of the skeleton by a few blocks to absorb micro-reorgs, except
/// on very short chains.
fn sync_target_height(skeleton_len: usize) -> u32 {
    if skeleton_len > 5 {
        (skeleton_len - 5) as u32
    } else {
        skeleton_len as u32
    }
}
