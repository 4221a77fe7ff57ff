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

use crate::connectivity::PeerInfo;
use sesame_common_types::types::HeaderHash;
use std::{path::PathBuf, time::Duration};

/// Network-level constants the wallet needs. These are fixed per chain and distributed with the
/// application configuration.
#[derive(Debug, Clone, Copy)]
pub struct ConsensusConstants {
    /// The challenge the genesis proof of space was created for, used to anchor skeleton requests
    pub genesis_challenge_hash: HeaderHash,
    /// Difficulty of the first blocks, before the first difficulty adjustment
    pub difficulty_starting: u64,
}

/// Configuration for the wallet node.
#[derive(Debug, Clone)]
pub struct WalletNodeConfig {
    /// Database location, relative to the wallet root path. The selected key's fingerprint is
    /// appended so each key gets its own wallet database.
    pub database_path: String,
    /// Height at which header-by-header validation starts during a full sync. Overridden from the
    /// backup file at startup, and for brand-new wallets during the first sync.
    pub starting_height: u32,
    /// Sync this far below the backup's recorded height, in case the backup was taken on a chain
    /// that was later reorged.
    pub start_height_buffer: u32,
    /// Height gap below which the node walks headers backward instead of starting a full sync
    pub short_sync_threshold: u32,
    /// Number of header requests kept in flight during sync
    pub num_sync_batches: usize,
    pub target_peer_count: usize,
    pub wallet_peers_path: PathBuf,
    pub introducer_peer: Option<PeerInfo>,
    pub peer_connect_interval: Duration,
    /// A preferred full node. When connected to it, discovery is stopped and other full-node
    /// connections are closed.
    pub full_node_peer: Option<PeerInfo>,
    pub full_node_check_interval: Duration,
    pub max_full_node_checks: usize,
    /// Wall-clock budget for each phase of a sync
    pub sync_request_timeout: Duration,
    /// How long to wait for a requested header before re-requesting it
    pub sync_probe_interval: Duration,
    /// Pause before re-checking whether a downloaded header has been committed
    pub short_probe_interval: Duration,
}

impl Default for WalletNodeConfig {
    fn default() -> Self {
        Self {
            database_path: "wallet/db/blockchain_wallet".to_string(),
            starting_height: 0,
            start_height_buffer: 100,
            short_sync_threshold: 15,
            num_sync_batches: 50,
            target_peer_count: 3,
            wallet_peers_path: PathBuf::from("wallet/db/wallet_peers.sqlite"),
            introducer_peer: None,
            peer_connect_interval: Duration::from_secs(60),
            full_node_peer: None,
            full_node_check_interval: Duration::from_secs(180),
            max_full_node_checks: 5,
            sync_request_timeout: Duration::from_secs(50),
            sync_probe_interval: Duration::from_secs(3),
            short_probe_interval: Duration::from_secs(1),
        }
    }
}
