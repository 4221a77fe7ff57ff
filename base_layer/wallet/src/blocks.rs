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

//! Compact block types as seen by a light wallet.
//!
//! The wallet never downloads full blocks. It works with [HeaderBlock]s (the compact header
//! carrying the proof of space, proof of time and challenge), its own authenticated
//! [BlockRecord]s, and per-height [ProofHashTriple]s that summarise the chain's work for
//! sampling-based fast sync.

use digest::Digest;
use serde::{Deserialize, Serialize};
use sesame_common_types::types::{CoinId, HashDigest, HeaderHash};

fn finalize_hash(digest: HashDigest) -> HeaderHash {
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&digest.finalize());
    hash
}

/// A proof that a farmer committed plotted disk space to the given challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofOfSpace {
    pub challenge_hash: HeaderHash,
    pub plot_public_key: Vec<u8>,
    pub size: u8,
    pub proof: Vec<u8>,
}

impl ProofOfSpace {
    pub fn hash(&self) -> HeaderHash {
        let digest = HashDigest::new()
            .chain_update(&self.challenge_hash)
            .chain_update(&self.plot_public_key)
            .chain_update(&[self.size])
            .chain_update(&self.proof);
        finalize_hash(digest)
    }
}

/// A verifiable-delay proof that sequential time passed since the challenge was issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofOfTime {
    pub challenge_hash: HeaderHash,
    pub iterations_needed: u64,
    pub output: Vec<u8>,
}

/// The challenge derived from a block's proofs. Its hash seeds the next block's proof of space,
/// which is what lets the sampler bind a block to its predecessor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    pub prev_challenge_hash: HeaderHash,
    pub proofs_hash: HeaderHash,
    pub new_work_difficulty: Option<u64>,
    pub total_iters: u128,
    pub total_weight: u128,
}

impl Challenge {
    pub fn hash(&self) -> HeaderHash {
        let mut digest = HashDigest::new()
            .chain_update(&self.prev_challenge_hash)
            .chain_update(&self.proofs_hash);
        match self.new_work_difficulty {
            Some(difficulty) => {
                digest.update(&[1u8]);
                digest.update(&difficulty.to_le_bytes());
            },
            None => digest.update(&[0u8]),
        }
        digest.update(&self.total_iters.to_le_bytes());
        digest.update(&self.total_weight.to_le_bytes());
        finalize_hash(digest)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderData {
    pub timestamp: u64,
    pub total_iters: u128,
}

/// The compact block header exchanged with full nodes. Self-hashing yields the block's
/// [HeaderHash].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderBlock {
    pub height: u32,
    pub weight: u128,
    pub prev_header_hash: HeaderHash,
    pub proof_of_space: ProofOfSpace,
    pub proof_of_time: ProofOfTime,
    pub challenge: Challenge,
    pub data: HeaderData,
}

impl HeaderBlock {
    pub fn header_hash(&self) -> HeaderHash {
        let digest = HashDigest::new()
            .chain_update(&self.height.to_le_bytes())
            .chain_update(&self.weight.to_le_bytes())
            .chain_update(&self.prev_header_hash)
            .chain_update(&self.proof_of_space.hash())
            .chain_update(&self.proof_of_time.challenge_hash)
            .chain_update(&self.proof_of_time.iterations_needed.to_le_bytes())
            .chain_update(&self.proof_of_time.output)
            .chain_update(&self.challenge.hash())
            .chain_update(&self.data.timestamp.to_le_bytes())
            .chain_update(&self.data.total_iters.to_le_bytes());
        finalize_hash(digest)
    }
}

/// An authenticated node of the wallet's view of the chain.
///
/// `additions` and `removals` are `None` until the block has been filtered against the wallet's
/// watched coin set; an empty list means "filtered, nothing relevant".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
    pub hash: HeaderHash,
    pub prev_hash: HeaderHash,
    pub height: u32,
    pub weight: u128,
    pub additions: Option<Vec<CoinId>>,
    pub removals: Option<Vec<CoinId>>,
    pub total_iters: u128,
    pub new_challenge_hash: Option<HeaderHash>,
    pub timestamp: u64,
}

impl BlockRecord {
    /// True once the relevant coin additions and removals have been resolved.
    pub fn is_finished(&self) -> bool {
        self.additions.is_some() && self.removals.is_some()
    }
}

/// Per-height summary of the chain's proofs, enabling sampling-based prefix validation.
/// `difficulty_change` is present only at difficulty epochs; the difficulty active at height `h`
/// is the last non-null value at or before `h`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofHashTriple {
    pub proof_of_space_hash: HeaderHash,
    pub difficulty_change: Option<u64>,
    pub total_iters: u128,
}

/// An opaque Merkle-based membership filter over a block's coin additions and removals. The
/// wallet state manager interprets it; this crate only passes it around.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionsFilter(pub Vec<u8>);
