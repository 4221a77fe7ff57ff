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

//! Sample selection for fast sync.
//!
//! Candidates are weighted by the difficulty active at their height, so a dishonest prefix would
//! have to forge the costliest work to survive sampling. Only odd heights are drawn, and every
//! drawn height brings its predecessor along, which lets the verifier check the inter-block
//! challenge derivation.

use crate::blocks::ProofHashTriple;
use rand::{distributions::WeightedIndex, prelude::*};

/// The most samples drawn for a single sync
pub const MAX_PROOF_SAMPLES: usize = 100;

/// All odd heights strictly between the fork point + 1 and the sync target, each weighted by the
/// difficulty active at that height (the last difficulty change at or before it).
pub fn candidate_heights(
    proof_hashes: &[ProofHashTriple],
    fork_point_height: u32,
    tip_height: u32,
) -> (Vec<u32>, Vec<u64>) {
    let mut heights = Vec::new();
    let mut weights = Vec::new();
    let mut difficulty = 0u64;
    for (i, triple) in proof_hashes.iter().take(tip_height as usize).enumerate() {
        if let Some(change) = triple.difficulty_change {
            difficulty = change;
        }
        if i as u32 > fork_point_height + 1 && i % 2 == 1 {
            heights.push(i as u32);
            weights.push(difficulty);
        }
    }
    (heights, weights)
}

/// Draw up to `k` heights with replacement according to their weights, then deduplicate and sort
/// ascending. Returns an empty sample when there are no candidates or no positive weight.
pub fn sample_heights<R: Rng + ?Sized>(rng: &mut R, heights: &[u32], weights: &[u64], k: usize) -> Vec<u32> {
    if heights.is_empty() || k == 0 {
        return Vec::new();
    }
    let distribution = match WeightedIndex::new(weights) {
        Ok(distribution) => distribution,
        Err(_) => return Vec::new(),
    };
    let mut drawn: Vec<u32> = (0..k).map(|_| heights[distribution.sample(rng)]).collect();
    drawn.sort_unstable();
    drawn.dedup();
    drawn
}

/// Expand the sampled odd heights so each is preceded by its parent height.
pub fn with_predecessors(odd_heights: &[u32]) -> Vec<u32> {
    let mut expanded = Vec::with_capacity(odd_heights.len() * 2);
    for &height in odd_heights {
        expanded.push(height - 1);
        expanded.push(height);
    }
    expanded
}
