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

use crate::{cache::CacheError, connectivity::CommsError, state_manager::ReceiveBlockResult};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Full node rejected the request for header hashes")]
    HeaderHashesRejected,
    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),
    #[error("Full node sent too few proof hashes (expected at least {expected}, got {got})")]
    NotEnoughProofHashes { expected: usize, got: usize },
    #[error("Header skeleton does not contain height {0}")]
    MissingHeaderHash(u32),
    #[error("Block record `{0}` is missing from the wallet chain")]
    MissingBlockRecord(String),
    #[error("Proof sample validation failed")]
    SampleValidationFailed,
    #[error("Block at height {height} was rejected during fast sync ({result})")]
    CommitRejected { height: u32, result: ReceiveBlockResult },
    #[error("Comms error: {0}")]
    CommsError(#[from] CommsError),
    #[error("Block cache error: {0}")]
    CacheError(#[from] CacheError),
}
