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

//! The wallet-to-full-node protocol messages. Framing and encoding are owned by the transport;
//! these types define the payload shapes the node emits and consumes.

use crate::{
    blocks::{HeaderBlock, ProofHashTriple, TransactionsFilter},
    models::SpendBundle,
};
use serde::{Deserialize, Serialize};
use sesame_common_types::types::{CoinId, HeaderHash};
use std::fmt::{Display, Error, Formatter};

/// Messages the wallet sends to full nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WalletRequest {
    RequestAllHeaderHashesAfter {
        start_height: u32,
        challenge_hash: HeaderHash,
    },
    RequestAllProofHashes,
    RequestHeader {
        height: u32,
        header_hash: HeaderHash,
    },
    RequestAdditions {
        height: u32,
        header_hash: HeaderHash,
        coin_ids: Vec<CoinId>,
    },
    SendTransaction {
        transaction: SpendBundle,
    },
    RequestGenerator {
        height: u32,
        header_hash: HeaderHash,
    },
}

impl Display for WalletRequest {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result<(), Error> {
        use WalletRequest::*;
        let name = match self {
            RequestAllHeaderHashesAfter { .. } => "request_all_header_hashes_after",
            RequestAllProofHashes => "request_all_proof_hashes",
            RequestHeader { .. } => "request_header",
            RequestAdditions { .. } => "request_additions",
            SendTransaction { .. } => "send_transaction",
            RequestGenerator { .. } => "request_generator",
        };
        fmt.write_str(name)
    }
}

/// A full node's response to `request_header`. The block cannot be finished until the relevant
/// additions and removals for the wallet are known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RespondHeader {
    pub header_block: HeaderBlock,
    pub transactions_filter: TransactionsFilter,
}

/// Messages the wallet consumes from full nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WalletResponse {
    AllHeaderHashes(Vec<HeaderHash>),
    RejectAllHeaderHashesAfter {
        start_height: u32,
        challenge_hash: HeaderHash,
    },
    AllProofHashes(Vec<ProofHashTriple>),
    Header(Box<RespondHeader>),
}
