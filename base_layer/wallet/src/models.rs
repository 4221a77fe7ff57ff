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

//! Store-facing models owned by the wallet state manager but interpreted by the node when
//! replaying pending work to full nodes.

use log::*;
use serde::{Deserialize, Serialize};
use sesame_common_types::types::{HeaderHash, TxId, BLOCK_HASH_LENGTH};

const LOG_TARGET: &str = "wallet::models";

/// The only wallet action name the node knows how to replay.
pub const REQUEST_GENERATOR_ACTION: &str = "request_generator";

/// An aggregated, signed spend. Opaque to the node; it is produced by the signing layer and
/// broadcast verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendBundle {
    pub payload: Vec<u8>,
}

/// A wallet-originated transaction as persisted by the transaction store. Only unconfirmed
/// records that carry a spend bundle are candidates for resending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRecord {
    pub tx_id: TxId,
    pub spend_bundle: Option<SpendBundle>,
    pub confirmed: bool,
    pub sent_to: Vec<String>,
}

/// A pending action persisted by the action store. `data` is a JSON document whose shape depends
/// on `name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletAction {
    pub name: String,
    pub data: String,
}

#[derive(Deserialize)]
struct RequestGeneratorData {
    header_hash: String,
    height: u32,
}

impl WalletAction {
    /// Parse the payload of a `request_generator` action. Returns `None` when the action is of a
    /// different kind or the payload does not decode.
    pub fn request_generator_data(&self) -> Option<(HeaderHash, u32)> {
        if self.name != REQUEST_GENERATOR_ACTION {
            return None;
        }
        let data: RequestGeneratorData = match serde_json::from_str(&self.data) {
            Ok(data) => data,
            Err(e) => {
                warn!(
                    target: LOG_TARGET,
                    "Could not decode payload of pending action '{}': {}", self.name, e
                );
                return None;
            },
        };
        let bytes = match hex::decode(&data.header_hash) {
            Ok(bytes) if bytes.len() == BLOCK_HASH_LENGTH => bytes,
            _ => {
                warn!(
                    target: LOG_TARGET,
                    "Pending action '{}' carries a malformed header hash", self.name
                );
                return None;
            },
        };
        let mut header_hash = [0u8; BLOCK_HASH_LENGTH];
        header_hash.copy_from_slice(&bytes);
        Some((header_hash, data.height))
    }
}

/// The decoded contents of a wallet backup file. Parsing the file itself (and decrypting it with
/// the wallet key) happens outside this crate.
#[derive(Debug, Clone, Default)]
pub struct WalletBackup {
    pub start_height: Option<u32>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn request_generator_payload_round_trip() {
        let action = WalletAction {
            name: REQUEST_GENERATOR_ACTION.to_string(),
            data: format!(r#"{{"header_hash": "{}", "height": 42}}"#, "11".repeat(32)),
        };
        let (hash, height) = action.request_generator_data().unwrap();
        assert_eq!(hash, [0x11u8; 32]);
        assert_eq!(height, 42);
    }

    #[test]
    fn unknown_action_is_ignored() {
        let action = WalletAction {
            name: "rescan".to_string(),
            data: "{}".to_string(),
        };
        assert!(action.request_generator_data().is_none());
    }

    #[test]
    fn malformed_payload_is_ignored() {
        let action = WalletAction {
            name: REQUEST_GENERATOR_ACTION.to_string(),
            data: r#"{"header_hash": "zz", "height": 1}"#.to_string(),
        };
        assert!(action.request_generator_data().is_none());

        let action = WalletAction {
            name: REQUEST_GENERATOR_ACTION.to_string(),
            data: "not json".to_string(),
        };
        assert!(action.request_generator_data().is_none());
    }
}
