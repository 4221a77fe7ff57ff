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

//! # Sesame light wallet
//!
//! A synchronization engine for light wallets on the Sesame proof-of-space/proof-of-time chain.
//! The wallet maintains an authenticated view of the chain and of its own coin set by talking to
//! one or more full nodes over a message-oriented transport, without storing full blocks:
//!
//! - a pipelined header ingestion path tolerant of out-of-order arrivals and reorgs,
//! - a sampling-based fast sync that statistically verifies a chain prefix via proof hashes and
//!   difficulty weights,
//! - filter-driven requests for the coin additions and removals relevant to the wallet, and
//! - at-least-once redelivery of pending transactions across reconnects.
//!
//! Key storage, wallet persistence, consensus validation, peer discovery and the framed transport
//! are injected; see [state_manager], [keychain] and [connectivity] for the seams.

pub mod blocks;
pub mod cache;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod handler;
pub mod keychain;
pub mod models;
pub mod protocol;
pub mod state_manager;
pub mod sync;
pub mod util;
pub mod wallet;

pub use error::WalletNodeError;
pub use wallet::{WalletNode, WalletNodeEvent};
