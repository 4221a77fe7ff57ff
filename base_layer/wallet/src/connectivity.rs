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

//! The seam between the node and the framed transport.
//!
//! The transport registers a [PeerConnection] per connected full node; the node fans messages out
//! through [WalletComms] and receives [InboundMessage]s on a channel the transport feeds. The
//! introducer-driven peer discovery service is likewise external and only commanded through a
//! [PeerDiscoveryHandle].

use crate::protocol::{WalletRequest, WalletResponse};
use log::*;
use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error, Formatter},
    sync::{Arc, RwLock},
};
use tokio::sync::{broadcast, mpsc};

const LOG_TARGET: &str = "wallet::connectivity";

const CONNECTION_EVENT_BUFFER_SIZE: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum CommsError {
    #[error("Connection to `{0}` is closed")]
    ConnectionClosed(PeerInfo),
    #[error("Connection registry read lock error: {0}")]
    ReadLock(String),
    #[error("Connection registry write lock error: {0}")]
    WriteLock(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub host: String,
    pub port: u16,
}

impl PeerInfo {
    pub fn new<T: Into<String>>(host: T, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl Display for PeerInfo {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result<(), Error> {
        write!(fmt, "{}:{}", self.host, self.port)
    }
}

/// A cheaply cloneable handle to a single full-node connection. Dropping all clones closes the
/// outbound channel, which the transport treats as a disconnect.
#[derive(Debug, Clone)]
pub struct PeerConnection {
    peer_info: PeerInfo,
    sender: mpsc::UnboundedSender<WalletRequest>,
}

impl PeerConnection {
    /// Create a connection handle together with the receiver the transport drains.
    pub fn new(peer_info: PeerInfo) -> (Self, mpsc::UnboundedReceiver<WalletRequest>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { peer_info, sender }, receiver)
    }

    pub fn peer_info(&self) -> &PeerInfo {
        &self.peer_info
    }

    pub fn send(&self, request: WalletRequest) -> Result<(), CommsError> {
        self.sender
            .send(request)
            .map_err(|_| CommsError::ConnectionClosed(self.peer_info.clone()))
    }
}

/// A message received from a full node, tagged with the connection it arrived on so follow-up
/// requests can go back to the same peer.
#[derive(Debug)]
pub struct InboundMessage {
    pub peer: PeerConnection,
    pub message: WalletResponse,
}

#[derive(Debug)]
struct CommsInner {
    connections: RwLock<Vec<PeerConnection>>,
    connection_events: broadcast::Sender<PeerConnection>,
}

/// Registry of the currently connected full nodes.
#[derive(Debug, Clone)]
pub struct WalletComms {
    inner: Arc<CommsInner>,
}

impl WalletComms {
    pub fn new() -> Self {
        let (connection_events, _) = broadcast::channel(CONNECTION_EVENT_BUFFER_SIZE);
        Self {
            inner: Arc::new(CommsInner {
                connections: RwLock::new(Vec::new()),
                connection_events,
            }),
        }
    }

    /// Register a newly established full-node connection and notify subscribers.
    pub fn add_connection(&self, connection: PeerConnection) -> Result<(), CommsError> {
        let mut lock = self
            .inner
            .connections
            .write()
            .map_err(|e| CommsError::WriteLock(e.to_string()))?;
        lock.retain(|c| c.peer_info() != connection.peer_info());
        lock.push(connection.clone());
        drop(lock);
        let _ = self.inner.connection_events.send(connection);
        Ok(())
    }

    pub fn full_node_connections(&self) -> Result<Vec<PeerConnection>, CommsError> {
        Ok(self
            .inner
            .connections
            .read()
            .map_err(|e| CommsError::ReadLock(e.to_string()))?
            .clone())
    }

    /// Drop a connection from the registry. The transport observes the closed channel and tears
    /// the socket down.
    pub fn close_connection(&self, peer: &PeerInfo) -> Result<(), CommsError> {
        self.inner
            .connections
            .write()
            .map_err(|e| CommsError::WriteLock(e.to_string()))?
            .retain(|c| c.peer_info() != peer);
        Ok(())
    }

    pub fn subscribe_connection_events(&self) -> broadcast::Receiver<PeerConnection> {
        self.inner.connection_events.subscribe()
    }

    /// Best-effort fan-out to every connected full node. A dropped connection is logged and
    /// skipped; only a registry failure is an error.
    pub fn send_to_all(&self, request: WalletRequest) -> Result<(), CommsError> {
        for connection in self.full_node_connections()? {
            if let Err(e) = connection.send(request.clone()) {
                warn!(
                    target: LOG_TARGET,
                    "Could not send '{}' to {}: {}",
                    request,
                    connection.peer_info(),
                    e
                );
            }
        }
        Ok(())
    }
}

impl Default for WalletComms {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryRequest {
    Start,
    EnsureClosed,
}

/// Command handle to the external peer discovery service. Sends are fire-and-forget; a service
/// that has already stopped simply drops them.
#[derive(Debug, Clone)]
pub struct PeerDiscoveryHandle {
    sender: mpsc::UnboundedSender<DiscoveryRequest>,
}

impl PeerDiscoveryHandle {
    pub fn new(sender: mpsc::UnboundedSender<DiscoveryRequest>) -> Self {
        Self { sender }
    }

    pub fn start(&self) {
        let _ = self.sender.send(DiscoveryRequest::Start);
    }

    pub fn ensure_is_closed(&self) {
        let _ = self.sender.send(DiscoveryRequest::EnsureClosed);
    }
}
