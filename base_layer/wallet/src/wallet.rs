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

//! The wallet node facade.
//!
//! Owns the lifecycle (key selection, state manager creation, backup reconciliation, shutdown),
//! the background tasks (message dispatch, sync serialization, pending-transaction replay and the
//! preferred-full-node check) and the at-least-once resend queue for wallet-originated
//! transactions and pending actions.

use crate::{
    cache::BlockCache,
    config::{ConsensusConstants, WalletNodeConfig},
    connectivity::{CommsError, InboundMessage, PeerConnection, PeerDiscoveryHandle, PeerInfo, WalletComms},
    error::WalletNodeError,
    handler::InboundHandler,
    keychain::{Keychain, PrivateKey},
    models::WalletBackup,
    protocol::WalletRequest,
    state_manager::{StateManagerFactory, StateManagerHandle, WalletStateManager},
    sync::{SyncRequest, WalletSynchronizer},
    util::watch::Watch,
};
use futures::future::{self, Either};
use log::*;
use sesame_shutdown::{Shutdown, ShutdownSignal};
use std::{fs, path::PathBuf, sync::Arc};
use tokio::{
    net,
    sync::{broadcast, mpsc},
    task::JoinHandle,
    time,
};

const LOG_TARGET: &str = "wallet::node";

const EVENT_BUFFER_SIZE: usize = 50;

// The comms and discovery handles arrive after startup and go away on close; a watch holds the
// current value without a lock that could fail
type CommsHandle = Watch<Option<WalletComms>>;

/// Status events published by the node's background tasks.
#[derive(Debug, Clone)]
pub enum WalletNodeEvent {
    SyncStarted,
    SyncCompleted { tip_height: u32 },
    SyncFailed(String),
}

/// Replays unconfirmed transactions and pending actions to full nodes. Delivery is at-least-once;
/// deduplication by `sent_to` is the transport's concern. Liveness of the node, the state manager
/// and the comms layer is re-checked between every emitted message.
pub(crate) struct ResendQueue<W> {
    state_manager: StateManagerHandle<W>,
    comms: CommsHandle,
    shutdown: ShutdownSignal,
}

impl<W> Clone for ResendQueue<W> {
    fn clone(&self) -> Self {
        Self {
            state_manager: self.state_manager.clone(),
            comms: self.comms.clone(),
            shutdown: self.shutdown.clone(),
        }
    }
}

impl<W: WalletStateManager> ResendQueue<W> {
    fn state_manager(&self) -> Option<Arc<W>> {
        if self.shutdown.is_triggered() {
            return None;
        }
        self.state_manager.get()
    }

    fn comms(&self) -> Option<WalletComms> {
        if self.shutdown.is_triggered() {
            return None;
        }
        self.comms.current()
    }

    async fn messages_to_resend(&self) -> Vec<WalletRequest> {
        let state_manager = match self.state_manager() {
            Some(state_manager) => state_manager,
            None => return Vec::new(),
        };
        state_manager
            .get_not_sent_transactions()
            .await
            .into_iter()
            .filter_map(|record| {
                record
                    .spend_bundle
                    .map(|transaction| WalletRequest::SendTransaction { transaction })
            })
            .collect()
    }

    async fn action_messages(&self) -> Vec<WalletRequest> {
        let state_manager = match self.state_manager() {
            Some(state_manager) => state_manager,
            None => return Vec::new(),
        };
        state_manager
            .get_all_pending_actions()
            .await
            .iter()
            .filter_map(|action| {
                action
                    .request_generator_data()
                    .map(|(header_hash, height)| WalletRequest::RequestGenerator { height, header_hash })
            })
            .collect()
    }

    /// Broadcast everything that still needs to reach a full node.
    pub async fn resend_queue(&self) {
        for message in self.messages_to_resend().await {
            let comms = match self.comms() {
                Some(comms) => comms,
                None => return,
            };
            if let Err(e) = comms.send_to_all(message) {
                warn!(target: LOG_TARGET, "Could not broadcast pending transaction: {}", e);
                return;
            }
        }
        for message in self.action_messages().await {
            let comms = match self.comms() {
                Some(comms) => comms,
                None => return,
            };
            if let Err(e) = comms.send_to_all(message) {
                warn!(target: LOG_TARGET, "Could not broadcast pending action: {}", e);
                return;
            }
        }
    }

    /// Replay unconfirmed transactions to a peer that just connected.
    pub async fn on_connect(&self, peer: PeerConnection) {
        for message in self.messages_to_resend().await {
            if self.state_manager().is_none() {
                return;
            }
            if let Err(e) = peer.send(message) {
                warn!(
                    target: LOG_TARGET,
                    "Could not replay transaction to {}: {}",
                    peer.peer_info(),
                    e
                );
                return;
            }
        }
    }
}

/// A light wallet node for the Sesame chain.
///
/// The node maintains an authenticated view of the chain and of the wallet's coin set by talking
/// to full nodes, without ever downloading full blocks. Wallet state itself is persisted by the
/// injected state manager; this type orchestrates syncing, message handling and peer policy.
pub struct WalletNode<K, F: StateManagerFactory> {
    config: WalletNodeConfig,
    constants: ConsensusConstants,
    root_path: PathBuf,
    keychain: K,
    factory: F,
    state_manager: StateManagerHandle<F::StateManager>,
    cache: BlockCache,
    comms: CommsHandle,
    discovery: Watch<Option<PeerDiscoveryHandle>>,
    starting_height: Watch<u32>,
    shutdown: Shutdown,
    event_publisher: broadcast::Sender<WalletNodeEvent>,
    sync_request_tx: mpsc::UnboundedSender<SyncRequest>,
    sync_request_rx: Option<mpsc::UnboundedReceiver<SyncRequest>>,
    close_tasks: Vec<JoinHandle<()>>,
}

impl<K, F> WalletNode<K, F>
where
    K: Keychain,
    F: StateManagerFactory,
{
    pub fn new(
        config: WalletNodeConfig,
        constants: ConsensusConstants,
        root_path: PathBuf,
        keychain: K,
        factory: F,
    ) -> Self {
        let (sync_request_tx, sync_request_rx) = mpsc::unbounded_channel();
        let (event_publisher, _) = broadcast::channel(EVENT_BUFFER_SIZE);
        let starting_height = Watch::new(config.starting_height);
        Self {
            config,
            constants,
            root_path,
            keychain,
            factory,
            state_manager: StateManagerHandle::new(),
            cache: BlockCache::new(),
            comms: Watch::new(None),
            discovery: Watch::new(None),
            starting_height,
            shutdown: Shutdown::new(),
            event_publisher,
            sync_request_tx,
            sync_request_rx: Some(sync_request_rx),
            close_tasks: Vec::new(),
        }
    }

    pub fn get_event_stream(&self) -> broadcast::Receiver<WalletNodeEvent> {
        self.event_publisher.subscribe()
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.to_signal()
    }

    pub fn cache(&self) -> BlockCache {
        self.cache.clone()
    }

    pub fn starting_height(&self) -> Watch<u32> {
        self.starting_height.clone()
    }

    pub fn state_manager(&self) -> StateManagerHandle<F::StateManager> {
        self.state_manager.clone()
    }

    /// The handler used by the dispatch task. Exposed so the additions/removals responders can
    /// share it.
    pub fn inbound_handler(&self) -> InboundHandler<F::StateManager> {
        InboundHandler::new(
            self.state_manager.clone(),
            self.cache.clone(),
            self.sync_request_tx.clone(),
            self.config.short_sync_threshold,
            self.shutdown.to_signal(),
        )
    }

    /// Manually kick off a sync against the given peer.
    pub fn trigger_sync(&self, peer: PeerConnection) {
        let _ = self.sync_request_tx.send(SyncRequest { peer });
    }

    fn get_key_for_fingerprint(&self, fingerprint: Option<u32>) -> Option<PrivateKey> {
        let private_keys = self.keychain.get_all_private_keys();
        if private_keys.is_empty() {
            warn!(
                target: LOG_TARGET,
                "No keys present. Create keys before starting the wallet"
            );
            return None;
        }
        match fingerprint {
            Some(fingerprint) => private_keys.into_iter().find(|key| key.fingerprint() == fingerprint),
            None => private_keys.into_iter().next(),
        }
    }

    /// Start the wallet for one of the keychain's keys.
    ///
    /// Selects the key (by fingerprint, else the first), opens the per-key wallet database via
    /// the state manager factory, reconciles backup-initialized state and spawns the node's
    /// background tasks. Call this before [`WalletNode::set_comms`].
    pub async fn start(
        &mut self,
        fingerprint: Option<u32>,
        new_wallet: bool,
        backup: Option<WalletBackup>,
        skip_backup_import: bool,
    ) -> Result<(), WalletNodeError> {
        let private_key = self
            .get_key_for_fingerprint(fingerprint)
            .ok_or(WalletNodeError::KeyNotFound)?;
        let fingerprint = private_key.fingerprint();
        let db_path = self
            .root_path
            .join(format!("{}-{}", self.config.database_path, fingerprint));
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let state_manager = Arc::new(
            self.factory
                .create(private_key, &self.config, db_path, self.constants)
                .await?,
        );

        let backup_settings = state_manager.backup_settings().await;
        if !backup_settings.user_initialized {
            if new_wallet {
                state_manager.user_created_new_wallet().await;
                state_manager.set_new_wallet(true);
            } else if skip_backup_import {
                state_manager.user_skipped_backup_import().await;
            } else if let Some(backup) = backup.as_ref() {
                state_manager.import_backup_info(backup).await?;
            } else {
                // The user has to decide between restoring a backup, skipping it, or creating a
                // new wallet before any chain state may be written
                state_manager.close_all_stores().await;
                return Err(WalletNodeError::NeedsBackupDecision);
            }
        }

        let starting_height = backup
            .as_ref()
            .and_then(|backup| backup.start_height)
            .map(|height| height.saturating_sub(self.config.start_height_buffer))
            .unwrap_or(0);
        self.starting_height.send(starting_height);

        if self.shutdown.is_triggered() {
            self.shutdown = Shutdown::new();
        }

        let (pending_tx, pending_rx) = mpsc::unbounded_channel();
        state_manager.set_pending_tx_sender(pending_tx);
        self.state_manager.set(state_manager);

        self.spawn_pending_tx_task(pending_rx);
        self.spawn_sync_task();
        self.spawn_full_node_check_task();
        info!(
            target: LOG_TARGET,
            "Wallet node started for key fingerprint {}", fingerprint
        );
        Ok(())
    }

    /// Attach the transport. Spawns the inbound dispatch task and the connection replay task, and
    /// lets peer discovery loose.
    pub fn set_comms(
        &mut self,
        comms: WalletComms,
        discovery: PeerDiscoveryHandle,
        mut inbound: mpsc::UnboundedReceiver<InboundMessage>,
    ) {
        self.comms.send(Some(comms.clone()));
        self.discovery.send(Some(discovery.clone()));
        discovery.start();

        let handler = self.inbound_handler();
        let signal = self.shutdown.to_signal();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = signal.wait() => break,
                    message = inbound.recv() => match message {
                        Some(message) => {
                            if let Err(e) = handler.handle_message(message).await {
                                error!(target: LOG_TARGET, "Failed to handle full node message: {}", e);
                            }
                        },
                        None => break,
                    },
                }
            }
            debug!(target: LOG_TARGET, "Inbound dispatch task stopped");
        });

        let resend = self.resend_queue();
        let mut connection_events = comms.subscribe_connection_events();
        let signal = self.shutdown.to_signal();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = signal.wait() => break,
                    event = connection_events.recv() => match event {
                        Ok(peer) => {
                            debug!(target: LOG_TARGET, "New full node connection: {}", peer.peer_info());
                            resend.on_connect(peer).await;
                        },
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            debug!(
                                target: LOG_TARGET,
                                "Connection event subscriber lagged by {} event(s)", skipped
                            );
                        },
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });
    }

    fn resend_queue(&self) -> ResendQueue<F::StateManager> {
        ResendQueue {
            state_manager: self.state_manager.clone(),
            comms: self.comms.clone(),
            shutdown: self.shutdown.to_signal(),
        }
    }

    fn spawn_pending_tx_task(&self, mut pending_rx: mpsc::UnboundedReceiver<()>) {
        let resend = self.resend_queue();
        let signal = self.shutdown.to_signal();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = signal.wait() => break,
                    notification = pending_rx.recv() => match notification {
                        Some(_) => resend.resend_queue().await,
                        None => break,
                    },
                }
            }
        });
    }

    /// Sync requests are serialized through a single task: the handler (or an API caller) may
    /// fire them at any rate, but only one sync runs at a time and duplicates raised while it ran
    /// are dropped afterwards.
    fn spawn_sync_task(&mut self) {
        let mut sync_requests = match self.sync_request_rx.take() {
            Some(receiver) => receiver,
            None => {
                let (sender, receiver) = mpsc::unbounded_channel();
                self.sync_request_tx = sender;
                receiver
            },
        };
        let config = self.config.clone();
        let constants = self.constants;
        let state_manager = self.state_manager.clone();
        let cache = self.cache.clone();
        let comms = self.comms.clone();
        let handler = self.inbound_handler();
        let starting_height = self.starting_height.clone();
        let signal = self.shutdown.to_signal();
        let events = self.event_publisher.clone();
        let resend = self.resend_queue();

        tokio::spawn(async move {
            loop {
                let request = tokio::select! {
                    _ = signal.wait() => break,
                    request = sync_requests.recv() => match request {
                        Some(request) => request,
                        None => break,
                    },
                };
                let wsm = match state_manager.get() {
                    Some(wsm) => wsm,
                    None => continue,
                };
                let wallet_comms = match comms.current() {
                    Some(wallet_comms) => wallet_comms,
                    None => {
                        debug!(target: LOG_TARGET, "Sync requested before comms were set up");
                        continue;
                    },
                };

                wsm.set_sync_mode(true);
                let _ = events.send(WalletNodeEvent::SyncStarted);
                let mut synchronizer = WalletSynchronizer::new(
                    config.clone(),
                    constants,
                    state_manager.clone(),
                    cache.clone(),
                    wallet_comms,
                    handler.clone(),
                    starting_height.clone(),
                    signal.clone(),
                );
                let result = synchronizer.synchronize(request.peer).await;
                wsm.set_sync_mode(false);

                match result {
                    Ok(()) => {
                        if !signal.is_triggered() {
                            let tip_height = wsm.max_block_height().await;
                            let _ = events.send(WalletNodeEvent::SyncCompleted { tip_height });
                        }
                    },
                    Err(e) => {
                        warn!(target: LOG_TARGET, "Wallet sync failed: {}", e);
                        let _ = events.send(WalletNodeEvent::SyncFailed(e.to_string()));
                    },
                }
                resend.resend_queue().await;

                // Triggers that accumulated while syncing are satisfied by the sync that just ran
                while sync_requests.try_recv().is_ok() {}
            }
        });
    }

    /// Periodically check whether the configured preferred full node is connected; once it is,
    /// stop discovery and drop other full-node connections.
    fn spawn_full_node_check_task(&self) {
        let full_node_peer = match self.config.full_node_peer.clone() {
            Some(peer) => peer,
            None => return,
        };
        let comms = self.comms.clone();
        let discovery = self.discovery.clone();
        let check_interval = self.config.full_node_check_interval;
        let max_checks = self.config.max_full_node_checks;
        let signal = self.shutdown.to_signal();
        tokio::spawn(async move {
            let mut checks = 0;
            while !signal.is_triggered() && checks < max_checks {
                let connected = match comms.current() {
                    Some(wallet_comms) => match has_full_node(&wallet_comms, &full_node_peer).await {
                        Ok(connected) => connected,
                        Err(e) => {
                            warn!(target: LOG_TARGET, "Could not check full node connections: {}", e);
                            false
                        },
                    },
                    None => false,
                };
                if connected {
                    if let Some(discovery) = discovery.current() {
                        discovery.ensure_is_closed();
                    }
                    break;
                }
                checks += 1;
                // If both are ready, `future::select` prefers the shutdown signal
                match future::select(signal.clone(), Box::pin(time::sleep(check_interval))).await {
                    Either::Left(_) => break,
                    Either::Right(_) => {},
                }
            }
        });
    }

    /// Begin shutting the node down. Store and discovery teardown runs in the background; await
    /// it with [`WalletNode::await_closed`].
    pub fn close(&mut self) {
        info!(target: LOG_TARGET, "Wallet node shutting down");
        self.shutdown.trigger();
        if let Some(state_manager) = self.state_manager.get() {
            self.close_tasks.push(tokio::spawn(async move {
                state_manager.close_all_stores().await;
            }));
        }
        if let Some(discovery) = self.discovery.current() {
            discovery.ensure_is_closed();
        }
    }

    pub async fn await_closed(&mut self) {
        for task in self.close_tasks.drain(..) {
            if let Err(e) = task.await {
                warn!(target: LOG_TARGET, "Close task failed: {}", e);
            }
        }
        self.state_manager.clear();
    }
}

/// True when the pinned full node (by configured address or its resolved IP) is among the current
/// connections. When it is, all other full-node connections are closed.
async fn has_full_node(comms: &WalletComms, full_node_peer: &PeerInfo) -> Result<bool, CommsError> {
    let mut pinned = vec![full_node_peer.clone()];
    match net::lookup_host((full_node_peer.host.as_str(), full_node_peer.port)).await {
        Ok(addrs) => {
            for addr in addrs {
                pinned.push(PeerInfo::new(addr.ip().to_string(), addr.port()));
            }
        },
        Err(e) => {
            debug!(
                target: LOG_TARGET,
                "Could not resolve full node peer {}: {}", full_node_peer, e
            );
        },
    }

    let connections = comms.full_node_connections()?;
    let connected = connections.iter().any(|c| pinned.contains(c.peer_info()));
    if connected {
        info!(
            target: LOG_TARGET,
            "Will not attempt to connect to other nodes, already connected to {}", full_node_peer
        );
        for connection in connections {
            if !pinned.contains(connection.peer_info()) {
                info!(
                    target: LOG_TARGET,
                    "Closing unnecessary connection to {}",
                    connection.peer_info()
                );
                comms.close_connection(connection.peer_info())?;
            }
        }
    }
    Ok(connected)
}
