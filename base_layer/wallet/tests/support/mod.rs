// Copyright 2022. The Sesame Project
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

#![allow(dead_code)]

use async_trait::async_trait;
use sesame_common_types::types::{CoinId, HeaderHash, TxId};
use sesame_shutdown::Shutdown;
use sesame_wallet::{
    blocks::{BlockRecord, Challenge, HeaderBlock, HeaderData, ProofHashTriple, ProofOfSpace, ProofOfTime,
             TransactionsFilter},
    cache::{BlockCache, CachedBlock},
    config::{ConsensusConstants, WalletNodeConfig},
    connectivity::{InboundMessage, PeerConnection, PeerInfo, WalletComms},
    handler::InboundHandler,
    keychain::{Keychain, PrivateKey},
    models::{TransactionRecord, WalletAction, WalletBackup},
    protocol::{RespondHeader, WalletRequest, WalletResponse},
    state_manager::{BackupSettings, ReceiveBlockResult, StateManagerError, StateManagerFactory, StateManagerHandle,
                    WalletStateManager},
    sync::{SyncRequest, WalletSynchronizer},
    util::watch::Watch,
};
use std::{
    cmp,
    collections::{BTreeMap, HashMap},
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, RwLock,
    },
    time::Duration,
};
use tokio::{sync::mpsc, task::JoinHandle};

pub const TEST_DIFFICULTY: u64 = 10;
pub const TEST_GENESIS_CHALLENGE: HeaderHash = [9u8; 32];

pub fn test_constants() -> ConsensusConstants {
    ConsensusConstants {
        genesis_challenge_hash: TEST_GENESIS_CHALLENGE,
        difficulty_starting: TEST_DIFFICULTY,
    }
}

pub fn test_config() -> WalletNodeConfig {
    WalletNodeConfig {
        num_sync_batches: 10,
        sync_request_timeout: Duration::from_secs(5),
        sync_probe_interval: Duration::from_millis(100),
        short_probe_interval: Duration::from_millis(50),
        full_node_check_interval: Duration::from_millis(50),
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------------------------
// Chain fixture
// ---------------------------------------------------------------------------------------------

/// A deterministic chain of header blocks with internally consistent hashes, challenges, weights
/// and proof-hash triples. Index equals height; height 0 is the genesis block.
#[derive(Debug, Clone)]
pub struct ChainFixture {
    pub header_blocks: Vec<HeaderBlock>,
    pub header_hashes: Vec<HeaderHash>,
    pub proof_hashes: Vec<ProofHashTriple>,
}

fn make_block(height: u32, prev: Option<&HeaderBlock>, salt: u8) -> HeaderBlock {
    let (prev_header_hash, challenge_hash, weight, total_iters) = match prev {
        Some(prev) => (
            prev.header_hash(),
            prev.challenge.hash(),
            prev.weight + TEST_DIFFICULTY as u128,
            prev.data.total_iters + 1000,
        ),
        None => ([0u8; 32], TEST_GENESIS_CHALLENGE, TEST_DIFFICULTY as u128, 1000),
    };
    let proof_of_space = ProofOfSpace {
        challenge_hash,
        plot_public_key: vec![salt; 48],
        size: 32,
        proof: vec![height as u8, salt],
    };
    let proofs_hash = proof_of_space.hash();
    HeaderBlock {
        height,
        weight,
        prev_header_hash,
        proof_of_space,
        proof_of_time: ProofOfTime {
            challenge_hash,
            iterations_needed: 1000,
            output: vec![salt; 8],
        },
        challenge: Challenge {
            prev_challenge_hash: challenge_hash,
            proofs_hash,
            new_work_difficulty: if height == 0 { Some(TEST_DIFFICULTY) } else { None },
            total_iters,
            total_weight: weight,
        },
        data: HeaderData {
            timestamp: 1_600_000_000 + height as u64,
            total_iters,
        },
    }
}

impl ChainFixture {
    pub fn generate(len: usize) -> Self {
        Self::generate_with_salt(len, 1)
    }

    pub fn generate_with_salt(len: usize, salt: u8) -> Self {
        let mut header_blocks: Vec<HeaderBlock> = Vec::with_capacity(len);
        for height in 0..len {
            let block = make_block(height as u32, header_blocks.last(), salt);
            header_blocks.push(block);
        }
        Self::from_blocks(header_blocks)
    }

    /// A chain sharing this fixture's blocks up to and including `fork_height`, then diverging.
    pub fn fork(&self, fork_height: u32, len: usize, salt: u8) -> Self {
        let mut header_blocks: Vec<HeaderBlock> =
            self.header_blocks[..=(fork_height as usize)].to_vec();
        for height in (fork_height as usize + 1)..len {
            let block = make_block(height as u32, header_blocks.last(), salt);
            header_blocks.push(block);
        }
        Self::from_blocks(header_blocks)
    }

    fn from_blocks(header_blocks: Vec<HeaderBlock>) -> Self {
        let header_hashes = header_blocks.iter().map(|b| b.header_hash()).collect();
        let proof_hashes = header_blocks
            .iter()
            .map(|b| ProofHashTriple {
                proof_of_space_hash: b.proof_of_space.hash(),
                difficulty_change: b.challenge.new_work_difficulty,
                total_iters: b.data.total_iters,
            })
            .collect();
        Self {
            header_blocks,
            header_hashes,
            proof_hashes,
        }
    }

    pub fn respond_header(&self, height: u32) -> RespondHeader {
        RespondHeader {
            header_block: self.header_blocks[height as usize].clone(),
            transactions_filter: TransactionsFilter(vec![]),
        }
    }

    pub fn record(&self, height: u32) -> BlockRecord {
        record_from_header(&self.header_blocks[height as usize])
    }
}

pub fn record_from_header(block: &HeaderBlock) -> BlockRecord {
    BlockRecord {
        hash: block.header_hash(),
        prev_hash: block.prev_header_hash,
        height: block.height,
        weight: block.weight,
        additions: Some(vec![]),
        removals: Some(vec![]),
        total_iters: block.data.total_iters,
        new_challenge_hash: Some(block.challenge.hash()),
        timestamp: block.data.timestamp,
    }
}

// ---------------------------------------------------------------------------------------------
// In-memory state manager
// ---------------------------------------------------------------------------------------------

#[derive(Debug, Default)]
struct ChainData {
    block_records: HashMap<HeaderHash, BlockRecord>,
    height_to_hash: BTreeMap<u32, HeaderHash>,
    lca: HeaderHash,
}

#[derive(Debug)]
struct MockInner {
    chain: RwLock<ChainData>,
    sync_mode: AtomicBool,
    new_wallet: AtomicBool,
    backup_initialized: AtomicBool,
    closed: AtomicBool,
    not_sent: RwLock<Vec<TransactionRecord>>,
    pending_actions: RwLock<Vec<WalletAction>>,
    relevant_coins: RwLock<HashMap<HeaderHash, (Vec<CoinId>, Vec<CoinId>)>>,
    reject_height: RwLock<Option<u32>>,
    pending_tx_sender: RwLock<Option<mpsc::UnboundedSender<()>>>,
}

/// An in-memory wallet state manager implementing the documented contracts, including the full
/// `validate_select_proofs` check set.
#[derive(Debug, Clone)]
pub struct MockStateManager {
    inner: Arc<MockInner>,
}

impl MockStateManager {
    /// A state manager with only the given genesis block committed.
    pub fn with_genesis(genesis: BlockRecord) -> Self {
        let mut chain = ChainData::default();
        chain.lca = genesis.hash;
        chain.height_to_hash.insert(0, genesis.hash);
        chain.block_records.insert(genesis.hash, genesis);
        Self {
            inner: Arc::new(MockInner {
                chain: RwLock::new(chain),
                sync_mode: AtomicBool::new(false),
                new_wallet: AtomicBool::new(false),
                backup_initialized: AtomicBool::new(true),
                closed: AtomicBool::new(false),
                not_sent: RwLock::new(Vec::new()),
                pending_actions: RwLock::new(Vec::new()),
                relevant_coins: RwLock::new(HashMap::new()),
                reject_height: RwLock::new(None),
                pending_tx_sender: RwLock::new(None),
            }),
        }
    }

    /// A state manager with the fixture's blocks committed up to and including `upto`.
    pub fn from_fixture(fixture: &ChainFixture, upto: u32) -> Self {
        let manager = Self::with_genesis(fixture.record(0));
        {
            let mut chain = manager.inner.chain.write().unwrap();
            for height in 1..=upto {
                let record = fixture.record(height);
                chain.height_to_hash.insert(height, record.hash);
                chain.lca = record.hash;
                chain.block_records.insert(record.hash, record);
            }
        }
        manager
    }

    pub fn set_backup_initialized(&self, initialized: bool) {
        self.inner.backup_initialized.store(initialized, Ordering::SeqCst);
    }

    pub fn add_not_sent_transaction(&self, record: TransactionRecord) {
        self.inner.not_sent.write().unwrap().push(record);
    }

    pub fn add_pending_action(&self, action: WalletAction) {
        self.inner.pending_actions.write().unwrap().push(action);
    }

    pub fn set_relevant_coins(&self, hash: HeaderHash, additions: Vec<CoinId>, removals: Vec<CoinId>) {
        self.inner.relevant_coins.write().unwrap().insert(hash, (additions, removals));
    }

    pub fn reject_blocks_at_height(&self, height: u32) {
        *self.inner.reject_height.write().unwrap() = Some(height);
    }

    /// Ping the node the way the production state manager does when a transaction enters the
    /// pending state.
    pub fn notify_pending_tx(&self) {
        if let Some(sender) = self.inner.pending_tx_sender.read().unwrap().as_ref() {
            let _ = sender.send(());
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub fn committed_block_count(&self) -> usize {
        self.inner.chain.read().unwrap().block_records.len()
    }

    pub fn has_block(&self, hash: &HeaderHash) -> bool {
        self.inner.chain.read().unwrap().block_records.contains_key(hash)
    }

    pub fn block(&self, hash: &HeaderHash) -> Option<BlockRecord> {
        self.inner.chain.read().unwrap().block_records.get(hash).cloned()
    }

    pub fn tip_height(&self) -> u32 {
        self.inner
            .chain
            .read()
            .unwrap()
            .height_to_hash
            .keys()
            .next_back()
            .copied()
            .unwrap_or(0)
    }

    fn active_difficulty(proof_hashes: &[ProofHashTriple], height: u32) -> u64 {
        proof_hashes[..=(height as usize)]
            .iter()
            .rev()
            .find_map(|triple| triple.difficulty_change)
            .unwrap_or(TEST_DIFFICULTY)
    }
}

#[async_trait]
impl WalletStateManager for MockStateManager {
    async fn find_fork_point_alternate_chain(&self, header_hashes: &[HeaderHash]) -> u32 {
        let chain = self.inner.chain.read().unwrap();
        let max_height = chain.height_to_hash.keys().next_back().copied().unwrap_or(0);
        let top = cmp::min(max_height as usize, header_hashes.len().saturating_sub(1));
        for height in (0..=top).rev() {
            if chain.height_to_hash.get(&(height as u32)) == Some(&header_hashes[height]) {
                return height as u32;
            }
        }
        0
    }

    async fn validate_select_proofs(
        &self,
        proof_hashes: &[ProofHashTriple],
        sampled_odd_heights: &[u32],
        cached_blocks: &HashMap<HeaderHash, CachedBlock>,
        potential_header_hashes: &HashMap<u32, HeaderHash>,
    ) -> bool {
        let mut last_total_iters: Option<u128> = None;
        for &height in sampled_odd_heights {
            let hash = match potential_header_hashes.get(&height) {
                Some(hash) => hash,
                None => return false,
            };
            let cached = match cached_blocks.get(hash) {
                Some(cached) => cached,
                None => return false,
            };
            let header = &cached.header_block;
            if header.header_hash() != *hash {
                return false;
            }
            let triple = match proof_hashes.get(height as usize) {
                Some(triple) => triple,
                None => return false,
            };
            if triple.proof_of_space_hash != header.proof_of_space.hash()
                || triple.total_iters != header.data.total_iters
                || triple.difficulty_change != header.challenge.new_work_difficulty
            {
                return false;
            }
            if let Some(last) = last_total_iters {
                if triple.total_iters <= last {
                    return false;
                }
            }
            last_total_iters = Some(triple.total_iters);

            let prev_hash = match potential_header_hashes.get(&(height - 1)) {
                Some(hash) => hash,
                None => return false,
            };
            let prev = match cached_blocks.get(prev_hash) {
                Some(prev) => prev,
                None => return false,
            };
            if header.proof_of_space.challenge_hash != prev.header_block.challenge.hash() {
                return false;
            }
            let difficulty = Self::active_difficulty(proof_hashes, height);
            if header.weight - prev.header_block.weight != difficulty as u128 {
                return false;
            }
        }
        true
    }

    async fn receive_block(&self, block_record: BlockRecord, _header_block: Option<HeaderBlock>) -> ReceiveBlockResult {
        if *self.inner.reject_height.read().unwrap() == Some(block_record.height) {
            return ReceiveBlockResult::Invalid;
        }
        let mut chain = self.inner.chain.write().unwrap();
        if chain.block_records.contains_key(&block_record.hash) {
            return ReceiveBlockResult::AlreadyHave;
        }
        if !chain.block_records.contains_key(&block_record.prev_hash) {
            return ReceiveBlockResult::Disconnected;
        }
        let lca_weight = chain.block_records[&chain.lca].weight;
        let added_to_head = block_record.weight > lca_weight;
        let hash = block_record.hash;
        chain.block_records.insert(hash, block_record);
        if added_to_head {
            chain.lca = hash;
            chain.height_to_hash.clear();
            let mut cursor = hash;
            loop {
                let record = chain.block_records[&cursor].clone();
                chain.height_to_hash.insert(record.height, record.hash);
                if record.height == 0 {
                    break;
                }
                cursor = record.prev_hash;
            }
            ReceiveBlockResult::AddedToHead
        } else {
            ReceiveBlockResult::AddedAsOrphan
        }
    }

    async fn get_filter_additions_removals(
        &self,
        block_record: &BlockRecord,
        _filter: &TransactionsFilter,
    ) -> (Vec<CoinId>, Vec<CoinId>) {
        self.inner
            .relevant_coins
            .read()
            .unwrap()
            .get(&block_record.hash)
            .cloned()
            .unwrap_or_default()
    }

    async fn has_block_record(&self, hash: &HeaderHash) -> bool {
        self.inner.chain.read().unwrap().block_records.contains_key(hash)
    }

    async fn get_block_record(&self, hash: &HeaderHash) -> Option<BlockRecord> {
        self.inner.chain.read().unwrap().block_records.get(hash).cloned()
    }

    async fn lca(&self) -> BlockRecord {
        let chain = self.inner.chain.read().unwrap();
        chain.block_records[&chain.lca].clone()
    }

    async fn block_hash_at_height(&self, height: u32) -> Option<HeaderHash> {
        self.inner.chain.read().unwrap().height_to_hash.get(&height).copied()
    }

    async fn max_block_height(&self) -> u32 {
        self.tip_height()
    }

    fn sync_mode(&self) -> bool {
        self.inner.sync_mode.load(Ordering::SeqCst)
    }

    fn set_sync_mode(&self, sync_mode: bool) {
        self.inner.sync_mode.store(sync_mode, Ordering::SeqCst);
    }

    fn is_new_wallet(&self) -> bool {
        self.inner.new_wallet.load(Ordering::SeqCst)
    }

    fn set_new_wallet(&self, new_wallet: bool) {
        self.inner.new_wallet.store(new_wallet, Ordering::SeqCst);
    }

    async fn get_not_sent_transactions(&self) -> Vec<TransactionRecord> {
        self.inner.not_sent.read().unwrap().clone()
    }

    async fn get_all_pending_actions(&self) -> Vec<WalletAction> {
        self.inner.pending_actions.read().unwrap().clone()
    }

    async fn backup_settings(&self) -> BackupSettings {
        BackupSettings {
            user_initialized: self.inner.backup_initialized.load(Ordering::SeqCst),
        }
    }

    async fn user_created_new_wallet(&self) {
        self.inner.backup_initialized.store(true, Ordering::SeqCst);
    }

    async fn user_skipped_backup_import(&self) {
        self.inner.backup_initialized.store(true, Ordering::SeqCst);
    }

    async fn import_backup_info(&self, _backup: &WalletBackup) -> Result<(), StateManagerError> {
        self.inner.backup_initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn set_pending_tx_sender(&self, sender: mpsc::UnboundedSender<()>) {
        *self.inner.pending_tx_sender.write().unwrap() = Some(sender);
    }

    async fn close_all_stores(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
    }
}

/// Hands out clones of a pre-seeded state manager, so tests can inspect the instance the node
/// ends up using.
pub struct MockFactory {
    template: MockStateManager,
}

impl MockFactory {
    pub fn new(template: MockStateManager) -> Self {
        Self { template }
    }
}

#[async_trait]
impl StateManagerFactory for MockFactory {
    type StateManager = MockStateManager;

    async fn create(
        &self,
        _private_key: PrivateKey,
        _config: &WalletNodeConfig,
        _db_path: PathBuf,
        _constants: ConsensusConstants,
    ) -> Result<Self::StateManager, StateManagerError> {
        Ok(self.template.clone())
    }
}

// ---------------------------------------------------------------------------------------------
// Keychain
// ---------------------------------------------------------------------------------------------

pub struct TestKeychain {
    keys: Vec<PrivateKey>,
}

impl TestKeychain {
    pub fn empty() -> Self {
        Self { keys: Vec::new() }
    }

    pub fn with_keys(count: u8) -> Self {
        Self {
            keys: (1..=count).map(|i| PrivateKey::new([i; 32])).collect(),
        }
    }

    pub fn key(&self, index: usize) -> &PrivateKey {
        &self.keys[index]
    }
}

impl Keychain for TestKeychain {
    fn get_all_private_keys(&self) -> Vec<PrivateKey> {
        self.keys.clone()
    }
}

// ---------------------------------------------------------------------------------------------
// Scripted full node
// ---------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct ResponderOptions {
    /// Ignore every request
    pub silent: bool,
    /// Answer header hash requests with a rejection
    pub reject_header_hashes: bool,
    /// Do not answer proof hash requests
    pub drop_proof_hashes: bool,
    /// Do not answer individual header requests
    pub drop_headers: bool,
    /// Offset every proof triple's total_iters, which must fail sample validation
    pub tamper_proof_hashes: bool,
}

pub struct FullNodeHarness {
    pub peer: PeerConnection,
    pub requests: Arc<Mutex<Vec<WalletRequest>>>,
    pub task: JoinHandle<()>,
}

/// Spawn a task that behaves like a full node: it drains the peer connection's outbound channel
/// and feeds the scripted responses into the node's inbound channel.
pub fn spawn_full_node(
    fixture: Arc<ChainFixture>,
    options: ResponderOptions,
    inbound_tx: mpsc::UnboundedSender<InboundMessage>,
    peer_info: PeerInfo,
) -> FullNodeHarness {
    let (peer, mut outbound) = PeerConnection::new(peer_info);
    let requests = Arc::new(Mutex::new(Vec::new()));
    let request_log = requests.clone();
    let respond_peer = peer.clone();
    let task = tokio::spawn(async move {
        while let Some(request) = outbound.recv().await {
            request_log.lock().unwrap().push(request.clone());
            if options.silent {
                continue;
            }
            let response = match request {
                WalletRequest::RequestAllHeaderHashesAfter { start_height, challenge_hash } => {
                    if options.reject_header_hashes {
                        Some(WalletResponse::RejectAllHeaderHashesAfter {
                            start_height,
                            challenge_hash,
                        })
                    } else {
                        Some(WalletResponse::AllHeaderHashes(fixture.header_hashes.clone()))
                    }
                },
                WalletRequest::RequestAllProofHashes => {
                    if options.drop_proof_hashes {
                        None
                    } else {
                        let mut proof_hashes = fixture.proof_hashes.clone();
                        if options.tamper_proof_hashes {
                            for triple in &mut proof_hashes {
                                triple.total_iters += 1;
                            }
                        }
                        Some(WalletResponse::AllProofHashes(proof_hashes))
                    }
                },
                WalletRequest::RequestHeader { height, .. } => {
                    if options.drop_headers {
                        None
                    } else {
                        fixture
                            .header_blocks
                            .get(height as usize)
                            .map(|block| {
                                WalletResponse::Header(Box::new(RespondHeader {
                                    header_block: block.clone(),
                                    transactions_filter: TransactionsFilter(vec![]),
                                }))
                            })
                    }
                },
                _ => None,
            };
            if let Some(response) = response {
                if inbound_tx
                    .send(InboundMessage {
                        peer: respond_peer.clone(),
                        message: response,
                    })
                    .is_err()
                {
                    break;
                }
            }
        }
    });
    FullNodeHarness { peer, requests, task }
}

// ---------------------------------------------------------------------------------------------
// Sync harness
// ---------------------------------------------------------------------------------------------

/// Everything needed to drive the synchronizer and the inbound handler without a full wallet
/// node.
pub struct SyncHarness {
    pub state_manager: MockStateManager,
    pub cache: BlockCache,
    pub comms: WalletComms,
    pub handler: InboundHandler<MockStateManager>,
    pub synchronizer: WalletSynchronizer<MockStateManager>,
    pub shutdown: Shutdown,
    pub starting_height: Watch<u32>,
    pub inbound_tx: mpsc::UnboundedSender<InboundMessage>,
    pub sync_requests: mpsc::UnboundedReceiver<SyncRequest>,
    dispatch_task: JoinHandle<()>,
}

pub fn sync_harness(config: WalletNodeConfig, state_manager: MockStateManager, starting_height: u32) -> SyncHarness {
    let cache = BlockCache::new();
    let shutdown = Shutdown::new();
    let handle = StateManagerHandle::new();
    handle.set(Arc::new(state_manager.clone()));
    let (sync_request_tx, sync_requests) = mpsc::unbounded_channel();
    let handler = InboundHandler::new(
        handle.clone(),
        cache.clone(),
        sync_request_tx,
        config.short_sync_threshold,
        shutdown.to_signal(),
    );
    let comms = WalletComms::new();
    let starting = Watch::new(starting_height);
    let synchronizer = WalletSynchronizer::new(
        config,
        test_constants(),
        handle,
        cache.clone(),
        comms.clone(),
        handler.clone(),
        starting.clone(),
        shutdown.to_signal(),
    );

    let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel::<InboundMessage>();
    let dispatch_handler = handler.clone();
    let dispatch_task = tokio::spawn(async move {
        while let Some(message) = inbound_rx.recv().await {
            dispatch_handler.handle_message(message).await.unwrap();
        }
    });

    SyncHarness {
        state_manager,
        cache,
        comms,
        handler,
        synchronizer,
        shutdown,
        starting_height: starting,
        inbound_tx,
        sync_requests,
        dispatch_task,
    }
}

impl SyncHarness {
    /// Register a scripted full node with the comms layer and return its harness.
    pub fn connect_full_node(&self, fixture: Arc<ChainFixture>, options: ResponderOptions) -> FullNodeHarness {
        let harness = spawn_full_node(
            fixture,
            options,
            self.inbound_tx.clone(),
            PeerInfo::new("127.0.0.1", 8444),
        );
        self.comms.add_connection(harness.peer.clone()).unwrap();
        harness
    }
}

/// There must be no path from any key of `future_block_hashes` back to itself.
pub fn assert_future_hashes_acyclic(future: &HashMap<HeaderHash, Vec<HeaderHash>>) {
    for start in future.keys() {
        let mut frontier = vec![*start];
        let mut steps = 0;
        while let Some(hash) = frontier.pop() {
            steps += 1;
            assert!(steps <= 10_000, "future_block_hashes appears to contain a cycle");
            if let Some(successors) = future.get(&hash) {
                for next in successors {
                    assert_ne!(next, start, "future_block_hashes contains a cycle through {:?}", start);
                    frontier.push(*next);
                }
            }
        }
    }
}

pub fn unconfirmed_transaction(tx_id: TxId, payload: Vec<u8>) -> TransactionRecord {
    TransactionRecord {
        tx_id,
        spend_bundle: Some(sesame_wallet::models::SpendBundle { payload }),
        confirmed: false,
        sent_to: vec![],
    }
}

pub fn request_generator_action(header_hash: HeaderHash, height: u32) -> WalletAction {
    WalletAction {
        name: sesame_wallet::models::REQUEST_GENERATOR_ACTION.to_string(),
        data: format!(
            r#"{{"header_hash": "{}", "height": {}}}"#,
            hex::encode(header_hash),
            height
        ),
    }
}
