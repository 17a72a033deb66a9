//! A deterministic in-memory chain.
//!
//! Contract addresses follow the `CREATE` rule from the sender's nonce, every
//! transaction confirms instantly, and the proxy semantics of an OpenZeppelin
//! v5 `TransparentUpgradeableProxy` are modelled: one-shot initialization and
//! upgrades restricted to the owner of the proxy's `ProxyAdmin`.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    time::Duration,
};

use alloy::primitives::{keccak256, Address, Bytes, TxHash};
use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{ChainClient, ChainError, Confirmation, PendingTx, ProxySlots};
use crate::types::{ImplementationAddress, ProxyAddress};

/// The chain ID the mock reports by default, that of a local Hardhat node
pub const MOCK_CHAIN_ID: u64 = 31337;

/// An operation of the mock chain, used to target injected failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    /// [`ChainClient::deploy_contract`]
    DeployContract,
    /// [`ChainClient::deploy_proxy`]
    DeployProxy,
    /// [`ChainClient::call_initializer`]
    CallInitializer,
    /// [`ChainClient::send_admin_upgrade`]
    AdminUpgrade,
}

/// A failure to inject into the next matching operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// The node refuses the transaction outright
    Reject,
    /// The transaction is included but reverts
    Revert,
    /// The transaction is never observed
    Timeout,
}

/// The state of a proxy on the mock chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockProxy {
    /// The implementation slot
    pub implementation: Address,
    /// The `ProxyAdmin` contract created by the proxy
    pub proxy_admin: Address,
    /// The owner of the `ProxyAdmin`
    pub owner: Address,
    /// Whether the initializer has run
    pub initialized: bool,
    /// How many initializer calls succeeded
    pub initializer_calls: u32,
}

/// The mutable state of the mock chain
#[derive(Default)]
struct MockState {
    /// Sender nonces
    nonces: HashMap<Address, u64>,
    /// Addresses with deployed code
    code: HashSet<Address>,
    /// Proxies by address
    proxies: HashMap<Address, MockProxy>,
    /// Outcomes of submitted transactions; absent means never observed
    receipts: HashMap<TxHash, Confirmation>,
    /// Failures queued per operation
    failures: HashMap<MockOp, VecDeque<MockFailure>>,
    /// Number of submitted transactions, used to derive hashes
    tx_count: u64,
}

impl MockState {
    /// Consume the next sender nonce
    fn next_nonce(&mut self, sender: Address) -> u64 {
        let nonce = self.nonces.entry(sender).or_default();
        let current = *nonce;
        *nonce += 1;
        current
    }

    /// Pop the next failure queued for `op`
    fn next_failure(&mut self, op: MockOp) -> Option<MockFailure> {
        self.failures.get_mut(&op).and_then(VecDeque::pop_front)
    }

    /// Record a submitted transaction with the given outcome
    fn submit(&mut self, outcome: Option<Confirmation>) -> PendingTx {
        self.tx_count += 1;
        let hash = keccak256(self.tx_count.to_be_bytes());
        if let Some(outcome) = outcome {
            self.receipts.insert(hash, outcome);
        }

        PendingTx { hash }
    }

    /// Resolve an injected failure into either an outright rejection or a
    /// submitted transaction that never succeeds
    fn fail(&mut self, failure: MockFailure) -> Result<PendingTx, ChainError> {
        match failure {
            MockFailure::Reject => Err(ChainError::Rejected("injected rejection".to_string())),
            MockFailure::Revert => Ok(self.submit(Some(Confirmation::Reverted))),
            MockFailure::Timeout => Ok(self.submit(None)),
        }
    }
}

/// A deterministic in-memory [`ChainClient`]
pub struct MockChainClient {
    /// The reported chain ID
    chain_id: u64,
    /// The chain state
    state: Mutex<MockState>,
}

impl Default for MockChainClient {
    fn default() -> Self {
        Self::new(MOCK_CHAIN_ID)
    }
}

impl MockChainClient {
    /// Create an empty chain reporting the given chain ID
    pub fn new(chain_id: u64) -> Self {
        MockChainClient {
            chain_id,
            state: Mutex::new(MockState::default()),
        }
    }

    /// Make the next `op` fail with `failure`
    pub async fn fail_next(&self, op: MockOp, failure: MockFailure) {
        self.state
            .lock()
            .await
            .failures
            .entry(op)
            .or_default()
            .push_back(failure);
    }

    /// The state of the proxy at `proxy`, if any
    pub async fn proxy(&self, proxy: ProxyAddress) -> Option<MockProxy> {
        self.state
            .lock()
            .await
            .proxies
            .get(&proxy.address())
            .cloned()
    }

    /// Whether code is deployed at `address`
    pub async fn has_code(&self, address: Address) -> bool {
        self.state.lock().await.code.contains(&address)
    }

    /// The number of contracts deployed so far
    pub async fn num_contracts(&self) -> usize {
        self.state.lock().await.code.len()
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn chain_id(&self) -> Result<u64, ChainError> {
        Ok(self.chain_id)
    }

    async fn deploy_contract(
        &self,
        bytecode: &Bytes,
        _constructor_args: &Bytes,
        signer: Address,
    ) -> Result<(Address, PendingTx), ChainError> {
        let mut state = self.state.lock().await;
        if bytecode.is_empty() {
            return Err(ChainError::Rejected("empty creation code".to_string()));
        }

        if let Some(failure) = state.next_failure(MockOp::DeployContract) {
            let pending = state.fail(failure)?;
            let address = signer.create(state.next_nonce(signer));
            return Ok((address, pending));
        }

        let address = signer.create(state.next_nonce(signer));
        state.code.insert(address);
        Ok((address, state.submit(Some(Confirmation::Confirmed))))
    }

    async fn deploy_proxy(
        &self,
        implementation: ImplementationAddress,
        admin: Address,
        signer: Address,
    ) -> Result<(ProxyAddress, PendingTx), ChainError> {
        let mut state = self.state.lock().await;
        if !state.code.contains(&implementation.address()) {
            return Err(ChainError::Rejected(format!(
                "ERC1967InvalidImplementation({implementation})"
            )));
        }

        if let Some(failure) = state.next_failure(MockOp::DeployProxy) {
            let pending = state.fail(failure)?;
            let address = signer.create(state.next_nonce(signer));
            return Ok((ProxyAddress(address), pending));
        }

        let address = signer.create(state.next_nonce(signer));
        // The proxy constructor deploys its `ProxyAdmin` as its first creation
        let proxy_admin = address.create(1);
        state.code.insert(address);
        state.code.insert(proxy_admin);
        state.proxies.insert(
            address,
            MockProxy {
                implementation: implementation.address(),
                proxy_admin,
                owner: admin,
                initialized: false,
                initializer_calls: 0,
            },
        );

        Ok((ProxyAddress(address), state.submit(Some(Confirmation::Confirmed))))
    }

    async fn call_initializer(
        &self,
        proxy: ProxyAddress,
        calldata: &Bytes,
        _signer: Address,
    ) -> Result<PendingTx, ChainError> {
        let mut state = self.state.lock().await;
        match state.proxies.get(&proxy.address()) {
            None => return Err(ChainError::Rejected(format!("no proxy at {proxy}"))),
            Some(p) if p.initialized => return Err(ChainError::AlreadyInitialized),
            Some(_) if calldata.len() < 4 => {
                return Err(ChainError::Rejected("missing function selector".to_string()))
            }
            Some(_) => {}
        }

        if let Some(failure) = state.next_failure(MockOp::CallInitializer) {
            return state.fail(failure);
        }

        if let Some(p) = state.proxies.get_mut(&proxy.address()) {
            p.initialized = true;
            p.initializer_calls += 1;
        }
        Ok(state.submit(Some(Confirmation::Confirmed)))
    }

    async fn send_admin_upgrade(
        &self,
        proxy: ProxyAddress,
        implementation: ImplementationAddress,
        signer: Address,
    ) -> Result<PendingTx, ChainError> {
        let mut state = self.state.lock().await;
        let has_code = state.code.contains(&implementation.address());
        match state.proxies.get(&proxy.address()) {
            None => return Err(ChainError::Rejected(format!("no proxy at {proxy}"))),
            Some(p) if p.owner != signer => {
                return Err(ChainError::Rejected(format!(
                    "OwnableUnauthorizedAccount({signer:#x})"
                )))
            }
            Some(_) if !has_code => {
                return Err(ChainError::Rejected(format!(
                    "ERC1967InvalidImplementation({implementation})"
                )))
            }
            Some(_) => {}
        }

        if let Some(failure) = state.next_failure(MockOp::AdminUpgrade) {
            return state.fail(failure);
        }

        if let Some(p) = state.proxies.get_mut(&proxy.address()) {
            p.implementation = implementation.address();
        }
        Ok(state.submit(Some(Confirmation::Confirmed)))
    }

    async fn wait_for_confirmation(
        &self,
        tx: &PendingTx,
        _timeout: Duration,
    ) -> Result<Confirmation, ChainError> {
        let state = self.state.lock().await;
        Ok(state
            .receipts
            .get(&tx.hash)
            .copied()
            .unwrap_or(Confirmation::TimedOut))
    }

    async fn read_proxy_slots(&self, proxy: ProxyAddress) -> Result<ProxySlots, ChainError> {
        let state = self.state.lock().await;
        Ok(state
            .proxies
            .get(&proxy.address())
            .map(|p| ProxySlots {
                implementation: p.implementation,
                admin: p.proxy_admin,
            })
            .unwrap_or(ProxySlots {
                implementation: Address::ZERO,
                admin: Address::ZERO,
            }))
    }
}
