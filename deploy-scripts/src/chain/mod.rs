//! The chain client seam: everything the deployer and upgrade coordinator
//! need from a node, behind a single trait.
//!
//! [`rpc::RpcChainClient`] talks to a live node; [`mock::MockChainClient`]
//! is a deterministic in-memory chain used in tests.

pub mod mock;
pub mod rpc;

use std::{
    fmt::{self, Display, Formatter},
    sync::Arc,
    time::Duration,
};

use alloy::primitives::{Address, Bytes, TxHash};
use async_trait::async_trait;
use tracing::debug;

use crate::{
    errors::{ScriptError, Step},
    types::{ImplementationAddress, ProxyAddress},
};

/// A submitted transaction awaiting confirmation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingTx {
    /// The transaction hash
    pub hash: TxHash,
}

/// The observed fate of a submitted transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    /// Included and successful
    Confirmed,
    /// Included but reverted
    Reverted,
    /// Not observed within the timeout
    TimedOut,
}

/// The ERC-1967 slots of a proxy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxySlots {
    /// The implementation slot
    pub implementation: Address,
    /// The admin slot
    pub admin: Address,
}

/// Errors surfaced by a chain client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// The node rejected the transaction
    Rejected(String),
    /// The initializer reverted because the proxy is already initialized
    AlreadyInitialized,
    /// Transport-level failure talking to the node
    Rpc(String),
}

impl Display for ChainError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ChainError::Rejected(s) => write!(f, "transaction rejected: {s}"),
            ChainError::AlreadyInitialized => write!(f, "contract is already initialized"),
            ChainError::Rpc(s) => write!(f, "rpc error: {s}"),
        }
    }
}

/// The operations the deployment flow needs from a chain
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// The chain ID of the connected network
    async fn chain_id(&self) -> Result<u64, ChainError>;

    /// Submit a contract creation, returning the address the contract will
    /// live at once the transaction confirms
    async fn deploy_contract(
        &self,
        bytecode: &Bytes,
        constructor_args: &Bytes,
        signer: Address,
    ) -> Result<(Address, PendingTx), ChainError>;

    /// Submit the creation of a proxy delegating to `implementation`, with
    /// `admin` as its upgrade authority
    async fn deploy_proxy(
        &self,
        implementation: ImplementationAddress,
        admin: Address,
        signer: Address,
    ) -> Result<(ProxyAddress, PendingTx), ChainError>;

    /// Submit a call to the initializer through the proxy
    async fn call_initializer(
        &self,
        proxy: ProxyAddress,
        calldata: &Bytes,
        signer: Address,
    ) -> Result<PendingTx, ChainError>;

    /// Submit an upgrade of `proxy` to `implementation` through the proxy's admin
    async fn send_admin_upgrade(
        &self,
        proxy: ProxyAddress,
        implementation: ImplementationAddress,
        signer: Address,
    ) -> Result<PendingTx, ChainError>;

    /// Wait for a transaction to be included, up to `timeout`
    async fn wait_for_confirmation(
        &self,
        tx: &PendingTx,
        timeout: Duration,
    ) -> Result<Confirmation, ChainError>;

    /// Read the ERC-1967 implementation and admin slots of a proxy
    async fn read_proxy_slots(&self, proxy: ProxyAddress) -> Result<ProxySlots, ChainError>;
}

#[async_trait]
impl<C: ChainClient + ?Sized> ChainClient for Arc<C> {
    async fn chain_id(&self) -> Result<u64, ChainError> {
        (**self).chain_id().await
    }

    async fn deploy_contract(
        &self,
        bytecode: &Bytes,
        constructor_args: &Bytes,
        signer: Address,
    ) -> Result<(Address, PendingTx), ChainError> {
        (**self).deploy_contract(bytecode, constructor_args, signer).await
    }

    async fn deploy_proxy(
        &self,
        implementation: ImplementationAddress,
        admin: Address,
        signer: Address,
    ) -> Result<(ProxyAddress, PendingTx), ChainError> {
        (**self).deploy_proxy(implementation, admin, signer).await
    }

    async fn call_initializer(
        &self,
        proxy: ProxyAddress,
        calldata: &Bytes,
        signer: Address,
    ) -> Result<PendingTx, ChainError> {
        (**self).call_initializer(proxy, calldata, signer).await
    }

    async fn send_admin_upgrade(
        &self,
        proxy: ProxyAddress,
        implementation: ImplementationAddress,
        signer: Address,
    ) -> Result<PendingTx, ChainError> {
        (**self).send_admin_upgrade(proxy, implementation, signer).await
    }

    async fn wait_for_confirmation(
        &self,
        tx: &PendingTx,
        timeout: Duration,
    ) -> Result<Confirmation, ChainError> {
        (**self).wait_for_confirmation(tx, timeout).await
    }

    async fn read_proxy_slots(&self, proxy: ProxyAddress) -> Result<ProxySlots, ChainError> {
        (**self).read_proxy_slots(proxy).await
    }
}

/// Wait for `tx` and turn anything but a successful inclusion into a
/// [`ScriptError::Deploy`] attributed to `step`
pub(crate) async fn confirm<C: ChainClient + ?Sized>(
    client: &C,
    tx: &PendingTx,
    timeout: Duration,
    step: Step,
) -> Result<(), ScriptError> {
    debug!(tx = %tx.hash, %step, "waiting for confirmation");
    match client
        .wait_for_confirmation(tx, timeout)
        .await
        .map_err(|e| ScriptError::deploy(step, e))?
    {
        Confirmation::Confirmed => Ok(()),
        Confirmation::Reverted => {
            Err(ScriptError::deploy(step, format!("transaction {} reverted", tx.hash)))
        }
        Confirmation::TimedOut => Err(ScriptError::deploy(
            step,
            format!("transaction {} not confirmed within {}s", tx.hash, timeout.as_secs()),
        )),
    }
}
