//! A [`ChainClient`] backed by a JSON-RPC node

use std::time::Duration;

use alloy::{
    network::{EthereumWallet, TransactionBuilder},
    primitives::{Address, Bytes, U256},
    providers::{DynProvider, Provider, ProviderBuilder},
    rpc::{json_rpc::ErrorPayload, types::TransactionRequest},
    signers::local::PrivateKeySigner,
    sol_types::{SolCall, SolValue},
    transports::{http::reqwest::Url, TransportError},
};
use async_trait::async_trait;
use tracing::{debug, info};

use super::{ChainClient, ChainError, Confirmation, PendingTx, ProxySlots};
use crate::{
    config::{GasPolicy, NetworkProfile},
    constants::{
        ALREADY_INITIALIZED_REASON, INVALID_INITIALIZATION_SELECTOR, NUM_BYTES_ADDRESS,
        NUM_BYTES_STORAGE_SLOT, PROXY_ADMIN_STORAGE_SLOT, PROXY_IMPLEMENTATION_STORAGE_SLOT,
        RECEIPT_POLL_INTERVAL_MS,
    },
    errors::ScriptError,
    solidity::upgradeAndCallCall,
    types::{ContractArtifact, ImplementationAddress, ProxyAddress},
};

/// A chain client talking to a node over HTTP, signing with a local wallet
pub struct RpcChainClient {
    /// The provider, with the wallet attached
    provider: DynProvider,
    /// The gas policy of the network
    gas: GasPolicy,
    /// The `TransparentUpgradeableProxy` artifact deployed for new proxies,
    /// only loaded when a run may deploy one
    proxy_artifact: Option<ContractArtifact>,
    /// The interval at which receipts are polled
    poll_interval: Duration,
}

impl RpcChainClient {
    /// Connect to the network described by `profile`, signing with `signers`.
    ///
    /// Fails if the node reports a chain ID other than the profile's.
    pub async fn connect(
        profile: &NetworkProfile,
        signers: Vec<PrivateKeySigner>,
        proxy_artifact: Option<ContractArtifact>,
    ) -> Result<Self, ScriptError> {
        let url = Url::parse(&profile.url)
            .map_err(|e| ScriptError::ClientInitialization(e.to_string()))?;

        let mut signers = signers.into_iter();
        let first = signers.next().ok_or_else(|| {
            ScriptError::ClientInitialization("network has no signing accounts".to_string())
        })?;
        let mut wallet = EthereumWallet::new(first);
        for signer in signers {
            wallet.register_signer(signer);
        }

        let provider = DynProvider::new(
            ProviderBuilder::new()
                .wallet(wallet)
                .connect_http(url),
        );
        let chain_id = provider
            .get_chain_id()
            .await
            .map_err(|e| ScriptError::ClientInitialization(e.to_string()))?;
        if chain_id != profile.chain_id {
            return Err(ScriptError::ClientInitialization(format!(
                "node at {} reports chain ID {chain_id}, expected {}",
                profile.url, profile.chain_id
            )));
        }

        info!(url = %profile.url, chain_id, "connected to node");
        Ok(Self::from_provider(provider, profile.gas, proxy_artifact))
    }

    /// Wrap an already connected provider
    pub(crate) fn from_provider(
        provider: DynProvider,
        gas: GasPolicy,
        proxy_artifact: Option<ContractArtifact>,
    ) -> Self {
        RpcChainClient {
            provider,
            gas,
            proxy_artifact,
            poll_interval: Duration::from_millis(RECEIPT_POLL_INTERVAL_MS),
        }
    }

    /// Apply the gas policy to a transaction
    async fn apply_gas_policy(
        &self,
        mut tx: TransactionRequest,
    ) -> Result<TransactionRequest, ChainError> {
        match self.gas {
            GasPolicy::Auto { multiplier } if multiplier != 1.0 => {
                let estimate = self
                    .provider
                    .estimate_gas(tx.clone())
                    .await
                    .map_err(classify)?;
                let gas_limit = scaled_gas_limit(estimate, multiplier);
                debug!(estimate, gas_limit, "scaled gas estimate");
                tx.set_gas_limit(gas_limit);
            }
            GasPolicy::Auto { .. } => {}
            GasPolicy::Fixed {
                gas_limit,
                gas_price,
            } => {
                tx.set_gas_limit(gas_limit);
                tx.set_gas_price(u128::from(gas_price));
            }
        }

        Ok(tx)
    }

    /// Fill and broadcast a transaction
    async fn send(&self, tx: TransactionRequest) -> Result<PendingTx, ChainError> {
        let tx = self.apply_gas_policy(tx).await?;
        let pending = self
            .provider
            .send_transaction(tx)
            .await
            .map_err(classify)?;
        let hash = *pending.tx_hash();
        debug!(tx = %hash, "transaction submitted");

        Ok(PendingTx { hash })
    }

    /// Read a storage slot of the proxy holding an address
    async fn read_address_slot(
        &self,
        proxy: ProxyAddress,
        slot: U256,
    ) -> Result<Address, ChainError> {
        let word = self
            .provider
            .get_storage_at(proxy.address(), slot)
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))?;

        Ok(address_from_slot(word))
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn chain_id(&self) -> Result<u64, ChainError> {
        self.provider
            .get_chain_id()
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))
    }

    async fn deploy_contract(
        &self,
        bytecode: &Bytes,
        constructor_args: &Bytes,
        signer: Address,
    ) -> Result<(Address, PendingTx), ChainError> {
        // The deployed address follows from the sender's nonce, so we pin the nonce
        let nonce = self
            .provider
            .get_transaction_count(signer)
            .pending()
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))?;
        let address = signer.create(nonce);

        let code = [bytecode.as_ref(), constructor_args.as_ref()].concat();
        let tx = TransactionRequest::default()
            .with_from(signer)
            .with_nonce(nonce)
            .with_deploy_code(code);

        let pending = self.send(tx).await?;
        Ok((address, pending))
    }

    async fn deploy_proxy(
        &self,
        implementation: ImplementationAddress,
        admin: Address,
        signer: Address,
    ) -> Result<(ProxyAddress, PendingTx), ChainError> {
        let proxy_artifact = self
            .proxy_artifact
            .as_ref()
            .ok_or_else(|| ChainError::Rejected("no proxy artifact loaded".to_string()))?;

        // `TransparentUpgradeableProxy(address _logic, address initialOwner, bytes _data)`.
        // The initializer is called separately, so `_data` is empty.
        let constructor_args =
            Bytes::from((implementation.address(), admin, Bytes::new()).abi_encode_params());
        let (address, pending) = self
            .deploy_contract(&proxy_artifact.bytecode, &constructor_args, signer)
            .await?;

        Ok((ProxyAddress(address), pending))
    }

    async fn call_initializer(
        &self,
        proxy: ProxyAddress,
        calldata: &Bytes,
        signer: Address,
    ) -> Result<PendingTx, ChainError> {
        let tx = TransactionRequest::default()
            .with_from(signer)
            .with_to(proxy.address())
            .with_input(calldata.clone());

        // Simulate first, so a re-initialization surfaces with its revert
        // reason under every gas policy
        self.provider.call(tx.clone()).await.map_err(classify)?;

        self.send(tx).await
    }

    async fn send_admin_upgrade(
        &self,
        proxy: ProxyAddress,
        implementation: ImplementationAddress,
        signer: Address,
    ) -> Result<PendingTx, ChainError> {
        // Upgrades go through the `ProxyAdmin` the proxy created for itself
        let proxy_admin = self
            .read_address_slot(proxy, U256::from_be_bytes(PROXY_ADMIN_STORAGE_SLOT.0))
            .await?;
        let calldata = upgradeAndCallCall {
            proxy: proxy.address(),
            implementation: implementation.address(),
            data: Bytes::new(),
        }
        .abi_encode();

        let tx = TransactionRequest::default()
            .with_from(signer)
            .with_to(proxy_admin)
            .with_input(calldata);

        self.send(tx).await
    }

    async fn wait_for_confirmation(
        &self,
        tx: &PendingTx,
        timeout: Duration,
    ) -> Result<Confirmation, ChainError> {
        let poll = async {
            loop {
                let receipt = self
                    .provider
                    .get_transaction_receipt(tx.hash)
                    .await
                    .map_err(|e| ChainError::Rpc(e.to_string()))?;

                match receipt {
                    Some(receipt) if receipt.status() => return Ok(Confirmation::Confirmed),
                    Some(_) => return Ok(Confirmation::Reverted),
                    None => tokio::time::sleep(self.poll_interval).await,
                }
            }
        };

        match tokio::time::timeout(timeout, poll).await {
            Ok(confirmation) => confirmation,
            Err(_) => Ok(Confirmation::TimedOut),
        }
    }

    async fn read_proxy_slots(&self, proxy: ProxyAddress) -> Result<ProxySlots, ChainError> {
        let implementation = self
            .read_address_slot(
                proxy,
                U256::from_be_bytes(PROXY_IMPLEMENTATION_STORAGE_SLOT.0),
            )
            .await?;
        let admin = self
            .read_address_slot(proxy, U256::from_be_bytes(PROXY_ADMIN_STORAGE_SLOT.0))
            .await?;

        Ok(ProxySlots {
            implementation,
            admin,
        })
    }
}

// -----------
// | Helpers |
// -----------

/// The address held in the low-order bytes of a storage word
fn address_from_slot(word: U256) -> Address {
    let bytes = word.to_be_bytes::<NUM_BYTES_STORAGE_SLOT>();
    Address::from_slice(&bytes[NUM_BYTES_STORAGE_SLOT - NUM_BYTES_ADDRESS..])
}

/// A gas estimate scaled up by `multiplier`, rounded up
fn scaled_gas_limit(estimate: u64, multiplier: f64) -> u64 {
    (estimate as f64 * multiplier).ceil() as u64
}

/// Classify an error returned while filling or submitting a transaction
fn classify(err: TransportError) -> ChainError {
    match err.as_error_resp() {
        Some(payload) if is_already_initialized(payload) => ChainError::AlreadyInitialized,
        Some(payload) => ChainError::Rejected(payload.to_string()),
        None => ChainError::Rpc(err.to_string()),
    }
}

/// Whether a node error is the revert of an initializer that already ran
fn is_already_initialized(payload: &ErrorPayload) -> bool {
    let revert_data = payload
        .data
        .as_ref()
        .and_then(|raw| serde_json::from_str::<String>(raw.get()).ok())
        .unwrap_or_default()
        .to_lowercase();

    revert_data.starts_with(INVALID_INITIALIZATION_SELECTOR)
        || payload.message.contains(ALREADY_INITIALIZED_REASON)
}
