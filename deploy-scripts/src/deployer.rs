//! Deployment of a fresh implementation behind a new `TransparentUpgradeableProxy`

use std::time::Duration;

use alloy::primitives::{Address, Bytes};
use tracing::info;

use crate::{
    chain::{confirm, ChainClient, ChainError},
    errors::{ScriptError, Step},
    types::{ContractArtifact, ImplementationAddress, Initializer, ProxyAddress, ProxyDeployment},
};

/// A proxy that has been deployed but whose initializer has not run.
///
/// Initializing consumes the value, so a deployer can only initialize a
/// proxy it created, and only once.
#[derive(Debug)]
#[must_use = "a proxy must be initialized before it is usable"]
pub struct UninitializedProxy {
    /// The proxy contract
    proxy: ProxyAddress,
}

impl UninitializedProxy {
    /// Wrap a freshly deployed proxy
    pub(crate) fn new(proxy: ProxyAddress) -> Self {
        UninitializedProxy { proxy }
    }

    /// Call the initializer through the proxy and wait for it to confirm
    pub async fn initialize<C: ChainClient + ?Sized>(
        self,
        client: &C,
        calldata: &Bytes,
        signer: Address,
        timeout: Duration,
    ) -> Result<ProxyAddress, ScriptError> {
        let pending = client
            .call_initializer(self.proxy, calldata, signer)
            .await
            .map_err(|e| match e {
                ChainError::AlreadyInitialized => ScriptError::AlreadyInitialized(self.proxy),
                e => ScriptError::deploy(Step::Initialize, e),
            })?;
        confirm(client, &pending, timeout, Step::Initialize).await?;

        Ok(self.proxy)
    }
}

/// Deploys an implementation behind a new proxy and initializes it
pub struct ProxyDeployer<'a, C: ?Sized> {
    /// The chain to deploy to
    client: &'a C,
    /// The account submitting every transaction
    signer: Address,
    /// How long to wait for each transaction
    timeout: Duration,
}

impl<'a, C: ChainClient + ?Sized> ProxyDeployer<'a, C> {
    /// Create a deployer submitting as `signer`
    pub fn new(client: &'a C, signer: Address, timeout: Duration) -> Self {
        ProxyDeployer {
            client,
            signer,
            timeout,
        }
    }

    /// Deploy `artifact` behind a new proxy owned by `admin`, then call its
    /// initializer exactly once.
    ///
    /// Any failure after the implementation is deployed orphans it; nothing
    /// is resumed on retry.
    pub async fn deploy(
        &self,
        artifact: &ContractArtifact,
        initializer: &Initializer,
        admin: Address,
    ) -> Result<ProxyDeployment, ScriptError> {
        // Encode up front so bad arguments fail before anything is sent
        let calldata = initializer.calldata(&artifact.abi)?;

        let implementation =
            deploy_implementation(self.client, artifact, self.signer, self.timeout).await?;

        let (proxy, pending) = self
            .client
            .deploy_proxy(implementation, admin, self.signer)
            .await
            .map_err(|e| ScriptError::deploy(Step::DeployProxy, e))?;
        confirm(self.client, &pending, self.timeout, Step::DeployProxy).await?;
        info!(%proxy, %implementation, "proxy deployed");

        let slots = self
            .client
            .read_proxy_slots(proxy)
            .await
            .map_err(|e| ScriptError::deploy(Step::VerifyProxy, e))?;
        if slots.implementation != implementation.address() {
            return Err(ScriptError::deploy(
                Step::VerifyProxy,
                format!(
                    "proxy {proxy} points at {:#x}, expected {implementation}",
                    slots.implementation
                ),
            ));
        }

        let proxy = UninitializedProxy::new(proxy)
            .initialize(self.client, &calldata, self.signer, self.timeout)
            .await?;
        info!(%proxy, %initializer, "proxy initialized");

        Ok(ProxyDeployment {
            proxy,
            implementation,
            admin,
            proxy_admin: slots.admin,
        })
    }
}

/// Deploy an implementation contract and wait for it to confirm
pub(crate) async fn deploy_implementation<C: ChainClient + ?Sized>(
    client: &C,
    artifact: &ContractArtifact,
    signer: Address,
    timeout: Duration,
) -> Result<ImplementationAddress, ScriptError> {
    let (address, pending) = client
        .deploy_contract(&artifact.bytecode, &Bytes::new(), signer)
        .await
        .map_err(|e| ScriptError::deploy(Step::DeployImplementation, e))?;
    confirm(client, &pending, timeout, Step::DeployImplementation).await?;

    let implementation = ImplementationAddress(address);
    info!(contract = %artifact.name, %implementation, "implementation deployed");
    Ok(implementation)
}

#[cfg(test)]
pub(crate) mod tests {
    use alloy::{json_abi::JsonAbi, primitives::Address};

    use super::*;
    use crate::chain::mock::{MockChainClient, MockFailure, MockOp};

    /// The bridge initializer ABI
    const BRIDGE_ABI: &str = r#"[
        {"type":"function","name":"initialize","stateMutability":"nonpayable","outputs":[],
         "inputs":[{"name":"minSigs","type":"uint256"},{"name":"fee","type":"uint256"},
                   {"name":"uri","type":"string"},{"name":"muon","type":"address"}]}
    ]"#;

    const TIMEOUT: Duration = Duration::from_secs(5);

    pub(crate) fn bridge_artifact(bytecode: &[u8]) -> ContractArtifact {
        ContractArtifact {
            name: "DeusBridge".to_string(),
            bytecode: Bytes::copy_from_slice(bytecode),
            abi: serde_json::from_str::<JsonAbi>(BRIDGE_ABI).unwrap(),
        }
    }

    pub(crate) fn bridge_initializer() -> Initializer {
        Initializer {
            function: "initialize".to_string(),
            args: vec![
                "1".to_string(),
                "10".to_string(),
                String::new(),
                "0xde12c7959e1a72bbe8a5f7a1dc8f8eef9ab011b3".to_string(),
            ],
        }
    }

    #[tokio::test]
    async fn test_deploy_initializes_exactly_once() {
        let client = MockChainClient::default();
        let signer = Address::repeat_byte(0x11);
        let deployer = ProxyDeployer::new(&client, signer, TIMEOUT);

        let deployment = deployer
            .deploy(&bridge_artifact(&[0x60, 0x80]), &bridge_initializer(), signer)
            .await
            .unwrap();

        assert_ne!(
            deployment.proxy.address(),
            deployment.implementation.address()
        );
        assert_eq!(deployment.proxy_admin, deployment.proxy.address().create(1));

        let proxy = client.proxy(deployment.proxy).await.unwrap();
        assert!(proxy.initialized);
        assert_eq!(proxy.initializer_calls, 1);
        assert_eq!(proxy.owner, signer);
    }

    #[tokio::test]
    async fn test_reinitializing_is_rejected() {
        let client = MockChainClient::default();
        let signer = Address::repeat_byte(0x11);
        let deployer = ProxyDeployer::new(&client, signer, TIMEOUT);
        let deployment = deployer
            .deploy(&bridge_artifact(&[0x60]), &bridge_initializer(), signer)
            .await
            .unwrap();

        let calldata = bridge_initializer()
            .calldata(&bridge_artifact(&[0x60]).abi)
            .unwrap();
        let res = UninitializedProxy::new(deployment.proxy)
            .initialize(&client, &calldata, signer, TIMEOUT)
            .await;

        assert_eq!(res, Err(ScriptError::AlreadyInitialized(deployment.proxy)));
        assert_eq!(
            client
                .proxy(deployment.proxy)
                .await
                .unwrap()
                .initializer_calls,
            1
        );
    }

    #[tokio::test]
    async fn test_proxy_failure_orphans_implementation() {
        let client = MockChainClient::default();
        let signer = Address::repeat_byte(0x11);
        client.fail_next(MockOp::DeployProxy, MockFailure::Revert).await;

        let deployer = ProxyDeployer::new(&client, signer, TIMEOUT);
        let res = deployer
            .deploy(&bridge_artifact(&[0x60]), &bridge_initializer(), signer)
            .await;

        assert!(matches!(
            res,
            Err(ScriptError::Deploy {
                step: Step::DeployProxy,
                ..
            })
        ));
        // Only the implementation made it on chain
        assert_eq!(client.num_contracts().await, 1);
        assert!(client.has_code(signer.create(0)).await);
    }

    #[tokio::test]
    async fn test_bad_initializer_args_send_nothing() {
        let client = MockChainClient::default();
        let signer = Address::repeat_byte(0x11);
        let init = Initializer {
            function: "initialize".to_string(),
            args: vec!["1".to_string()],
        };

        let deployer = ProxyDeployer::new(&client, signer, TIMEOUT);
        let res = deployer.deploy(&bridge_artifact(&[0x60]), &init, signer).await;

        assert!(matches!(res, Err(ScriptError::CalldataConstruction(_))));
        assert_eq!(client.num_contracts().await, 0);
    }

    #[tokio::test]
    async fn test_initializer_timeout_is_a_deploy_error() {
        let client = MockChainClient::default();
        let signer = Address::repeat_byte(0x11);
        client.fail_next(MockOp::CallInitializer, MockFailure::Timeout).await;

        let deployer = ProxyDeployer::new(&client, signer, TIMEOUT);
        let res = deployer
            .deploy(&bridge_artifact(&[0x60]), &bridge_initializer(), signer)
            .await;

        assert!(matches!(
            res,
            Err(ScriptError::Deploy {
                step: Step::Initialize,
                ..
            })
        ));
    }
}
