//! Upgrades of an existing proxy to a newly deployed implementation

use std::time::Duration;

use alloy::primitives::Address;
use tracing::info;

use crate::{
    chain::{confirm, ChainClient},
    deployer::deploy_implementation,
    errors::{ScriptError, Step},
    types::{ContractArtifact, DeploymentRecord, ImplementationAddress},
};

/// Repoints recorded proxies at new implementations. The initializer is
/// never called again, and the proxy and admin addresses never change.
pub struct UpgradeCoordinator<'a, C: ?Sized> {
    /// The chain the proxy lives on
    client: &'a C,
    /// The account submitting every transaction
    signer: Address,
    /// How long to wait for each transaction
    timeout: Duration,
}

impl<'a, C: ChainClient + ?Sized> UpgradeCoordinator<'a, C> {
    /// Create a coordinator submitting as `signer`
    pub fn new(client: &'a C, signer: Address, timeout: Duration) -> Self {
        UpgradeCoordinator {
            client,
            signer,
            timeout,
        }
    }

    /// Deploy `artifact` and point the proxy of `record` at it, returning
    /// the new implementation and the next version number
    pub async fn upgrade(
        &self,
        record: &DeploymentRecord,
        artifact: &ContractArtifact,
    ) -> Result<(ImplementationAddress, u64), ScriptError> {
        if self.signer != record.admin_address {
            return Err(ScriptError::Unauthorized {
                signer: self.signer,
                admin: record.admin_address,
            });
        }

        let proxy = record.proxy_address;
        let implementation =
            deploy_implementation(self.client, artifact, self.signer, self.timeout).await?;

        let pending = self
            .client
            .send_admin_upgrade(proxy, implementation, self.signer)
            .await
            .map_err(|e| ScriptError::deploy(Step::UpgradeProxy, e))?;
        confirm(self.client, &pending, self.timeout, Step::UpgradeProxy).await?;

        let slots = self
            .client
            .read_proxy_slots(proxy)
            .await
            .map_err(|e| ScriptError::deploy(Step::VerifyProxy, e))?;
        if slots.implementation != implementation.address() {
            return Err(ScriptError::deploy(
                Step::VerifyProxy,
                format!(
                    "proxy {proxy} points at {:#x} after upgrade, expected {implementation}",
                    slots.implementation
                ),
            ));
        }

        let version = record.version + 1;
        info!(
            %proxy,
            from = %record.implementation_address,
            to = %implementation,
            version,
            "proxy upgraded"
        );
        Ok((implementation, version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        chain::mock::{MockChainClient, MockFailure, MockOp},
        deployer::{
            tests::{bridge_artifact, bridge_initializer},
            ProxyDeployer,
        },
    };

    const TIMEOUT: Duration = Duration::from_secs(5);

    /// Deploy the bridge as `admin` and return its record
    async fn deployed_bridge(client: &MockChainClient, admin: Address) -> DeploymentRecord {
        let deployment = ProxyDeployer::new(client, admin, TIMEOUT)
            .deploy(&bridge_artifact(&[0x60]), &bridge_initializer(), admin)
            .await
            .unwrap();
        DeploymentRecord::new(
            "bridge",
            "hardhat",
            31337,
            "DeusBridge",
            &bridge_initializer(),
            &deployment,
        )
    }

    #[tokio::test]
    async fn test_admin_upgrade_repoints_proxy() {
        let client = MockChainClient::default();
        let admin = Address::repeat_byte(0x11);
        let record = deployed_bridge(&client, admin).await;

        let coordinator = UpgradeCoordinator::new(&client, admin, TIMEOUT);
        let (implementation, version) = coordinator
            .upgrade(&record, &bridge_artifact(&[0x60, 0x01]))
            .await
            .unwrap();

        assert_eq!(version, 1);
        assert_ne!(implementation, record.implementation_address);

        let proxy = client.proxy(record.proxy_address).await.unwrap();
        assert_eq!(proxy.implementation, implementation.address());
        assert_eq!(proxy.initializer_calls, 1);
    }

    #[tokio::test]
    async fn test_non_admin_sends_nothing() {
        let client = MockChainClient::default();
        let admin = Address::repeat_byte(0x11);
        let record = deployed_bridge(&client, admin).await;
        let contracts_before = client.num_contracts().await;

        let intruder = Address::repeat_byte(0x22);
        let coordinator = UpgradeCoordinator::new(&client, intruder, TIMEOUT);
        let res = coordinator
            .upgrade(&record, &bridge_artifact(&[0x60, 0x01]))
            .await;

        assert_eq!(
            res,
            Err(ScriptError::Unauthorized {
                signer: intruder,
                admin
            })
        );
        assert_eq!(client.num_contracts().await, contracts_before);
    }

    #[tokio::test]
    async fn test_reverted_upgrade_keeps_implementation() {
        let client = MockChainClient::default();
        let admin = Address::repeat_byte(0x11);
        let record = deployed_bridge(&client, admin).await;
        client.fail_next(MockOp::AdminUpgrade, MockFailure::Revert).await;

        let coordinator = UpgradeCoordinator::new(&client, admin, TIMEOUT);
        let res = coordinator
            .upgrade(&record, &bridge_artifact(&[0x60, 0x01]))
            .await;

        assert!(matches!(
            res,
            Err(ScriptError::Deploy {
                step: Step::UpgradeProxy,
                ..
            })
        ));
        let proxy = client.proxy(record.proxy_address).await.unwrap();
        assert_eq!(
            proxy.implementation,
            record.implementation_address.address()
        );
    }
}
