//! Drives a single logical deployment name to completion: a fresh proxied
//! deploy if the name is unknown, an upgrade of the recorded proxy otherwise.

use std::{collections::HashMap, sync::Arc, time::Duration};

use alloy::primitives::Address;
use tokio::sync::Mutex;
use tracing::{error, info, info_span, warn, Instrument};

use crate::{
    chain::ChainClient,
    deployer::ProxyDeployer,
    errors::ScriptError,
    registry::AddressRegistry,
    types::{ContractArtifact, DeploymentRecord, Initializer},
    upgrade::UpgradeCoordinator,
};

/// The explicit context of every orchestrated run
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// The name of the target network
    pub network: String,
    /// The chain ID of the target network
    pub chain_id: u64,
    /// The account submitting every transaction
    pub signer: Address,
    /// How long to wait for each transaction
    pub confirmation_timeout: Duration,
}

/// A request to deploy or upgrade one logical name
#[derive(Debug, Clone)]
pub struct DeployRequest {
    /// The logical deployment name
    pub name: String,
    /// The implementation to deploy
    pub artifact: ContractArtifact,
    /// The initializer, only called on an initial deploy
    pub initializer: Initializer,
    /// The upgrade authority of a new proxy; the signer if unset
    pub admin: Option<Address>,
    /// Fail instead of deploying fresh if the name is not recorded
    pub require_existing: bool,
}

/// The path a run took
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeployPath {
    /// A new implementation and proxy were deployed and initialized
    InitialDeploy,
    /// The recorded proxy was repointed at a new implementation
    Upgrade,
}

/// The result of a successful run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentOutcome {
    /// The path taken
    pub path: DeployPath,
    /// The record as persisted
    pub record: DeploymentRecord,
}

/// Decides between an initial deploy and an upgrade, runs it, and records
/// the result. Nothing is recorded unless every on-chain step succeeded.
pub struct Orchestrator<C, R> {
    /// The chain client
    client: C,
    /// The address registry
    registry: R,
    /// The run context
    config: OrchestratorConfig,
    /// Per-name locks serializing runs within this process; an entry is
    /// dropped once no run holds or awaits it
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<C: ChainClient, R: AddressRegistry> Orchestrator<C, R> {
    /// Create an orchestrator over the given client and registry
    pub fn new(client: C, registry: R, config: OrchestratorConfig) -> Self {
        Orchestrator {
            client,
            registry,
            config,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Deploy or upgrade `request.name`
    pub async fn run(&self, request: DeployRequest) -> Result<DeploymentOutcome, ScriptError> {
        let span = info_span!("deploy", name = %request.name, network = %self.config.network);
        async {
            let lock = self
                .locks
                .lock()
                .await
                .entry(request.name.clone())
                .or_default()
                .clone();

            let result = {
                let _guard = lock.lock().await;
                self.run_locked(&request).await
            };

            self.release_lock(&request.name, lock).await;
            result
        }
        .instrument(span)
        .await
    }

    /// Drop the lock of `name` if no other run holds or awaits it
    async fn release_lock(&self, name: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        // One reference lives in the map, the other is ours
        if Arc::strong_count(&lock) == 2 {
            locks.remove(name);
        }
    }

    /// Run a request while holding the lock of its name
    async fn run_locked(&self, request: &DeployRequest) -> Result<DeploymentOutcome, ScriptError> {
        let chain_id = self
            .client
            .chain_id()
            .await
            .map_err(|e| ScriptError::ClientInitialization(e.to_string()))?;
        if chain_id != self.config.chain_id {
            return Err(ScriptError::Config(format!(
                "client is on chain {chain_id}, but the target is chain {}",
                self.config.chain_id
            )));
        }

        match self.registry.get(&request.name)? {
            None if request.require_existing => {
                Err(ScriptError::MissingDeployment(request.name.clone()))
            }
            None => self.initial_deploy(request).await,
            Some(record) => self.upgrade(request, record).await,
        }
    }

    /// Deploy and initialize a fresh proxy, then record it at version zero
    async fn initial_deploy(
        &self,
        request: &DeployRequest,
    ) -> Result<DeploymentOutcome, ScriptError> {
        let admin = request.admin.unwrap_or(self.config.signer);
        info!(
            contract = %request.artifact.name,
            %admin,
            "no recorded deployment, deploying proxy"
        );

        let deployment = ProxyDeployer::new(
            &self.client,
            self.config.signer,
            self.config.confirmation_timeout,
        )
        .deploy(&request.artifact, &request.initializer, admin)
        .await?;

        let record = DeploymentRecord::new(
            &request.name,
            &self.config.network,
            self.config.chain_id,
            &request.artifact.name,
            &request.initializer,
            &deployment,
        );
        self.record(&record)?;

        Ok(DeploymentOutcome {
            path: DeployPath::InitialDeploy,
            record,
        })
    }

    /// Upgrade the recorded proxy, then record the new implementation
    async fn upgrade(
        &self,
        request: &DeployRequest,
        record: DeploymentRecord,
    ) -> Result<DeploymentOutcome, ScriptError> {
        if record.chain_id != self.config.chain_id {
            return Err(ScriptError::Config(format!(
                "deployment `{}` was recorded on chain {}, but the target is chain {}",
                record.name, record.chain_id, self.config.chain_id
            )));
        }
        if request.admin.is_some_and(|admin| admin != record.admin_address) {
            warn!(
                admin = %record.admin_address,
                "ignoring admin override on upgrade, the recorded admin is kept"
            );
        }
        info!(
            proxy = %record.proxy_address,
            version = record.version,
            "found recorded deployment, upgrading"
        );

        let (implementation, version) = UpgradeCoordinator::new(
            &self.client,
            self.config.signer,
            self.config.confirmation_timeout,
        )
        .upgrade(&record, &request.artifact)
        .await?;

        let next = record.upgraded(&request.artifact.name, implementation, version);
        self.record(&next)?;

        Ok(DeploymentOutcome {
            path: DeployPath::Upgrade,
            record: next,
        })
    }

    /// Persist a record, logging the on-chain addresses it would have held
    /// if the write fails
    fn record(&self, record: &DeploymentRecord) -> Result<(), ScriptError> {
        self.registry.put(&record.name, record).map_err(|e| {
            error!(
                proxy = %record.proxy_address,
                implementation = %record.implementation_address,
                version = record.version,
                "on-chain changes succeeded but were not recorded: {e}"
            );
            e
        })?;

        info!(
            proxy = %record.proxy_address,
            implementation = %record.implementation_address,
            version = record.version,
            "deployment recorded"
        );
        Ok(())
    }
}
