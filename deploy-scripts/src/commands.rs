//! Implementations of the various deploy scripts

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use tracing::info;

use crate::{
    chain::rpc::RpcChainClient,
    cli::{confirmation_timeout_secs, DeployArgs, ShowArgs},
    config::NetworkTable,
    errors::ScriptError,
    orchestrator::{DeployRequest, Orchestrator, OrchestratorConfig},
    registry::{AddressRegistry, JsonFileRegistry},
    types::{ContractArtifact, Initializer},
    utils::{default_deployments_path, select_signer},
};

/// Load the network table, from `networks_file` if given
fn network_table(networks_file: Option<PathBuf>) -> Result<NetworkTable, ScriptError> {
    match networks_file {
        Some(path) => NetworkTable::load(&path),
        None => Ok(NetworkTable::builtin()),
    }
}

/// Print a value as pretty JSON on stdout
fn print_json<T: serde::Serialize>(value: &T) -> Result<(), ScriptError> {
    let json =
        serde_json::to_string_pretty(value).map_err(|e| ScriptError::Serde(e.to_string()))?;
    println!("{json}");
    Ok(())
}

/// The proxy artifact, loaded only if `name` has no recorded deployment.
/// Upgrades never deploy a proxy, so they never need the file.
fn proxy_artifact_for(
    registry: &impl AddressRegistry,
    name: &str,
    path: &Path,
) -> Result<Option<ContractArtifact>, ScriptError> {
    if registry.get(name)?.is_some() {
        return Ok(None);
    }

    ContractArtifact::from_file(path).map(Some)
}

pub async fn deploy(
    args: DeployArgs,
    network: &str,
    networks_file: Option<PathBuf>,
    deployments_path: Option<PathBuf>,
) -> Result<(), ScriptError> {
    let table = network_table(networks_file)?;
    let profile = table.profile(network)?;

    // Signers are derived once; the wallet holds all of them
    let signers = profile.accounts.signers()?;
    let signer = select_signer(&signers, args.signer_index)?.address();

    let registry = JsonFileRegistry::new(
        deployments_path.unwrap_or_else(|| default_deployments_path(network)),
    );
    info!(registry = %registry.path().display(), %signer, "using deployments file");

    // Fail on bad artifacts before touching the network
    let artifact = ContractArtifact::from_file(&args.artifact)?;
    let proxy_artifact = proxy_artifact_for(&registry, &args.name, &args.proxy_artifact)?;

    let client = RpcChainClient::connect(profile, signers, proxy_artifact).await?;

    let timeout =
        confirmation_timeout_secs(args.confirmation_timeout, profile.confirmation_timeout_secs);
    let config = OrchestratorConfig {
        network: network.to_string(),
        chain_id: profile.chain_id,
        signer,
        confirmation_timeout: Duration::from_secs(timeout),
    };
    let orchestrator = Orchestrator::new(client, registry, config);

    let outcome = orchestrator
        .run(DeployRequest {
            name: args.name,
            artifact,
            initializer: Initializer {
                function: args.initializer,
                args: args.init_args,
            },
            admin: args.admin,
            require_existing: args.upgrade,
        })
        .await?;

    print_json(&outcome.record.summary())
}

pub fn show(
    args: ShowArgs,
    network: &str,
    deployments_path: Option<PathBuf>,
) -> Result<(), ScriptError> {
    let registry = JsonFileRegistry::new(
        deployments_path.unwrap_or_else(|| default_deployments_path(network)),
    );
    let record = registry
        .get(&args.name)?
        .ok_or_else(|| ScriptError::MissingDeployment(args.name))?;

    print_json(&record)
}

pub fn accounts(network: &str, networks_file: Option<PathBuf>) -> Result<(), ScriptError> {
    let table = network_table(networks_file)?;
    for signer in table.profile(network)?.accounts.signers()? {
        println!("{:#x}", signer.address());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{env, fs};

    use alloy::primitives::Address;
    use rand::{thread_rng, Rng};

    use super::*;
    use crate::types::{DeploymentRecord, ImplementationAddress, ProxyAddress, ProxyDeployment};

    /// A fresh path under the system temp dir
    fn tmp_path(prefix: &str) -> PathBuf {
        let suffix: u64 = thread_rng().gen();
        env::temp_dir().join(format!("{prefix}-{suffix:x}.json"))
    }

    #[test]
    fn test_upgrade_does_not_need_proxy_artifact() {
        let registry_path = tmp_path("deployments");
        let registry = JsonFileRegistry::new(&registry_path);
        let deployment = ProxyDeployment {
            proxy: ProxyAddress(Address::repeat_byte(0xaa)),
            implementation: ImplementationAddress(Address::repeat_byte(0xbb)),
            admin: Address::repeat_byte(0xcc),
            proxy_admin: Address::repeat_byte(0xdd),
        };
        let init = Initializer {
            function: "initialize".to_string(),
            args: vec![],
        };
        let record = DeploymentRecord::new(
            "bridge",
            "hardhat",
            31337,
            "DeusBridge",
            &init,
            &deployment,
        );
        registry.put("bridge", &record).unwrap();

        // The proxy artifact does not exist, which only matters for a fresh deploy
        let missing_artifact = tmp_path("TransparentUpgradeableProxy");
        let loaded = proxy_artifact_for(&registry, "bridge", &missing_artifact).unwrap();
        assert!(loaded.is_none());

        assert!(matches!(
            proxy_artifact_for(&registry, "token", &missing_artifact),
            Err(ScriptError::ArtifactParsing(_))
        ));

        fs::remove_file(&registry_path).unwrap();
    }
}
