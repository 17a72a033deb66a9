//! Definitions of CLI arguments and commands for deploy scripts

use std::path::PathBuf;

use alloy::primitives::Address;
use clap::{Args, Parser, Subcommand};

use crate::{
    commands::{accounts, deploy, show},
    constants::{
        DEFAULT_CONFIRMATION_TIMEOUT_SECS, DEFAULT_INITIALIZER, DEFAULT_NETWORK,
        DEFAULT_PROXY_ARTIFACT,
    },
    errors::ScriptError,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// The network profile to use
    #[arg(short, long, env = "DEPLOY_NETWORK", default_value = DEFAULT_NETWORK)]
    pub network: String,

    /// A JSON file of network profiles, replacing the built-in ones
    #[arg(long, env = "DEPLOY_NETWORKS_FILE")]
    pub networks_file: Option<PathBuf>,

    /// Path to the deployments file, `deployments.<network>.json` by default
    #[arg(short, long)]
    pub deployments_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Deploy a contract behind a new proxy, or upgrade the proxy already
    /// recorded under the same name
    Deploy(DeployArgs),
    /// Print the recorded deployment of a name
    Show(ShowArgs),
    /// Print the addresses of the network's signing accounts
    Accounts,
}

/// Deploy an upgradeable contract.
///
/// Concretely, the implementation is put behind a [`TransparentUpgradeableProxy`](https://docs.openzeppelin.com/contracts/5.x/api/proxy#transparent_proxy),
/// which itself deploys a `ProxyAdmin` contract owned by the admin.
///
/// If the name is already recorded, only a new implementation is deployed and
/// the proxy is upgraded to it through its `ProxyAdmin`.
#[derive(Args, Debug)]
pub struct DeployArgs {
    /// The logical deployment name
    pub name: String,

    /// Arguments of the initializer, in ABI order. Ignored on upgrade.
    ///
    /// Values may start with a hyphen, so pass flags before these.
    #[arg(allow_hyphen_values = true)]
    pub init_args: Vec<String>,

    /// Path to the implementation's compilation artifact
    #[arg(short, long)]
    pub artifact: PathBuf,

    /// Require an existing deployment and upgrade it
    #[arg(short, long)]
    pub upgrade: bool,

    /// Path to the `TransparentUpgradeableProxy` compilation artifact
    #[arg(long, default_value = DEFAULT_PROXY_ARTIFACT)]
    pub proxy_artifact: PathBuf,

    /// The initializer function called through the proxy
    #[arg(short, long, default_value = DEFAULT_INITIALIZER)]
    pub initializer: String,

    /// Owner of the proxy admin, the signer by default. Ignored on upgrade.
    #[arg(long)]
    pub admin: Option<Address>,

    /// Index of the signing account in the network profile
    #[arg(short, long, default_value_t = 0)]
    pub signer_index: usize,

    /// Seconds to wait for each transaction, overriding the network profile
    #[arg(long)]
    pub confirmation_timeout: Option<u64>,
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// The logical deployment name
    pub name: String,
}

impl Command {
    /// Run the command against the given network
    pub async fn run(
        self,
        network: &str,
        networks_file: Option<PathBuf>,
        deployments_path: Option<PathBuf>,
    ) -> Result<(), ScriptError> {
        match self {
            Command::Deploy(args) => {
                deploy(args, network, networks_file, deployments_path).await
            }
            Command::Show(args) => show(args, network, deployments_path),
            Command::Accounts => accounts(network, networks_file),
        }
    }
}

/// The confirmation timeout from the flag, then the profile, then the default
pub(crate) fn confirmation_timeout_secs(flag: Option<u64>, profile: Option<u64>) -> u64 {
    flag.or(profile).unwrap_or(DEFAULT_CONFIRMATION_TIMEOUT_SECS)
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_deploy_with_init_args() {
        let cli = Cli::try_parse_from([
            "deploy-scripts",
            "--network",
            "fantom",
            "deploy",
            "bridge",
            "--artifact",
            "artifacts/DeusBridge.json",
            "1",
            "10",
            "",
            "0xde12c7959e1a72bbe8a5f7a1dc8f8eef9ab011b3",
        ])
        .unwrap();
        assert_eq!(cli.network, "fantom");

        let Command::Deploy(args) = cli.command else {
            panic!("expected deploy")
        };
        assert_eq!(args.name, "bridge");
        assert_eq!(args.init_args.len(), 4);
        assert!(!args.upgrade);
        assert_eq!(args.initializer, DEFAULT_INITIALIZER);
        assert_eq!(args.proxy_artifact, PathBuf::from(DEFAULT_PROXY_ARTIFACT));
        assert_eq!(args.signer_index, 0);
    }

    #[test]
    fn test_confirmation_timeout_precedence() {
        assert_eq!(confirmation_timeout_secs(Some(5), Some(10)), 5);
        assert_eq!(confirmation_timeout_secs(None, Some(10)), 10);
        assert_eq!(
            confirmation_timeout_secs(None, None),
            DEFAULT_CONFIRMATION_TIMEOUT_SECS
        );
    }

    #[test]
    fn test_parse_negative_init_args() {
        let cli = Cli::try_parse_from([
            "deploy-scripts",
            "deploy",
            "oracle",
            "--artifact",
            "artifacts/Oracle.json",
            "--upgrade",
            "-1",
            "-250",
        ])
        .unwrap();

        let Command::Deploy(args) = cli.command else {
            panic!("expected deploy")
        };
        assert_eq!(args.init_args, vec!["-1".to_string(), "-250".to_string()]);
        assert!(args.upgrade);
    }
}
