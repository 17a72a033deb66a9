//! The table of network profiles a deployment can target

use std::{collections::BTreeMap, env, fs, path::Path, str::FromStr};

use alloy::signers::local::{coins_bip39::English, MnemonicBuilder, PrivateKeySigner};
use serde::{Deserialize, Serialize};

use crate::{
    constants::{
        FANTOM_CHAIN_ID, FANTOM_GAS_MULTIPLIER, HARDHAT_ACCOUNT_COUNT, HARDHAT_CHAIN_ID,
        HARDHAT_DERIVATION_PATH, HARDHAT_MNEMONIC, MAIN_DEPLOYER_KEY_ENV_VAR,
    },
    errors::ScriptError,
};

/// How transaction gas is set
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum GasPolicy {
    /// Estimate the gas limit and scale it by `multiplier`; fees are
    /// filled in by the node
    Auto {
        /// The factor applied to the estimated gas limit
        #[serde(default = "default_gas_multiplier")]
        multiplier: f64,
    },
    /// Use a fixed gas limit and a fixed legacy gas price
    Fixed {
        /// The gas limit of every transaction
        gas_limit: u64,
        /// The gas price in wei
        gas_price: u64,
    },
}

/// The gas multiplier applied when none is configured
fn default_gas_multiplier() -> f64 {
    1.0
}

impl Default for GasPolicy {
    fn default() -> Self {
        GasPolicy::Auto {
            multiplier: default_gas_multiplier(),
        }
    }
}

/// Where a private key comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeySource {
    /// The name of an environment variable holding the key
    Env(String),
    /// The key itself, in hex
    Key(String),
}

/// The accounts a network profile signs with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SigningAccounts {
    /// Accounts derived from a mnemonic
    Mnemonic {
        /// The mnemonic phrase
        mnemonic: String,
        /// The derivation path prefix; the account index is appended
        path: String,
        /// The index of the first account
        #[serde(default)]
        initial_index: u32,
        /// The number of accounts to derive
        count: u32,
    },
    /// Individual private keys
    Keys(Vec<KeySource>),
}

impl SigningAccounts {
    /// Materialize the signers of this account set
    pub fn signers(&self) -> Result<Vec<PrivateKeySigner>, ScriptError> {
        match self {
            SigningAccounts::Mnemonic {
                mnemonic,
                path,
                initial_index,
                count,
            } => {
                let end = initial_index.checked_add(*count).ok_or_else(|| {
                    ScriptError::Config(format!(
                        "cannot derive {count} accounts from index {initial_index}"
                    ))
                })?;

                (*initial_index..end)
                    .map(|index| {
                        MnemonicBuilder::<English>::default()
                            .phrase(mnemonic.as_str())
                            .derivation_path(format!("{path}/{index}"))
                            .and_then(|builder| builder.build())
                            .map_err(|e| ScriptError::Config(e.to_string()))
                    })
                    .collect()
            }
            SigningAccounts::Keys(sources) => sources.iter().map(key_signer).collect(),
        }
    }
}

/// Build a signer from a single key source
fn key_signer(source: &KeySource) -> Result<PrivateKeySigner, ScriptError> {
    let key = match source {
        KeySource::Env(var) => env::var(var).map_err(|_| {
            ScriptError::Config(format!("environment variable `{var}` is not set"))
        })?,
        KeySource::Key(key) => key.clone(),
    };

    PrivateKeySigner::from_str(key.trim())
        .map_err(|e| ScriptError::Config(format!("invalid private key: {e}")))
}

/// The static configuration of a target network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkProfile {
    /// The RPC endpoint
    pub url: String,
    /// The expected chain ID
    pub chain_id: u64,
    /// The signing accounts
    pub accounts: SigningAccounts,
    /// The gas policy
    #[serde(default)]
    pub gas: GasPolicy,
    /// Overrides the default confirmation timeout, in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation_timeout_secs: Option<u64>,
}

/// Network profiles keyed by network name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkTable(BTreeMap<String, NetworkProfile>);

impl NetworkTable {
    /// The built-in networks: a local Hardhat node and Fantom Opera
    pub fn builtin() -> Self {
        let mut networks = BTreeMap::new();
        networks.insert(
            "hardhat".to_string(),
            NetworkProfile {
                url: "http://127.0.0.1:8545".to_string(),
                chain_id: HARDHAT_CHAIN_ID,
                accounts: SigningAccounts::Mnemonic {
                    mnemonic: HARDHAT_MNEMONIC.to_string(),
                    path: HARDHAT_DERIVATION_PATH.to_string(),
                    initial_index: 0,
                    count: HARDHAT_ACCOUNT_COUNT,
                },
                gas: GasPolicy::default(),
                confirmation_timeout_secs: None,
            },
        );
        networks.insert(
            "fantom".to_string(),
            NetworkProfile {
                url: "https://rpc.ftm.tools".to_string(),
                chain_id: FANTOM_CHAIN_ID,
                accounts: SigningAccounts::Keys(vec![KeySource::Env(
                    MAIN_DEPLOYER_KEY_ENV_VAR.to_string(),
                )]),
                gas: GasPolicy::Auto {
                    multiplier: FANTOM_GAS_MULTIPLIER,
                },
                confirmation_timeout_secs: None,
            },
        );

        NetworkTable(networks)
    }

    /// Parse a table from JSON
    pub fn from_json(json: &str) -> Result<Self, ScriptError> {
        serde_json::from_str(json).map_err(|e| ScriptError::Config(e.to_string()))
    }

    /// Read a table from a JSON file
    pub fn load(path: &Path) -> Result<Self, ScriptError> {
        let json = fs::read_to_string(path).map_err(|e| {
            ScriptError::Config(format!("could not read {}: {e}", path.display()))
        })?;
        Self::from_json(&json)
    }

    /// Select the profile of the named network
    pub fn profile(&self, network: &str) -> Result<&NetworkProfile, ScriptError> {
        self.0.get(network).ok_or_else(|| {
            let known = self.0.keys().cloned().collect::<Vec<_>>().join(", ");
            ScriptError::Config(format!("unknown network `{network}` (known: {known})"))
        })
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::Address;

    use super::*;

    /// The first Anvil / Hardhat default private key
    const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn test_builtin_table_mirrors_project_networks() {
        let table = NetworkTable::builtin();

        let hardhat = table.profile("hardhat").unwrap();
        assert_eq!(hardhat.chain_id, 31337);
        assert_eq!(hardhat.gas, GasPolicy::Auto { multiplier: 1.0 });

        let fantom = table.profile("fantom").unwrap();
        assert_eq!(fantom.chain_id, 250);
        assert_eq!(fantom.url, "https://rpc.ftm.tools");
        assert_eq!(fantom.gas, GasPolicy::Auto { multiplier: 1.2 });

        assert!(matches!(table.profile("mainnet"), Err(ScriptError::Config(_))));
    }

    #[test]
    fn test_parse_table_from_json() {
        let json = format!(
            r#"{{
                "local": {{
                    "url": "http://localhost:8545",
                    "chain_id": 1337,
                    "accounts": [{{ "key": "{TEST_KEY}" }}],
                    "gas": {{ "mode": "fixed", "gas_limit": 3000000, "gas_price": 1000000000 }},
                    "confirmation_timeout_secs": 5
                }},
                "staging": {{
                    "url": "http://staging:8545",
                    "chain_id": 4002,
                    "accounts": [{{ "env": "STAGING_KEY" }}],
                    "gas": {{ "mode": "auto" }}
                }}
            }}"#
        );
        let table = NetworkTable::from_json(&json).unwrap();

        let local = table.profile("local").unwrap();
        assert_eq!(
            local.gas,
            GasPolicy::Fixed {
                gas_limit: 3_000_000,
                gas_price: 1_000_000_000
            }
        );
        assert_eq!(local.confirmation_timeout_secs, Some(5));
        let signers = local.accounts.signers().unwrap();
        assert_eq!(
            signers[0].address(),
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".parse::<Address>().unwrap()
        );

        let staging = table.profile("staging").unwrap();
        assert_eq!(staging.gas, GasPolicy::Auto { multiplier: 1.0 });
        assert_eq!(
            staging.accounts,
            SigningAccounts::Keys(vec![KeySource::Env("STAGING_KEY".into())])
        );
    }

    #[test]
    fn test_missing_env_key_is_a_config_error() {
        let accounts = SigningAccounts::Keys(vec![KeySource::Env(
            "DEPLOY_SCRIPTS_TEST_UNSET_KEY".to_string(),
        )]);
        assert!(matches!(accounts.signers(), Err(ScriptError::Config(_))));
    }

    #[test]
    fn test_mnemonic_derives_distinct_accounts() {
        let table = NetworkTable::builtin();
        let signers = table
            .profile("hardhat")
            .unwrap()
            .accounts
            .signers()
            .unwrap();
        assert_eq!(signers.len(), 5);

        let mut addresses = signers.iter().map(|s| s.address()).collect::<Vec<_>>();
        addresses.sort();
        addresses.dedup();
        assert_eq!(addresses.len(), 5);
    }

    #[test]
    fn test_mnemonic_index_overflow_is_a_config_error() {
        let json = r#"{
            "mnemonic": "test test test test test test test test test test test junk",
            "path": "m/44'/60'/0'/0",
            "initial_index": 4294967295,
            "count": 2
        }"#;
        let accounts: SigningAccounts = serde_json::from_str(json).unwrap();

        assert!(matches!(accounts.signers(), Err(ScriptError::Config(_))));
    }
}
