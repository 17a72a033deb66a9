//! Type definitions used throughout the deploy scripts

use std::{
    fmt::{self, Display},
    fs,
    path::Path,
    str::FromStr,
};

use alloy::{
    dyn_abi::{DynSolType, DynSolValue, JsonAbiExt, Specifier},
    json_abi::JsonAbi,
    primitives::{Address, Bytes},
};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::errors::ScriptError;

// -------------
// | Addresses |
// -------------

/// The address of a proxy contract, which holds storage and delegates calls
/// to its implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProxyAddress(pub Address);

/// The address of a stateless implementation (logic) contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImplementationAddress(pub Address);

impl ProxyAddress {
    /// The raw address
    pub fn address(&self) -> Address {
        self.0
    }
}

impl ImplementationAddress {
    /// The raw address
    pub fn address(&self) -> Address {
        self.0
    }
}

impl Display for ProxyAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl Display for ImplementationAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

// -------------
// | Artifacts |
// -------------

/// A compiled contract: its name, creation bytecode, and ABI
#[derive(Debug, Clone)]
pub struct ContractArtifact {
    /// The contract name
    pub name: String,
    /// The creation bytecode
    pub bytecode: Bytes,
    /// The contract ABI
    pub abi: JsonAbi,
}

/// The bytecode field of an artifact, either a hex string (Hardhat)
/// or an object wrapping one (Foundry)
#[derive(Deserialize)]
#[serde(untagged)]
enum RawBytecode {
    Hex(String),
    Object { object: String },
}

/// The subset of a compilation artifact that we consume
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawArtifact {
    contract_name: Option<String>,
    abi: JsonAbi,
    bytecode: RawBytecode,
}

impl ContractArtifact {
    /// Parse an artifact from its JSON representation, using `fallback_name`
    /// if the artifact does not carry a contract name
    pub fn from_json(json: &str, fallback_name: &str) -> Result<Self, ScriptError> {
        let raw: RawArtifact = serde_json::from_str(json)
            .map_err(|e| ScriptError::ArtifactParsing(e.to_string()))?;

        let hex = match raw.bytecode {
            RawBytecode::Hex(hex) => hex,
            RawBytecode::Object { object } => object,
        };
        let bytecode =
            Bytes::from_str(&hex).map_err(|e| ScriptError::ArtifactParsing(e.to_string()))?;
        if bytecode.is_empty() {
            return Err(ScriptError::ArtifactParsing(format!(
                "artifact `{fallback_name}` has no creation bytecode"
            )));
        }

        Ok(ContractArtifact {
            name: raw.contract_name.unwrap_or_else(|| fallback_name.to_string()),
            bytecode,
            abi: raw.abi,
        })
    }

    /// Read an artifact from a JSON file
    pub fn from_file(path: &Path) -> Result<Self, ScriptError> {
        let json = fs::read_to_string(path).map_err(|e| {
            ScriptError::ArtifactParsing(format!("could not read {}: {e}", path.display()))
        })?;
        let fallback_name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("contract");

        Self::from_json(&json, fallback_name)
    }
}

// ---------------
// | Initializer |
// ---------------

/// A call to a proxy's one-time initializer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Initializer {
    /// The initializer function name
    pub function: String,
    /// The ordered arguments, as given by the user
    pub args: Vec<String>,
}

impl Initializer {
    /// Encode the initializer calldata against the given ABI, coercing each
    /// argument to the type of the matching parameter
    pub fn calldata(&self, abi: &JsonAbi) -> Result<Bytes, ScriptError> {
        let function = abi
            .function(&self.function)
            .and_then(|overloads| overloads.iter().find(|f| f.inputs.len() == self.args.len()))
            .ok_or_else(|| {
                ScriptError::CalldataConstruction(format!(
                    "no function `{}` taking {} arguments in ABI",
                    self.function,
                    self.args.len()
                ))
            })?;

        let values = function
            .inputs
            .iter()
            .zip(&self.args)
            .map(|(param, arg)| {
                let ty: DynSolType = param
                    .resolve()
                    .map_err(|e| ScriptError::CalldataConstruction(e.to_string()))?;
                ty.coerce_str(arg).map_err(|e| {
                    ScriptError::CalldataConstruction(format!(
                        "argument `{}` is not a valid {ty}: {e}",
                        param.name
                    ))
                })
            })
            .collect::<Result<Vec<DynSolValue>, ScriptError>>()?;

        function
            .abi_encode_input(&values)
            .map(Bytes::from)
            .map_err(|e| ScriptError::CalldataConstruction(e.to_string()))
    }
}

impl Display for Initializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args = self.args.iter().map(|a| format!("{a:?}")).join(", ");
        write!(f, "{}({args})", self.function)
    }
}

// ---------------
// | Deployments |
// ---------------

/// The addresses produced by a fresh proxied deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxyDeployment {
    /// The proxy contract
    pub proxy: ProxyAddress,
    /// The implementation contract the proxy delegates to
    pub implementation: ImplementationAddress,
    /// The account authorized to upgrade the proxy
    pub admin: Address,
    /// The ERC-1967 admin slot of the proxy, i.e. its `ProxyAdmin` contract
    pub proxy_admin: Address,
}

/// A single implementation the proxy has pointed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImplementationEntry {
    /// The deployment version at which this implementation became current
    pub version: u64,
    /// The implementation contract
    pub implementation: ImplementationAddress,
}

/// The durable record of a logical proxied deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    /// The logical deployment name
    pub name: String,
    /// The network the deployment lives on
    pub network: String,
    /// The chain ID of that network
    pub chain_id: u64,
    /// The name of the implementation contract
    pub contract: String,
    /// The proxy contract; never changes once set
    pub proxy_address: ProxyAddress,
    /// The current implementation contract
    pub implementation_address: ImplementationAddress,
    /// The account authorized to upgrade the proxy; never changes once set
    pub admin_address: Address,
    /// The `ProxyAdmin` contract read from the proxy's ERC-1967 admin slot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_admin: Option<Address>,
    /// The initializer function invoked at deploy time
    pub initializer: String,
    /// The initializer arguments, recorded for audit
    pub init_args: Vec<String>,
    /// Zero at initial deploy, incremented by every upgrade
    pub version: u64,
    /// Every implementation the proxy has pointed to, oldest first
    #[serde(default)]
    pub history: Vec<ImplementationEntry>,
}

impl DeploymentRecord {
    /// Create the record for a fresh deployment, at version zero
    pub fn new(
        name: &str,
        network: &str,
        chain_id: u64,
        contract: &str,
        initializer: &Initializer,
        deployment: &ProxyDeployment,
    ) -> Self {
        DeploymentRecord {
            name: name.to_string(),
            network: network.to_string(),
            chain_id,
            contract: contract.to_string(),
            proxy_address: deployment.proxy,
            implementation_address: deployment.implementation,
            admin_address: deployment.admin,
            proxy_admin: Some(deployment.proxy_admin),
            initializer: initializer.function.clone(),
            init_args: initializer.args.clone(),
            version: 0,
            history: vec![ImplementationEntry {
                version: 0,
                implementation: deployment.implementation,
            }],
        }
    }

    /// The record after the proxy has been repointed to `implementation`.
    /// Identity, admin, and initializer fields are carried over untouched.
    pub fn upgraded(
        &self,
        contract: &str,
        implementation: ImplementationAddress,
        version: u64,
    ) -> Self {
        let mut next = self.clone();
        next.contract = contract.to_string();
        next.implementation_address = implementation;
        next.version = version;
        next.history.push(ImplementationEntry {
            version,
            implementation,
        });
        next
    }

    /// The user-facing summary of the record
    pub fn summary(&self) -> DeploymentSummary {
        DeploymentSummary {
            proxy_address: self.proxy_address,
            implementation_address: self.implementation_address,
            admin_address: self.admin_address,
            version: self.version,
        }
    }
}

/// The addresses and version printed after a deploy or upgrade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentSummary {
    /// The proxy contract
    pub proxy_address: ProxyAddress,
    /// The current implementation contract
    pub implementation_address: ImplementationAddress,
    /// The upgrade authority
    pub admin_address: Address,
    /// The deployment version
    pub version: u64,
}
