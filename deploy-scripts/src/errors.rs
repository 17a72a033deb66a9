//! Definitions of errors that can occur during deployment and upgrade of proxied contracts

use std::{
    error::Error,
    fmt::{self, Display, Formatter},
};

use alloy::primitives::Address;

use crate::types::ProxyAddress;

/// The step of a deployment or upgrade at which an on-chain operation failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Deploying an implementation contract
    DeployImplementation,
    /// Deploying the proxy contract
    DeployProxy,
    /// Reading back the ERC-1967 slots of the proxy
    VerifyProxy,
    /// Calling the initializer through the proxy
    Initialize,
    /// Repointing the proxy through its admin
    UpgradeProxy,
}

impl Display for Step {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Step::DeployImplementation => write!(f, "deploy-implementation"),
            Step::DeployProxy => write!(f, "deploy-proxy"),
            Step::VerifyProxy => write!(f, "verify-proxy"),
            Step::Initialize => write!(f, "initialize"),
            Step::UpgradeProxy => write!(f, "upgrade-proxy"),
        }
    }
}

/// Errors that can occur during the execution of the deploy scripts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    /// A transaction was rejected, reverted, or not confirmed in time
    Deploy {
        /// The step that failed
        step: Step,
        /// The underlying cause
        cause: String,
    },
    /// The initializer was invoked on a proxy that is already initialized
    AlreadyInitialized(ProxyAddress),
    /// The signing account is not the recorded admin of the proxy
    Unauthorized {
        /// The account attempting the upgrade
        signer: Address,
        /// The recorded admin
        admin: Address,
    },
    /// The address registry could not be read or written
    Persistence(String),
    /// An upgrade was requested for a name with no recorded deployment
    MissingDeployment(String),
    /// Error parsing a compilation artifact
    ArtifactParsing(String),
    /// Error constructing calldata for a contract method
    CalldataConstruction(String),
    /// Error initializing the RPC client
    ClientInitialization(String),
    /// Error in the network configuration
    Config(String),
    /// Error serializing output
    Serde(String),
}

impl ScriptError {
    /// Construct a [`ScriptError::Deploy`] for the given step
    pub fn deploy(step: Step, cause: impl ToString) -> Self {
        ScriptError::Deploy {
            step,
            cause: cause.to_string(),
        }
    }

    /// The error kind, as reported to the user
    pub fn kind(&self) -> &'static str {
        match self {
            ScriptError::Deploy { .. } => "DeployError",
            ScriptError::AlreadyInitialized(_) => "AlreadyInitializedError",
            ScriptError::Unauthorized { .. } => "UnauthorizedError",
            ScriptError::Persistence(_) => "PersistenceError",
            ScriptError::MissingDeployment(_) => "MissingDeploymentError",
            ScriptError::ArtifactParsing(_) => "ArtifactError",
            ScriptError::CalldataConstruction(_) => "CalldataError",
            ScriptError::ClientInitialization(_) => "ClientError",
            ScriptError::Config(_) => "ConfigError",
            ScriptError::Serde(_) => "SerdeError",
        }
    }
}

impl Display for ScriptError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ScriptError::Deploy { step, cause } => write!(f, "error at step {step}: {cause}"),
            ScriptError::AlreadyInitialized(proxy) => {
                write!(f, "proxy {proxy} is already initialized")
            }
            ScriptError::Unauthorized { signer, admin } => {
                write!(f, "signer {signer:#x} is not the proxy admin {admin:#x}")
            }
            ScriptError::Persistence(s) => write!(f, "error persisting deployments: {s}"),
            ScriptError::MissingDeployment(name) => {
                write!(f, "no recorded deployment named `{name}` to upgrade")
            }
            ScriptError::ArtifactParsing(s) => write!(f, "error parsing artifact: {s}"),
            ScriptError::CalldataConstruction(s) => write!(f, "error constructing calldata: {s}"),
            ScriptError::ClientInitialization(s) => write!(f, "error initializing client: {s}"),
            ScriptError::Config(s) => write!(f, "configuration error: {s}"),
            ScriptError::Serde(s) => write!(f, "error serializing output: {s}"),
        }
    }
}

impl Error for ScriptError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_are_distinct() {
        let errors = [
            ScriptError::deploy(Step::DeployProxy, "reverted"),
            ScriptError::AlreadyInitialized(ProxyAddress(Address::ZERO)),
            ScriptError::Unauthorized {
                signer: Address::ZERO,
                admin: Address::repeat_byte(1),
            },
            ScriptError::Persistence(String::new()),
            ScriptError::MissingDeployment(String::new()),
            ScriptError::ArtifactParsing(String::new()),
            ScriptError::CalldataConstruction(String::new()),
            ScriptError::ClientInitialization(String::new()),
            ScriptError::Config(String::new()),
            ScriptError::Serde(String::new()),
        ];

        let mut kinds: Vec<_> = errors.iter().map(ScriptError::kind).collect();
        kinds.sort_unstable();
        kinds.dedup();
        assert_eq!(kinds.len(), errors.len());
    }

    #[test]
    fn test_output_errors_are_not_persistence_errors() {
        let err = ScriptError::Serde("key must be a string".to_string());
        assert_eq!(err.kind(), "SerdeError");
        assert_eq!(err.to_string(), "error serializing output: key must be a string");
    }
}
