//! Utilities for the deploy scripts.

use std::{io, path::PathBuf};

use alloy::signers::local::PrivateKeySigner;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::errors::ScriptError;

/// Set up a `tracing` subscriber writing to stderr, filtered by `RUST_LOG`
/// (defaulting to `info`). Stdout is reserved for command output.
pub fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

/// The default registry path for a network, `deployments.<network>.json`
pub fn default_deployments_path(network: &str) -> PathBuf {
    PathBuf::from(format!("deployments.{network}.json"))
}

/// Take the signer at `index` out of the profile's signers
pub fn select_signer(
    signers: &[PrivateKeySigner],
    index: usize,
) -> Result<PrivateKeySigner, ScriptError> {
    signers.get(index).cloned().ok_or_else(|| {
        ScriptError::Config(format!(
            "signer index {index} out of range, the network has {} accounts",
            signers.len()
        ))
    })
}
