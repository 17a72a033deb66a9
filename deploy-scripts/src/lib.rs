//! Scripts for deploying upgradeable contracts behind transparent proxies,
//! and for upgrading them in place.
//!
//! A logical deployment name maps to one proxy for its whole life. The first
//! deploy of a name creates the implementation, the proxy, and runs the
//! initializer; every later deploy of the same name swaps the implementation.

pub mod chain;
pub mod cli;
mod commands;
pub mod config;
pub mod constants;
pub mod deployer;
pub mod errors;
pub mod orchestrator;
pub mod registry;
mod solidity;
pub mod types;
pub mod upgrade;
pub mod utils;
