//! Constants used in the deploy scripts

use alloy::primitives::{b256, B256};

/// The network profile used when none is selected
pub const DEFAULT_NETWORK: &str = "hardhat";

/// The default path of the `TransparentUpgradeableProxy` artifact
///
/// Compiled from https://github.com/OpenZeppelin/openzeppelin-contracts/blob/v5.0.0/contracts/proxy/transparent/TransparentUpgradeableProxy.sol
pub const DEFAULT_PROXY_ARTIFACT: &str = "artifacts/TransparentUpgradeableProxy.json";

/// The initializer invoked through the proxy when none is given
pub const DEFAULT_INITIALIZER: &str = "initialize";

/// The number of seconds to wait for a transaction to be confirmed
pub const DEFAULT_CONFIRMATION_TIMEOUT_SECS: u64 = 120;

/// The interval at which receipts are polled
pub const RECEIPT_POLL_INTERVAL_MS: u64 = 500;

/// The storage slot containing the implementation address in the upgradeable proxy.
///
/// This is specified in EIP1967: https://eips.ethereum.org/EIPS/eip-1967#logic-contract-address
pub const PROXY_IMPLEMENTATION_STORAGE_SLOT: B256 =
    b256!("360894a13ba1a3210667c828492db98dca3e2076cc3735a920a3ca505d382bbc");

/// The storage slot containing the proxy admin contract address in the upgradeable proxy.
///
/// This is specified in EIP1967: https://eips.ethereum.org/EIPS/eip-1967#admin-address
pub const PROXY_ADMIN_STORAGE_SLOT: B256 =
    b256!("b53127684a568b3173ae13b9f8a6016e243e63b6e8ee1178d6a717850b5d6103");

/// The number of bytes stored in a single storage slot
pub const NUM_BYTES_STORAGE_SLOT: usize = 32;

/// The number of bytes in an Ethereum address
pub const NUM_BYTES_ADDRESS: usize = 20;

/// The selector of OpenZeppelin v5's `InvalidInitialization()` error
pub const INVALID_INITIALIZATION_SELECTOR: &str = "0xf92ee8a9";

/// The revert reason of OpenZeppelin v4's `initializer` modifier
pub const ALREADY_INITIALIZED_REASON: &str = "already initialized";

/// The environment variable holding the main deployer's private key
pub const MAIN_DEPLOYER_KEY_ENV_VAR: &str = "MAIN_DEPLOYER_PRIVATE_KEY";

/// The mnemonic of the local Hardhat network's accounts
pub const HARDHAT_MNEMONIC: &str =
    "weekend friend since level unaware voyage lazy spring put three grunt power";

/// The derivation path prefix of the local Hardhat network's accounts
pub const HARDHAT_DERIVATION_PATH: &str = "m/44'/60'/0'/0";

/// The number of accounts derived for the local Hardhat network
pub const HARDHAT_ACCOUNT_COUNT: u32 = 5;

/// The chain ID of the local Hardhat network
pub const HARDHAT_CHAIN_ID: u64 = 31337;

/// The chain ID of the Fantom Opera network
pub const FANTOM_CHAIN_ID: u64 = 250;

/// The gas multiplier applied to estimates on Fantom
pub const FANTOM_GAS_MULTIPLIER: f64 = 1.2;
