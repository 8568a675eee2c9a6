use std::fmt;
use std::path::{Path, PathBuf};

use alloy_core::primitives::Address;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

/// The default name for the shipit configuration file.
pub const CONFIG_FILENAME: &str = "Shipit.toml";

/// The contract deployed when none is configured.
pub const DEFAULT_CONTRACT: &str = "MyToken";

/// The default JSON-RPC endpoint (a local Hardhat or Anvil node).
pub const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8545";

/// Configuration for a single contract deployment.
///
/// Can be serialized to/from TOML format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    /// Name of the contract to deploy, bare (`MyToken`) or fully qualified
    /// (`contracts/MyToken.sol:MyToken`).
    pub contract: String,
    /// The JSON-RPC endpoint of the target network.
    pub rpc_url: Url,
    /// The expected chain ID. Deployment aborts if the node reports another one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    /// Directories searched for compiled artifacts.
    pub artifacts: Vec<PathBuf>,
    /// Timeout for a single JSON-RPC request, in seconds.
    pub rpc_timeout_secs: u64,
    /// The deployment account.
    pub signer: SignerConfig,
    /// Transaction parameter overrides.
    pub tx: TxConfig,
    /// Confirmation policy.
    pub confirmation: ConfirmationConfig,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            contract: DEFAULT_CONTRACT.to_string(),
            rpc_url: Url::parse(DEFAULT_RPC_URL).expect("default RPC URL is valid"),
            chain_id: None,
            artifacts: vec![PathBuf::from("artifacts"), PathBuf::from("out")],
            rpc_timeout_secs: 5,
            signer: SignerConfig::default(),
            tx: TxConfig::default(),
            confirmation: ConfirmationConfig::default(),
        }
    }
}

/// Selects the account that sends the deployment transaction.
///
/// With neither `private_key` nor `mnemonic` set, the node-managed account `from`
/// is used, falling back to the first account reported by `eth_accounts`.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignerConfig {
    /// A node-managed sender address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<Address>,
    /// A hex-encoded private key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
    /// A BIP-39 mnemonic phrase.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mnemonic: Option<String>,
    /// The derivation index used with `mnemonic`.
    pub account_index: u32,
}

impl fmt::Debug for SignerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignerConfig")
            .field("from", &self.from)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("mnemonic", &self.mnemonic.as_ref().map(|_| "<redacted>"))
            .field("account_index", &self.account_index)
            .finish()
    }
}

/// Transaction parameter overrides. Unset values are queried from the node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TxConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_limit: Option<u64>,
    /// Gas price in wei.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<u64>,
}

/// How the deployment transaction is awaited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfirmationConfig {
    /// Number of blocks, including the inclusion block, to wait for.
    pub confirmations: u64,
    /// Interval between receipt polls, in milliseconds.
    pub poll_interval_ms: u64,
    /// Upper bound on the confirmation wait. Waits indefinitely when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            confirmations: 1,
            poll_interval_ms: 1000,
            timeout_secs: None,
        }
    }
}

impl DeployConfig {
    /// Check the invariants serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.contract.trim().is_empty() {
            anyhow::bail!("Contract name must not be empty");
        }

        if self.artifacts.is_empty() {
            anyhow::bail!("At least one artifacts directory must be configured");
        }

        if self.rpc_timeout_secs == 0 {
            anyhow::bail!("`rpc_timeout_secs` must be greater than 0");
        }

        if self.confirmation.confirmations == 0 {
            anyhow::bail!("`confirmation.confirmations` must be at least 1");
        }

        if self.confirmation.poll_interval_ms == 0 {
            anyhow::bail!("`confirmation.poll_interval_ms` must be greater than 0");
        }

        if self.signer.private_key.is_some() && self.signer.mnemonic.is_some() {
            anyhow::bail!("Only one of `signer.private_key` and `signer.mnemonic` may be set");
        }

        Ok(())
    }

    /// Load the configuration from a TOML file, or from `Shipit.toml` inside a directory.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(anyhow::anyhow!(
                "Configuration file or directory not found: {}",
                path.display()
            ));
        }

        let config_path = if path.is_dir() {
            path.join(CONFIG_FILENAME)
        } else {
            path.to_path_buf()
        };

        let content = std::fs::read_to_string(&config_path)
            .context(format!("Failed to read config from {}", config_path.display()))?;
        let config: Self =
            toml::from_str(&content).context("Failed to parse config file as TOML")?;
        tracing::info!(path = %config_path.display(), "Configuration loaded");
        Ok(config)
    }
}
