use std::path::{Path, PathBuf};

use alloy_core::primitives::Address;
use anyhow::Context;
use clap::{Args, Parser};
use figment::{Figment, providers::Serialized};
use serde::Serialize;
use shipit_deploy::{CONFIG_FILENAME, DeployConfig, SignerConfig};
use tracing::level_filters::LevelFilter;
use url::Url;

#[derive(Parser)]
#[command(name = "shipit")]
#[command(author, version, about = "Deploy a compiled smart contract in one shot")]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, env = "SHIPIT_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to a Shipit.toml configuration file, or a directory containing one.
    ///
    /// If not provided, ./Shipit.toml is used when it exists.
    #[arg(long, alias = "conf", env = "SHIPIT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Values overriding the configuration file.
    #[clap(flatten)]
    pub overrides: ConfigOverrides,
}

/// Command line overrides, layered on top of the configuration file.
///
/// Unset values are skipped so they do not shadow the file.
#[derive(Debug, Clone, Default, Args, Serialize)]
pub struct ConfigOverrides {
    /// Name of the contract to deploy, bare (MyToken) or fully qualified
    /// (contracts/MyToken.sol:MyToken). Defaults to MyToken.
    #[arg(short, long, env = "SHIPIT_CONTRACT")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract: Option<String>,

    /// The JSON-RPC endpoint of the target network.
    #[arg(long, alias = "rpc", env = "SHIPIT_RPC_URL")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rpc_url: Option<Url>,

    /// The expected chain ID. Deployment aborts if the node reports another one.
    #[arg(long, env = "SHIPIT_CHAIN_ID")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,

    /// Directories searched for compiled artifacts, in order.
    #[arg(long, env = "SHIPIT_ARTIFACTS", value_delimiter = ',')]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<PathBuf>,

    #[clap(flatten)]
    pub signer: SignerOverrides,

    #[clap(flatten)]
    pub tx: TxOverrides,

    #[clap(flatten)]
    pub confirmation: ConfirmationOverrides,
}

#[derive(Debug, Clone, Default, Args, Serialize)]
pub struct SignerOverrides {
    /// Send from this node-managed account instead of the node's first account.
    #[arg(long, env = "SHIPIT_FROM")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<Address>,

    /// Sign locally with this hex private key.
    #[arg(long, env = "SHIPIT_PRIVATE_KEY", hide_env_values = true, conflicts_with = "mnemonic")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,

    /// Sign locally with a key derived from this BIP-39 mnemonic.
    #[arg(long, env = "SHIPIT_MNEMONIC", hide_env_values = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mnemonic: Option<String>,

    /// The mnemonic derivation index (m/44'/60'/0'/0/<index>).
    #[arg(long, env = "SHIPIT_ACCOUNT_INDEX")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_index: Option<u32>,
}

impl SignerOverrides {
    /// Whether an account is chosen on the command line. `--account-index` alone only
    /// adjusts the configured mnemonic.
    pub fn selects_account(&self) -> bool {
        self.from.is_some() || self.private_key.is_some() || self.mnemonic.is_some()
    }
}

#[derive(Debug, Clone, Default, Args, Serialize)]
pub struct TxOverrides {
    /// Gas limit for the deployment. Estimated by the node if not provided.
    #[arg(long, env = "SHIPIT_GAS_LIMIT")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_limit: Option<u64>,

    /// Gas price in wei. Queried from the node if not provided.
    #[arg(long, env = "SHIPIT_GAS_PRICE")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<u64>,
}

#[derive(Debug, Clone, Default, Args, Serialize)]
pub struct ConfirmationOverrides {
    /// Number of blocks, including the inclusion block, to wait for.
    #[arg(long, env = "SHIPIT_CONFIRMATIONS")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmations: Option<u64>,

    /// Give up waiting for confirmation after this many seconds.
    ///
    /// If not provided, waits indefinitely.
    #[arg(long = "timeout", env = "SHIPIT_TIMEOUT")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Cli {
    /// Build the effective configuration: defaults, then the configuration file, then
    /// command line overrides.
    pub fn load_config(&self) -> anyhow::Result<DeployConfig> {
        let base = match &self.config {
            Some(path) => DeployConfig::load_from_file(path)?,
            None if Path::new(CONFIG_FILENAME).is_file() => {
                DeployConfig::load_from_file(Path::new(CONFIG_FILENAME))?
            }
            None => DeployConfig::default(),
        };

        merge_overrides(base, &self.overrides)
    }
}

fn merge_overrides(
    mut base: DeployConfig,
    overrides: &ConfigOverrides,
) -> anyhow::Result<DeployConfig> {
    // An account chosen by flag replaces the file's signer section as a whole.
    if overrides.signer.selects_account() {
        base.signer = SignerConfig::default();
    }

    let config: DeployConfig = Figment::from(Serialized::defaults(base))
        .merge(Serialized::defaults(overrides))
        .extract()
        .context("Failed to merge command line overrides into the configuration")?;

    config.validate()?;

    tracing::debug!(
        contract = %config.contract,
        rpc_url = %config.rpc_url,
        chain_id = ?config.chain_id,
        "Configuration resolved"
    );

    Ok(config)
}
