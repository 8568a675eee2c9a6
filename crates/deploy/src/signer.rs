//! Deployment account selection.

use std::fmt;

use alloy_core::primitives::{Address, B256};
use alloy_signer_local::{MnemonicBuilder, coins_bip39::English};
use anyhow::{Context, Result};
use k256::ecdsa::{RecoveryId, Signature, SigningKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;

use crate::config::SignerConfig;

/// A secp256k1 key held in process memory.
#[derive(Clone)]
pub struct LocalKey {
    key: SigningKey,
    address: Address,
}

impl LocalKey {
    /// Parse a hex private key, with or without the `0x` prefix.
    pub fn from_private_key(private_key: &str) -> Result<Self> {
        let private_key = private_key.trim();
        let bytes = hex::decode(private_key.strip_prefix("0x").unwrap_or(private_key))
            .context("Private key is not valid hex")?;
        let key = SigningKey::from_slice(&bytes).context("Invalid secp256k1 private key")?;

        Ok(Self::from_signing_key(key))
    }

    /// Derive the key at `m/44'/60'/0'/0/<index>` from a BIP-39 phrase.
    pub fn from_mnemonic(phrase: &str, index: u32) -> Result<Self> {
        let signer = MnemonicBuilder::<English>::default()
            .phrase(phrase.trim())
            .index(index)
            .context("Invalid derivation index")?
            .build()
            .context("Failed to derive key from mnemonic")?;

        let key = SigningKey::from_slice(signer.to_bytes().as_slice())
            .context("Mnemonic derived an invalid secp256k1 key")?;

        Ok(Self::from_signing_key(key))
    }

    fn from_signing_key(key: SigningKey) -> Self {
        let point = key.verifying_key().to_encoded_point(false);
        // Skip the 0x04 SEC1 tag.
        let address = Address::from_raw_public_key(&point.as_bytes()[1..]);

        Self { key, address }
    }

    /// The account address controlled by this key.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Sign a 32-byte prehash, returning a low-s signature and its recovery id.
    pub fn sign_hash(&self, hash: &B256) -> Result<(Signature, RecoveryId)> {
        self.key
            .sign_prehash_recoverable(hash.as_slice())
            .context("Failed to sign transaction hash")
    }

    /// Load the local key described by `config`, if any.
    ///
    /// Returns `None` when the configuration selects a node-managed account.
    pub fn from_config(config: &SignerConfig) -> Result<Option<Self>> {
        match (&config.private_key, &config.mnemonic) {
            (Some(_), Some(_)) => {
                anyhow::bail!("Only one of `private_key` and `mnemonic` may be configured")
            }
            (Some(private_key), None) => Self::from_private_key(private_key).map(Some),
            (None, Some(mnemonic)) => Self::from_mnemonic(mnemonic, config.account_index).map(Some),
            (None, None) => Ok(None),
        }
    }
}

impl fmt::Debug for LocalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalKey")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// The account that sends the deployment transaction.
#[derive(Debug, Clone)]
pub enum DeploymentAccount {
    /// An account unlocked on the RPC node, used through `eth_sendTransaction`.
    Node(Address),
    /// A key held by this process, used through `eth_sendRawTransaction`.
    Local(LocalKey),
}

impl DeploymentAccount {
    pub fn address(&self) -> Address {
        match self {
            DeploymentAccount::Node(address) => *address,
            DeploymentAccount::Local(key) => key.address(),
        }
    }
}
