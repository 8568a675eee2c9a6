//! JSON-RPC backed contract factories.

use std::future::Future;
use std::time::Duration;

use alloy_core::primitives::{Address, B256, Bytes, U64};
use anyhow::{Context, Result};
use backon::{ConstantBuilder, Retryable};
use derive_more::Display;
use serde::Deserialize;
use serde_json::json;

use crate::{
    artifact::{Artifact, ArtifactStore},
    config::{ConfirmationConfig, DeployConfig, TxConfig},
    factory::{ContractFactory, ContractFactoryResolver, DeployedContract, PendingDeployment},
    rpc::{self, RpcClient},
    signer::{DeploymentAccount, LocalKey},
    tx::LegacyTransaction,
};

/// Resolves factories from compiled artifacts and a JSON-RPC endpoint.
#[derive(Debug, Clone)]
pub struct RpcFactoryResolver {
    client: RpcClient,
    artifacts: ArtifactStore,
    config: DeployConfig,
}

impl RpcFactoryResolver {
    pub fn new(config: DeployConfig) -> Result<Self> {
        config.validate()?;

        let client = RpcClient::with_timeout(
            config.rpc_url.clone(),
            Duration::from_secs(config.rpc_timeout_secs),
        )?;
        let artifacts = ArtifactStore::new(config.artifacts.clone());

        Ok(Self {
            client,
            artifacts,
            config,
        })
    }

    async fn chain_id(&self) -> Result<u64> {
        let chain_id: String = self
            .client
            .call("eth_chainId", vec![])
            .await
            .context("Failed to query chain ID - is the node running?")?;

        rpc::parse_quantity(&chain_id)
    }

    /// Pick the deployment account: a local key, the configured node account, or the
    /// node's first account.
    async fn resolve_account(&self) -> Result<DeploymentAccount> {
        if let Some(key) = LocalKey::from_config(&self.config.signer)? {
            return Ok(DeploymentAccount::Local(key));
        }

        if let Some(from) = self.config.signer.from {
            return Ok(DeploymentAccount::Node(from));
        }

        let accounts: Vec<Address> = self
            .client
            .call("eth_accounts", vec![])
            .await
            .context("Failed to list node accounts")?;

        accounts
            .into_iter()
            .next()
            .map(DeploymentAccount::Node)
            .context("The node manages no accounts; configure a private key or a mnemonic")
    }
}

impl ContractFactoryResolver for RpcFactoryResolver {
    type Factory = RpcContractFactory;

    async fn get_contract_factory(&self, name: &str) -> Result<RpcContractFactory> {
        let artifact = self.artifacts.load(name)?;
        let chain_id = self.chain_id().await?;

        if let Some(expected) = self.config.chain_id {
            if expected != chain_id {
                anyhow::bail!(
                    "Chain ID mismatch: expected {}, but {} reports {}",
                    expected,
                    self.client.url(),
                    chain_id
                );
            }
        }

        let account = self.resolve_account().await?;

        tracing::debug!(
            contract = %artifact.qualified_name(),
            chain_id,
            sender = %account.address(),
            "Resolved contract factory"
        );

        Ok(RpcContractFactory {
            client: self.client.clone(),
            artifact,
            account,
            chain_id,
            tx: self.config.tx.clone(),
            confirmation: self.config.confirmation.clone(),
        })
    }
}

/// Deploys one contract through a JSON-RPC endpoint.
#[derive(Debug, Clone)]
pub struct RpcContractFactory {
    client: RpcClient,
    artifact: Artifact,
    account: DeploymentAccount,
    chain_id: u64,
    tx: TxConfig,
    confirmation: ConfirmationConfig,
}

impl RpcContractFactory {
    pub fn artifact(&self) -> &Artifact {
        &self.artifact
    }

    pub fn sender(&self) -> Address {
        self.account.address()
    }

    async fn nonce(&self) -> Result<u64> {
        let nonce: String = self
            .client
            .call(
                "eth_getTransactionCount",
                vec![json!(self.sender()), json!("pending")],
            )
            .await
            .context("Failed to fetch account nonce")?;

        rpc::parse_quantity(&nonce)
    }

    async fn gas_price(&self) -> Result<u128> {
        if let Some(gas_price) = self.tx.gas_price {
            return Ok(u128::from(gas_price));
        }

        let gas_price: String = self
            .client
            .call("eth_gasPrice", vec![])
            .await
            .context("Failed to fetch gas price")?;

        rpc::parse_quantity_u128(&gas_price)
    }

    async fn gas_limit(&self) -> Result<u64> {
        if let Some(gas_limit) = self.tx.gas_limit {
            return Ok(gas_limit);
        }

        let estimate: String = self
            .client
            .call(
                "eth_estimateGas",
                vec![json!({
                    "from": self.sender(),
                    "data": self.artifact.bytecode,
                })],
            )
            .await
            .context("Failed to estimate deployment gas")?;

        rpc::parse_quantity(&estimate)
    }
}

impl ContractFactory for RpcContractFactory {
    type Pending = RpcPendingDeployment;

    async fn deploy(&self) -> Result<RpcPendingDeployment> {
        let sender = self.sender();
        let nonce = self.nonce().await?;
        let gas_price = self.gas_price().await?;
        let gas_limit = self.gas_limit().await?;

        tracing::debug!(
            contract = %self.artifact.contract_name,
            %sender,
            nonce,
            gas_price,
            gas_limit,
            "Submitting deployment transaction"
        );

        let tx_hash: B256 = match &self.account {
            DeploymentAccount::Local(key) => {
                let raw = LegacyTransaction::create(
                    nonce,
                    gas_price,
                    gas_limit,
                    self.artifact.bytecode.clone(),
                    self.chain_id,
                )
                .sign(key)?;

                self.client
                    .call("eth_sendRawTransaction", vec![json!(raw)])
                    .await
                    .context("Failed to send deployment transaction")?
            }
            DeploymentAccount::Node(_) => self
                .client
                .call(
                    "eth_sendTransaction",
                    vec![json!({
                        "from": sender,
                        "data": self.artifact.bytecode,
                        "nonce": rpc::to_quantity(nonce),
                        "gas": rpc::to_quantity(gas_limit),
                        "gasPrice": rpc::to_quantity(gas_price),
                    })],
                )
                .await
                .context("Failed to send deployment transaction")?,
        };

        let address = sender.create(nonce);

        tracing::info!(tx_hash = %tx_hash, %address, "Deployment transaction sent");

        Ok(RpcPendingDeployment {
            client: self.client.clone(),
            tx_hash,
            address,
            confirmation: self.confirmation.clone(),
        })
    }
}

/// A deployment transaction sent through JSON-RPC.
#[derive(Debug, Clone)]
pub struct RpcPendingDeployment {
    client: RpcClient,
    tx_hash: B256,
    address: Address,
    confirmation: ConfirmationConfig,
}

/// The subset of a transaction receipt needed to confirm a deployment.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionReceipt {
    block_number: Option<U64>,
    /// `0x1` on success, `0x0` on revert. Absent on pre-Byzantium chains.
    status: Option<U64>,
    contract_address: Option<Address>,
}

#[derive(Debug, Display)]
enum PollError {
    /// The awaited condition does not hold yet.
    #[display("waiting for {_0}")]
    Pending(String),
    #[display("{_0}")]
    Rpc(anyhow::Error),
}

impl RpcPendingDeployment {
    pub fn tx_hash(&self) -> B256 {
        self.tx_hash
    }

    fn backoff(&self) -> ConstantBuilder {
        // Polling is unbounded here; `deployed` enforces the overall deadline.
        ConstantBuilder::default()
            .with_delay(Duration::from_millis(self.confirmation.poll_interval_ms))
            .with_max_times(usize::MAX)
    }

    /// Repeat `check` until it stops reporting [`PollError::Pending`].
    async fn poll<T, F, Fut>(&self, check: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PollError>>,
    {
        let result = check
            .retry(self.backoff())
            .when(|e| matches!(e, PollError::Pending(_)))
            .notify(|e, after| tracing::trace!(error = %e, ?after, "Polling again"))
            .await;

        match result {
            Ok(value) => Ok(value),
            Err(PollError::Rpc(e)) => Err(e),
            Err(PollError::Pending(what)) => {
                Err(anyhow::anyhow!("Gave up waiting for {}", what))
            }
        }
    }

    async fn receipt(&self) -> Result<TransactionReceipt> {
        self.poll(|| async {
            let receipt: Option<TransactionReceipt> = self
                .client
                .call("eth_getTransactionReceipt", vec![json!(self.tx_hash)])
                .await
                .context("Failed to fetch transaction receipt")
                .map_err(PollError::Rpc)?;

            match receipt {
                Some(receipt) if receipt.block_number.is_some() => Ok(receipt),
                _ => Err(PollError::Pending(format!(
                    "transaction {} to be mined",
                    self.tx_hash
                ))),
            }
        })
        .await
    }

    async fn wait_for_depth(&self, included_at: u64) -> Result<()> {
        let target = included_at + self.confirmation.confirmations - 1;

        self.poll(|| async {
            let head: String = self
                .client
                .call("eth_blockNumber", vec![])
                .await
                .context("Failed to fetch block number")
                .map_err(PollError::Rpc)?;
            let head = rpc::parse_quantity(&head).map_err(PollError::Rpc)?;

            if head >= target {
                Ok(())
            } else {
                Err(PollError::Pending(format!(
                    "block {} (currently at {})",
                    target, head
                )))
            }
        })
        .await
    }

    /// Receipt, confirmation depth and code checks, without any deadline.
    async fn confirm(&self) -> Result<DeployedContract> {
        let receipt = self.receipt().await?;
        let block_number = receipt
            .block_number
            .map(|n| n.to::<u64>())
            .context("Receipt has no block number")?;

        if receipt.status == Some(U64::ZERO) {
            anyhow::bail!(
                "Deployment transaction {} reverted in block {}",
                self.tx_hash,
                block_number
            );
        }

        let address = receipt
            .contract_address
            .context("No contract address in receipt")?;

        if address != self.address {
            tracing::warn!(
                predicted = %self.address,
                actual = %address,
                "Contract address differs from the predicted one"
            );
        }

        if self.confirmation.confirmations > 1 {
            tracing::info!(
                confirmations = self.confirmation.confirmations,
                block_number,
                "Waiting for confirmations..."
            );
            self.wait_for_depth(block_number).await?;
        }

        let code: Bytes = self
            .client
            .call("eth_getCode", vec![json!(address), json!("latest")])
            .await
            .context("Failed to fetch deployed code")?;

        if code.is_empty() {
            anyhow::bail!("Contract deployment failed: no code at {}", address);
        }

        Ok(DeployedContract {
            address,
            tx_hash: self.tx_hash,
            block_number,
        })
    }
}

impl PendingDeployment for RpcPendingDeployment {
    fn address(&self) -> Address {
        self.address
    }

    async fn deployed(self) -> Result<DeployedContract> {
        let Some(secs) = self.confirmation.timeout_secs else {
            return self.confirm().await;
        };

        tokio::time::timeout(Duration::from_secs(secs), self.confirm())
            .await
            .map_err(|_| {
                anyhow::anyhow!(
                    "Timed out after {}s waiting for deployment transaction {} to be confirmed",
                    secs,
                    self.tx_hash
                )
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receipt_deserialization() {
        let receipt: TransactionReceipt = serde_json::from_value(json!({
            "transactionHash": "0x0d9f5f3a5e0ae3a6a3c4e6b1d3f3c5c4e1f0a7a1b1c2d3e4f5a6b7c8d9e0f1a2",
            "blockNumber": "0x1",
            "status": "0x1",
            "contractAddress": "0x5fbdb2315678afecb367f032d93f642f64180aa3",
            "gasUsed": "0x5208",
            "logs": []
        }))
        .unwrap();

        assert_eq!(receipt.block_number, Some(U64::from(1)));
        assert_eq!(receipt.status, Some(U64::from(1)));
        assert_eq!(
            receipt.contract_address,
            Some("0x5FbDB2315678afecb367f032d93F642f64180aa3".parse().unwrap())
        );
    }

    #[test]
    fn test_reverted_receipt_deserialization() {
        let receipt: TransactionReceipt = serde_json::from_value(json!({
            "blockNumber": "0x2",
            "status": "0x0",
            "contractAddress": null
        }))
        .unwrap();

        assert_eq!(receipt.status, Some(U64::ZERO));
        assert!(receipt.contract_address.is_none());
    }

    #[test]
    fn test_predicted_address() {
        // The first contract deployed by the default development account.
        let sender: Address = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".parse().unwrap();
        assert_eq!(
            sender.create(0),
            "0x5FbDB2315678afecb367f032d93F642f64180aa3"
                .parse::<Address>()
                .unwrap()
        );
    }

    #[test]
    fn test_resolver_rejects_invalid_config() {
        let config = DeployConfig {
            contract: String::new(),
            ..Default::default()
        };
        assert!(RpcFactoryResolver::new(config).is_err());
    }
}
