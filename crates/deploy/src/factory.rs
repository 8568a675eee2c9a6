//! Contract factory abstraction.
//!
//! The deployment runner only sees these traits. The JSON-RPC implementation lives in
//! [`crate::network`]; tests substitute their own.

use std::future::Future;

use alloy_core::primitives::{Address, B256};
use anyhow::Result;

/// Resolves contract factories by contract name.
pub trait ContractFactoryResolver {
    type Factory: ContractFactory;

    /// Obtain a factory for the named contract.
    fn get_contract_factory(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<Self::Factory>> + Send;
}

/// Creates new instances of a single contract.
pub trait ContractFactory {
    type Pending: PendingDeployment;

    /// Submit a deployment transaction with no constructor arguments.
    ///
    /// Resolves once the transaction is accepted by the network, not when it is mined.
    fn deploy(&self) -> impl Future<Output = Result<Self::Pending>> + Send;
}

/// A submitted, not yet confirmed, deployment.
pub trait PendingDeployment {
    /// The address the contract will live at once the transaction is mined.
    fn address(&self) -> Address;

    /// Wait until the deployment transaction is confirmed.
    fn deployed(self) -> impl Future<Output = Result<DeployedContract>> + Send;
}

/// A confirmed deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeployedContract {
    pub address: Address,
    pub tx_hash: B256,
    pub block_number: u64,
}
