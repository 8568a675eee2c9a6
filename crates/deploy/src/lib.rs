//! shipit-deploy - One-shot smart contract deployment.
//!
//! This crate resolves a compiled contract by name, submits its deployment to an EVM
//! network over JSON-RPC and waits for the transaction to be confirmed.

mod artifact;
pub use artifact::{Artifact, ArtifactStore};

mod config;
pub use config::{
    CONFIG_FILENAME, ConfirmationConfig, DEFAULT_CONTRACT, DEFAULT_RPC_URL, DeployConfig,
    SignerConfig, TxConfig,
};

mod factory;
pub use factory::{ContractFactory, ContractFactoryResolver, DeployedContract, PendingDeployment};

mod network;
pub use network::{RpcContractFactory, RpcFactoryResolver, RpcPendingDeployment};

pub mod rpc;

mod runner;
pub use runner::{
    DeploymentOutcome, DeploymentRunner, DeploymentStage, FAILURE_EXIT_CODE, SUCCESS_PREFIX,
};

mod signer;
pub use signer::{DeploymentAccount, LocalKey};

mod tx;
pub use tx::LegacyTransaction;
