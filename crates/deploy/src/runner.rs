//! One-shot deployment orchestration.

use std::io::{self, Write};

use alloy_core::primitives::Address;
use anyhow::Context;

use crate::factory::{ContractFactory, ContractFactoryResolver, DeployedContract, PendingDeployment};

/// Printed before the contract address on success.
pub const SUCCESS_PREFIX: &str = "NFT deployed to";

/// Exit code reported when the deployment fails.
pub const FAILURE_EXIT_CODE: u8 = 1;

/// The step a deployment failed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum DeploymentStage {
    FactoryResolution,
    Submission,
    Confirmation,
}

/// The terminal state of a deployment run.
#[derive(Debug)]
pub enum DeploymentOutcome {
    Confirmed(DeployedContract),
    Failed {
        stage: DeploymentStage,
        error: anyhow::Error,
    },
}

impl DeploymentOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, DeploymentOutcome::Confirmed(_))
    }

    /// The process exit code for this outcome.
    pub fn exit_code(&self) -> u8 {
        match self {
            DeploymentOutcome::Confirmed(_) => 0,
            DeploymentOutcome::Failed { .. } => FAILURE_EXIT_CODE,
        }
    }

    /// Write the user-facing result: the success line to `stdout`, or the error chain to `stderr`.
    pub fn report(&self, stdout: &mut impl Write, stderr: &mut impl Write) -> io::Result<()> {
        match self {
            DeploymentOutcome::Confirmed(deployed) => {
                writeln!(stdout, "{} {}", SUCCESS_PREFIX, deployed.address)?;
                stdout.flush()
            }
            DeploymentOutcome::Failed { error, .. } => {
                writeln!(stderr, "Error: {:?}", error)?;
                stderr.flush()
            }
        }
    }
}

/// Deploys a single contract through a [`ContractFactoryResolver`].
///
/// Each run resolves the factory, submits the deployment and waits for confirmation
/// exactly once. Nothing is retried and nothing is kept between runs.
#[derive(Debug, Clone)]
pub struct DeploymentRunner<R> {
    resolver: R,
    contract: String,
}

impl<R> DeploymentRunner<R>
where
    R: ContractFactoryResolver,
{
    pub fn new(resolver: R, contract: impl Into<String>) -> Self {
        Self {
            resolver,
            contract: contract.into(),
        }
    }

    pub fn contract(&self) -> &str {
        &self.contract
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    pub async fn run(&self) -> DeploymentOutcome {
        tracing::info!(contract = %self.contract, "Deploying contract...");

        let factory = match self
            .resolver
            .get_contract_factory(&self.contract)
            .await
            .with_context(|| format!("Failed to get contract factory for \"{}\"", self.contract))
        {
            Ok(factory) => factory,
            Err(error) => return self.failed(DeploymentStage::FactoryResolution, error),
        };

        let pending = match factory
            .deploy()
            .await
            .with_context(|| format!("Failed to deploy \"{}\"", self.contract))
        {
            Ok(pending) => pending,
            Err(error) => return self.failed(DeploymentStage::Submission, error),
        };

        tracing::info!(
            contract = %self.contract,
            address = %pending.address(),
            "Deployment pending, waiting for confirmation..."
        );

        let deployed = match pending
            .deployed()
            .await
            .with_context(|| format!("Deployment of \"{}\" was not confirmed", self.contract))
        {
            Ok(deployed) => deployed,
            Err(error) => return self.failed(DeploymentStage::Confirmation, error),
        };

        if deployed.address == Address::ZERO {
            return self.failed(
                DeploymentStage::Confirmation,
                anyhow::anyhow!(
                    "Deployment of \"{}\" was confirmed without a contract address",
                    self.contract
                ),
            );
        }

        tracing::info!(
            contract = %self.contract,
            address = %deployed.address,
            tx_hash = %deployed.tx_hash,
            block_number = deployed.block_number,
            "✓ Deployment confirmed"
        );

        DeploymentOutcome::Confirmed(deployed)
    }

    fn failed(&self, stage: DeploymentStage, error: anyhow::Error) -> DeploymentOutcome {
        tracing::error!(contract = %self.contract, %stage, "Deployment failed");
        DeploymentOutcome::Failed { stage, error }
    }
}
