//! shipit deploys a compiled smart contract and reports where it landed.

mod cli;

use std::process::ExitCode;

use clap::Parser;

use cli::Cli;
use shipit_deploy::{
    DeploymentOutcome, DeploymentRunner, DeploymentStage, FAILURE_EXIT_CODE, RpcFactoryResolver,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize the logger. Logs go to stderr so stdout only carries the result.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .with_writer(std::io::stderr)
        .init();

    let outcome = match cli
        .load_config()
        .and_then(|config| Ok((RpcFactoryResolver::new(config.clone())?, config)))
    {
        Ok((resolver, config)) => DeploymentRunner::new(resolver, config.contract).run().await,
        // The framework could not even be set up: nothing was submitted.
        Err(error) => DeploymentOutcome::Failed {
            stage: DeploymentStage::FactoryResolution,
            error,
        },
    };

    if let Err(e) = outcome.report(&mut std::io::stdout().lock(), &mut std::io::stderr().lock()) {
        tracing::error!(err = %e, "Failed to report deployment outcome");
        return ExitCode::from(FAILURE_EXIT_CODE);
    }

    ExitCode::from(outcome.exit_code())
}
