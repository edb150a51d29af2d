//! Submits SMILES strings given on the command line and prints the batch id.
//!
//! ```text
//! MOLECULEONE_API_KEY=... cargo run --example submit -- CCO c1ccccc1O
//! ```
use display_error_chain::DisplayErrorChain;
use moleculeone::{BatchStatus, MoleculeOne};
use std::process::ExitCode;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt().init();

    match do_main().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let error_chain = DisplayErrorChain::new(e.as_ref());
            tracing::error!(error.debug = ?e, error.chained = %error_chain, "execution failed");
            ExitCode::FAILURE
        }
    }
}

async fn do_main() -> Result<(), Box<dyn std::error::Error>> {
    let client = MoleculeOne::from_env()?;
    let smiles: Vec<String> = std::env::args().skip(1).collect();
    if smiles.is_empty() {
        return Err("pass at least one SMILES string".into());
    }

    let mut request = client.submission(smiles);
    request.submit().await?;
    if !request.was_submitted() {
        warn!("batch was not accepted, see the diagnostic above");
        return Ok(());
    }

    info!(batch.id = %request.id()?, "batch submitted");

    let status = BatchStatus::query(&request).await?;
    info!(batches = status.num_jobs()?, "batches owned by this API key");
    println!("{status}");

    Ok(())
}
