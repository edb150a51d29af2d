//! Polls a previously submitted batch until it is finished, then prints its results.
//!
//! ```text
//! MOLECULEONE_API_KEY=... cargo run --example poll -- <batch-id>
//! ```
use display_error_chain::DisplayErrorChain;
use moleculeone::{BatchJobStatus, BatchResult, ClientError, MoleculeOne};
use std::{process::ExitCode, time::Duration};
use tokio::time::sleep;
use tracing::{info, warn};

const INITIAL_DELAY: Duration = Duration::from_secs(10);
const MAX_DELAY: Duration = Duration::from_secs(300);

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
    let id = std::env::args().nth(1).ok_or("pass the batch id to poll")?;
    let request = client.resume(id);

    let mut status = BatchJobStatus::query(&request).await?;
    let mut delay = INITIAL_DELAY;
    loop {
        let counts = match status.snapshot().await {
            Ok(counts) => counts,
            Err(e) if matches!(e.client_error(), Some(ClientError::TooManyRequests { .. })) => {
                warn!(delay.secs = delay.as_secs(), "rate limited, backing off");
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        if counts.is_finished() {
            break;
        }

        info!(
            finished = counts.finished,
            running = counts.running,
            queued = counts.queued,
            "batch still in progress"
        );
        sleep(delay).await;
        delay = (delay * 2).min(MAX_DELAY);
        if let Err(e) = status.refresh().await {
            warn!(error = %e, "refresh failed, retrying on next poll");
        }
    }

    print!("{status}");
    if status.has_errors().await? {
        warn!("some jobs of the batch failed");
    }

    let result = BatchResult::query(&request).await?;
    for item in &result {
        println!("{item}");
    }

    Ok(())
}
