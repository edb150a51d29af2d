//! Batch scoring on the molecule.one API.
//!
//! A batch moves through three stages, each backed by its own type:
//!
//! 1. [`SubmissionRequest`] collects SMILES strings and submits them as one batch.
//!    The service answers with a batch id.
//! 2. [`BatchJobStatus`] polls the finished/running/queued/error counts of that batch,
//!    while [`BatchStatus`] lists every batch owned by the API key.
//! 3. [`BatchResult`] fetches the scores once the batch is finished.
//!
//! # Design Note: Error Policy of `submit`
//!
//! [`SubmissionRequest::submit`] does not propagate authorization, permission and
//! server failures. It logs them and leaves the request unsubmitted, so callers must
//! check [`SubmissionRequest::was_submitted`]. Use [`SubmissionRequest::submit_strict`]
//! to receive every failure as an error instead.
//!
//! ## Example usage:
//! ```rust,ignore
//! use moleculeone::{BatchJobStatus, BatchResult, MoleculeOne};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = MoleculeOne::new(std::env::var("MOLECULEONE_API_KEY")?)?;
//!     let mut request = client.submission(["CCO", "c1ccccc1O"]);
//!     request.submit_strict().await?;
//!
//!     let mut status = BatchJobStatus::query(&request).await?;
//!     while !status.is_finished().await? {
//!         tokio::time::sleep(std::time::Duration::from_secs(30)).await;
//!         status.refresh().await?;
//!     }
//!
//!     let result = BatchResult::query(&request).await?;
//!     for item in &result {
//!         println!("{item}");
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod job;
pub mod request;
pub mod result;
pub mod status;

pub use error::Error as BatchError;
pub use job::{BatchJobStatus, JobCounts, JobState};
pub use request::SubmissionRequest;
pub use result::{BatchResult, ResultItems};
pub use status::BatchStatus;
