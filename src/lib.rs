//! # moleculeone
//!
//! A Rust client library for the molecule.one batch retrosynthesis scoring API.
//!
//! Submit SMILES strings as one batch, poll the batch until every job has left the
//! queue and fetch the scores. Scoring happens on the service; this crate shapes the
//! requests and interprets the responses.

mod batch;
mod client;
mod common;
pub mod prelude;


pub use batch::{
    BatchError, BatchJobStatus, BatchResult, BatchStatus, JobCounts, JobState, ResultItems,
    SubmissionRequest,
};
pub use client::{
    Credential, Endpoints, Error as ClientError, ErrorResponse, HttpTransport, MoleculeOne,
    Transport, AUTH_SCHEME, DEFAULT_BASE_URL, USER_AGENT,
};
