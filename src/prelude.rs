//! # Prelude for the moleculeone Crate
//!
//! This module re-exports the most commonly used types for convenience.
//!
//! ```rust,ignore
//! use moleculeone::prelude::*;
//! ```

pub use crate::batch::{
    BatchError, BatchJobStatus, BatchResult, BatchStatus, JobCounts, SubmissionRequest,
};
pub use crate::client::{Credential, Error as ClientError, MoleculeOne};
