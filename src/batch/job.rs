use serde_json::Value;
use snafu::{ensure, ResultExt};
use std::{fmt, sync::Arc};
use tracing::{debug, instrument};

use crate::{
    batch::{
        error::{ClientSnafu, Error, NotSubmittedSnafu},
        SubmissionRequest,
    },
    client::{Credential, MoleculeOneClient},
    common::fields,
};

const PAYLOAD: &str = "job status";

/// Job counts of one batch at the time it was queried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobCounts {
    pub finished: u64,
    pub running: u64,
    pub queued: u64,
    pub error: u64,
}

impl JobCounts {
    pub(crate) fn from_payload(payload: &Value) -> Result<Self, Error> {
        Ok(Self {
            finished: fields::count_field(payload, "finished", PAYLOAD)?,
            running: fields::count_field(payload, "running", PAYLOAD)?,
            queued: fields::count_field(payload, "queued", PAYLOAD)?,
            error: fields::count_field(payload, "error", PAYLOAD)?,
        })
    }

    /// No job is running or queued anymore.
    ///
    /// A batch whose jobs all failed is finished as well.
    pub fn is_finished(&self) -> bool {
        self.running == 0 && self.queued == 0
    }

    pub fn has_errors(&self) -> bool {
        self.error > 0
    }

    /// Sum of all counts, saturating at `u64::MAX`.
    pub fn total(&self) -> u64 {
        self.finished
            .saturating_add(self.running)
            .saturating_add(self.queued)
            .saturating_add(self.error)
    }
}

/// Whether a [`BatchJobStatus`] holds a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// No snapshot, either never fetched or the last refresh failed.
    Unqueried,
    Queried(JobCounts),
}

/// Status of the jobs of one submitted batch.
///
/// The counts are fetched on construction and cached. Call [`refresh`](Self::refresh)
/// to fetch them again. The async accessors fetch once if the view holds no
/// snapshot, which happens only after a failed refresh.
#[derive(Debug, Clone)]
pub struct BatchJobStatus {
    client: Arc<MoleculeOneClient>,
    id: String,
    state: JobState,
}

impl BatchJobStatus {
    /// Fetches the job counts of the batch submitted by `request`.
    ///
    /// # Errors
    ///
    /// [`Error::NotSubmitted`] if `request` was never submitted.
    pub async fn query(request: &SubmissionRequest) -> Result<Self, Error> {
        ensure!(request.was_submitted(), NotSubmittedSnafu);

        let mut status = Self {
            client: request.client.clone(),
            id: request.id()?,
            state: JobState::Unqueried,
        };
        status.refresh().await?;
        Ok(status)
    }

    /// Batch id.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn credential(&self) -> &Credential {
        self.client.credential()
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn is_queried(&self) -> bool {
        matches!(self.state, JobState::Queried(_))
    }

    /// The cached counts, without touching the network.
    pub fn counts(&self) -> Option<JobCounts> {
        match self.state {
            JobState::Queried(counts) => Some(counts),
            JobState::Unqueried => None,
        }
    }

    /// Fetches the job counts again.
    ///
    /// The view is unqueried while the request is in flight and stays so if it fails.
    #[instrument(skip_all, fields(batch.id = %self.id))]
    pub async fn refresh(&mut self) -> Result<JobCounts, Error> {
        self.state = JobState::Unqueried;

        let payload = self
            .client
            .get_batch_status(&self.id)
            .await
            .map_err(Box::new)
            .context(ClientSnafu)?;
        let counts = JobCounts::from_payload(&payload)?;

        debug!(
            finished = counts.finished,
            running = counts.running,
            queued = counts.queued,
            error = counts.error,
            "job status received"
        );
        self.state = JobState::Queried(counts);
        Ok(counts)
    }

    /// The cached counts, fetching them first if the view is unqueried.
    pub async fn snapshot(&mut self) -> Result<JobCounts, Error> {
        match self.state {
            JobState::Queried(counts) => Ok(counts),
            JobState::Unqueried => self.refresh().await,
        }
    }

    pub async fn num_finished(&mut self) -> Result<u64, Error> {
        Ok(self.snapshot().await?.finished)
    }

    pub async fn num_running(&mut self) -> Result<u64, Error> {
        Ok(self.snapshot().await?.running)
    }

    pub async fn num_queued(&mut self) -> Result<u64, Error> {
        Ok(self.snapshot().await?.queued)
    }

    pub async fn num_errors(&mut self) -> Result<u64, Error> {
        Ok(self.snapshot().await?.error)
    }

    /// See [`JobCounts::is_finished`].
    pub async fn is_finished(&mut self) -> Result<bool, Error> {
        Ok(self.snapshot().await?.is_finished())
    }

    pub async fn has_errors(&mut self) -> Result<bool, Error> {
        Ok(self.snapshot().await?.has_errors())
    }
}

impl fmt::Display for BatchJobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "id       : {}", self.id)?;
        match self.state {
            JobState::Queried(counts) => {
                writeln!(f, "finished : {}", counts.finished)?;
                writeln!(f, "running  : {}", counts.running)?;
                writeln!(f, "queued   : {}", counts.queued)?;
                writeln!(f, "error    : {}", counts.error)
            }
            JobState::Unqueried => {
                writeln!(f, "finished : -")?;
                writeln!(f, "running  : -")?;
                writeln!(f, "queued   : -")?;
                writeln!(f, "error    : -")
            }
        }
    }
}
