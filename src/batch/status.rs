use serde_json::Value;
use snafu::ResultExt;
use std::{fmt, sync::Arc};
use tracing::{debug, instrument};

use crate::{
    batch::{
        error::{ClientSnafu, Error},
        SubmissionRequest,
    },
    client::{Credential, MoleculeOneClient},
    common::fields,
};

const PAYLOAD: &str = "batch listing";

/// Listing of every batch owned by an API key.
///
/// The listing is fetched on construction. [`refresh`](Self::refresh) replaces it
/// with a new snapshot.
#[derive(Debug, Clone)]
pub struct BatchStatus {
    client: Arc<MoleculeOneClient>,
    payload: Value,
}

impl BatchStatus {
    /// Fetches the listing for the API key of `request`.
    ///
    /// The request does not need to be submitted.
    pub async fn query(request: &SubmissionRequest) -> Result<Self, Error> {
        Self::fetch(request.client.clone()).await
    }

    pub(crate) async fn fetch(client: Arc<MoleculeOneClient>) -> Result<Self, Error> {
        let payload = Self::list(&client).await?;
        Ok(Self { client, payload })
    }

    /// Fetches the listing again, replacing the current snapshot.
    pub async fn refresh(&mut self) -> Result<(), Error> {
        self.payload = Self::list(&self.client).await?;
        Ok(())
    }

    #[instrument(skip_all)]
    async fn list(client: &MoleculeOneClient) -> Result<Value, Error> {
        let payload = client
            .list_batches()
            .await
            .map_err(Box::new)
            .context(ClientSnafu)?;
        debug!(total = ?payload.get("total"), "batch listing received");
        Ok(payload)
    }

    pub fn credential(&self) -> &Credential {
        self.client.credential()
    }

    /// The raw listing.
    pub fn get(&self) -> &Value {
        &self.payload
    }

    /// Ids of all batches in the listing, in the order the service returned them.
    pub fn job_ids(&self) -> Result<Vec<String>, Error> {
        fields::array_field(&self.payload, "data", PAYLOAD)?
            .iter()
            .map(|item| fields::id_field(item, "id", PAYLOAD))
            .collect()
    }

    /// Total number of batches reported by the service.
    pub fn num_jobs(&self) -> Result<u64, Error> {
        fields::count_field(&self.payload, "total", PAYLOAD)
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.num_jobs(), self.job_ids()) {
            (Ok(total), Ok(ids)) => write!(f, "Number of Jobs: {}\n{}", total, ids.join("\n")),
            _ => write!(f, "Number of Jobs: unknown"),
        }
    }
}
