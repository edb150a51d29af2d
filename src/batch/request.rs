use serde_json::{json, Map, Value};
use snafu::{ensure, ResultExt};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::{
    batch::error::{ClientSnafu, Error, NotSubmittedSnafu},
    client::{Credential, Error as ClientError, MoleculeOneClient},
    common::fields,
};

/// A batch scoring request for a list of SMILES strings.
///
/// Created unsubmitted by [`MoleculeOne::submission`](crate::MoleculeOne::submission),
/// or already submitted by [`MoleculeOne::resume`](crate::MoleculeOne::resume) when
/// only the batch id of an earlier submission is known.
#[derive(Debug, Clone)]
pub struct SubmissionRequest {
    pub(crate) client: Arc<MoleculeOneClient>,
    smiles: Vec<String>,
    submitted: bool,
    response: Value,
}

impl SubmissionRequest {
    pub(crate) fn new(client: Arc<MoleculeOneClient>, smiles: Vec<String>) -> Self {
        Self {
            client,
            smiles,
            submitted: false,
            response: Value::Object(Map::new()),
        }
    }

    pub(crate) fn from_id(client: Arc<MoleculeOneClient>, id: String) -> Self {
        Self {
            client,
            smiles: Vec::new(),
            submitted: true,
            response: json!({ "id": id }),
        }
    }

    /// Appends SMILES strings to the pending list.
    ///
    /// Strings added after a successful submission are only sent if the request is
    /// submitted again.
    pub fn add<I, S>(&mut self, smiles: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.smiles.extend(smiles.into_iter().map(Into::into));
    }

    /// The pending SMILES strings, in submission order.
    pub fn smiles(&self) -> &[String] {
        &self.smiles
    }

    pub fn credential(&self) -> &Credential {
        self.client.credential()
    }

    /// The decoded answer to the last successful submission.
    pub fn response(&self) -> &Value {
        &self.response
    }

    pub fn was_submitted(&self) -> bool {
        self.submitted
    }

    /// Returns the batch id assigned by the service.
    ///
    /// # Errors
    ///
    /// [`Error::NotSubmitted`] before a successful submission, and
    /// [`Error::MissingField`] if the service answered without an `id`.
    pub fn id(&self) -> Result<String, Error> {
        ensure!(self.submitted, NotSubmittedSnafu);
        fields::id_field(&self.response, "id", "submission")
    }

    /// Submits the pending SMILES strings as one batch.
    ///
    /// Unauthorized, forbidden and server errors are logged and swallowed: the call
    /// returns `Ok(())` and [`was_submitted`](Self::was_submitted) stays `false`.
    /// Every other failure is returned.
    #[instrument(skip_all, fields(targets = self.smiles.len()))]
    pub async fn submit(&mut self) -> Result<(), Error> {
        match self.submit_strict().await {
            Err(Error::Client { source }) => match submit_diagnostic(&source) {
                Some(diagnostic) => {
                    warn!(status = ?source.status(), "{}", diagnostic);
                    Ok(())
                }
                None => Err(Error::Client { source }),
            },
            other => other,
        }
    }

    /// Submits the pending SMILES strings and returns every failure as an error.
    #[instrument(skip_all, fields(targets = self.smiles.len()))]
    pub async fn submit_strict(&mut self) -> Result<(), Error> {
        let response = self
            .client
            .submit_batch(&self.smiles)
            .await
            .map_err(Box::new)
            .context(ClientSnafu)?;

        debug!(response = %response, "batch submitted");
        self.response = response;
        self.submitted = true;
        Ok(())
    }
}

fn submit_diagnostic(error: &ClientError) -> Option<&'static str> {
    match error {
        ClientError::Unauthorized { .. } => Some("could not authorize API key with molecule.one"),
        ClientError::Forbidden { .. } => Some("access to molecule.one resource forbidden"),
        ClientError::ServerError { .. } => Some("molecule.one server encountered an error"),
        _ => None,
    }
}
