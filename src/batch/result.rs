use serde_json::{map, Value};
use snafu::ResultExt;
use std::{iter::FusedIterator, option, slice, sync::Arc};
use tracing::{debug, instrument};

use crate::{
    batch::{
        error::{ClientSnafu, Error},
        SubmissionRequest,
    },
    client::{Credential, MoleculeOneClient},
};

/// Scores of a finished batch.
///
/// The payload is fetched once on construction and never changes. Build a new
/// `BatchResult` to fetch it again.
#[derive(Debug, Clone)]
pub struct BatchResult {
    client: Arc<MoleculeOneClient>,
    id: String,
    payload: Value,
}

impl BatchResult {
    /// Fetches the results of the batch submitted by `request`.
    ///
    /// # Errors
    ///
    /// [`Error::NotSubmitted`] if `request` was never submitted.
    #[instrument(skip_all)]
    pub async fn query(request: &SubmissionRequest) -> Result<Self, Error> {
        let id = request.id()?;
        let payload = request
            .client
            .get_batch_result(&id)
            .await
            .map_err(Box::new)
            .context(ClientSnafu)?;

        let result = Self {
            client: request.client.clone(),
            id,
            payload,
        };
        debug!(batch.id = %result.id, items = result.len(), "batch result received");
        Ok(result)
    }

    /// Batch id.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn credential(&self) -> &Credential {
        self.client.credential()
    }

    /// The raw result payload.
    pub fn get(&self) -> &Value {
        &self.payload
    }

    pub fn into_inner(self) -> Value {
        self.payload
    }

    /// Iterates over the top-level items of the payload.
    ///
    /// Every call starts again from the first item.
    pub fn iter(&self) -> ResultItems<'_> {
        let inner = match &self.payload {
            Value::Array(items) => Items::Array(items.iter()),
            Value::Object(items) => Items::Object(items.values()),
            Value::Null => Items::Single(None.into_iter()),
            other => Items::Single(Some(other).into_iter()),
        };
        ResultItems { inner }
    }

    pub fn len(&self) -> usize {
        self.iter().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<'a> IntoIterator for &'a BatchResult {
    type Item = &'a Value;
    type IntoIter = ResultItems<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the items of a [`BatchResult`].
pub struct ResultItems<'a> {
    inner: Items<'a>,
}

enum Items<'a> {
    Array(slice::Iter<'a, Value>),
    Object(map::Values<'a>),
    Single(option::IntoIter<&'a Value>),
}

impl<'a> Iterator for ResultItems<'a> {
    type Item = &'a Value;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.inner {
            Items::Array(items) => items.next(),
            Items::Object(items) => items.next(),
            Items::Single(item) => item.next(),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match &self.inner {
            Items::Array(items) => items.size_hint(),
            Items::Object(items) => items.size_hint(),
            Items::Single(item) => item.size_hint(),
        }
    }
}

impl ExactSizeIterator for ResultItems<'_> {}

impl FusedIterator for ResultItems<'_> {}
