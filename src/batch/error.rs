use snafu::Snafu;

use crate::client::Error as ClientError;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("client invocation error"))]
    Client { source: Box<ClientError> },

    #[snafu(display("batch request was not submitted"))]
    NotSubmitted,

    #[snafu(display("key '{field}' not found in {payload} response"))]
    MissingField {
        /// Name of the absent key.
        field: &'static str,
        /// Which response was being decoded.
        payload: &'static str,
    },

    #[snafu(display("key '{field}' in {payload} response is not {expected}"))]
    UnexpectedType {
        field: &'static str,
        payload: &'static str,
        expected: &'static str,
    },
}

impl Error {
    /// True for errors raised locally because a handle or payload is not in the
    /// expected state, as opposed to transport failures.
    pub fn is_invalid_state(&self) -> bool {
        matches!(
            self,
            Error::NotSubmitted | Error::MissingField { .. } | Error::UnexpectedType { .. }
        )
    }

    /// The underlying transport error, if any.
    pub fn client_error(&self) -> Option<&ClientError> {
        match self {
            Error::Client { source } => Some(&**source),
            _ => None,
        }
    }
}
