//! Explicit field extraction from decoded API payloads.
//!
//! The service does not publish a schema, so payloads are kept as
//! [`serde_json::Value`] and every field an operation relies on is pulled out
//! here, turning an absent key into [`Error::MissingField`].

use serde_json::Value;
use snafu::OptionExt;

use crate::batch::error::{Error, MissingFieldSnafu, UnexpectedTypeSnafu};

/// Looks up a required key of a JSON object.
pub(crate) fn field<'a>(
    value: &'a Value,
    field: &'static str,
    payload: &'static str,
) -> Result<&'a Value, Error> {
    value.get(field).context(MissingFieldSnafu { field, payload })
}

/// Reads an identifier. Numeric ids are rendered as strings.
pub(crate) fn id_field(
    value: &Value,
    field_name: &'static str,
    payload: &'static str,
) -> Result<String, Error> {
    match field(value, field_name, payload)? {
        Value::String(id) => Ok(id.clone()),
        Value::Number(id) => Ok(id.to_string()),
        _ => UnexpectedTypeSnafu {
            field: field_name,
            payload,
            expected: "a string or number",
        }
        .fail(),
    }
}

/// Reads a non-negative integer count.
pub(crate) fn count_field(
    value: &Value,
    field_name: &'static str,
    payload: &'static str,
) -> Result<u64, Error> {
    field(value, field_name, payload)?
        .as_u64()
        .context(UnexpectedTypeSnafu {
            field: field_name,
            payload,
            expected: "a non-negative integer",
        })
}

/// Reads a JSON array.
pub(crate) fn array_field<'a>(
    value: &'a Value,
    field_name: &'static str,
    payload: &'static str,
) -> Result<&'a [Value], Error> {
    field(value, field_name, payload)?
        .as_array()
        .map(Vec::as_slice)
        .context(UnexpectedTypeSnafu {
            field: field_name,
            payload,
            expected: "an array",
        })
}
