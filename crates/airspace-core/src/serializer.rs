//! Pluggable encoding of the dataset record, rows and metadata.
//!
//! The store never looks inside these strings; they are opaque payloads.
//! Any implementation works as long as `deserialize(serialize(x)) == x`
//! under its own notion of equality.

use crate::error::{Error, Result};
use crate::metadata::MetadataFields;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Converts a dataset's data record `D` and rows `R` to and from their
/// stored string form.
///
/// Metadata encoding defaults to JSON; implementations usually only
/// reshape data and rows.
pub trait Serializer<D, R>: Send + Sync {
    fn serialize_data(&self, data: &D) -> Result<String>;

    /// `None` in, `None` out: a root record may lack a data field.
    fn deserialize_data(&self, raw: Option<&str>) -> Result<Option<D>>;

    fn serialize_row(&self, row: &R) -> Result<String>;

    fn deserialize_row(&self, raw: &str) -> Result<R>;

    fn serialize_metadata(&self, fields: &MetadataFields) -> Result<String> {
        json_serialize("metadata", fields)
    }

    fn deserialize_metadata(&self, raw: Option<&str>) -> Result<Option<MetadataFields>> {
        raw.map(|s| json_deserialize("metadata", s)).transpose()
    }
}

/// JSON for everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSerializer;

impl<D, R> Serializer<D, R> for JsonSerializer
where
    D: Serialize + DeserializeOwned,
    R: Serialize + DeserializeOwned,
{
    fn serialize_data(&self, data: &D) -> Result<String> {
        json_serialize("data", data)
    }

    fn deserialize_data(&self, raw: Option<&str>) -> Result<Option<D>> {
        raw.map(|s| json_deserialize("data", s)).transpose()
    }

    fn serialize_row(&self, row: &R) -> Result<String> {
        json_serialize("row", row)
    }

    fn deserialize_row(&self, raw: &str) -> Result<R> {
        json_deserialize("row", raw)
    }
}

/// JSON helper for serializer implementations.
pub fn json_serialize<T: Serialize + ?Sized>(what: &'static str, value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| Error::serialize(what, e))
}

/// JSON helper for serializer implementations.
pub fn json_deserialize<T: DeserializeOwned>(what: &'static str, raw: &str) -> Result<T> {
    serde_json::from_str(raw).map_err(|e| Error::deserialize(what, e))
}
