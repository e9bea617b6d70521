//! airspace-core - chunked, paged dataset storage over a key-value store.
//!
//! A dataset is one small data record plus an ordered list of pages (each
//! page a list of rows). Pages are grouped into fixed-size chunks, one store
//! key per chunk, so that:
//! - a single page costs one round trip (`Reader::page`)
//! - all pages cost one pipelined round trip (`Reader::pages`)
//!
//! Provides:
//! - `key` - root and chunk key names
//! - `chunker` - page index ↔ (chunk, offset) arithmetic
//! - `metadata` - page count, chunk size and expiry of a dataset
//! - `serializer` - pluggable encoding of data and rows
//! - `client` - key-value client capability, in-memory and directory clients
//! - `store` - persist, retrieve, delete and chunk fetches
//! - `dataset` / `reader` - write and read paths
//!
//! The crate root offers the short form:
//!
//! ```no_run
//! use airspace_core::{MemoryClient, Options};
//! use serde_json::json;
//!
//! # fn main() -> airspace_core::Result<()> {
//! let client = MemoryClient::new();
//! let options = Options::default().prefix("reports");
//! let id = airspace_core::set(&client, None, json!({"title": "q3"}), vec![vec![json!(1)]], &options)?;
//! if let Some(reader) = airspace_core::get(&client, &id, &options)? {
//!     let first = reader.page(1)?;
//!     assert_eq!(first, vec![json!(1)]);
//! }
//! airspace_core::del(&client, &id, &options)?;
//! # Ok(())
//! # }
//! ```

pub mod chunker;
pub mod client;
pub mod dataset;
pub mod error;
pub mod key;
pub mod metadata;
pub mod options;
pub mod reader;
pub mod serializer;
pub mod store;

pub use client::{ClientError, DirClient, KvClient, MemoryClient};
pub use dataset::{Dataset, DatasetBuilder};
pub use error::{Error, Result};
pub use options::Options;
pub use reader::Reader;
pub use serializer::{JsonSerializer, Serializer};

/// Saves `data` and `pages` under `id` (a random UUID when `None`) and
/// returns the id. An existing dataset with the same id is overwritten.
pub fn set<D, R>(
    client: &dyn KvClient,
    id: Option<&str>,
    data: D,
    pages: Vec<Vec<R>>,
    options: &Options<D, R>,
) -> Result<String> {
    let dataset = Dataset::new(client, id.map(str::to_string), data, pages, options)?;
    dataset.save().map(str::to_string)
}

/// Looks up a dataset. Only `prefix` and `serializer` of `options` apply.
pub fn get<'a, D, R>(
    client: &'a dyn KvClient,
    id: &str,
    options: &Options<D, R>,
) -> Result<Option<Reader<'a, D, R>>> {
    Reader::find_by_id(client, id, options)
}

/// Deletes a dataset. `false` when there was nothing to delete.
pub fn del<D, R>(client: &dyn KvClient, id: &str, options: &Options<D, R>) -> Result<bool> {
    match Reader::find_by_id(client, id, options)? {
        Some(reader) => reader.delete(),
        None => Ok(false),
    }
}
