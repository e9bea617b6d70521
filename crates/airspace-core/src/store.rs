//! Data access layer between the key-value client and datasets/readers.
//!
//! Stored layout for a dataset with key `K`:
//! ```text
//!   K     → {"d": <serialized data>, "m": <serialized metadata>}
//!   K:0   → [[row, row, ...], [row, ...], ...]   pages 0..n-1
//!   K:1   → [[row, ...], ...]                    pages n..2n-1
//!   ...
//! ```
//! Rows, data and metadata are already strings produced by the serializer;
//! the store only wraps them in JSON documents.

use crate::client::{Command, KvClient, Reply};
use crate::error::{Error, Result};
use crate::key::Key;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// One page as stored: its rows, each already serialized.
pub type RawPage = Vec<String>;

/// The single per-dataset record holding data and metadata, never pages.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RootRecord {
    #[serde(rename = "d", default)]
    pub data: Option<String>,
    #[serde(rename = "m", default)]
    pub metadata: Option<String>,
}

/// Stateless wrapper around a client handle; cheap to build per call and safe
/// to share.
#[derive(Clone, Copy)]
pub struct Store<'a> {
    client: &'a dyn KvClient,
}

impl<'a> Store<'a> {
    pub fn new(client: &'a dyn KvClient) -> Self {
        Self { client }
    }

    pub fn exists(&self, key: &Key) -> Result<bool> {
        Ok(self.client.exists(&key.root())?)
    }

    /// Writes the root record and every chunk in one batch, all with the same
    /// expiry. Chunk `i` lands under `key.chunk(i)`.
    pub fn persist(
        &self,
        key: &Key,
        root: &RootRecord,
        chunks: &[Vec<RawPage>],
        expiry: Option<Duration>,
    ) -> Result<()> {
        let mut commands = Vec::with_capacity(chunks.len() + 1);
        commands.push(Command::Set {
            key: key.root(),
            value: encode("root record", root)?,
            expiry,
        });
        for (index, chunk) in chunks.iter().enumerate() {
            commands.push(Command::Set {
                key: key.chunk(index),
                value: encode("chunk", chunk)?,
                expiry,
            });
        }

        self.client.execute(&commands)?;
        debug!(key = %key, chunks = chunks.len(), ?expiry, "store: persisted dataset");
        Ok(())
    }

    /// Root record, or `None` when the dataset does not exist.
    pub fn retrieve(&self, key: &Key) -> Result<Option<RootRecord>> {
        if !self.exists(key)? {
            return Ok(None);
        }
        // The key may expire between the two calls.
        let Some(raw) = self.client.get(&key.root())? else {
            return Ok(None);
        };

        let root = decode("root record", &raw)?;
        debug!(key = %key, "store: retrieved root record");
        Ok(Some(root))
    }

    /// Deletes the root and `chunk_count` chunk keys in one batch. Returns
    /// `false` without deleting anything when the root is missing.
    pub fn delete(&self, key: &Key, chunk_count: usize) -> Result<bool> {
        if !self.exists(key)? {
            return Ok(false);
        }

        let commands: Vec<Command> = std::iter::once(key.root())
            .chain(key.chunks(chunk_count))
            .map(Command::Del)
            .collect();
        self.client.execute(&commands)?;

        debug!(key = %key, chunk_count, "store: deleted dataset");
        Ok(true)
    }

    /// Pages of one chunk; empty when the chunk key is missing.
    pub fn chunk(&self, key: &Key, chunk_index: usize) -> Result<Vec<RawPage>> {
        match self.client.get(&key.chunk(chunk_index))? {
            Some(raw) => decode("chunk", &raw),
            None => Ok(Vec::new()),
        }
    }

    /// Pages of chunks `0..chunk_count` concatenated in chunk order, fetched in
    /// one batch. No call is made for zero chunks.
    ///
    /// A missing chunk contributes no pages; that only happens when a writer
    /// or expiry races the read.
    pub fn chunks(&self, key: &Key, chunk_count: usize) -> Result<Vec<RawPage>> {
        if chunk_count == 0 {
            return Ok(Vec::new());
        }

        let commands: Vec<Command> = key.chunks(chunk_count).into_iter().map(Command::Get).collect();
        let replies = self.client.execute(&commands)?;
        if replies.len() != chunk_count {
            return Err(Error::deserialize(
                "chunk batch",
                format!("expected {chunk_count} replies, got {}", replies.len()),
            ));
        }

        let mut pages = Vec::new();
        for (index, reply) in replies.into_iter().enumerate() {
            match reply {
                Reply::Value(Some(raw)) => pages.extend(decode::<Vec<RawPage>>("chunk", &raw)?),
                Reply::Value(None) => {
                    warn!(key = %key, chunk_index = index, "store: chunk missing during bulk read");
                }
                Reply::Done => {
                    return Err(Error::deserialize(
                        "chunk batch",
                        format!("reply {index} carries no value"),
                    ));
                }
            }
        }

        debug!(key = %key, chunk_count, pages = pages.len(), "store: fetched chunks");
        Ok(pages)
    }
}

fn encode<T: Serialize + ?Sized>(what: &'static str, value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| Error::serialize(what, e))
}

fn decode<T: serde::de::DeserializeOwned>(what: &'static str, raw: &[u8]) -> Result<T> {
    serde_json::from_slice(raw).map_err(|e| Error::deserialize(what, e))
}
