use crate::chunker::Chunker;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_PAGES_PER_CHUNK: usize = 5;

/// Longest accepted expiry: 100 years.
pub const MAX_EXPIRES_IN_SECONDS: u64 = 100 * 365 * 24 * 60 * 60;

/// Flat wire form of [`Metadata`], embedded in the root record.
///
/// `pages_per_chunk` is signed so that a corrupt or foreign writer's
/// non-positive value is caught by validation rather than by the parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataFields {
    pub expires_in_seconds: Option<u64>,
    #[serde(default)]
    pub page_count: usize,
    #[serde(default)]
    pub pages_per_chunk: Option<i64>,
}

/// Data about a dataset: how many pages it has, how they are chunked and
/// how long the keys live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metadata {
    page_count: usize,
    chunker: Chunker,
    expires_in_seconds: Option<u64>,
}

impl Metadata {
    /// An absent `pages_per_chunk` takes [`DEFAULT_PAGES_PER_CHUNK`]; an
    /// explicit zero is rejected. Expiry must lie in
    /// `1..=MAX_EXPIRES_IN_SECONDS`.
    pub fn new(
        page_count: usize,
        pages_per_chunk: Option<usize>,
        expires_in_seconds: Option<u64>,
    ) -> Result<Self> {
        if let Some(secs) = expires_in_seconds
            && !(1..=MAX_EXPIRES_IN_SECONDS).contains(&secs)
        {
            return Err(Error::invalid(format!(
                "expires_in_seconds must be in 1..={MAX_EXPIRES_IN_SECONDS}, got {secs}"
            )));
        }
        if let Some(n) = pages_per_chunk
            && i64::try_from(n).is_err()
        {
            return Err(Error::invalid(format!("pages_per_chunk too large: {n}")));
        }
        let chunker = Chunker::new(pages_per_chunk.unwrap_or(DEFAULT_PAGES_PER_CHUNK))?;

        Ok(Self {
            page_count,
            chunker,
            expires_in_seconds,
        })
    }

    pub fn from_fields(fields: &MetadataFields) -> Result<Self> {
        let pages_per_chunk = match fields.pages_per_chunk {
            Some(n) => Some(usize::try_from(n).map_err(|_| {
                Error::invalid(format!("pages_per_chunk must be positive, got {n}"))
            })?),
            None => None,
        };
        Self::new(fields.page_count, pages_per_chunk, fields.expires_in_seconds)
    }

    pub fn to_fields(&self) -> Result<MetadataFields> {
        let pages_per_chunk = i64::try_from(self.pages_per_chunk()).map_err(|_| {
            Error::invalid(format!("pages_per_chunk too large: {}", self.pages_per_chunk()))
        })?;
        Ok(MetadataFields {
            expires_in_seconds: self.expires_in_seconds,
            page_count: self.page_count,
            pages_per_chunk: Some(pages_per_chunk),
        })
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn pages_per_chunk(&self) -> usize {
        self.chunker.pages_per_chunk()
    }

    pub fn expires_in_seconds(&self) -> Option<u64> {
        self.expires_in_seconds
    }

    pub fn expires_in(&self) -> Option<Duration> {
        self.expires_in_seconds.map(Duration::from_secs)
    }

    pub fn chunker(&self) -> Chunker {
        self.chunker
    }

    pub fn chunk_count(&self) -> usize {
        self.chunker.count(self.page_count)
    }
}
