//! Write path: a dataset is built once, saved, then dropped.

use crate::chunker::Chunker;
use crate::client::KvClient;
use crate::error::{Error, Result};
use crate::key::Key;
use crate::metadata::Metadata;
use crate::options::Options;
use crate::serializer::Serializer;
use crate::store::{RawPage, RootRecord, Store};
use std::sync::Arc;
use uuid::Uuid;

/// A data record plus an ordered list of pages, ready to be persisted.
///
/// Immutable after construction. To update a stored dataset build a new one
/// under the same id and save it; that overwrites the root and chunk keys.
pub struct Dataset<'a, D, R> {
    client: &'a dyn KvClient,
    key: Key,
    data: D,
    pages: Vec<Vec<R>>,
    serializer: Arc<dyn Serializer<D, R>>,
    metadata: Metadata,
}

impl<'a, D, R> Dataset<'a, D, R> {
    /// A missing `id` becomes a random UUID.
    pub fn new(
        client: &'a dyn KvClient,
        id: Option<String>,
        data: D,
        pages: Vec<Vec<R>>,
        options: &Options<D, R>,
    ) -> Result<Self> {
        let metadata = Metadata::new(
            pages.len(),
            options.pages_per_chunk,
            options.expires_in_seconds,
        )?;
        let id = id.unwrap_or_else(|| Uuid::new_v4().to_string());

        Ok(Self {
            client,
            key: Key::new(id, options.prefix.as_str()),
            data,
            pages,
            serializer: Arc::clone(&options.serializer),
            metadata,
        })
    }

    pub fn builder(options: Options<D, R>) -> DatasetBuilder<'a, D, R> {
        DatasetBuilder {
            client: None,
            id: None,
            data: None,
            pages: Vec::new(),
            options,
        }
    }

    /// Writes the root record and all chunks in one batch and returns the id.
    pub fn save(&self) -> Result<&str> {
        let root = self.root_record()?;
        let chunks = self.chunk_payloads()?;
        Store::new(self.client).persist(&self.key, &root, &chunks, self.metadata.expires_in())?;
        Ok(self.key.id())
    }

    pub fn id(&self) -> &str {
        self.key.id()
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn data(&self) -> &D {
        &self.data
    }

    pub fn pages(&self) -> &[Vec<R>] {
        &self.pages
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn page_count(&self) -> usize {
        self.metadata.page_count()
    }

    pub fn pages_per_chunk(&self) -> usize {
        self.metadata.pages_per_chunk()
    }

    pub fn chunk_count(&self) -> usize {
        self.metadata.chunk_count()
    }

    pub fn expires_in_seconds(&self) -> Option<u64> {
        self.metadata.expires_in_seconds()
    }

    pub fn chunker(&self) -> Chunker {
        self.metadata.chunker()
    }

    fn root_record(&self) -> Result<RootRecord> {
        Ok(RootRecord {
            data: Some(self.serializer.serialize_data(&self.data)?),
            metadata: Some(
                self.serializer
                    .serialize_metadata(&self.metadata.to_fields()?)?,
            ),
        })
    }

    /// Serialized pages grouped per chunk. The chunker's nominal end is
    /// clamped to the pages actually present.
    fn chunk_payloads(&self) -> Result<Vec<Vec<RawPage>>> {
        self.chunker()
            .chunks(self.page_count())
            .map(|chunk| {
                let end = (chunk.page_index_end + 1).min(self.pages.len());
                self.pages[chunk.page_index_start..end]
                    .iter()
                    .map(|page| {
                        page.iter()
                            .map(|row| self.serializer.serialize_row(row))
                            .collect::<Result<RawPage>>()
                    })
                    .collect()
            })
            .collect()
    }
}

/// Step-by-step construction of a [`Dataset`]; fails in `build` when no
/// client was supplied.
pub struct DatasetBuilder<'a, D, R> {
    client: Option<&'a dyn KvClient>,
    id: Option<String>,
    data: Option<D>,
    pages: Vec<Vec<R>>,
    options: Options<D, R>,
}

impl<'a, D, R> DatasetBuilder<'a, D, R> {
    pub fn client(mut self, client: &'a dyn KvClient) -> Self {
        self.client = Some(client);
        self
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn data(mut self, data: D) -> Self {
        self.data = Some(data);
        self
    }

    pub fn pages(mut self, pages: Vec<Vec<R>>) -> Self {
        self.pages = pages;
        self
    }

    /// Missing data takes `D::default()`, missing pages an empty list.
    pub fn build(self) -> Result<Dataset<'a, D, R>>
    where
        D: Default,
    {
        let client = self
            .client
            .ok_or_else(|| Error::invalid("client is required"))?;
        Dataset::new(
            client,
            self.id,
            self.data.unwrap_or_default(),
            self.pages,
            &self.options,
        )
    }
}
