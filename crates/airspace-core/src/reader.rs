//! Read path: lazy, page-addressable view over a stored dataset.

use crate::chunker::Chunker;
use crate::client::KvClient;
use crate::error::{Error, Result};
use crate::key::Key;
use crate::metadata::Metadata;
use crate::options::Options;
use crate::serializer::Serializer;
use crate::store::{RawPage, Store};
use std::sync::Arc;
use tracing::debug;

/// Handle to a dataset found in the store.
///
/// Holds the deserialized data and metadata only. Pages stay in the store
/// until asked for: [`Reader::page`] fetches the single chunk that holds the
/// page, [`Reader::pages`] fetches every chunk in one batch.
pub struct Reader<'a, D, R> {
    client: &'a dyn KvClient,
    key: Key,
    data: Option<D>,
    metadata: Metadata,
    serializer: Arc<dyn Serializer<D, R>>,
}

impl<'a, D, R> Reader<'a, D, R> {
    /// Loads the root record for `id` under `options.prefix`. `None` when no
    /// such dataset exists.
    pub fn find_by_id(
        client: &'a dyn KvClient,
        id: &str,
        options: &Options<D, R>,
    ) -> Result<Option<Self>> {
        let key = Key::new(id, options.prefix.as_str());
        let Some(root) = Store::new(client).retrieve(&key)? else {
            debug!(key = %key, "reader: dataset not found");
            return Ok(None);
        };

        let serializer = Arc::clone(&options.serializer);
        let data = serializer.deserialize_data(root.data.as_deref())?;
        let fields = serializer
            .deserialize_metadata(root.metadata.as_deref())?
            .ok_or_else(|| Error::deserialize("root record", "metadata missing"))?;
        let metadata = Metadata::from_fields(&fields)?;

        Ok(Some(Self {
            client,
            key,
            data,
            metadata,
            serializer,
        }))
    }

    /// Rows of page `number`, counted from 1. Page 0 and pages past the end
    /// are empty; page 0 never reaches the store.
    pub fn page(&self, number: usize) -> Result<Vec<R>> {
        let Some(index) = number.checked_sub(1) else {
            return Ok(Vec::new());
        };

        let location = self.chunker().locate(index);
        let mut chunk = Store::new(self.client).chunk(&self.key, location.chunk_index)?;
        if location.offset >= chunk.len() {
            return Ok(Vec::new());
        }
        self.deserialize_page(chunk.swap_remove(location.offset))
    }

    /// Every page in order.
    pub fn pages(&self) -> Result<Vec<Vec<R>>> {
        Store::new(self.client)
            .chunks(&self.key, self.chunk_count())?
            .into_iter()
            .map(|page| self.deserialize_page(page))
            .collect()
    }

    /// Removes the root and all chunk keys. `false` when the root was
    /// already gone.
    pub fn delete(&self) -> Result<bool> {
        Store::new(self.client).delete(&self.key, self.chunk_count())
    }

    pub fn id(&self) -> &str {
        self.key.id()
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    /// `None` when the stored data was absent.
    pub fn data(&self) -> Option<&D> {
        self.data.as_ref()
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

    fn deserialize_page(&self, page: RawPage) -> Result<Vec<R>> {
        page.iter()
            .map(|row| self.serializer.deserialize_row(row))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MemoryClient;
    use crate::dataset::Dataset;
    use serde_json::{Value, json};

    fn save(client: &MemoryClient, id: &str, pages: usize, options: &Options<Value, Value>) {
        let pages = (1..=pages).map(|i| vec![json!(i), json!(-(i as i64))]).collect();
        Dataset::new(client, Some(id.into()), json!({"title": id}), pages, options)
            .unwrap()
            .save()
            .unwrap();
    }

    #[test]
    fn test_find_missing() {
        let client = MemoryClient::new();
        let found = Reader::find_by_id(&client, "nope", &Options::<Value, Value>::default());
        assert!(found.unwrap().is_none());
    }

    #[test]
    fn test_find_and_read() {
        let client = MemoryClient::new();
        let options = Options::default().pages_per_chunk(3);
        save(&client, "ds", 7, &options);

        let reader = Reader::find_by_id(&client, "ds", &options).unwrap().unwrap();
        assert_eq!(reader.id(), "ds");
        assert_eq!(reader.data(), Some(&json!({"title": "ds"})));
        assert_eq!(reader.page_count(), 7);
        assert_eq!(reader.pages_per_chunk(), 3);
        assert_eq!(reader.chunk_count(), 3);
        assert_eq!(reader.expires_in_seconds(), None);

        assert_eq!(reader.page(1).unwrap(), vec![json!(1), json!(-1)]);
        assert_eq!(reader.page(4).unwrap(), vec![json!(4), json!(-4)]);
        assert_eq!(reader.page(7).unwrap(), vec![json!(7), json!(-7)]);

        let all = reader.pages().unwrap();
        assert_eq!(all.len(), 7);
        assert_eq!(all[5], vec![json!(6), json!(-6)]);
    }

    #[test]
    fn test_page_out_of_range() {
        let client = MemoryClient::new();
        let options = Options::default().pages_per_chunk(3);
        save(&client, "ds", 4, &options);
        let reader = Reader::find_by_id(&client, "ds", &options).unwrap().unwrap();

        let before = client.round_trips();
        assert!(reader.page(0).unwrap().is_empty());
        assert_eq!(client.round_trips(), before);

        // Past the end inside the last chunk, then in a chunk never written.
        assert!(reader.page(5).unwrap().is_empty());
        assert!(reader.page(100).unwrap().is_empty());
    }

    #[test]
    fn test_page_and_pages_cost_one_round_trip() {
        let client = MemoryClient::new();
        let options = Options::default().pages_per_chunk(2);
        save(&client, "ds", 9, &options);
        let reader = Reader::find_by_id(&client, "ds", &options).unwrap().unwrap();

        let before = client.round_trips();
        reader.page(8).unwrap();
        assert_eq!(client.round_trips(), before + 1);
        reader.pages().unwrap();
        assert_eq!(client.round_trips(), before + 2);
    }

    #[test]
    fn test_prefix_isolates_datasets() {
        let client = MemoryClient::new();
        let a = Options::default().prefix("a");
        let b = Options::<Value, Value>::default().prefix("b");
        save(&client, "ds", 1, &a);

        assert!(Reader::find_by_id(&client, "ds", &a).unwrap().is_some());
        assert!(Reader::find_by_id(&client, "ds", &b).unwrap().is_none());
    }

    #[test]
    fn test_delete_removes_every_key() {
        let client = MemoryClient::new();
        let options = Options::default().prefix("p").pages_per_chunk(2);
        save(&client, "ds", 5, &options);
        save(&client, "other", 1, &options);
        let reader = Reader::find_by_id(&client, "ds", &options).unwrap().unwrap();

        assert!(reader.delete().unwrap());
        assert_eq!(client.keys(), vec!["p:other", "p:other:0"]);
        assert!(!reader.delete().unwrap());
    }

    #[test]
    fn test_missing_metadata_is_an_error() {
        let client = MemoryClient::new();
        client.set("broken", br#"{"d":"{}"}"#, None).unwrap();
        let result = Reader::find_by_id(&client, "broken", &Options::<Value, Value>::default());
        assert!(matches!(result, Err(Error::Deserialize { .. })));
    }

    #[test]
    fn test_absent_data() {
        let client = MemoryClient::new();
        client
            .set(
                "nodata",
                br#"{"m":"{\"expires_in_seconds\":null,\"page_count\":0,\"pages_per_chunk\":5}"}"#,
                None,
            )
            .unwrap();
        let reader = Reader::find_by_id(&client, "nodata", &Options::<Value, Value>::default())
            .unwrap()
            .unwrap();
        assert_eq!(reader.data(), None);
        assert!(reader.pages().unwrap().is_empty());
    }
}
