use crate::serializer::{JsonSerializer, Serializer};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;

/// Per-call settings for writing and reading datasets.
///
/// Readers only look at `prefix` and `serializer`; the rest applies when a
/// dataset is written.
pub struct Options<D, R> {
    /// Namespace prepended to every key (default: none).
    pub prefix: String,

    /// Encoding for data and rows (default: JSON). Shared, not owned: one
    /// instance may serve any number of datasets.
    pub serializer: Arc<dyn Serializer<D, R>>,

    /// Store-side TTL for the root and every chunk (default: never expire).
    pub expires_in_seconds: Option<u64>,

    /// Chunk size (default: 5). Zero is rejected when the dataset is built.
    pub pages_per_chunk: Option<usize>,
}

impl<D, R> Default for Options<D, R>
where
    D: Serialize + DeserializeOwned,
    R: Serialize + DeserializeOwned,
{
    fn default() -> Self {
        Self::with_serializer(Arc::new(JsonSerializer))
    }
}

impl<D, R> Options<D, R> {
    /// Options with every default except the serializer, for types the JSON
    /// serializer cannot handle.
    pub fn with_serializer(serializer: Arc<dyn Serializer<D, R>>) -> Self {
        Self {
            prefix: String::new(),
            serializer,
            expires_in_seconds: None,
            pages_per_chunk: None,
        }
    }

    /// Set the key namespace
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Replace the serializer
    pub fn serializer(mut self, serializer: Arc<dyn Serializer<D, R>>) -> Self {
        self.serializer = serializer;
        self
    }

    /// Expire all keys after `seconds`
    pub fn expires_in_seconds(mut self, seconds: u64) -> Self {
        self.expires_in_seconds = Some(seconds);
        self
    }

    /// Set pages per chunk
    pub fn pages_per_chunk(mut self, pages_per_chunk: usize) -> Self {
        self.pages_per_chunk = Some(pages_per_chunk);
        self
    }
}

impl<D, R> Clone for Options<D, R> {
    fn clone(&self) -> Self {
        Self {
            prefix: self.prefix.clone(),
            serializer: Arc::clone(&self.serializer),
            expires_in_seconds: self.expires_in_seconds,
            pages_per_chunk: self.pages_per_chunk,
        }
    }
}

impl<D, R> fmt::Debug for Options<D, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("prefix", &self.prefix)
            .field("expires_in_seconds", &self.expires_in_seconds)
            .field("pages_per_chunk", &self.pages_per_chunk)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_default_options() {
        let options = Options::<Value, Value>::default();
        assert_eq!(options.prefix, "");
        assert_eq!(options.expires_in_seconds, None);
        assert_eq!(options.pages_per_chunk, None);
    }

    #[test]
    fn test_options_builder() {
        let options = Options::<Value, Value>::default()
            .prefix("airspace_test")
            .expires_in_seconds(300)
            .pages_per_chunk(2);

        assert_eq!(options.prefix, "airspace_test");
        assert_eq!(options.expires_in_seconds, Some(300));
        assert_eq!(options.pages_per_chunk, Some(2));

        let cloned = options.clone();
        assert!(Arc::ptr_eq(&cloned.serializer, &options.serializer));
        assert!(format!("{cloned:?}").contains("airspace_test"));
    }
}
