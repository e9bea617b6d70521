use std::fmt;

const SEPARATOR: char = ':';

/// Store key names for one dataset.
///
/// The root key is `prefix:id` (or just `id` without a prefix) and chunk
/// `n` lives under `root:n`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Key {
    id: String,
    prefix: String,
}

impl Key {
    pub fn new(id: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            prefix: prefix.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn root(&self) -> String {
        if self.prefix.is_empty() {
            return self.id.clone();
        }
        format!("{}{SEPARATOR}{}", self.prefix, self.id)
    }

    pub fn chunk(&self, index: usize) -> String {
        format!("{}{SEPARATOR}{index}", self.root())
    }

    /// Chunk keys `0..count` in index order.
    pub fn chunks(&self, count: usize) -> Vec<String> {
        (0..count).map(|i| self.chunk(i)).collect()
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.root())
    }
}
