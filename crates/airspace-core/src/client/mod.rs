//! Key-value client capability.
//!
//! The library talks to its backing store only through [`KvClient`]. Two
//! implementations ship with the crate:
//!
//! ```text
//!                 ┌──────────────┐
//!                 │    Store     │
//!                 └──────┬───────┘
//!                        │
//!                 ┌──────▼───────┐
//!                 │   KvClient   │ (trait)
//!                 └──────┬───────┘
//!              ┌─────────┴─────────┐
//!       ┌──────▼──────┐     ┌──────▼──────┐
//!       │ MemoryClient│     │  DirClient  │
//!       │ (in-process)│     │ (one file   │
//!       │             │     │  per key)   │
//!       └─────────────┘     └─────────────┘
//! ```
//!
//! Remote stores plug in by implementing the trait; `execute` should map to
//! the store's native pipelining so a batch costs one network exchange.

pub mod dir;
pub mod memory;

pub use dir::{DirClient, EntryInfo};
pub use memory::MemoryClient;

use std::io;
use std::time::Duration;
use thiserror::Error;

pub type ClientResult<T> = std::result::Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// The store could not be reached or refused the request.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The expiry cannot be represented as a deadline by this client.
    #[error("expiry out of range: {0:?}")]
    ExpiryOutOfRange(Duration),

    /// Stored bytes failed an integrity check.
    #[error("corrupted value for key {key}: {reason}")]
    Corrupted { key: String, reason: String },
}

/// One operation inside a pipelined batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Get(String),
    Set {
        key: String,
        value: Vec<u8>,
        expiry: Option<Duration>,
    },
    Del(String),
}

impl Command {
    pub fn key(&self) -> &str {
        match self {
            Command::Get(key) | Command::Del(key) => key,
            Command::Set { key, .. } => key,
        }
    }
}

/// Result of one [`Command`]: `Value` for gets, `Done` for sets and deletes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Value(Option<Vec<u8>>),
    Done,
}

/// Abstraction over a key-value store with expiry and pipelining.
///
/// Implementations must be safe to share across threads; the library keeps no
/// state of its own around a client.
pub trait KvClient: Send + Sync {
    fn exists(&self, key: &str) -> ClientResult<bool>;

    fn get(&self, key: &str) -> ClientResult<Option<Vec<u8>>>;

    /// Writes `value`, replacing any previous value and its expiry.
    fn set(&self, key: &str, value: &[u8], expiry: Option<Duration>) -> ClientResult<()>;

    /// Deleting a missing key is not an error.
    fn del(&self, key: &str) -> ClientResult<()>;

    /// Runs a batch in one round trip. Replies come back in command order no
    /// matter how the store schedules them.
    ///
    /// The default runs each command on its own; clients with a native
    /// pipeline override it.
    fn execute(&self, commands: &[Command]) -> ClientResult<Vec<Reply>> {
        commands
            .iter()
            .map(|command| match command {
                Command::Get(key) => self.get(key).map(Reply::Value),
                Command::Set { key, value, expiry } => {
                    self.set(key, value, *expiry).map(|_| Reply::Done)
                }
                Command::Del(key) => self.del(key).map(|_| Reply::Done),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Client without a native pipeline.
    #[derive(Default)]
    struct PlainClient {
        data: Mutex<HashMap<String, Vec<u8>>>,
    }

    impl KvClient for PlainClient {
        fn exists(&self, key: &str) -> ClientResult<bool> {
            Ok(self.data.lock().unwrap().contains_key(key))
        }

        fn get(&self, key: &str) -> ClientResult<Option<Vec<u8>>> {
            Ok(self.data.lock().unwrap().get(key).cloned())
        }

        fn set(&self, key: &str, value: &[u8], _expiry: Option<Duration>) -> ClientResult<()> {
            self.data
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_vec());
            Ok(())
        }

        fn del(&self, key: &str) -> ClientResult<()> {
            self.data.lock().unwrap().remove(key);
            Ok(())
        }
    }

    #[test]
    fn test_default_execute_preserves_order() {
        let client = PlainClient::default();
        let replies = client
            .execute(&[
                Command::Set {
                    key: "a".into(),
                    value: b"1".to_vec(),
                    expiry: None,
                },
                Command::Get("missing".into()),
                Command::Get("a".into()),
                Command::Del("a".into()),
                Command::Get("a".into()),
            ])
            .unwrap();

        assert_eq!(
            replies,
            vec![
                Reply::Done,
                Reply::Value(None),
                Reply::Value(Some(b"1".to_vec())),
                Reply::Done,
                Reply::Value(None),
            ]
        );
    }

    #[test]
    fn test_command_key() {
        assert_eq!(Command::Get("g".into()).key(), "g");
        assert_eq!(Command::Del("d".into()).key(), "d");
        let set = Command::Set {
            key: "s".into(),
            value: vec![],
            expiry: None,
        };
        assert_eq!(set.key(), "s");
    }
}
