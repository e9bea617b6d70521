//! In-process key-value client for tests and embedding.

use crate::client::{ClientError, ClientResult, Command, KvClient, Reply};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

#[derive(Default)]
struct Shared {
    data: Mutex<HashMap<String, Entry>>,
    round_trips: AtomicU64,
    unavailable: AtomicBool,
}

/// Map-backed client honoring expiry.
///
/// Clones share the same map, so a test can hand one clone to the code under
/// test and inspect the other. Every call (a whole batch included) counts as
/// one round trip.
#[derive(Clone, Default)]
pub struct MemoryClient {
    shared: Arc<Shared>,
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of exchanges with the store so far.
    pub fn round_trips(&self) -> u64 {
        self.shared.round_trips.load(Ordering::Relaxed)
    }

    /// Makes every subsequent call fail with [`ClientError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.shared.unavailable.store(unavailable, Ordering::Relaxed);
    }

    /// Remaining time to live, `None` for missing or non-expiring keys.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let data = self.lock_data();
        data.get(key)
            .filter(|e| e.is_live(now))
            .and_then(|e| e.expires_at)
            .map(|at| at.saturating_duration_since(now))
    }

    /// Live keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        let data = self.lock_data();
        let mut keys: Vec<String> = data
            .iter()
            .filter(|(_, e)| e.is_live(now))
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.keys().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_data(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        // A panic while holding the lock cannot leave an entry half-written.
        self.shared
            .data
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Starts one round trip and returns the locked map.
    fn begin(&self) -> ClientResult<MutexGuard<'_, HashMap<String, Entry>>> {
        self.shared.round_trips.fetch_add(1, Ordering::Relaxed);
        if self.shared.unavailable.load(Ordering::Relaxed) {
            return Err(ClientError::Unavailable(
                "memory client switched off".to_string(),
            ));
        }
        Ok(self.lock_data())
    }
}

fn deadline(now: Instant, expiry: Option<Duration>) -> ClientResult<Option<Instant>> {
    expiry
        .map(|ttl| now.checked_add(ttl).ok_or(ClientError::ExpiryOutOfRange(ttl)))
        .transpose()
}

fn apply(
    data: &mut HashMap<String, Entry>,
    command: &Command,
    now: Instant,
) -> ClientResult<Reply> {
    match command {
        Command::Get(key) => Ok(Reply::Value(read(data, key, now))),
        Command::Set { key, value, expiry } => {
            let expires_at = deadline(now, *expiry)?;
            data.insert(
                key.clone(),
                Entry {
                    value: value.clone(),
                    expires_at,
                },
            );
            Ok(Reply::Done)
        }
        Command::Del(key) => {
            data.remove(key);
            Ok(Reply::Done)
        }
    }
}

fn read(data: &mut HashMap<String, Entry>, key: &str, now: Instant) -> Option<Vec<u8>> {
    match data.get(key) {
        Some(entry) if entry.is_live(now) => Some(entry.value.clone()),
        Some(_) => {
            data.remove(key);
            None
        }
        None => None,
    }
}

impl KvClient for MemoryClient {
    fn exists(&self, key: &str) -> ClientResult<bool> {
        let mut data = self.begin()?;
        Ok(read(&mut data, key, Instant::now()).is_some())
    }

    fn get(&self, key: &str) -> ClientResult<Option<Vec<u8>>> {
        let mut data = self.begin()?;
        Ok(read(&mut data, key, Instant::now()))
    }

    fn set(&self, key: &str, value: &[u8], expiry: Option<Duration>) -> ClientResult<()> {
        let mut data = self.begin()?;
        let command = Command::Set {
            key: key.to_string(),
            value: value.to_vec(),
            expiry,
        };
        apply(&mut data, &command, Instant::now()).map(|_| ())
    }

    fn del(&self, key: &str) -> ClientResult<()> {
        let mut data = self.begin()?;
        data.remove(key);
        Ok(())
    }

    fn execute(&self, commands: &[Command]) -> ClientResult<Vec<Reply>> {
        let mut data = self.begin()?;
        let now = Instant::now();
        // Validate every expiry first so a rejected batch leaves no partial writes.
        for command in commands {
            if let Command::Set { expiry, .. } = command {
                deadline(now, *expiry)?;
            }
        }
        commands
            .iter()
            .map(|command| apply(&mut data, command, now))
            .collect()
    }
}
