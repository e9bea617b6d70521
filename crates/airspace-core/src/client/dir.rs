//! Directory-backed key-value client: one file per key.
//!
//! File layout:
//! ```text
//! ┌────────────────────────────────────────────────────┐
//! │ FRAME HEADER (8 bytes)                             │
//! │   payload_len: u32 LE                              │
//! │   crc32: u32 LE          (of the payload)          │
//! ├────────────────────────────────────────────────────┤
//! │ PAYLOAD                                            │
//! │   zstd(postcard(StoredEntry { key,                 │
//! │                              expires_at,           │
//! │                              value }))             │
//! └────────────────────────────────────────────────────┘
//! ```
//!
//! File names are the xxh3-64 hash of the key (`{:016x}.kv`); the key itself
//! is kept inside the entry so collisions are detected on read. Writes go
//! through a uniquely named `.tmp` file and a rename, so several processes
//! may share one directory. Expired entries read as absent and are deleted
//! on touch or by [`DirClient::purge_expired`].

use crate::client::{ClientError, ClientResult, Command, KvClient, Reply};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};
use xxhash_rust::xxh3::xxh3_64;

const FRAME_HEADER_SIZE: usize = 8;
const EXTENSION: &str = "kv";
const ZSTD_LEVEL: i32 = 3;
const TMP_SUFFIX: &str = ".tmp";
/// `.tmp` files untouched for this long belong to an interrupted write.
const STALE_TMP_AGE: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    key: String,
    /// Unix seconds.
    expires_at: Option<i64>,
    value: Vec<u8>,
}

impl StoredEntry {
    fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Listing record returned by [`DirClient::entries`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub key: String,
    pub file_size: u64,
    pub value_len: usize,
    pub expires_at: Option<DateTime<Utc>>,
}

pub struct DirClient {
    base_path: PathBuf,
    /// Held for each call so batches never interleave.
    lock: Mutex<()>,
}

impl DirClient {
    /// Opens (creating if needed) a store directory and clears `.tmp` files
    /// older than an hour. Younger ones may be another writer's in-flight
    /// file and are left alone.
    pub fn open(base_path: impl Into<PathBuf>) -> ClientResult<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path)?;

        let now = SystemTime::now();
        for entry in fs::read_dir(&base_path)?.flatten() {
            let path = entry.path();
            if !path.extension().is_some_and(|ext| ext == "tmp") {
                continue;
            }
            let stale = entry
                .metadata()
                .and_then(|m| m.modified())
                .is_ok_and(|at| now.duration_since(at).is_ok_and(|age| age >= STALE_TMP_AGE));
            if stale {
                debug!(path = %path.display(), "dir client: removing stale temp file");
                let _ = fs::remove_file(&path);
            }
        }

        Ok(Self {
            base_path,
            lock: Mutex::new(()),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Path of the file holding `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.base_path
            .join(format!("{:016x}.{EXTENSION}", xxh3_64(key.as_bytes())))
    }

    /// Live entries, sorted by key. Corrupted files are skipped with a warning.
    pub fn entries(&self) -> ClientResult<Vec<EntryInfo>> {
        let _guard = self.guard();
        let now = Utc::now().timestamp();
        let mut infos = Vec::new();

        for path in self.entry_paths()? {
            let data = match fs::read(&path) {
                Ok(d) => d,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            let entry = match decode(&path.display().to_string(), &data) {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "dir client: skipping unreadable entry");
                    continue;
                }
            };
            if entry.is_expired(now) {
                continue;
            }
            infos.push(EntryInfo {
                key: entry.key,
                file_size: data.len() as u64,
                value_len: entry.value.len(),
                expires_at: entry
                    .expires_at
                    .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0)),
            });
        }

        infos.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(infos)
    }

    /// Removes every expired entry and returns how many were removed.
    pub fn purge_expired(&self) -> ClientResult<usize> {
        let _guard = self.guard();
        let now = Utc::now().timestamp();
        let mut removed = 0;

        for path in self.entry_paths()? {
            let Ok(data) = fs::read(&path) else {
                continue;
            };
            let expired = decode(&path.display().to_string(), &data)
                .map(|entry| entry.is_expired(now))
                .unwrap_or(false);
            if expired {
                remove_if_present(&path)?;
                removed += 1;
            }
        }

        debug!(removed, dir = %self.base_path.display(), "dir client: purged expired entries");
        Ok(removed)
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn entry_paths(&self) -> ClientResult<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.base_path)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == EXTENSION) {
                paths.push(path);
            }
        }
        Ok(paths)
    }

    fn read_value(&self, key: &str) -> ClientResult<Option<Vec<u8>>> {
        let path = self.path_for(key);
        let data = match fs::read(&path) {
            Ok(d) => d,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let entry = decode(key, &data)?;
        if entry.key != key {
            warn!(key, stored = %entry.key, "dir client: hash collision, treating as absent");
            return Ok(None);
        }
        if entry.is_expired(Utc::now().timestamp()) {
            remove_if_present(&path)?;
            return Ok(None);
        }
        Ok(Some(entry.value))
    }

    fn write_value(&self, key: &str, value: &[u8], expiry: Option<Duration>) -> ClientResult<()> {
        let expires_at = expiry
            .map(|ttl| expiry_deadline(Utc::now().timestamp(), ttl))
            .transpose()?;
        let entry = StoredEntry {
            key: key.to_string(),
            expires_at,
            value: value.to_vec(),
        };
        write_atomic(&self.base_path, &self.path_for(key), &encode(&entry)?)
    }

    fn delete_value(&self, key: &str) -> ClientResult<()> {
        remove_if_present(&self.path_for(key))
    }

    fn apply(&self, command: &Command) -> ClientResult<Reply> {
        match command {
            Command::Get(key) => self.read_value(key).map(Reply::Value),
            Command::Set { key, value, expiry } => {
                self.write_value(key, value, *expiry).map(|_| Reply::Done)
            }
            Command::Del(key) => self.delete_value(key).map(|_| Reply::Done),
        }
    }
}

impl KvClient for DirClient {
    fn exists(&self, key: &str) -> ClientResult<bool> {
        let _guard = self.guard();
        Ok(self.read_value(key)?.is_some())
    }

    fn get(&self, key: &str) -> ClientResult<Option<Vec<u8>>> {
        let _guard = self.guard();
        self.read_value(key)
    }

    fn set(&self, key: &str, value: &[u8], expiry: Option<Duration>) -> ClientResult<()> {
        let _guard = self.guard();
        self.write_value(key, value, expiry)
    }

    fn del(&self, key: &str) -> ClientResult<()> {
        let _guard = self.guard();
        self.delete_value(key)
    }

    fn execute(&self, commands: &[Command]) -> ClientResult<Vec<Reply>> {
        let _guard = self.guard();
        commands
            .iter()
            .map(|command| {
                self.apply(command).inspect_err(|e| {
                    warn!(key = command.key(), error = %e, "dir client: batch command failed");
                })
            })
            .collect()
    }
}

/// Unix second at which an entry written at `now` with `ttl` expires,
/// rounded up to whole seconds.
fn expiry_deadline(now: i64, ttl: Duration) -> ClientResult<i64> {
    let secs = ttl
        .as_secs()
        .checked_add(u64::from(ttl.subsec_nanos() > 0))
        .and_then(|secs| i64::try_from(secs).ok());
    secs.and_then(|secs| now.checked_add(secs))
        .ok_or(ClientError::ExpiryOutOfRange(ttl))
}

fn encode(entry: &StoredEntry) -> ClientResult<Vec<u8>> {
    let raw = postcard::to_allocvec(entry).map_err(io::Error::other)?;
    let payload = zstd::encode_all(&raw[..], ZSTD_LEVEL)?;
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::other("entry too large for frame header"))?;

    let mut buf = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    buf.extend_from_slice(&payload);
    Ok(buf)
}

fn decode(key: &str, data: &[u8]) -> ClientResult<StoredEntry> {
    let corrupted = |reason: String| ClientError::Corrupted {
        key: key.to_string(),
        reason,
    };

    if data.len() < FRAME_HEADER_SIZE {
        return Err(corrupted(format!("file too small ({} bytes)", data.len())));
    }
    let len = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
    let crc = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);

    let payload = &data[FRAME_HEADER_SIZE..];
    if payload.len() != len {
        return Err(corrupted(format!(
            "payload length {} does not match header {len}",
            payload.len()
        )));
    }
    if crc32fast::hash(payload) != crc {
        return Err(corrupted("checksum mismatch".to_string()));
    }

    let raw = zstd::decode_all(payload).map_err(|e| corrupted(e.to_string()))?;
    postcard::from_bytes(&raw).map_err(|e| corrupted(e.to_string()))
}

fn write_atomic(dir: &Path, path: &Path, bytes: &[u8]) -> ClientResult<()> {
    let mut tmp = tempfile::Builder::new()
        .prefix(".")
        .suffix(TMP_SUFFIX)
        .tempfile_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;

    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn remove_if_present(path: &Path) -> ClientResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_expired(client: &DirClient, key: &str) {
        let entry = StoredEntry {
            key: key.to_string(),
            expires_at: Some(Utc::now().timestamp() - 10),
            value: b"stale".to_vec(),
        };
        write_atomic(client.base_path(), &client.path_for(key), &encode(&entry).unwrap()).unwrap();
    }

    #[test]
    fn test_set_get_del() {
        let dir = tempdir().unwrap();
        let client = DirClient::open(dir.path()).unwrap();

        assert_eq!(client.get("a:b").unwrap(), None);
        client.set("a:b", b"hello", None).unwrap();
        assert!(client.exists("a:b").unwrap());
        assert_eq!(client.get("a:b").unwrap(), Some(b"hello".to_vec()));

        client.set("a:b", b"again", None).unwrap();
        assert_eq!(client.get("a:b").unwrap(), Some(b"again".to_vec()));

        client.del("a:b").unwrap();
        assert_eq!(client.get("a:b").unwrap(), None);
        client.del("a:b").unwrap();
    }

    #[test]
    fn test_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let client = DirClient::open(dir.path()).unwrap();
            client.set("k", b"v", Some(Duration::from_secs(3600))).unwrap();
        }
        let client = DirClient::open(dir.path()).unwrap();
        assert_eq!(client.get("k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn test_open_removes_only_stale_tmp_files() {
        let dir = tempdir().unwrap();
        let stale = dir.path().join("0000000000000000.tmp");
        fs::write(&stale, b"partial").unwrap();
        fs::File::options()
            .write(true)
            .open(&stale)
            .unwrap()
            .set_modified(SystemTime::now() - 2 * STALE_TMP_AGE)
            .unwrap();
        let in_flight = dir.path().join(".in-flight.tmp");
        fs::write(&in_flight, b"partial").unwrap();

        DirClient::open(dir.path()).unwrap();
        assert!(!stale.exists());
        assert!(in_flight.exists());
    }

    #[test]
    fn test_second_open_keeps_concurrent_writes_working() {
        let dir = tempdir().unwrap();
        let writer = DirClient::open(dir.path()).unwrap();
        writer.set("k", b"v1", None).unwrap();
        let _other = DirClient::open(dir.path()).unwrap();
        writer.set("k", b"v2", None).unwrap();
        assert_eq!(writer.get("k").unwrap(), Some(b"v2".to_vec()));

        let leftovers: Vec<PathBuf> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_unrepresentable_expiry_is_rejected() {
        let dir = tempdir().unwrap();
        let client = DirClient::open(dir.path()).unwrap();
        for ttl in [
            Duration::MAX,
            Duration::from_secs(u64::MAX),
            Duration::from_secs(i64::MAX as u64),
        ] {
            assert!(matches!(
                client.set("k", b"v", Some(ttl)),
                Err(ClientError::ExpiryOutOfRange(_))
            ));
        }
        assert!(!client.path_for("k").exists());

        client
            .set("k", b"v", Some(Duration::from_secs(100 * 365 * 24 * 60 * 60)))
            .unwrap();
        assert_eq!(client.get("k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn test_expired_entry_reads_as_absent() {
        let dir = tempdir().unwrap();
        let client = DirClient::open(dir.path()).unwrap();
        write_expired(&client, "old");

        assert!(!client.exists("old").unwrap());
        assert!(!client.path_for("old").exists());
    }

    #[test]
    fn test_purge_expired() {
        let dir = tempdir().unwrap();
        let client = DirClient::open(dir.path()).unwrap();
        write_expired(&client, "old1");
        write_expired(&client, "old2");
        client.set("fresh", b"v", Some(Duration::from_secs(60))).unwrap();

        assert_eq!(client.purge_expired().unwrap(), 2);
        let keys: Vec<String> = client.entries().unwrap().into_iter().map(|e| e.key).collect();
        assert_eq!(keys, vec!["fresh"]);
    }

    #[test]
    fn test_entries() {
        let dir = tempdir().unwrap();
        let client = DirClient::open(dir.path()).unwrap();
        client.set("b", b"22", None).unwrap();
        client.set("a", b"1", Some(Duration::from_secs(120))).unwrap();
        write_expired(&client, "c");

        let entries = client.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].key, "a");
        assert_eq!(entries[0].value_len, 1);
        assert!(entries[0].expires_at.is_some());
        assert_eq!(entries[1].key, "b");
        assert_eq!(entries[1].expires_at, None);
        assert!(entries[1].file_size > FRAME_HEADER_SIZE as u64);
    }

    #[test]
    fn test_checksum_mismatch_is_corruption() {
        let dir = tempdir().unwrap();
        let client = DirClient::open(dir.path()).unwrap();
        client.set("k", b"value", None).unwrap();

        let path = client.path_for("k");
        let mut data = fs::read(&path).unwrap();
        let last = data.len() - 1;
        data[last] ^= 0xff;
        fs::write(&path, data).unwrap();

        assert!(matches!(
            client.get("k"),
            Err(ClientError::Corrupted { .. })
        ));
    }

    #[test]
    fn test_truncated_file_is_corruption() {
        let dir = tempdir().unwrap();
        let client = DirClient::open(dir.path()).unwrap();
        fs::write(client.path_for("k"), [1u8, 2, 3]).unwrap();
        assert!(matches!(
            client.get("k"),
            Err(ClientError::Corrupted { .. })
        ));
    }

    #[test]
    fn test_execute_in_order() {
        let dir = tempdir().unwrap();
        let client = DirClient::open(dir.path()).unwrap();
        let replies = client
            .execute(&[
                Command::Set {
                    key: "x".into(),
                    value: b"1".to_vec(),
                    expiry: None,
                },
                Command::Get("y".into()),
                Command::Get("x".into()),
                Command::Del("x".into()),
                Command::Get("x".into()),
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
    fn test_expiry_rounds_up_to_whole_seconds() {
        let dir = tempdir().unwrap();
        let client = DirClient::open(dir.path()).unwrap();
        let before = Utc::now().timestamp();
        client
            .set("k", b"v", Some(Duration::from_millis(1500)))
            .unwrap();
        let entries = client.entries().unwrap();
        let expires_at = entries[0].expires_at.unwrap().timestamp();
        assert!(expires_at >= before + 2);
    }
}
