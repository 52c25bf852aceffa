//! Durable key-value persistence used to carry session and user identity
//! across process restarts.
//!
//! The surface is deliberately small: typed values addressed by string keys,
//! written in batches that land atomically.
use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Debug;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime};

/// A typed value held by a [`KeyValueStore`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum StoredValue {
    /// A string.
    Text(String),
    /// A point in wall-clock time.
    Timestamp(SystemTime),
    /// A length of time.
    Duration(Duration),
}

impl StoredValue {
    /// Returns the string if this is a [`StoredValue::Text`].
    pub fn as_text(&self) -> Option<&str> {
        match self {
            StoredValue::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Returns the time if this is a [`StoredValue::Timestamp`].
    pub fn as_timestamp(&self) -> Option<SystemTime> {
        match self {
            StoredValue::Timestamp(time) => Some(*time),
            _ => None,
        }
    }

    /// Returns the length if this is a [`StoredValue::Duration`].
    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            StoredValue::Duration(duration) => Some(*duration),
            _ => None,
        }
    }
}

impl From<String> for StoredValue {
    fn from(value: String) -> Self {
        StoredValue::Text(value)
    }
}

impl From<&str> for StoredValue {
    fn from(value: &str) -> Self {
        StoredValue::Text(value.to_owned())
    }
}

impl From<SystemTime> for StoredValue {
    fn from(value: SystemTime) -> Self {
        StoredValue::Timestamp(value)
    }
}

impl From<Duration> for StoredValue {
    fn from(value: Duration) -> Self {
        StoredValue::Duration(value)
    }
}

/// An ordered set of writes and removals applied as one unit.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<(String, Option<StoredValue>)>,
}

impl WriteBatch {
    /// Creates an empty batch.
    pub fn new() -> Self {
        WriteBatch::default()
    }

    /// Stores `value` under `key`.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<StoredValue>) -> Self {
        self.ops.push((key.into(), Some(value.into())));
        self
    }

    /// Removes `key` if present.
    pub fn remove(mut self, key: impl Into<String>) -> Self {
        self.ops.push((key.into(), None));
        self
    }

    /// Returns `true` if the batch holds no operations.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    fn apply_to(self, map: &mut HashMap<String, StoredValue>) {
        for (key, value) in self.ops {
            match value {
                Some(value) => {
                    map.insert(key, value);
                }
                None => {
                    map.remove(&key);
                }
            }
        }
    }
}

/// Durable storage of typed values by string key.
///
/// Implementations must apply a [`WriteBatch`] atomically: after `apply`
/// returns, readers observe either every operation of the batch or none.
pub trait KeyValueStore: Send + Sync + Debug {
    /// Returns the value stored under `key`.
    fn get(&self, key: &str) -> Option<StoredValue>;

    /// Applies every operation of `batch`, in order, as one unit.
    fn apply(&self, batch: WriteBatch) -> Result<(), StoreError>;
}

/// A process-local [`KeyValueStore`].
///
/// Clones share the same map, which lets a test keep a handle on the store it
/// hands to a component and later restore a second component from it.
#[derive(Clone, Debug, Default)]
pub struct InMemoryStore {
    values: Arc<Mutex<HashMap<String, StoredValue>>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        InMemoryStore::default()
    }

    /// Returns the number of stored keys.
    pub fn len(&self) -> usize {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if no keys are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for InMemoryStore {
    fn get(&self, key: &str) -> Option<StoredValue> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn apply(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut values = self.values.lock()?;
        batch.apply_to(&mut values);
        Ok(())
    }
}

/// A [`KeyValueStore`] persisted as a JSON document on disk.
///
/// Every batch rewrites the whole document into a sibling temporary file and
/// renames it over the original, so a crash mid-write leaves the previous
/// document intact.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    values: Mutex<HashMap<String, StoredValue>>,
}

impl FileStore {
    /// Opens the store at `path`, reading any existing document.
    ///
    /// A missing file yields an empty store. An unreadable or malformed
    /// document is an error.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let values = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(err) if err.kind() == ErrorKind::NotFound => HashMap::new(),
            Err(err) => return Err(err.into()),
        };
        Ok(FileStore {
            path,
            values: Mutex::new(values),
        })
    }

    /// Returns the path of the backing document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, values: &HashMap<String, StoredValue>) -> Result<(), StoreError> {
        let document = serde_json::to_vec(values)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, document)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<StoredValue> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn apply(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut values = self.values.lock()?;
        let mut next = values.clone();
        batch.apply_to(&mut next);
        self.write(&next)?;
        *values = next;
        Ok(())
    }
}
