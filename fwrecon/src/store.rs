//! Persisted engine state.
//!
//! Records live in named collections under a stable id. A record written in a
//! terminal state is immutable: writing it again with the same content is a
//! no-op, with different content an error. [`JsonDirStore`] keeps one JSON
//! file per record and replaces files through a temp file and rename.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use intent_core::{DiffRecord, IntentSnapshot};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("store record {collection}/{id} is not valid JSON: {source}")]
    Json {
        collection: String,
        id: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("could not replace {path}: {source}")]
    Persist {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("record {collection}/{id} is terminal and cannot be rewritten")]
    Immutable { collection: String, id: String },
    #[error("invalid record id '{0}'")]
    InvalidId(String),
}

/// A value persisted in one collection.
pub trait Record: Serialize + DeserializeOwned {
    const COLLECTION: &'static str;

    fn record_id(&self) -> String;

    /// Terminal records may not be rewritten with different content.
    fn is_terminal(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub terminal: bool,
    pub record: Value,
}

/// Raw storage backend.
pub trait StateStore: Send + Sync {
    fn put_raw(&self, collection: &str, id: &str, envelope: Envelope) -> Result<(), StoreError>;
    fn get_raw(&self, collection: &str, id: &str) -> Result<Option<Envelope>, StoreError>;
    fn list_ids(&self, collection: &str) -> Result<Vec<String>, StoreError>;
    fn delete_raw(&self, collection: &str, id: &str) -> Result<(), StoreError>;
}

pub fn put<R: Record>(store: &dyn StateStore, record: &R) -> Result<(), StoreError> {
    let id = record.record_id();
    validate_id(&id)?;
    let value = serde_json::to_value(record).map_err(|source| StoreError::Json {
        collection: R::COLLECTION.to_string(),
        id: id.clone(),
        source,
    })?;
    let envelope = Envelope {
        terminal: record.is_terminal(),
        record: value,
    };
    if let Some(existing) = store.get_raw(R::COLLECTION, &id)? {
        if existing.terminal {
            if existing.record == envelope.record {
                return Ok(());
            }
            return Err(StoreError::Immutable {
                collection: R::COLLECTION.to_string(),
                id,
            });
        }
    }
    store.put_raw(R::COLLECTION, &id, envelope)
}

pub fn get<R: Record>(store: &dyn StateStore, id: &str) -> Result<Option<R>, StoreError> {
    validate_id(id)?;
    match store.get_raw(R::COLLECTION, id)? {
        Some(envelope) => serde_json::from_value(envelope.record)
            .map(Some)
            .map_err(|source| StoreError::Json {
                collection: R::COLLECTION.to_string(),
                id: id.to_string(),
                source,
            }),
        None => Ok(None),
    }
}

/// Every record of a collection, in id order.
pub fn list<R: Record>(store: &dyn StateStore) -> Result<Vec<R>, StoreError> {
    let mut out = Vec::new();
    for id in store.list_ids(R::COLLECTION)? {
        if let Some(record) = get::<R>(store, &id)? {
            out.push(record);
        }
    }
    Ok(out)
}

pub fn delete<R: Record>(store: &dyn StateStore, id: &str) -> Result<(), StoreError> {
    validate_id(id)?;
    store.delete_raw(R::COLLECTION, id)
}

fn validate_id(id: &str) -> Result<(), StoreError> {
    let valid = !id.is_empty()
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidId(id.to_string()))
    }
}

impl Record for IntentSnapshot {
    const COLLECTION: &'static str = "snapshots";

    fn record_id(&self) -> String {
        let fingerprint = self.fingerprint();
        format!("{}.{}", self.id(), &fingerprint[..12])
    }
}

impl Record for DiffRecord {
    const COLLECTION: &'static str = "diffs";

    fn record_id(&self) -> String {
        self.id.clone()
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: Mutex<BTreeMap<String, BTreeMap<String, Envelope>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStore {
    fn put_raw(&self, collection: &str, id: &str, envelope: Envelope) -> Result<(), StoreError> {
        self.collections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), envelope);
        Ok(())
    }

    fn get_raw(&self, collection: &str, id: &str) -> Result<Option<Envelope>, StoreError> {
        Ok(self
            .collections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(collection)
            .and_then(|records| records.get(id))
            .cloned())
    }

    fn list_ids(&self, collection: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .collections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(collection)
            .map(|records| records.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn delete_raw(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        if let Some(records) = self
            .collections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(collection)
        {
            records.remove(id);
        }
        Ok(())
    }
}

/// `<root>/<collection>/<id>.json`.
#[derive(Debug, Clone)]
pub struct JsonDirStore {
    root: PathBuf,
}

impl JsonDirStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| io_error(&root, source))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, collection: &str, id: &str) -> PathBuf {
        self.root.join(collection).join(format!("{id}.json"))
    }
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

impl StateStore for JsonDirStore {
    fn put_raw(&self, collection: &str, id: &str, envelope: Envelope) -> Result<(), StoreError> {
        let dir = self.root.join(collection);
        fs::create_dir_all(&dir).map_err(|source| io_error(&dir, source))?;
        let path = self.record_path(collection, id);
        let bytes = serde_json::to_vec_pretty(&envelope).map_err(|source| StoreError::Json {
            collection: collection.to_string(),
            id: id.to_string(),
            source,
        })?;

        let mut temp = NamedTempFile::new_in(&dir).map_err(|source| io_error(&dir, source))?;
        temp.write_all(&bytes)
            .and_then(|()| temp.as_file().sync_all())
            .map_err(|source| io_error(temp.path(), source))?;
        temp.persist(&path).map_err(|err| StoreError::Persist {
            path: path.display().to_string(),
            source: err.error,
        })?;
        Ok(())
    }

    fn get_raw(&self, collection: &str, id: &str) -> Result<Option<Envelope>, StoreError> {
        let path = self.record_path(collection, id);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(io_error(&path, source)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| StoreError::Json {
                collection: collection.to_string(),
                id: id.to_string(),
                source,
            })
    }

    fn list_ids(&self, collection: &str) -> Result<Vec<String>, StoreError> {
        let dir = self.root.join(collection);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(io_error(&dir, source)),
        };
        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| io_error(&dir, source))?;
            let name = entry.file_name();
            if let Some(id) = name.to_str().and_then(|n| n.strip_suffix(".json")) {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn delete_raw(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let path = self.record_path(collection, id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(io_error(&path, source)),
        }
    }
}
