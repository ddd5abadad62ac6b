//! TOML-file-backed configuration store.
//!
//! The whole store is one TOML document: a table per namespace, a key per
//! item. Mutations are written through to disk immediately; `commit` is a
//! no-op unless a prior write-through failed and left the store dirty.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::{ConfigStore, StoreError, TypeTag, Value};

type Namespaces = BTreeMap<String, BTreeMap<String, Value>>;

pub struct TomlStore {
    path: PathBuf,
    namespaces: Namespaces,
    dirty: bool,
}

impl TomlStore {
    /// Open or create the store backed by `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let namespaces = if path.exists() {
            let text = fs::read_to_string(&path)?;
            toml::from_str(&text).map_err(|e| StoreError::Serialize(e.to_string()))?
        } else {
            Namespaces::new()
        };
        info!(path = %path.display(), namespaces = namespaces.len(), "Config store opened");
        Ok(Self {
            path,
            namespaces,
            dirty: false,
        })
    }

    fn write_through(&mut self) -> Result<(), StoreError> {
        self.dirty = true;
        let text =
            toml::to_string_pretty(&self.namespaces).map_err(|e| StoreError::Serialize(e.to_string()))?;
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, text)?;
        self.dirty = false;
        debug!(path = %self.path.display(), "Config store flushed");
        Ok(())
    }
}

impl ConfigStore for TomlStore {
    fn get(&self, ns: &str, key: &str, tag: TypeTag) -> Result<Value, StoreError> {
        let value = self
            .namespaces
            .get(ns)
            .and_then(|items| items.get(key))
            .ok_or_else(|| StoreError::NotFound {
                ns: ns.to_owned(),
                key: key.to_owned(),
            })?;
        if value.tag() != tag {
            return Err(StoreError::TypeMismatch {
                ns: ns.to_owned(),
                key: key.to_owned(),
                stored: value.tag(),
                requested: tag,
            });
        }
        Ok(value.clone())
    }

    fn set(&mut self, ns: &str, key: &str, value: Value) -> Result<(), StoreError> {
        self.namespaces
            .entry(ns.to_owned())
            .or_default()
            .insert(key.to_owned(), value);
        self.write_through()
    }

    fn erase(&mut self, ns: &str, key: &str) -> Result<(), StoreError> {
        let removed = self
            .namespaces
            .get_mut(ns)
            .and_then(|items| items.remove(key));
        if removed.is_none() {
            return Err(StoreError::NotFound {
                ns: ns.to_owned(),
                key: key.to_owned(),
            });
        }
        self.write_through()
    }

    fn erase_all(&mut self, ns: &str) -> Result<(), StoreError> {
        // Erasing an absent namespace is a no-op, matching wipe semantics.
        self.namespaces.remove(ns);
        self.write_through()
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        if self.dirty {
            self.write_through()
        } else {
            Ok(())
        }
    }
}
