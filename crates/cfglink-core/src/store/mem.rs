//! In-memory configuration store for tests and bring-up.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::{ConfigStore, StoreError, TypeTag, Value};

#[derive(Default)]
struct Inner {
    namespaces: HashMap<String, HashMap<String, Value>>,
    fail_ops: bool,
}

/// In-memory store with shared handles: clones see the same data, so a test
/// can keep one handle while the engine owns another.
#[derive(Clone, Default)]
pub struct MemStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail with a backend error.
    pub fn set_fail(&self, fail: bool) {
        self.inner.lock().unwrap().fail_ops = fail;
    }

    pub fn contains(&self, ns: &str, key: &str) -> bool {
        self.inner
            .lock()
            .unwrap()
            .namespaces
            .get(ns)
            .is_some_and(|items| items.contains_key(key))
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.inner.lock().unwrap().fail_ops {
            Err(StoreError::Backend("injected failure".into()))
        } else {
            Ok(())
        }
    }
}

impl ConfigStore for MemStore {
    fn get(&self, ns: &str, key: &str, tag: TypeTag) -> Result<Value, StoreError> {
        self.check()?;
        let inner = self.inner.lock().unwrap();
        let value = inner
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
        self.check()?;
        self.inner
            .lock()
            .unwrap()
            .namespaces
            .entry(ns.to_owned())
            .or_default()
            .insert(key.to_owned(), value);
        Ok(())
    }

    fn erase(&mut self, ns: &str, key: &str) -> Result<(), StoreError> {
        self.check()?;
        let removed = self
            .inner
            .lock()
            .unwrap()
            .namespaces
            .get_mut(ns)
            .and_then(|items| items.remove(key));
        match removed {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound {
                ns: ns.to_owned(),
                key: key.to_owned(),
            }),
        }
    }

    fn erase_all(&mut self, ns: &str) -> Result<(), StoreError> {
        self.check()?;
        self.inner.lock().unwrap().namespaces.remove(ns);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        self.check()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_share_state() {
        let store = MemStore::new();
        let mut handle = store.clone();
        handle.set("ns", "k", Value::I32(-5)).unwrap();
        assert_eq!(store.get("ns", "k", TypeTag::I32).unwrap(), Value::I32(-5));
    }

    #[test]
    fn test_injected_failure() {
        let store = MemStore::new();
        let mut handle = store.clone();
        store.set_fail(true);
        assert!(matches!(
            handle.set("ns", "k", Value::U8(1)),
            Err(StoreError::Backend(_))
        ));
        store.set_fail(false);
        handle.set("ns", "k", Value::U8(1)).unwrap();
    }
}
