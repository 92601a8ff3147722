//! In-process backend
//!
//! Keeps documents in memory and pushes collection snapshots to watchers on
//! every write. Faults can be queued to exercise retry and error paths.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use modvote_core::{Error, ErrorKind, Result};
use serde_json::{Map, Value};
use tokio::sync::watch;
use tracing::{debug, trace};

use crate::backend::{paths, Backend, Watch};

/// In-memory document store
#[derive(Default)]
pub struct MemoryBackend {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    docs: BTreeMap<String, Value>,
    watchers: HashMap<String, watch::Sender<Value>>,
    faults: VecDeque<ErrorKind>,
    calls: u64,
}

impl Inner {
    /// Count the call and pop a queued fault, if any
    fn begin(&mut self, op: &str, path: &str) -> Result<()> {
        self.calls += 1;
        trace!(op, path, "Backend call");
        match self.faults.pop_front() {
            Some(kind) => {
                debug!(op, path, kind = %kind, "Injected backend fault");
                Err(Error::infra(kind, format!("injected fault during {}", op)))
            }
            None => Ok(()),
        }
    }

    fn snapshot(&self, collection: &str) -> Value {
        let prefix = format!("{}/", collection);
        let docs = self
            .docs
            .range(prefix.clone()..)
            .take_while(|(path, _)| path.starts_with(&prefix))
            .filter_map(|(path, doc)| {
                let key = &path[prefix.len()..];
                (!key.contains('/')).then(|| (key.to_string(), doc.clone()))
            })
            .collect::<Map<_, _>>();
        Value::Object(docs)
    }

    fn write(&mut self, path: &str, doc: Value) {
        self.docs.insert(path.to_string(), doc);
        if let Some((collection, _)) = paths::split(path) {
            if self.watchers.contains_key(collection) {
                let snapshot = self.snapshot(collection);
                if let Some(tx) = self.watchers.get(collection) {
                    tx.send_replace(snapshot);
                }
            }
        }
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next backend call with the given kind
    pub fn fail_next(&self, kind: ErrorKind) {
        self.lock().faults.push_back(kind);
    }

    /// Fail the next `count` backend calls with the given kind
    pub fn fail_times(&self, kind: ErrorKind, count: usize) {
        let mut inner = self.lock();
        inner.faults.extend(std::iter::repeat(kind).take(count));
    }

    /// Number of backend calls made so far, including failed ones
    pub fn call_count(&self) -> u64 {
        self.lock().calls
    }

    /// Write a raw document, bypassing fault injection
    ///
    /// Stands in for another client writing whatever it likes.
    pub fn inject(&self, path: &str, doc: Value) {
        self.lock().write(path, doc);
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn get(&self, path: &str) -> Result<Option<Value>> {
        let mut inner = self.lock();
        inner.begin("get", path)?;
        Ok(inner.docs.get(path).cloned())
    }

    async fn create(&self, path: &str, doc: Value) -> Result<()> {
        let mut inner = self.lock();
        inner.begin("create", path)?;
        if inner.docs.contains_key(path) {
            return Err(Error::infra(
                ErrorKind::AlreadyExists,
                format!("document {} already exists", path),
            ));
        }
        inner.write(path, doc);
        Ok(())
    }

    async fn set(&self, path: &str, doc: Value) -> Result<()> {
        let mut inner = self.lock();
        inner.begin("set", path)?;
        inner.write(path, doc);
        Ok(())
    }

    async fn update(&self, path: &str, fields: Map<String, Value>) -> Result<()> {
        let mut inner = self.lock();
        inner.begin("update", path)?;
        let mut doc = match inner.docs.get(path) {
            Some(Value::Object(existing)) => existing.clone(),
            Some(_) => Map::new(),
            None => {
                return Err(Error::infra(
                    ErrorKind::NotFound,
                    format!("document {} not found", path),
                ))
            }
        };
        doc.extend(fields);
        inner.write(path, Value::Object(doc));
        Ok(())
    }

    async fn list(&self, collection: &str) -> Result<Map<String, Value>> {
        let mut inner = self.lock();
        inner.begin("list", collection)?;
        match inner.snapshot(collection) {
            Value::Object(map) => Ok(map),
            _ => Ok(Map::new()),
        }
    }

    async fn watch(&self, collection: &str) -> Result<Watch> {
        let mut inner = self.lock();
        inner.begin("watch", collection)?;
        if let Some(tx) = inner.watchers.get(collection) {
            return Ok(tx.subscribe());
        }
        let (tx, rx) = watch::channel(inner.snapshot(collection));
        inner.watchers.insert(collection.to_string(), tx);
        Ok(rx)
    }
}
