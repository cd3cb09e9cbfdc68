#![allow(dead_code)]

use std::collections::HashSet;
use std::hash::Hash;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::Notify;

use classboardd::remote::{PersistedId, RemoteApi, RemoteError, Scope, WireRecord};

pub fn row<K, V>(key: K, value: V, persisted_id: Option<PersistedId>) -> WireRecord<K, V> {
    WireRecord {
        key,
        value,
        persisted_id,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Calls {
    pub fetch: usize,
    pub create: usize,
    pub update: usize,
}

impl Calls {
    pub fn writes(&self) -> usize {
        self.create + self.update
    }
}

struct FakeInner<K, V> {
    rows: Vec<WireRecord<K, V>>,
    fail_keys: HashSet<K>,
    fail_fetch: bool,
    next_id: PersistedId,
    calls: Calls,
    held: bool,
}

/// Scriptable stand-in for the remote persistence API: per-key write
/// failures, a fetch kill switch, call counting, and a hold/release gate so
/// tests can keep a write outstanding while they do something else.
pub struct FakeRemote<K, V> {
    inner: Mutex<FakeInner<K, V>>,
    gate: Notify,
}

impl<K, V> FakeRemote<K, V>
where
    K: Clone + Eq + Hash,
    V: Clone,
{
    pub fn new(rows: Vec<WireRecord<K, V>>) -> Self {
        let next_id = rows.iter().filter_map(|r| r.persisted_id).max().unwrap_or(0) + 1;
        Self {
            inner: Mutex::new(FakeInner {
                rows,
                fail_keys: HashSet::new(),
                fail_fetch: false,
                next_id,
                calls: Calls::default(),
                held: false,
            }),
            gate: Notify::new(),
        }
    }

    pub fn set_rows(&self, rows: Vec<WireRecord<K, V>>) {
        self.inner.lock().expect("fake lock").rows = rows;
    }

    pub fn fail_key(&self, key: K) {
        self.inner.lock().expect("fake lock").fail_keys.insert(key);
    }

    pub fn clear_failures(&self) {
        self.inner.lock().expect("fake lock").fail_keys.clear();
    }

    pub fn fail_fetch(&self, on: bool) {
        self.inner.lock().expect("fake lock").fail_fetch = on;
    }

    /// Park subsequent writes until `release` is called.
    pub fn hold(&self) {
        self.inner.lock().expect("fake lock").held = true;
    }

    pub fn release(&self) {
        self.inner.lock().expect("fake lock").held = false;
        self.gate.notify_waiters();
    }

    pub fn calls(&self) -> Calls {
        self.inner.lock().expect("fake lock").calls
    }

    pub fn stored_value(&self, key: &K) -> Option<V> {
        self.inner
            .lock()
            .expect("fake lock")
            .rows
            .iter()
            .find(|r| &r.key == key)
            .map(|r| r.value.clone())
    }

    pub fn stored_id(&self, key: &K) -> Option<PersistedId> {
        self.inner
            .lock()
            .expect("fake lock")
            .rows
            .iter()
            .find(|r| &r.key == key)
            .and_then(|r| r.persisted_id)
    }

    async fn wait_gate(&self) {
        loop {
            let notified = self.gate.notified();
            if !self.inner.lock().expect("fake lock").held {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl<K, V> RemoteApi<K, V> for FakeRemote<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    async fn fetch(&self, _scope: &Scope) -> Result<Vec<WireRecord<K, V>>, RemoteError> {
        let mut inner = self.inner.lock().expect("fake lock");
        inner.calls.fetch += 1;
        if inner.fail_fetch {
            return Err(RemoteError::status(500, "fetch unavailable"));
        }
        Ok(inner.rows.clone())
    }

    async fn create(&self, _scope: &Scope, key: &K, value: &V) -> Result<PersistedId, RemoteError> {
        // Count the call up front so a write parked at the gate still
        // registers as issued.
        self.inner.lock().expect("fake lock").calls.create += 1;
        self.wait_gate().await;
        let mut guard = self.inner.lock().expect("fake lock");
        let inner = &mut *guard;
        if inner.fail_keys.contains(key) {
            return Err(RemoteError::status(500, "create rejected"));
        }
        let id = inner.next_id;
        inner.next_id += 1;
        if let Some(existing) = inner.rows.iter_mut().find(|r| &r.key == key) {
            existing.value = value.clone();
            existing.persisted_id = Some(id);
        } else {
            inner.rows.push(WireRecord {
                key: key.clone(),
                value: value.clone(),
                persisted_id: Some(id),
            });
        }
        Ok(id)
    }

    async fn update(&self, _scope: &Scope, id: PersistedId, value: &V) -> Result<(), RemoteError> {
        self.inner.lock().expect("fake lock").calls.update += 1;
        self.wait_gate().await;
        let mut guard = self.inner.lock().expect("fake lock");
        let inner = &mut *guard;
        let Some(existing) = inner.rows.iter_mut().find(|r| r.persisted_id == Some(id)) else {
            return Err(RemoteError::status(404, "no such record"));
        };
        if inner.fail_keys.contains(&existing.key) {
            return Err(RemoteError::status(500, "update rejected"));
        }
        existing.value = value.clone();
        Ok(())
    }
}
