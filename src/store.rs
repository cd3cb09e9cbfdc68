use std::collections::{BTreeMap, HashSet};
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::join_all;
use thiserror::Error;
use tokio::sync::watch;

use crate::remote::{PersistedId, RemoteApi, RemoteError, Scope};

#[derive(Debug, Error)]
pub enum StoreError {
    /// Collection load failed; the previous collection is left untouched.
    #[error("collection load failed: {0}")]
    Fetch(RemoteError),
    /// A write failed. For single commits the local value has been reverted
    /// to the snapshot by the time this is returned.
    #[error("commit failed: {0}")]
    Commit(RemoteError),
    /// Rejected before any mutation; no state change.
    #[error("{0}")]
    Validation(String),
    /// The response belongs to a superseded scope and was discarded.
    #[error("response for a superseded scope")]
    StaleScope,
    #[error("no such record in the loaded collection")]
    UnknownKey,
    #[error("no collection loaded")]
    NoScope,
}

/// A record as exposed to callers. `value` is the last value the remote store
/// confirmed (the snapshot), `local_value` is what the user currently sees.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordView<K, V> {
    pub key: K,
    pub value: V,
    pub local_value: V,
    pub persisted_id: Option<PersistedId>,
    pub dirty: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome<K, V> {
    /// The record was clean; no network call was made.
    Clean(RecordView<K, V>),
    Committed(RecordView<K, V>),
    /// A commit for this key is already outstanding. The newest local value
    /// rides the next commit call instead of a re-issued write.
    Deferred,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommitSummary<K> {
    pub committed: Vec<K>,
    pub failed: Vec<(K, String)>,
}

impl<K> Default for CommitSummary<K> {
    fn default() -> Self {
        Self {
            committed: Vec::new(),
            failed: Vec::new(),
        }
    }
}

impl<K> CommitSummary<K> {
    pub fn clean(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RevertPolicy {
    /// Restore the snapshot value on failure (single-cell commits).
    Revert,
    /// Keep the rejected local value so the user can retry without
    /// re-entering it (bulk verify).
    Preserve,
}

struct Slot<V> {
    value: V,
    local_value: V,
    persisted_id: Option<PersistedId>,
}

impl<V: Clone + PartialEq> Slot<V> {
    fn dirty(&self) -> bool {
        self.local_value != self.value
    }

    fn view<K: Clone>(&self, key: &K) -> RecordView<K, V> {
        RecordView {
            key: key.clone(),
            value: self.value.clone(),
            local_value: self.local_value.clone(),
            persisted_id: self.persisted_id,
            dirty: self.dirty(),
        }
    }
}

struct Inner<K, V> {
    scope: Option<Scope>,
    /// Bumped on every load. Responses carrying an older generation are
    /// discarded instead of being applied to an unrelated collection.
    generation: u64,
    slots: BTreeMap<K, Slot<V>>,
    in_flight: HashSet<K>,
}

/// Reconciling edit store: a local mirror of one scoped record collection
/// plus the authoritative snapshot it was loaded from.
///
/// Cheap to clone; clones share the same collection. All I/O goes through the
/// injected [`RemoteApi`]. `set_local` is the only way user input enters, and
/// `commit`/`commit_all` are the only paths that write to the remote store.
pub struct EditStore<K, V> {
    inner: Arc<Mutex<Inner<K, V>>>,
    remote: Arc<dyn RemoteApi<K, V>>,
    changes: Arc<watch::Sender<u64>>,
}

impl<K, V> Clone for EditStore<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            remote: Arc::clone(&self.remote),
            changes: Arc::clone(&self.changes),
        }
    }
}

impl<K, V> EditStore<K, V>
where
    K: Clone + Ord + Hash,
    V: Clone + PartialEq,
{
    pub fn new(remote: Arc<dyn RemoteApi<K, V>>) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            inner: Arc::new(Mutex::new(Inner {
                scope: None,
                generation: 0,
                slots: BTreeMap::new(),
                in_flight: HashSet::new(),
            })),
            remote,
            changes: Arc::new(changes),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<K, V>> {
        self.inner.lock().expect("edit store lock")
    }

    fn touch(&self) {
        self.changes.send_modify(|rev| *rev += 1);
    }

    /// Revision signal for re-render triggers; bumps on every applied change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    /// Fetches the scope's records and replaces collection and snapshot
    /// atomically. On failure the previous collection is untouched. A load
    /// that was superseded by a newer one discards its own response.
    pub async fn load(&self, scope: Scope) -> Result<(), StoreError> {
        let generation = {
            let mut inner = self.lock();
            inner.generation += 1;
            // Navigating invalidates outstanding writes immediately; their
            // responses will fail the generation check and be discarded.
            inner.in_flight.clear();
            inner.generation
        };

        let fetched = self
            .remote
            .fetch(&scope)
            .await
            .map_err(StoreError::Fetch)?;

        {
            let mut inner = self.lock();
            if inner.generation != generation {
                return Err(StoreError::StaleScope);
            }
            inner.slots = fetched
                .into_iter()
                .map(|rec| {
                    (
                        rec.key,
                        Slot {
                            value: rec.value.clone(),
                            local_value: rec.value,
                            persisted_id: rec.persisted_id,
                        },
                    )
                })
                .collect();
            inner.scope = Some(scope);
        }
        self.touch();
        Ok(())
    }

    /// Pure local mutation; never performs I/O. Validation is an adapter
    /// concern and happens before this is called.
    pub fn set_local(&self, key: &K, value: V) -> Result<(), StoreError> {
        {
            let mut inner = self.lock();
            let slot = inner.slots.get_mut(key).ok_or(StoreError::UnknownKey)?;
            slot.local_value = value;
        }
        self.touch();
        Ok(())
    }

    pub fn display_value(&self, key: &K) -> Option<V> {
        self.lock().slots.get(key).map(|s| s.local_value.clone())
    }

    pub fn is_dirty(&self, key: &K) -> bool {
        self.lock().slots.get(key).map(|s| s.dirty()).unwrap_or(false)
    }

    pub fn record(&self, key: &K) -> Option<RecordView<K, V>> {
        self.lock().slots.get(key).map(|s| s.view(key))
    }

    pub fn records(&self) -> Vec<RecordView<K, V>> {
        self.lock()
            .slots
            .iter()
            .map(|(k, s)| s.view(k))
            .collect()
    }

    pub fn keys(&self) -> Vec<K> {
        self.lock().slots.keys().cloned().collect()
    }

    pub fn scope(&self) -> Option<Scope> {
        self.lock().scope
    }

    /// True if any record in the collection has a row in the remote store.
    pub fn has_persisted(&self) -> bool {
        self.lock().slots.values().any(|s| s.persisted_id.is_some())
    }

    /// Commits one record. Clean records are a no-op success; failure reverts
    /// the local value to the snapshot.
    pub async fn commit(&self, key: &K) -> Result<CommitOutcome<K, V>, StoreError> {
        self.commit_with(key, RevertPolicy::Revert).await
    }

    async fn commit_with(
        &self,
        key: &K,
        policy: RevertPolicy,
    ) -> Result<CommitOutcome<K, V>, StoreError> {
        let (generation, scope, local, persisted_id) = {
            let mut inner = self.lock();
            let scope = inner.scope.ok_or(StoreError::NoScope)?;
            if inner.in_flight.contains(key) {
                return Ok(CommitOutcome::Deferred);
            }
            let slot = inner.slots.get(key).ok_or(StoreError::UnknownKey)?;
            if !slot.dirty() {
                return Ok(CommitOutcome::Clean(slot.view(key)));
            }
            let local = slot.local_value.clone();
            let persisted_id = slot.persisted_id;
            inner.in_flight.insert(key.clone());
            (inner.generation, scope, local, persisted_id)
        };

        let result = match persisted_id {
            Some(id) => self.remote.update(&scope, id, &local).await.map(|_| id),
            None => self.remote.create(&scope, key, &local).await,
        };

        let outcome = {
            let mut inner = self.lock();
            if inner.generation != generation {
                // The scope moved on while this write was outstanding. The
                // collection it belonged to is gone; drop the response.
                return Err(StoreError::StaleScope);
            }
            inner.in_flight.remove(key);
            let slot = inner.slots.get_mut(key).ok_or(StoreError::UnknownKey)?;
            match result {
                Ok(id) => {
                    slot.persisted_id = Some(id);
                    // The snapshot advances to the value that was sent, not
                    // to `local_value`: an edit that landed mid-flight stays
                    // dirty and rides the next commit.
                    slot.value = local;
                    Ok(CommitOutcome::Committed(slot.view(key)))
                }
                Err(e) => {
                    if policy == RevertPolicy::Revert {
                        slot.local_value = slot.value.clone();
                    }
                    Err(StoreError::Commit(e))
                }
            }
        };
        self.touch();
        outcome
    }

    /// Commits every dirty record in the scope, concurrently, and aggregates
    /// the per-key results. Successful records keep their advanced state even
    /// when siblings fail; failing records keep their local value for retry.
    pub async fn commit_all(&self) -> Result<CommitSummary<K>, StoreError> {
        let dirty_keys: Vec<K> = {
            let inner = self.lock();
            inner.scope.ok_or(StoreError::NoScope)?;
            inner
                .slots
                .iter()
                .filter(|(k, s)| s.dirty() && !inner.in_flight.contains(*k))
                .map(|(k, _)| k.clone())
                .collect()
        };

        let commits = dirty_keys
            .iter()
            .map(|k| self.commit_with(k, RevertPolicy::Preserve));
        let results = join_all(commits).await;

        let mut summary = CommitSummary::default();
        for (key, result) in dirty_keys.into_iter().zip(results) {
            match result {
                Ok(CommitOutcome::Committed(_)) | Ok(CommitOutcome::Clean(_)) => {
                    summary.committed.push(key);
                }
                // Raced with an individual commit; that one carries the value.
                Ok(CommitOutcome::Deferred) => {}
                Err(StoreError::StaleScope) => return Err(StoreError::StaleScope),
                Err(StoreError::Commit(remote)) => summary.failed.push((key, remote.message)),
                Err(other) => summary.failed.push((key, other.to_string())),
            }
        }
        Ok(summary)
    }
}
