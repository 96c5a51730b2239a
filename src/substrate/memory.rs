//! In-process substrate with full transaction, lease, and watch semantics.
//!
//! Backs the test suite and doubles as an embeddable fake. State lives
//! behind one lock; every committed change gets a global revision, fans
//! out to matching watchers, and lands in a replayable history so watches
//! can start from an earlier revision. Leases expire lazily: the next
//! operation purges anything past its deadline and emits the deletes.

use crate::error::SubstrateError;
use crate::substrate::{
    EventKind, EventStream, KeyValue, KeyValueStream, LeaseId, ReadResult, Substrate,
    SubstrateEvent, SubstrateTxn, TxnOp, TxnResult, VersionGuard,
};
use async_trait::async_trait;
use futures::stream;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    mod_revision: i64,
    version: i64,
    lease: Option<LeaseId>,
}

struct LeaseState {
    ttl: Duration,
    expires_at: Instant,
    keys: HashSet<String>,
}

struct Watcher {
    id: u64,
    key: String,
    from: i64,
    sender: mpsc::UnboundedSender<Result<SubstrateEvent, SubstrateError>>,
}

#[derive(Default)]
struct MemoryState {
    revision: i64,
    entries: BTreeMap<String, Entry>,
    leases: HashMap<LeaseId, LeaseState>,
    watchers: Vec<Watcher>,
    history: Vec<SubstrateEvent>,
    compacted: i64,
    next_lease: i64,
    next_watcher: u64,
}

impl MemoryState {
    /// Remove leases past their deadline along with their keys
    fn purge_expired(&mut self, now: Instant) {
        let expired: Vec<LeaseId> = self
            .leases
            .iter()
            .filter(|(_, lease)| lease.expires_at <= now)
            .map(|(id, _)| *id)
            .collect();
        for id in expired {
            if let Some(lease) = self.leases.remove(&id) {
                let mut keys: Vec<String> = lease.keys.into_iter().collect();
                keys.sort();
                if keys.is_empty() {
                    continue;
                }
                self.revision += 1;
                let revision = self.revision;
                for key in keys {
                    self.entries.remove(&key);
                    self.emit(SubstrateEvent {
                        key,
                        kind: EventKind::Delete,
                        value: Vec::new(),
                        revision,
                    });
                }
            }
        }
    }

    /// Record an event in history and fan it out to interested watchers.
    /// Watchers whose receiver is gone are dropped here.
    fn emit(&mut self, event: SubstrateEvent) {
        self.watchers.retain(|watcher| {
            if watcher.key == event.key && event.revision >= watcher.from {
                watcher.sender.send(Ok(event.clone())).is_ok()
            } else {
                true
            }
        });
        self.history.push(event);
    }

    fn guard_holds(&self, guard: &VersionGuard) -> bool {
        let version = self
            .entries
            .get(&guard.key)
            .map(|entry| entry.version)
            .unwrap_or(0);
        version == guard.version
    }

    fn apply_put(&mut self, key: String, value: Vec<u8>, lease: Option<LeaseId>, revision: i64) {
        let old_lease = self.entries.get(&key).and_then(|entry| entry.lease);
        if let Some(old) = old_lease {
            if Some(old) != lease {
                if let Some(state) = self.leases.get_mut(&old) {
                    state.keys.remove(&key);
                }
            }
        }
        match self.entries.get_mut(&key) {
            Some(entry) => {
                entry.value = value.clone();
                entry.mod_revision = revision;
                entry.version += 1;
                entry.lease = lease;
            }
            None => {
                self.entries.insert(
                    key.clone(),
                    Entry {
                        value: value.clone(),
                        mod_revision: revision,
                        version: 1,
                        lease,
                    },
                );
            }
        }
        if let Some(id) = lease {
            if let Some(state) = self.leases.get_mut(&id) {
                state.keys.insert(key.clone());
            }
        }
        self.emit(SubstrateEvent {
            key,
            kind: EventKind::Put,
            value,
            revision,
        });
    }

    fn apply_delete(&mut self, key: String, revision: i64) -> bool {
        match self.entries.remove(&key) {
            Some(entry) => {
                if let Some(id) = entry.lease {
                    if let Some(state) = self.leases.get_mut(&id) {
                        state.keys.remove(&key);
                    }
                }
                self.emit(SubstrateEvent {
                    key,
                    kind: EventKind::Delete,
                    value: Vec::new(),
                    revision,
                });
                true
            }
            None => false,
        }
    }
}

fn make_kv(key: &str, entry: &Entry) -> KeyValue {
    KeyValue {
        key: key.to_string(),
        value: entry.value.clone(),
        version: entry.version,
        mod_revision: entry.mod_revision,
        lease: entry.lease,
    }
}

/// Single-process substrate implementation
#[derive(Clone)]
pub struct MemorySubstrate {
    state: Arc<Mutex<MemoryState>>,
}

impl MemorySubstrate {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
        }
    }

    /// Discard replayable history below `revision`; watches starting
    /// earlier fail with [`SubstrateError::Compacted`]
    pub fn compact(&self, revision: i64) {
        let mut state = self.state.lock();
        state.compacted = revision;
        state.history.retain(|event| event.revision >= revision);
    }

    pub fn has_lease(&self, lease: LeaseId) -> bool {
        let mut state = self.state.lock();
        state.purge_expired(Instant::now());
        state.leases.contains_key(&lease)
    }

    pub fn watcher_count(&self) -> usize {
        self.state.lock().watchers.len()
    }

    pub fn current_revision(&self) -> i64 {
        self.state.lock().revision
    }
}

impl Default for MemorySubstrate {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Substrate for MemorySubstrate {
    async fn get(&self, key: &str) -> Result<ReadResult, SubstrateError> {
        let mut state = self.state.lock();
        state.purge_expired(Instant::now());
        let kv = state.entries.get(key).map(|entry| make_kv(key, entry));
        Ok(ReadResult {
            kv,
            revision: state.revision,
        })
    }

    async fn get_prefix(&self, prefix: &str) -> Result<KeyValueStream, SubstrateError> {
        let mut state = self.state.lock();
        state.purge_expired(Instant::now());
        let items: Vec<Result<KeyValue, SubstrateError>> = state
            .entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, entry)| Ok(make_kv(key, entry)))
            .collect();
        Ok(Box::pin(stream::iter(items)))
    }

    async fn put(
        &self,
        key: &str,
        value: Vec<u8>,
        lease: Option<LeaseId>,
    ) -> Result<(), SubstrateError> {
        let mut state = self.state.lock();
        state.purge_expired(Instant::now());
        if let Some(id) = lease {
            if !state.leases.contains_key(&id) {
                return Err(SubstrateError::LeaseNotFound);
            }
        }
        state.revision += 1;
        let revision = state.revision;
        state.apply_put(key.to_string(), value, lease, revision);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), SubstrateError> {
        let mut state = self.state.lock();
        state.purge_expired(Instant::now());
        if state.entries.contains_key(key) {
            state.revision += 1;
            let revision = state.revision;
            state.apply_delete(key.to_string(), revision);
        }
        Ok(())
    }

    async fn txn(&self, txn: SubstrateTxn) -> Result<TxnResult, SubstrateError> {
        let mut state = self.state.lock();
        state.purge_expired(Instant::now());
        let succeeded = txn.guards.iter().all(|guard| state.guard_holds(guard));
        let ops = if succeeded { txn.success } else { txn.failure };
        // Validate before applying anything so a bad op cannot leave a
        // partially applied transaction behind
        for op in &ops {
            if let TxnOp::Put {
                lease: Some(id), ..
            } = op
            {
                if !state.leases.contains_key(id) {
                    return Err(SubstrateError::LeaseNotFound);
                }
            }
        }
        if !ops.is_empty() {
            state.revision += 1;
            let revision = state.revision;
            for op in ops {
                match op {
                    TxnOp::Put { key, value, lease } => {
                        state.apply_put(key, value, lease, revision)
                    }
                    TxnOp::Delete { key } => {
                        state.apply_delete(key, revision);
                    }
                }
            }
        }
        Ok(TxnResult {
            succeeded,
            revision: state.revision,
        })
    }

    async fn lease_grant(&self, ttl: Duration) -> Result<LeaseId, SubstrateError> {
        let mut state = self.state.lock();
        state.purge_expired(Instant::now());
        state.next_lease += 1;
        let id = state.next_lease;
        state.leases.insert(
            id,
            LeaseState {
                ttl,
                expires_at: Instant::now() + ttl,
                keys: HashSet::new(),
            },
        );
        Ok(id)
    }

    async fn lease_revoke(&self, lease: LeaseId) -> Result<(), SubstrateError> {
        let mut state = self.state.lock();
        state.purge_expired(Instant::now());
        let lease_state = state
            .leases
            .remove(&lease)
            .ok_or(SubstrateError::LeaseNotFound)?;
        let mut keys: Vec<String> = lease_state.keys.into_iter().collect();
        keys.sort();
        if !keys.is_empty() {
            state.revision += 1;
            let revision = state.revision;
            for key in keys {
                state.apply_delete(key, revision);
            }
        }
        Ok(())
    }

    async fn lease_keep_alive(&self, lease: LeaseId) -> Result<(), SubstrateError> {
        let mut state = self.state.lock();
        state.purge_expired(Instant::now());
        let now = Instant::now();
        match state.leases.get_mut(&lease) {
            Some(lease_state) => {
                lease_state.expires_at = now + lease_state.ttl;
                Ok(())
            }
            None => Err(SubstrateError::LeaseNotFound),
        }
    }

    async fn watch(
        &self,
        key: &str,
        from_revision: Option<i64>,
        cancel: CancellationToken,
    ) -> Result<EventStream, SubstrateError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id;
        {
            let mut state = self.state.lock();
            state.purge_expired(Instant::now());
            let from = from_revision.unwrap_or(state.revision + 1);
            if state.compacted > 0 && from < state.compacted {
                return Err(SubstrateError::Compacted {
                    compact_revision: state.compacted,
                });
            }
            // Replay history inside the window, then register for live
            // events; both under the lock so nothing is missed or doubled
            for event in &state.history {
                if event.key == key && event.revision >= from {
                    let _ = tx.send(Ok(event.clone()));
                }
            }
            state.next_watcher += 1;
            id = state.next_watcher;
            state.watchers.push(Watcher {
                id,
                key: key.to_string(),
                from,
                sender: tx,
            });
        }

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let state = Arc::clone(&self.state);
        let mut rx = rx;
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    item = rx.recv() => match item {
                        Some(event) => {
                            if out_tx.send(event).is_err() {
                                break;
                            }
                        }
                        None => break,
                    },
                }
            }
            state.lock().watchers.retain(|watcher| watcher.id != id);
        });
        Ok(Box::pin(UnboundedReceiverStream::new(out_rx)))
    }
}
