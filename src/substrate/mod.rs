//! Key-Value Substrate Abstraction
//!
//! The registry keeps its state in a replicated, strongly consistent
//! key-value store with versioned keys, atomic multi-key transactions,
//! TTL leases, and key watches. This module defines the narrow slice of
//! that model the registry relies on; `etcd` adapts it onto a cluster and
//! `memory` provides a complete in-process implementation.

use crate::error::SubstrateError;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub mod etcd;
pub mod memory;

pub use etcd::EtcdSubstrate;
pub use memory::MemorySubstrate;

/// Lease identifier issued by the substrate
pub type LeaseId = i64;

/// A stored key with its version metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: String,
    pub value: Vec<u8>,
    /// Writes since the key was created; never 0 on a live key
    pub version: i64,
    /// Global revision of the last write to this key
    pub mod_revision: i64,
    pub lease: Option<LeaseId>,
}

/// Point-in-time read: the key, if present, and the revision the read
/// was served at
#[derive(Debug, Clone)]
pub struct ReadResult {
    pub kv: Option<KeyValue>,
    pub revision: i64,
}

/// Transaction guard: the key's version must equal `version`
/// (0 means the key must be absent)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionGuard {
    pub key: String,
    pub version: i64,
}

/// A single write inside a transaction
#[derive(Debug, Clone, PartialEq)]
pub enum TxnOp {
    Put {
        key: String,
        value: Vec<u8>,
        lease: Option<LeaseId>,
    },
    Delete {
        key: String,
    },
}

/// An atomic guarded transaction: when every guard holds the success ops
/// apply, otherwise the failure ops apply
#[derive(Debug, Clone, Default)]
pub struct SubstrateTxn {
    pub guards: Vec<VersionGuard>,
    pub success: Vec<TxnOp>,
    pub failure: Vec<TxnOp>,
}

/// Transaction outcome
#[derive(Debug, Clone)]
pub struct TxnResult {
    pub succeeded: bool,
    pub revision: i64,
}

/// Change kinds reported by a watch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Put,
    Delete,
}

/// One observed change on a watched key
#[derive(Debug, Clone)]
pub struct SubstrateEvent {
    pub key: String,
    pub kind: EventKind,
    /// Value after the change; empty for deletes
    pub value: Vec<u8>,
    pub revision: i64,
}

/// Streaming scan results
pub type KeyValueStream = Pin<Box<dyn Stream<Item = Result<KeyValue, SubstrateError>> + Send>>;

/// Streaming watch events
pub type EventStream = Pin<Box<dyn Stream<Item = Result<SubstrateEvent, SubstrateError>> + Send>>;

/// Operations the registry needs from a key-value substrate
#[async_trait]
pub trait Substrate: Send + Sync {
    /// Read a single key
    async fn get(&self, key: &str) -> Result<ReadResult, SubstrateError>;

    /// Scan every key under a prefix
    async fn get_prefix(&self, prefix: &str) -> Result<KeyValueStream, SubstrateError>;

    /// Write a key, optionally bound to a lease
    async fn put(
        &self,
        key: &str,
        value: Vec<u8>,
        lease: Option<LeaseId>,
    ) -> Result<(), SubstrateError>;

    /// Remove a key; removing an absent key is not an error
    async fn delete(&self, key: &str) -> Result<(), SubstrateError>;

    /// Apply a guarded transaction atomically
    async fn txn(&self, txn: SubstrateTxn) -> Result<TxnResult, SubstrateError>;

    /// Grant a new lease with the given time-to-live
    async fn lease_grant(&self, ttl: Duration) -> Result<LeaseId, SubstrateError>;

    /// Revoke a lease, deleting any keys still attached to it
    async fn lease_revoke(&self, lease: LeaseId) -> Result<(), SubstrateError>;

    /// Renew a lease once, resetting its time-to-live
    async fn lease_keep_alive(&self, lease: LeaseId) -> Result<(), SubstrateError>;

    /// Watch a single key for changes, starting at `from_revision`
    /// (`None` = only changes after now). The stream ends once `cancel`
    /// fires; a request into already-compacted history fails with
    /// [`SubstrateError::Compacted`].
    async fn watch(
        &self,
        key: &str,
        from_revision: Option<i64>,
        cancel: CancellationToken,
    ) -> Result<EventStream, SubstrateError>;
}
