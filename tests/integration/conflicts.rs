//! Optimistic-concurrency behavior: bounded retry, conflict surfacing,
//! and isolation between concurrent writers on distinct records.

use super::support::{record, test_config, test_registry};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use vigil::error::{RegistryError, SubstrateError};
use vigil::record::{ServiceIdentity, Status};
use vigil::registry::Registry;
use vigil::substrate::{
    EventStream, KeyValueStream, LeaseId, MemorySubstrate, ReadResult, Substrate, SubstrateTxn,
    TxnResult,
};

/// Substrate that makes the next `failures` transactions lose their
/// guard, the way a racing writer would make them lose it
struct ContendedSubstrate {
    inner: MemorySubstrate,
    failures: AtomicU32,
}

impl ContendedSubstrate {
    fn failing(failures: u32) -> Arc<Self> {
        Arc::new(Self {
            inner: MemorySubstrate::new(),
            failures: AtomicU32::new(failures),
        })
    }
}

#[async_trait]
impl Substrate for ContendedSubstrate {
    async fn get(&self, key: &str) -> Result<ReadResult, SubstrateError> {
        self.inner.get(key).await
    }

    async fn get_prefix(&self, prefix: &str) -> Result<KeyValueStream, SubstrateError> {
        self.inner.get_prefix(prefix).await
    }

    async fn put(
        &self,
        key: &str,
        value: Vec<u8>,
        lease: Option<LeaseId>,
    ) -> Result<(), SubstrateError> {
        self.inner.put(key, value, lease).await
    }

    async fn delete(&self, key: &str) -> Result<(), SubstrateError> {
        self.inner.delete(key).await
    }

    async fn txn(&self, txn: SubstrateTxn) -> Result<TxnResult, SubstrateError> {
        let remaining = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if remaining {
            return Ok(TxnResult {
                succeeded: false,
                revision: self.inner.current_revision(),
            });
        }
        self.inner.txn(txn).await
    }

    async fn lease_grant(&self, ttl: Duration) -> Result<LeaseId, SubstrateError> {
        self.inner.lease_grant(ttl).await
    }

    async fn lease_revoke(&self, lease: LeaseId) -> Result<(), SubstrateError> {
        self.inner.lease_revoke(lease).await
    }

    async fn lease_keep_alive(&self, lease: LeaseId) -> Result<(), SubstrateError> {
        self.inner.lease_keep_alive(lease).await
    }

    async fn watch(
        &self,
        key: &str,
        from_revision: Option<i64>,
        cancel: CancellationToken,
    ) -> Result<EventStream, SubstrateError> {
        self.inner.watch(key, from_revision, cancel).await
    }
}

#[tokio::test]
async fn test_conflict_surfaces_after_exhausted_retries() {
    let substrate = ContendedSubstrate::failing(3);
    let registry = Registry::new(substrate, test_config());

    let rec = record("u1", "nova-compute", "node-1", "us-east", Status::Up);
    let result = registry.update(&rec).await;
    assert!(matches!(
        result,
        Err(RegistryError::Conflict { attempts: 3 })
    ));
}

#[tokio::test]
async fn test_lost_race_within_budget_retries_to_success() {
    let substrate = ContendedSubstrate::failing(2);
    let registry = Registry::new(substrate.clone(), test_config());

    let rec = record("u1", "nova-compute", "node-1", "us-east", Status::Up);
    let outcome = registry.update(&rec).await.unwrap();
    assert!(outcome.succeeded);

    // Leases granted for the two lost attempts were revoked; only the
    // winning attempt's lease survives
    let winning = outcome.lease.unwrap();
    assert!(substrate.inner.has_lease(winning));
    for lease in 1..winning {
        assert!(!substrate.inner.has_lease(lease), "lease {} leaked", lease);
    }
    assert!(registry.is_up(&ServiceIdentity::uuid("u1")).await.unwrap());
}

#[tokio::test]
async fn test_delete_conflict_also_surfaces() {
    let substrate = ContendedSubstrate::failing(0);
    let registry = Registry::new(substrate.clone(), test_config());
    let rec = record("u1", "nova-compute", "node-1", "us-east", Status::Down);
    registry.update(&rec).await.unwrap();

    substrate.failures.store(3, Ordering::SeqCst);
    let result = registry.delete(&ServiceIdentity::uuid("u1")).await;
    assert!(matches!(
        result,
        Err(RegistryError::Conflict { attempts: 3 })
    ));

    // The record survives the failed delete untouched
    substrate.failures.store(0, Ordering::SeqCst);
    assert!(registry
        .get_one(&ServiceIdentity::uuid("u1"))
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_concurrent_updates_to_distinct_uuids_never_interfere() {
    let (registry, _) = test_registry();

    let mut tasks = Vec::new();
    for uuid in ["a1", "b2", "c3", "d4"] {
        let registry = registry.clone();
        tasks.push(tokio::spawn(async move {
            for round in 0..25 {
                let status = if round % 2 == 0 { Status::Up } else { Status::Down };
                let host = format!("host-{}", uuid);
                let region = if round % 3 == 0 { "us-east" } else { "us-west" };
                let rec = record(uuid, "nova-compute", &host, region, status);
                registry.update(&rec).await.unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    // Every record ends at its own final state with consistent indexes
    for uuid in ["a1", "b2", "c3", "d4"] {
        let fetched = registry
            .get_one(&ServiceIdentity::uuid(uuid))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.status(), Status::Down);
        assert_eq!(fetched.region, "us-east");

        let host = format!("host-{}", uuid);
        let via_mapping = registry
            .get_one(&ServiceIdentity::type_host("nova-compute", &host))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(via_mapping.uuid, uuid);
        assert!(!registry.is_up(&ServiceIdentity::uuid(uuid)).await.unwrap());
    }
}
