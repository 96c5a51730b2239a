//! Shared helpers for registry integration tests.
//!
//! Every test runs against a fresh `MemorySubstrate` under its own
//! namespace, so there is no cross-test state and no external process.

use std::sync::Arc;
use vigil::config::RegistryConfig;
use vigil::record::{ServiceRecord, Status};
use vigil::registry::Registry;
use vigil::substrate::MemorySubstrate;

pub fn test_config() -> RegistryConfig {
    RegistryConfig {
        key_namespace: "test".to_string(),
        status_ttl: 60,
        txn_retries: 3,
        ..RegistryConfig::default()
    }
}

/// Registry over a fresh in-process substrate, plus the substrate itself
/// for direct state inspection
pub fn test_registry() -> (Registry, Arc<MemorySubstrate>) {
    let substrate = Arc::new(MemorySubstrate::new());
    let registry = Registry::new(substrate.clone(), test_config());
    (registry, substrate)
}

pub fn record(
    uuid: &str,
    service_type: &str,
    host: &str,
    region: &str,
    status: Status,
) -> ServiceRecord {
    let mut record = ServiceRecord {
        uuid: uuid.to_string(),
        service_type: service_type.to_string(),
        host: host.to_string(),
        region: region.to_string(),
        ..Default::default()
    };
    record.set_status(status);
    record
}

/// Advance paused tokio time in steps, yielding between steps so
/// background tasks (lease keepers, watch forwarders) get to run
pub async fn advance_secs(total: u64) {
    let step = std::time::Duration::from_secs(1);
    for _ in 0..total {
        tokio::time::advance(step).await;
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    }
}
