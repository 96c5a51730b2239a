//! Runtime configuration.
//!
//! Everything is sourced from `VIGIL_`-prefixed environment variables with
//! defaults that point at a local etcd, so a bare process works out of the
//! box. Tests included.

use crate::error::RegistryError;
use config::{Config, Environment};
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

/// Floor for the liveness TTL. Anything shorter churns leases faster
/// than a keep-alive loop can realistically refresh them.
const MIN_STATUS_TTL_SECS: u64 = 5;

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    /// Hostname of the etcd endpoint (`VIGIL_ETCD_HOST`)
    pub etcd_host: String,

    /// Client port of the etcd endpoint (`VIGIL_ETCD_PORT`)
    pub etcd_port: u16,

    /// Connect timeout in seconds (`VIGIL_ETCD_CONNECT_TIMEOUT`)
    pub etcd_connect_timeout: u64,

    /// Root segment prepended to every key (`VIGIL_KEY_NAMESPACE`).
    /// Empty means keys live directly under `/services`.
    pub key_namespace: String,

    /// Seconds an UP marker survives without a refresh (`VIGIL_STATUS_TTL`)
    pub status_ttl: u64,

    /// Attempts per guarded write before giving up (`VIGIL_TXN_RETRIES`)
    pub txn_retries: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            etcd_host: "localhost".to_string(),
            etcd_port: 2379,
            etcd_connect_timeout: 5,
            key_namespace: String::new(),
            status_ttl: 60,
            txn_retries: 3,
        }
    }
}

impl RegistryConfig {
    /// Load configuration from the environment, falling back to defaults
    /// for anything unset
    pub fn from_env() -> Result<Self, RegistryError> {
        let settings = Config::builder()
            .set_default("etcd_host", "localhost")?
            .set_default("etcd_port", 2379)?
            .set_default("etcd_connect_timeout", 5)?
            .set_default("key_namespace", "")?
            .set_default("status_ttl", 60)?
            .set_default("txn_retries", 3)?
            .add_source(Environment::with_prefix("VIGIL"))
            .build()?;
        let mut config: RegistryConfig = settings.try_deserialize()?;
        if config.status_ttl < MIN_STATUS_TTL_SECS {
            warn!(
                requested = config.status_ttl,
                floor = MIN_STATUS_TTL_SECS,
                "status TTL below floor, clamping"
            );
            config.status_ttl = MIN_STATUS_TTL_SECS;
        }
        if config.txn_retries == 0 {
            config.txn_retries = 1;
        }
        Ok(config)
    }

    pub fn endpoint(&self) -> String {
        format!("http://{}:{}", self.etcd_host, self.etcd_port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.etcd_connect_timeout)
    }

    /// TTL granted to liveness leases
    pub fn lease_ttl(&self) -> Duration {
        Duration::from_secs(self.status_ttl)
    }
}
