//! Service liveness registry.
//!
//! A [`Registry`] maintains one record per service instance plus three
//! derived index entries (type/host mapping, status marker, region
//! marker), all kept consistent through guarded transactions on the
//! primary key. UP markers are lease-bound so they vanish when their
//! owner stops refreshing; DOWN markers are plain keys that stay until
//! rewritten or deleted.
//!
//! Writers that lose a guarded transaction retry against a fresh read, a
//! bounded number of times, then report the conflict instead of looping.

pub mod lease;
pub mod notify;
pub mod query;
pub mod txn;

pub use lease::LeaseKeeper;
pub use notify::{ChangeEvent, ServiceWatch, WatchCanceller};
pub use query::{GetManyFilter, RecordStream};
pub use txn::UpdateOutcome;

use crate::config::RegistryConfig;
use crate::error::RegistryError;
use crate::keys::KeyNamespace;
use crate::record::{generate_uuid, Maintenance, ServiceIdentity, ServiceRecord, Status};
use crate::substrate::{EtcdSubstrate, LeaseId, Substrate};
use std::sync::Arc;
use tracing::{debug, info};

/// Handle to the registry, cheap to clone and share across tasks
#[derive(Clone)]
pub struct Registry {
    pub(crate) substrate: Arc<dyn Substrate>,
    pub(crate) namespace: KeyNamespace,
    pub(crate) config: RegistryConfig,
}

impl Registry {
    pub fn new(substrate: Arc<dyn Substrate>, config: RegistryConfig) -> Self {
        let namespace = KeyNamespace::new(&config.key_namespace);
        Self {
            substrate,
            namespace,
            config,
        }
    }

    /// Connect to the etcd endpoint named by `config`
    pub async fn connect(config: RegistryConfig) -> Result<Self, RegistryError> {
        let substrate = EtcdSubstrate::connect(&config).await?;
        Ok(Self::new(Arc::new(substrate), config))
    }

    pub fn namespace(&self) -> &KeyNamespace {
        &self.namespace
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Spawn a refresh loop keeping `lease` alive until stopped. Services
    /// run one of these between [`Registry::update`] and shutdown.
    pub fn keep_alive(&self, lease: LeaseId) -> LeaseKeeper {
        LeaseKeeper::spawn(Arc::clone(&self.substrate), lease, self.config.lease_ttl())
    }

    /// Write `record` and its index entries as one atomic transaction.
    ///
    /// A record without a uuid gets a fresh one, returned in the outcome.
    /// When the record's status is UP a new lease backs the UP marker and
    /// the outcome carries its id; the caller is expected to keep it
    /// refreshed. Rewriting a DOWN record with identical contents is a
    /// recognized no-op.
    pub async fn update(&self, record: &ServiceRecord) -> Result<UpdateOutcome, RegistryError> {
        let mut record = record.clone();
        if record.uuid.is_empty() {
            record.uuid = generate_uuid();
        }
        record.validate()?;
        let keys = self.namespace.key_set(&record)?;
        let bytes = record.to_bytes();
        let up = record.status() == Status::Up;
        let uuid = record.uuid.clone();

        let mut attempt = 0;
        loop {
            attempt += 1;
            let read = self.substrate.get(&keys.primary).await?;
            let existing = match &read.kv {
                Some(kv) => Some((ServiceRecord::from_bytes(&kv.value)?, kv.version)),
                None => None,
            };

            if let Some((existing_record, _)) = &existing {
                if !up && *existing_record == record {
                    return Ok(UpdateOutcome::no_op(uuid, read.revision));
                }
            }

            // When an UP record is being taken down, the marker's lease
            // outlives the transaction; remember it so it can be revoked
            // after the commit
            let old_up_lease = match &existing {
                Some((existing_record, _))
                    if existing_record.status() == Status::Up && !up =>
                {
                    let up_key = self.namespace.by_status(Status::Up, &uuid)?;
                    self.substrate.get(&up_key).await?.kv.and_then(|kv| kv.lease)
                }
                _ => None,
            };

            let lease = if up {
                Some(
                    lease::grant_status_lease(self.substrate.as_ref(), self.config.lease_ttl())
                        .await?,
                )
            } else {
                None
            };

            let plan = match &existing {
                Some((existing_record, version)) => {
                    let old_keys = self.namespace.key_set(existing_record)?;
                    txn::plan_replace(&old_keys, &keys, &uuid, bytes.clone(), *version, lease)
                }
                None => txn::plan_create(&keys, &uuid, bytes.clone(), lease),
            };
            let ops = plan.success.len();
            let result = self.substrate.txn(plan).await?;
            if result.succeeded {
                if let Some(old) = old_up_lease {
                    lease::revoke_status_lease(self.substrate.as_ref(), old).await?;
                }
                info!(uuid = %uuid, status = %record.status(), "service record written");
                return Ok(UpdateOutcome::success(uuid, ops, lease, result.revision));
            }

            // Lost the race; drop the lease granted for this attempt
            if let Some(granted) = lease {
                let _ = lease::revoke_status_lease(self.substrate.as_ref(), granted).await;
            }
            if attempt >= self.config.txn_retries {
                return Err(RegistryError::Conflict { attempts: attempt });
            }
            debug!(uuid = %uuid, attempt, "write conflicted, retrying");
        }
    }

    /// Mark a service DOWN, optionally recording why.
    ///
    /// The stored record is fetched, flipped, and written back through
    /// [`Registry::update`], so the UP marker and its lease are released
    /// the same way any other status change releases them.
    pub async fn down(
        &self,
        identity: &ServiceIdentity,
        maintenance: Option<Maintenance>,
    ) -> Result<UpdateOutcome, RegistryError> {
        let mut record = self
            .get_one(identity)
            .await?
            .ok_or_else(|| RegistryError::NotFound(identity.to_string()))?;
        record.set_status(Status::Down);
        if let Some(maintenance) = maintenance {
            record.maintenance_note = maintenance.note;
            record.maintenance_start = maintenance
                .start
                .unwrap_or_else(|| chrono::Utc::now().timestamp());
            if let Some(end) = maintenance.end {
                record.maintenance_end = end;
            }
        }
        self.update(&record).await
    }

    /// Remove a record and every index entry derived from it. Deleting a
    /// service that does not exist is a no-op, not an error.
    pub async fn delete(&self, identity: &ServiceIdentity) -> Result<UpdateOutcome, RegistryError> {
        let Some(uuid) = self.resolve_uuid(identity).await? else {
            return Ok(UpdateOutcome::no_op(String::new(), 0));
        };
        let primary = self.namespace.by_uuid(&uuid)?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let read = self.substrate.get(&primary).await?;
            let Some(kv) = read.kv else {
                return Ok(UpdateOutcome::no_op(uuid, read.revision));
            };
            let existing = ServiceRecord::from_bytes(&kv.value)?;
            let old_up_lease = if existing.status() == Status::Up {
                let up_key = self.namespace.by_status(Status::Up, &uuid)?;
                self.substrate.get(&up_key).await?.kv.and_then(|kv| kv.lease)
            } else {
                None
            };
            let plan = txn::plan_delete(&self.namespace, &existing, kv.version)?;
            let ops = plan.success.len();
            let result = self.substrate.txn(plan).await?;
            if result.succeeded {
                if let Some(old) = old_up_lease {
                    lease::revoke_status_lease(self.substrate.as_ref(), old).await?;
                }
                info!(uuid = %uuid, "service record deleted");
                return Ok(UpdateOutcome::success(uuid, ops, None, result.revision));
            }
            if attempt >= self.config.txn_retries {
                return Err(RegistryError::Conflict { attempts: attempt });
            }
            debug!(uuid = %uuid, attempt, "delete conflicted, retrying");
        }
    }

    /// Re-bind a service's UP marker to a fresh lease without rewriting
    /// the record. Fails when the service is unknown or not UP.
    pub async fn heartbeat(
        &self,
        identity: &ServiceIdentity,
    ) -> Result<UpdateOutcome, RegistryError> {
        let uuid = self
            .resolve_uuid(identity)
            .await?
            .ok_or_else(|| RegistryError::NotFound(identity.to_string()))?;
        let primary = self.namespace.by_uuid(&uuid)?;
        let status_key = self.namespace.by_status(Status::Up, &uuid)?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let read = self.substrate.get(&primary).await?;
            let Some(kv) = read.kv else {
                return Err(RegistryError::NotFound(identity.to_string()));
            };
            let existing = ServiceRecord::from_bytes(&kv.value)?;
            if existing.status() != Status::Up {
                return Err(RegistryError::Validation(format!(
                    "cannot heartbeat {}: record is {}",
                    uuid,
                    existing.status()
                )));
            }
            let lease =
                lease::grant_status_lease(self.substrate.as_ref(), self.config.lease_ttl())
                    .await?;
            let plan = txn::plan_refresh(primary.clone(), kv.version, status_key.clone(), lease);
            let result = self.substrate.txn(plan).await?;
            if result.succeeded {
                debug!(uuid = %uuid, lease, "heartbeat refreshed");
                return Ok(UpdateOutcome::success(uuid, 1, Some(lease), result.revision));
            }
            let _ = lease::revoke_status_lease(self.substrate.as_ref(), lease).await;
            if attempt >= self.config.txn_retries {
                return Err(RegistryError::Conflict { attempts: attempt });
            }
            debug!(uuid = %uuid, attempt, "heartbeat conflicted, retrying");
        }
    }
}
