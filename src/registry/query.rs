//! Read-side operations.
//!
//! Lookups resolve an identity to a uuid, then hydrate the primary
//! record. Multi-record queries scan one index family and hydrate each
//! hit; an index entry whose primary vanished between the scan and the
//! hydration is silently skipped rather than surfaced as an error.

use crate::error::RegistryError;
use crate::keys::KeyNamespace;
use crate::record::{ServiceIdentity, ServiceRecord, Status};
use crate::registry::Registry;
use crate::substrate::Substrate;
use futures::{Stream, TryStreamExt};
use std::pin::Pin;
use std::sync::Arc;

/// Selector for [`Registry::get_many`]
#[derive(Debug, Clone)]
pub enum GetManyFilter {
    /// Every service registered in a region
    Region(String),
    /// Every service currently carrying this status marker
    Status(Status),
    /// Every host running a service type, optionally narrowed to hosts
    /// starting with a prefix
    TypeHost {
        service_type: String,
        host_prefix: Option<String>,
    },
}

pub type RecordStream = Pin<Box<dyn Stream<Item = Result<ServiceRecord, RegistryError>> + Send>>;

impl Registry {
    /// Map an identity to a uuid. A uuid identity passes through without
    /// an existence check; a type/host pair is resolved via its mapping
    /// entry.
    pub(crate) async fn resolve_uuid(
        &self,
        identity: &ServiceIdentity,
    ) -> Result<Option<String>, RegistryError> {
        match identity {
            ServiceIdentity::Uuid(uuid) => Ok(Some(uuid.clone())),
            ServiceIdentity::TypeHost { service_type, host } => {
                let key = self.namespace.by_type_host(service_type, host)?;
                let read = self.substrate.get(&key).await?;
                Ok(read
                    .kv
                    .map(|kv| String::from_utf8_lossy(&kv.value).into_owned()))
            }
        }
    }

    /// Fetch one record. Absence is `None`, not an error.
    pub async fn get_one(
        &self,
        identity: &ServiceIdentity,
    ) -> Result<Option<ServiceRecord>, RegistryError> {
        let Some(uuid) = self.resolve_uuid(identity).await? else {
            return Ok(None);
        };
        fetch_record(self.substrate.as_ref(), &self.namespace, &uuid).await
    }

    /// Liveness check: does the UP marker exist right now. Never decodes
    /// the record, so it stays cheap enough for hot paths.
    pub async fn is_up(&self, identity: &ServiceIdentity) -> Result<bool, RegistryError> {
        let Some(uuid) = self.resolve_uuid(identity).await? else {
            return Ok(false);
        };
        let key = self.namespace.by_status(Status::Up, &uuid)?;
        Ok(self.substrate.get(&key).await?.kv.is_some())
    }

    /// Stream every record matching `filter`, hydrated from the primary
    /// family in index order
    pub async fn get_many(&self, filter: GetManyFilter) -> Result<RecordStream, RegistryError> {
        let (prefix, uuid_in_value) = match &filter {
            GetManyFilter::Region(region) => (self.namespace.region_prefix(region)?, false),
            GetManyFilter::Status(status) => (self.namespace.status_prefix(*status)?, false),
            GetManyFilter::TypeHost {
                service_type,
                host_prefix,
            } => {
                let mut prefix = self.namespace.type_host_prefix(service_type)?;
                if let Some(host_prefix) = host_prefix {
                    if host_prefix.contains('/') {
                        return Err(RegistryError::Validation(format!(
                            "host prefix must not contain '/': {}",
                            host_prefix
                        )));
                    }
                    prefix.push_str(host_prefix);
                }
                (prefix, true)
            }
        };

        let scan = self.substrate.get_prefix(&prefix).await?;
        let substrate = Arc::clone(&self.substrate);
        let namespace = self.namespace.clone();
        let family_prefix = match &filter {
            // Host mappings may be scanned from a narrowed prefix, but the
            // uuid lives in the value, not the key
            GetManyFilter::TypeHost { .. } => String::new(),
            _ => prefix,
        };
        let stream = scan
            .map_err(RegistryError::from)
            .and_then(move |kv| {
                let substrate = Arc::clone(&substrate);
                let namespace = namespace.clone();
                let family_prefix = family_prefix.clone();
                async move {
                    let uuid = if uuid_in_value {
                        String::from_utf8_lossy(&kv.value).into_owned()
                    } else {
                        match kv.key.strip_prefix(&family_prefix) {
                            Some(uuid) => uuid.to_string(),
                            None => return Ok(None),
                        }
                    };
                    fetch_record(substrate.as_ref(), &namespace, &uuid).await
                }
            })
            .try_filter_map(|record| async move { Ok(record) });
        Ok(Box::pin(stream))
    }
}

/// Hydrate a record from its primary key
pub(crate) async fn fetch_record(
    substrate: &dyn Substrate,
    namespace: &KeyNamespace,
    uuid: &str,
) -> Result<Option<ServiceRecord>, RegistryError> {
    let key = namespace.by_uuid(uuid)?;
    let read = substrate.get(&key).await?;
    match read.kv {
        Some(kv) => Ok(Some(ServiceRecord::from_bytes(&kv.value)?)),
        None => Ok(None),
    }
}
