//! Key namespace management for registry records.
//!
//! Every record fans out to four key families under a common namespace
//! root:
//!
//! ```text
//! /<ns>/services/by-uuid/<uuid>                  full record
//! /<ns>/services/by-status/<STATUS>/<uuid>       liveness marker
//! /<ns>/services/by-type-host/<type>/<host>      value = uuid
//! /<ns>/services/by-region/<region>/<uuid>       marker
//! ```
//!
//! Builders are pure string work; anything that would corrupt the layout
//! (an empty segment, a `/` inside one) is rejected before it reaches the
//! substrate.

use crate::error::RegistryError;
use crate::record::{ServiceRecord, Status};

const SERVICES: &str = "services";
const BY_UUID: &str = "by-uuid";
const BY_STATUS: &str = "by-status";
const BY_TYPE_HOST: &str = "by-type-host";
const BY_REGION: &str = "by-region";

/// Builder for the key families of one registry namespace
#[derive(Debug, Clone)]
pub struct KeyNamespace {
    base: String,
}

/// The full key fan-out for a single record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordKeys {
    pub primary: String,
    pub type_host: String,
    /// Marker under the family matching the record's own status
    pub status: String,
    pub region: String,
}

impl KeyNamespace {
    /// Create a namespace rooted at `root`. An empty root places keys
    /// directly under `/services`; surrounding slashes are normalized away.
    pub fn new(root: &str) -> Self {
        let trimmed = root.trim_matches('/');
        let base = if trimmed.is_empty() {
            format!("/{}", SERVICES)
        } else {
            format!("/{}/{}", trimmed, SERVICES)
        };
        Self { base }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn by_uuid(&self, uuid: &str) -> Result<String, RegistryError> {
        Ok(format!("{}/{}/{}", self.base, BY_UUID, segment(uuid, "uuid")?))
    }

    pub fn by_type_host(&self, service_type: &str, host: &str) -> Result<String, RegistryError> {
        Ok(format!(
            "{}/{}/{}/{}",
            self.base,
            BY_TYPE_HOST,
            segment(service_type, "service type")?,
            segment(host, "host")?
        ))
    }

    pub fn by_status(&self, status: Status, uuid: &str) -> Result<String, RegistryError> {
        Ok(format!(
            "{}/{}/{}/{}",
            self.base,
            BY_STATUS,
            status_segment(status)?,
            segment(uuid, "uuid")?
        ))
    }

    pub fn by_region(&self, region: &str, uuid: &str) -> Result<String, RegistryError> {
        Ok(format!(
            "{}/{}/{}/{}",
            self.base,
            BY_REGION,
            segment(region, "region")?,
            segment(uuid, "uuid")?
        ))
    }

    /// Prefix covering every primary record key
    pub fn uuid_prefix(&self) -> String {
        format!("{}/{}/", self.base, BY_UUID)
    }

    /// Prefix covering every marker in one status family
    pub fn status_prefix(&self, status: Status) -> Result<String, RegistryError> {
        Ok(format!(
            "{}/{}/{}/",
            self.base,
            BY_STATUS,
            status_segment(status)?
        ))
    }

    /// Prefix covering every marker in one region
    pub fn region_prefix(&self, region: &str) -> Result<String, RegistryError> {
        Ok(format!(
            "{}/{}/{}/",
            self.base,
            BY_REGION,
            segment(region, "region")?
        ))
    }

    /// Prefix covering every host mapping for one service type
    pub fn type_host_prefix(&self, service_type: &str) -> Result<String, RegistryError> {
        Ok(format!(
            "{}/{}/{}/",
            self.base,
            BY_TYPE_HOST,
            segment(service_type, "service type")?
        ))
    }

    /// Build the full key fan-out for a record
    pub fn key_set(&self, record: &ServiceRecord) -> Result<RecordKeys, RegistryError> {
        Ok(RecordKeys {
            primary: self.by_uuid(&record.uuid)?,
            type_host: self.by_type_host(&record.service_type, &record.host)?,
            status: self.by_status(record.status(), &record.uuid)?,
            region: self.by_region(&record.region, &record.uuid)?,
        })
    }
}

fn segment<'a>(value: &'a str, what: &str) -> Result<&'a str, RegistryError> {
    if value.is_empty() {
        return Err(RegistryError::Validation(format!(
            "{} must not be empty",
            what
        )));
    }
    if value.contains('/') {
        return Err(RegistryError::Validation(format!(
            "{} must not contain '/': {}",
            what, value
        )));
    }
    Ok(value)
}

fn status_segment(status: Status) -> Result<&'static str, RegistryError> {
    match status {
        Status::Up | Status::Down => Ok(status.as_str()),
        Status::Unknown => Err(RegistryError::Validation(
            "status keys exist only for UP and DOWN".to_string(),
        )),
    }
}
