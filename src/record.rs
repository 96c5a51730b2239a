//! Service record wire type, status handling, and identity selectors.
//!
//! Records are stored as field-tagged protobuf messages so writers and
//! readers on different versions interoperate: unknown fields are skipped
//! on decode and absent fields fall back to their defaults.

use crate::error::RegistryError;
use prost::Message;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Liveness status of a registered service
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum Status {
    /// Wire default only; never valid on a stored record
    Unknown = 0,
    Up = 1,
    Down = 2,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Unknown => "UNKNOWN",
            Status::Up => "UP",
            Status::Down => "DOWN",
        }
    }

    /// Decode a wire value, mapping anything unrecognized to `Unknown`
    pub fn from_wire(value: i32) -> Status {
        match value {
            1 => Status::Up,
            2 => Status::Down,
            _ => Status::Unknown,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("up") {
            Ok(Status::Up)
        } else if s.eq_ignore_ascii_case("down") {
            Ok(Status::Down)
        } else if s.eq_ignore_ascii_case("unknown") {
            Ok(Status::Unknown)
        } else {
            Err(RegistryError::Validation(format!(
                "unrecognized status: {}",
                s
            )))
        }
    }
}

/// A single service registration
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ServiceRecord {
    /// Stable identifier, assigned on first registration
    #[prost(string, tag = "1")]
    pub uuid: String,
    /// Functional classification, e.g. "nova-compute"
    #[prost(string, tag = "2")]
    pub service_type: String,
    #[prost(int32, tag = "3")]
    pub status: i32,
    /// Host the service instance runs on
    #[prost(string, tag = "4")]
    pub host: String,
    #[prost(string, tag = "5")]
    pub region: String,
    /// Operator note attached when the service is taken down
    #[prost(string, tag = "6")]
    pub maintenance_note: String,
    /// Maintenance window start, seconds since the epoch (0 = unset)
    #[prost(int64, tag = "7")]
    pub maintenance_start: i64,
    /// Maintenance window end, seconds since the epoch (0 = unset)
    #[prost(int64, tag = "8")]
    pub maintenance_end: i64,
}

impl ServiceRecord {
    pub fn status(&self) -> Status {
        Status::from_wire(self.status)
    }

    pub fn set_status(&mut self, status: Status) {
        self.status = status as i32;
    }

    /// Reject records that cannot be stored: status must be UP or DOWN
    pub fn validate(&self) -> Result<(), RegistryError> {
        match self.status() {
            Status::Up | Status::Down => Ok(()),
            Status::Unknown => Err(RegistryError::Validation(
                "status must be UP or DOWN".to_string(),
            )),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode_to_vec()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RegistryError> {
        Ok(Self::decode(bytes)?)
    }
}

/// Generate a fresh record identifier (hex, no hyphens)
pub fn generate_uuid() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Maintenance window details attached when a service goes down
#[derive(Debug, Clone, Default)]
pub struct Maintenance {
    pub note: String,
    /// Seconds since the epoch; defaults to now when a note is set
    pub start: Option<i64>,
    /// Seconds since the epoch; 0 leaves the window open-ended
    pub end: Option<i64>,
}

/// Selector naming a single service, either directly by uuid or by its
/// type and host pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceIdentity {
    Uuid(String),
    TypeHost { service_type: String, host: String },
}

impl ServiceIdentity {
    pub fn uuid(uuid: impl Into<String>) -> Self {
        ServiceIdentity::Uuid(uuid.into())
    }

    pub fn type_host(service_type: impl Into<String>, host: impl Into<String>) -> Self {
        ServiceIdentity::TypeHost {
            service_type: service_type.into(),
            host: host.into(),
        }
    }
}

impl fmt::Display for ServiceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceIdentity::Uuid(uuid) => write!(f, "uuid {}", uuid),
            ServiceIdentity::TypeHost { service_type, host } => {
                write!(f, "{} on {}", service_type, host)
            }
        }
    }
}
