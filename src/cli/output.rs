//! CLI output: error mapping from registry errors to a stable CLI surface.

use crate::error::RegistryError;

/// Map registry errors to a message for CLI output.
pub fn map_error(e: &RegistryError) -> String {
    format!("Error: {}", e)
}

/// Process exit code per error category, stable for scripting.
pub fn exit_code(e: &RegistryError) -> i32 {
    match e {
        RegistryError::Validation(_) => 2,
        RegistryError::NotFound(_) => 3,
        RegistryError::Conflict { .. } => 4,
        RegistryError::Lease(_) => 5,
        RegistryError::WatchGap { .. } => 6,
        RegistryError::Unavailable(_) => 7,
        RegistryError::Codec(_) | RegistryError::Config(_) => 1,
    }
}
