//! Liveness lease management.
//!
//! UP markers are bound to a substrate lease so a service that stops
//! refreshing disappears from the UP index within one TTL. Granting and
//! revoking are thin wrappers; [`LeaseKeeper`] is the long-running refresh
//! loop a service process runs for as long as it wants to stay visible.

use crate::error::{RegistryError, SubstrateError};
use crate::substrate::{LeaseId, Substrate};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Floor applied to granted TTLs
pub(crate) const MIN_LEASE_TTL: Duration = Duration::from_secs(5);

pub(crate) async fn grant_status_lease(
    substrate: &dyn Substrate,
    ttl: Duration,
) -> Result<LeaseId, RegistryError> {
    let ttl = ttl.max(MIN_LEASE_TTL);
    substrate
        .lease_grant(ttl)
        .await
        .map_err(|err| RegistryError::Lease(err.to_string()))
}

/// Revoke a lease. A lease the substrate no longer knows counts as
/// revoked, not as an error.
pub(crate) async fn revoke_status_lease(
    substrate: &dyn Substrate,
    lease: LeaseId,
) -> Result<(), RegistryError> {
    match substrate.lease_revoke(lease).await {
        Ok(()) | Err(SubstrateError::LeaseNotFound) => Ok(()),
        Err(err) => Err(RegistryError::Lease(err.to_string())),
    }
}

/// Background task refreshing a lease until stopped.
///
/// Ticks at a third of the TTL so a refresh can fail twice before the
/// marker expires. Transient substrate errors are logged and retried on
/// the next tick; a lease the substrate no longer knows ends the loop.
pub struct LeaseKeeper {
    handle: JoinHandle<Result<(), RegistryError>>,
    cancel: CancellationToken,
}

impl LeaseKeeper {
    pub fn spawn(substrate: Arc<dyn Substrate>, lease: LeaseId, ttl: Duration) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let period = (ttl / 3).max(Duration::from_secs(1));
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick of an interval completes immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => return Ok(()),
                    _ = ticker.tick() => match substrate.lease_keep_alive(lease).await {
                        Ok(()) => debug!(lease, "lease refreshed"),
                        Err(SubstrateError::LeaseNotFound) => {
                            warn!(lease, "lease no longer exists, stopping refresh");
                            return Err(RegistryError::Lease(
                                "lease no longer exists".to_string(),
                            ));
                        }
                        Err(err) => warn!(lease, error = %err, "lease refresh failed"),
                    },
                }
            }
        });
        Self { handle, cancel }
    }

    /// True while the refresh loop is still running
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Stop refreshing and report how the loop ended
    pub async fn stop(self) -> Result<(), RegistryError> {
        self.cancel.cancel();
        match self.handle.await {
            Ok(result) => result,
            Err(err) => Err(RegistryError::Lease(format!("keeper task failed: {err}"))),
        }
    }
}
