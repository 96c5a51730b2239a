//! Watch streams over service records.
//!
//! A watch follows one primary key and yields decoded change events.
//! Cancellation works from anywhere: through the handle returned by
//! [`ServiceWatch::canceller`], or implicitly when the watch is dropped.
//! A watcher that falls so far behind that the substrate compacted past
//! its position gets one gap error and then the stream ends; resuming is
//! the caller's decision.

use crate::error::RegistryError;
use crate::record::{ServiceIdentity, ServiceRecord};
use crate::registry::Registry;
use crate::substrate::{EventKind, SubstrateEvent};
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio_util::sync::{CancellationToken, DropGuard};

/// One observed change to a watched record
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub key: String,
    pub kind: EventKind,
    /// Decoded record for puts; `None` for deletes
    pub record: Option<ServiceRecord>,
    pub revision: i64,
}

/// Handle for ending a watch from another task
#[derive(Clone)]
pub struct WatchCanceller {
    token: CancellationToken,
}

impl WatchCanceller {
    pub fn cancel(&self) {
        self.token.cancel();
    }
}

/// Live stream of changes to one service's record.
///
/// Dropping the watch cancels the underlying subscription.
pub struct ServiceWatch {
    stream: Pin<Box<dyn Stream<Item = Result<ChangeEvent, RegistryError>> + Send>>,
    token: CancellationToken,
    _guard: DropGuard,
}

impl ServiceWatch {
    /// Cancellation handle that can be moved to another task
    pub fn canceller(&self) -> WatchCanceller {
        WatchCanceller {
            token: self.token.clone(),
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }
}

impl Stream for ServiceWatch {
    type Item = Result<ChangeEvent, RegistryError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().stream.as_mut().poll_next(cx)
    }
}

fn convert_event(event: SubstrateEvent) -> Result<ChangeEvent, RegistryError> {
    let record = match event.kind {
        EventKind::Put => Some(ServiceRecord::from_bytes(&event.value)?),
        EventKind::Delete => None,
    };
    Ok(ChangeEvent {
        key: event.key,
        kind: event.kind,
        record,
        revision: event.revision,
    })
}

impl Registry {
    /// Start watching a service's record.
    ///
    /// A uuid identity is watchable even before the record exists; a
    /// type/host identity that resolves to nothing yields `Ok(None)`.
    pub async fn notify(
        &self,
        identity: &ServiceIdentity,
    ) -> Result<Option<ServiceWatch>, RegistryError> {
        let Some(uuid) = self.resolve_uuid(identity).await? else {
            return Ok(None);
        };
        let key = self.namespace.by_uuid(&uuid)?;
        // Anchor the stream just past the revision of this read so
        // nothing between now and the first event is missed or doubled
        let read = self.substrate.get(&key).await?;
        let start = read.revision + 1;
        let token = CancellationToken::new();
        let events = self
            .substrate
            .watch(&key, Some(start), token.clone())
            .await?;
        let stream = events.map(|item| match item {
            Ok(event) => convert_event(event),
            Err(err) => Err(RegistryError::from(err)),
        });
        let guard = token.clone().drop_guard();
        Ok(Some(ServiceWatch {
            stream: Box::pin(stream),
            token,
            _guard: guard,
        }))
    }
}
