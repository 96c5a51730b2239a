//! etcd-backed substrate.
//!
//! Thin adapter over `etcd-client`: version guards become `Compare::version`
//! conditions, leases and watches map onto the native primitives. The client
//! multiplexes one gRPC channel internally, so cloning it per call is cheap.

use crate::config::RegistryConfig;
use crate::error::SubstrateError;
use crate::substrate::{
    EventKind, EventStream, KeyValue, KeyValueStream, LeaseId, ReadResult, Substrate,
    SubstrateEvent, SubstrateTxn, TxnOp, TxnResult,
};
use async_trait::async_trait;
use etcd_client::{
    Client, Compare, CompareOp, ConnectOptions, EventType, GetOptions, PutOptions, Txn,
    TxnOp as EtcdTxnOp, WatchOptions,
};
use futures::stream;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Replicated substrate backed by an etcd cluster
#[derive(Clone)]
pub struct EtcdSubstrate {
    client: Client,
}

impl EtcdSubstrate {
    /// Connect to the configured endpoint. Fails when the cluster is not
    /// reachable within the connect timeout.
    pub async fn connect(config: &RegistryConfig) -> Result<Self, SubstrateError> {
        let options = ConnectOptions::new().with_connect_timeout(config.connect_timeout());
        let client = Client::connect([config.endpoint()], Some(options))
            .await
            .map_err(map_etcd_error)?;
        debug!(endpoint = %config.endpoint(), "connected to etcd");
        Ok(Self { client })
    }
}

fn map_etcd_error(err: etcd_client::Error) -> SubstrateError {
    match err {
        etcd_client::Error::GRpcStatus(status) => {
            if status.message().contains("lease not found") {
                SubstrateError::LeaseNotFound
            } else {
                SubstrateError::Unavailable(status.message().to_string())
            }
        }
        other => SubstrateError::Unavailable(other.to_string()),
    }
}

fn convert_kv(kv: &etcd_client::KeyValue) -> Result<KeyValue, SubstrateError> {
    let key = kv
        .key_str()
        .map_err(|err| SubstrateError::Backend(err.to_string()))?
        .to_string();
    Ok(KeyValue {
        key,
        value: kv.value().to_vec(),
        version: kv.version(),
        mod_revision: kv.mod_revision(),
        lease: (kv.lease() != 0).then_some(kv.lease()),
    })
}

fn convert_op(op: TxnOp) -> EtcdTxnOp {
    match op {
        TxnOp::Put { key, value, lease } => {
            let options = lease.map(|id| PutOptions::new().with_lease(id));
            EtcdTxnOp::put(key, value, options)
        }
        TxnOp::Delete { key } => EtcdTxnOp::delete(key, None),
    }
}

fn header_revision(header: Option<&etcd_client::ResponseHeader>) -> i64 {
    header.map(|header| header.revision()).unwrap_or(0)
}

#[async_trait]
impl Substrate for EtcdSubstrate {
    async fn get(&self, key: &str) -> Result<ReadResult, SubstrateError> {
        let mut client = self.client.clone();
        let resp = client.get(key, None).await.map_err(map_etcd_error)?;
        let revision = header_revision(resp.header());
        let kv = match resp.kvs().first() {
            Some(kv) => Some(convert_kv(kv)?),
            None => None,
        };
        Ok(ReadResult { kv, revision })
    }

    async fn get_prefix(&self, prefix: &str) -> Result<KeyValueStream, SubstrateError> {
        let mut client = self.client.clone();
        let resp = client
            .get(prefix, Some(GetOptions::new().with_prefix()))
            .await
            .map_err(map_etcd_error)?;
        let items: Vec<Result<KeyValue, SubstrateError>> =
            resp.kvs().iter().map(convert_kv).collect();
        Ok(Box::pin(stream::iter(items)))
    }

    async fn put(
        &self,
        key: &str,
        value: Vec<u8>,
        lease: Option<LeaseId>,
    ) -> Result<(), SubstrateError> {
        let mut client = self.client.clone();
        let options = lease.map(|id| PutOptions::new().with_lease(id));
        client
            .put(key, value, options)
            .await
            .map_err(map_etcd_error)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), SubstrateError> {
        let mut client = self.client.clone();
        client.delete(key, None).await.map_err(map_etcd_error)?;
        Ok(())
    }

    async fn txn(&self, txn: SubstrateTxn) -> Result<TxnResult, SubstrateError> {
        let mut client = self.client.clone();
        let compares: Vec<Compare> = txn
            .guards
            .into_iter()
            .map(|guard| Compare::version(guard.key, CompareOp::Equal, guard.version))
            .collect();
        let success: Vec<EtcdTxnOp> = txn.success.into_iter().map(convert_op).collect();
        let failure: Vec<EtcdTxnOp> = txn.failure.into_iter().map(convert_op).collect();
        let request = Txn::new().when(compares).and_then(success).or_else(failure);
        let resp = client.txn(request).await.map_err(map_etcd_error)?;
        Ok(TxnResult {
            succeeded: resp.succeeded(),
            revision: header_revision(resp.header()),
        })
    }

    async fn lease_grant(&self, ttl: Duration) -> Result<LeaseId, SubstrateError> {
        let mut client = self.client.clone();
        let resp = client
            .lease_grant(ttl.as_secs().max(1) as i64, None)
            .await
            .map_err(map_etcd_error)?;
        Ok(resp.id())
    }

    async fn lease_revoke(&self, lease: LeaseId) -> Result<(), SubstrateError> {
        let mut client = self.client.clone();
        client.lease_revoke(lease).await.map_err(map_etcd_error)?;
        Ok(())
    }

    async fn lease_keep_alive(&self, lease: LeaseId) -> Result<(), SubstrateError> {
        let mut client = self.client.clone();
        let (mut keeper, mut stream) = client
            .lease_keep_alive(lease)
            .await
            .map_err(map_etcd_error)?;
        keeper.keep_alive().await.map_err(map_etcd_error)?;
        // A response with a non-positive TTL means the lease is gone
        match stream.message().await.map_err(map_etcd_error)? {
            Some(resp) if resp.ttl() > 0 => Ok(()),
            _ => Err(SubstrateError::LeaseNotFound),
        }
    }

    async fn watch(
        &self,
        key: &str,
        from_revision: Option<i64>,
        cancel: CancellationToken,
    ) -> Result<EventStream, SubstrateError> {
        let mut client = self.client.clone();
        let mut options = WatchOptions::new();
        if let Some(revision) = from_revision {
            options = options.with_start_revision(revision);
        }
        let (mut watcher, mut stream) = client
            .watch(key, Some(options))
            .await
            .map_err(map_etcd_error)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let key = key.to_string();
        tokio::spawn(async move {
            loop {
                let message = tokio::select! {
                    _ = cancel.cancelled() => {
                        if let Err(err) = watcher.cancel().await {
                            debug!(key = %key, error = %err, "watch cancel failed");
                        }
                        break;
                    }
                    message = stream.message() => message,
                };
                match message {
                    Ok(Some(resp)) => {
                        if resp.compact_revision() != 0 {
                            let _ = tx.send(Err(SubstrateError::Compacted {
                                compact_revision: resp.compact_revision(),
                            }));
                            break;
                        }
                        if resp.canceled() {
                            break;
                        }
                        for event in resp.events() {
                            let Some(kv) = event.kv() else { continue };
                            let kind = match event.event_type() {
                                EventType::Put => EventKind::Put,
                                EventType::Delete => EventKind::Delete,
                            };
                            let converted = convert_kv(kv).map(|kv| SubstrateEvent {
                                key: kv.key,
                                kind,
                                value: kv.value,
                                revision: kv.mod_revision,
                            });
                            if tx.send(converted).is_err() {
                                let _ = watcher.cancel().await;
                                return;
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        let _ = tx.send(Err(map_etcd_error(err)));
                        break;
                    }
                }
            }
        });
        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }
}
