//! Write-set planning for registry mutations.
//!
//! Every mutation of a service record must land atomically across the
//! primary key and its derived index entries. The planners here are pure:
//! they take what was read and produce a guarded transaction, so the
//! decision logic is testable without a substrate. The guard is always the
//! primary key's version, which makes concurrent writers collide instead
//! of interleaving.

use crate::error::RegistryError;
use crate::keys::{KeyNamespace, RecordKeys};
use crate::record::{ServiceRecord, Status};
use crate::substrate::{LeaseId, SubstrateTxn, TxnOp, VersionGuard};

/// What a committed mutation did.
///
/// `op_errors` has one slot per operation in the applied write-set; a slot
/// is `Some` only when the substrate reported a per-operation failure.
#[derive(Debug, Clone)]
pub struct UpdateOutcome {
    pub uuid: String,
    pub succeeded: bool,
    pub op_errors: Vec<Option<String>>,
    /// Lease now backing the UP marker, when one was granted
    pub lease: Option<LeaseId>,
    /// Substrate revision after the mutation
    pub revision: i64,
}

impl UpdateOutcome {
    pub(crate) fn success(uuid: String, ops: usize, lease: Option<LeaseId>, revision: i64) -> Self {
        Self {
            uuid,
            succeeded: true,
            op_errors: vec![None; ops],
            lease,
            revision,
        }
    }

    /// Nothing needed doing; reported as success with an empty write-set
    pub(crate) fn no_op(uuid: String, revision: i64) -> Self {
        Self {
            uuid,
            succeeded: true,
            op_errors: Vec::new(),
            lease: None,
            revision,
        }
    }
}

/// Write-set for a record that does not exist yet. Guarded on the primary
/// key being absent.
pub(crate) fn plan_create(
    keys: &RecordKeys,
    uuid: &str,
    record: Vec<u8>,
    lease: Option<LeaseId>,
) -> SubstrateTxn {
    SubstrateTxn {
        guards: vec![VersionGuard {
            key: keys.primary.clone(),
            version: 0,
        }],
        success: vec![
            TxnOp::Put {
                key: keys.primary.clone(),
                value: record,
                lease: None,
            },
            TxnOp::Put {
                key: keys.type_host.clone(),
                value: uuid.as_bytes().to_vec(),
                lease: None,
            },
            TxnOp::Put {
                key: keys.status.clone(),
                value: Vec::new(),
                lease,
            },
            TxnOp::Put {
                key: keys.region.clone(),
                value: Vec::new(),
                lease: None,
            },
        ],
        failure: Vec::new(),
    }
}

/// Write-set replacing an existing record. Guarded on the primary key
/// still being at the version that was read.
///
/// Index entries are rewritten only where the old and new records
/// disagree, except the status marker: when `lease` is present the marker
/// is re-put even under an unchanged key so it re-binds to the new lease.
pub(crate) fn plan_replace(
    old: &RecordKeys,
    new: &RecordKeys,
    uuid: &str,
    record: Vec<u8>,
    existing_version: i64,
    lease: Option<LeaseId>,
) -> SubstrateTxn {
    let mut success = vec![TxnOp::Put {
        key: new.primary.clone(),
        value: record,
        lease: None,
    }];
    if old.type_host != new.type_host {
        success.push(TxnOp::Delete {
            key: old.type_host.clone(),
        });
        success.push(TxnOp::Put {
            key: new.type_host.clone(),
            value: uuid.as_bytes().to_vec(),
            lease: None,
        });
    }
    if old.status != new.status {
        success.push(TxnOp::Delete {
            key: old.status.clone(),
        });
        success.push(TxnOp::Put {
            key: new.status.clone(),
            value: Vec::new(),
            lease,
        });
    } else if lease.is_some() {
        success.push(TxnOp::Put {
            key: new.status.clone(),
            value: Vec::new(),
            lease,
        });
    }
    if old.region != new.region {
        success.push(TxnOp::Delete {
            key: old.region.clone(),
        });
        success.push(TxnOp::Put {
            key: new.region.clone(),
            value: Vec::new(),
            lease: None,
        });
    }
    SubstrateTxn {
        guards: vec![VersionGuard {
            key: new.primary.clone(),
            version: existing_version,
        }],
        success,
        failure: Vec::new(),
    }
}

/// Write-set removing a record and every index entry that could point at
/// it. Both status families are deleted; removing an absent key is a no-op
/// for the substrate, so the record's actual status does not matter.
pub(crate) fn plan_delete(
    namespace: &KeyNamespace,
    existing: &ServiceRecord,
    existing_version: i64,
) -> Result<SubstrateTxn, RegistryError> {
    let keys = namespace.key_set(existing)?;
    let up = namespace.by_status(Status::Up, &existing.uuid)?;
    let down = namespace.by_status(Status::Down, &existing.uuid)?;
    Ok(SubstrateTxn {
        guards: vec![VersionGuard {
            key: keys.primary.clone(),
            version: existing_version,
        }],
        success: vec![
            TxnOp::Delete { key: keys.primary },
            TxnOp::Delete { key: keys.type_host },
            TxnOp::Delete { key: up },
            TxnOp::Delete { key: down },
            TxnOp::Delete { key: keys.region },
        ],
        failure: Vec::new(),
    })
}

/// Write-set re-binding an UP marker to a fresh lease without touching the
/// record itself. Guarded so a concurrent replace or delete wins.
pub(crate) fn plan_refresh(
    primary: String,
    existing_version: i64,
    status_key: String,
    lease: LeaseId,
) -> SubstrateTxn {
    SubstrateTxn {
        guards: vec![VersionGuard {
            key: primary,
            version: existing_version,
        }],
        success: vec![TxnOp::Put {
            key: status_key,
            value: Vec::new(),
            lease: Some(lease),
        }],
        failure: Vec::new(),
    }
}
