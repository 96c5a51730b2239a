//! End-to-end record lifecycle: register, read back, take down, delete.

use super::support::{record, test_registry};
use vigil::error::RegistryError;
use vigil::record::{Maintenance, ServiceIdentity, Status};

#[tokio::test]
async fn test_update_then_get_one_round_trips_every_field() {
    let (registry, _) = test_registry();
    let mut rec = record("u1", "nova-compute", "node-1", "us-east", Status::Up);
    rec.maintenance_note = "planned window".to_string();
    rec.maintenance_start = 1_700_000_000;
    rec.maintenance_end = 1_700_003_600;

    let outcome = registry.update(&rec).await.unwrap();
    assert!(outcome.succeeded);
    assert_eq!(outcome.uuid, "u1");
    assert!(outcome.op_errors.iter().all(Option::is_none));
    assert!(outcome.lease.is_some());

    let fetched = registry
        .get_one(&ServiceIdentity::uuid("u1"))
        .await
        .unwrap()
        .expect("record should exist");
    assert_eq!(fetched, rec);
}

#[tokio::test]
async fn test_update_without_uuid_mints_one() {
    let (registry, _) = test_registry();
    let rec = record("", "nova-compute", "node-1", "us-east", Status::Up);

    let outcome = registry.update(&rec).await.unwrap();
    assert_eq!(outcome.uuid.len(), 32);

    let fetched = registry
        .get_one(&ServiceIdentity::type_host("nova-compute", "node-1"))
        .await
        .unwrap()
        .expect("record should resolve via type/host");
    assert_eq!(fetched.uuid, outcome.uuid);
}

#[tokio::test]
async fn test_update_rejects_malformed_segments() {
    let (registry, _) = test_registry();

    let bad_host = record("u1", "nova-compute", "node/1", "us-east", Status::Up);
    assert!(matches!(
        registry.update(&bad_host).await,
        Err(RegistryError::Validation(_))
    ));

    let empty_region = record("u1", "nova-compute", "node-1", "", Status::Up);
    assert!(matches!(
        registry.update(&empty_region).await,
        Err(RegistryError::Validation(_))
    ));

    let unknown_status = record("u1", "nova-compute", "node-1", "us-east", Status::Unknown);
    assert!(matches!(
        registry.update(&unknown_status).await,
        Err(RegistryError::Validation(_))
    ));

    // Nothing was written by any rejected update
    assert!(registry
        .get_one(&ServiceIdentity::uuid("u1"))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_rewriting_identical_down_record_is_a_no_op() {
    let (registry, substrate) = test_registry();
    let rec = record("u1", "nova-compute", "node-1", "us-east", Status::Down);
    registry.update(&rec).await.unwrap();
    let revision = substrate.current_revision();

    let outcome = registry.update(&rec).await.unwrap();
    assert!(outcome.succeeded);
    assert!(outcome.op_errors.is_empty());
    assert_eq!(substrate.current_revision(), revision);
}

#[tokio::test]
async fn test_down_records_maintenance_and_releases_liveness() {
    let (registry, substrate) = test_registry();
    let rec = record("u1", "nova-compute", "node-1", "us-east", Status::Up);
    let up_outcome = registry.update(&rec).await.unwrap();
    let up_lease = up_outcome.lease.unwrap();
    let identity = ServiceIdentity::uuid("u1");
    assert!(registry.is_up(&identity).await.unwrap());

    let outcome = registry
        .down(
            &identity,
            Some(Maintenance {
                note: "disk swap".to_string(),
                start: Some(1_700_000_000),
                end: None,
            }),
        )
        .await
        .unwrap();
    assert!(outcome.succeeded);
    assert!(outcome.lease.is_none());

    // Liveness drops immediately, without waiting for the TTL
    assert!(!registry.is_up(&identity).await.unwrap());
    assert!(!substrate.has_lease(up_lease));

    let fetched = registry.get_one(&identity).await.unwrap().unwrap();
    assert_eq!(fetched.status(), Status::Down);
    assert_eq!(fetched.maintenance_note, "disk swap");
    assert_eq!(fetched.maintenance_start, 1_700_000_000);
}

#[tokio::test]
async fn test_down_on_unknown_service_is_not_found() {
    let (registry, _) = test_registry();
    let result = registry
        .down(&ServiceIdentity::uuid("ghost"), None)
        .await;
    assert!(matches!(result, Err(RegistryError::NotFound(_))));
}

#[tokio::test]
async fn test_delete_removes_record_and_liveness() {
    let (registry, _) = test_registry();
    let rec = record("u1", "nova-compute", "node-1", "us-east", Status::Up);
    registry.update(&rec).await.unwrap();
    let identity = ServiceIdentity::type_host("nova-compute", "node-1");

    let outcome = registry.delete(&identity).await.unwrap();
    assert!(outcome.succeeded);
    assert_eq!(outcome.uuid, "u1");

    assert!(registry.get_one(&identity).await.unwrap().is_none());
    assert!(registry
        .get_one(&ServiceIdentity::uuid("u1"))
        .await
        .unwrap()
        .is_none());
    assert!(!registry.is_up(&ServiceIdentity::uuid("u1")).await.unwrap());
}

#[tokio::test]
async fn test_delete_of_absent_identity_is_a_no_op_success() {
    let (registry, _) = test_registry();
    let outcome = registry
        .delete(&ServiceIdentity::type_host("nova-compute", "ghost"))
        .await
        .unwrap();
    assert!(outcome.succeeded);
    assert!(outcome.uuid.is_empty());
    assert!(outcome.op_errors.is_empty());
}

#[tokio::test]
async fn test_heartbeat_requires_a_known_up_record() {
    let (registry, _) = test_registry();
    assert!(matches!(
        registry.heartbeat(&ServiceIdentity::uuid("ghost")).await,
        Err(RegistryError::NotFound(_))
    ));

    let rec = record("u1", "nova-compute", "node-1", "us-east", Status::Down);
    registry.update(&rec).await.unwrap();
    assert!(matches!(
        registry.heartbeat(&ServiceIdentity::uuid("u1")).await,
        Err(RegistryError::Validation(_))
    ));
}

// The concrete scenario: register U1 as nova-compute on localhost in
// us-east with a 60 second TTL, then let the lease lapse untouched.
#[tokio::test(start_paused = true)]
async fn test_nova_compute_scenario() {
    let (registry, _) = test_registry();
    let rec = record("U1", "nova-compute", "localhost", "us-east", Status::Up);
    registry.update(&rec).await.unwrap();

    assert!(registry.is_up(&ServiceIdentity::uuid("U1")).await.unwrap());
    let fetched = registry
        .get_one(&ServiceIdentity::type_host("nova-compute", "localhost"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fetched.region, "us-east");

    tokio::time::advance(std::time::Duration::from_secs(61)).await;
    assert!(!registry.is_up(&ServiceIdentity::uuid("U1")).await.unwrap());
    // The record itself survives the lapse; only liveness is gone
    let fetched = registry
        .get_one(&ServiceIdentity::uuid("U1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fetched.status(), Status::Up);
}
