//! Derived index consistency: type/host mappings, region markers, and
//! the filtered scans built on top of them.

use super::support::{record, test_registry};
use futures::TryStreamExt;
use vigil::record::{ServiceIdentity, ServiceRecord, Status};
use vigil::registry::GetManyFilter;
use vigil::substrate::Substrate;

async fn collect(
    registry: &vigil::registry::Registry,
    filter: GetManyFilter,
) -> Vec<ServiceRecord> {
    registry
        .get_many(filter)
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap()
}

fn uuids(records: &[ServiceRecord]) -> Vec<&str> {
    let mut uuids: Vec<&str> = records.iter().map(|r| r.uuid.as_str()).collect();
    uuids.sort();
    uuids
}

#[tokio::test]
async fn test_host_change_leaves_exactly_one_mapping() {
    let (registry, substrate) = test_registry();
    let rec = record("u1", "nova-compute", "node-1", "us-east", Status::Up);
    registry.update(&rec).await.unwrap();

    let mut moved = rec.clone();
    moved.host = "node-2".to_string();
    registry.update(&moved).await.unwrap();

    assert!(registry
        .get_one(&ServiceIdentity::type_host("nova-compute", "node-1"))
        .await
        .unwrap()
        .is_none());
    let via_new = registry
        .get_one(&ServiceIdentity::type_host("nova-compute", "node-2"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(via_new.uuid, "u1");

    // The stale mapping key itself is gone, not just unresolvable
    let old_key = "/test/services/by-type-host/nova-compute/node-1";
    assert!(substrate.get(old_key).await.unwrap().kv.is_none());
}

#[tokio::test]
async fn test_region_move_retracts_old_marker() {
    let (registry, _) = test_registry();
    let rec = record("u1", "nova-compute", "node-1", "us-east", Status::Up);
    registry.update(&rec).await.unwrap();

    let mut moved = rec.clone();
    moved.region = "us-west".to_string();
    registry.update(&moved).await.unwrap();

    assert!(collect(&registry, GetManyFilter::Region("us-east".to_string()))
        .await
        .is_empty());
    let west = collect(&registry, GetManyFilter::Region("us-west".to_string())).await;
    assert_eq!(uuids(&west), vec!["u1"]);
}

#[tokio::test]
async fn test_region_scan_reflects_current_membership() {
    let (registry, _) = test_registry();
    for (uuid, region) in [("u1", "us-east"), ("u2", "us-east"), ("u3", "eu-west")] {
        let rec = record(uuid, "nova-compute", uuid, region, Status::Up);
        registry.update(&rec).await.unwrap();
    }
    // u2 later moves out of us-east
    let moved = record("u2", "nova-compute", "u2", "eu-west", Status::Up);
    registry.update(&moved).await.unwrap();

    let east = collect(&registry, GetManyFilter::Region("us-east".to_string())).await;
    assert_eq!(uuids(&east), vec!["u1"]);
    let west = collect(&registry, GetManyFilter::Region("eu-west".to_string())).await;
    assert_eq!(uuids(&west), vec!["u2", "u3"]);
}

#[tokio::test(start_paused = true)]
async fn test_status_scan_tracks_markers_not_records() {
    let (registry, _) = test_registry();
    registry
        .update(&record("u1", "nova-compute", "node-1", "us-east", Status::Up))
        .await
        .unwrap();
    registry
        .update(&record("u2", "nova-compute", "node-2", "us-east", Status::Down))
        .await
        .unwrap();

    let up = collect(&registry, GetManyFilter::Status(Status::Up)).await;
    assert_eq!(uuids(&up), vec!["u1"]);
    let down = collect(&registry, GetManyFilter::Status(Status::Down)).await;
    assert_eq!(uuids(&down), vec!["u2"]);

    // After the lease lapses the UP scan is empty even though the stored
    // record still says UP
    tokio::time::advance(std::time::Duration::from_secs(61)).await;
    assert!(collect(&registry, GetManyFilter::Status(Status::Up))
        .await
        .is_empty());
    let stored = registry
        .get_one(&ServiceIdentity::uuid("u1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status(), Status::Up);
}

#[tokio::test]
async fn test_type_scan_with_host_prefix() {
    let (registry, _) = test_registry();
    for host in ["db-1", "db-2", "web-1"] {
        let rec = record(host, "nova-compute", host, "us-east", Status::Up);
        registry.update(&rec).await.unwrap();
    }
    registry
        .update(&record("x1", "cinder-volume", "db-9", "us-east", Status::Up))
        .await
        .unwrap();

    let all = collect(
        &registry,
        GetManyFilter::TypeHost {
            service_type: "nova-compute".to_string(),
            host_prefix: None,
        },
    )
    .await;
    assert_eq!(uuids(&all), vec!["db-1", "db-2", "web-1"]);

    let db_only = collect(
        &registry,
        GetManyFilter::TypeHost {
            service_type: "nova-compute".to_string(),
            host_prefix: Some("db-".to_string()),
        },
    )
    .await;
    assert_eq!(uuids(&db_only), vec!["db-1", "db-2"]);
}

#[tokio::test]
async fn test_scan_skips_entries_whose_primary_vanished() {
    let (registry, substrate) = test_registry();
    registry
        .update(&record("u1", "nova-compute", "node-1", "us-east", Status::Up))
        .await
        .unwrap();
    registry
        .update(&record("u2", "nova-compute", "node-2", "us-east", Status::Up))
        .await
        .unwrap();

    // Simulate a primary lost between index scan and hydration by
    // removing it out from under the registry
    substrate
        .delete("/test/services/by-uuid/u2")
        .await
        .unwrap();

    let east = collect(&registry, GetManyFilter::Region("us-east".to_string())).await;
    assert_eq!(uuids(&east), vec!["u1"]);
}

#[tokio::test]
async fn test_each_get_many_call_is_a_fresh_snapshot() {
    let (registry, _) = test_registry();
    registry
        .update(&record("u1", "nova-compute", "node-1", "us-east", Status::Up))
        .await
        .unwrap();

    let first = collect(&registry, GetManyFilter::Region("us-east".to_string())).await;
    assert_eq!(first.len(), 1);

    registry
        .update(&record("u2", "nova-compute", "node-2", "us-east", Status::Up))
        .await
        .unwrap();
    let second = collect(&registry, GetManyFilter::Region("us-east".to_string())).await;
    assert_eq!(uuids(&second), vec!["u1", "u2"]);
}

#[tokio::test]
async fn test_delete_removes_every_index_family() {
    let (registry, substrate) = test_registry();
    let rec = record("u1", "nova-compute", "node-1", "us-east", Status::Up);
    registry.update(&rec).await.unwrap();
    registry
        .delete(&ServiceIdentity::uuid("u1"))
        .await
        .unwrap();

    for key in [
        "/test/services/by-uuid/u1",
        "/test/services/by-type-host/nova-compute/node-1",
        "/test/services/by-status/UP/u1",
        "/test/services/by-status/DOWN/u1",
        "/test/services/by-region/us-east/u1",
    ] {
        assert!(
            substrate.get(key).await.unwrap().kv.is_none(),
            "{} should be gone",
            key
        );
    }
}
