use super::*;
use std::sync::Arc;
use std::thread;

fn assets(names: &[&str]) -> Vec<AssetRef> {
    names.iter().map(|name| AssetRef::new(*name)).collect()
}

#[test]
fn store_orders_and_dedups_assets() {
    let store = RecordStore::from_assets(assets(&["c", "a", "b", "a"]));
    let order: Vec<&str> = store.records().iter().map(|r| r.asset.as_str()).collect();
    assert_eq!(order, vec!["a", "b", "c"]);
    assert_eq!(store.index_of(&AssetRef::new("c")), Some(2));
    assert!(store.records().iter().all(|r| r.prediction.is_none()));
}

#[test]
fn memberships_are_a_relation_lookup() {
    let mut store = RecordStore::from_assets(assets(&["a", "b", "c"]));
    let unknown = store.assign_group("Cocoa", &assets(&["a", "c", "zzz"]));
    assert_eq!(unknown, 1);
    store.assign_group("Cocoa Beach", &assets(&["a"]));
    store.assign_group("Cocoa", &assets(&["a"]));

    let groups: Vec<&str> = store.groups_for(&AssetRef::new("a")).collect();
    assert_eq!(groups, vec!["Cocoa", "Cocoa Beach"]);
    assert_eq!(store.get(0).unwrap().collections, vec!["Cocoa", "Cocoa Beach"]);
    assert_eq!(store.groups_for(&AssetRef::new("b")).count(), 0);
    let members: Vec<&str> = store.members_of("Cocoa").map(|r| r.asset.as_str()).collect();
    assert_eq!(members, vec!["a", "c"]);
}

#[test]
fn working_copy_first_outcome_wins() {
    let store = RecordStore::from_assets(assets(&["a", "b"]));
    let working = WorkingCopy::from_store(&store);
    assert!(working.record(0, JobOutcome::Classified(0.25)));
    assert!(!working.record(0, JobOutcome::Classified(0.75)));
    assert!(!working.record(0, JobOutcome::Failed("late".into())));
    assert!(!working.record(9, JobOutcome::Classified(0.5)));
    assert_eq!(working.outcome(0), Some(&JobOutcome::Classified(0.25)));
    assert!(working.is_pending(1));
    assert_eq!(working.pending_count(), 1);
}

#[test]
fn working_copy_clamps_scores_and_tags_failures() {
    let store = RecordStore::from_assets(assets(&["a", "b", "c"]));
    let working = WorkingCopy::from_store(&store);
    working.record(0, JobOutcome::Classified(1.7));
    working.record(1, JobOutcome::Failed("image unavailable".into()));

    let snapshot = working.snapshot();
    assert_eq!(snapshot[0].prediction, Some(1.0));
    assert_eq!(snapshot[1].prediction, None);
    assert_eq!(snapshot[1].failure.as_deref(), Some("image unavailable"));
    assert_eq!(snapshot[2], store.records()[2]);
    assert_eq!(working.classified_count(), 1);
}

#[test]
fn concurrent_disjoint_writes_are_all_visible() {
    let names: Vec<String> = (0..64).map(|i| format!("asset-{i:03}")).collect();
    let store = RecordStore::from_assets(names.iter().map(AssetRef::new).collect());
    let working = Arc::new(WorkingCopy::from_store(&store));
    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let working = Arc::clone(&working);
            thread::spawn(move || {
                for index in (worker..64).step_by(4) {
                    assert!(working.record(index, JobOutcome::Classified(index as f64 / 64.0)));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    let snapshot = working.snapshot();
    assert!(snapshot.iter().all(Record::is_classified));
    assert_eq!(snapshot[10].prediction, Some(10.0 / 64.0));
}

#[test]
fn snapshot_counts() {
    let store = RecordStore::from_assets(assets(&["a", "b", "c"]));
    let working = WorkingCopy::from_store(&store);
    working.record(0, JobOutcome::Classified(0.1));
    working.record(2, JobOutcome::Failed("boom".into()));
    let snapshot = Snapshot {
        sequence: 1,
        records: working.snapshot().into(),
    };
    assert_eq!(snapshot.total(), 3);
    assert_eq!(snapshot.classified(), 1);
    assert_eq!(snapshot.failed(), 1);
}

#[test]
fn serializes_classified_records() {
    let mut record = Record::new(AssetRef::new("Cocoa/a.png"));
    record.prediction = Some(0.5);
    record.collections = vec!["Cocoa".into()];
    let json = serde_json::to_value(&record).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "asset_id": "Cocoa/a.png",
            "prediction": 0.5,
            "collections": ["Cocoa"],
        })
    );
}
