use super::*;
use crate::actormodel::types::TimestampUtc;
use crate::value::Value;
use std::collections::HashMap;
use tempfile::tempdir;

fn event(manifest: &str, n: i64) -> NewEvent {
    NewEvent {
        manifest: manifest.to_string(),
        payload: Value::from(n),
        metadata: HashMap::new(),
    }
}

#[tokio::test]
async fn test_append_assigns_monotonic_sequences() {
    let dir = tempdir().expect("temp dir");
    let journal = FileJournal::new(dir.path());
    let actor = ActorId::from("case-1");

    let first = journal
        .append(&actor, 0, vec![event("A", 1), event("B", 2)])
        .await
        .expect("first append");
    assert_eq!(first.iter().map(|e| e.sequence).collect::<Vec<_>>(), vec![1, 2]);

    let second = journal
        .append(&actor, 2, vec![event("C", 3)])
        .await
        .expect("second append");
    assert_eq!(second[0].sequence, 3);

    let all = journal.read_events(&actor, 0).await.expect("read");
    assert_eq!(
        all.iter().map(|e| e.manifest.as_str()).collect::<Vec<_>>(),
        vec!["A", "B", "C"]
    );
    let tail = journal.read_events(&actor, 2).await.expect("read tail");
    assert_eq!(tail.len(), 1);
    assert_eq!(tail[0].payload, Value::from(3i64));
}

#[tokio::test]
async fn test_append_with_stale_sequence_conflicts() {
    let dir = tempdir().expect("temp dir");
    let journal = FileJournal::new(dir.path());
    let actor = ActorId::from("case-1");
    journal.append(&actor, 0, vec![event("A", 1)]).await.expect("append");

    let err = journal
        .append(&actor, 0, vec![event("B", 2)])
        .await
        .unwrap_err();
    assert!(matches!(err, AggregateError::AggregateConflict));
    assert_eq!(journal.read_events(&actor, 0).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_missing_log_reads_empty() {
    let dir = tempdir().expect("temp dir");
    let journal = FileJournal::new(dir.path().join("not-yet"));
    let events = journal.read_events(&ActorId::from("nobody"), 0).await.expect("read");
    assert!(events.is_empty());
    assert!(journal.load_snapshot(&ActorId::from("nobody")).await.unwrap().is_none());
    assert!(journal.actor_ids().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_corrupt_line_is_a_deserialization_error() {
    let dir = tempdir().expect("temp dir");
    let journal = FileJournal::new(dir.path());
    let actor = ActorId::from("case-1");
    journal.append(&actor, 0, vec![event("A", 1)]).await.expect("append");

    let mut content = std::fs::read_to_string(journal.events_path(&actor)).unwrap();
    content.push_str("{not json}\n");
    std::fs::write(journal.events_path(&actor), content).unwrap();

    let err = journal.read_events(&actor, 0).await.unwrap_err();
    assert!(matches!(err, AggregateError::DeserializationError(_)));
}

#[tokio::test]
async fn test_snapshot_round_trip_replaces_previous() {
    let dir = tempdir().expect("temp dir");
    let journal = FileJournal::new(dir.path());
    let actor = ActorId::from("tenant/acme");

    for sequence in [5, 9] {
        journal
            .save_snapshot(StoredSnapshot {
                actor_id: actor.clone(),
                sequence,
                manifest: "Tenant".to_string(),
                schema_version: 1,
                snapshot_at: TimestampUtc::now(),
                state: Value::from(sequence as i64),
            })
            .await
            .expect("save");
    }

    let loaded = journal.load_snapshot(&actor).await.unwrap().expect("snapshot");
    assert_eq!(loaded.sequence, 9);
    assert!(journal.snapshot_path(&actor).starts_with(dir.path()));
    assert!(!journal.snapshot_path(&actor).with_extension("json.tmp").exists());
}

#[tokio::test]
async fn test_actor_ids_use_recorded_ids() {
    let dir = tempdir().expect("temp dir");
    let journal = FileJournal::new(dir.path());
    for id in ["b/2", "a-1"] {
        journal
            .append(&ActorId::from(id), 0, vec![event("A", 1)])
            .await
            .expect("append");
    }
    let ids = journal.actor_ids().await.expect("ids");
    assert_eq!(ids, vec![ActorId::from("a-1"), ActorId::from("b/2")]);
}
