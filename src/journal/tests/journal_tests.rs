use super::*;
use std::collections::HashMap;

fn event(manifest: &str) -> NewEvent {
    NewEvent {
        manifest: manifest.to_string(),
        payload: Value::Null,
        metadata: HashMap::new(),
    }
}

#[tokio::test]
async fn test_memory_journal_checks_expected_sequence() {
    let journal = MemoryJournal::new();
    let actor = ActorId::from("a");

    journal.append(&actor, 0, vec![event("A"), event("B")]).await.expect("append");
    let err = journal.append(&actor, 1, vec![event("C")]).await.unwrap_err();
    assert!(matches!(err, AggregateError::AggregateConflict));

    journal.append(&actor, 2, vec![event("C")]).await.expect("append");
    assert_eq!(journal.manifests(&actor).await, vec!["A", "B", "C"]);
}

#[tokio::test]
async fn test_injected_failures_are_consumed() {
    let journal = MemoryJournal::new();
    let actor = ActorId::from("a");
    journal.fail_next_appends(2);

    for _ in 0..2 {
        let err = journal.append(&actor, 0, vec![event("A")]).await.unwrap_err();
        assert!(matches!(err, AggregateError::UnexpectedError(_)));
    }
    journal.append(&actor, 0, vec![event("A")]).await.expect("third append");
    assert_eq!(journal.event_count(&actor).await, 1);
}

#[test]
fn test_stamp_numbers_from_first_sequence() {
    let stored = stamp(&ActorId::from("a"), 7, vec![event("A"), event("B")]);
    assert_eq!(stored[0].sequence, 7);
    assert_eq!(stored[1].sequence, 8);
    assert_eq!(stored[1].recorded_at, stored[0].recorded_at);
}
