use super::*;
use tempfile::TempDir;

fn create_test_logger() -> (TransactionLogger, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let logger = TransactionLogger::new(&temp_dir.path().join("logs").join("audit.jsonl"))
        .expect("Failed to create logger");
    (logger, temp_dir)
}

fn read_entries(logger: &TransactionLogger) -> Vec<AuditEntry> {
    std::fs::read_to_string(logger.path())
        .expect("Failed to read log file")
        .lines()
        .map(|line| serde_json::from_str(line).expect("Failed to parse audit entry"))
        .collect()
}

#[test]
fn test_entries_are_valid_json_with_actor_id() {
    let (logger, _dir) = create_test_logger();

    logger.log_command("case-1", "StartCase", "alice", "accepted");
    logger.log_batch("case-1", 1, &["CaseDefinitionApplied".to_string()]);
    logger.log_lifecycle("case-1", "recovered");

    let entries = read_entries(&logger);
    assert_eq!(entries.len(), 3);
    assert!(entries.iter().all(|e| e.actor_id == "case-1"));
    assert_eq!(entries[0].component, "Command");
    assert_eq!(entries[1].event["events"][0], "CaseDefinitionApplied");
}

#[test]
fn test_sequence_numbers_monotonic() {
    let (logger, _dir) = create_test_logger();
    for i in 0..10 {
        logger.log("a", "Test", serde_json::json!({ "iteration": i }));
    }

    let mut prev_seq = 0u64;
    for entry in read_entries(&logger) {
        assert!(entry.seq > prev_seq, "Sequence numbers should increase");
        prev_seq = entry.seq;
    }
    assert_eq!(prev_seq, 10);
}

#[test]
fn test_init_tracing_is_idempotent() {
    init_tracing("warn", false);
    init_tracing("debug", true);
}
