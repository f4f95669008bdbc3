//! File-based journal.
//!
//! Each actor gets its own pair of files under the journal directory:
//! - `<actor>.events.jsonl`: one [`StoredEvent`] per line
//! - `<actor>.snapshot.json`: the latest [`StoredSnapshot`], written via
//!   temp file + rename
//!
//! Appends take an exclusive `fs2` lock and check the last sequence before
//! writing the whole batch with a single `write_all`.

use super::{stamp, unexpected, Journal, JournalError, NewEvent, StoredEvent, StoredSnapshot};
use crate::actormodel::types::ActorId;
use async_trait::async_trait;
use cqrs_es::AggregateError;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const EVENTS_SUFFIX: &str = ".events.jsonl";
const SNAPSHOT_SUFFIX: &str = ".snapshot.json";

#[derive(Debug, Clone)]
pub struct FileJournal {
    directory: PathBuf,
}

impl FileJournal {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn events_path(&self, actor_id: &ActorId) -> PathBuf {
        self.directory
            .join(format!("{}{}", file_stem(actor_id), EVENTS_SUFFIX))
    }

    pub fn snapshot_path(&self, actor_id: &ActorId) -> PathBuf {
        self.directory
            .join(format!("{}{}", file_stem(actor_id), SNAPSHOT_SUFFIX))
    }
}

/// Actor ids are user supplied; keep them inside the journal directory.
fn file_stem(actor_id: &ActorId) -> String {
    actor_id
        .as_str()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn read_records(file: &File, actor_id: &ActorId) -> Result<Vec<StoredEvent>, JournalError> {
    let mut reader = BufReader::new(file.try_clone().map_err(unexpected)?);
    reader.seek(SeekFrom::Start(0)).map_err(unexpected)?;

    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line.map_err(unexpected)?;
        if line.trim().is_empty() {
            continue;
        }
        let stored: StoredEvent = serde_json::from_str(&line)
            .map_err(|e| AggregateError::DeserializationError(Box::new(e)))?;
        if &stored.actor_id == actor_id {
            records.push(stored);
        }
    }
    Ok(records)
}

fn last_sequence(file: &File, actor_id: &ActorId) -> Result<u64, JournalError> {
    Ok(read_records(file, actor_id)?
        .last()
        .map(|record| record.sequence)
        .unwrap_or(0))
}

#[async_trait]
impl Journal for FileJournal {
    async fn read_events(
        &self,
        actor_id: &ActorId,
        after: u64,
    ) -> Result<Vec<StoredEvent>, JournalError> {
        let file = match File::open(self.events_path(actor_id)) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(unexpected(e)),
        };
        file.lock_shared().map_err(unexpected)?;
        let records = read_records(&file, actor_id);
        let _ = FileExt::unlock(&file);

        Ok(records?
            .into_iter()
            .filter(|record| record.sequence > after)
            .collect())
    }

    async fn append(
        &self,
        actor_id: &ActorId,
        expected_sequence: u64,
        events: Vec<NewEvent>,
    ) -> Result<Vec<StoredEvent>, JournalError> {
        if events.is_empty() {
            return Ok(Vec::new());
        }
        std::fs::create_dir_all(&self.directory).map_err(unexpected)?;

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(self.events_path(actor_id))
            .map_err(unexpected)?;
        file.lock_exclusive().map_err(unexpected)?;

        let current = last_sequence(&file, actor_id)?;
        if current != expected_sequence {
            let _ = FileExt::unlock(&file);
            return Err(AggregateError::AggregateConflict);
        }

        let records = stamp(actor_id, expected_sequence + 1, events);
        let mut batch = String::new();
        for record in &records {
            batch.push_str(&serde_json::to_string(record).map_err(unexpected)?);
            batch.push('\n');
        }
        file.write_all(batch.as_bytes()).map_err(unexpected)?;
        file.flush().map_err(unexpected)?;
        file.sync_all().map_err(unexpected)?;
        let _ = FileExt::unlock(&file);

        Ok(records)
    }

    async fn load_snapshot(
        &self,
        actor_id: &ActorId,
    ) -> Result<Option<StoredSnapshot>, JournalError> {
        let content = match std::fs::read_to_string(self.snapshot_path(actor_id)) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(unexpected(e)),
        };
        let snapshot: StoredSnapshot = serde_json::from_str(&content)
            .map_err(|e| AggregateError::DeserializationError(Box::new(e)))?;
        Ok(Some(snapshot))
    }

    async fn save_snapshot(&self, snapshot: StoredSnapshot) -> Result<(), JournalError> {
        std::fs::create_dir_all(&self.directory).map_err(unexpected)?;
        let path = self.snapshot_path(&snapshot.actor_id);
        let content = serde_json::to_string(&snapshot).map_err(unexpected)?;

        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, content).map_err(unexpected)?;
        std::fs::rename(&tmp_path, &path).map_err(unexpected)?;
        Ok(())
    }

    async fn actor_ids(&self) -> Result<Vec<ActorId>, JournalError> {
        let entries = match std::fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(unexpected(e)),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let path = entry.map_err(unexpected)?.path();
            let is_log = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.ends_with(EVENTS_SUFFIX));
            if !is_log {
                continue;
            }
            // The file name is sanitized; the first record has the real id.
            let file = File::open(&path).map_err(unexpected)?;
            let first = BufReader::new(file).lines().next().transpose().map_err(unexpected)?;
            if let Some(line) = first {
                let stored: StoredEvent = serde_json::from_str(&line)
                    .map_err(|e| AggregateError::DeserializationError(Box::new(e)))?;
                ids.push(stored.actor_id);
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
#[path = "tests/file_store_tests.rs"]
mod tests;
