//! Append-only recording log with file-based persistence.
//!
//! Each recording owns a directory holding its event log as
//! newline-delimited JSON (JSONL) plus, once the recording reaches a
//! terminal state, the final accepted set as `accepted.json`. JSONL
//! keeps the log easy to inspect and replay.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use uuid::Uuid;

use crate::domain::recording::{AcceptedSet, Recording};
use crate::domain::RecordingEvent;

/// File-based store for one recording's events and final output
pub struct RecordingStore {
    /// Directory containing the recording
    recording_dir: PathBuf,

    /// Path to the events.jsonl file
    events_path: PathBuf,

    /// Path to the finalized accepted set
    accepted_path: PathBuf,
}

impl RecordingStore {
    /// Create or open the store for a recording under the configured base
    pub async fn open(recording_id: Uuid) -> Result<Self> {
        let base_dir = Self::base_directory()?;
        Self::open_in(&base_dir, recording_id).await
    }

    /// Create or open the store for a recording under an explicit base
    pub async fn open_in(base_dir: &Path, recording_id: Uuid) -> Result<Self> {
        let recording_dir = base_dir.join(recording_id.to_string());

        fs::create_dir_all(&recording_dir).await.with_context(|| {
            format!(
                "Failed to create recording directory: {}",
                recording_dir.display()
            )
        })?;

        let events_path = recording_dir.join("events.jsonl");
        let accepted_path = recording_dir.join("accepted.json");

        Ok(Self {
            recording_dir,
            events_path,
            accepted_path,
        })
    }

    /// Base directory for all recordings (~/.acta/recordings or $ACTA_HOME/recordings)
    pub fn base_directory() -> Result<PathBuf> {
        crate::config::recordings_dir()
    }

    /// Get the recording directory
    pub fn recording_dir(&self) -> &Path {
        &self.recording_dir
    }

    /// Get the path to the events file
    pub fn events_path(&self) -> &Path {
        &self.events_path
    }

    /// Get the path to the finalized accepted set
    pub fn accepted_path(&self) -> &Path {
        &self.accepted_path
    }

    /// Append a single event to the log
    pub async fn append(&self, event: &RecordingEvent) -> Result<()> {
        self.append_all(std::slice::from_ref(event)).await
    }

    /// Append a batch of events in order.
    ///
    /// A pass's events are buffered in memory while it runs and land
    /// here in one call, so a cancelled pass leaves no trace in the log.
    pub async fn append_all(&self, events: &[RecordingEvent]) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.events_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to open events file: {}",
                    self.events_path.display()
                )
            })?;

        let mut buffer = String::new();
        for event in events {
            let json = serde_json::to_string(event).context("Failed to serialize event")?;
            buffer.push_str(&json);
            buffer.push('\n');
        }

        file.write_all(buffer.as_bytes())
            .await
            .context("Failed to write events")?;
        file.flush().await.context("Failed to flush events")?;

        Ok(())
    }

    /// Replay all events in order
    pub async fn replay(&self) -> Result<Vec<RecordingEvent>> {
        if !self.events_path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.events_path).await.with_context(|| {
            format!(
                "Failed to open events file: {}",
                self.events_path.display()
            )
        })?;

        let reader = BufReader::new(file);
        let mut lines = reader.lines();
        let mut events = Vec::new();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let event: RecordingEvent = serde_json::from_str(&line)
                .with_context(|| format!("Failed to parse event: {}", line))?;
            events.push(event);
        }

        Ok(events)
    }

    /// Rebuild the recording's current state from its log
    pub async fn load_recording(&self) -> Result<Option<Recording>> {
        let events = self.replay().await?;
        Ok(Recording::from_events(&events))
    }

    /// Write the finalized accepted set next to the log
    pub async fn write_accepted(&self, set: &AcceptedSet) -> Result<PathBuf> {
        let json =
            serde_json::to_string_pretty(set).context("Failed to serialize accepted set")?;

        fs::write(&self.accepted_path, json).await.with_context(|| {
            format!(
                "Failed to write accepted set: {}",
                self.accepted_path.display()
            )
        })?;

        Ok(self.accepted_path.clone())
    }

    /// Load the finalized accepted set, if the recording produced one
    pub async fn load_accepted(&self) -> Result<Option<AcceptedSet>> {
        if !self.accepted_path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.accepted_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to read accepted set: {}",
                    self.accepted_path.display()
                )
            })?;

        let set = serde_json::from_str(&content).context("Failed to parse accepted set")?;
        Ok(Some(set))
    }

    /// List all recording IDs under the configured base directory
    pub async fn list_recordings() -> Result<Vec<Uuid>> {
        let base_dir = Self::base_directory()?;
        Self::list_recordings_in(&base_dir).await
    }

    /// List all recording IDs under an explicit base directory
    pub async fn list_recordings_in(base_dir: &Path) -> Result<Vec<Uuid>> {
        if !base_dir.exists() {
            return Ok(Vec::new());
        }

        let mut recordings = Vec::new();
        let mut entries = fs::read_dir(base_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    if let Ok(uuid) = Uuid::parse_str(name) {
                        recordings.push(uuid);
                    }
                }
            }
        }

        Ok(recordings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RecordingEventType;
    use tempfile::TempDir;

    async fn create_test_store() -> (RecordingStore, Uuid, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let recording_id = Uuid::new_v4();
        let store = RecordingStore::open_in(temp_dir.path(), recording_id)
            .await
            .unwrap();
        (store, recording_id, temp_dir)
    }

    #[tokio::test]
    async fn test_append_and_replay_in_order() {
        let (store, recording_id, _temp) = create_test_store().await;

        store
            .append(&RecordingEvent::new(
                recording_id,
                None,
                RecordingEventType::RecordingCreated,
                "Recording created",
            ))
            .await
            .unwrap();
        store
            .append(&RecordingEvent::new(
                recording_id,
                Some(0),
                RecordingEventType::PassStarted,
                "Pass 0",
            ))
            .await
            .unwrap();

        let events = store.replay().await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, RecordingEventType::RecordingCreated);
        assert_eq!(events[1].event_type, RecordingEventType::PassStarted);
    }

    #[tokio::test]
    async fn test_append_all_writes_batch_in_order() {
        let (store, recording_id, _temp) = create_test_store().await;

        let batch: Vec<RecordingEvent> = (0..5)
            .map(|i| {
                RecordingEvent::new(
                    recording_id,
                    Some(i),
                    RecordingEventType::PassStarted,
                    format!("Pass {}", i),
                )
            })
            .collect();

        store.append_all(&batch).await.unwrap();

        let events = store.replay().await.unwrap();
        assert_eq!(events.len(), 5);
        for (i, event) in events.iter().enumerate() {
            assert_eq!(event.pass_index, Some(i as u32));
        }
    }

    #[tokio::test]
    async fn test_load_recording_rebuilds_state() {
        let (store, recording_id, _temp) = create_test_store().await;

        assert!(store.load_recording().await.unwrap().is_none());

        store
            .append_all(&[
                RecordingEvent::new(
                    recording_id,
                    None,
                    RecordingEventType::RecordingCreated,
                    "Recording created",
                ),
                RecordingEvent::new(
                    recording_id,
                    None,
                    RecordingEventType::RecordingCompleted,
                    "Finalized",
                ),
            ])
            .await
            .unwrap();

        let recording = store.load_recording().await.unwrap().unwrap();
        assert_eq!(recording.id, recording_id);
        assert!(recording.is_terminal());
    }

    #[tokio::test]
    async fn test_accepted_set_write_and_load() {
        let (store, _recording_id, _temp) = create_test_store().await;

        assert!(store.load_accepted().await.unwrap().is_none());

        let mut set = AcceptedSet::empty();
        set.version = 2;
        let path = store.write_accepted(&set).await.unwrap();
        assert!(path.exists());

        let loaded = store.load_accepted().await.unwrap().unwrap();
        assert_eq!(loaded.version, 2);
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn test_list_recordings_skips_foreign_directories() {
        let temp_dir = TempDir::new().unwrap();
        let id = Uuid::new_v4();
        RecordingStore::open_in(temp_dir.path(), id).await.unwrap();
        std::fs::create_dir(temp_dir.path().join("not-a-uuid")).unwrap();

        let listed = RecordingStore::list_recordings_in(temp_dir.path())
            .await
            .unwrap();
        assert_eq!(listed, vec![id]);
    }

    #[test]
    fn test_replay_of_missing_log_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = tokio_test::block_on(RecordingStore::open_in(
            temp_dir.path(),
            Uuid::new_v4(),
        ))
        .unwrap();

        let events = tokio_test::block_on(store.replay()).unwrap();
        assert!(events.is_empty());
    }
}
