//! Day-rotated JSONL journal of bot events and notifications.

use std::fs::{create_dir_all, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use common::{Notification, Result};
use serde_json::json;
use streak_engine::Notifier;
use tokio::sync::Mutex;

use crate::render::{render, Labels};

pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub struct EventJournal {
    dir: PathBuf,
    day_key: String,
    file: File,
}

impl EventJournal {
    pub fn open(dir: PathBuf) -> std::io::Result<Self> {
        create_dir_all(&dir)?;
        let day_key = Utc::now().format("%Y-%m-%d").to_string();
        let file = Self::open_day_file(&dir, &day_key)?;
        Ok(Self { dir, day_key, file })
    }

    fn open_day_file(dir: &Path, day_key: &str) -> std::io::Result<File> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(format!("streaks-{}.jsonl", day_key)))
    }

    fn rotate_if_needed(&mut self) -> std::io::Result<()> {
        let today = Utc::now().format("%Y-%m-%d").to_string();
        if today != self.day_key {
            self.file = Self::open_day_file(&self.dir, &today)?;
            self.day_key = today;
        }
        Ok(())
    }

    /// Append one event line.
    pub fn append(&mut self, event: &serde_json::Value) -> std::io::Result<()> {
        self.rotate_if_needed()?;
        let line = serde_json::to_string(event)?;
        writeln!(self.file, "{}", line)?;
        self.file.flush()
    }

    /// Append, logging instead of failing. For lifecycle events.
    pub fn write_event(&mut self, event: serde_json::Value) {
        if let Err(e) = self.append(&event) {
            tracing::warn!("journal write failed: {}", e);
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

pub type SharedJournal = Arc<Mutex<EventJournal>>;

pub async fn write_event(journal: &SharedJournal, event: serde_json::Value) {
    journal.lock().await.write_event(event);
}

/// Records every notification, rendered, in the journal.
pub struct JournalNotifier {
    journal: SharedJournal,
    labels: Labels,
}

impl JournalNotifier {
    pub fn new(journal: SharedJournal, labels: Labels) -> Self {
        Self { journal, labels }
    }
}

#[async_trait]
impl Notifier for JournalNotifier {
    async fn deliver(&self, notification: &Notification) -> Result<()> {
        let label = self.labels.label(notification);
        let event = json!({
            "ts": now_iso(),
            "kind": "notification",
            "id": notification.id,
            "subscriber_id": notification.subscriber_id,
            "destination": notification.destination,
            "source_id": notification.source_id,
            "period_id": notification.outcome.period_id,
            "face": notification.outcome.face,
            "triggers": notification.triggers,
            "text": render(notification, &label),
        });
        self.journal.lock().await.append(&event)?;
        Ok(())
    }
}
