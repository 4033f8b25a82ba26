use std::{io::Write, path::Path};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::audio::AudioEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    Audio,
    Trial,
    Story,
    System,
}

impl EventCategory {
    pub fn as_str(&self) -> &str {
        match self {
            EventCategory::Audio => "audio",
            EventCategory::Trial => "trial",
            EventCategory::Story => "story",
            EventCategory::System => "system",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EventLogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub category: EventCategory,
    pub event: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub story_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track: Option<String>,
}

/// Shown once per story when any track failed.
pub const FAILURE_NOTICE: &str = "Music could not be played for part of this story.";

/// Session-long record of noteworthy events, mirrored to the `log` facade.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticsLog {
    entries: Vec<EventLogEntry>,
}

impl DiagnosticsLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &mut self,
        level: LogLevel,
        category: EventCategory,
        event: &str,
        message: &str,
        story_id: Option<&str>,
        track: Option<&str>,
    ) {
        match level {
            LogLevel::Debug => log::debug!("[{}] {}: {}", category.as_str(), event, message),
            LogLevel::Info => log::info!("[{}] {}: {}", category.as_str(), event, message),
            LogLevel::Warn => log::warn!("[{}] {}: {}", category.as_str(), event, message),
            LogLevel::Error => log::error!("[{}] {}: {}", category.as_str(), event, message),
        }
        self.entries.push(EventLogEntry {
            timestamp: Utc::now(),
            level,
            category,
            event: event.to_string(),
            message: message.to_string(),
            story_id: story_id.map(str::to_string),
            track: track.map(str::to_string),
        });
    }

    /// Record an engine outcome. Returns a short notice for the reader when
    /// the event is a failure.
    pub fn record_audio(&mut self, story_id: &str, event: &AudioEvent) -> Option<String> {
        match event {
            AudioEvent::Started { track } => {
                let name = track.name();
                self.record(LogLevel::Debug, EventCategory::Audio, "track_started", &name, Some(story_id), Some(&name));
                None
            }
            AudioEvent::Superseded { track } => {
                let name = track.name();
                self.record(
                    LogLevel::Debug,
                    EventCategory::Audio,
                    "track_superseded",
                    "a newer switch arrived before loading finished",
                    Some(story_id),
                    Some(&name),
                );
                None
            }
            AudioEvent::Failed { track, error } => {
                let name = track.name();
                self.record(
                    LogLevel::Warn,
                    EventCategory::Audio,
                    "track_failed",
                    &error.to_string(),
                    Some(story_id),
                    Some(&name),
                );
                Some(FAILURE_NOTICE.to_string())
            }
            AudioEvent::Stopped => {
                self.record(LogLevel::Debug, EventCategory::Audio, "stopped", "music stopped", Some(story_id), None);
                None
            }
        }
    }

    pub fn entries(&self) -> &[EventLogEntry] {
        &self.entries
    }

    pub fn audio_failures(&self, story_id: &str) -> usize {
        self.entries
            .iter()
            .filter(|e| e.event == "track_failed" && e.story_id.as_deref() == Some(story_id))
            .count()
    }

    /// One JSON object per line.
    pub fn write_jsonl(&self, path: &Path) -> std::io::Result<()> {
        let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
        for entry in &self.entries {
            serde_json::to_writer(&mut file, entry)?;
            file.write_all(b"\n")?;
        }
        file.flush()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::{audio::AudioError, scheduler::Track};

    #[test]
    fn failures_are_counted_per_story() {
        let mut log = DiagnosticsLog::new();
        let failed = AudioEvent::Failed {
            track: Track::Cluster(2),
            error: AudioError::Load { path: PathBuf::from("a.mp3"), reason: "gone".into() },
        };
        let notice = log.record_audio("lantern", &failed);
        assert_eq!(notice.as_deref(), Some(FAILURE_NOTICE));
        log.record_audio("carnival", &failed);
        assert_eq!(log.record_audio("lantern", &AudioEvent::Started { track: Track::Average }), None);

        assert_eq!(log.audio_failures("lantern"), 1);
        assert_eq!(log.audio_failures("carnival"), 1);
        assert_eq!(log.entries().len(), 3);
        assert_eq!(log.entries()[0].level, LogLevel::Warn);
        assert_eq!(log.entries()[0].track.as_deref(), Some("cluster_2"));
    }

    #[test]
    fn entries_serialize_without_empty_fields() {
        let mut log = DiagnosticsLog::new();
        log.record(LogLevel::Info, EventCategory::System, "startup", "ready", None, None);
        let json = serde_json::to_value(&log.entries()[0]).unwrap();
        assert_eq!(json["level"], "info");
        assert_eq!(json["category"], "system");
        assert!(json.get("story_id").is_none());
    }
}
