use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::scheduler::{MusicCondition, TraversalCounts};

/// What one trial produced, ready to be written to the experiment record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrialSummary {
    pub story_id: String,
    pub story_title: String,
    /// 1-based position in the participant's sequence.
    pub story_number: usize,
    pub music_condition: MusicCondition,
    #[serde(flatten)]
    pub counts: TraversalCounts,
    /// `false` when the trial was aborted before the end.
    pub completed: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub reading_time_ms: i64,
    pub audio_failures: usize,
}

/// Participant parameters attached to every record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Participant {
    pub prolific_pid: String,
    pub study_id: String,
    pub session_id: String,
}

impl Default for Participant {
    fn default() -> Self {
        Self {
            prolific_pid: "test_participant".to_string(),
            study_id: "test_study".to_string(),
            session_id: "test_session".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrialRecord {
    #[serde(flatten)]
    pub participant: Participant,
    #[serde(flatten)]
    pub summary: TrialSummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_serializes_flat() {
        let now = Utc::now();
        let record = TrialRecord {
            participant: Participant::default(),
            summary: TrialSummary {
                story_id: "lantern".into(),
                story_title: "The Lantern".into(),
                story_number: 3,
                music_condition: MusicCondition::AveragedMusic,
                counts: TraversalCounts {
                    total_partitions: 7,
                    total_clusters: 3,
                    additional_partitions_shown: 2,
                },
                completed: true,
                started_at: now,
                finished_at: now,
                reading_time_ms: 0,
                audio_failures: 0,
            },
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["prolific_pid"], "test_participant");
        assert_eq!(json["music_condition"], "averaged-music");
        assert_eq!(json["total_partitions"], 7);
        assert_eq!(json["total_clusters"], 3);
        assert_eq!(json["additional_partitions_shown"], 2);
        assert_eq!(json["story_number"], 3);
    }
}
