use std::path::Path;

use crate::{
    analytics::{DiagnosticsLog, EventCategory, LogLevel},
    config::AppConfig,
    error::AppError,
    scheduler::PlannedTrial,
    story::StoryLibrary,
    trial::{Participant, TrialRecord, TrialSummary},
};

/// Everything one participant session needs: the configuration, the loaded
/// stories, the planned trials and what has been recorded so far.
pub struct ExperimentState {
    pub config: AppConfig,
    pub library: StoryLibrary,
    pub participant: Participant,
    pub plan: Vec<PlannedTrial>,
    pub records: Vec<TrialRecord>,
    pub diagnostics: DiagnosticsLog,
}

impl ExperimentState {
    pub fn new(config: AppConfig, library: StoryLibrary, participant: Participant, plan: Vec<PlannedTrial>) -> Self {
        let mut diagnostics = DiagnosticsLog::new();
        for prepared in library.iter() {
            let index = &prepared.index;
            diagnostics.record(
                LogLevel::Debug,
                EventCategory::Story,
                "story_loaded",
                &format!(
                    "{} sentences, {} mapped partitions, {} additional, offset {}",
                    prepared.story.sentences.len(),
                    index.mapped_partition_count(),
                    index.additional().len(),
                    index.offset()
                ),
                Some(&prepared.story.id),
                None,
            );
        }
        Self {
            config,
            library,
            participant,
            plan,
            records: Vec::new(),
            diagnostics,
        }
    }

    pub fn record(&mut self, summary: TrialSummary) {
        self.records.push(TrialRecord {
            participant: self.participant.clone(),
            summary,
        });
    }

    pub fn records_json(&self) -> Result<String, AppError> {
        Ok(serde_json::to_string_pretty(&self.records)?)
    }

    pub fn write_records(&self, path: &Path) -> Result<(), AppError> {
        std::fs::write(path, self.records_json()?)?;
        log::info!("Wrote {} trial records to {}", self.records.len(), path.display());
        Ok(())
    }
}
