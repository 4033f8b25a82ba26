use std::path::PathBuf;

use clap::Parser;

use crate::{scheduler::MusicCondition, trial::Participant};

#[derive(Debug, Parser)]
#[command(name = "story-soundtrack")]
#[command(about = "Read stories with music that follows the text")]
pub struct Args {
    /// JSON configuration file; built-in defaults when omitted.
    #[arg(long, env = "STORY_SOUNDTRACK_CONFIG")]
    pub config: Option<PathBuf>,
    /// Run a single story instead of the configured sequence.
    #[arg(long)]
    pub story: Option<String>,
    /// Condition for `--story` (regular, cross-faded-clusters, averaged-music).
    #[arg(long, requires = "story")]
    pub condition: Option<MusicCondition>,
    /// No audio device; tracks are tracked in memory only.
    #[arg(long, default_value_t = false)]
    pub mute: bool,
    #[arg(long = "participant", env = "PROLIFIC_PID", default_value = "test_participant")]
    pub prolific_pid: String,
    #[arg(long = "study", env = "STUDY_ID", default_value = "test_study")]
    pub study_id: String,
    #[arg(long = "session", env = "SESSION_ID", default_value = "test_session")]
    pub session_id: String,
    /// Seed for the study-mode shuffle.
    #[arg(long)]
    pub seed: Option<u64>,
    /// Write trial records here as JSON instead of printing them.
    #[arg(long)]
    pub output: Option<PathBuf>,
    /// Write the diagnostics log here as JSON lines.
    #[arg(long)]
    pub log_file: Option<PathBuf>,
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl Args {
    pub fn participant(&self) -> Participant {
        Participant {
            prolific_pid: self.prolific_pid.clone(),
            study_id: self.study_id.clone(),
            session_id: self.session_id.clone(),
        }
    }
}
