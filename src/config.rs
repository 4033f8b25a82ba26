use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{error::ConfigError, scheduler::playback_target::MusicCondition};

// ── MusicConfig ───────────────────────────────────────────────────────────────

/// Playback settings, fixed for the whole process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MusicConfig {
    /// Loop every track until it is replaced.
    pub looping: bool,
    /// Settled volume of the current track (linear 0.0 – 1.0).
    pub volume: f32,
    pub fade_in_ms: u32,
    pub fade_out_ms: u32,
    /// Number of volume steps per ramp.
    pub fade_steps: u32,
    /// Upper bound on waiting for a track to become playable. `0` waits forever.
    pub load_timeout_ms: u32,
}

impl Default for MusicConfig {
    fn default() -> Self {
        Self {
            looping: true,
            volume: 0.3,
            fade_in_ms: 1000,
            fade_out_ms: 1000,
            fade_steps: 50,
            load_timeout_ms: 10_000,
        }
    }
}

impl MusicConfig {
    pub fn fade_in(&self) -> Duration {
        Duration::from_millis(self.fade_in_ms as u64)
    }

    pub fn fade_out(&self) -> Duration {
        Duration::from_millis(self.fade_out_ms as u64)
    }

    pub fn load_timeout(&self) -> Option<Duration> {
        (self.load_timeout_ms > 0).then(|| Duration::from_millis(self.load_timeout_ms as u64))
    }
}

// ── ExperimentConfig ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionAssignment {
    pub story_id: String,
    pub condition: MusicCondition,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Fixed stories with fixed conditions instead of a shuffled assignment.
    pub demo: bool,
    pub show_progress_indicator: bool,
    pub show_music_indicator: bool,
    pub demo_assignments: Vec<ConditionAssignment>,
    /// Stories used outside demo mode; shuffled and given one condition each.
    pub study_stories: Vec<String>,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        let assign = |story_id: &str, condition| ConditionAssignment {
            story_id: story_id.to_string(),
            condition,
        };
        Self {
            demo: true,
            show_progress_indicator: true,
            show_music_indicator: true,
            demo_assignments: vec![
                assign("carnival_packed_away", MusicCondition::Regular),
                assign("starling_five", MusicCondition::CrossFadedClusters),
                assign("lantern", MusicCondition::AveragedMusic),
            ],
            study_stories: vec![
                "carnival_packed_away".to_string(),
                "starling_five".to_string(),
                "window_blue_curtain".to_string(),
            ],
        }
    }
}

// ── Stories and overrides ─────────────────────────────────────────────────────

/// Where one story's data lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryConfig {
    pub id: String,
    pub title: String,
    /// Story JSON file, relative to the config file's directory.
    pub data_path: PathBuf,
    /// Audio directory name; falls back to the story file's value, then the id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub midi_dir_name: Option<String>,
}

impl StoryConfig {
    fn new(id: &str, title: &str, midi_dir_name: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            data_path: PathBuf::from(format!("stories/{id}.json")),
            midi_dir_name: Some(midi_dir_name.to_string()),
        }
    }
}

/// Regular condition: play one looping cluster track for a whole cluster of a
/// story instead of its per-partition tracks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterLoopOverride {
    pub story_id: String,
    pub cluster_key: String,
    pub cluster_number: u8,
}

// ── AppConfig ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub music: MusicConfig,
    pub experiment: ExperimentConfig,
    pub stories: Vec<StoryConfig>,
    /// Root of the `<story_dir>/<track>.mp3` tree.
    pub audio_root: PathBuf,
    pub cluster_loop_overrides: Vec<ClusterLoopOverride>,
    /// Directory relative paths are resolved against; set by [`AppConfig::load`].
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            music: MusicConfig::default(),
            experiment: ExperimentConfig::default(),
            stories: vec![
                StoryConfig::new("carnival_packed_away", "The Carnival Packed Away", "carnival"),
                StoryConfig::new("lantern", "The Lantern in the Window", "lantern"),
                StoryConfig::new("starling_five", "Starling Five", "starling_five"),
                StoryConfig::new("window_blue_curtain", "Window Blue Curtain", "window_blue_curtain"),
            ],
            audio_root: PathBuf::from("audio"),
            cluster_loop_overrides: vec![ClusterLoopOverride {
                story_id: "starling_five".to_string(),
                cluster_key: "3to4".to_string(),
                cluster_number: 3,
            }],
            base_dir: PathBuf::from("."),
        }
    }
}

impl AppConfig {
    /// Read a JSON config file. Missing fields keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: AppConfig =
            serde_json::from_str(&raw).map_err(|source| ConfigError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        config.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let m = &self.music;
        if !(0.0..=1.0).contains(&m.volume) {
            return Err(ConfigError::Invalid(format!(
                "music.volume must be within 0.0..=1.0, got {}",
                m.volume
            )));
        }
        if m.fade_steps == 0 {
            return Err(ConfigError::Invalid("music.fade_steps must be at least 1".into()));
        }
        if let Some(o) = self
            .cluster_loop_overrides
            .iter()
            .find(|o| !(1..=4).contains(&o.cluster_number))
        {
            return Err(ConfigError::Invalid(format!(
                "cluster_loop_overrides: cluster_number {} for '{}' is outside 1..=4",
                o.cluster_number, o.story_id
            )));
        }
        Ok(())
    }

    pub fn story(&self, id: &str) -> Option<&StoryConfig> {
        self.stories.iter().find(|s| s.id == id)
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    pub fn audio_root(&self) -> PathBuf {
        self.resolve(&self.audio_root)
    }
}
