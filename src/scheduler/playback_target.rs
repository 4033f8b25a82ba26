//! Which track should be playing for the reader's current position.
//!
//! The three conditions differ only in the target they compute; the switching
//! rule is shared: a new target is issued when it differs from what is already
//! playing, and nothing is issued once the story is complete.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{
    segment_index::UNCOVERED_CLUSTER,
    sequencer::{PartitionSequencer, Position},
};
use crate::config::ClusterLoopOverride;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MusicCondition {
    /// One track per mapped partition.
    Regular,
    /// One track per cluster number.
    CrossFadedClusters,
    /// A single track for the whole story.
    AveragedMusic,
}

impl MusicCondition {
    pub const ALL: [MusicCondition; 3] = [
        MusicCondition::Regular,
        MusicCondition::CrossFadedClusters,
        MusicCondition::AveragedMusic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MusicCondition::Regular => "regular",
            MusicCondition::CrossFadedClusters => "cross-faded-clusters",
            MusicCondition::AveragedMusic => "averaged-music",
        }
    }
}

impl fmt::Display for MusicCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MusicCondition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MusicCondition::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown music condition '{s}'"))
    }
}

// ── Track ─────────────────────────────────────────────────────────────────────

/// A named audio asset within a story's track directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Track {
    /// `cluster_avg`
    Average,
    /// `cluster_<n>`, n in 1..=4
    Cluster(u8),
    /// `<cluster_key>_partition<n>`, n 1-based
    Partition { cluster_key: String, number: usize },
}

impl Track {
    pub fn name(&self) -> String {
        match self {
            Track::Average => "cluster_avg".to_string(),
            Track::Cluster(n) => format!("cluster_{n}"),
            Track::Partition { cluster_key, number } => format!("{cluster_key}_partition{number}"),
        }
    }
}

impl Serialize for Track {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.name())
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

// ── TargetResolver ────────────────────────────────────────────────────────────

/// Per-trial target selection. Holds the last issued track so repeated targets
/// are suppressed.
#[derive(Debug, Clone)]
pub struct TargetResolver {
    condition: MusicCondition,
    /// cluster key → looping cluster track, for the regular condition.
    overrides: Vec<(String, u8)>,
    playing: Option<Track>,
}

impl TargetResolver {
    pub fn new(condition: MusicCondition, story_id: &str, overrides: &[ClusterLoopOverride]) -> Self {
        let overrides = overrides
            .iter()
            .filter(|o| o.story_id == story_id)
            .map(|o| (o.cluster_key.clone(), o.cluster_number))
            .collect();
        Self {
            condition,
            overrides,
            playing: None,
        }
    }

    pub fn condition(&self) -> MusicCondition {
        self.condition
    }

    /// The last track handed out.
    pub fn playing(&self) -> Option<&Track> {
        self.playing.as_ref()
    }

    /// Track that belongs to the sequencer's position, whether or not it is
    /// already playing. `None` once complete.
    pub fn desired(&self, seq: &PartitionSequencer) -> Option<Track> {
        let position = seq.position();
        if position == Position::Complete {
            return None;
        }
        match self.condition {
            MusicCondition::AveragedMusic => Some(Track::Average),
            MusicCondition::CrossFadedClusters => {
                let first = seq.current()?.first_sentence()?;
                Some(Track::Cluster(seq.index().cluster_number(first)))
            }
            MusicCondition::Regular => match position {
                Position::Mapped { partition, .. } => {
                    let key = seq.cluster_key()?;
                    match self.overrides.iter().find(|(k, _)| k == key) {
                        Some((_, n)) => Some(Track::Cluster(*n)),
                        None => Some(Track::Partition {
                            cluster_key: key.to_string(),
                            number: partition + 1,
                        }),
                    }
                }
                Position::Additional { .. } => Some(Track::Cluster(UNCOVERED_CLUSTER)),
                Position::Complete => None,
            },
        }
    }

    /// Track to switch to after the sequencer moved (or at entry), if any.
    pub fn next_switch(&mut self, seq: &PartitionSequencer) -> Option<Track> {
        let target = self.desired(seq)?;
        if self.playing.as_ref() == Some(&target) {
            return None;
        }
        self.playing = Some(target.clone());
        Some(target)
    }
}
