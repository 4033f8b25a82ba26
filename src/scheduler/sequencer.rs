//! Reading-order state machine over a [`SegmentIndex`].
//!
//! Mapped partitions come first (clusters in declaration order, partitions in
//! order), then the additional partitions, then `Complete`. Each advance moves
//! exactly one partition forward; there is no way back.

use serde::Serialize;

use super::segment_index::{Partition, SegmentIndex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    InMapping,
    InAdditional,
    Complete,
}

/// Where the reader is, as indices into the index's cluster and additional
/// lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Mapped { cluster: usize, partition: usize },
    Additional { index: usize },
    Complete,
}

/// Result of one advance event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Moved to the next partition within the same tier.
    Moved,
    /// Left the mapped tier for the first additional partition.
    EnteredAdditional,
    /// The last partition was passed.
    Completed,
    /// Advance after completion; nothing changed.
    Ignored,
}

/// Counts reported with the trial summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TraversalCounts {
    /// Mapped partitions highlighted so far.
    pub total_partitions: usize,
    /// Non-empty clusters entered so far.
    pub total_clusters: usize,
    pub additional_partitions_shown: usize,
}

#[derive(Debug, Clone)]
pub struct PartitionSequencer {
    index: SegmentIndex,
    phase: Phase,
    cluster: usize,
    partition: usize,
    additional: usize,
    counts: TraversalCounts,
}

impl PartitionSequencer {
    /// Start on the first partition of the first cluster, already highlighted.
    pub fn new(index: SegmentIndex) -> Self {
        // `SegmentIndex::build` rejects a first cluster without partitions.
        let counts = TraversalCounts {
            total_partitions: 1,
            total_clusters: 1,
            additional_partitions_shown: 0,
        };
        Self {
            index,
            phase: Phase::InMapping,
            cluster: 0,
            partition: 0,
            additional: 0,
            counts,
        }
    }

    pub fn index(&self) -> &SegmentIndex {
        &self.index
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_complete(&self) -> bool {
        self.phase == Phase::Complete
    }

    pub fn counts(&self) -> TraversalCounts {
        self.counts
    }

    pub fn position(&self) -> Position {
        match self.phase {
            Phase::InMapping => Position::Mapped {
                cluster: self.cluster,
                partition: self.partition,
            },
            Phase::InAdditional => Position::Additional { index: self.additional },
            Phase::Complete => Position::Complete,
        }
    }

    /// The partition currently highlighted; `None` once complete.
    pub fn current(&self) -> Option<&Partition> {
        match self.position() {
            Position::Mapped { cluster, partition } => self
                .index
                .clusters()
                .get(cluster)
                .and_then(|c| c.partitions.get(partition)),
            Position::Additional { index } => self.index.additional().get(index),
            Position::Complete => None,
        }
    }

    /// Sentence IDs on screen. The last partition stays highlighted once the
    /// text is complete.
    pub fn highlighted(&self) -> &[i64] {
        self.current()
            .or_else(|| self.final_partition())
            .map(|p| p.sentence_ids.as_slice())
            .unwrap_or(&[])
    }

    fn final_partition(&self) -> Option<&Partition> {
        if !self.is_complete() {
            return None;
        }
        self.index.additional().last().or_else(|| {
            self.index
                .clusters()
                .iter()
                .rev()
                .find_map(|c| c.partitions.last())
        })
    }

    /// Key of the cluster being read, while in the mapped tier.
    pub fn cluster_key(&self) -> Option<&str> {
        match self.position() {
            Position::Mapped { cluster, .. } => {
                self.index.clusters().get(cluster).map(|c| c.key.as_str())
            }
            _ => None,
        }
    }

    pub fn advance(&mut self) -> Transition {
        match self.phase {
            Phase::Complete => Transition::Ignored,
            Phase::InAdditional => {
                self.additional += 1;
                if self.additional >= self.index.additional().len() {
                    self.phase = Phase::Complete;
                    Transition::Completed
                } else {
                    self.counts.additional_partitions_shown += 1;
                    Transition::Moved
                }
            }
            Phase::InMapping => {
                let clusters = self.index.clusters();
                self.partition += 1;
                if self.partition < clusters[self.cluster].partitions.len() {
                    self.counts.total_partitions += 1;
                    return Transition::Moved;
                }

                self.partition = 0;
                self.cluster += 1;
                while self.cluster < clusters.len() && clusters[self.cluster].partitions.is_empty() {
                    log::debug!("Skipping empty cluster '{}'", clusters[self.cluster].key);
                    self.cluster += 1;
                }

                if self.cluster < clusters.len() {
                    self.counts.total_partitions += 1;
                    self.counts.total_clusters += 1;
                    Transition::Moved
                } else if self.index.additional().is_empty() {
                    self.phase = Phase::Complete;
                    Transition::Completed
                } else {
                    self.phase = Phase::InAdditional;
                    self.additional = 0;
                    self.counts.additional_partitions_shown += 1;
                    Transition::EnteredAdditional
                }
            }
        }
    }
}
