//! Alignment between the text's sentence IDs and the music mapping's IDs.
//!
//! The mapping numbers sentences in its own space, a constant offset away from
//! the text's numbering. [`SegmentIndex::build`] derives that offset once per
//! story, corrects every mapped ID, finds the sentences the mapping leaves out
//! and groups them into synthetic "additional" partitions.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::Serialize;

use crate::{error::LoadError, story::Story};

/// Named clusters are numbered 1..=3 in declaration order.
pub const MAX_NAMED_CLUSTERS: usize = 3;
/// Cluster number of every sentence the mapping does not cover.
pub const UNCOVERED_CLUSTER: u8 = 4;

// ── Partition ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum PartitionKind {
    Mapped {
        cluster_key: String,
        /// 1-based position within the cluster.
        index_in_cluster: usize,
    },
    /// Synthesised for sentences the mapping does not cover.
    Additional,
}

/// A group of sentences highlighted together. IDs are always text-native.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Partition {
    pub kind: PartitionKind,
    pub sentence_ids: Vec<i64>,
}

impl Partition {
    pub fn is_additional(&self) -> bool {
        matches!(self.kind, PartitionKind::Additional)
    }

    pub fn first_sentence(&self) -> Option<i64> {
        self.sentence_ids.first().copied()
    }

    pub fn contains(&self, sentence_id: i64) -> bool {
        self.sentence_ids.contains(&sentence_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cluster {
    pub key: String,
    /// 1..=3, by declaration order.
    pub number: u8,
    pub partitions: Vec<Partition>,
}

// ── SegmentIndex ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentIndex {
    story_id: String,
    offset: i64,
    sentence_ids: Vec<i64>,
    clusters: Vec<Cluster>,
    covered: BTreeSet<i64>,
    cluster_numbers: BTreeMap<i64, u8>,
    additional: Vec<Partition>,
}

impl SegmentIndex {
    /// Derive the offset, corrected partitions, coverage, cluster numbers and
    /// additional partitions for `story`.
    ///
    /// Any inconsistency in the mapping is a [`LoadError`]: an index with an
    /// undefined offset must never reach the sequencer.
    pub fn build(story: &Story) -> Result<Self, LoadError> {
        let story_id = story.id.clone();
        let first_text_id = story
            .sentences
            .first()
            .map(|s| s.id)
            .ok_or_else(|| LoadError::EmptyText { story: story_id.clone() })?;

        let mapping = story.midi_mapping.clusters();
        if mapping.is_empty() {
            return Err(LoadError::EmptyMapping { story: story_id });
        }
        if mapping.len() > MAX_NAMED_CLUSTERS {
            return Err(LoadError::TooManyClusters {
                story: story_id,
                count: mapping.len(),
                max: MAX_NAMED_CLUSTERS,
            });
        }

        // Raw (foreign-space) IDs per cluster, per partition.
        let mut raw_clusters = Vec::with_capacity(mapping.len());
        for cluster in mapping {
            let mut partitions = Vec::with_capacity(cluster.partitions.len());
            for (i, partition) in cluster.partitions.iter().enumerate() {
                let ids = parse_sentence_ids(&partition.sentence_ids).map_err(|raw| {
                    LoadError::InvalidSentenceId {
                        story: story_id.clone(),
                        cluster: cluster.key.clone(),
                        raw,
                    }
                })?;
                if ids.is_empty() {
                    return Err(LoadError::EmptyPartition {
                        story: story_id.clone(),
                        cluster: cluster.key.clone(),
                        partition: i + 1,
                    });
                }
                partitions.push(ids);
            }
            raw_clusters.push((cluster.key.clone(), partitions));
        }

        let first_mapped_id = raw_clusters[0]
            .1
            .first()
            .and_then(|ids| ids.first().copied())
            .ok_or_else(|| LoadError::EmptyPartition {
                story: story_id.clone(),
                cluster: raw_clusters[0].0.clone(),
                partition: 1,
            })?;
        let offset = first_mapped_id - first_text_id;

        let sentence_ids: Vec<i64> = story.sentences.iter().map(|s| s.id).collect();
        let known: HashSet<i64> = sentence_ids.iter().copied().collect();

        let mut covered = BTreeSet::new();
        let mut cluster_numbers = BTreeMap::new();
        let mut clusters = Vec::with_capacity(raw_clusters.len());

        for (position, (key, raw_partitions)) in raw_clusters.into_iter().enumerate() {
            let number = position as u8 + 1;
            let mut partitions = Vec::with_capacity(raw_partitions.len());
            for (i, raw_ids) in raw_partitions.into_iter().enumerate() {
                let mut corrected = Vec::with_capacity(raw_ids.len());
                for raw in raw_ids {
                    let id = raw - offset;
                    if !known.contains(&id) {
                        return Err(LoadError::SentenceOutOfRange {
                            story: story_id,
                            cluster: key,
                            sentence_id: id,
                            offset,
                        });
                    }
                    covered.insert(id);
                    cluster_numbers.insert(id, number);
                    corrected.push(id);
                }
                partitions.push(Partition {
                    kind: PartitionKind::Mapped {
                        cluster_key: key.clone(),
                        index_in_cluster: i + 1,
                    },
                    sentence_ids: corrected,
                });
            }
            clusters.push(Cluster { key, number, partitions });
        }

        let uncovered: Vec<i64> = sentence_ids
            .iter()
            .copied()
            .filter(|id| !covered.contains(id))
            .collect();
        for &id in &uncovered {
            cluster_numbers.insert(id, UNCOVERED_CLUSTER);
        }
        let additional = chunk_uncovered(&uncovered)
            .into_iter()
            .map(|sentence_ids| Partition { kind: PartitionKind::Additional, sentence_ids })
            .collect::<Vec<_>>();

        log::info!(
            "Story '{}': {} sentences, {} covered, {} uncovered, offset {}, {} additional partitions",
            story.id,
            sentence_ids.len(),
            covered.len(),
            uncovered.len(),
            offset,
            additional.len()
        );

        Ok(Self {
            story_id: story.id.clone(),
            offset,
            sentence_ids,
            clusters,
            covered,
            cluster_numbers,
            additional,
        })
    }

    pub fn story_id(&self) -> &str {
        &self.story_id
    }

    /// `first mapped ID − first text ID`; subtract from mapped IDs.
    pub fn offset(&self) -> i64 {
        self.offset
    }

    pub fn sentence_ids(&self) -> &[i64] {
        &self.sentence_ids
    }

    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    /// Text-native IDs reached by the mapping.
    pub fn covered(&self) -> &BTreeSet<i64> {
        &self.covered
    }

    pub fn additional(&self) -> &[Partition] {
        &self.additional
    }

    /// Cluster number (1..=4) of a sentence. Unknown IDs count as uncovered.
    pub fn cluster_number(&self, sentence_id: i64) -> u8 {
        self.cluster_numbers
            .get(&sentence_id)
            .copied()
            .unwrap_or(UNCOVERED_CLUSTER)
    }

    pub fn mapped_partition_count(&self) -> usize {
        self.clusters.iter().map(|c| c.partitions.len()).sum()
    }

    pub fn total_partition_count(&self) -> usize {
        self.mapped_partition_count() + self.additional.len()
    }
}

/// Parse a comma-joined ID list. Blank entries are skipped, repeats dropped.
/// On failure returns the offending token.
pub fn parse_sentence_ids(raw: &str) -> Result<Vec<i64>, String> {
    let mut ids = Vec::new();
    for token in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let id = token.parse::<i64>().map_err(|_| token.to_string())?;
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    Ok(ids)
}

/// Group uncovered sentences in twos; a tail of exactly three stays together
/// so no partition is a lone trailing sentence.
pub fn chunk_uncovered(ids: &[i64]) -> Vec<Vec<i64>> {
    let mut groups = Vec::with_capacity(ids.len() / 2 + 1);
    let mut rest = ids;
    while !rest.is_empty() {
        let take = if rest.len() == 3 { 3 } else { rest.len().min(2) };
        let (group, tail) = rest.split_at(take);
        groups.push(group.to_vec());
        rest = tail;
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::story::{AlignmentMapping, Sentence};

    fn story(ids: impl IntoIterator<Item = i64>, mapping: AlignmentMapping) -> Story {
        Story {
            id: "test".into(),
            title: "Test".into(),
            sentences: ids
                .into_iter()
                .map(|id| Sentence::new(id, format!("Sentence {id}.")))
                .collect(),
            midi_mapping: mapping,
            midi_dir_name: None,
        }
    }

    fn scenario() -> Story {
        story(0..=5, AlignmentMapping::from_pairs([("A", vec!["10,11", "12,13,14"])]))
    }

    #[test]
    fn offset_is_derived_from_first_mapped_and_first_text_id() {
        let index = SegmentIndex::build(&scenario()).unwrap();
        assert_eq!(index.offset(), 10);
        let mapped: Vec<Vec<i64>> = index.clusters()[0]
            .partitions
            .iter()
            .map(|p| p.sentence_ids.clone())
            .collect();
        assert_eq!(mapped, vec![vec![0, 1], vec![2, 3, 4]]);
        assert_eq!(index.covered().iter().copied().collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);
        assert_eq!(index.additional().len(), 1);
        assert_eq!(index.additional()[0].sentence_ids, vec![5]);
        assert!(index.additional()[0].is_additional());
    }

    #[test]
    fn offset_handles_text_starting_at_one() {
        // Mapping counts from 0 while the text counts from 1.
        let s = story(1..=6, AlignmentMapping::from_pairs([("1to2", vec!["0,1", "2"]), ("2to3", vec!["3,4"])]));
        let index = SegmentIndex::build(&s).unwrap();
        assert_eq!(index.offset(), -1);
        assert_eq!(index.clusters()[0].partitions[0].sentence_ids, vec![1, 2]);
        assert_eq!(index.clusters()[1].partitions[0].sentence_ids, vec![4, 5]);
        assert_eq!(index.additional()[0].sentence_ids, vec![6]);
    }

    #[test]
    fn coverage_and_additional_partition_the_text_exactly() {
        let s = story(
            0..20,
            AlignmentMapping::from_pairs([
                ("1to2", vec!["0,1", "2,3,4"]),
                ("2to3", vec!["5", "6,7"]),
                ("3to4", vec!["8,9,10,11"]),
            ]),
        );
        let index = SegmentIndex::build(&s).unwrap();
        let mut seen: Vec<i64> = index.covered().iter().copied().collect();
        for p in index.additional() {
            for &id in &p.sentence_ids {
                assert!(!index.covered().contains(&id), "sentence {id} in both tiers");
                seen.push(id);
            }
        }
        seen.sort_unstable();
        assert_eq!(seen, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn chunking_prefers_pairs_and_keeps_a_trailing_three() {
        let sizes = |n: i64| -> Vec<usize> {
            chunk_uncovered(&(0..n).collect::<Vec<_>>())
                .iter()
                .map(Vec::len)
                .collect()
        };
        assert_eq!(sizes(0), Vec::<usize>::new());
        assert_eq!(sizes(1), vec![1]);
        assert_eq!(sizes(2), vec![2]);
        assert_eq!(sizes(3), vec![3]);
        assert_eq!(sizes(4), vec![2, 2]);
        assert_eq!(sizes(5), vec![2, 3]);
        assert_eq!(sizes(7), vec![2, 2, 3]);
    }

    #[test]
    fn chunking_preserves_order() {
        assert_eq!(
            chunk_uncovered(&[4, 9, 12, 13, 20]),
            vec![vec![4, 9], vec![12, 13, 20]]
        );
    }

    #[test]
    fn cluster_numbers_follow_declaration_order_and_default_to_four() {
        let s = story(
            0..8,
            AlignmentMapping::from_pairs([("3to4", vec!["0,1"]), ("1to2", vec!["2,3"]), ("2to3", vec!["4"])]),
        );
        let index = SegmentIndex::build(&s).unwrap();
        assert_eq!(index.cluster_number(0), 1);
        assert_eq!(index.cluster_number(3), 2);
        assert_eq!(index.cluster_number(4), 3);
        assert_eq!(index.cluster_number(5), UNCOVERED_CLUSTER);
        assert_eq!(index.cluster_number(7), UNCOVERED_CLUSTER);
        assert_eq!(index.cluster_number(999), UNCOVERED_CLUSTER);
    }

    #[test]
    fn ids_parse_with_spaces_and_trailing_commas() {
        assert_eq!(parse_sentence_ids(" 3, 4 ,5,"), Ok(vec![3, 4, 5]));
        assert_eq!(parse_sentence_ids("7,7,8"), Ok(vec![7, 8]));
        assert_eq!(parse_sentence_ids("1,x"), Err("x".to_string()));
    }

    #[test]
    fn empty_mapping_is_a_load_error() {
        let s = story(0..3, AlignmentMapping::default());
        assert!(matches!(SegmentIndex::build(&s), Err(LoadError::EmptyMapping { .. })));
    }

    #[test]
    fn first_partition_without_ids_is_a_load_error() {
        let s = story(0..3, AlignmentMapping::from_pairs([("1to2", vec![" "])]));
        assert!(matches!(
            SegmentIndex::build(&s),
            Err(LoadError::EmptyPartition { partition: 1, .. })
        ));

        let s = story(0..3, AlignmentMapping::from_pairs([("1to2", vec![])]));
        assert!(matches!(SegmentIndex::build(&s), Err(LoadError::EmptyPartition { .. })));
    }

    #[test]
    fn unparsable_id_is_a_load_error() {
        let s = story(0..3, AlignmentMapping::from_pairs([("1to2", vec!["0,one"])]));
        assert!(matches!(
            SegmentIndex::build(&s),
            Err(LoadError::InvalidSentenceId { raw, .. }) if raw == "one"
        ));
    }

    #[test]
    fn mapped_id_outside_text_is_a_load_error() {
        let s = story(0..3, AlignmentMapping::from_pairs([("1to2", vec!["10,11", "15"])]));
        assert!(matches!(
            SegmentIndex::build(&s),
            Err(LoadError::SentenceOutOfRange { sentence_id: 5, offset: 10, .. })
        ));
    }

    #[test]
    fn more_than_three_clusters_is_a_load_error() {
        let s = story(
            0..4,
            AlignmentMapping::from_pairs([("a", vec!["0"]), ("b", vec!["1"]), ("c", vec!["2"]), ("d", vec!["3"])]),
        );
        assert!(matches!(
            SegmentIndex::build(&s),
            Err(LoadError::TooManyClusters { count: 4, .. })
        ));
    }

    #[test]
    fn empty_text_is_a_load_error() {
        let s = story(std::iter::empty(), AlignmentMapping::from_pairs([("a", vec!["0"])]));
        assert!(matches!(SegmentIndex::build(&s), Err(LoadError::EmptyText { .. })));
    }

    #[test]
    fn partition_counts() {
        let index = SegmentIndex::build(&scenario()).unwrap();
        assert_eq!(index.mapped_partition_count(), 2);
        assert_eq!(index.total_partition_count(), 3);
    }
}
