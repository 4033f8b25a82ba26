use std::fmt;

use serde::{
    de::{MapAccess, Visitor},
    ser::SerializeMap,
    Deserialize, Deserializer, Serialize, Serializer,
};

// ── Sentence ──────────────────────────────────────────────────────────────────

/// One sentence of a story in the text's native ID space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sentence {
    pub id: i64,
    pub text: String,
}

impl Sentence {
    pub fn new(id: i64, text: impl Into<String>) -> Self {
        Self { id, text: text.into() }
    }
}

// ── Alignment mapping ─────────────────────────────────────────────────────────

/// One partition as it appears in the alignment data.
///
/// `sentence_ids` is a comma-joined list in the mapping's own ID space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingPartition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<u32>,
    pub sentence_ids: String,
}

impl MappingPartition {
    pub fn new(sentence_ids: impl Into<String>) -> Self {
        Self { partition: None, sentence_ids: sentence_ids.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingCluster {
    pub key: String,
    pub partitions: Vec<MappingPartition>,
}

/// Cluster key → ordered partitions, in the order the data declares them.
///
/// Stored as a vector because cluster order is significant (it drives both the
/// reading order and the cluster numbering) and a JSON object is unordered for
/// most map types.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlignmentMapping {
    clusters: Vec<MappingCluster>,
}

impl AlignmentMapping {
    pub fn new(clusters: Vec<MappingCluster>) -> Self {
        Self { clusters }
    }

    /// Convenience constructor used by fixtures: `[(key, ["1,2", "3"])]`.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, Vec<&'a str>)>) -> Self {
        let clusters = pairs
            .into_iter()
            .map(|(key, ids)| MappingCluster {
                key: key.to_string(),
                partitions: ids.into_iter().map(MappingPartition::new).collect(),
            })
            .collect();
        Self { clusters }
    }

    pub fn clusters(&self) -> &[MappingCluster] {
        &self.clusters
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }
}

impl Serialize for AlignmentMapping {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.clusters.len()))?;
        for cluster in &self.clusters {
            map.serialize_entry(&cluster.key, &cluster.partitions)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for AlignmentMapping {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderedClusters;

        impl<'de> Visitor<'de> for OrderedClusters {
            type Value = AlignmentMapping;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of cluster keys to partition lists")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut clusters = Vec::with_capacity(access.size_hint().unwrap_or(3));
                while let Some((key, partitions)) =
                    access.next_entry::<String, Vec<MappingPartition>>()?
                {
                    clusters.push(MappingCluster { key, partitions });
                }
                Ok(AlignmentMapping { clusters })
            }
        }

        deserializer.deserialize_map(OrderedClusters)
    }
}

// ── Story ─────────────────────────────────────────────────────────────────────

/// A story as delivered by the data source: text plus its music alignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub sentences: Vec<Sentence>,
    pub midi_mapping: AlignmentMapping,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub midi_dir_name: Option<String>,
}

impl Story {
    /// Directory under the audio root holding this story's tracks.
    pub fn dir_name(&self) -> &str {
        self.midi_dir_name.as_deref().unwrap_or(&self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapping_keeps_declared_cluster_order() {
        let json = r#"{
            "3to4": [{"partition": 1, "sentence_ids": "9,10"}],
            "1to2": [{"partition": 1, "sentence_ids": "1,2"}, {"sentence_ids": "3"}],
            "2to3": [{"partition": 1, "sentence_ids": "4,5,6,7,8"}]
        }"#;
        let mapping: AlignmentMapping = serde_json::from_str(json).unwrap();
        let keys: Vec<&str> = mapping.clusters().iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, ["3to4", "1to2", "2to3"]);
        assert_eq!(mapping.clusters()[1].partitions.len(), 2);
        assert_eq!(mapping.clusters()[1].partitions[1].partition, None);
    }

    #[test]
    fn story_reads_camel_case_fields() {
        let json = r#"{
            "id": "lantern",
            "title": "The Lantern in the Window",
            "sentences": [{"id": 0, "text": "It was late."}],
            "midiMapping": {"1to2": [{"sentence_ids": "0"}]},
            "midiDirName": "lantern_dir"
        }"#;
        let story: Story = serde_json::from_str(json).unwrap();
        assert_eq!(story.dir_name(), "lantern_dir");
        assert_eq!(story.midi_mapping.clusters()[0].key, "1to2");
    }

    #[test]
    fn dir_name_falls_back_to_id() {
        let story = Story {
            id: "carnival".into(),
            title: String::new(),
            sentences: vec![Sentence::new(0, "a")],
            midi_mapping: AlignmentMapping::from_pairs([("1to2", vec!["0"])]),
            midi_dir_name: None,
        };
        assert_eq!(story.dir_name(), "carnival");
    }

    #[test]
    fn mapping_serialises_back_in_order() {
        let mapping = AlignmentMapping::from_pairs([("b", vec!["1"]), ("a", vec!["2"])]);
        let json = serde_json::to_string(&mapping).unwrap();
        assert_eq!(json, r#"{"b":[{"sentence_ids":"1"}],"a":[{"sentence_ids":"2"}]}"#);
    }
}
