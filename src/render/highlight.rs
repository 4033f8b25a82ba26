use serde::Serialize;

use crate::story::Sentence;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Emphasis {
    Highlighted,
    Dimmed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SentenceMark {
    pub id: i64,
    pub emphasis: Emphasis,
}

/// Mark every sentence of the story, in order. Exactly the sentences whose IDs
/// are in `highlighted` are highlighted; everything else is dimmed, so an empty
/// set (story complete) dims the whole text.
pub fn mark_sentences(sentences: &[Sentence], highlighted: &[i64]) -> Vec<SentenceMark> {
    sentences
        .iter()
        .map(|s| SentenceMark {
            id: s.id,
            emphasis: if highlighted.contains(&s.id) {
                Emphasis::Highlighted
            } else {
                Emphasis::Dimmed
            },
        })
        .collect()
}
