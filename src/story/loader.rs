use std::path::Path;

use crate::{
    config::{AppConfig, StoryConfig},
    error::LoadError,
    scheduler::SegmentIndex,
};

use super::model::Story;

/// A story together with its validated alignment.
#[derive(Debug, Clone)]
pub struct PreparedStory {
    pub story: Story,
    pub index: SegmentIndex,
}

/// Every configured story, loaded and validated up front so a broken data file
/// fails the whole run before any trial starts.
#[derive(Debug, Clone, Default)]
pub struct StoryLibrary {
    stories: Vec<PreparedStory>,
}

impl StoryLibrary {
    pub fn load(config: &AppConfig) -> Result<Self, LoadError> {
        let mut stories = Vec::with_capacity(config.stories.len());
        for entry in &config.stories {
            let path = config.resolve(&entry.data_path);
            let story = normalize(load_story_file(&path)?, entry)?;
            let index = SegmentIndex::build(&story)?;
            stories.push(PreparedStory { story, index });
        }
        log::info!("Loaded {} stories", stories.len());
        Ok(Self { stories })
    }

    pub fn from_stories(stories: Vec<Story>) -> Result<Self, LoadError> {
        let stories = stories
            .into_iter()
            .map(|story| {
                let index = SegmentIndex::build(&story)?;
                Ok(PreparedStory { story, index })
            })
            .collect::<Result<Vec<_>, LoadError>>()?;
        Ok(Self { stories })
    }

    pub fn get(&self, id: &str) -> Option<&PreparedStory> {
        self.stories.iter().find(|s| s.story.id == id)
    }

    pub fn require(&self, id: &str) -> Result<&PreparedStory, LoadError> {
        self.get(id).ok_or_else(|| LoadError::UnknownStory { story: id.to_string() })
    }

    pub fn len(&self) -> usize {
        self.stories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stories.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PreparedStory> {
        self.stories.iter()
    }
}

pub fn load_story_file(path: &Path) -> Result<Story, LoadError> {
    let raw = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| LoadError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Apply config overrides and drop blank sentences. IDs are kept as given.
fn normalize(mut story: Story, entry: &StoryConfig) -> Result<Story, LoadError> {
    if story.id != entry.id {
        log::warn!(
            "Story file for '{}' declares id '{}'; using the configured id",
            entry.id,
            story.id
        );
        story.id = entry.id.clone();
    }
    if !entry.title.is_empty() {
        story.title = entry.title.clone();
    }
    if entry.midi_dir_name.is_some() {
        story.midi_dir_name = entry.midi_dir_name.clone();
    }

    for sentence in &mut story.sentences {
        let trimmed = sentence.text.trim();
        if trimmed.len() != sentence.text.len() {
            sentence.text = trimmed.to_string();
        }
    }
    let before = story.sentences.len();
    story.sentences.retain(|s| !s.text.is_empty());
    if story.sentences.len() != before {
        log::debug!(
            "Story '{}': dropped {} blank sentences",
            story.id,
            before - story.sentences.len()
        );
    }
    if story.sentences.is_empty() {
        return Err(LoadError::EmptyText { story: story.id });
    }
    Ok(story)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "story-soundtrack-{}-{}",
            std::process::id(),
            name
        ));
        std::fs::create_dir_all(dir.join("stories")).unwrap();
        dir
    }

    fn config_for(dir: &Path, ids: &[&str]) -> AppConfig {
        AppConfig {
            stories: ids
                .iter()
                .map(|id| StoryConfig {
                    id: id.to_string(),
                    title: format!("Title of {id}"),
                    data_path: PathBuf::from(format!("stories/{id}.json")),
                    midi_dir_name: None,
                })
                .collect(),
            base_dir: dir.to_path_buf(),
            ..AppConfig::default()
        }
    }

    const LANTERN: &str = r#"{
        "id": "lantern",
        "sentences": [
            {"id": 1, "text": "  The lamp was lit. "},
            {"id": 2, "text": "   "},
            {"id": 3, "text": "Nobody came."},
            {"id": 4, "text": "The wick burned down."}
        ],
        "midiMapping": {"1to2": [{"partition": 1, "sentence_ids": "0"}]}
    }"#;

    #[test]
    fn loads_and_normalizes_story_files() {
        let dir = scratch_dir("load");
        std::fs::write(dir.join("stories/lantern.json"), LANTERN).unwrap();

        let library = StoryLibrary::load(&config_for(&dir, &["lantern"])).unwrap();
        let prepared = library.require("lantern").unwrap();
        assert_eq!(prepared.story.title, "Title of lantern");
        assert_eq!(prepared.story.sentences.len(), 3);
        assert_eq!(prepared.story.sentences[0].text, "The lamp was lit.");
        assert_eq!(prepared.index.offset(), -1);
        assert_eq!(prepared.index.additional()[0].sentence_ids, vec![3, 4]);
    }

    #[test]
    fn missing_file_fails_the_whole_library() {
        let dir = scratch_dir("missing");
        std::fs::write(dir.join("stories/lantern.json"), LANTERN).unwrap();
        let err = StoryLibrary::load(&config_for(&dir, &["lantern", "absent"])).unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }

    #[test]
    fn malformed_json_is_reported_with_path() {
        let dir = scratch_dir("malformed");
        let path = dir.join("stories/broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        match load_story_file(&path) {
            Err(LoadError::Json { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected Json error, got {other:?}"),
        }
    }

    #[test]
    fn all_blank_text_is_rejected() {
        let dir = scratch_dir("blank");
        std::fs::write(
            dir.join("stories/blank.json"),
            r#"{"id": "blank", "sentences": [{"id": 0, "text": " "}],
                "midiMapping": {"1to2": [{"sentence_ids": "0"}]}}"#,
        )
        .unwrap();
        let err = StoryLibrary::load(&config_for(&dir, &["blank"])).unwrap_err();
        assert!(matches!(err, LoadError::EmptyText { .. }));
    }

    #[test]
    fn unknown_story_lookup() {
        let library = StoryLibrary::default();
        assert!(matches!(library.require("nope"), Err(LoadError::UnknownStory { .. })));
    }
}
