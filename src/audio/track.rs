use std::path::{Path, PathBuf};

use crate::scheduler::Track;

/// Maps track names onto `<root>/<story dir>/<name>.mp3`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackLibrary {
    root: PathBuf,
    story_dir: String,
}

impl TrackLibrary {
    pub const EXTENSION: &'static str = "mp3";

    pub fn new(root: impl Into<PathBuf>, story_dir: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            story_dir: story_dir.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, track: &Track) -> PathBuf {
        self.root
            .join(&self.story_dir)
            .join(format!("{}.{}", track.name(), Self::EXTENSION))
    }
}
