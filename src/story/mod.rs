pub mod loader;
pub mod model;

pub use loader::{load_story_file, PreparedStory, StoryLibrary};
pub use model::{AlignmentMapping, MappingCluster, MappingPartition, Sentence, Story};
