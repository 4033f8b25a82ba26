pub mod assignment;
pub mod playback_target;
pub mod segment_index;
pub mod sequencer;

pub use assignment::{plan_trials, PlannedTrial};
pub use playback_target::{MusicCondition, TargetResolver, Track};
pub use segment_index::{Cluster, Partition, PartitionKind, SegmentIndex};
pub use sequencer::{PartitionSequencer, Phase, Position, TraversalCounts, Transition};
