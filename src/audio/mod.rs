pub mod backend;
pub mod controller;
pub mod crossfade;
pub mod engine;
pub mod memory;
pub mod track;

#[cfg(feature = "device-audio")]
pub mod decoder;
#[cfg(feature = "device-audio")]
pub mod output;
#[cfg(feature = "device-audio")]
pub mod voice;

pub use backend::{AudioBackend, AudioError, PlaybackHandle};
pub use controller::{AudioController, AudioEvent, AudioTask, MusicSink};
pub use engine::CrossfadeEngine;
pub use memory::MemoryBackend;
pub use track::TrackLibrary;

#[cfg(feature = "device-audio")]
pub use output::DeviceBackend;
