use std::{future::Future, path::Path, path::PathBuf, sync::Arc};

use thiserror::Error;

/// Audio failures. None of these abort a trial; the engine logs them and the
/// reader carries on without music for that segment.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AudioError {
    #[error("Cannot load {path}: {reason}")]
    Load { path: PathBuf, reason: String },

    #[error("Cannot start {path}: {reason}")]
    Play { path: PathBuf, reason: String },

    #[error("{path} was not playable after {waited_ms} ms")]
    LoadTimeout { path: PathBuf, waited_ms: u64 },

    #[error("Audio device error: {0}")]
    Device(String),
}

/// A loaded, independently controllable track.
///
/// Volume is linear in 0.0 – 1.0. Handles are shared between the engine and its
/// fade tasks, so every control takes `&self`.
pub trait PlaybackHandle: Send + Sync + 'static {
    fn play(&self) -> Result<(), AudioError>;
    fn pause(&self);
    /// Return to the start of the track.
    fn rewind(&self);
    fn is_paused(&self) -> bool;
    fn volume(&self) -> f32;
    fn set_volume(&self, volume: f32);
    fn set_looping(&self, looping: bool);
}

/// Opens tracks. `load` resolves once the handle can play through without
/// stalling; the handle starts paused at volume 0.
pub trait AudioBackend: Send + Sync + 'static {
    type Handle: PlaybackHandle;

    fn load(&self, path: &Path) -> impl Future<Output = Result<Arc<Self::Handle>, AudioError>> + Send;
}

/// Pause, rewind and zero a handle so it is inaudible and reusable.
pub fn silence<H: PlaybackHandle + ?Sized>(handle: &H) {
    handle.pause();
    handle.rewind();
    handle.set_volume(0.0);
}
