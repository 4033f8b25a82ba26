//! In-process backend with no audio output.
//!
//! Used as the test double for the engine, where it records every handle it
//! hands out and can be told to fail, stall or delay loads, and for `--mute`
//! runs, where it records nothing.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use super::backend::{AudioBackend, AudioError, PlaybackHandle};

#[derive(Debug)]
pub struct MemoryHandle {
    path: PathBuf,
    volume_bits: AtomicU32,
    paused: AtomicBool,
    looping: AtomicBool,
    rewinds: AtomicUsize,
    plays: AtomicUsize,
    refuse_play: bool,
}

impl MemoryHandle {
    fn new(path: PathBuf, refuse_play: bool) -> Self {
        Self {
            path,
            volume_bits: AtomicU32::new(0.0_f32.to_bits()),
            paused: AtomicBool::new(true),
            looping: AtomicBool::new(false),
            rewinds: AtomicUsize::new(0),
            plays: AtomicUsize::new(0),
            refuse_play,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_looping(&self) -> bool {
        self.looping.load(Ordering::Relaxed)
    }

    pub fn rewind_count(&self) -> usize {
        self.rewinds.load(Ordering::Relaxed)
    }

    pub fn play_count(&self) -> usize {
        self.plays.load(Ordering::Relaxed)
    }

    /// Playing at a non-zero volume.
    pub fn is_audible(&self) -> bool {
        !self.is_paused() && self.volume() > 0.0
    }
}

impl PlaybackHandle for MemoryHandle {
    fn play(&self) -> Result<(), AudioError> {
        if self.refuse_play {
            return Err(AudioError::Play {
                path: self.path.clone(),
                reason: "playback refused".into(),
            });
        }
        self.plays.fetch_add(1, Ordering::Relaxed);
        self.paused.store(false, Ordering::Relaxed);
        Ok(())
    }

    fn pause(&self) {
        self.paused.store(true, Ordering::Relaxed);
    }

    fn rewind(&self) {
        self.rewinds.fetch_add(1, Ordering::Relaxed);
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    fn volume(&self) -> f32 {
        f32::from_bits(self.volume_bits.load(Ordering::Relaxed))
    }

    fn set_volume(&self, volume: f32) {
        self.volume_bits
            .store(volume.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    fn set_looping(&self, looping: bool) {
        self.looping.store(looping, Ordering::Relaxed);
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    /// Keep every loaded handle for inspection.
    recording: bool,
    load_delay: Duration,
    failing: HashSet<PathBuf>,
    stalling: HashSet<PathBuf>,
    unplayable: HashSet<PathBuf>,
    handles: Vec<Arc<MemoryHandle>>,
}

/// Cloning shares the recorded state.
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    state: Arc<Mutex<MemoryState>>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Recording backend; see [`MemoryBackend::handles`].
    pub fn new() -> Self {
        Self::with_recording(true)
    }

    /// Backend for runs without a device. Handles live only as long as the
    /// engine holds them.
    pub fn muted() -> Self {
        Self::with_recording(false)
    }

    fn with_recording(recording: bool) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState {
                recording,
                ..MemoryState::default()
            })),
        }
    }

    /// Every load waits this long before resolving.
    pub fn with_load_delay(self, delay: Duration) -> Self {
        self.with_state(|s| s.load_delay = delay);
        self
    }

    /// Loads of `path` fail with [`AudioError::Load`].
    pub fn fail_on(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        self.with_state(|s| {
            s.failing.insert(path);
        });
    }

    /// Loads of `path` never resolve.
    pub fn stall_on(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        self.with_state(|s| {
            s.stalling.insert(path);
        });
    }

    /// Handles for `path` load but refuse to start.
    pub fn refuse_play_on(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        self.with_state(|s| {
            s.unplayable.insert(path);
        });
    }

    /// Every handle created so far, oldest first. Always empty when muted.
    pub fn handles(&self) -> Vec<Arc<MemoryHandle>> {
        self.with_state(|s| s.handles.clone())
    }

    pub fn audible_count(&self) -> usize {
        self.handles().iter().filter(|h| h.is_audible()).count()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MemoryState) -> T) -> T {
        // A poisoned lock only means a test thread panicked mid-update.
        let mut guard = match self.state.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}

impl AudioBackend for MemoryBackend {
    type Handle = MemoryHandle;

    async fn load(&self, path: &Path) -> Result<Arc<MemoryHandle>, AudioError> {
        let (delay, failing, stalling, unplayable) = self.with_state(|s| {
            (
                s.load_delay,
                s.failing.contains(path),
                s.stalling.contains(path),
                s.unplayable.contains(path),
            )
        });

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if stalling {
            std::future::pending::<()>().await;
        }
        if failing {
            return Err(AudioError::Load {
                path: path.to_path_buf(),
                reason: "no such track".into(),
            });
        }

        let handle = Arc::new(MemoryHandle::new(path.to_path_buf(), unplayable));
        self.with_state(|s| {
            if s.recording {
                s.handles.push(Arc::clone(&handle));
            }
        });
        log::debug!("memory backend: loaded {}", path.display());
        Ok(handle)
    }
}
