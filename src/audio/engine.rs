use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use tokio::task::JoinHandle;

use super::{
    backend::{silence, AudioBackend, AudioError, PlaybackHandle},
    crossfade::{spawn_ramp, RampEnd, VolumeRamp},
};
use crate::config::MusicConfig;

/// Owns every playback handle of one trial and guarantees that at most two of
/// them (current and previous) are ever audible.
///
/// Calls are serialised by `&mut self`; the controller task is the only caller
/// in the running program.
pub struct CrossfadeEngine<B: AudioBackend> {
    backend: B,
    config: MusicConfig,
    current: Option<Arc<B::Handle>>,
    current_path: Option<PathBuf>,
    previous: Option<Arc<B::Handle>>,
    /// Every handle that may still be producing sound, current included.
    tracked: Vec<Arc<B::Handle>>,
    fades: Vec<JoinHandle<()>>,
}

impl<B: AudioBackend> CrossfadeEngine<B> {
    pub fn new(backend: B, config: MusicConfig) -> Self {
        Self {
            backend,
            config,
            current: None,
            current_path: None,
            previous: None,
            tracked: Vec::new(),
            fades: Vec::new(),
        }
    }

    pub fn config(&self) -> &MusicConfig {
        &self.config
    }

    pub fn current_path(&self) -> Option<&Path> {
        self.current_path.as_deref()
    }

    pub fn current(&self) -> Option<&Arc<B::Handle>> {
        self.current.as_ref()
    }

    /// A fade task is still running.
    pub fn is_fading(&self) -> bool {
        self.fades.iter().any(|f| !f.is_finished())
    }

    /// Handles that are unpaused with a non-zero volume.
    pub fn audible_count(&self) -> usize {
        self.tracked
            .iter()
            .filter(|h| !h.is_paused() && h.volume() > 0.0)
            .count()
    }

    /// Crossfade from the current track to the track at `path`.
    ///
    /// If the load fails, times out or the track refuses to start, the old track
    /// fades out and no music plays until the next switch. Dropping the returned
    /// future during the load leaves the current track playing.
    pub async fn switch_to(&mut self, path: &Path) -> Result<(), AudioError> {
        // 1. Nothing may keep ramping underneath the new crossfade.
        self.cancel_fades();
        // 2. Only the current track survives into the crossfade.
        self.release_stale();

        // 4–5. Open the new track and wait until it can play through.
        let loaded = match self.open(path).await {
            Ok(handle) => {
                handle.set_looping(self.config.looping);
                handle.set_volume(0.0);
                match handle.play() {
                    Ok(()) => Ok(handle),
                    Err(e) => {
                        silence(handle.as_ref());
                        Err(e)
                    }
                }
            }
            Err(e) => Err(e),
        };

        // 3. The playing track becomes the outgoing one.
        self.previous = self.current.take().filter(|h| !h.is_paused());
        self.current_path = None;

        let incoming = match loaded {
            Ok(handle) => handle,
            Err(e) => {
                log::warn!("Music switch to {} failed: {e}", path.display());
                self.fade_out_previous();
                return Err(e);
            }
        };

        // 6. Run both ramps concurrently.
        self.tracked.push(Arc::clone(&incoming));
        self.fade_out_previous();
        self.fades.push(spawn_ramp(
            Arc::clone(&incoming),
            VolumeRamp::fade_in(&self.config),
            RampEnd::Hold,
        ));

        // 7.
        log::info!("Now playing {}", path.display());
        self.current = Some(incoming);
        self.current_path = Some(path.to_path_buf());
        Ok(())
    }

    /// Silence everything at once and forget all handles.
    pub fn stop(&mut self) {
        self.cancel_fades();
        for handle in self.tracked.drain(..) {
            silence(handle.as_ref());
        }
        self.current = None;
        self.current_path = None;
        self.previous = None;
        log::debug!("Music stopped");
    }

    // ── Private helpers ───────────────────────────────────────────────────

    async fn open(&self, path: &Path) -> Result<Arc<B::Handle>, AudioError> {
        match self.config.load_timeout() {
            Some(limit) => tokio::time::timeout(limit, self.backend.load(path))
                .await
                .map_err(|_| AudioError::LoadTimeout {
                    path: path.to_path_buf(),
                    waited_ms: limit.as_millis() as u64,
                })?,
            None => self.backend.load(path).await,
        }
    }

    fn cancel_fades(&mut self) {
        for fade in self.fades.drain(..) {
            fade.abort();
        }
    }

    fn release_stale(&mut self) {
        let current = self.current.clone();
        self.tracked.retain(|h| {
            let keep = current.as_ref().is_some_and(|c| Arc::ptr_eq(c, h));
            if !keep {
                silence(h.as_ref());
            }
            keep
        });
        self.previous = None;
    }

    fn fade_out_previous(&mut self) {
        if let Some(prev) = self.previous.clone() {
            let ramp = VolumeRamp::fade_out(&self.config, prev.volume());
            self.fades.push(spawn_ramp(prev, ramp, RampEnd::Release));
        }
    }
}

impl<B: AudioBackend> Drop for CrossfadeEngine<B> {
    fn drop(&mut self) {
        self.stop();
    }
}
