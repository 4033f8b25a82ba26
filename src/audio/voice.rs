use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Mutex,
    },
};

use ringbuf::traits::{Consumer as _, Observer as _};

use super::{
    backend::{AudioError, PlaybackHandle},
    decoder::{spawn_decoder, DecoderControl, DecoderHandle},
};

/// One decoded track feeding the output mixer.
///
/// The output callback pulls from it with [`Voice::mix_into`]; every control
/// is an atomic so the engine and fade tasks never block the callback.
pub struct Voice {
    path: PathBuf,
    decoder: Mutex<DecoderHandle>,
    control: DecoderControl,
    gain_bits: AtomicU32,
    paused: AtomicBool,
}

impl Voice {
    /// Start decoding `path` into a paused, silent voice.
    pub fn open(path: &Path) -> Result<Self, AudioError> {
        let control = DecoderControl::default();
        let decoder = spawn_decoder(path.to_path_buf(), control.clone())?;
        Ok(Self {
            path: path.to_path_buf(),
            decoder: Mutex::new(decoder),
            control,
            gain_bits: AtomicU32::new(0.0_f32.to_bits()),
            paused: AtomicBool::new(true),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sample_rate(&self) -> u32 {
        self.decoder.lock().map(|d| d.sample_rate).unwrap_or(0)
    }

    /// Stereo samples decoded ahead of playback.
    pub fn buffered_samples(&self) -> usize {
        self.decoder
            .lock()
            .map(|d| d.consumer.occupied_len())
            .unwrap_or(0)
    }

    /// `Some(frames)` once the decode thread has exited, with the number of
    /// frames it produced.
    pub fn finished_frames(&self) -> Option<u64> {
        let d = self.decoder.lock().ok()?;
        d.decode_done
            .load(Ordering::Relaxed)
            .then(|| d.frames_written.load(Ordering::Relaxed))
    }

    /// Add this voice's next `output.len()` samples, scaled by its gain, onto
    /// `output` (interleaved stereo).
    ///
    /// Called on the real-time audio thread; never blocks. Underruns leave the
    /// remainder untouched.
    pub fn mix_into(&self, output: &mut [f32]) {
        if self.paused.load(Ordering::Relaxed) {
            return;
        }
        let gain = f32::from_bits(self.gain_bits.load(Ordering::Relaxed));
        let Ok(mut decoder) = self.decoder.try_lock() else {
            return;
        };
        for slot in output.iter_mut() {
            match decoder.consumer.try_pop() {
                Some(s) => *slot += s * gain,
                None => break,
            }
        }
    }
}

impl PlaybackHandle for Voice {
    fn play(&self) -> Result<(), AudioError> {
        if self.finished_frames() == Some(0) {
            return Err(AudioError::Play {
                path: self.path.clone(),
                reason: "no audio could be decoded".into(),
            });
        }
        self.paused.store(false, Ordering::Relaxed);
        Ok(())
    }

    fn pause(&self) {
        self.paused.store(true, Ordering::Relaxed);
    }

    fn rewind(&self) {
        self.control.rewind.store(true, Ordering::Relaxed);
        if let Ok(mut d) = self.decoder.lock() {
            let stale = d.consumer.occupied_len();
            d.consumer.skip(stale);
        }
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    fn volume(&self) -> f32 {
        f32::from_bits(self.gain_bits.load(Ordering::Relaxed))
    }

    fn set_volume(&self, volume: f32) {
        self.gain_bits
            .store(volume.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    fn set_looping(&self, looping: bool) {
        self.control.looping.store(looping, Ordering::Relaxed);
    }
}

impl Drop for Voice {
    fn drop(&mut self) {
        // Thread will exit on its own after seeing the flag
        self.control.stop.store(true, Ordering::Relaxed);
    }
}
