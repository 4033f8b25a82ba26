use std::{
    path::Path,
    sync::{mpsc, Arc, Mutex},
    thread,
    time::Duration,
};

use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    Device, Stream, StreamConfig,
};

use super::{
    backend::{AudioBackend, AudioError, PlaybackHandle},
    voice::Voice,
};

/// Seconds of audio decoded ahead before a voice counts as playable.
const PREBUFFER_SECS: f32 = 0.5;
const READY_POLL: Duration = Duration::from_millis(10);

type VoiceList = Arc<Mutex<Vec<Arc<Voice>>>>;

/// Plays voices through the default output device.
///
/// The cpal stream lives on its own thread for the lifetime of the backend;
/// the last clone to drop closes it.
#[derive(Clone)]
pub struct DeviceBackend {
    voices: VoiceList,
    sample_rate: u32,
    _keepalive: Arc<mpsc::Sender<()>>,
}

impl DeviceBackend {
    /// Open the default output device and start a silent stream.
    pub fn open() -> Result<Self, AudioError> {
        let voices: VoiceList = Arc::new(Mutex::new(Vec::new()));
        let (ready_tx, ready_rx) = mpsc::channel::<Result<u32, AudioError>>();
        let (keepalive, shutdown_rx) = mpsc::channel::<()>();

        let voices_cb = Arc::clone(&voices);
        thread::Builder::new()
            .name("audio-out".into())
            .spawn(move || {
                let stream = match start_stream(voices_cb) {
                    Ok((stream, rate)) => {
                        let _ = ready_tx.send(Ok(rate));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                // Returns once every sender is gone.
                let _ = shutdown_rx.recv();
                drop(stream);
                log::debug!("Output stream closed");
            })
            .map_err(|e| AudioError::Device(format!("Failed to spawn output thread: {e}")))?;

        let sample_rate = ready_rx
            .recv()
            .map_err(|_| AudioError::Device("Output thread exited during start-up".into()))??;

        Ok(Self {
            voices,
            sample_rate,
            _keepalive: Arc::new(keepalive),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Drop voices nobody but the mixer still holds.
    fn prune(&self) {
        if let Ok(mut voices) = self.voices.lock() {
            let before = voices.len();
            voices.retain(|v| Arc::strong_count(v) > 1);
            if voices.len() != before {
                log::debug!("Released {} idle voices", before - voices.len());
            }
        }
    }

    fn remove(&self, voice: &Arc<Voice>) {
        if let Ok(mut voices) = self.voices.lock() {
            voices.retain(|v| !Arc::ptr_eq(v, voice));
        }
    }
}

impl AudioBackend for DeviceBackend {
    type Handle = Voice;

    async fn load(&self, path: &Path) -> Result<Arc<Voice>, AudioError> {
        self.prune();

        let voice = Arc::new(Voice::open(path)?);
        if voice.sample_rate() != self.sample_rate {
            log::warn!(
                "{} is {} Hz but the device runs at {} Hz; playback speed will be off",
                path.display(),
                voice.sample_rate(),
                self.sample_rate
            );
        }
        if let Ok(mut voices) = self.voices.lock() {
            voices.push(Arc::clone(&voice));
        }

        let wanted = (voice.sample_rate() as f32 * 2.0 * PREBUFFER_SECS) as usize;
        loop {
            if voice.buffered_samples() >= wanted {
                break;
            }
            match voice.finished_frames() {
                Some(0) => {
                    self.remove(&voice);
                    return Err(AudioError::Load {
                        path: path.to_path_buf(),
                        reason: "no audio could be decoded".into(),
                    });
                }
                // Shorter than the prebuffer; all of it is already buffered.
                Some(_) => break,
                None => tokio::time::sleep(READY_POLL).await,
            }
        }
        log::debug!("{} ready ({} samples buffered)", path.display(), voice.buffered_samples());
        Ok(voice)
    }
}

fn start_stream(voices: VoiceList) -> Result<(Stream, u32), AudioError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| AudioError::Device("No default audio output device found".into()))?;

    let config = device
        .default_output_config()
        .map_err(|e| AudioError::Device(format!("Default config error: {e}")))?;

    let sample_rate = config.sample_rate().0;
    log::info!(
        "Audio device: {} | sample rate: {} | channels: {}",
        device.name().unwrap_or_default(),
        sample_rate,
        config.channels()
    );

    let stream = build_stream(&device, &config.into(), voices)?;
    stream
        .play()
        .map_err(|e| AudioError::Device(format!("Stream play error: {e}")))?;
    Ok((stream, sample_rate))
}

fn build_stream(device: &Device, config: &StreamConfig, voices: VoiceList) -> Result<Stream, AudioError> {
    let err_fn = |e| log::error!("CPAL stream error: {e}");
    let channels = config.channels as usize;
    // Scratch stereo bus, resized on the first callback only.
    let mut bus: Vec<f32> = Vec::new();

    device
        .build_output_stream(
            config,
            move |output: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                let frames = output.len() / channels.max(1);
                if bus.len() != frames * 2 {
                    bus.resize(frames * 2, 0.0);
                }
                bus.fill(0.0);

                // If the list is being edited, output one buffer of silence
                // rather than block the real-time thread.
                if let Ok(voices) = voices.try_lock() {
                    for voice in voices.iter() {
                        voice.mix_into(&mut bus);
                    }
                }
                spread(&bus, output, channels);
            },
            err_fn,
            None,
        )
        .map_err(|e| AudioError::Device(format!("Build stream error: {e}")))
}

/// Copy the stereo bus into a device buffer of `channels` channels.
fn spread(bus: &[f32], output: &mut [f32], channels: usize) {
    match channels {
        0 => {}
        1 => {
            for (out, frame) in output.iter_mut().zip(bus.chunks_exact(2)) {
                *out = ((frame[0] + frame[1]) * 0.5).clamp(-1.0, 1.0);
            }
        }
        n => {
            for (out, frame) in output.chunks_exact_mut(n).zip(bus.chunks_exact(2)) {
                out[0] = frame[0].clamp(-1.0, 1.0);
                out[1] = frame[1].clamp(-1.0, 1.0);
                out[2..].fill(0.0);
            }
        }
    }
}
