use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use ringbuf::{
    traits::{Observer as _, Producer as _, Split},
    HeapRb,
};
use symphonia::core::{
    audio::SampleBuffer,
    codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL},
    errors::Error as SymphoniaError,
    formats::{FormatOptions, FormatReader},
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
};

use super::backend::AudioError;

/// Stereo f32 samples buffered ahead of the playback thread (~3 s at 44.1 kHz)
const RING_CAPACITY: usize = 44100 * 2 * 3;
const FULL_BACKOFF: Duration = Duration::from_millis(2);

/// Flags shared between a voice and its decode thread.
#[derive(Debug, Clone, Default)]
pub struct DecoderControl {
    pub stop: Arc<AtomicBool>,
    /// Start over from the top of the file when EOF is reached.
    pub looping: Arc<AtomicBool>,
    /// Restart from the top as soon as possible; cleared by the decode thread.
    pub rewind: Arc<AtomicBool>,
}

/// Consumer-side handle owned by the voice.
pub struct DecoderHandle {
    pub consumer: ringbuf::HeapCons<f32>,
    pub control: DecoderControl,
    /// Set when the decode thread exits (EOF without looping, or a fatal error).
    pub decode_done: Arc<AtomicBool>,
    /// Total frames written by the decoder since it started.
    pub frames_written: Arc<AtomicU64>,
    pub sample_rate: u32,
    pub channels: u32,
}

/// Spawn a background Symphonia decode thread for `path`.
///
/// The file is probed synchronously so a missing or undecodable track fails
/// here rather than as silence later.
pub fn spawn_decoder(path: PathBuf, control: DecoderControl) -> Result<DecoderHandle, AudioError> {
    let (format, _decoder, _track_id, sample_rate, channels) =
        open_track(&path).map_err(|reason| AudioError::Load { path: path.clone(), reason })?;
    drop(format);

    let rb = HeapRb::<f32>::new(RING_CAPACITY);
    let (mut producer, consumer) = rb.split();

    let decode_done = Arc::new(AtomicBool::new(false));
    let frames_written = Arc::new(AtomicU64::new(0));

    let handle = DecoderHandle {
        consumer,
        control: control.clone(),
        decode_done: Arc::clone(&decode_done),
        frames_written: Arc::clone(&frames_written),
        sample_rate,
        channels,
    };

    let thread_path = path.clone();
    thread::Builder::new()
        .name(format!(
            "dec:{}",
            path.file_name().unwrap_or_default().to_string_lossy()
        ))
        .spawn(move || {
            if let Err(e) = decode_loop(&thread_path, &mut producer, &control, &frames_written) {
                log::warn!("Decoder for {} exited: {e}", thread_path.display());
            }
            decode_done.store(true, Ordering::Relaxed);
        })
        .map_err(|e| AudioError::Load {
            path,
            reason: format!("Failed to spawn decoder thread: {e}"),
        })?;

    Ok(handle)
}

type OpenTrack = (Box<dyn FormatReader>, Box<dyn Decoder>, u32, u32, u32);

fn open_track(path: &Path) -> Result<OpenTrack, String> {
    let file =
        std::fs::File::open(path).map_err(|e| format!("Cannot open {}: {e}", path.display()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }
    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| format!("Probe failed: {e}"))?;

    let track = probed
        .format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or("No audio track found")?
        .clone();
    let sample_rate = track.codec_params.sample_rate.unwrap_or(44100);
    let channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u32)
        .unwrap_or(2);
    let decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| format!("Codec init: {e}"))?;

    Ok((probed.format, decoder, track.id, sample_rate, channels))
}

/// Decode `path` into the ring buffer, reopening it from the top on EOF while
/// looping and whenever a rewind is requested.
fn decode_loop(
    path: &Path,
    producer: &mut ringbuf::HeapProd<f32>,
    control: &DecoderControl,
    frames_written: &AtomicU64,
) -> Result<(), String> {
    loop {
        let (mut format, mut decoder, track_id, _, _) = open_track(path)?;
        let mut pass_frames = 0_u64;
        let mut rewound = false;

        loop {
            if control.stop.load(Ordering::Relaxed) {
                return Ok(());
            }
            if control.rewind.swap(false, Ordering::Relaxed) {
                rewound = true;
                break;
            }
            let packet = match format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    break;
                }
                Err(SymphoniaError::ResetRequired) => {
                    decoder.reset();
                    continue;
                }
                Err(e) => {
                    log::warn!("Format read: {e}");
                    break;
                }
            };
            if packet.track_id() != track_id {
                continue;
            }
            let decoded = match decoder.decode(&packet) {
                Ok(d) => d,
                Err(SymphoniaError::DecodeError(e)) => {
                    log::warn!("Decode error (skip): {e}");
                    continue;
                }
                Err(e) => return Err(format!("Fatal decode: {e}")),
            };

            let spec = *decoded.spec();
            let mut samples = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            samples.copy_interleaved_ref(decoded);
            let n = push_stereo(samples.samples(), spec.channels.count(), producer, control);
            pass_frames += n as u64;
            frames_written.fetch_add(n as u64, Ordering::Relaxed);
        }

        if rewound {
            continue;
        }
        // A pass that produced nothing would spin forever.
        if pass_frames == 0 || !control.looping.load(Ordering::Relaxed) {
            return Ok(());
        }
    }
}

/// Push interleaved samples as stereo frames. Mono is duplicated, extra
/// channels are dropped. Returns the number of frames pushed.
fn push_stereo(
    interleaved: &[f32],
    channels: usize,
    producer: &mut ringbuf::HeapProd<f32>,
    control: &DecoderControl,
) -> usize {
    let channels = channels.max(1);
    let mut written = 0;
    for frame in interleaved.chunks_exact(channels) {
        let l = frame[0];
        let r = if channels > 1 { frame[1] } else { frame[0] };
        // Both samples of a frame go in together or not at all, so the stream
        // never loses its L/R alignment.
        loop {
            if control.stop.load(Ordering::Relaxed) || control.rewind.load(Ordering::Relaxed) {
                return written;
            }
            if producer.vacant_len() >= 2 {
                let _ = producer.try_push(l);
                let _ = producer.try_push(r);
                break;
            }
            // Full while the voice is paused or far ahead.
            thread::sleep(FULL_BACKOFF);
        }
        written += 1;
    }
    written
}
