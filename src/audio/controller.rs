//! Async front for a [`CrossfadeEngine`].
//!
//! The trial loop must never wait on audio, so switch requests go through a
//! channel to a task that owns the engine. A request that arrives while a track
//! is still loading preempts that load; outcomes come back as [`AudioEvent`]s.

use serde::Serialize;
use tokio::{
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    task::JoinHandle,
};

use super::{
    backend::{AudioBackend, AudioError},
    engine::CrossfadeEngine,
    track::TrackLibrary,
};
use crate::scheduler::Track;

/// Receives the music targets a trial issues.
pub trait MusicSink {
    fn switch_to(&mut self, track: &Track);
    fn stop(&mut self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCmd {
    SwitchTo(Track),
    Stop,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum AudioEvent {
    Started { track: Track },
    Failed {
        track: Track,
        #[serde(serialize_with = "error_string")]
        error: AudioError,
    },
    /// A newer request arrived before this track finished loading.
    Superseded { track: Track },
    Stopped,
}

fn error_string<S: serde::Serializer>(error: &AudioError, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&error.to_string())
}

/// Sending half; dropping it (or calling [`AudioTask::finish`]) stops the
/// engine.
#[derive(Debug)]
pub struct AudioController {
    cmd_tx: UnboundedSender<EngineCmd>,
}

/// Receiving half: the event stream and the engine task.
#[derive(Debug)]
pub struct AudioTask {
    pub events: UnboundedReceiver<AudioEvent>,
    handle: JoinHandle<()>,
}

impl AudioController {
    pub fn spawn<B: AudioBackend>(engine: CrossfadeEngine<B>, library: TrackLibrary) -> (Self, AudioTask) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, events) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_engine(engine, library, cmd_rx, event_tx));
        (Self { cmd_tx }, AudioTask { events, handle })
    }

    fn send(&self, cmd: EngineCmd) {
        if self.cmd_tx.send(cmd).is_err() {
            log::debug!("Audio task already exited; command dropped");
        }
    }
}

impl MusicSink for AudioController {
    fn switch_to(&mut self, track: &Track) {
        self.send(EngineCmd::SwitchTo(track.clone()));
    }

    fn stop(&mut self) {
        self.send(EngineCmd::Stop);
    }
}

impl AudioTask {
    /// Wait for the engine task to wind down. The controller must have been
    /// dropped first, otherwise this waits forever.
    pub async fn finish(self) -> Vec<AudioEvent> {
        let AudioTask { mut events, handle } = self;
        if let Err(e) = handle.await {
            log::warn!("Audio task ended abnormally: {e}");
        }
        let mut rest = Vec::new();
        while let Ok(event) = events.try_recv() {
            rest.push(event);
        }
        rest
    }
}

enum Outcome {
    Finished(Result<(), AudioError>),
    Preempted(Option<EngineCmd>),
}

async fn run_engine<B: AudioBackend>(
    mut engine: CrossfadeEngine<B>,
    library: TrackLibrary,
    mut cmd_rx: UnboundedReceiver<EngineCmd>,
    events: UnboundedSender<AudioEvent>,
) {
    let emit = |event: AudioEvent| {
        // The trial may already have stopped listening.
        let _ = events.send(event);
    };

    let mut next = cmd_rx.recv().await;
    while let Some(cmd) = next.take() {
        match cmd {
            EngineCmd::SwitchTo(track) => {
                let path = library.path(&track);
                log::debug!("Switching music to {track} ({})", path.display());
                let outcome = tokio::select! {
                    result = engine.switch_to(&path) => Outcome::Finished(result),
                    cmd = cmd_rx.recv() => Outcome::Preempted(cmd),
                };
                match outcome {
                    Outcome::Finished(Ok(())) => emit(AudioEvent::Started { track }),
                    Outcome::Finished(Err(error)) => emit(AudioEvent::Failed { track, error }),
                    Outcome::Preempted(cmd) => {
                        log::debug!("Load of {track} preempted");
                        emit(AudioEvent::Superseded { track });
                        match cmd {
                            Some(cmd) => {
                                next = Some(cmd);
                                continue;
                            }
                            None => break,
                        }
                    }
                }
            }
            EngineCmd::Stop => {
                engine.stop();
                emit(AudioEvent::Stopped);
            }
        }
        next = cmd_rx.recv().await;
    }
    engine.stop();
}

#[cfg(test)]
mod tests {
    use std::{path::Path, time::Duration};

    use super::*;
    use crate::{audio::memory::MemoryBackend, config::MusicConfig};

    fn spawn(backend: &MemoryBackend) -> (AudioController, AudioTask) {
        let engine = CrossfadeEngine::new(backend.clone(), MusicConfig::default());
        AudioController::spawn(engine, TrackLibrary::new("audio", "story"))
    }

    #[tokio::test(start_paused = true)]
    async fn switch_reports_started() {
        let backend = MemoryBackend::new();
        let (mut controller, mut task) = spawn(&backend);
        controller.switch_to(&Track::Cluster(1));

        let event = task.events.recv().await.unwrap();
        assert_eq!(event, AudioEvent::Started { track: Track::Cluster(1) });
        assert_eq!(backend.handles()[0].path(), Path::new("audio/story/cluster_1.mp3"));

        drop(controller);
        task.finish().await;
        assert_eq!(backend.audible_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_track_reports_failure() {
        let backend = MemoryBackend::new();
        backend.fail_on("audio/story/cluster_avg.mp3");
        let (mut controller, mut task) = spawn(&backend);
        controller.switch_to(&Track::Average);

        match task.events.recv().await.unwrap() {
            AudioEvent::Failed { track, error } => {
                assert_eq!(track, Track::Average);
                assert!(matches!(error, AudioError::Load { .. }));
            }
            other => panic!("unexpected event {other:?}"),
        }
        drop(controller);
        task.finish().await;
    }

    #[tokio::test(start_paused = true)]
    async fn newer_request_preempts_slow_load() {
        let backend = MemoryBackend::new().with_load_delay(Duration::from_millis(500));
        let (mut controller, mut task) = spawn(&backend);
        controller.switch_to(&Track::Cluster(1));
        tokio::time::sleep(Duration::from_millis(100)).await;
        controller.switch_to(&Track::Cluster(2));

        assert_eq!(
            task.events.recv().await.unwrap(),
            AudioEvent::Superseded { track: Track::Cluster(1) }
        );
        assert_eq!(
            task.events.recv().await.unwrap(),
            AudioEvent::Started { track: Track::Cluster(2) }
        );
        let handles = backend.handles();
        assert_eq!(handles.len(), 1);
        assert_eq!(handles[0].path(), Path::new("audio/story/cluster_2.mp3"));

        drop(controller);
        task.finish().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_silences_and_reports() {
        let backend = MemoryBackend::new();
        let (mut controller, mut task) = spawn(&backend);
        controller.switch_to(&Track::Cluster(1));
        assert!(matches!(task.events.recv().await, Some(AudioEvent::Started { .. })));
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(backend.audible_count(), 1);

        controller.stop();
        assert_eq!(task.events.recv().await, Some(AudioEvent::Stopped));
        assert_eq!(backend.audible_count(), 0);

        drop(controller);
        assert!(task.finish().await.is_empty());
    }
}
