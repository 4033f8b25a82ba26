//! Drives trials from terminal input.
//!
//! Key events are read on a blocking thread and forwarded over a channel, so
//! the trial loop can wait on keys and audio outcomes at the same time.

use std::{
    io::{self, Write},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    terminal,
};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use super::{
    session::{TrialPlan, TrialSession},
    summary::TrialSummary,
};
use crate::{
    analytics::{EventCategory, LogLevel},
    audio::{AudioBackend, AudioController, CrossfadeEngine, MusicSink, TrackLibrary},
    config::ExperimentConfig,
    error::{AppError, TrialError},
    render::{paint, Screen, TerminalSession},
    scheduler::{PlannedTrial, Transition},
    state::ExperimentState,
};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const MUSIC_LABEL: &str = "Music playing";
const FALLBACK_SIZE: (u16, u16) = (80, 24);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEvent {
    Advance,
    Finish,
    Abort,
    /// New terminal size as `(columns, rows)`.
    Resize(u16, u16),
}

pub fn map_key(key: KeyEvent) -> Option<HostEvent> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    match key.code {
        KeyCode::Char(' ') | KeyCode::Right => Some(HostEvent::Advance),
        KeyCode::Enter => Some(HostEvent::Finish),
        KeyCode::Esc | KeyCode::Char('q') => Some(HostEvent::Abort),
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Some(HostEvent::Abort),
        _ => None,
    }
}

// ── KeyReader ─────────────────────────────────────────────────────────────────

/// Background thread turning terminal events into [`HostEvent`]s. Stops and
/// joins on drop.
pub struct KeyReader {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl KeyReader {
    pub fn spawn() -> io::Result<(Self, UnboundedReceiver<HostEvent>)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("key-reader".into())
            .spawn(move || read_keys(&stop_flag, &tx))?;
        Ok((Self { stop, handle: Some(handle) }, rx))
    }
}

impl Drop for KeyReader {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn read_keys(stop: &AtomicBool, tx: &UnboundedSender<HostEvent>) {
    while !stop.load(Ordering::Relaxed) {
        match event::poll(POLL_INTERVAL) {
            Ok(false) => continue,
            Ok(true) => {}
            Err(e) => {
                log::error!("Terminal input failed: {e}");
                let _ = tx.send(HostEvent::Abort);
                return;
            }
        }
        let host_event = match event::read() {
            Ok(Event::Key(key)) => map_key(key),
            Ok(Event::Resize(width, height)) => Some(HostEvent::Resize(width, height)),
            Ok(_) => None,
            Err(e) => {
                log::error!("Terminal input failed: {e}");
                Some(HostEvent::Abort)
            }
        };
        if let Some(host_event) = host_event {
            if tx.send(host_event).is_err() {
                return;
            }
        }
    }
}

// ── Trial loop ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum TrialOutcome {
    Finished(TrialSummary),
    Aborted(TrialSummary),
}

impl TrialOutcome {
    pub fn summary(&self) -> &TrialSummary {
        match self {
            TrialOutcome::Finished(s) | TrialOutcome::Aborted(s) => s,
        }
    }
}

/// Run one planned trial until the reader finishes or aborts it.
///
/// `number` is 1-based. The audio task is drained before returning, so every
/// outcome of this trial is in the diagnostics log.
pub async fn run_trial<B: AudioBackend, W: Write>(
    state: &mut ExperimentState,
    backend: B,
    planned: &PlannedTrial,
    number: usize,
    keys: &mut UnboundedReceiver<HostEvent>,
    out: &mut W,
) -> Result<TrialOutcome, AppError> {
    let prepared = state.library.require(&planned.story_id)?;
    let story_id = prepared.story.id.clone();
    let engine = CrossfadeEngine::new(backend, state.config.music.clone());
    let tracks = TrackLibrary::new(state.config.audio_root(), prepared.story.dir_name());
    let (controller, mut audio) = AudioController::spawn(engine, tracks);

    let plan = TrialPlan {
        story_number: number,
        total_stories: state.plan.len().max(number),
        condition: planned.condition,
    };
    let mut session = TrialSession::new(prepared, plan, &state.config.cluster_loop_overrides, controller);
    let mut size = terminal::size().unwrap_or(FALLBACK_SIZE);
    let mut notice: Option<String> = None;

    session.start();
    state.diagnostics.record(
        LogLevel::Info,
        EventCategory::Trial,
        "trial_started",
        &format!("story {} of {} under {}", plan.story_number, plan.total_stories, plan.condition),
        Some(&story_id),
        None,
    );
    repaint(out, &session, &state.config.experiment, notice.as_deref(), size)?;

    let outcome = loop {
        tokio::select! {
            key = keys.recv() => match key {
                Some(HostEvent::Advance) => {
                    if session.advance() != Transition::Ignored {
                        repaint(out, &session, &state.config.experiment, notice.as_deref(), size)?;
                    }
                }
                Some(HostEvent::Finish) => match session.finish() {
                    Ok(summary) => break TrialOutcome::Finished(summary),
                    Err(TrialError::NotComplete) => log::debug!("Finish ignored: '{story_id}' is not complete"),
                },
                Some(HostEvent::Resize(w, h)) => {
                    size = (w, h);
                    repaint(out, &session, &state.config.experiment, notice.as_deref(), size)?;
                }
                Some(HostEvent::Abort) | None => break TrialOutcome::Aborted(session.abort()),
            },
            Some(event) = audio.events.recv() => {
                if let Some(text) = state.diagnostics.record_audio(&story_id, &event) {
                    if session.record_audio_failure() {
                        notice = Some(text);
                        repaint(out, &session, &state.config.experiment, notice.as_deref(), size)?;
                    }
                }
            }
        }
    };

    // Releases the controller, which lets the audio task wind down.
    drop(session);
    for event in audio.finish().await {
        state.diagnostics.record_audio(&story_id, &event);
    }

    let (event, level) = match &outcome {
        TrialOutcome::Finished(_) => ("trial_finished", LogLevel::Info),
        TrialOutcome::Aborted(_) => ("trial_aborted", LogLevel::Warn),
    };
    let summary = outcome.summary();
    state.diagnostics.record(
        level,
        EventCategory::Trial,
        event,
        &format!(
            "{} partitions, {} clusters, {} additional, {} ms",
            summary.counts.total_partitions,
            summary.counts.total_clusters,
            summary.counts.additional_partitions_shown,
            summary.reading_time_ms
        ),
        Some(&story_id),
        None,
    );
    Ok(outcome)
}

/// Run every planned trial in order on the real terminal. An aborted trial is
/// recorded and ends the session.
pub async fn run_experiment<B: AudioBackend + Clone>(state: &mut ExperimentState, backend: B) -> Result<(), AppError> {
    let _terminal = TerminalSession::new()?;
    let (_reader, mut keys) = KeyReader::spawn()?;
    let mut stdout = io::stdout();

    let plan = state.plan.clone();
    for (i, planned) in plan.iter().enumerate() {
        let outcome = run_trial(state, backend.clone(), planned, i + 1, &mut keys, &mut stdout).await?;
        match outcome {
            TrialOutcome::Finished(summary) => state.record(summary),
            TrialOutcome::Aborted(summary) => {
                state.record(summary);
                log::warn!("Session aborted after {} of {} stories", i + 1, plan.len());
                break;
            }
        }
    }
    Ok(())
}

fn repaint<S: MusicSink, W: Write>(
    out: &mut W,
    session: &TrialSession<S>,
    experiment: &ExperimentConfig,
    notice: Option<&str>,
    (width, height): (u16, u16),
) -> io::Result<()> {
    let marks = session.marks();
    let plan = session.plan();
    paint(
        out,
        &Screen {
            title: session.title(),
            sentences: session.sentences(),
            marks: &marks,
            progress: experiment
                .show_progress_indicator
                .then_some((plan.story_number, plan.total_stories)),
            music: experiment.show_music_indicator.then_some(MUSIC_LABEL),
            complete: session.is_complete(),
            notice,
            width,
            height,
        },
    )
}
