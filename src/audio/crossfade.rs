use std::{sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use tokio::{
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};

use super::backend::{silence, PlaybackHandle};
use crate::config::MusicConfig;

// ── VolumeRamp ────────────────────────────────────────────────────────────────

/// Linear volume ramp applied in `steps` equal increments over `duration`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumeRamp {
    pub from: f32,
    pub to: f32,
    pub steps: u32,
    pub duration: Duration,
}

impl VolumeRamp {
    pub fn fade_in(config: &MusicConfig) -> Self {
        Self {
            from: 0.0,
            to: config.volume,
            steps: config.fade_steps.max(1),
            duration: config.fade_in(),
        }
    }

    /// Fade from wherever the outgoing track currently sits down to silence.
    pub fn fade_out(config: &MusicConfig, from: f32) -> Self {
        Self {
            from,
            to: 0.0,
            steps: config.fade_steps.max(1),
            duration: config.fade_out(),
        }
    }

    /// Volume after `step` of `steps` increments. Step 0 is `from`, the last
    /// step is exactly `to`.
    pub fn level(&self, step: u32) -> f32 {
        if step >= self.steps {
            return self.to.clamp(0.0, 1.0);
        }
        let k = step as f32 / self.steps as f32;
        (self.from + (self.to - self.from) * k).clamp(0.0, 1.0)
    }

    /// Time between increments.
    pub fn tick(&self) -> Duration {
        self.duration / self.steps.max(1)
    }

    /// All levels from step 0 to the end, inclusive.
    pub fn preview(&self) -> Vec<f32> {
        (0..=self.steps).map(|s| self.level(s)).collect()
    }
}

// ── Fade tasks ────────────────────────────────────────────────────────────────

/// What happens to the handle once its ramp has run to the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RampEnd {
    /// Pin the volume to the ramp target.
    Hold,
    /// Pause, rewind and zero the handle.
    Release,
}

/// Run `ramp` on `handle` as a Tokio task. Aborting the task freezes the volume
/// wherever it was.
pub fn spawn_ramp<H: PlaybackHandle>(handle: Arc<H>, ramp: VolumeRamp, end: RampEnd) -> JoinHandle<()> {
    tokio::spawn(run_ramp(handle, ramp, end))
}

async fn run_ramp<H: PlaybackHandle>(handle: Arc<H>, ramp: VolumeRamp, end: RampEnd) {
    // More steps than the duration can resolve jumps straight to the end.
    if !ramp.tick().is_zero() {
        let mut ticker = interval(ramp.tick());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        for step in 1..=ramp.steps {
            ticker.tick().await;
            // A paused handle keeps its volume until it resumes.
            if !handle.is_paused() {
                handle.set_volume(ramp.level(step));
            }
        }
    }
    match end {
        RampEnd::Hold => handle.set_volume(ramp.to),
        RampEnd::Release => silence(handle.as_ref()),
    }
}
