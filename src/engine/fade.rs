// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Volume ramps run on a worker thread in fixed steps. Starting a fade
// supersedes the one in progress.

use std::io;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub const FADE_STEPS: u32 = 50;
pub const FADE_IN_MS: u64 = 500;
pub const FADE_OUT_MS: u64 = 1000;

/// Level at `step` of a ramp from `start` to `target`. Rising ramps follow a
/// square curve (slow start), falling ramps a square-root curve (fast start).
pub fn fade_level(start: f32, target: f32, step: u32, steps: u32) -> f32 {
    let t = step.min(steps) as f32 / steps.max(1) as f32;
    let curve = if target > start { t * t } else { t.sqrt() };
    (start + (target - start) * curve).clamp(0.0, 1.0)
}

struct FadeShared {
    gain: AtomicU32,
    generation: AtomicU64,
}

impl FadeShared {
    fn store(&self, v: f32) {
        self.gain.store(v.to_bits(), Ordering::Release);
    }
}

/// The channel gain of the current stream, with ramp support.
#[derive(Clone)]
pub struct Fader {
    shared: Arc<FadeShared>,
}

impl Fader {
    pub fn new(initial: f32) -> Self {
        Self {
            shared: Arc::new(FadeShared {
                gain: AtomicU32::new(initial.to_bits()),
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn gain(&self) -> f32 {
        f32::from_bits(self.shared.gain.load(Ordering::Acquire))
    }

    pub fn set_gain(&self, v: f32) {
        self.shared.store(v.clamp(0.0, 1.0));
    }

    /// Cancel the running ramp, leaving the gain where it is.
    pub fn stop(&self) {
        self.shared.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Ramp from silence to `target`.
    pub fn fade_in(&self, target: f32, duration_ms: u64) -> io::Result<thread::JoinHandle<()>> {
        self.stop();
        self.shared.store(0.0);
        self.start(0.0, target, duration_ms)
    }

    /// Ramp from the current gain to silence.
    pub fn fade_out(&self, duration_ms: u64) -> io::Result<thread::JoinHandle<()>> {
        self.stop();
        self.start(self.gain(), 0.0, duration_ms)
    }

    fn start(&self, from: f32, to: f32, duration_ms: u64) -> io::Result<thread::JoinHandle<()>> {
        let generation = self.shared.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let shared = Arc::clone(&self.shared);
        let interval = Duration::from_millis(duration_ms / u64::from(FADE_STEPS));
        tracing::trace!(from, to, duration_ms, "fade started");
        thread::Builder::new().name("fade".into()).spawn(move || {
            for step in 0..=FADE_STEPS {
                if shared.generation.load(Ordering::Acquire) != generation {
                    return;
                }
                shared.store(fade_level(from, to, step, FADE_STEPS));
                if step < FADE_STEPS {
                    thread::sleep(interval);
                }
            }
        })
    }
}
