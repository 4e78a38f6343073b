// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Client liveness monitor: watches the lock the client holds for its whole
// lifetime and fires a callback once that lock becomes acquirable.

use std::io;
use std::thread;
use std::time::Duration;

use crate::named_lock::{LockAttempt, NamedLock};
use crate::shutdown::ShutdownToken;

/// Where the monitor is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessState {
    /// Waiting for the client lock to exist.
    AwaitingClient,
    /// Polling the client lock. A lock that has never been seen held does
    /// not count as released.
    Monitoring,
    /// The client released or abandoned its lock; the callback ran.
    ClientGone,
    /// The client lock never appeared; the host runs unmonitored.
    Disabled,
    /// The shutdown token fired first.
    Cancelled,
}

/// Timing and naming of the monitor.
#[derive(Debug, Clone)]
pub struct LivenessConfig {
    pub lock_name: String,
    pub open_attempts: u32,
    pub open_interval: Duration,
    pub poll_interval: Duration,
}

impl LivenessConfig {
    pub fn new(lock_name: impl Into<String>) -> Self {
        Self {
            lock_name: lock_name.into(),
            open_attempts: 100,
            open_interval: Duration::from_millis(250),
            poll_interval: Duration::from_millis(100),
        }
    }
}

pub struct ClientLivenessMonitor {
    config: LivenessConfig,
    token: ShutdownToken,
}

enum Opened {
    Lock(NamedLock),
    GaveUp,
    Cancelled,
}

impl ClientLivenessMonitor {
    pub fn new(config: LivenessConfig, token: ShutdownToken) -> Self {
        Self { config, token }
    }

    /// Run the monitor on a dedicated thread.
    pub fn spawn<F>(self, on_gone: F) -> io::Result<thread::JoinHandle<LivenessState>>
    where
        F: FnOnce() + Send + 'static,
    {
        thread::Builder::new()
            .name("client-liveness".into())
            .spawn(move || self.run(on_gone))
    }

    /// Run the monitor to completion on the calling thread and return the
    /// terminal state. `on_gone` runs at most once, and only on `ClientGone`.
    pub fn run<F: FnOnce()>(self, on_gone: F) -> LivenessState {
        let name = self.config.lock_name.as_str();
        tracing::debug!(lock = name, state = ?LivenessState::AwaitingClient, "liveness monitor started");

        let lock = match self.await_client() {
            Opened::Lock(lock) => lock,
            Opened::GaveUp => {
                tracing::warn!(
                    lock = name,
                    attempts = self.config.open_attempts,
                    "client lock never appeared, liveness monitoring disabled"
                );
                return LivenessState::Disabled;
            }
            Opened::Cancelled => return LivenessState::Cancelled,
        };

        tracing::info!(lock = name, state = ?LivenessState::Monitoring, "monitoring client");
        // A client creates its lock before taking it, so a free lock only
        // means "gone" once it has been seen held.
        let mut seen_held = false;
        loop {
            match lock.try_acquire() {
                Ok(LockAttempt::Busy) => {
                    if !seen_held {
                        tracing::debug!(lock = name, "client holds its lock");
                    }
                    seen_held = true;
                }
                Ok(LockAttempt::Acquired) if !seen_held => {
                    if let Err(e) = lock.release() {
                        tracing::debug!(lock = name, error = %e, "release after poll failed");
                    }
                    tracing::trace!(lock = name, "client lock not taken yet");
                }
                Ok(attempt) => {
                    // Not ours to keep.
                    if let Err(e) = lock.release() {
                        tracing::debug!(lock = name, error = %e, "release after poll failed");
                    }
                    if attempt == LockAttempt::Abandoned {
                        tracing::warn!(lock = name, "client died holding its lock");
                    } else {
                        tracing::info!(lock = name, "client released its lock");
                    }
                    on_gone();
                    return LivenessState::ClientGone;
                }
                Err(e) => tracing::warn!(lock = name, error = %e, "client lock poll failed"),
            }
            if self.token.wait_timeout(self.config.poll_interval) {
                return LivenessState::Cancelled;
            }
        }
    }

    fn await_client(&self) -> Opened {
        for attempt in 1..=self.config.open_attempts {
            if self.token.is_cancelled() {
                return Opened::Cancelled;
            }
            match NamedLock::open_existing(&self.config.lock_name) {
                Ok(lock) => {
                    tracing::debug!(lock = %self.config.lock_name, attempt, "client lock opened");
                    return Opened::Lock(lock);
                }
                Err(e) => tracing::trace!(attempt, error = %e, "client lock not available yet"),
            }
            if attempt < self.config.open_attempts
                && self.token.wait_timeout(self.config.open_interval)
            {
                return Opened::Cancelled;
            }
        }
        Opened::GaveUp
    }
}
