// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Named binary signal: a wake-up flag shared between processes whose count
// never exceeds one.

use std::io;

pub use crate::platform::SignalOutcome;
use crate::platform::PlatformSignal;

/// A named binary semaphore.
///
/// `signal` raises it (a second raise before a `wait` is reported as
/// [`SignalOutcome::AlreadyPending`] and changes nothing), `wait` blocks
/// until it is raised and lowers it again.
pub struct BinarySignal {
    inner: PlatformSignal,
    name: String,
}

impl BinarySignal {
    /// Open the signal, creating it lowered if needed.
    pub fn open(name: &str) -> io::Result<Self> {
        Ok(Self {
            inner: PlatformSignal::open(name)?,
            name: name.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait for the signal. `None` waits forever.
    /// Returns `Ok(false)` if the timeout elapsed first.
    pub fn wait(&self, timeout_ms: Option<u64>) -> io::Result<bool> {
        self.inner.wait(timeout_ms)
    }

    /// Consume a pending raise without blocking.
    pub fn try_wait(&self) -> io::Result<bool> {
        self.inner.try_wait()
    }

    pub fn signal(&self) -> io::Result<SignalOutcome> {
        self.inner.signal()
    }

    /// Remove the backing storage for a named signal.
    pub fn clear_storage(name: &str) {
        PlatformSignal::clear_storage(name);
    }
}
