// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Platform capability layer: a named shared memory segment, a named
// exclusive lock that can be probed without blocking, and a named binary
// signal. Everything above this module only relies on these operations.

#[cfg(unix)]
pub mod posix;

#[cfg(windows)]
pub mod windows;

#[cfg(unix)]
pub use posix::{PlatformLock, PlatformShm, PlatformSignal, ShmMode};

#[cfg(windows)]
pub use windows::{PlatformLock, PlatformShm, PlatformSignal, ShmMode};

/// Result of a non-blocking acquire of a named lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockAttempt {
    /// The lock was free and is now held by the caller.
    Acquired,
    /// The previous owner died while holding it; the caller now holds it.
    Abandoned,
    /// Someone else holds it.
    Busy,
}

impl LockAttempt {
    /// Whether the caller holds the lock after the attempt.
    pub fn is_held(self) -> bool {
        !matches!(self, LockAttempt::Busy)
    }
}

/// Result of raising a binary signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalOutcome {
    /// The signal went from 0 to 1.
    Raised,
    /// The signal was already at 1; nothing changed.
    AlreadyPending,
}
