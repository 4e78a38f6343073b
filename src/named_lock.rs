// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Cross-platform named exclusive lock.
// Delegates to platform::PlatformLock (POSIX or Windows).

use std::io;

pub use crate::platform::LockAttempt;
use crate::platform::PlatformLock;

/// A named, inter-process exclusive lock.
///
/// On POSIX this is a `pthread_mutex_t` stored in shared memory with
/// `PTHREAD_PROCESS_SHARED` and, outside macOS, `PTHREAD_MUTEX_ROBUST`.
/// On Windows this is a kernel named mutex.
///
/// Ownership is per thread on both platforms: the thread that acquired the
/// lock is the one that must release it. When the owner dies without
/// releasing, the next acquirer sees [`LockAttempt::Abandoned`].
pub struct NamedLock {
    inner: PlatformLock,
    name: String,
}

impl NamedLock {
    /// Open the lock, creating it if it does not exist yet.
    pub fn open(name: &str) -> io::Result<Self> {
        Ok(Self {
            inner: PlatformLock::open(name)?,
            name: name.to_string(),
        })
    }

    /// Open a lock that another process created. Never creates it.
    pub fn open_existing(name: &str) -> io::Result<Self> {
        Ok(Self {
            inner: PlatformLock::open_existing(name)?,
            name: name.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Block until the lock is held.
    pub fn acquire(&self) -> io::Result<LockAttempt> {
        self.inner.lock()
    }

    /// Try to take the lock without blocking.
    pub fn try_acquire(&self) -> io::Result<LockAttempt> {
        self.inner.try_lock()
    }

    pub fn release(&self) -> io::Result<()> {
        self.inner.unlock()
    }

    /// Remove the backing storage for a named lock.
    pub fn clear_storage(name: &str) {
        PlatformLock::clear_storage(name);
    }
}
