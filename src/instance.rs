// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// System-wide single-instance lock held for the whole life of the host.

use crate::error::{IpcError, IpcResult};
use crate::named_lock::{LockAttempt, NamedLock};

/// Result of trying to become the only running host.
pub enum InstanceAcquire {
    /// This process is now the host; keep the guard alive until exit.
    Owned(SingleInstanceGuard),
    /// Another live host holds the lock.
    AlreadyHeld,
}

/// Owns the instance lock. Dropping it releases the lock; if the process
/// dies instead, the OS hands the lock to the next acquirer as abandoned.
pub struct SingleInstanceGuard {
    lock: NamedLock,
}

impl SingleInstanceGuard {
    /// Try once, without waiting, to take the instance lock.
    pub fn acquire(name: &str) -> IpcResult<InstanceAcquire> {
        let lock = NamedLock::open(name).map_err(|e| IpcError::open(name, e))?;
        match lock.try_acquire()? {
            LockAttempt::Acquired => {
                tracing::info!(name, "instance lock acquired");
                Ok(InstanceAcquire::Owned(Self { lock }))
            }
            LockAttempt::Abandoned => {
                tracing::warn!(name, "instance lock recovered from a host that died holding it");
                Ok(InstanceAcquire::Owned(Self { lock }))
            }
            LockAttempt::Busy => {
                tracing::info!(name, "instance lock busy");
                Ok(InstanceAcquire::AlreadyHeld)
            }
        }
    }

    pub fn name(&self) -> &str {
        self.lock.name()
    }
}

impl Drop for SingleInstanceGuard {
    fn drop(&mut self) {
        // Fails only when dropped on a thread other than the acquirer; the
        // OS releases the lock at process exit in that case.
        if let Err(e) = self.lock.release() {
            tracing::debug!(name = self.lock.name(), error = %e, "instance lock release skipped");
        } else {
            tracing::debug!(name = self.lock.name(), "instance lock released");
        }
    }
}

impl InstanceAcquire {
    /// Convert `AlreadyHeld` into an error for callers that treat it as one.
    pub fn into_guard(self, name: &str) -> IpcResult<SingleInstanceGuard> {
        match self {
            InstanceAcquire::Owned(guard) => Ok(guard),
            InstanceAcquire::AlreadyHeld => Err(IpcError::AlreadyRunning(name.to_string())),
        }
    }
}
