// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// The UI side of the protocol: holds the liveness lock, sends one request at
// a time and reads notifications.

use std::io;
use std::thread;
use std::time::Duration;

use crate::error::{IpcError, IpcResult};
use crate::message::{decode_response, Request, Response};
use crate::named_lock::{LockAttempt, NamedLock};
use crate::naming::ResourceNames;
use crate::region::Slot;
use crate::transport::Transport;

/// A connected client.
///
/// The liveness lock is owned by the thread that called
/// [`connect`](Self::connect); drop the client on that same thread so the
/// host sees a clean release.
pub struct PlaybackClient {
    transport: Transport,
    alive: NamedLock,
}

/// Attempts at the client lock before another client is assumed to own it.
const LOCK_ATTEMPTS: u32 = 5;
const LOCK_RETRY: Duration = Duration::from_millis(10);

/// The host's monitor holds the lock for an instant on every poll, so one
/// `Busy` does not yet mean another client is running.
fn take_client_lock(lock: &NamedLock) -> io::Result<LockAttempt> {
    let mut attempt = lock.try_acquire()?;
    for _ in 1..LOCK_ATTEMPTS {
        if attempt != LockAttempt::Busy {
            break;
        }
        thread::sleep(LOCK_RETRY);
        attempt = lock.try_acquire()?;
    }
    Ok(attempt)
}

impl PlaybackClient {
    /// Take the liveness lock and attach to the host's transport.
    pub fn connect(names: &ResourceNames) -> IpcResult<Self> {
        let alive =
            NamedLock::open(&names.client_lock).map_err(|e| IpcError::open(&names.client_lock, e))?;
        match take_client_lock(&alive)? {
            LockAttempt::Acquired => {}
            LockAttempt::Abandoned => {
                tracing::warn!(lock = %names.client_lock, "took over a lock left by a dead client")
            }
            LockAttempt::Busy => return Err(IpcError::AlreadyRunning(names.client_lock.clone())),
        }
        let transport = Transport::open(names)?;
        tracing::debug!(lock = %names.client_lock, "client connected");
        Ok(Self { transport, alive })
    }

    /// Send a request and wait up to `timeout` for its response.
    pub fn request(&self, request: &Request, timeout: Duration) -> IpcResult<Response> {
        let bytes = serde_json::to_vec(request)?;
        self.send_raw(&bytes, timeout)
    }

    /// Send arbitrary bytes as the request payload.
    pub fn send_raw(&self, payload: &[u8], timeout: Duration) -> IpcResult<Response> {
        // A raise left over from an abandoned exchange would pair us with a
        // stale response.
        self.transport.response_ready.try_wait()?;

        let write = self.transport.region.write_slot(Slot::Request, payload)?;
        if write.truncated {
            tracing::warn!(len = payload.len(), written = write.written, "request truncated");
        }
        self.transport.request_ready.signal()?;

        if !self
            .transport
            .response_ready
            .wait(Some(timeout.as_millis() as u64))?
        {
            return Err(IpcError::Timeout("response"));
        }
        let bytes = self.transport.region.read_slot(Slot::Response).ok_or_else(|| {
            IpcError::Io(io::Error::new(io::ErrorKind::InvalidData, "response slot is empty"))
        })?;
        Ok(decode_response(&bytes)?)
    }

    /// Wait up to `timeout` for the next notification.
    pub fn next_notification(&self, timeout: Duration) -> IpcResult<Option<Response>> {
        if !self
            .transport
            .notification_ready
            .wait(Some(timeout.as_millis() as u64))?
        {
            return Ok(None);
        }
        match self.transport.region.read_slot(Slot::Notification) {
            Some(bytes) => Ok(Some(decode_response(&bytes)?)),
            None => Ok(None),
        }
    }
}

impl Drop for PlaybackClient {
    fn drop(&mut self) {
        if let Err(e) = self.alive.release() {
            tracing::debug!(lock = self.alive.name(), error = %e, "liveness lock release failed");
        }
    }
}
