// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// The host's request loop: wait for RequestReady, decode, dispatch, write the
// Response slot, raise ResponseReady.

use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::dispatch::{CommandDispatcher, RESULT_EXECUTION};
use crate::error::IpcResult;
use crate::message::{decode_request, encode_into, Request, Response};
use crate::region::Slot;
use crate::shutdown::ShutdownToken;
use crate::signal::SignalOutcome;
use crate::transport::Transport;

pub const RESULT_INVALID_REQUEST: &str = "Error_InvalidRequest";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ListenerState {
    Idle = 0,
    Dispatching = 1,
    Stopped = 2,
}

impl ListenerState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ListenerState::Idle,
            1 => ListenerState::Dispatching,
            _ => ListenerState::Stopped,
        }
    }
}

/// Read-only view of a listener's state from another thread.
#[derive(Clone)]
pub struct ListenerStatus(Arc<AtomicU8>);

impl ListenerStatus {
    pub fn get(&self) -> ListenerState {
        ListenerState::from_u8(self.0.load(Ordering::Acquire))
    }
}

#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Longest single wait on RequestReady before re-checking cancellation.
    pub request_wait: Duration,
    /// Pause after a transport error.
    pub error_backoff: Duration,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            request_wait: Duration::from_millis(100),
            error_backoff: Duration::from_millis(500),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "panic"
    }
}

/// Serves one request at a time on its own thread.
///
/// Dispatch is strictly serial, so the read and encode buffers are owned by
/// the listener and reused for every request.
pub struct RequestListener {
    transport: Arc<Transport>,
    dispatcher: CommandDispatcher,
    token: ShutdownToken,
    config: ListenerConfig,
    state: Arc<AtomicU8>,
    read_buf: Vec<u8>,
    write_buf: Vec<u8>,
}

impl RequestListener {
    pub fn new(
        transport: Arc<Transport>,
        dispatcher: CommandDispatcher,
        token: ShutdownToken,
        config: ListenerConfig,
    ) -> Self {
        Self {
            transport,
            dispatcher,
            token,
            config,
            state: Arc::new(AtomicU8::new(ListenerState::Idle as u8)),
            read_buf: Vec::with_capacity(Slot::Request.capacity()),
            write_buf: Vec::with_capacity(Slot::Response.capacity()),
        }
    }

    pub fn status(&self) -> ListenerStatus {
        ListenerStatus(Arc::clone(&self.state))
    }

    pub fn spawn(self) -> io::Result<thread::JoinHandle<()>> {
        thread::Builder::new()
            .name("request-listener".into())
            .spawn(move || self.run())
    }

    fn set_state(&self, state: ListenerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Loop until the shutdown token fires.
    pub fn run(mut self) {
        tracing::info!("request listener started");
        let wait_ms = self.config.request_wait.as_millis() as u64;
        while !self.token.is_cancelled() {
            match self.transport.request_ready.wait(Some(wait_ms)) {
                Ok(false) => continue,
                Ok(true) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "waiting for requests failed");
                    if self.token.wait_timeout(self.config.error_backoff) {
                        break;
                    }
                    continue;
                }
            }

            self.set_state(ListenerState::Dispatching);
            let served = self.serve_one();
            self.set_state(ListenerState::Idle);

            if let Err(e) = served {
                tracing::warn!(error = %e, "request cycle failed, backing off");
                if self.token.wait_timeout(self.config.error_backoff) {
                    break;
                }
            }
        }
        self.set_state(ListenerState::Stopped);
        tracing::info!("request listener stopped");
    }

    fn serve_one(&mut self) -> IpcResult<()> {
        let Some(len) = self
            .transport
            .region
            .read_slot_into(Slot::Request, &mut self.read_buf)
        else {
            tracing::debug!("woken with an empty request slot");
            return Ok(());
        };
        tracing::trace!(len, "request read");

        let response = match decode_request(&self.read_buf) {
            Ok(request) => self.dispatch_guarded(&request),
            Err(e) => {
                tracing::debug!(error = %e, "request decode failed");
                Response::failure(
                    format!("JSON deserialization failed: {e}"),
                    RESULT_INVALID_REQUEST,
                )
            }
        };

        encode_into(&response, &mut self.write_buf)?;
        let write = self
            .transport
            .region
            .write_slot(Slot::Response, &self.write_buf)?;
        if write.truncated {
            tracing::warn!(
                len = self.write_buf.len(),
                written = write.written,
                "response truncated to slot capacity"
            );
        }
        if self.transport.response_ready.signal()? == SignalOutcome::AlreadyPending {
            tracing::debug!("previous response was never consumed");
        }
        Ok(())
    }

    fn dispatch_guarded(&self, request: &Request) -> Response {
        match panic::catch_unwind(AssertUnwindSafe(|| self.dispatcher.dispatch(request))) {
            Ok(response) => response,
            Err(payload) => {
                let msg = panic_message(payload.as_ref());
                tracing::error!(command = %request.command, panic = msg, "command handler panicked");
                Response::failure(format!("Error during command execution: {msg}"), RESULT_EXECUTION)
            }
        }
    }
}
