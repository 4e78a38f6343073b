// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Shared-memory request/response transport between a headless playback host
// and a single UI client: one named region with three fixed slots, three
// binary signals, a single-instance lock and client liveness monitoring.

pub mod naming;

mod platform;

pub mod error;
pub use error::{IpcError, IpcResult};

pub mod region;
pub use region::{SharedRegion, Slot, SlotWrite, REGION_SIZE};

pub mod named_lock;
pub use named_lock::{LockAttempt, NamedLock};

pub mod signal;
pub use signal::{BinarySignal, SignalOutcome};

pub mod transport;
pub use transport::Transport;

pub mod instance;
pub use instance::{InstanceAcquire, SingleInstanceGuard};

pub mod shutdown;
pub use shutdown::ShutdownToken;

pub mod liveness;
pub use liveness::{ClientLivenessMonitor, LivenessConfig, LivenessState};

pub mod message;
pub use message::{Request, Response};

pub mod engine;

pub mod dispatch;
pub use dispatch::{Command, CommandDispatcher};

pub mod notify;
pub use notify::{EventSink, NotificationSender};

pub mod listener;
pub use listener::{ListenerConfig, ListenerState, RequestListener};

pub mod server;
pub use server::{Server, ServerOptions};

pub mod config;

pub mod client;
pub use client::PlaybackClient;
