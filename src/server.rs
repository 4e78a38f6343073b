// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Host orchestration: wires transport, engine, listener and liveness monitor
// together and tears them down in order.

use std::sync::Arc;
use std::thread::JoinHandle;

use crate::dispatch::CommandDispatcher;
use crate::engine::{EngineError, PlaybackEngine};
use crate::error::IpcResult;
use crate::instance::SingleInstanceGuard;
use crate::listener::{ListenerConfig, ListenerState, ListenerStatus, RequestListener};
use crate::liveness::{ClientLivenessMonitor, LivenessConfig, LivenessState};
use crate::notify::NotificationSender;
use crate::shutdown::ShutdownToken;
use crate::transport::Transport;

#[derive(Debug, Clone, Default)]
pub struct ServerOptions {
    pub listener: ListenerConfig,
    /// `None` runs without a liveness monitor.
    pub liveness: Option<LivenessConfig>,
}

/// A running host.
///
/// Teardown order is fixed: stop the threads, dispose the engine, release the
/// region and signals, release the instance lock. [`shutdown`](Self::shutdown)
/// may be called any number of times and also runs on drop.
pub struct Server {
    token: ShutdownToken,
    engine: Option<Arc<dyn PlaybackEngine>>,
    transport: Option<Arc<Transport>>,
    guard: Option<SingleInstanceGuard>,
    listener: Option<JoinHandle<()>>,
    liveness: Option<JoinHandle<LivenessState>>,
    listener_status: ListenerStatus,
    liveness_outcome: Option<LivenessState>,
    stopped: bool,
}

impl Server {
    /// Start serving. `make_engine` receives the notification sender the
    /// engine reports its events through.
    pub fn start<F>(
        guard: SingleInstanceGuard,
        transport: Transport,
        options: ServerOptions,
        make_engine: F,
    ) -> IpcResult<Self>
    where
        F: FnOnce(Arc<NotificationSender>) -> Result<Arc<dyn PlaybackEngine>, EngineError>,
    {
        let token = ShutdownToken::new();

        transport.reset_host_slots();
        let transport = Arc::new(transport);
        let notifier = Arc::new(NotificationSender::new(Arc::clone(&transport)));
        let engine = make_engine(notifier)?;

        let listener = RequestListener::new(
            Arc::clone(&transport),
            CommandDispatcher::new(Arc::clone(&engine)),
            token.clone(),
            options.listener,
        );
        let listener_status = listener.status();
        let listener = listener.spawn()?;

        let liveness = match options.liveness {
            Some(config) => {
                let on_gone = token.clone();
                let monitor = ClientLivenessMonitor::new(config, token.clone());
                Some(monitor.spawn(move || {
                    tracing::info!("client gone, shutting down");
                    on_gone.cancel();
                })?)
            }
            None => None,
        };

        tracing::info!(region = transport.region.name(), "host started");
        Ok(Self {
            token,
            engine: Some(engine),
            transport: Some(transport),
            guard: Some(guard),
            listener: Some(listener),
            liveness,
            listener_status,
            liveness_outcome: None,
            stopped: false,
        })
    }

    /// Handle for cancelling the server from elsewhere (signal handlers).
    pub fn token(&self) -> ShutdownToken {
        self.token.clone()
    }

    pub fn listener_state(&self) -> ListenerState {
        self.listener_status.get()
    }

    /// Terminal state of the liveness monitor, once shut down.
    pub fn liveness_outcome(&self) -> Option<LivenessState> {
        self.liveness_outcome
    }

    /// Block until the token fires (client gone, signal, or explicit cancel).
    pub fn wait(&self) {
        self.token.wait();
    }

    pub fn shutdown(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.token.cancel();

        if let Some(handle) = self.listener.take() {
            if handle.join().is_err() {
                tracing::error!("request listener panicked");
            }
        }
        if let Some(handle) = self.liveness.take() {
            match handle.join() {
                Ok(state) => {
                    tracing::debug!(?state, "liveness monitor finished");
                    self.liveness_outcome = Some(state);
                }
                Err(_) => tracing::error!("liveness monitor panicked"),
            }
        }

        if let Some(engine) = self.engine.take() {
            if let Err(e) = engine.dispose() {
                tracing::warn!(error = %e, "engine dispose failed");
            }
        }
        self.transport.take();
        self.guard.take();
        tracing::info!("host stopped");
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.shutdown();
    }
}
