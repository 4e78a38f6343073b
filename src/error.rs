// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Error type shared by the transport, listener and host orchestration.

use std::io;

use thiserror::Error;

/// Errors raised above the platform layer.
#[derive(Error, Debug)]
pub enum IpcError {
    /// A named OS object could not be created or attached.
    #[error("failed to open {name}: {source}")]
    Open {
        name: String,
        #[source]
        source: io::Error,
    },

    /// A named object that must already exist does not.
    #[error("{name} does not exist")]
    NotFound { name: String },

    /// Any other OS-level failure.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A record could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// A bounded wait elapsed.
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    /// Another host already owns the instance lock.
    #[error("another instance already holds {0}")]
    AlreadyRunning(String),

    /// The playback engine could not be built.
    #[error("engine error: {0}")]
    Engine(#[from] crate::engine::EngineError),
}

impl IpcError {
    /// Wrap an open failure, mapping `NotFound` to its own variant.
    pub(crate) fn open(name: &str, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            IpcError::NotFound {
                name: name.to_string(),
            }
        } else {
            IpcError::Open {
                name: name.to_string(),
                source,
            }
        }
    }
}

pub type IpcResult<T> = Result<T, IpcError>;
