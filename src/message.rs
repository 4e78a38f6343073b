// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Wire records carried in the slots, JSON encoded.

use serde::{Deserialize, Serialize};

/// Type codes carried in `Response::kind`.
pub mod kind {
    pub const FAILURE: i32 = 0;
    pub const SUCCESS: i32 = 1;
    pub const PLAY_STATE: i32 = 5;
    pub const PLAYBACK_ENDED: i32 = 11;
    pub const PROGRESS: i32 = 20;
    pub const DURATION: i32 = 21;
    pub const POSITION_ADJUSTED: i32 = 22;
    pub const VOLUME_WRITE_BACK: i32 = 100;
    pub const DISPOSE: i32 = 1000;
}

/// A command from the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub command: String,
    #[serde(default)]
    pub data: Option<String>,
}

impl Request {
    pub fn new(command: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            data: Some(data.into()),
        }
    }

    /// A request without a payload.
    pub fn bare(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            data: None,
        }
    }

    /// The payload, empty when absent or null on the wire.
    pub fn data(&self) -> &str {
        self.data.as_deref().unwrap_or("")
    }
}

/// A response to a request, or an unsolicited notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    #[serde(rename = "type")]
    pub kind: i32,
    pub message: String,
    pub result: String,
}

impl Response {
    pub fn new(kind: i32, message: impl Into<String>, result: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            result: result.into(),
        }
    }

    pub fn failure(message: impl Into<String>, result: impl Into<String>) -> Self {
        Self::new(kind::FAILURE, message, result)
    }

    pub fn is_failure(&self) -> bool {
        self.kind == kind::FAILURE
    }
}

/// Encode `value` into `buf`, replacing its contents and keeping its
/// allocation.
pub fn encode_into<T: Serialize>(value: &T, buf: &mut Vec<u8>) -> serde_json::Result<()> {
    buf.clear();
    serde_json::to_writer(&mut *buf, value)
}

pub fn decode_request(bytes: &[u8]) -> serde_json::Result<Request> {
    serde_json::from_slice(bytes)
}

pub fn decode_response(bytes: &[u8]) -> serde_json::Result<Response> {
    serde_json::from_slice(bytes)
}
