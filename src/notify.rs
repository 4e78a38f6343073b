// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Unsolicited host-to-client events through the Notification slot.

use std::sync::{Arc, Mutex, PoisonError};

use crate::error::IpcResult;
use crate::message::{encode_into, kind, Response};
use crate::region::Slot;
use crate::signal::SignalOutcome;
use crate::transport::Transport;

/// Receiver of engine events.
pub trait EventSink: Send + Sync {
    fn play_state_changed(&self, playing: bool);
    fn playback_ended(&self, playing: bool);
    fn volume_corrected(&self, volume: f32);
}

fn flag(b: bool) -> &'static str {
    if b {
        "True"
    } else {
        "False"
    }
}

/// Writes notifications into the Notification slot and raises
/// NotificationReady.
///
/// There is no queue: a notification sent before the client consumed the
/// previous one replaces it.
pub struct NotificationSender {
    transport: Arc<Transport>,
    // Held across encode, write and signal. Owns the encode buffer.
    buf: Mutex<Vec<u8>>,
}

impl NotificationSender {
    pub fn new(transport: Arc<Transport>) -> Self {
        Self {
            transport,
            buf: Mutex::new(Vec::with_capacity(Slot::Notification.capacity())),
        }
    }

    pub fn send(&self, notification: &Response) -> IpcResult<SignalOutcome> {
        let mut buf = self.buf.lock().unwrap_or_else(PoisonError::into_inner);
        encode_into(notification, &mut buf)?;
        let write = self.transport.region.write_slot(Slot::Notification, &buf)?;
        if write.truncated {
            tracing::warn!(
                len = buf.len(),
                written = write.written,
                "notification truncated to slot capacity"
            );
        }
        let outcome = self.transport.notification_ready.signal()?;
        if outcome == SignalOutcome::AlreadyPending {
            tracing::debug!(kind = notification.kind, "previous notification unconsumed, overwritten");
        }
        Ok(outcome)
    }

    fn send_logged(&self, notification: Response) {
        if let Err(e) = self.send(&notification) {
            tracing::warn!(kind = notification.kind, error = %e, "notification not sent");
        }
    }
}

impl EventSink for NotificationSender {
    fn play_state_changed(&self, playing: bool) {
        self.send_logged(Response::new(kind::PLAY_STATE, "PlayStateUpdate", flag(playing)));
    }

    fn playback_ended(&self, playing: bool) {
        self.send_logged(Response::new(kind::PLAYBACK_ENDED, "PlayBackEnded", flag(playing)));
    }

    fn volume_corrected(&self, volume: f32) {
        self.send_logged(Response::new(
            kind::VOLUME_WRITE_BACK,
            "VolumeWriteBack",
            volume.to_string(),
        ));
    }
}
