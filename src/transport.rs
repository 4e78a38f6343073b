// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// The region and its three signals, opened together from one name set.

use crate::error::{IpcError, IpcResult};
use crate::naming::ResourceNames;
use crate::region::{SharedRegion, Slot, REGION_SIZE};
use crate::signal::BinarySignal;

/// Everything host and client share apart from the locks.
pub struct Transport {
    pub region: SharedRegion,
    pub request_ready: BinarySignal,
    pub response_ready: BinarySignal,
    pub notification_ready: BinarySignal,
}

fn open_signal(name: &str) -> IpcResult<BinarySignal> {
    BinarySignal::open(name).map_err(|e| IpcError::open(name, e))
}

impl Transport {
    /// Create or attach the region and all three signals.
    pub fn open(names: &ResourceNames) -> IpcResult<Self> {
        let transport = Self {
            region: SharedRegion::create_or_open(&names.region, REGION_SIZE)?,
            request_ready: open_signal(&names.request_ready)?,
            response_ready: open_signal(&names.response_ready)?,
            notification_ready: open_signal(&names.notification_ready)?,
        };
        tracing::debug!(region = %names.region, "transport opened");
        Ok(transport)
    }

    /// Drop whatever a previous host left in the host-written slots.
    pub fn reset_host_slots(&self) {
        self.region.clear_slot(Slot::Response);
        self.region.clear_slot(Slot::Notification);
    }

    /// Remove the backing storage of every object in `names` except the
    /// client lock.
    pub fn clear_storage(names: &ResourceNames) {
        SharedRegion::clear_storage(&names.region);
        BinarySignal::clear_storage(&names.request_ready);
        BinarySignal::clear_storage(&names.response_ready);
        BinarySignal::clear_storage(&names.notification_ready);
    }
}
