// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// The shared region: one named segment split into three fixed slots, each a
// 4-byte length prefix followed by the payload.

use std::sync::atomic::{AtomicI32, Ordering};

use crate::error::{IpcError, IpcResult};
use crate::platform::{PlatformShm, ShmMode};

/// Size of the length prefix that starts every slot.
pub const LENGTH_PREFIX: usize = std::mem::size_of::<i32>();

/// Capacity of the Request slot, prefix included.
pub const REQUEST_CAPACITY: usize = 4096;

/// Capacity of the Response and Notification slots, prefix included.
pub const RESPONSE_CAPACITY: usize = 1024;

/// Total region size: one request slot and two response-sized slots.
pub const REGION_SIZE: usize = REQUEST_CAPACITY + 2 * RESPONSE_CAPACITY;

/// One of the three fixed slots of the region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    /// Written by the client.
    Request,
    /// Written by the host's listener.
    Response,
    /// Written by the host's notification sender.
    Notification,
}

impl Slot {
    pub const ALL: [Slot; 3] = [Slot::Request, Slot::Response, Slot::Notification];

    pub const fn offset(self) -> usize {
        match self {
            Slot::Request => 0,
            Slot::Response => REQUEST_CAPACITY,
            Slot::Notification => REQUEST_CAPACITY + RESPONSE_CAPACITY,
        }
    }

    /// Slot size in bytes, length prefix included.
    pub const fn capacity(self) -> usize {
        match self {
            Slot::Request => REQUEST_CAPACITY,
            Slot::Response | Slot::Notification => RESPONSE_CAPACITY,
        }
    }

    /// Largest payload the slot can carry.
    pub const fn max_payload(self) -> usize {
        self.capacity() - LENGTH_PREFIX
    }

    const fn end(self) -> usize {
        self.offset() + self.capacity()
    }
}

/// Outcome of a slot write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotWrite {
    /// Bytes stored, equal to the new length prefix.
    pub written: usize,
    /// The payload did not fit and its tail was dropped.
    pub truncated: bool,
}

/// A named shared region mapped into this process.
///
/// Attaching is idempotent: the segment is created on first use and
/// reattached if a previous run left it behind. Each slot has a single
/// writer; the slot contents only become meaningful to the reader once the
/// matching signal has been raised.
pub struct SharedRegion {
    shm: PlatformShm,
    name: String,
}

impl SharedRegion {
    pub fn create_or_open(name: &str, size: usize) -> IpcResult<Self> {
        let shm = PlatformShm::acquire(name, size, ShmMode::CreateOrOpen)
            .map_err(|e| IpcError::open(name, e))?;
        tracing::debug!(name, size, first = shm.prev_ref_count() == 0, "region attached");
        Ok(Self {
            shm,
            name: name.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Usable size of the mapping.
    pub fn size(&self) -> usize {
        self.shm.user_size()
    }

    fn fits(&self, slot: Slot) -> bool {
        slot.end() <= self.size()
    }

    fn length_cell(&self, slot: Slot) -> &AtomicI32 {
        // Slot offsets are multiples of 4 and the mapping is page aligned.
        unsafe { &*(self.shm.as_ptr().add(slot.offset()) as *const AtomicI32) }
    }

    fn payload_ptr(&self, slot: Slot) -> *mut u8 {
        unsafe { self.shm.as_mut_ptr().add(slot.offset() + LENGTH_PREFIX) }
    }

    /// The raw length prefix of `slot`, or `None` if the slot lies outside
    /// the mapping.
    pub fn length_prefix(&self, slot: Slot) -> Option<i32> {
        self.fits(slot)
            .then(|| self.length_cell(slot).load(Ordering::Acquire))
    }

    /// Validated payload length: `None` when the prefix is zero, negative or
    /// larger than the slot can hold.
    fn message_len(&self, slot: Slot) -> Option<usize> {
        let raw = self.length_prefix(slot)?;
        if raw <= 0 {
            return None;
        }
        let len = raw as usize;
        (len <= slot.max_payload()).then_some(len)
    }

    /// Copy out the message in `slot`, if any.
    pub fn read_slot(&self, slot: Slot) -> Option<Vec<u8>> {
        let mut buf = Vec::new();
        self.read_slot_into(slot, &mut buf)?;
        Some(buf)
    }

    /// Copy the message in `slot` into `buf`, replacing its contents.
    /// Reuses the buffer's allocation; returns the payload length.
    pub fn read_slot_into(&self, slot: Slot, buf: &mut Vec<u8>) -> Option<usize> {
        let len = self.message_len(slot)?;
        buf.clear();
        let src = unsafe { std::slice::from_raw_parts(self.payload_ptr(slot) as *const u8, len) };
        buf.extend_from_slice(src);
        Some(len)
    }

    /// Store `payload` in `slot`, truncating it to the slot's payload
    /// capacity. The payload is copied before the length is published.
    pub fn write_slot(&self, slot: Slot, payload: &[u8]) -> IpcResult<SlotWrite> {
        if !self.fits(slot) {
            return Err(IpcError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{slot:?} slot ends past region {} ({} bytes)", self.name, self.size()),
            )));
        }
        let written = payload.len().min(slot.max_payload());
        unsafe {
            std::ptr::copy_nonoverlapping(payload.as_ptr(), self.payload_ptr(slot), written);
        }
        self.length_cell(slot).store(written as i32, Ordering::Release);
        Ok(SlotWrite {
            written,
            truncated: written < payload.len(),
        })
    }

    /// Mark `slot` as holding no message.
    pub fn clear_slot(&self, slot: Slot) {
        if self.fits(slot) {
            self.length_cell(slot).store(0, Ordering::Release);
        }
    }

    /// Remove the backing storage of a region by name.
    pub fn clear_storage(name: &str) {
        PlatformShm::unlink_by_name(name);
    }

    #[cfg(test)]
    fn poke_length(&self, slot: Slot, raw: i32) {
        self.length_cell(slot).store(raw, Ordering::Release);
    }
}
