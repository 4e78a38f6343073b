// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Windows implementation of the platform capabilities: pagefile-backed file
// mappings, named kernel mutexes and named semaphores capped at 1.

use std::io;
use std::ptr;
use std::sync::atomic::{AtomicI32, Ordering};

use windows_sys::Win32::Foundation::{
    CloseHandle, GetLastError, ERROR_TOO_MANY_POSTS, FALSE, HANDLE, INVALID_HANDLE_VALUE,
    WAIT_ABANDONED, WAIT_OBJECT_0, WAIT_TIMEOUT,
};

use super::{LockAttempt, SignalOutcome};

// ---------------------------------------------------------------------------
// Layout helpers: the user region is followed by an i32 reference counter.
// ---------------------------------------------------------------------------

const ALIGN: usize = std::mem::align_of::<AtomicI32>();

fn calc_size(user_size: usize) -> usize {
    let aligned = user_size.div_ceil(ALIGN) * ALIGN;
    aligned + std::mem::size_of::<AtomicI32>()
}

/// # Safety
/// `mem` must point to a live view of at least `total_size` bytes.
unsafe fn ref_counter<'a>(mem: *mut u8, total_size: usize) -> &'a AtomicI32 {
    let offset = total_size - std::mem::size_of::<AtomicI32>();
    &*(mem.add(offset) as *const AtomicI32)
}

/// Encode a name as a null-terminated wide string for Win32 APIs.
fn to_wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

fn wait_millis(timeout_ms: Option<u64>) -> u32 {
    use windows_sys::Win32::System::Threading::INFINITE;
    match timeout_ms {
        None => INFINITE,
        // INFINITE is u32::MAX, stay one below it.
        Some(ms) => ms.min(u64::from(INFINITE - 1)) as u32,
    }
}

// ---------------------------------------------------------------------------
// PlatformShm
// ---------------------------------------------------------------------------

/// How a segment is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShmMode {
    /// Fail if the mapping does not exist. Never creates.
    Open,
    /// Create if missing, attach if present.
    CreateOrOpen,
}

pub struct PlatformShm {
    handle: HANDLE,
    mem: *mut u8,
    size: usize,
    user_size: usize,
    prev_ref: i32,
}

// Safety: the view is process-shared by construction; callers synchronise
// access to its contents.
unsafe impl Send for PlatformShm {}
unsafe impl Sync for PlatformShm {}

impl PlatformShm {
    pub fn acquire(name: &str, user_size: usize, mode: ShmMode) -> io::Result<Self> {
        use windows_sys::Win32::System::Memory::*;

        if name.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "name is empty"));
        }
        if user_size == 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "size is 0"));
        }

        let wide_name = to_wide(name);
        let total_size = calc_size(user_size);

        let handle = match mode {
            ShmMode::Open => unsafe {
                OpenFileMappingW(FILE_MAP_ALL_ACCESS, FALSE, wide_name.as_ptr())
            },
            ShmMode::CreateOrOpen => unsafe {
                CreateFileMappingW(
                    INVALID_HANDLE_VALUE,
                    ptr::null(),
                    PAGE_READWRITE | SEC_COMMIT,
                    0,
                    total_size as u32,
                    wide_name.as_ptr(),
                )
            },
        };
        if handle.is_null() {
            return Err(io::Error::last_os_error());
        }

        let view = unsafe { MapViewOfFile(handle, FILE_MAP_ALL_ACCESS, 0, 0, total_size) };
        if view.Value.is_null() {
            let e = io::Error::last_os_error();
            unsafe { CloseHandle(handle) };
            return Err(e);
        }

        let mem = view.Value as *mut u8;
        let prev = unsafe { ref_counter(mem, total_size).fetch_add(1, Ordering::AcqRel) };

        Ok(Self {
            handle,
            mem,
            size: total_size,
            user_size,
            prev_ref: prev,
        })
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.mem
    }

    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.mem
    }

    pub fn user_size(&self) -> usize {
        self.user_size
    }

    /// 0 when this handle was the first to map the segment.
    pub fn prev_ref_count(&self) -> i32 {
        self.prev_ref
    }

    pub fn unlink(&self) {
        // Pagefile-backed: the mapping disappears with its last handle.
    }

    pub fn unlink_by_name(_name: &str) {}
}

impl Drop for PlatformShm {
    fn drop(&mut self) {
        use windows_sys::Win32::System::Memory::{UnmapViewOfFile, MEMORY_MAPPED_VIEW_ADDRESS};

        if !self.mem.is_null() {
            unsafe {
                ref_counter(self.mem, self.size).fetch_sub(1, Ordering::AcqRel);
                UnmapViewOfFile(MEMORY_MAPPED_VIEW_ADDRESS {
                    Value: self.mem as *mut _,
                });
            }
        }
        if !self.handle.is_null() {
            unsafe { CloseHandle(self.handle) };
        }
    }
}

// ---------------------------------------------------------------------------
// PlatformLock: named kernel mutex
// ---------------------------------------------------------------------------

pub struct PlatformLock {
    handle: HANDLE,
}

unsafe impl Send for PlatformLock {}
unsafe impl Sync for PlatformLock {}

impl PlatformLock {
    /// Open the lock, creating it unowned if it does not exist.
    pub fn open(name: &str) -> io::Result<Self> {
        use windows_sys::Win32::System::Threading::CreateMutexW;

        let wide_name = to_wide(name);
        let h = unsafe { CreateMutexW(ptr::null(), FALSE, wide_name.as_ptr()) };
        if h.is_null() {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { handle: h })
    }

    /// Open a mutex some other process created; fails with `NotFound` otherwise.
    pub fn open_existing(name: &str) -> io::Result<Self> {
        use windows_sys::Win32::System::Threading::{OpenMutexW, MUTEX_ALL_ACCESS};

        let wide_name = to_wide(name);
        let h = unsafe { OpenMutexW(MUTEX_ALL_ACCESS, FALSE, wide_name.as_ptr()) };
        if h.is_null() {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { handle: h })
    }

    fn wait(&self, millis: u32) -> io::Result<LockAttempt> {
        use windows_sys::Win32::System::Threading::WaitForSingleObject;

        match unsafe { WaitForSingleObject(self.handle, millis) } {
            WAIT_OBJECT_0 => Ok(LockAttempt::Acquired),
            WAIT_ABANDONED => Ok(LockAttempt::Abandoned),
            WAIT_TIMEOUT => Ok(LockAttempt::Busy),
            _ => Err(io::Error::last_os_error()),
        }
    }

    /// Block until the mutex is held.
    pub fn lock(&self) -> io::Result<LockAttempt> {
        self.wait(wait_millis(None))
    }

    pub fn try_lock(&self) -> io::Result<LockAttempt> {
        self.wait(0)
    }

    pub fn unlock(&self) -> io::Result<()> {
        use windows_sys::Win32::System::Threading::ReleaseMutex;

        if unsafe { ReleaseMutex(self.handle) } == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    pub fn clear_storage(_name: &str) {}
}

impl Drop for PlatformLock {
    fn drop(&mut self) {
        if !self.handle.is_null() {
            unsafe { CloseHandle(self.handle) };
        }
    }
}

// ---------------------------------------------------------------------------
// PlatformSignal: named semaphore with a maximum count of 1
// ---------------------------------------------------------------------------

pub struct PlatformSignal {
    handle: HANDLE,
}

unsafe impl Send for PlatformSignal {}
unsafe impl Sync for PlatformSignal {}

impl PlatformSignal {
    /// Open the signal, creating it lowered if it does not exist.
    pub fn open(name: &str) -> io::Result<Self> {
        use windows_sys::Win32::System::Threading::CreateSemaphoreW;

        let wide_name = to_wide(name);
        let h = unsafe { CreateSemaphoreW(ptr::null(), 0, 1, wide_name.as_ptr()) };
        if h.is_null() {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { handle: h })
    }

    /// Wait until the signal is raised, then lower it.
    /// Returns `Ok(false)` if `timeout_ms` elapsed first.
    pub fn wait(&self, timeout_ms: Option<u64>) -> io::Result<bool> {
        use windows_sys::Win32::System::Threading::WaitForSingleObject;

        match unsafe { WaitForSingleObject(self.handle, wait_millis(timeout_ms)) } {
            WAIT_OBJECT_0 => Ok(true),
            WAIT_TIMEOUT => Ok(false),
            _ => Err(io::Error::last_os_error()),
        }
    }

    pub fn try_wait(&self) -> io::Result<bool> {
        self.wait(Some(0))
    }

    /// Raise the signal. A second raise before a wait is a no-op.
    pub fn signal(&self) -> io::Result<SignalOutcome> {
        use windows_sys::Win32::System::Threading::ReleaseSemaphore;

        if unsafe { ReleaseSemaphore(self.handle, 1, ptr::null_mut()) } != 0 {
            return Ok(SignalOutcome::Raised);
        }
        if unsafe { GetLastError() } == ERROR_TOO_MANY_POSTS {
            return Ok(SignalOutcome::AlreadyPending);
        }
        Err(io::Error::last_os_error())
    }

    pub fn clear_storage(_name: &str) {}
}

impl Drop for PlatformSignal {
    fn drop(&mut self) {
        if !self.handle.is_null() {
            unsafe { CloseHandle(self.handle) };
        }
    }
}
