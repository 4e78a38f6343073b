// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// POSIX implementation of the platform capabilities: shm_open/mmap segments,
// robust process-shared pthread mutexes, and a binary signal built from a
// robust mutex, a process-shared condition variable and a pending flag that
// all live in one named segment.

use std::collections::HashMap;
use std::ffi::CString;
use std::io;
use std::ptr;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::{LockAttempt, SignalOutcome};
use crate::naming;

// ---------------------------------------------------------------------------
// Process-local segment cache.
// Every thread of a process that opens the same named lock or signal must use
// the same mapping: macOS pthread objects record the virtual address they were
// initialised at, so a second mmap of the same page yields EINVAL.
// ---------------------------------------------------------------------------

pub(crate) struct CachedShm {
    pub(crate) shm: PlatformShm,
    local_ref: AtomicUsize,
}

pub(crate) struct ShmCache {
    map: HashMap<String, Arc<CachedShm>>,
}

fn lock_cache() -> &'static Mutex<ShmCache> {
    static CACHE: OnceLock<Mutex<ShmCache>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(ShmCache { map: HashMap::new() }))
}

fn signal_cache() -> &'static Mutex<ShmCache> {
    static CACHE: OnceLock<Mutex<ShmCache>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(ShmCache { map: HashMap::new() }))
}

/// Acquire or reuse a cached segment.
///
/// `init_fn` runs only for the process that created the segment, and runs
/// while the cache lock is held so no other local thread sees it half-built.
fn cached_shm_acquire<F>(
    cache: &Mutex<ShmCache>,
    name: &str,
    size: usize,
    mode: ShmMode,
    init_fn: F,
) -> io::Result<Arc<CachedShm>>
where
    F: FnOnce(*mut u8) -> io::Result<()>,
{
    let mut c = cache.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(entry) = c.map.get(name) {
        entry.local_ref.fetch_add(1, Ordering::Relaxed);
        return Ok(Arc::clone(entry));
    }
    let shm = PlatformShm::acquire(name, size, mode)?;
    if shm.prev_ref_count() == 0 && mode != ShmMode::Open {
        init_fn(shm.as_mut_ptr())?;
    }
    let entry = Arc::new(CachedShm {
        shm,
        local_ref: AtomicUsize::new(1),
    });
    c.map.insert(name.to_string(), Arc::clone(&entry));
    Ok(entry)
}

fn cached_shm_release(cache: &Mutex<ShmCache>, name: &str) {
    let mut c = cache.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(entry) = c.map.get(name) {
        if entry.local_ref.fetch_sub(1, Ordering::AcqRel) <= 1 {
            c.map.remove(name);
        }
    }
}

fn cached_shm_purge(cache: &Mutex<ShmCache>, name: &str) {
    let mut c = cache.lock().unwrap_or_else(PoisonError::into_inner);
    c.map.remove(name);
}

// ---------------------------------------------------------------------------
// Robust mutex symbols, not exposed by `libc` on every target.
// macOS has no robust mutexes: a holder that dies leaves the lock held.
// ---------------------------------------------------------------------------

#[cfg(not(target_os = "macos"))]
const EOWNERDEAD: i32 = libc::EOWNERDEAD;

#[cfg(not(target_os = "macos"))]
extern "C" {
    fn pthread_mutexattr_setrobust(
        attr: *mut libc::pthread_mutexattr_t,
        robustness: libc::c_int,
    ) -> libc::c_int;
    fn pthread_mutex_consistent(mutex: *mut libc::pthread_mutex_t) -> libc::c_int;
}

#[cfg(not(target_os = "macos"))]
const PTHREAD_MUTEX_ROBUST: libc::c_int = 1;

fn os_err(eno: libc::c_int) -> io::Error {
    io::Error::from_raw_os_error(eno)
}

/// Initialise a zeroed, process-shared (and where supported, robust) mutex.
///
/// # Safety
/// `mtx` must point to writable memory large enough for a `pthread_mutex_t`.
unsafe fn init_shared_mutex(mtx: *mut libc::pthread_mutex_t) -> io::Result<()> {
    ptr::write_bytes(mtx, 0, 1);

    let mut attr: libc::pthread_mutexattr_t = std::mem::zeroed();
    let eno = libc::pthread_mutexattr_init(&mut attr);
    if eno != 0 {
        return Err(os_err(eno));
    }

    let mut eno = libc::pthread_mutexattr_setpshared(&mut attr, libc::PTHREAD_PROCESS_SHARED);
    #[cfg(not(target_os = "macos"))]
    if eno == 0 {
        eno = pthread_mutexattr_setrobust(&mut attr, PTHREAD_MUTEX_ROBUST);
    }
    if eno == 0 {
        eno = libc::pthread_mutex_init(mtx, &attr);
    }
    libc::pthread_mutexattr_destroy(&mut attr);
    if eno != 0 {
        return Err(os_err(eno));
    }
    Ok(())
}

/// Translate a pthread lock return code. An `EOWNERDEAD` result is repaired
/// with `pthread_mutex_consistent` and reported as `Abandoned`.
///
/// # Safety
/// `mtx` must point to an initialised mutex.
#[cfg_attr(target_os = "macos", allow(unused_variables))]
unsafe fn lock_outcome(mtx: *mut libc::pthread_mutex_t, eno: libc::c_int) -> io::Result<LockAttempt> {
    match eno {
        0 => Ok(LockAttempt::Acquired),
        libc::EBUSY => Ok(LockAttempt::Busy),
        #[cfg(not(target_os = "macos"))]
        EOWNERDEAD => {
            let eno2 = pthread_mutex_consistent(mtx);
            if eno2 != 0 {
                return Err(os_err(eno2));
            }
            Ok(LockAttempt::Abandoned)
        }
        _ => Err(os_err(eno)),
    }
}

// ---------------------------------------------------------------------------
// Layout helpers: the user region is followed by an i32 reference counter
// shared by every process mapping the segment.
// ---------------------------------------------------------------------------

const ALIGN: usize = std::mem::align_of::<AtomicI32>();

fn calc_size(user_size: usize) -> usize {
    let aligned = user_size.div_ceil(ALIGN) * ALIGN;
    aligned + std::mem::size_of::<AtomicI32>()
}

/// # Safety
/// `mem` must point to a live mapping of at least `total_size` bytes.
unsafe fn ref_counter<'a>(mem: *mut u8, total_size: usize) -> &'a AtomicI32 {
    let offset = total_size - std::mem::size_of::<AtomicI32>();
    &*(mem.add(offset) as *const AtomicI32)
}

// ---------------------------------------------------------------------------
// PlatformShm
// ---------------------------------------------------------------------------

/// How a segment is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShmMode {
    /// Fail if the segment does not exist. Never creates.
    Open,
    /// Create if missing, attach if present.
    CreateOrOpen,
}

pub struct PlatformShm {
    mem: *mut u8,
    size: usize,      // mapped size, ref counter included
    user_size: usize, // usable size
    name: String,     // POSIX name with leading '/'
    prev_ref: i32,    // ref count before our own increment
}

// Safety: the mapping is process-shared by construction; callers synchronise
// access to its contents.
unsafe impl Send for PlatformShm {}
unsafe impl Sync for PlatformShm {}

impl PlatformShm {
    pub fn acquire(name: &str, user_size: usize, mode: ShmMode) -> io::Result<Self> {
        if name.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "name is empty"));
        }
        if user_size == 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "size is 0"));
        }

        let posix_name = naming::make_shm_name(name);
        let c_name = CString::new(posix_name.as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let total_size = calc_size(user_size);

        let (fd, created) = Self::open_fd(&c_name, mode)?;

        // Only the creator sizes the object: ftruncate on an existing,
        // already-sized object can wipe it on macOS.
        if created && unsafe { libc::ftruncate(fd, total_size as libc::off_t) } != 0 {
            let err = io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(err);
        }

        let mem = unsafe {
            libc::mmap(
                ptr::null_mut(),
                total_size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        unsafe { libc::close(fd) };
        if mem == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        let mem = mem as *mut u8;
        let prev = unsafe { ref_counter(mem, total_size).fetch_add(1, Ordering::AcqRel) };

        Ok(Self {
            mem,
            size: total_size,
            user_size,
            name: posix_name,
            prev_ref: prev,
        })
    }

    /// Returns the descriptor and whether this call created the object.
    fn open_fd(c_name: &CString, mode: ShmMode) -> io::Result<(libc::c_int, bool)> {
        let perms: libc::mode_t = 0o666;
        if mode == ShmMode::CreateOrOpen {
            let fd = unsafe {
                libc::shm_open(
                    c_name.as_ptr(),
                    libc::O_RDWR | libc::O_CREAT | libc::O_EXCL,
                    perms as libc::c_uint,
                )
            };
            if fd != -1 {
                unsafe { libc::fchmod(fd, perms) };
                return Ok((fd, true));
            }
            let e = io::Error::last_os_error();
            if e.raw_os_error() != Some(libc::EEXIST) {
                return Err(e);
            }
        }
        let fd = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDWR, perms as libc::c_uint) };
        if fd == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok((fd, false))
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
        if let Ok(c_name) = CString::new(self.name.as_bytes()) {
            unsafe { libc::shm_unlink(c_name.as_ptr()) };
        }
    }

    pub fn unlink_by_name(name: &str) {
        let posix_name = naming::make_shm_name(name);
        if let Ok(c_name) = CString::new(posix_name.as_bytes()) {
            unsafe { libc::shm_unlink(c_name.as_ptr()) };
        }
    }
}

impl Drop for PlatformShm {
    fn drop(&mut self) {
        if self.mem.is_null() {
            return;
        }
        let prev = unsafe { ref_counter(self.mem, self.size).fetch_sub(1, Ordering::AcqRel) };
        unsafe { libc::munmap(self.mem as *mut libc::c_void, self.size) };
        if prev <= 1 {
            self.unlink();
        }
    }
}

// ---------------------------------------------------------------------------
// PlatformLock: a pthread_mutex_t alone in its own segment.
// ---------------------------------------------------------------------------

pub struct PlatformLock {
    cached: Arc<CachedShm>,
    name: String,
}

impl PlatformLock {
    /// Open the lock, creating and initialising it if it does not exist.
    pub fn open(name: &str) -> io::Result<Self> {
        Self::attach(name, ShmMode::CreateOrOpen)
    }

    /// Open a lock some other process created; fails with `NotFound` otherwise.
    pub fn open_existing(name: &str) -> io::Result<Self> {
        Self::attach(name, ShmMode::Open)
    }

    fn attach(name: &str, mode: ShmMode) -> io::Result<Self> {
        let size = std::mem::size_of::<libc::pthread_mutex_t>();
        let cached = cached_shm_acquire(lock_cache(), name, size, mode, |base| unsafe {
            init_shared_mutex(base as *mut libc::pthread_mutex_t)
        })?;
        Ok(Self {
            cached,
            name: name.to_string(),
        })
    }

    fn raw(&self) -> *mut libc::pthread_mutex_t {
        self.cached.shm.as_mut_ptr() as *mut libc::pthread_mutex_t
    }

    /// Block until the lock is held.
    pub fn lock(&self) -> io::Result<LockAttempt> {
        loop {
            let eno = unsafe { libc::pthread_mutex_lock(self.raw()) };
            if eno == libc::EINTR {
                continue;
            }
            return unsafe { lock_outcome(self.raw(), eno) };
        }
    }

    pub fn try_lock(&self) -> io::Result<LockAttempt> {
        let eno = unsafe { libc::pthread_mutex_trylock(self.raw()) };
        unsafe { lock_outcome(self.raw(), eno) }
    }

    pub fn unlock(&self) -> io::Result<()> {
        let eno = unsafe { libc::pthread_mutex_unlock(self.raw()) };
        if eno != 0 {
            return Err(os_err(eno));
        }
        Ok(())
    }

    pub fn clear_storage(name: &str) {
        cached_shm_purge(lock_cache(), name);
        PlatformShm::unlink_by_name(name);
    }
}

impl Drop for PlatformLock {
    fn drop(&mut self) {
        // No pthread_mutex_destroy: the address may already be reused by
        // another mapping on macOS. Unmapping the segment is enough.
        cached_shm_release(lock_cache(), &self.name);
    }
}

// ---------------------------------------------------------------------------
// PlatformSignal: binary semaphore over mutex + condvar + pending flag.
// ---------------------------------------------------------------------------

#[repr(C)]
struct SignalCell {
    mutex: libc::pthread_mutex_t,
    cond: libc::pthread_cond_t,
    pending: u32,
}

/// # Safety
/// `cell` must point to writable memory large enough for a `SignalCell`.
unsafe fn init_signal_cell(cell: *mut SignalCell) -> io::Result<()> {
    init_shared_mutex(ptr::addr_of_mut!((*cell).mutex))?;

    let cond = ptr::addr_of_mut!((*cell).cond);
    ptr::write_bytes(cond, 0, 1);
    let mut attr: libc::pthread_condattr_t = std::mem::zeroed();
    let mut eno = libc::pthread_condattr_init(&mut attr);
    if eno != 0 {
        return Err(os_err(eno));
    }
    eno = libc::pthread_condattr_setpshared(&mut attr, libc::PTHREAD_PROCESS_SHARED);
    if eno == 0 {
        eno = libc::pthread_cond_init(cond, &attr);
    }
    libc::pthread_condattr_destroy(&mut attr);
    if eno != 0 {
        return Err(os_err(eno));
    }

    ptr::addr_of_mut!((*cell).pending).write(0);
    Ok(())
}

fn deadline_after(timeout_ms: u64) -> libc::timespec {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let at = now + Duration::from_millis(timeout_ms);
    libc::timespec {
        tv_sec: at.as_secs() as libc::time_t,
        tv_nsec: at.subsec_nanos() as libc::c_long,
    }
}

pub struct PlatformSignal {
    cached: Arc<CachedShm>,
    name: String,
}

impl PlatformSignal {
    /// Open the signal, creating it in the lowered state if it does not exist.
    pub fn open(name: &str) -> io::Result<Self> {
        let size = std::mem::size_of::<SignalCell>();
        let cached = cached_shm_acquire(signal_cache(), name, size, ShmMode::CreateOrOpen, |base| unsafe {
            init_signal_cell(base as *mut SignalCell)
        })?;
        Ok(Self {
            cached,
            name: name.to_string(),
        })
    }

    fn cell(&self) -> *mut SignalCell {
        self.cached.shm.as_mut_ptr() as *mut SignalCell
    }

    fn mutex(&self) -> *mut libc::pthread_mutex_t {
        unsafe { ptr::addr_of_mut!((*self.cell()).mutex) }
    }

    fn cond(&self) -> *mut libc::pthread_cond_t {
        unsafe { ptr::addr_of_mut!((*self.cell()).cond) }
    }

    fn pending(&self) -> *mut u32 {
        unsafe { ptr::addr_of_mut!((*self.cell()).pending) }
    }

    fn enter(&self) -> io::Result<()> {
        loop {
            let eno = unsafe { libc::pthread_mutex_lock(self.mutex()) };
            if eno == libc::EINTR {
                continue;
            }
            // A peer that died inside the critical section leaves `pending`
            // as either 0 or 1, both of which are valid states.
            unsafe { lock_outcome(self.mutex(), eno) }?;
            return Ok(());
        }
    }

    fn leave(&self) {
        unsafe { libc::pthread_mutex_unlock(self.mutex()) };
    }

    /// Consume the pending flag. Must be called with the mutex held.
    fn take_pending(&self) -> bool {
        unsafe {
            if self.pending().read_volatile() != 0 {
                self.pending().write_volatile(0);
                true
            } else {
                false
            }
        }
    }

    /// Wait until the signal is raised, then lower it.
    /// Returns `Ok(false)` if `timeout_ms` elapsed first.
    pub fn wait(&self, timeout_ms: Option<u64>) -> io::Result<bool> {
        let deadline = timeout_ms.map(deadline_after);
        self.enter()?;
        let result = loop {
            if self.take_pending() {
                break Ok(true);
            }
            let eno = unsafe {
                match &deadline {
                    None => libc::pthread_cond_wait(self.cond(), self.mutex()),
                    Some(ts) => libc::pthread_cond_timedwait(self.cond(), self.mutex(), ts),
                }
            };
            match eno {
                0 | libc::EINTR => {}
                libc::ETIMEDOUT => break Ok(self.take_pending()),
                #[cfg(not(target_os = "macos"))]
                EOWNERDEAD => {
                    if let Err(e) = unsafe { lock_outcome(self.mutex(), eno) } {
                        break Err(e);
                    }
                }
                _ => break Err(os_err(eno)),
            }
        };
        self.leave();
        result
    }

    /// Lower the signal if it is raised, without blocking.
    pub fn try_wait(&self) -> io::Result<bool> {
        self.enter()?;
        let taken = self.take_pending();
        self.leave();
        Ok(taken)
    }

    /// Raise the signal. A second raise before a wait is a no-op.
    pub fn signal(&self) -> io::Result<SignalOutcome> {
        self.enter()?;
        let outcome = unsafe {
            if self.pending().read_volatile() != 0 {
                SignalOutcome::AlreadyPending
            } else {
                self.pending().write_volatile(1);
                libc::pthread_cond_signal(self.cond());
                SignalOutcome::Raised
            }
        };
        self.leave();
        Ok(outcome)
    }

    pub fn clear_storage(name: &str) {
        cached_shm_purge(signal_cache(), name);
        PlatformShm::unlink_by_name(name);
    }
}

impl Drop for PlatformSignal {
    fn drop(&mut self) {
        cached_shm_release(signal_cache(), &self.name);
    }
}
