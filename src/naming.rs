// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Names of the OS-global objects shared between host and client, plus the
// POSIX name mangling applied before they reach shm_open.

/// Default prefix for every host-owned object.
pub const DEFAULT_PREFIX: &str = "PlaybackHost";

/// Default name of the lock the client holds for its lifetime.
pub const DEFAULT_CLIENT_LOCK: &str = "PlaybackHost_ClientAlive";

/// The full set of names a host and its client agree on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceNames {
    pub region: String,
    pub request_ready: String,
    pub response_ready: String,
    pub notification_ready: String,
    pub instance_lock: String,
    pub client_lock: String,
}

impl ResourceNames {
    /// Derive host object names from `prefix`; the client lock keeps its default.
    pub fn from_prefix(prefix: &str) -> Self {
        Self {
            region: format!("{prefix}_SharedMemory"),
            request_ready: format!("{prefix}_RequestReady"),
            response_ready: format!("{prefix}_ResponseReady"),
            notification_ready: format!("{prefix}_NotificationReady"),
            instance_lock: format!("{prefix}_SingleInstanceMutex"),
            client_lock: DEFAULT_CLIENT_LOCK.to_string(),
        }
    }

    /// Replace the client liveness lock name.
    pub fn with_client_lock(mut self, name: impl Into<String>) -> Self {
        self.client_lock = name.into();
        self
    }
}

impl Default for ResourceNames {
    fn default() -> Self {
        Self::from_prefix(DEFAULT_PREFIX)
    }
}

/// FNV-1a 64-bit hash.
pub fn fnv1a_64(data: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for &b in data {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// Maximum length for POSIX shm names, 0 disables shortening.
///
/// On macOS `PSHMNAMLEN` is 31. On Linux the limit is typically 255.
#[cfg(target_os = "macos")]
pub const SHM_NAME_MAX: usize = 31;

#[cfg(not(target_os = "macos"))]
pub const SHM_NAME_MAX: usize = 0;

/// Produce a POSIX shm-safe name (with leading '/').
///
/// Names longer than `SHM_NAME_MAX` become `/<prefix>_<16 hex digits>` where
/// the hash covers the whole original name and the prefix keeps as much of it
/// as fits, so related objects stay recognisable under `/dev/shm`.
pub fn make_shm_name(name: &str) -> String {
    let result = if name.starts_with('/') {
        name.to_string()
    } else {
        format!("/{name}")
    };

    if SHM_NAME_MAX == 0 || result.len() <= SHM_NAME_MAX {
        return result;
    }

    // '/' + '_' + 16 hex digits
    const FIXED_LEN: usize = 1 + 1 + 16;
    let prefix_len = SHM_NAME_MAX.saturating_sub(FIXED_LEN);

    let hash = fnv1a_64(result.as_bytes());
    let body = &result[1..];
    let mut cut = prefix_len.min(body.len());
    while !body.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("/{}_{hash:016x}", &body[..cut])
}
