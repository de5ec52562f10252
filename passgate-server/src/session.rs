//! Challenge session storage
//!
//! Each browser session is identified by an opaque cookie handle issued by
//! the begin endpoints. A session holds at most one pending ceremony at a
//! time: starting a new ceremony (either kind) overwrites whatever was
//! pending, and the matching complete endpoint takes (removes) the entry
//! before verification, so a challenge can never be answered twice.
//!
//! Entries expire after 5 minutes regardless of the 24 h cookie lifetime;
//! a background task sweeps leftovers that were never completed.

use std::time::{Duration, Instant};

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use dashmap::DashMap;
use uuid::Uuid;
use webauthn_rs::prelude::{PasskeyAuthentication, PasskeyRegistration};

/// Name of the session cookie carrying the opaque handle
pub const SESSION_COOKIE: &str = "passgate_session";

/// Maximum age for pending challenges (5 minutes)
const CHALLENGE_EXPIRY_SECS: u64 = 300;

/// Session cookie lifetime (24 hours)
const SESSION_COOKIE_MAX_AGE_HOURS: i64 = 24;

/// A ceremony awaiting its complete call, bound to the user it was issued for
pub enum PendingCeremony {
    Registration {
        user_id: Uuid,
        state: PasskeyRegistration,
    },
    Authentication {
        user_id: Uuid,
        state: PasskeyAuthentication,
    },
}

struct SessionEntry {
    ceremony: PendingCeremony,
    expires_at: Instant,
}

/// In-memory store of pending ceremonies, keyed by session handle
#[derive(Default)]
pub struct ChallengeSessions {
    entries: DashMap<String, SessionEntry>,
}

impl ChallengeSessions {
    /// Create a new challenge session store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a pending ceremony, replacing any prior entry for this handle
    pub fn store(&self, handle: &str, ceremony: PendingCeremony) {
        self.entries.insert(
            handle.to_string(),
            SessionEntry {
                ceremony,
                expires_at: Instant::now() + Duration::from_secs(CHALLENGE_EXPIRY_SECS),
            },
        );
    }

    /// Retrieve and remove the pending ceremony for this handle
    ///
    /// Returns `None` for unknown handles and for expired entries; either
    /// way the handle holds no pending ceremony afterwards.
    pub fn take(&self, handle: &str) -> Option<PendingCeremony> {
        let (_, entry) = self.entries.remove(handle)?;
        if entry.expires_at > Instant::now() {
            Some(entry.ceremony)
        } else {
            None // Expired
        }
    }

    /// Remove expired entries (called periodically)
    pub fn cleanup_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.expires_at > now);
    }

    /// Number of pending ceremonies
    pub fn pending_count(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    fn store_already_expired(&self, handle: &str, ceremony: PendingCeremony) {
        self.entries.insert(
            handle.to_string(),
            SessionEntry {
                ceremony,
                expires_at: Instant::now(),
            },
        );
    }
}

impl std::fmt::Debug for ChallengeSessions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChallengeSessions")
            .field("pending", &self.entries.len())
            .finish()
    }
}

/// Read the session handle from the request cookies
pub fn session_handle(jar: &CookieJar) -> Option<String> {
    jar.get(SESSION_COOKIE).map(|c| c.value().to_string())
}

/// Return the existing session handle, or issue a fresh cookie carrying one
pub fn ensure_session(jar: CookieJar, secure: bool) -> (CookieJar, String) {
    if let Some(handle) = session_handle(&jar) {
        return (jar, handle);
    }

    let handle = Uuid::new_v4().to_string();
    let cookie = Cookie::build((SESSION_COOKIE, handle.clone()))
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .path("/")
        .max_age(time::Duration::hours(SESSION_COOKIE_MAX_AGE_HOURS))
        .build();

    (jar.add(cookie), handle)
}
