//! Session records and the TTL-bound session store.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::clock::{Clock, OsRandom, RandomSource, SystemClock};
use crate::sweep::Sweep;

/// Default session lifetime (30 minutes).
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(30 * 60);

/// Default interval between expiry sweeps (5 minutes).
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Random bytes per session ID (128 bits).
pub const SESSION_ID_BYTES: usize = 16;

/// Errors returned by [`SessionStore`].
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The session is unknown, was deleted, or has expired.
    #[error("session not found")]
    NotFound,

    /// The secure random source failed while generating an ID.
    #[error("failed to generate session ID: {0}")]
    IdGeneration(#[source] rand::Error),

    /// The configured lifetime does not fit on the clock.
    #[error("session lifetime of {0:?} is out of range")]
    TtlOutOfRange(Duration),
}

/// One uploaded document during its analysis window.
///
/// Cloning is cheap and yields another read-only view of the same record.
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

#[derive(Debug)]
struct SessionInner {
    id: String,
    filename: String,
    content: String,
    created_at: Instant,
    expires_at: Instant,
}

impl Session {
    /// Hex session ID; also the bearer capability for this session.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Original upload file name, for display only.
    #[must_use]
    pub fn filename(&self) -> &str {
        &self.inner.filename
    }

    /// Extracted document text.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.inner.content
    }

    #[must_use]
    pub fn created_at(&self) -> Instant {
        self.inner.created_at
    }

    #[must_use]
    pub fn expires_at(&self) -> Instant {
        self.inner.expires_at
    }

    /// Whether the session is expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.inner.expires_at
    }

    /// Time left before expiry, zero once expired.
    #[must_use]
    pub fn remaining_at(&self, now: Instant) -> Duration {
        self.inner.expires_at.saturating_duration_since(now)
    }

    fn same_record(&self, other: &Session) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Thread-safe store for document sessions.
///
/// Expired sessions are never returned: [`SessionStore::get`] evicts them on
/// read, and [`SessionStore::sweep_at`] drops the ones nobody reads again.
#[derive(Debug, Clone)]
pub struct SessionStore {
    inner: Arc<SessionStoreInner>,
}

#[derive(Debug)]
struct SessionStoreInner {
    sessions: RwLock<HashMap<String, Session>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    /// Create a store with the default TTL, system clock, and OS randomness.
    #[must_use]
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_SESSION_TTL)
    }

    #[must_use]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self::with_sources(ttl, Arc::new(SystemClock), Arc::new(OsRandom))
    }

    /// Create a store with explicit time and randomness sources.
    #[must_use]
    pub fn with_sources(
        ttl: Duration,
        clock: Arc<dyn Clock>,
        random: Arc<dyn RandomSource>,
    ) -> Self {
        Self {
            inner: Arc::new(SessionStoreInner {
                sessions: RwLock::new(HashMap::new()),
                ttl,
                clock,
                random,
            }),
        }
    }

    /// Session lifetime.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    /// Current instant on the store's clock.
    #[must_use]
    pub fn now(&self) -> Instant {
        self.inner.clock.now()
    }

    /// Store a new document and return its session.
    ///
    /// IDs are not checked for collisions; 128 random bits make one
    /// negligible.
    pub fn create(
        &self,
        filename: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<Session, SessionError> {
        let now = self.inner.clock.now();
        let expires_at = now
            .checked_add(self.inner.ttl)
            .ok_or(SessionError::TtlOutOfRange(self.inner.ttl))?;
        let id = self.generate_id()?;
        let session = Session {
            inner: Arc::new(SessionInner {
                id: id.clone(),
                filename: filename.into(),
                content: content.into(),
                created_at: now,
                expires_at,
            }),
        };

        self.write().insert(id, session.clone());

        info!(
            name: "session.created",
            filename = %session.filename(),
            content_len = session.content().len(),
            "Session created"
        );
        Ok(session)
    }

    /// Look up a live session.
    ///
    /// An expired entry is removed and reported as [`SessionError::NotFound`].
    pub fn get(&self, id: &str) -> Result<Session, SessionError> {
        let now = self.inner.clock.now();

        let found = self.read().get(id).cloned();
        let session = found.ok_or(SessionError::NotFound)?;
        if !session.is_expired_at(now) {
            return Ok(session);
        }

        // Re-check under the write lock: a sweep, delete, or another reader
        // may have removed the entry since the read lock was released.
        let mut guard = self.write();
        let still_expired = guard
            .get(id)
            .is_some_and(|current| current.same_record(&session) && current.is_expired_at(now));
        if still_expired {
            guard.remove(id);
            debug!(name: "session.evicted", reason = "expired_on_read", "Session evicted");
        }
        Err(SessionError::NotFound)
    }

    /// Remove a session.
    ///
    /// Of several concurrent deletes of one ID exactly one succeeds; the
    /// rest see [`SessionError::NotFound`].
    pub fn delete(&self, id: &str) -> Result<(), SessionError> {
        let removed = self.write().remove(id);
        match removed {
            Some(_) => {
                info!(name: "session.deleted", "Session deleted");
                Ok(())
            }
            None => Err(SessionError::NotFound),
        }
    }

    /// Number of resident entries, possibly including expired ones not yet
    /// swept.
    #[must_use]
    pub fn count(&self) -> usize {
        self.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Remove every entry with `expires_at <= now` and return how many were
    /// removed.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let mut guard = self.write();
        let before = guard.len();
        guard.retain(|_, session| session.expires_at() > now);
        before - guard.len()
    }

    fn generate_id(&self) -> Result<String, SessionError> {
        let mut bytes = [0u8; SESSION_ID_BYTES];
        self.inner
            .random
            .fill(&mut bytes)
            .map_err(SessionError::IdGeneration)?;
        Ok(hex::encode(bytes))
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Session>> {
        self.inner
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Session>> {
        self.inner
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Sweep for SessionStore {
    fn name(&self) -> &'static str {
        "sessions"
    }

    fn sweep(&self) -> usize {
        let removed = self.sweep_at(self.inner.clock.now());
        if removed > 0 {
            info!(name: "session.swept", removed, remaining = self.count(), "Expired sessions swept");
        }
        removed
    }
}
