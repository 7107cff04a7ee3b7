//! Upload Coordinator Service
//!
//! Runners upload a cache archive as byte ranges over independent PATCH
//! requests, and those requests can arrive in any order. Multipart part numbers
//! must follow byte order, so each session hands out one "turn" at a time: the
//! submitter whose range starts at `next_offset` claims the next part number,
//! uploads without holding the lock, and on success advances `next_offset` and
//! wakes everyone else waiting on the session.
//!
//! Lifecycle: `reserve` → any number of `submit_part` → `complete`. The session
//! is removed from the table when `complete` starts, whatever its outcome.
//!
//! A session belongs to the `(audience, scope)` that reserved it. Callers from
//! any other partition are told the session does not exist.

use bytes::Bytes;
use cachegate_core::{CacheId, CompletedPart, ObjectKey, UploadError};
use cachegate_storage::{ObjectStore, StateStore};
use rand::Rng;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::Notify;

use crate::auth::AuthContext;
use crate::constants::MAX_SESSION_ID_ATTEMPTS;
use crate::telemetry::METRICS;

type UploadResult<T> = Result<T, UploadError>;

/// Source of candidate session ids.
pub type SessionIdSource = Arc<dyn Fn() -> i32 + Send + Sync>;

// ============================================================================
// SESSION
// ============================================================================

#[derive(Debug, Default)]
struct SessionState {
    /// First byte of the next range allowed to upload.
    next_offset: u64,
    /// ETags in part-number order; part `n` is `etags[n - 1]`.
    etags: Vec<String>,
    /// A submitter holds the turn and is uploading.
    in_flight: bool,
    /// `complete` has taken the session.
    closed: bool,
}

/// One in-progress multipart upload.
#[derive(Debug)]
pub struct UploadSession {
    cache_id: CacheId,
    object_key: ObjectKey,
    path: String,
    upload_id: String,
    state: Mutex<SessionState>,
    turn: Notify,
}

impl PartialEq for UploadSession {
    fn eq(&self, other: &Self) -> bool {
        self.cache_id == other.cache_id && self.upload_id == other.upload_id
    }
}

impl UploadSession {
    fn new(cache_id: CacheId, object_key: ObjectKey, upload_id: String) -> Self {
        Self {
            cache_id,
            path: object_key.storage_path(),
            object_key,
            upload_id,
            state: Mutex::new(SessionState::default()),
            turn: Notify::new(),
        }
    }

    fn belongs_to(&self, caller: &AuthContext) -> bool {
        self.object_key.audience == caller.audience && self.object_key.scope == caller.scope
    }

    fn lock(&self) -> UploadResult<MutexGuard<'_, SessionState>> {
        self.state.lock().map_err(|_| UploadError::LockPoisoned)
    }

    /// Wait until `offset` is next and nobody else holds the turn, then take it.
    async fn acquire_turn(self: &Arc<Self>, offset: u64) -> UploadResult<PartTicket> {
        loop {
            // Register for wakeups before inspecting state so a release between
            // the check and the await is not lost.
            let notified = self.turn.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock()?;
                if state.closed {
                    return Err(UploadError::SessionNotFound {
                        cache_id: self.cache_id.as_i64(),
                    });
                }
                if offset < state.next_offset {
                    return Err(UploadError::StaleRange {
                        cache_id: self.cache_id.as_i64(),
                        start: offset,
                        next_offset: state.next_offset,
                    });
                }
                if offset == state.next_offset && !state.in_flight {
                    state.in_flight = true;
                    let part_number = i32::try_from(state.etags.len() + 1)
                        .map_err(|_| UploadError::InvalidRange {
                            start: offset,
                            end: offset,
                        })?;
                    return Ok(PartTicket {
                        session: Arc::clone(self),
                        part_number,
                        held: true,
                    });
                }
            }

            notified.await;
        }
    }

    fn progress(&self) -> UploadResult<SessionProgress> {
        let state = self.lock()?;
        Ok(SessionProgress {
            next_offset: state.next_offset,
            parts: state.etags.len(),
            in_flight: state.in_flight,
        })
    }
}

/// Snapshot of a session's upload position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionProgress {
    pub next_offset: u64,
    pub parts: usize,
    pub in_flight: bool,
}

// ============================================================================
// TURN TICKET
// ============================================================================

/// Exclusive right to upload the next part of a session.
///
/// Dropping an unfinished ticket (failed upload, cancelled request) gives the
/// turn back without moving `next_offset`.
struct PartTicket {
    session: Arc<UploadSession>,
    part_number: i32,
    held: bool,
}

impl PartTicket {
    fn commit(mut self, etag: String, next_offset: u64) -> UploadResult<()> {
        let closed = {
            let mut state = self.session.lock()?;
            state.in_flight = false;
            if !state.closed {
                state.etags.push(etag);
                state.next_offset = next_offset;
            }
            state.closed
        };
        self.held = false;
        self.session.turn.notify_waiters();

        if closed {
            // `complete` already sent the part list without this part.
            return Err(UploadError::SessionNotFound {
                cache_id: self.session.cache_id.as_i64(),
            });
        }
        Ok(())
    }
}

impl Drop for PartTicket {
    fn drop(&mut self) {
        if self.held {
            self.session
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .in_flight = false;
            self.session.turn.notify_waiters();
        }
    }
}

// ============================================================================
// COORDINATOR
// ============================================================================

/// Owns the upload session table.
#[derive(Clone)]
pub struct UploadCoordinator {
    store: Arc<dyn ObjectStore>,
    sessions: Arc<dyn StateStore<CacheId, Arc<UploadSession>>>,
    wait_timeout: Option<Duration>,
    next_id: SessionIdSource,
}

fn random_session_id() -> i32 {
    rand::rng().random_range(1..=i32::MAX)
}

impl UploadCoordinator {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        sessions: Arc<dyn StateStore<CacheId, Arc<UploadSession>>>,
        wait_timeout: Option<Duration>,
    ) -> Self {
        Self {
            store,
            sessions,
            wait_timeout,
            next_id: Arc::new(random_session_id),
        }
    }

    /// Replace the random session id source.
    pub fn with_id_source(mut self, next_id: SessionIdSource) -> Self {
        self.next_id = next_id;
        self
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn progress(&self, cache_id: CacheId) -> UploadResult<SessionProgress> {
        self.session(cache_id)?.progress()
    }

    fn session(&self, cache_id: CacheId) -> UploadResult<Arc<UploadSession>> {
        self.sessions
            .get(&cache_id)
            .ok_or(UploadError::SessionNotFound {
                cache_id: cache_id.as_i64(),
            })
    }

    /// Session `cache_id`, if it was reserved from the caller's partition.
    fn owned_session(
        &self,
        cache_id: CacheId,
        caller: &AuthContext,
    ) -> UploadResult<Arc<UploadSession>> {
        let session = self.session(cache_id)?;
        if !session.belongs_to(caller) {
            tracing::warn!(
                cache_id = %cache_id,
                audience = %caller.audience,
                "Session requested from another partition"
            );
            return Err(UploadError::SessionNotFound {
                cache_id: cache_id.as_i64(),
            });
        }
        Ok(session)
    }

    /// Open a multipart upload for `object_key` and register a session for it.
    pub async fn reserve(&self, object_key: ObjectKey) -> UploadResult<CacheId> {
        let path = object_key.storage_path();
        let upload_id = self.store.create_multipart(&path).await.map_err(|err| {
            tracing::error!(path = %path, error = %err, "Failed to start multipart upload");
            err
        })?;

        for _ in 0..MAX_SESSION_ID_ATTEMPTS {
            let cache_id = CacheId(i64::from((self.next_id)()));
            let session = Arc::new(UploadSession::new(
                cache_id,
                object_key.clone(),
                upload_id.clone(),
            ));

            if self.sessions.insert_if_absent(cache_id, session) {
                tracing::info!(cache_id = %cache_id, path = %path, "Reserved upload session");
                return Ok(cache_id);
            }
            tracing::debug!(cache_id = %cache_id, "Session id collision, retrying");
        }

        tracing::error!(
            path = %path,
            upload_id = %upload_id,
            "No free session id; multipart upload left open"
        );
        Err(UploadError::IdSpaceExhausted {
            attempts: MAX_SESSION_ID_ATTEMPTS,
        })
    }

    /// Upload the inclusive byte range `[range_start, range_end]` as the next part.
    ///
    /// Suspends until every lower range has been uploaded. Unknown sessions
    /// fail immediately.
    pub async fn submit_part(
        &self,
        cache_id: CacheId,
        caller: &AuthContext,
        range_start: u64,
        range_end: u64,
        body: Bytes,
    ) -> UploadResult<()> {
        if range_end < range_start {
            return Err(UploadError::InvalidRange {
                start: range_start,
                end: range_end,
            });
        }

        let session = self.owned_session(cache_id, caller)?;

        let started = Instant::now();
        let ticket = match self.wait_timeout {
            Some(limit) => tokio::time::timeout(limit, session.acquire_turn(range_start))
                .await
                .map_err(|_| UploadError::TurnTimeout {
                    cache_id: cache_id.as_i64(),
                    offset: range_start,
                    waited_secs: started.elapsed().as_secs(),
                })??,
            None => session.acquire_turn(range_start).await?,
        };

        tracing::debug!(
            cache_id = %cache_id,
            part_number = ticket.part_number,
            range_start,
            range_end,
            bytes = body.len(),
            "Uploading part"
        );

        let uploaded = self
            .store
            .upload_part(&session.path, &session.upload_id, ticket.part_number, body)
            .await;

        let result = match uploaded {
            Ok(etag) => ticket.commit(etag, range_end.saturating_add(1)),
            Err(err) => {
                tracing::error!(
                    cache_id = %cache_id,
                    part_number = ticket.part_number,
                    error = %err,
                    "Part upload failed"
                );
                drop(ticket);
                Err(err.into())
            }
        };

        if let Ok(metrics) = METRICS.as_ref() {
            metrics.record_upload_part(result.is_ok());
        }
        result
    }

    /// Finish the upload with every part received so far, in part order.
    ///
    /// The session is gone once this returns, successful or not.
    pub async fn complete(&self, cache_id: CacheId, caller: &AuthContext) -> UploadResult<()> {
        let session = self.owned_session(cache_id, caller)?;
        if !self.sessions.compare_and_swap(&cache_id, Some(&session), None) {
            // A concurrent `complete` took it first.
            return Err(UploadError::SessionNotFound {
                cache_id: cache_id.as_i64(),
            });
        }

        let parts = {
            let mut state = session
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            state.closed = true;
            state
                .etags
                .iter()
                .enumerate()
                .map(|(index, etag)| CompletedPart {
                    part_number: index as i32 + 1,
                    etag: etag.clone(),
                })
                .collect::<Vec<_>>()
        };
        session.turn.notify_waiters();

        let part_count = parts.len();
        self.store
            .complete_multipart(&session.path, &session.upload_id, parts)
            .await
            .map_err(|err| {
                tracing::error!(cache_id = %cache_id, error = %err, "Failed to complete multipart upload");
                UploadError::from(err)
            })?;

        tracing::info!(cache_id = %cache_id, parts = part_count, path = %session.path, "Upload committed");
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
