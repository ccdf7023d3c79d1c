//! Per-room mutual exclusion across processes.
//!
//! Every read-modify-write of a room snapshot runs inside
//! [`LockFacade::with_lock`]. The lease is held under a random token and
//! released only by its holder; an expired lease may be taken over by
//! another caller.

mod memory;
mod redis_lease;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::store::keys;

pub use memory::MemoryLeaseBackend;
pub use redis_lease::RedisLeaseBackend;

/// Storage primitive behind the facade.
#[async_trait]
pub trait LeaseBackend: Send + Sync {
    /// Set `key` to `token` with expiry `lease` only if the key is absent.
    async fn try_acquire(&self, key: &str, token: &str, lease: Duration)
        -> Result<bool, AppError>;

    /// Delete `key` only if it still holds `token`.
    async fn release(&self, key: &str, token: &str) -> Result<bool, AppError>;
}

/// How a critical section ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow<T> {
    Done(T),
    /// A guard inside the section decided there is nothing to do.
    Skip(&'static str),
}

/// Result of [`LockFacade::with_lock`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockOutcome<T> {
    Success(T),
    /// The lease could not be obtained within the wait budget.
    LockFailed,
    Skipped(&'static str),
}

impl<T> LockOutcome<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> LockOutcome<U> {
        match self {
            LockOutcome::Success(value) => LockOutcome::Success(f(value)),
            LockOutcome::LockFailed => LockOutcome::LockFailed,
            LockOutcome::Skipped(reason) => LockOutcome::Skipped(reason),
        }
    }

    /// Collapse for user-initiated actions: contention surfaces as
    /// `TRY_AGAIN`, a skip yields `None`.
    pub fn into_user_result(self) -> Result<Option<T>, AppError> {
        match self {
            LockOutcome::Success(value) => Ok(Some(value)),
            LockOutcome::Skipped(_) => Ok(None),
            LockOutcome::LockFailed => Err(AppError::lock_busy("room lease contended")),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LockSettings {
    pub wait: Duration,
    pub lease: Duration,
    pub poll_interval: Duration,
}

#[derive(Clone)]
pub struct LockFacade {
    backend: Arc<dyn LeaseBackend>,
    settings: LockSettings,
}

impl LockFacade {
    pub fn new(backend: Arc<dyn LeaseBackend>, settings: LockSettings) -> Self {
        Self { backend, settings }
    }

    /// Run `section` while holding the lease on `room_id`.
    ///
    /// Polls until the lease is acquired or `wait` elapses; a backend error
    /// while polling counts as a failed attempt. The lease is released (by
    /// token) whether the section succeeds, skips, fails or panics.
    pub async fn with_lock<T, F, Fut>(
        &self,
        room_id: &str,
        section: F,
    ) -> Result<LockOutcome<T>, AppError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Flow<T>, AppError>>,
    {
        let key = keys::room_lock(room_id);
        let token = Uuid::new_v4().to_string();

        if !self.acquire(&key, &token).await {
            debug!(room_id, "room lease not acquired within wait budget");
            return Ok(LockOutcome::LockFailed);
        }
        let guard = LeaseGuard {
            backend: self.backend.clone(),
            key,
            token,
            armed: true,
        };

        let result = section().await;
        guard.release(room_id).await;

        match result? {
            Flow::Done(value) => Ok(LockOutcome::Success(value)),
            Flow::Skip(reason) => {
                debug!(room_id, reason, "critical section skipped");
                Ok(LockOutcome::Skipped(reason))
            }
        }
    }

    async fn acquire(&self, key: &str, token: &str) -> bool {
        let deadline = Instant::now() + self.settings.wait;
        loop {
            match self
                .backend
                .try_acquire(key, token, self.settings.lease)
                .await
            {
                Ok(true) => return true,
                Ok(false) => {}
                Err(err) => warn!(key, error = %err, "lease backend unavailable"),
            }
            if Instant::now() + self.settings.poll_interval > deadline {
                return false;
            }
            sleep(self.settings.poll_interval).await;
        }
    }
}

/// Held lease. Releases in the background if dropped without an explicit
/// release, so a panicking or cancelled section does not strand the room
/// until the lease expires.
struct LeaseGuard {
    backend: Arc<dyn LeaseBackend>,
    key: String,
    token: String,
    armed: bool,
}

impl LeaseGuard {
    async fn release(mut self, room_id: &str) {
        match self.backend.release(&self.key, &self.token).await {
            Ok(true) => {}
            Ok(false) => warn!(room_id, "room lease expired before release"),
            Err(err) => warn!(room_id, error = %err, "failed to release room lease"),
        }
        self.armed = false;
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let backend = self.backend.clone();
        let key = std::mem::take(&mut self.key);
        let token = std::mem::take(&mut self.token);
        warn!(key = %key, "critical section aborted, releasing room lease");
        handle.spawn(async move {
            if let Err(err) = backend.release(&key, &token).await {
                warn!(key = %key, error = %err, "failed to release abandoned room lease");
            }
        });
    }
}
