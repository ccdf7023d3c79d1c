use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use super::LeaseBackend;
use crate::error::AppError;

/// In-process leases with the same take-over-on-expiry rule as Redis.
#[derive(Default)]
pub struct MemoryLeaseBackend {
    leases: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryLeaseBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_held(&self, key: &str) -> bool {
        let now = Instant::now();
        self.leases
            .lock()
            .get(key)
            .is_some_and(|(_, expires_at)| *expires_at > now)
    }
}

#[async_trait]
impl LeaseBackend for MemoryLeaseBackend {
    async fn try_acquire(
        &self,
        key: &str,
        token: &str,
        lease: Duration,
    ) -> Result<bool, AppError> {
        let now = Instant::now();
        let mut leases = self.leases.lock();
        if let Some((_, expires_at)) = leases.get(key) {
            if *expires_at > now {
                return Ok(false);
            }
        }
        leases.insert(key.to_string(), (token.to_string(), now + lease));
        Ok(true)
    }

    async fn release(&self, key: &str, token: &str) -> Result<bool, AppError> {
        let mut leases = self.leases.lock();
        match leases.get(key) {
            Some((holder, _)) if holder == token => {
                leases.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
