//! Cluster-wide nickname reservation.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use lazy_regex::regex_is_match;
use once_cell::sync::Lazy;
use redis::aio::ConnectionManager;
use redis::Script;
use tokio::time::Instant;
use unicode_normalization::UnicodeNormalization;

use crate::error::AppError;
use crate::errors::ErrorCode;
use crate::store::keys;

/// A validated nickname: what players see, and the key it is reserved under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nickname {
    pub display: String,
    pub key: String,
}

impl Nickname {
    /// Trim, NFC-normalize and validate. Reservation is case-insensitive.
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        let display: String = raw.trim().nfc().collect();
        if !regex_is_match!(r"^[\p{L}\p{N} _\-]{2,12}$", &display) {
            return Err(AppError::invalid(
                ErrorCode::NicknameInvalid,
                "Nickname must be 2-12 letters, digits, spaces, '_' or '-'",
            ));
        }
        let key = display.to_lowercase();
        Ok(Self { display, key })
    }
}

/// Exclusive nickname reservations shared by every process.
///
/// A reservation belongs to one holder (a session id) and lapses after its
/// TTL unless the holder reserves again, so a crashed process cannot pin a
/// nickname forever.
#[async_trait]
pub trait NicknameRegistry: Send + Sync {
    /// Reserve `key` for `holder` for `ttl`; re-reserving by the same holder
    /// refreshes the TTL. False if another holder's reservation is live.
    async fn reserve(&self, key: &str, holder: &str, ttl: Duration) -> Result<bool, AppError>;

    /// Drop the reservation if `holder` still owns it.
    async fn release(&self, key: &str, holder: &str) -> Result<(), AppError>;
}

#[derive(Default)]
pub struct MemoryNicknames {
    taken: DashMap<String, (String, Instant)>,
}

impl MemoryNicknames {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NicknameRegistry for MemoryNicknames {
    async fn reserve(&self, key: &str, holder: &str, ttl: Duration) -> Result<bool, AppError> {
        let now = Instant::now();
        let fresh = (holder.to_string(), now + ttl);
        match self.taken.entry(key.to_string()) {
            Entry::Occupied(mut taken) => {
                let (owner, expires_at) = taken.get();
                if owner != holder && *expires_at > now {
                    return Ok(false);
                }
                taken.insert(fresh);
                Ok(true)
            }
            Entry::Vacant(slot) => {
                slot.insert(fresh);
                Ok(true)
            }
        }
    }

    async fn release(&self, key: &str, holder: &str) -> Result<(), AppError> {
        self.taken.remove_if(key, |_, (owner, _)| owner == holder);
        Ok(())
    }
}

static RESERVE_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r"
        local owner = redis.call('GET', KEYS[1])
        if owner == false or owner == ARGV[1] then
            redis.call('SET', KEYS[1], ARGV[1], 'PX', ARGV[2])
            return 1
        end
        return 0
        ",
    )
});

static RELEASE_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r"
        if redis.call('GET', KEYS[1]) == ARGV[1] then
            return redis.call('DEL', KEYS[1])
        end
        return 0
        ",
    )
});

/// One key per nickname, holding the session id, with a `PX` expiry.
pub struct RedisNicknames {
    conn: ConnectionManager,
}

impl RedisNicknames {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl NicknameRegistry for RedisNicknames {
    async fn reserve(&self, key: &str, holder: &str, ttl: Duration) -> Result<bool, AppError> {
        let mut conn = self.conn.clone();
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        let reserved: i64 = RESERVE_SCRIPT
            .key(keys::nickname(key))
            .arg(holder)
            .arg(ttl_ms)
            .invoke_async(&mut conn)
            .await?;
        Ok(reserved == 1)
    }

    async fn release(&self, key: &str, holder: &str) -> Result<(), AppError> {
        let mut conn = self.conn.clone();
        RELEASE_SCRIPT
            .key(keys::nickname(key))
            .arg(holder)
            .invoke_async::<i64>(&mut conn)
            .await?;
        Ok(())
    }
}
