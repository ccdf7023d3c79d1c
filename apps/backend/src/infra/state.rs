use std::sync::Arc;

use redis::aio::ConnectionManager;
use tracing::info;
use uuid::Uuid;

use crate::config::GameConfig;
use crate::domain::GameRng;
use crate::error::AppError;
use crate::infra::redis_conn::connect_redis;
use crate::lock::{
    LeaseBackend, LockFacade, LockSettings, MemoryLeaseBackend, RedisLeaseBackend,
};
use crate::services::audit::{AuditSink, RedisAuditLog, TracingAuditLog};
use crate::services::game_flow::GameFlowService;
use crate::services::judge::{HttpJudge, JudgeClient, NeutralJudge};
use crate::services::judgment::JudgmentCoordinator;
use crate::services::nicknames::{MemoryNicknames, NicknameRegistry, RedisNicknames};
use crate::services::room_txn::RoomTxn;
use crate::services::scheduler::{FlowDispatcher, FlowScheduler, RetryPolicy};
use crate::state::app_state::AppState;
use crate::store::{MemoryRoomStore, RedisRoomStore, RoomStore};
use crate::ws::broker::{ClusterBus, InProcessBus, RedisClusterBus};
use crate::ws::hub::SessionRegistry;
use crate::ws::messenger::Messenger;
use crate::ws::router::ActionRouter;

/// Builder for creating AppState instances (used in both tests and main).
///
/// With a Redis URL every shared concern (rooms, leases, nicknames, bus,
/// audit) goes to Redis; without one they default to in-process backends.
/// Individual backends can be overridden, which is how tests run several
/// nodes against one shared store.
pub struct StateBuilder {
    config: GameConfig,
    instance_id: Option<String>,
    redis_url: Option<String>,
    judge_url: Option<String>,
    rng_seed: Option<u64>,
    store: Option<Arc<dyn RoomStore>>,
    leases: Option<Arc<dyn LeaseBackend>>,
    nicknames: Option<Arc<dyn NicknameRegistry>>,
    judge: Option<Arc<dyn JudgeClient>>,
    audit: Option<Arc<dyn AuditSink>>,
    bus: Option<Arc<InProcessBus>>,
}

impl StateBuilder {
    pub fn new() -> Self {
        Self {
            config: GameConfig::default(),
            instance_id: None,
            redis_url: None,
            judge_url: None,
            rng_seed: None,
            store: None,
            leases: None,
            nicknames: None,
            judge: None,
            audit: None,
            bus: None,
        }
    }

    pub fn with_config(mut self, config: GameConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_instance_id(mut self, instance_id: impl Into<String>) -> Self {
        self.instance_id = Some(instance_id.into());
        self
    }

    pub fn with_redis(mut self, redis_url: impl Into<String>) -> Self {
        self.redis_url = Some(redis_url.into());
        self
    }

    pub fn with_judge_url(mut self, judge_url: impl Into<String>) -> Self {
        self.judge_url = Some(judge_url.into());
        self
    }

    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn RoomStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_leases(mut self, leases: Arc<dyn LeaseBackend>) -> Self {
        self.leases = Some(leases);
        self
    }

    pub fn with_nicknames(mut self, nicknames: Arc<dyn NicknameRegistry>) -> Self {
        self.nicknames = Some(nicknames);
        self
    }

    pub fn with_judge(mut self, judge: Arc<dyn JudgeClient>) -> Self {
        self.judge = Some(judge);
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Share an in-process bus with other nodes built in the same process.
    pub fn with_bus(mut self, bus: Arc<InProcessBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub async fn build(self) -> Result<AppState, AppError> {
        self.config.validate()?;

        let redis = match &self.redis_url {
            Some(url) => Some(connect_redis(url).await?),
            None => None,
        };
        let registry = Arc::new(SessionRegistry::new());

        let store = self
            .store
            .unwrap_or_else(|| default_store(redis.as_ref(), &self.config));
        let leases = self.leases.unwrap_or_else(|| match &redis {
            Some(conn) => Arc::new(RedisLeaseBackend::new(conn.clone())) as Arc<dyn LeaseBackend>,
            None => Arc::new(MemoryLeaseBackend::new()),
        });
        let nicknames = self.nicknames.unwrap_or_else(|| match &redis {
            Some(conn) => Arc::new(RedisNicknames::new(conn.clone())) as Arc<dyn NicknameRegistry>,
            None => Arc::new(MemoryNicknames::new()),
        });
        let audit = self.audit.unwrap_or_else(|| match &redis {
            Some(conn) => Arc::new(RedisAuditLog::new(conn.clone())) as Arc<dyn AuditSink>,
            None => Arc::new(TracingAuditLog),
        });
        let judge: Arc<dyn JudgeClient> = match (self.judge, &self.judge_url) {
            (Some(judge), _) => judge,
            (None, Some(url)) => Arc::new(HttpJudge::new(url.clone())?),
            (None, None) => Arc::new(NeutralJudge),
        };

        let bus: Arc<dyn ClusterBus> = match (self.bus, &self.redis_url) {
            (Some(bus), _) => {
                bus.attach(registry.clone());
                bus
            }
            (None, Some(url)) => RedisClusterBus::connect(url, registry.clone()).await?,
            (None, None) => {
                let bus = InProcessBus::new();
                bus.attach(registry.clone());
                bus
            }
        };

        let config = Arc::new(self.config);
        let rng = Arc::new(match self.rng_seed {
            Some(seed) => GameRng::seeded(seed),
            None => GameRng::from_entropy(),
        });

        let locks = LockFacade::new(
            leases,
            LockSettings {
                wait: config.lock_wait,
                lease: config.lock_lease,
                poll_interval: config.lock_poll_interval,
            },
        );
        let messenger = Arc::new(Messenger::new(registry.clone(), bus));
        let (scheduler, timers) = FlowScheduler::channel();
        let txn = Arc::new(RoomTxn::new(
            store,
            locks,
            messenger.clone(),
            scheduler.clone(),
            audit,
        ));

        let flow = Arc::new(GameFlowService::new(
            txn.clone(),
            nicknames,
            rng,
            config.clone(),
        ));
        let judgment = Arc::new(JudgmentCoordinator::new(
            txn,
            judge,
            scheduler.clone(),
            config.judge_timeout,
            config.result_display_delay,
        ));
        FlowDispatcher::new(
            flow.clone(),
            judgment,
            scheduler,
            RetryPolicy::from_config(&config),
        )
        .spawn(timers);

        let instance_id = self
            .instance_id
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        info!(
            instance_id = %instance_id,
            redis = redis.is_some(),
            "application state ready"
        );

        let router = Arc::new(ActionRouter::new(flow.clone(), messenger));
        Ok(AppState::new(router, flow, registry, instance_id))
    }
}

fn default_store(redis: Option<&ConnectionManager>, config: &GameConfig) -> Arc<dyn RoomStore> {
    match redis {
        Some(conn) => Arc::new(RedisRoomStore::new(conn.clone(), config.room_ttl)),
        None => Arc::new(MemoryRoomStore::new(config.room_ttl)),
    }
}

impl Default for StateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub fn build_state() -> StateBuilder {
    StateBuilder::new()
}
