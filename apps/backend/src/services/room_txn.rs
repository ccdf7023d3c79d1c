//! Load → mutate → persist for one room under its lease.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::{Room, SessionId};
use crate::error::AppError;
use crate::lock::{Flow, LockFacade, LockOutcome};
use crate::services::audit::{spawn_record, AuditSink, GameRecord};
use crate::services::scheduler::{FlowEvent, FlowScheduler, ScheduledEvent};
use crate::store::RoomStore;
use crate::ws::messenger::{Messenger, Outbox};
use crate::ws::protocol::ServerEvent;

/// Skip reason when the room snapshot no longer exists.
pub const ROOM_GONE: &str = "room not found";

/// Side effects produced by a mutation, applied while the lease is still held.
#[derive(Debug, Default)]
pub struct Effects {
    pub outbox: Outbox,
    timers: Vec<(FlowEvent, Duration)>,
    waiting: Option<bool>,
    delete: bool,
    bind: Vec<SessionId>,
    unbind: Vec<SessionId>,
    audit: Option<GameRecord>,
}

impl Effects {
    pub fn to(&mut self, session_id: impl Into<SessionId>, event: ServerEvent) {
        self.outbox.to(session_id, event);
    }

    pub fn broadcast(&mut self, room: &Room, event: ServerEvent) {
        self.outbox.room(room, event);
    }

    /// Arm a timer stamped with the room's post-mutation generation and round.
    pub fn after(&mut self, event: FlowEvent, delay: Duration) {
        self.timers.push((event, delay));
    }

    pub fn now(&mut self, event: FlowEvent) {
        self.after(event, Duration::ZERO);
    }

    pub fn mark_waiting(&mut self, waiting: bool) {
        self.waiting = Some(waiting);
    }

    pub fn delete_room(&mut self) {
        self.delete = true;
    }

    pub fn bind(&mut self, session_id: impl Into<SessionId>) {
        self.bind.push(session_id.into());
    }

    pub fn unbind(&mut self, session_id: impl Into<SessionId>) {
        self.unbind.push(session_id.into());
    }

    pub fn audit(&mut self, record: GameRecord) {
        self.audit = Some(record);
    }
}

/// Shared plumbing for every room mutation.
pub struct RoomTxn {
    store: Arc<dyn RoomStore>,
    locks: LockFacade,
    messenger: Arc<Messenger>,
    scheduler: FlowScheduler,
    audit: Arc<dyn AuditSink>,
}

impl RoomTxn {
    pub fn new(
        store: Arc<dyn RoomStore>,
        locks: LockFacade,
        messenger: Arc<Messenger>,
        scheduler: FlowScheduler,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            store,
            locks,
            messenger,
            scheduler,
            audit,
        }
    }

    pub fn store(&self) -> &Arc<dyn RoomStore> {
        &self.store
    }

    pub fn locks(&self) -> &LockFacade {
        &self.locks
    }

    pub fn messenger(&self) -> &Arc<Messenger> {
        &self.messenger
    }

    /// Run `mutate` against the current snapshot of `room_id` under its
    /// lease, then persist and apply the collected effects.
    ///
    /// A missing room yields `Skipped(ROOM_GONE)`. Returns the room as
    /// committed.
    pub async fn run<F>(&self, room_id: &str, mutate: F) -> Result<LockOutcome<Room>, AppError>
    where
        F: FnOnce(&mut Room, &mut Effects) -> Result<Flow<()>, AppError> + Send,
    {
        self.locks
            .with_lock(room_id, || async move {
                let Some(mut room) = self.store.load_room(room_id).await? else {
                    return Ok(Flow::Skip(ROOM_GONE));
                };
                let mut effects = Effects::default();
                if let Flow::Skip(reason) = mutate(&mut room, &mut effects)? {
                    return Ok(Flow::Skip(reason));
                }
                self.commit(&room, effects).await?;
                Ok(Flow::Done(room))
            })
            .await
    }

    /// Persist `room` and apply `effects`. Callers must hold the room lease.
    pub async fn commit(&self, room: &Room, effects: Effects) -> Result<(), AppError> {
        let Effects {
            outbox,
            timers,
            waiting,
            delete,
            bind,
            unbind,
            audit,
        } = effects;

        if delete {
            self.store.delete_room(room).await?;
        } else {
            self.store.save_room(room).await?;
            match waiting {
                Some(true) => self.store.add_waiting(&room.id).await?,
                Some(false) => self.store.remove_waiting(&room.id).await?,
                None => {}
            }
        }
        for sid in &bind {
            self.store.bind_session(sid, &room.id).await?;
        }
        crate::store::unbind_sessions(self.store.as_ref(), &unbind).await;

        self.messenger.flush(outbox).await;

        for (event, delay) in timers {
            self.scheduler
                .schedule(ScheduledEvent::new(room, event), delay);
        }
        if let Some(record) = audit {
            spawn_record(self.audit.clone(), record);
        }
        Ok(())
    }
}
