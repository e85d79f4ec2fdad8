//! Tokio driver for a [`BoardSession`].
//!
//! DESIGN
//! ======
//! One task owns the session. Callers talk to it through a bounded command
//! channel and read the local view from a `watch` channel of immutable
//! snapshots, so rendering never blocks edits. A ticker fires every batch
//! interval: it sweeps expired pings, then collects unqueued actions into an
//! update with a fresh id and hands it to the outbound transport.
//!
//! ERROR HANDLING
//! ==============
//! The task stops when every [`SessionHandle`] is dropped or when the
//! outbound receiver is gone. Handle methods then report
//! [`SessionError::Closed`]. Nothing else can fail here; see
//! [`crate::merge`] for how races are absorbed.

#[cfg(test)]
#[path = "runtime_test.rs"]
mod runtime_test;

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::action::{Action, Update, UpdateId};
use crate::config::SessionConfig;
use crate::entity::{Cell, Entity, EntityId};
use crate::index::EntityIndex;
use crate::session::BoardSession;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("board session closed")]
    Closed,
}

/// Input to the session task.
#[derive(Debug, Clone)]
pub enum Command {
    InitialState(Vec<Entity>),
    Confirmed { update_id: UpdateId, actions: Vec<Action> },
    Rejected(UpdateId),
    Upsert(Entity),
    Delete(EntityId),
    Ping(Cell),
    Undo,
    Redo,
    Fence,
}

/// Cloneable handle to a running session task.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<Arc<EntityIndex>>,
}

impl SessionHandle {
    /// Queue a raw command.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the session task has stopped.
    pub async fn send(&self, command: Command) -> Result<(), SessionError> {
        self.commands.send(command).await.map_err(|_| SessionError::Closed)
    }

    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the session task has stopped.
    pub async fn initial_state(&self, entities: Vec<Entity>) -> Result<(), SessionError> {
        self.send(Command::InitialState(entities)).await
    }

    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the session task has stopped.
    pub async fn confirmed(&self, update_id: UpdateId, actions: Vec<Action>) -> Result<(), SessionError> {
        self.send(Command::Confirmed { update_id, actions }).await
    }

    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the session task has stopped.
    pub async fn rejected(&self, update_id: UpdateId) -> Result<(), SessionError> {
        self.send(Command::Rejected(update_id)).await
    }

    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the session task has stopped.
    pub async fn upsert(&self, entity: impl Into<Entity>) -> Result<(), SessionError> {
        self.send(Command::Upsert(entity.into())).await
    }

    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the session task has stopped.
    pub async fn delete(&self, id: EntityId) -> Result<(), SessionError> {
        self.send(Command::Delete(id)).await
    }

    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the session task has stopped.
    pub async fn ping(&self, cell: Cell) -> Result<(), SessionError> {
        self.send(Command::Ping(cell)).await
    }

    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the session task has stopped.
    pub async fn undo(&self) -> Result<(), SessionError> {
        self.send(Command::Undo).await
    }

    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the session task has stopped.
    pub async fn redo(&self) -> Result<(), SessionError> {
        self.send(Command::Redo).await
    }

    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the session task has stopped.
    pub async fn fence(&self) -> Result<(), SessionError> {
        self.send(Command::Fence).await
    }

    /// Latest published local view.
    #[must_use]
    pub fn snapshot(&self) -> Arc<EntityIndex> {
        Arc::clone(&self.snapshots.borrow())
    }

    /// A receiver that wakes on every published local view.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Arc<EntityIndex>> {
        self.snapshots.clone()
    }
}

/// Spawn the session task. Batched updates go to `outbound`.
#[must_use]
pub fn spawn_session(config: SessionConfig, outbound: mpsc::Sender<Update>) -> (SessionHandle, JoinHandle<()>) {
    let (command_tx, mut command_rx) = mpsc::channel(config.command_queue_capacity.max(1));
    let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(EntityIndex::new()));
    let batch_interval = config.batch_interval.max(std::time::Duration::from_millis(1));

    info!(
        batch_interval_ms = batch_interval.as_millis(),
        ping_lifetime_ms = config.ping_lifetime.as_millis(),
        max_undo_sets = config.max_undo_sets,
        command_queue_capacity = config.command_queue_capacity,
        "board session started"
    );

    let task = tokio::spawn(async move {
        let mut session = BoardSession::new(&config);
        let mut ticker = tokio::time::interval(batch_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                maybe_command = command_rx.recv() => {
                    let Some(command) = maybe_command else {
                        if let Some(update) = session.collect_update(Uuid::new_v4()) {
                            if outbound.send(update).await.is_err() {
                                warn!("outbound closed; final update dropped");
                            }
                        }
                        break;
                    };
                    handle_command(&mut session, command);
                    publish(&snapshot_tx, &session);
                }
                _ = ticker.tick() => {
                    if !session.expire_pings(Instant::now()).is_empty() {
                        publish(&snapshot_tx, &session);
                    }
                    if let Some(update) = session.collect_update(Uuid::new_v4()) {
                        if outbound.send(update).await.is_err() {
                            warn!("outbound closed; stopping board session");
                            break;
                        }
                    }
                }
            }
        }
        info!("board session stopped");
    });

    (SessionHandle { commands: command_tx, snapshots: snapshot_rx }, task)
}

/// Replace the published view with the session's current local index.
fn publish(snapshots: &watch::Sender<Arc<EntityIndex>>, session: &BoardSession) {
    let local = Arc::new(session.local().clone());
    snapshots.send_modify(|current| *current = local);
}

fn handle_command(session: &mut BoardSession, command: Command) {
    match command {
        Command::InitialState(entities) => session.on_initial_state(entities),
        Command::Confirmed { update_id, actions } => session.on_confirmed_update(actions, update_id),
        Command::Rejected(update_id) => {
            if !session.on_update_rejected(update_id) {
                debug!(%update_id, "rejection for unknown update ignored");
            }
        }
        Command::Upsert(entity) => session.request_upsert(entity),
        Command::Delete(id) => session.request_delete(id),
        Command::Ping(cell) => {
            session.request_ping(cell);
        }
        Command::Undo => {
            session.request_undo();
        }
        Command::Redo => {
            session.request_redo();
        }
        Command::Fence => {
            session.request_fence();
        }
    }
}
