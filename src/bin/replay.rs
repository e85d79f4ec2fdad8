//! Replay a recorded board session script and print the resulting board.
//!
//! The script is JSON lines, one session event per line:
//!
//! ```text
//! {"event":"initial_state","entities":[...]}
//! {"event":"upsert","entity":{"kind":"character",...}}
//! {"event":"collect","update_id":"..."}
//! {"event":"rejected","update_id":"..."}
//! ```
//!
//! Blank lines and lines starting with `#` are skipped. Pings never expire
//! during a replay.

use std::fs::File;
use std::io::{self, BufRead, BufReader};

use boardsync::action::{Action, UpdateId};
use boardsync::config::SessionConfig;
use boardsync::entity::{Cell, Entity, EntityId};
use boardsync::index::EntityIndex;
use boardsync::session::BoardSession;
use clap::{Parser, ValueEnum};
use serde::Deserialize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
enum ReplayError {
    #[error("failed to read {path}: {source}")]
    Io { path: String, source: io::Error },
    #[error("line {line}: invalid event: {source}")]
    Decode { line: usize, source: serde_json::Error },
    #[error("failed to encode board: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "boardsync-replay", about = "Replay a board session script and print the board")]
struct Cli {
    /// Script path, or `-` for stdin.
    #[arg(default_value = "-")]
    input: String,

    /// Which layer to print.
    #[arg(long, value_enum, default_value_t = Layer::Local)]
    layer: Layer,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Layer {
    Local,
    Network,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum ScriptEvent {
    InitialState { entities: Vec<Entity> },
    Confirmed { update_id: UpdateId, actions: Vec<Action> },
    Rejected { update_id: UpdateId },
    Upsert { entity: Entity },
    Delete { entity_id: EntityId },
    Ping { cell: Cell },
    Undo,
    Redo,
    Fence,
    Collect { update_id: Option<UpdateId> },
}

fn main() -> Result<(), ReplayError> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).with_writer(io::stderr).init();

    let cli = Cli::parse();
    let reader: Box<dyn BufRead> = if cli.input == "-" {
        Box::new(BufReader::new(io::stdin()))
    } else {
        let file = File::open(&cli.input).map_err(|source| ReplayError::Io { path: cli.input.clone(), source })?;
        Box::new(BufReader::new(file))
    };

    let mut session = BoardSession::new(&SessionConfig::from_env());
    let applied = replay(&mut session, reader, &cli.input)?;
    info!(events = applied, entities = session.local().len(), "replay complete");

    let board = match cli.layer {
        Layer::Local => session.local(),
        Layer::Network => session.state().network(),
    };
    println!("{}", render(board)?);
    Ok(())
}

fn replay(session: &mut BoardSession, reader: impl BufRead, path: &str) -> Result<usize, ReplayError> {
    let mut applied = 0_usize;
    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| ReplayError::Io { path: path.to_owned(), source })?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let event: ScriptEvent =
            serde_json::from_str(trimmed).map_err(|source| ReplayError::Decode { line: idx + 1, source })?;
        apply_event(session, event);
        applied += 1;
    }
    Ok(applied)
}

fn apply_event(session: &mut BoardSession, event: ScriptEvent) {
    match event {
        ScriptEvent::InitialState { entities } => session.on_initial_state(entities),
        ScriptEvent::Confirmed { update_id, actions } => session.on_confirmed_update(actions, update_id),
        ScriptEvent::Rejected { update_id } => {
            let known = session.on_update_rejected(update_id);
            debug!(%update_id, known, "rejected");
        }
        ScriptEvent::Upsert { entity } => session.request_upsert(entity),
        ScriptEvent::Delete { entity_id } => session.request_delete(entity_id),
        ScriptEvent::Ping { cell } => {
            let id = session.request_ping(cell);
            debug!(%id, %cell, "ping");
        }
        ScriptEvent::Undo => {
            let changed = session.request_undo();
            debug!(changed, "undo");
        }
        ScriptEvent::Redo => {
            let changed = session.request_redo();
            debug!(changed, "redo");
        }
        ScriptEvent::Fence => {
            session.request_fence();
        }
        ScriptEvent::Collect { update_id } => {
            let update_id = update_id.unwrap_or_else(Uuid::new_v4);
            match session.collect_update(update_id) {
                Some(update) => info!(%update_id, actions = update.actions.len(), "update collected"),
                None => debug!(%update_id, "nothing to collect"),
            }
        }
    }
}

fn render(board: &EntityIndex) -> Result<String, ReplayError> {
    Ok(serde_json::to_string_pretty(&board.sorted_entities())?)
}
