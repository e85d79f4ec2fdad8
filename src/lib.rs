//! Client-side board state reconciliation for a multiplayer tabletop grid.
//!
//! Each participant edits optimistically: edits show up immediately in a
//! local view, are batched and sent to the server, and are either confirmed
//! (folded into the network layer) or rejected (rolled back). Confirmed
//! updates from other participants are merged in as they arrive. Local edits
//! are grouped into undo sets that can be undone and redone.
//!
//! ## Module layout
//!
//! | Module | Role |
//! |--------|------|
//! | [`entity`] | Board entity types: Characters, Floors and Pings |
//! | [`index`] | Spatial entity index with occupancy and duplicate coloring |
//! | [`action`] | Upsert / Delete / Ping actions, updates, and the applier |
//! | [`undo`] | Undo entries and the grouped undo/redo ledger |
//! | [`merge`] | [`merge::MergeState`]: network, queued, unqueued and local layers |
//! | [`session`] | [`session::BoardSession`]: inbound/outbound boundary and ping timers |
//! | [`runtime`] | Tokio task driving a session with batching and snapshots |
//! | [`config`] | Environment-driven [`config::SessionConfig`] |
//! | [`consts`] | Palette and default tuning values |

pub mod action;
pub mod config;
pub mod consts;
pub mod entity;
pub mod index;
pub mod merge;
pub mod runtime;
pub mod session;
pub mod undo;
