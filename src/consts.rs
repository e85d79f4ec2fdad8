//! Shared constants for the board engine.

// ── Colors ──────────────────────────────────────────────────────

/// Palette used to tell apart Characters that share identical contents.
/// Assigned in order, so the first duplicate always gets the first free entry.
pub const TOKEN_PALETTE: [&str; 8] = [
    "#D94B4B", // red
    "#3C7DD9", // blue
    "#3FA66B", // green
    "#E0A030", // amber
    "#8E5BC8", // violet
    "#2BB3B1", // teal
    "#E06FA8", // pink
    "#6B6B6B", // slate
];

// ── Session defaults ────────────────────────────────────────────

/// How often unqueued actions are batched into an outbound update, in milliseconds.
pub const DEFAULT_BATCH_INTERVAL_MS: u64 = 50;

/// How long a ping stays on the board before it expires, in milliseconds.
pub const DEFAULT_PING_LIFETIME_MS: u64 = 3000;

/// Maximum number of sealed undo sets kept per session.
pub const DEFAULT_MAX_UNDO_SETS: usize = 100;

/// Depth of the async driver's inbound command queue.
pub const DEFAULT_COMMAND_QUEUE_CAPACITY: usize = 64;

/// How many expired ping ids a session remembers, so a late server echo
/// cannot bring one back.
pub const EXPIRED_PING_MEMORY: usize = 256;
