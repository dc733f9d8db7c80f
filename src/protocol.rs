use tokio::sync::mpsc;

// ── Response events (agent → renderer) ──

/// One event of an agent turn, as consumed by the renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseEvent {
    ToolUse { name: String },
    Text { text: String },
}

impl ResponseEvent {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn tool_use(name: impl Into<String>) -> Self {
        Self::ToolUse { name: name.into() }
    }
}

/// A turn item: either an event or the error that ended the turn.
pub type TurnItem = anyhow::Result<ResponseEvent>;

/// Receiving side of one turn. The stream ends when the agent drops the sender.
pub type Turn = mpsc::Receiver<TurnItem>;

// ── SQ: Submission Queue (session → agent task) ──

#[derive(Debug)]
pub enum Submission {
    Query {
        text: String,
        events: mpsc::Sender<TurnItem>,
    },
    Shutdown,
}

/// Capacity of the per-turn event channel.
pub const TURN_CAPACITY: usize = 256;

/// Create the channel pair for a new turn.
pub fn turn_channel() -> (mpsc::Sender<TurnItem>, Turn) {
    mpsc::channel(TURN_CAPACITY)
}
