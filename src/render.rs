use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::console::Console;
use crate::protocol::{ResponseEvent, Turn};
use crate::session::SessionState;

/// Marker the agent emits after each successful save.
pub const VAULT_MARKER: &str = "Vault Updated";
/// Domain suffix of the publishing service.
pub const WIKI_DOMAIN: &str = "atlassian.net";

/// Pending render jobs. Bounded so a flood of clipboard captures applies
/// backpressure to the watcher instead of growing without limit.
pub const RENDER_QUEUE_CAPACITY: usize = 16;

/// How one text event should be shown.
#[derive(Debug, PartialEq, Eq)]
pub enum TextKind {
    VaultUpdate,
    Published,
    Plain,
}

pub fn classify(text: &str) -> TextKind {
    if text.contains(VAULT_MARKER) {
        TextKind::VaultUpdate
    } else if text.contains("http") || text.contains("Published") || text.contains(WIKI_DOMAIN) {
        TextKind::Published
    } else {
        TextKind::Plain
    }
}

/// Prints agent turns. Owns the per-turn set of already-printed status lines.
pub struct Renderer {
    console: Console,
    state: Arc<SessionState>,
    seen: HashSet<String>,
}

impl Renderer {
    pub fn new(console: Console, state: Arc<SessionState>) -> Self {
        Self {
            console,
            state,
            seen: HashSet::new(),
        }
    }

    /// Render a whole turn, then clear the dedup set and reprint the banner.
    pub async fn render_turn(&mut self, mut turn: Turn) {
        while let Some(item) = turn.recv().await {
            match item {
                Ok(event) => self.render_event(event),
                Err(e) => {
                    warn!("Agent turn failed: {e:#}");
                    self.console.line(format!("Agent Error: {e}"));
                    break;
                }
            }
        }
        self.seen.clear();
        self.console.banner(&self.state.topic().await);
    }

    fn render_event(&mut self, event: ResponseEvent) {
        match event {
            ResponseEvent::ToolUse { name } => {
                self.console.line(format!("[System]: Executing {name}..."));
            }
            ResponseEvent::Text { text } => {
                let text = text.trim();
                if text.is_empty() {
                    return;
                }
                match classify(text) {
                    TextKind::VaultUpdate => {
                        if self.seen.insert(text.to_string()) {
                            self.console.line(format!("Agent: {text}"));
                        } else {
                            debug!("Suppressed duplicate status: {text}");
                        }
                    }
                    TextKind::Published => {
                        self.console.line(format!("\n🚀 SUCCESS: {text}"));
                    }
                    TextKind::Plain => {
                        self.console.line(format!("Agent: {text}"));
                    }
                }
            }
        }
    }

    #[cfg(test)]
    pub fn seen_is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// A turn waiting to be rendered. `done` fires once the turn is fully printed.
pub struct RenderJob {
    pub turn: Turn,
    pub done: Option<oneshot::Sender<()>>,
}

pub fn render_queue() -> (mpsc::Sender<RenderJob>, mpsc::Receiver<RenderJob>) {
    mpsc::channel(RENDER_QUEUE_CAPACITY)
}

/// Spawn the single render worker. Jobs render strictly one after another.
pub fn spawn_render_worker(
    mut renderer: Renderer,
    mut jobs: mpsc::Receiver<RenderJob>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(job) = jobs.recv().await {
            renderer.render_turn(job.turn).await;
            if let Some(done) = job.done {
                let _ = done.send(());
            }
        }
        debug!("Render queue closed");
    })
}
