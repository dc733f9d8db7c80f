use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info};

use crate::clipboard::Clipboard;
use crate::console::Console;
use crate::dispatch::Dispatcher;
use crate::prompts;
use crate::session::SessionState;

pub const POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const ERROR_BACKOFF: Duration = Duration::from_millis(1000);
const PREVIEW_CHARS: usize = 60;

/// Background task that turns clipboard changes into capture queries.
pub struct ClipboardWatcher<C> {
    clipboard: C,
    state: Arc<SessionState>,
    dispatcher: Arc<Dispatcher>,
    console: Console,
    last_seen: String,
}

impl<C: Clipboard> ClipboardWatcher<C> {
    /// Whatever is on the clipboard at startup counts as already seen.
    pub fn new(
        mut clipboard: C,
        state: Arc<SessionState>,
        dispatcher: Arc<Dispatcher>,
        console: Console,
    ) -> Self {
        let last_seen = match clipboard.read_text() {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                debug!("Initial clipboard read failed: {e:#}");
                String::new()
            }
        };
        Self {
            clipboard,
            state,
            dispatcher,
            console,
            last_seen,
        }
    }

    /// Poll forever. Errors only lengthen the next sleep.
    pub async fn run(mut self) {
        info!("Clipboard watcher started");
        loop {
            let delay = match self.poll_once().await {
                Ok(_) => POLL_INTERVAL,
                Err(e) => {
                    debug!("Clipboard poll failed: {e:#}");
                    ERROR_BACKOFF
                }
            };
            tokio::time::sleep(delay).await;
        }
    }

    /// Check the clipboard once. Returns whether a capture was submitted.
    pub async fn poll_once(&mut self) -> Result<bool> {
        let current = self.clipboard.read_text()?.trim().to_string();
        if current.is_empty() || current == self.last_seen {
            return Ok(false);
        }
        self.last_seen = current.clone();
        self.console
            .line(format!("\n[Raw Capture]: {}...", preview(&current)));

        let topic = self.state.topic().await;
        self.dispatcher
            .submit(&prompts::capture_query(&topic, &current))
            .await?;
        Ok(true)
    }
}

fn preview(text: &str) -> &str {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentSession;
    use crate::console::Captured;
    use crate::render::{Renderer, render_queue, spawn_render_worker};
    use crate::testing::{FakeAgent, ScriptedClipboard};

    fn watcher(
        clipboard: ScriptedClipboard,
        agent: Arc<FakeAgent>,
        state: Arc<SessionState>,
    ) -> (ClipboardWatcher<ScriptedClipboard>, Captured) {
        let (console, out) = Captured::console();
        let (jobs_tx, jobs_rx) = render_queue();
        spawn_render_worker(Renderer::new(console.clone(), state.clone()), jobs_rx);
        let dispatcher = Arc::new(Dispatcher::new(agent, jobs_tx));
        (ClipboardWatcher::new(clipboard, state, dispatcher, console), out)
    }

    #[tokio::test]
    async fn one_query_per_distinct_change() {
        let agent = Arc::new(FakeAgent::new());
        let clipboard = ScriptedClipboard::texts(&[
            "startup", "startup", "", "  alpha ", "alpha", "beta", "startup",
        ]);
        let (mut w, _out) = watcher(clipboard, agent.clone(), Arc::new(SessionState::new()));

        let mut submitted = 0;
        for _ in 0..6 {
            if w.poll_once().await.unwrap() {
                submitted += 1;
            }
        }
        assert_eq!(submitted, 3);
        assert_eq!(
            agent.queries(),
            [
                prompts::capture_query("General Research", "alpha"),
                prompts::capture_query("General Research", "beta"),
                prompts::capture_query("General Research", "startup"),
            ]
        );
    }

    #[tokio::test]
    async fn capture_uses_topic_current_at_composition() {
        let agent = Arc::new(FakeAgent::new());
        let state = Arc::new(SessionState::new());
        let clipboard = ScriptedClipboard::texts(&["", "first", "second"]);
        let (mut w, _out) = watcher(clipboard, agent.clone(), state.clone());

        w.poll_once().await.unwrap();
        state.set_topic("Rust Internals").await.unwrap();
        w.poll_once().await.unwrap();

        let queries = agent.queries();
        assert!(queries[0].starts_with("TOPIC: General Research |"));
        assert!(queries[1].starts_with("TOPIC: Rust Internals |"));
    }

    #[tokio::test]
    async fn preview_is_truncated_to_sixty_chars() {
        let long = "é".repeat(100);
        let agent = Arc::new(FakeAgent::new());
        let clipboard = ScriptedClipboard::texts(&["", long.as_str()]);
        let (mut w, out) = watcher(clipboard, agent, Arc::new(SessionState::new()));

        w.poll_once().await.unwrap();
        let expected = format!("[Raw Capture]: {}...", "é".repeat(60));
        assert!(out.lines().contains(&expected));
    }

    #[tokio::test]
    async fn failed_read_is_reported_to_caller() {
        let clipboard = ScriptedClipboard::new(vec![
            Ok(String::new()),
            Err(anyhow::anyhow!("clipboard busy")),
            Ok("after".to_string()),
        ]);
        let agent = Arc::new(FakeAgent::new());
        let (mut w, _out) = watcher(clipboard, agent.clone(), Arc::new(SessionState::new()));

        assert!(w.poll_once().await.is_err());
        assert!(w.poll_once().await.unwrap());
        assert_eq!(agent.queries().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn survives_read_errors_and_resumes_after_backoff() {
        let clipboard = ScriptedClipboard::new(vec![
            Ok(String::new()),
            Err(anyhow::anyhow!("clipboard busy")),
            Ok("captured".to_string()),
        ]);
        let agent = Arc::new(FakeAgent::new());
        let (w, _out) = watcher(clipboard, agent.clone(), Arc::new(SessionState::new()));
        let task = tokio::spawn(w.run());

        tokio::time::sleep(Duration::from_millis(900)).await;
        assert!(agent.queries().is_empty());

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(agent.queries().len(), 1);
        assert!(!task.is_finished());
        task.abort();
    }

    #[tokio::test]
    async fn agent_failure_does_not_resubmit_same_content() {
        let agent = Arc::new(FakeAgent::new());
        agent.close().await;
        let clipboard = ScriptedClipboard::texts(&["", "note"]);
        let (mut w, _out) = watcher(clipboard, agent.clone(), Arc::new(SessionState::new()));

        assert!(w.poll_once().await.is_err());
        assert!(!w.poll_once().await.unwrap());
    }

    #[test]
    fn preview_keeps_short_text() {
        assert_eq!(preview("short"), "short");
    }
}
