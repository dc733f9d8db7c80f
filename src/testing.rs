//! Test doubles for the session's collaborators.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::agent::AgentSession;
use crate::clipboard::Clipboard;
use crate::protocol::{ResponseEvent, Turn, turn_channel};
use crate::vault::TopicDirectory;

/// Agent that records every query and answers from a script.
///
/// The log holds `query:<text>` when a query is accepted and `done:<text>`
/// once its last event has been sent.
#[derive(Default)]
pub struct FakeAgent {
    log: Arc<Mutex<Vec<String>>>,
    replies: Mutex<VecDeque<Vec<ResponseEvent>>>,
    delay: Option<Duration>,
    closed: AtomicBool,
}

impl FakeAgent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue the events for the next unanswered query.
    pub fn reply(self, events: Vec<ResponseEvent>) -> Self {
        self.replies.lock().unwrap().push_back(events);
        self
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn queries(&self) -> Vec<String> {
        self.log()
            .into_iter()
            .filter_map(|l| l.strip_prefix("query:").map(str::to_string))
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AgentSession for FakeAgent {
    async fn query(&self, text: &str) -> Result<Turn> {
        if self.is_closed() {
            anyhow::bail!("Agent session closed");
        }
        self.log.lock().unwrap().push(format!("query:{text}"));
        let events = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| vec![ResponseEvent::text(format!("ack: {text}"))]);

        let (tx, rx) = turn_channel();
        let log = self.log.clone();
        let delay = self.delay;
        let text = text.to_string();
        tokio::spawn(async move {
            if let Some(d) = delay {
                tokio::time::sleep(d).await;
            }
            for event in events {
                if tx.send(Ok(event)).await.is_err() {
                    break;
                }
            }
            log.lock().unwrap().push(format!("done:{text}"));
        });
        Ok(rx)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Clipboard that replays a script, then keeps returning the last value.
pub struct ScriptedClipboard {
    script: VecDeque<Result<String>>,
    last: String,
}

impl ScriptedClipboard {
    pub fn new(script: Vec<Result<String>>) -> Self {
        Self {
            script: script.into(),
            last: String::new(),
        }
    }

    pub fn texts(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| Ok(t.to_string())).collect())
    }
}

impl Clipboard for ScriptedClipboard {
    fn read_text(&mut self) -> Result<String> {
        match self.script.pop_front() {
            Some(Ok(text)) => {
                self.last = text.clone();
                Ok(text)
            }
            Some(Err(e)) => Err(e),
            None => Ok(self.last.clone()),
        }
    }
}

/// Topic directory with a fixed answer.
pub struct StaticTopics(pub Vec<String>);

impl StaticTopics {
    pub fn new(topics: &[&str]) -> Self {
        Self(topics.iter().map(|t| t.to_string()).collect())
    }
}

#[async_trait]
impl TopicDirectory for StaticTopics {
    async fn list_topics(&self) -> Vec<String> {
        self.0.clone()
    }
}
