use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tracing::info;

use crate::commands::{self, Command};
use crate::console::Console;
use crate::dispatch::Dispatcher;
use crate::prompts;
use crate::session::SessionState;
use crate::vault::TopicDirectory;

/// Foreground loop: one terminal line at a time.
///
/// Agent-directed lines are rendered to completion before the next line is read.
pub struct CommandLoop<R> {
    lines: Lines<R>,
    state: Arc<SessionState>,
    dispatcher: Arc<Dispatcher>,
    topics: Arc<dyn TopicDirectory>,
    console: Console,
}

impl<R: AsyncBufRead + Unpin> CommandLoop<R> {
    pub fn new(
        input: R,
        state: Arc<SessionState>,
        dispatcher: Arc<Dispatcher>,
        topics: Arc<dyn TopicDirectory>,
        console: Console,
    ) -> Self {
        Self {
            lines: input.lines(),
            state,
            dispatcher,
            topics,
            console,
        }
    }

    /// Run until input is exhausted.
    pub async fn run(mut self) -> Result<()> {
        loop {
            self.console.prompt("You: ");
            let line = match self.lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    info!("Input closed");
                    return Ok(());
                }
                Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                    self.console.line(format!("Input Error: {e}"));
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            if let Err(e) = self.handle_line(&line).await {
                self.console.line(format!("Input Error: {e}"));
            }
        }
    }

    async fn handle_line(&self, line: &str) -> Result<()> {
        let Some(command) = commands::parse(line) else {
            return Ok(());
        };
        match command {
            Command::ListTopics => {
                let topics = self.topics.list_topics().await;
                if topics.is_empty() {
                    self.console.line("\n[System]: No topics found in vault yet.");
                } else {
                    self.console.line("\n--- Topics found in your Vault ---");
                    for topic in &topics {
                        self.console.line(format!(" • {topic}"));
                    }
                    self.console.line("----------------------------------");
                }
                self.banner().await;
            }
            Command::SetTopic(name) => {
                match self.state.set_topic(&name).await {
                    Ok(locked) => self
                        .console
                        .line(format!("\n[System]: Topic updated and locked to: {locked}")),
                    Err(_) => self.console.line("\n[System]: Please provide a topic name."),
                }
                self.banner().await;
            }
            Command::MissingTopicName => {
                self.console.line("\n[System]: Please provide a topic name.");
                self.banner().await;
            }
            Command::Publish => {
                let topic = self.state.topic().await;
                self.dispatcher
                    .submit_and_wait(&prompts::publish_query(&topic))
                    .await?;
            }
            Command::FreeQuery(text) => {
                self.dispatcher.submit_and_wait(&text).await?;
            }
        }
        Ok(())
    }

    async fn banner(&self) {
        self.console.banner(&self.state.topic().await);
    }
}
