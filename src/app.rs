use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufRead, BufReader};
use tracing::{info, warn};

use crate::agent::AgentSession;
use crate::agent::claude::ClaudeSession;
use crate::clipboard::{Clipboard, SystemClipboard};
use crate::config::AppConfig;
use crate::console::Console;
use crate::dispatch::Dispatcher;
use crate::render::{Renderer, render_queue, spawn_render_worker};
use crate::repl::CommandLoop;
use crate::session::SessionState;
use crate::vault::{NoVault, TopicDirectory, VaultClient};
use crate::watcher::ClipboardWatcher;

const FAREWELL: &str = "\nSession ended. Your insights are safe in the vault.";

/// Run the interactive research session until Ctrl-C or end of input.
pub async fn run_session(config: AppConfig) -> Result<()> {
    let console = Console::stdout();
    let state = Arc::new(SessionState::new());

    let topics: Arc<dyn TopicDirectory> = match VaultClient::from_config(&config.vault) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            warn!("Topic listing disabled: {e}");
            Arc::new(NoVault)
        }
    };

    console.line("\nInsightVault: Power Research Mode Active.");
    console.banner(&state.topic().await);

    let agent: Arc<dyn AgentSession> = Arc::new(ClaudeSession::open(config.agent).await?);
    info!("Agent session open");

    drive(
        agent,
        SystemClipboard::new(),
        BufReader::new(tokio::io::stdin()),
        state,
        topics,
        console,
        async {
            let _ = tokio::signal::ctrl_c().await;
        },
    )
    .await
}

/// Run the watcher and the command loop together until input ends or
/// `shutdown` resolves. The agent session is closed on every exit path.
pub async fn drive<C, R>(
    agent: Arc<dyn AgentSession>,
    clipboard: C,
    input: R,
    state: Arc<SessionState>,
    topics: Arc<dyn TopicDirectory>,
    console: Console,
    shutdown: impl Future<Output = ()>,
) -> Result<()>
where
    C: Clipboard,
    R: AsyncBufRead + Unpin,
{
    let (jobs_tx, jobs_rx) = render_queue();
    let worker = spawn_render_worker(Renderer::new(console.clone(), state.clone()), jobs_rx);
    let dispatcher = Arc::new(Dispatcher::new(agent.clone(), jobs_tx));

    let watcher = ClipboardWatcher::new(clipboard, state.clone(), dispatcher.clone(), console.clone());
    let commands = CommandLoop::new(input, state, dispatcher, topics, console.clone());

    let outcome = tokio::select! {
        _ = watcher.run() => Ok(()),
        result = commands.run() => result,
        _ = shutdown => {
            info!("Interrupt received");
            Ok(())
        }
    };

    worker.abort();
    console.line(FAREWELL);
    agent.close().await;
    outcome
}
