use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::debug;

use crate::agent::AgentSession;
use crate::render::RenderJob;

/// Submits queries to the agent and hands their turns to the render worker.
///
/// Submission and enqueueing happen under one lock, so the render queue
/// always holds turns in the order the agent will answer them.
pub struct Dispatcher {
    agent: Arc<dyn AgentSession>,
    jobs: mpsc::Sender<RenderJob>,
    order: Mutex<()>,
}

impl Dispatcher {
    pub fn new(agent: Arc<dyn AgentSession>, jobs: mpsc::Sender<RenderJob>) -> Self {
        Self {
            agent,
            jobs,
            order: Mutex::new(()),
        }
    }

    /// Submit a query and queue its rendering without waiting for it.
    pub async fn submit(&self, text: &str) -> Result<()> {
        self.enqueue(text, None).await
    }

    /// Submit a query and return once its whole response has been rendered.
    pub async fn submit_and_wait(&self, text: &str) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.enqueue(text, Some(done_tx)).await?;
        done_rx
            .await
            .map_err(|_| anyhow::anyhow!("Render worker stopped"))
    }

    async fn enqueue(&self, text: &str, done: Option<oneshot::Sender<()>>) -> Result<()> {
        let _order = self.order.lock().await;
        let turn = self.agent.query(text).await?;
        debug!("Queued render job (wait={})", done.is_some());
        self.jobs
            .send(RenderJob { turn, done })
            .await
            .map_err(|_| anyhow::anyhow!("Render worker stopped"))
    }
}
