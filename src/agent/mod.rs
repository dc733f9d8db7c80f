pub mod claude;

use anyhow::Result;
use async_trait::async_trait;

use crate::protocol::Turn;

/// A long-lived conversation with the agent runtime.
///
/// Queries run in submission order. `query` returns as soon as the query is
/// accepted; the returned turn yields the response events as they arrive.
#[async_trait]
pub trait AgentSession: Send + Sync {
    async fn query(&self, text: &str) -> Result<Turn>;

    /// Release the runtime. Safe to call more than once.
    async fn close(&self);
}
