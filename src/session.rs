use thiserror::Error;
use tokio::sync::RwLock;

pub const DEFAULT_TOPIC: &str = "General Research";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TopicError {
    #[error("topic name is empty")]
    Empty,
}

/// Session-scoped state shared by the clipboard watcher and the command loop.
///
/// Only the locked topic lives here. The per-turn dedup set belongs to the
/// render worker, which is the sole renderer.
pub struct SessionState {
    topic: RwLock<String>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::with_topic(DEFAULT_TOPIC)
    }

    pub fn with_topic(topic: impl Into<String>) -> Self {
        Self {
            topic: RwLock::new(topic.into()),
        }
    }

    pub async fn topic(&self) -> String {
        self.topic.read().await.clone()
    }

    /// Lock a new topic. The trimmed value must be non-empty; on error the
    /// previous topic stays in place.
    pub async fn set_topic(&self, new: &str) -> Result<String, TopicError> {
        let trimmed = new.trim();
        if trimmed.is_empty() {
            return Err(TopicError::Empty);
        }
        *self.topic.write().await = trimmed.to_string();
        Ok(trimmed.to_string())
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn starts_with_default_topic() {
        assert_eq!(SessionState::new().topic().await, "General Research");
    }

    #[tokio::test]
    async fn set_topic_trims() {
        let state = SessionState::new();
        let locked = state.set_topic("  Rust Internals ").await.unwrap();
        assert_eq!(locked, "Rust Internals");
        assert_eq!(state.topic().await, "Rust Internals");
    }

    #[tokio::test]
    async fn empty_topic_is_rejected_and_previous_kept() {
        let state = SessionState::with_topic("Kernels");
        assert_eq!(state.set_topic("   ").await, Err(TopicError::Empty));
        assert_eq!(state.set_topic("").await, Err(TopicError::Empty));
        assert_eq!(state.topic().await, "Kernels");
    }
}
