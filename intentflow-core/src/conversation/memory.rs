//! In-memory conversation store for tests and single-process deployments

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{ConversationMemory, Turn};
use crate::config::MemoryConfig;
use crate::error::Result;

/// Keeps the most recent `max_turns` turns per session
pub struct InMemoryConversationMemory {
    sessions: RwLock<HashMap<String, VecDeque<Turn>>>,
    max_turns: usize,
}

impl Default for InMemoryConversationMemory {
    fn default() -> Self {
        Self::from_config(&MemoryConfig::default())
    }
}

impl InMemoryConversationMemory {
    pub fn new(max_turns: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_turns,
        }
    }

    pub fn from_config(config: &MemoryConfig) -> Self {
        Self::new(config.max_turns)
    }

    /// Number of sessions with at least one turn
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Forget a session
    pub async fn clear(&self, session_id: &str) -> bool {
        self.sessions.write().await.remove(session_id).is_some()
    }
}

#[async_trait]
impl ConversationMemory for InMemoryConversationMemory {
    async fn load(&self, session_id: &str) -> Result<Vec<Turn>> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(session_id)
            .map(|turns| turns.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn append(&self, session_id: &str, turns: Vec<Turn>) -> Result<()> {
        if self.max_turns == 0 || turns.is_empty() {
            return Ok(());
        }

        let mut sessions = self.sessions.write().await;
        let stored = sessions.entry(session_id.to_string()).or_default();
        stored.extend(turns);
        while stored.len() > self.max_turns {
            stored.pop_front();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MessageRole;

    #[tokio::test]
    async fn test_unknown_session_is_empty() {
        let memory = InMemoryConversationMemory::default();
        assert!(memory.load("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_append_and_load_in_order() {
        let memory = InMemoryConversationMemory::new(10);
        memory
            .append("s1", vec![Turn::user("hello"), Turn::assistant("hi")])
            .await
            .unwrap();

        let turns = memory.load("s1").await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, MessageRole::User);
        assert_eq!(turns[1].to_message().content, "hi");
        assert!(memory.load("s2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bounded_by_max_turns() {
        let memory = InMemoryConversationMemory::new(3);
        for i in 0..5 {
            memory.append("s", vec![Turn::user(format!("m{i}"))]).await.unwrap();
        }

        let turns = memory.load("s").await.unwrap();
        let contents: Vec<_> = turns.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4"]);
    }

    #[tokio::test]
    async fn test_clear() {
        let memory = InMemoryConversationMemory::new(3);
        memory.append("s", vec![Turn::user("x")]).await.unwrap();
        assert_eq!(memory.session_count().await, 1);
        assert!(memory.clear("s").await);
        assert_eq!(memory.session_count().await, 0);
    }
}
