//! Conversation memory
//!
//! Session Context lives for one request only. A [`ConversationMemory`] is
//! the external store a dispatcher may use to carry turns between requests
//! that share a session id.
//!
//! # Example
//!
//! ```rust,ignore
//! use intentflow_core::conversation::{ConversationMemory, InMemoryConversationMemory, Turn};
//!
//! let memory = InMemoryConversationMemory::new(20);
//! memory.append("session-1", vec![Turn::user("Hello!"), Turn::assistant("Hi there!")]).await?;
//!
//! let history = memory.load("session-1").await?;
//! ```

mod memory;

pub use memory::InMemoryConversationMemory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::llm::{Message, MessageRole};

/// One stored conversation turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: MessageRole,
    pub content: String,
    pub at: DateTime<Utc>,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            at: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            at: Utc::now(),
        }
    }

    /// Convert to a model message
    pub fn to_message(&self) -> Message {
        Message {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

/// Persistent store of turns keyed by session id
#[async_trait]
pub trait ConversationMemory: Send + Sync {
    /// Stored turns for the session, oldest first. Unknown sessions are empty.
    async fn load(&self, session_id: &str) -> Result<Vec<Turn>>;

    /// Append turns to the session
    async fn append(&self, session_id: &str, turns: Vec<Turn>) -> Result<()>;
}
