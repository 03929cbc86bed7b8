//! Conversation persistence consumed by the run driver.

use crate::events::Message;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;
use toolbridge_core::{Result, ThreadId};

/// Append-only message list keyed by thread.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Messages of `thread`, oldest first.
    async fn messages(&self, thread: &ThreadId) -> Result<Vec<Message>>;
    async fn append(&self, thread: &ThreadId, messages: Vec<Message>) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct ConversationLog {
    threads: HashMap<ThreadId, Vec<Message>>,
}

impl ConversationLog {
    pub fn messages(&self, thread: &ThreadId) -> Vec<Message> {
        let mut messages = self.threads.get(thread).cloned().unwrap_or_default();
        messages.sort_by_key(|message| message.created_at);
        messages
    }

    pub fn append(&mut self, thread: &ThreadId, messages: Vec<Message>) {
        self.threads.entry(thread.clone()).or_default().extend(messages);
    }

    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }
}

pub type InMemoryConversationStore = Mutex<ConversationLog>;

#[async_trait]
impl ConversationStore for Mutex<ConversationLog> {
    async fn messages(&self, thread: &ThreadId) -> Result<Vec<Message>> {
        let log = self.lock().await;
        Ok(log.messages(thread))
    }

    async fn append(&self, thread: &ThreadId, messages: Vec<Message>) -> Result<()> {
        let mut log = self.lock().await;
        log.append(thread, messages);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Role;

    #[tokio::test]
    async fn messages_come_back_in_creation_order() {
        let store = InMemoryConversationStore::default();
        let thread = ThreadId::from_external("t1");
        let late = Message::new(thread.clone(), None, Role::Assistant, 20);
        let early = Message::new(thread.clone(), None, Role::User, 10);
        store.append(&thread, vec![late.clone()]).await.unwrap();
        store.append(&thread, vec![early.clone()]).await.unwrap();

        let messages = store.messages(&thread).await.unwrap();
        assert_eq!(messages, vec![early, late]);
        assert!(store.messages(&ThreadId::from_external("other")).await.unwrap().is_empty());
    }
}
