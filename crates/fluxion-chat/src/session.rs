//! Conversation State
//!
//! Per-session history of user questions and final answers. Intermediate
//! tool traffic never lands here.

use fluxion_llm::{ChatMessage, ChatRole};

#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    messages: Vec<ChatMessage>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::user(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::assistant(content));
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Owned copy of the history
    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.messages.clone()
    }

    /// `system` followed by the full history
    pub fn with_system(&self, system_prompt: &str) -> Vec<ChatMessage> {
        let mut out = Vec::with_capacity(self.messages.len() + 1);
        out.push(ChatMessage::system(system_prompt));
        out.extend(self.messages.iter().cloned());
        out
    }

    pub fn last_user(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == ChatRole::User)
            .map(|m| m.content.as_str())
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_order_and_system_prefix() {
        let mut state = ConversationState::new();
        state.push_user("How many?");
        state.push_assistant("42");
        state.push_user("And today?");

        let msgs = state.with_system("sys");
        assert_eq!(msgs.len(), 4);
        assert_eq!(msgs[0], ChatMessage::system("sys"));
        assert_eq!(msgs[2], ChatMessage::assistant("42"));
        assert_eq!(state.last_user(), Some("And today?"));

        state.clear();
        assert!(state.is_empty());
        assert_eq!(state.last_user(), None);
    }
}
