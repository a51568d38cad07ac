//! Message -> prompt translation for the native `/completion` endpoint.
//!
//! Uses a fixed role-delimited template so the same message sequence may be
//! sent through either backend endpoint without re-templating.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Render an OpenAI-style message sequence as a single llama.cpp prompt.
#[must_use]
pub fn messages_to_prompt(messages: &[ChatMessage]) -> String {
    let mut out = String::new();
    for msg in messages {
        match msg.role {
            Role::System => {
                out.push_str("[INST] <<SYS>>\n");
                out.push_str(&msg.content);
                out.push_str("\n<</SYS>>\n");
            }
            Role::User => {
                out.push_str("[INST] ");
                out.push_str(&msg.content);
                out.push_str(" [/INST]\n");
            }
            Role::Assistant => {
                out.push_str(&msg.content);
                out.push('\n');
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_system_user_assistant_in_order() {
        let rendered = messages_to_prompt(&[
            ChatMessage::system("be terse"),
            ChatMessage::user("hello"),
            ChatMessage::assistant("hi there"),
        ]);
        assert!(rendered.starts_with("[INST] <<SYS>>\nbe terse\n<</SYS>>\n"));
        assert!(rendered.contains("[INST] hello [/INST]\n"));
        assert!(rendered.ends_with("hi there\n"));
    }
}
