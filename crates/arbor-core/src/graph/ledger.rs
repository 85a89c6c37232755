//! Per-node message history.

use super::message::{Message, MessageRole};
use super::state::{Effect, GraphState, SaveMode};

/// Number of trailing messages sent to the summarizer.
pub const TITLE_CONTEXT_MESSAGES: usize = 4;

/// Characters kept by [`fallback_title`] before ellipsizing.
pub const FALLBACK_TITLE_CHARS: usize = 30;

/// Derives a title from message content when the summarizer is unavailable.
pub fn fallback_title(content: &str) -> String {
    let trimmed = content.trim();
    let mut chars = trimmed.chars();
    let head: String = chars.by_ref().take(FALLBACK_TITLE_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

impl GraphState {
    /// Appends `message` to the node's history.
    ///
    /// A partial message whose role matches the last entry replaces that
    /// entry's content in place (streaming) and keeps its attachments.
    /// Partial appends never persist. A completed model message also asks
    /// for a regenerated title.
    pub fn append_message(&mut self, node_id: &str, message: Message, is_partial: bool) -> Vec<Effect> {
        let Some(node) = self.node_mut(node_id) else {
            tracing::warn!(node_id, "[MessageLedger] Append to unknown node ignored");
            return Vec::new();
        };
        let history = &mut node.data.chat_history;

        let streamed_in_place = match history.last_mut() {
            Some(last) if is_partial && last.role == message.role => {
                last.content = message.content.clone();
                if message.model_id.is_some() {
                    last.model_id = message.model_id.clone();
                }
                true
            }
            _ => false,
        };
        if !streamed_in_place {
            history.push(message.clone());
        }

        if is_partial {
            return Vec::new();
        }

        let mut effects = vec![Effect::Persist(SaveMode::Debounced)];
        if message.role == MessageRole::Model {
            let start = history.len().saturating_sub(TITLE_CONTEXT_MESSAGES);
            effects.push(Effect::RegenerateTitle {
                node_id: node_id.to_string(),
                recent: history[start..].to_vec(),
                fallback: fallback_title(&message.content),
            });
        }
        effects
    }

    /// Replaces the content of the last message if it was produced by the
    /// model and (when given) by `model_id`.
    ///
    /// Returns whether the write went through. Never persists.
    pub fn replace_last(&mut self, node_id: &str, content: &str, model_id: Option<&str>) -> bool {
        let Some(last) = self
            .node_mut(node_id)
            .and_then(|n| n.data.chat_history.last_mut())
        else {
            return false;
        };

        if last.role != MessageRole::Model {
            return false;
        }
        if let Some(expected) = model_id
            && last.model_id.as_deref() != Some(expected)
        {
            tracing::debug!(
                node_id,
                expected,
                actual = ?last.model_id,
                "[MessageLedger] Stale stream ignored"
            );
            return false;
        }

        last.content = content.to_string();
        true
    }

    /// Removes the most recent message of the node.
    pub fn drop_last(&mut self, node_id: &str) -> Vec<Effect> {
        match self.node_mut(node_id).and_then(|n| n.data.chat_history.pop()) {
            Some(_) => vec![Effect::Persist(SaveMode::Debounced)],
            None => Vec::new(),
        }
    }

    /// Renames a node. Used for manual renames and title completions.
    pub fn set_label(&mut self, node_id: &str, label: &str) -> Vec<Effect> {
        match self.node_mut(node_id) {
            Some(node) => {
                node.data.label = label.to_string();
                vec![Effect::Persist(SaveMode::Debounced)]
            }
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::message::Attachment;
    use crate::graph::model::ROOT_NODE_ID;

    fn history(state: &GraphState) -> &[Message] {
        state.node(ROOT_NODE_ID).unwrap().history()
    }

    #[test]
    fn test_partial_same_role_replaces_in_place() {
        let mut state = GraphState::new();
        let attached = Message::model("He", "m1")
            .with_attachments(vec![Attachment::new("a.txt", "text/plain", "QQ==")]);
        assert!(state.append_message(ROOT_NODE_ID, attached, true).is_empty());
        assert!(
            state
                .append_message(ROOT_NODE_ID, Message::model("Hello", "m1"), true)
                .is_empty()
        );

        assert_eq!(history(&state).len(), 1);
        assert_eq!(history(&state)[0].content, "Hello");
        assert_eq!(history(&state)[0].attachments.len(), 1);
    }

    #[test]
    fn test_different_role_or_complete_grows_history() {
        let mut state = GraphState::new();
        state.append_message(ROOT_NODE_ID, Message::user("Hi"), false);
        state.append_message(ROOT_NODE_ID, Message::model("Hel", "m1"), true);
        assert_eq!(history(&state).len(), 2);
        state.append_message(ROOT_NODE_ID, Message::model("Hello", "m1"), false);
        assert_eq!(history(&state).len(), 3);
    }

    #[test]
    fn test_completed_model_message_requests_title() {
        let mut state = GraphState::new();
        for i in 0..5 {
            state.append_message(ROOT_NODE_ID, Message::user(format!("q{}", i)), false);
        }
        let long = "The answer is a rather long explanation of things";
        let effects = state.append_message(ROOT_NODE_ID, Message::model(long, "m1"), false);

        assert_eq!(effects[0], Effect::Persist(SaveMode::Debounced));
        match &effects[1] {
            Effect::RegenerateTitle {
                node_id,
                recent,
                fallback,
            } => {
                assert_eq!(node_id, ROOT_NODE_ID);
                assert_eq!(recent.len(), TITLE_CONTEXT_MESSAGES);
                assert_eq!(recent.last().unwrap().content, long);
                assert_eq!(fallback, "The answer is a rather long ex...");
            }
            other => panic!("unexpected effect {:?}", other),
        }
    }

    #[test]
    fn test_user_message_does_not_request_title() {
        let mut state = GraphState::new();
        let effects = state.append_message(ROOT_NODE_ID, Message::user("Hi"), false);
        assert_eq!(effects, vec![Effect::Persist(SaveMode::Debounced)]);
    }

    #[test]
    fn test_replace_last_guards() {
        let mut state = GraphState::new();
        state.append_message(ROOT_NODE_ID, Message::user("Hi"), false);
        assert!(!state.replace_last(ROOT_NODE_ID, "x", None));

        state.append_message(ROOT_NODE_ID, Message::model("A", "m1"), true);
        assert!(!state.replace_last(ROOT_NODE_ID, "stale", Some("m2")));
        assert!(state.replace_last(ROOT_NODE_ID, "AB", Some("m1")));
        assert!(state.replace_last(ROOT_NODE_ID, "ABC", None));
        assert_eq!(history(&state).last().unwrap().content, "ABC");
        assert!(!state.replace_last("ghost", "x", None));
    }

    #[test]
    fn test_drop_last() {
        let mut state = GraphState::new();
        assert!(state.drop_last(ROOT_NODE_ID).is_empty());
        state.append_message(ROOT_NODE_ID, Message::user("Hi"), false);
        assert_eq!(
            state.drop_last(ROOT_NODE_ID),
            vec![Effect::Persist(SaveMode::Debounced)]
        );
        assert!(history(&state).is_empty());
        assert!(state.drop_last("ghost").is_empty());
    }

    #[test]
    fn test_fallback_title_short_content_unchanged() {
        assert_eq!(fallback_title("  short  "), "short");
        assert_eq!(fallback_title(&"x".repeat(30)), "x".repeat(30));
    }
}
