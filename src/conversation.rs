//! Per-group conversation context
//!
//! Tracks the conversation id the assistant returned for each chat group so
//! follow-up messages continue the same thread. Memory-only; `/clear` drops
//! a group's thread and a restart drops them all.

use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct ConversationState {
    ids: Mutex<HashMap<String, String>>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, group_id: &str) -> Option<String> {
        self.ids
            .lock()
            .expect("conversation lock poisoned")
            .get(group_id)
            .cloned()
    }

    /// Last write wins when concurrent turns race for the same group
    pub fn set(&self, group_id: &str, conversation_id: String) {
        self.ids
            .lock()
            .expect("conversation lock poisoned")
            .insert(group_id.to_string(), conversation_id);
    }

    /// Returns whether a context existed for the group
    pub fn clear(&self, group_id: &str) -> bool {
        let removed = self
            .ids
            .lock()
            .expect("conversation lock poisoned")
            .remove(group_id)
            .is_some();
        if removed {
            log::info!("Cleared conversation context for group {group_id}");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_roundtrip() {
        let state = ConversationState::new();
        assert!(state.get("g1").is_none());
        state.set("g1", "conv-a".to_string());
        assert_eq!(state.get("g1").as_deref(), Some("conv-a"));
    }

    #[test]
    fn test_groups_are_independent() {
        let state = ConversationState::new();
        state.set("g1", "conv-a".to_string());
        state.set("g2", "conv-b".to_string());
        assert_eq!(state.get("g1").as_deref(), Some("conv-a"));
        assert_eq!(state.get("g2").as_deref(), Some("conv-b"));
    }

    #[test]
    fn test_last_write_wins() {
        let state = ConversationState::new();
        state.set("g1", "conv-a".to_string());
        state.set("g1", "conv-b".to_string());
        assert_eq!(state.get("g1").as_deref(), Some("conv-b"));
    }

    #[test]
    fn test_clear_reports_existence() {
        let state = ConversationState::new();
        assert!(!state.clear("g1"));
        state.set("g1", "conv-a".to_string());
        assert!(state.clear("g1"));
        assert!(state.get("g1").is_none());
        assert!(!state.clear("g1"));
    }
}
