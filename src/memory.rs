//! Per-session conversational memory.
//!
//! A concurrent map from session id to a bounded, ordered turn log. Each
//! session keeps at most `2 × max_turns` entries (user/assistant pairs);
//! when the cap is exceeded the oldest entries are evicted first.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::models::{ChatTurn, Role};

pub struct ChatMemory {
    sessions: RwLock<HashMap<String, Vec<ChatTurn>>>,
    max_turns: usize,
}

impl ChatMemory {
    pub fn new(max_turns: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_turns,
        }
    }

    /// The session's turns in order, oldest first. Unknown sessions are
    /// simply empty.
    pub fn get(&self, session_id: &str) -> Vec<ChatTurn> {
        let sessions = self.sessions.read().unwrap();
        sessions.get(session_id).cloned().unwrap_or_default()
    }

    /// Append a turn, evicting the oldest entries past the cap.
    pub fn append(&self, session_id: &str, role: Role, content: &str) {
        let mut sessions = self.sessions.write().unwrap();
        let log = sessions.entry(session_id.to_string()).or_default();
        log.push(ChatTurn {
            role,
            content: content.to_string(),
        });
        let cap = 2 * self.max_turns;
        if log.len() > cap {
            let excess = log.len() - cap;
            log.drain(..excess);
        }
    }

    /// Forget a session entirely.
    pub fn reset(&self, session_id: &str) {
        let mut sessions = self.sessions.write().unwrap();
        sessions.remove(session_id);
    }

    /// Number of turns currently stored for a session.
    pub fn len(&self, session_id: &str) -> usize {
        let sessions = self.sessions.read().unwrap();
        sessions.get(session_id).map_or(0, Vec::len)
    }
}
