//! Per-conversation state
//!
//! A [`Session`] is the unit of conversational continuity: it owns the
//! append-only message history and the agent position carried across turns.
//! Sessions are owned by the registry and mutated only by the turn runner
//! while the registry holds the session `Running`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::items::Message;

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Created, no turn completed yet.
    Active,
    /// A turn is executing; mutation is exclusive to the runner.
    Running,
    /// Between turns.
    Idle,
    /// Past the idle timeout; removed at the next sweep.
    Expired,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    /// Role that will receive the next turn; `None` before the first turn.
    pub current_agent: Option<String>,
    pub status: SessionStatus,
    /// Completed turns.
    pub turns: u64,
    history: Vec<Message>,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            created_at: now,
            last_active_at: now,
            current_agent: None,
            status: SessionStatus::Active,
            turns: 0,
            history: Vec::new(),
        }
    }

    pub fn touch(&mut self) {
        self.last_active_at = Utc::now();
    }

    /// Append a committed message. History is append-only; there is no way to
    /// reorder or delete entries.
    pub fn append(&mut self, message: Message) {
        self.history.push(message);
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    /// How long the session has been inactive as of `now`.
    pub fn idle_for(&self, now: DateTime<Utc>) -> Duration {
        (now - self.last_active_at).to_std().unwrap_or_default()
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            status: self.status,
            created_at: self.created_at,
            last_active_at: self.last_active_at,
            current_agent: self.current_agent.clone(),
            turns: self.turns,
            messages: self.history.len(),
        }
    }
}

/// Status/history summary returned by the fetch-by-id surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub current_agent: Option<String>,
    pub turns: u64,
    pub messages: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_new_session_is_active() {
        let session = Session::new("s1");
        assert_eq!(session.status, SessionStatus::Active);
        assert!(session.current_agent.is_none());
        assert!(session.history().is_empty());
        assert_eq!(session.turns, 0);
    }

    #[test]
    fn test_history_is_append_only() {
        let mut session = Session::new("s1");
        session.append(Message::user("first"));
        session.append(Message::assistant("second", "planner"));

        let history = session.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "first");
        assert_eq!(history[1].content, "second");
    }

    #[test]
    fn test_idle_for() {
        let mut session = Session::new("s1");
        session.last_active_at = Utc::now() - chrono::Duration::seconds(90);
        assert!(session.idle_for(Utc::now()) >= Duration::from_secs(89));

        // future last_active clamps to zero rather than underflowing
        session.last_active_at = Utc::now() + chrono::Duration::seconds(10);
        assert_eq!(session.idle_for(Utc::now()), Duration::ZERO);
    }

    #[test]
    fn test_summary_reflects_state() {
        let mut session = Session::new("s1");
        session.append(Message::user("hi"));
        session.current_agent = Some("planner".to_string());
        session.turns = 3;

        let summary = session.summary();
        assert_eq!(summary.id, "s1");
        assert_eq!(summary.messages, 1);
        assert_eq!(summary.turns, 3);
        assert_eq!(summary.current_agent.as_deref(), Some("planner"));
    }

    #[test]
    fn test_status_serialization() {
        let serialized = serde_json::to_string(&SessionStatus::Running).unwrap();
        assert_eq!(serialized, "\"running\"");
    }
}
