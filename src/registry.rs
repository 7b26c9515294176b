//! Bounded, concurrency-safe session store with idle eviction
//!
//! The registry owns every [`Session`]. Structural mutations (create, delete,
//! sweep) serialize on one lock; per-session turn exclusivity is a separate
//! owned async mutex so creating or deleting other sessions never blocks on an
//! in-progress turn.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Result, SwarmError};
use crate::session::{Session, SessionStatus, SessionSummary};

/// A registry entry: the session data plus its turn-exclusivity lock.
#[derive(Debug)]
pub struct SessionSlot {
    session: Mutex<Session>,
    turn_lock: Arc<AsyncMutex<()>>,
}

impl SessionSlot {
    fn new(session: Session) -> Arc<Self> {
        Arc::new(Self {
            session: Mutex::new(session),
            turn_lock: Arc::new(AsyncMutex::new(())),
        })
    }

    /// Lock the session data. Critical sections must stay short; the turn
    /// runner holds this only long enough to read or commit state.
    pub fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap()
    }

    pub fn summary(&self) -> SessionSummary {
        self.lock().summary()
    }

    pub fn id(&self) -> String {
        self.lock().id.clone()
    }

    fn is_running(&self) -> bool {
        self.lock().status == SessionStatus::Running
    }
}

/// Exclusive permission to run one turn against a session.
///
/// Dropping the permit returns the session to `Idle` and releases the turn
/// lock, so a failed turn can never leave the session stuck `Running`.
#[derive(Debug)]
pub struct TurnPermit {
    slot: Arc<SessionSlot>,
    _guard: OwnedMutexGuard<()>,
}

impl TurnPermit {
    pub fn slot(&self) -> &Arc<SessionSlot> {
        &self.slot
    }
}

impl Drop for TurnPermit {
    fn drop(&mut self) {
        let mut session = self.slot.lock();
        if session.status == SessionStatus::Running {
            session.status = SessionStatus::Idle;
        }
        session.touch();
    }
}

/// Bounded store of sessions with least-recently-active idle eviction.
pub struct SessionRegistry {
    slots: Mutex<HashMap<String, Arc<SessionSlot>>>,
    max_sessions: usize,
    idle_timeout: Duration,
}

impl SessionRegistry {
    pub fn new(max_sessions: usize, idle_timeout: Duration) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            max_sessions,
            idle_timeout,
        }
    }

    /// Create a session, evicting the least-recently-active non-running
    /// session when at capacity. A caller-supplied id must be unused.
    pub fn create(&self, id: Option<String>) -> Result<Arc<SessionSlot>> {
        let mut slots = self.slots.lock().unwrap();
        self.sweep_locked(&mut slots);

        let id = id.unwrap_or_else(|| Uuid::new_v4().to_string());
        if slots.contains_key(&id) {
            return Err(SwarmError::Validation {
                message: format!("session id '{id}' already exists"),
            });
        }

        if slots.len() >= self.max_sessions {
            let oldest = slots
                .iter()
                .filter(|(_, slot)| !slot.is_running())
                .min_by_key(|(_, slot)| slot.lock().last_active_at)
                .map(|(id, _)| id.clone());
            match oldest {
                Some(evicted) => {
                    slots.remove(&evicted);
                    info!(session = %evicted, "Evicted least-recently-active session to admit a new one");
                }
                None => {
                    return Err(SwarmError::Capacity {
                        max: self.max_sessions,
                    })
                }
            }
        }

        let slot = SessionSlot::new(Session::new(id.clone()));
        slots.insert(id.clone(), slot.clone());
        debug!(session = %id, "Created session");
        Ok(slot)
    }

    pub fn get(&self, id: &str) -> Result<Arc<SessionSlot>> {
        let slots = self.slots.lock().unwrap();
        let slot = slots.get(id).ok_or_else(|| SwarmError::SessionNotFound {
            id: id.to_string(),
        })?;
        if slot.lock().status == SessionStatus::Expired {
            return Err(SwarmError::SessionExpired {
                id: id.to_string(),
            });
        }
        Ok(slot.clone())
    }

    /// Resolve an existing session or create a fresh one.
    pub fn get_or_create(&self, id: Option<String>) -> Result<Arc<SessionSlot>> {
        if let Some(id) = &id {
            let known = self.slots.lock().unwrap().contains_key(id);
            if known {
                return self.get(id);
            }
        }
        self.create(id)
    }

    /// Remove a session regardless of idle state. Idempotent.
    pub fn delete(&self, id: &str) {
        let removed = self.slots.lock().unwrap().remove(id);
        if removed.is_some() {
            debug!(session = %id, "Deleted session");
        }
    }

    /// Expire and remove sessions idle past the timeout. Running sessions are
    /// deferred to a later sweep.
    pub fn sweep(&self) -> usize {
        let mut slots = self.slots.lock().unwrap();
        self.sweep_locked(&mut slots)
    }

    fn sweep_locked(&self, slots: &mut HashMap<String, Arc<SessionSlot>>) -> usize {
        let now = Utc::now();
        let expired: Vec<String> = slots
            .iter()
            .filter(|(_, slot)| {
                let session = slot.lock();
                session.status != SessionStatus::Running
                    && session.idle_for(now) >= self.idle_timeout
            })
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            if let Some(slot) = slots.remove(id) {
                slot.lock().status = SessionStatus::Expired;
            }
        }
        if !expired.is_empty() {
            info!(count = expired.len(), "Swept expired sessions");
        }
        expired.len()
    }

    /// Acquire the exclusive right to run a turn against `slot`.
    pub fn begin_turn(&self, slot: &Arc<SessionSlot>) -> Result<TurnPermit> {
        let guard = slot
            .turn_lock
            .clone()
            .try_lock_owned()
            .map_err(|_| SwarmError::ConcurrentTurn { id: slot.id() })?;

        let mut session = slot.lock();
        session.status = SessionStatus::Running;
        session.touch();
        drop(session);

        Ok(TurnPermit {
            slot: slot.clone(),
            _guard: guard,
        })
    }

    pub fn occupancy(&self) -> usize {
        self.slots.lock().unwrap().len()
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    pub fn summaries(&self) -> Vec<SessionSummary> {
        let mut summaries: Vec<SessionSummary> = self
            .slots
            .lock()
            .unwrap()
            .values()
            .map(|slot| slot.summary())
            .collect();
        summaries.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        summaries
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("occupancy", &self.occupancy())
            .field("max_sessions", &self.max_sessions)
            .field("idle_timeout", &self.idle_timeout)
            .finish()
    }
}
