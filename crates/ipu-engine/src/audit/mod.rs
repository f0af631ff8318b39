//! Audit trail
//!
//! Append-only, hash-chained record of what the engine did: state changes,
//! phase boundaries, actor starts and finishes. Each event stores the hash of
//! its predecessor so tampering or truncation in the middle of a persisted
//! journal is detectable.

use crate::context::ExecutionId;
use crate::error::AuditError;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// One audited action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event id
    pub event_id: Uuid,
    /// When the event was recorded
    pub timestamp: DateTime<Utc>,
    /// Execution the event belongs to
    pub execution_id: ExecutionId,
    /// Phase, if the event is scoped to one
    pub phase: Option<String>,
    /// Actor, if the event is scoped to one
    pub actor: Option<String>,
    /// What happened, e.g. `phase_started`
    pub action: String,
    /// Outcome or new state
    pub result: String,
    /// Hash of the previous event; zero for the first
    #[serde(with = "hex::serde")]
    pub prev_hash: [u8; 32],
    /// SHA-256 over this event's fields and `prev_hash`
    #[serde(with = "hex::serde")]
    pub hash: [u8; 32],
}

/// Hash-chained event log of one execution
#[derive(Debug, Default)]
pub struct AuditLog {
    inner: Mutex<Vec<AuditEvent>>,
}

impl AuditLog {
    /// Create empty log
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue a chain loaded from a journal
    #[must_use]
    pub fn from_events(events: Vec<AuditEvent>) -> Self {
        Self {
            inner: Mutex::new(events),
        }
    }

    /// Append an event and link it to the chain
    pub fn record(
        &self,
        execution_id: ExecutionId,
        phase: Option<&str>,
        actor: Option<&str>,
        action: &str,
        result: &str,
    ) -> Uuid {
        let mut guard = self.inner.lock();
        let mut event = AuditEvent {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            execution_id,
            phase: phase.map(str::to_string),
            actor: actor.map(str::to_string),
            action: action.to_string(),
            result: result.to_string(),
            prev_hash: guard.last().map_or([0u8; 32], |e| e.hash),
            hash: [0u8; 32],
        };
        event.hash = compute_hash(&event);
        let id = event.event_id;
        guard.push(event);
        id
    }

    /// Snapshot of every event in order
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.inner.lock().clone()
    }

    /// Number of events
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Check if no event was recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// # Errors
    /// Returns [`AuditError::IntegrityViolation`] naming the first event
    /// whose links or hash do not match.
    pub fn verify_integrity(&self) -> Result<(), AuditError> {
        verify_chain(&self.inner.lock())
    }
}

/// Verify a detached chain, e.g. one read back from disk
///
/// # Errors
/// See [`AuditLog::verify_integrity`].
pub fn verify_chain(events: &[AuditEvent]) -> Result<(), AuditError> {
    let mut prev = [0u8; 32];
    for (index, e) in events.iter().enumerate() {
        if e.prev_hash != prev || e.hash != compute_hash(e) {
            return Err(AuditError::IntegrityViolation { index });
        }
        prev = e.hash;
    }
    Ok(())
}

fn compute_hash(event: &AuditEvent) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(event.event_id.as_bytes());
    hasher.update(event.timestamp.timestamp_micros().to_le_bytes());
    hasher.update(event.execution_id.to_string().as_bytes());
    for field in [&event.phase, &event.actor] {
        hasher.update(field.as_deref().unwrap_or("").as_bytes());
        hasher.update([0]);
    }
    hasher.update(event.action.as_bytes());
    hasher.update([0]);
    hasher.update(event.result.as_bytes());
    hasher.update([0]);
    hasher.update(event.prev_hash);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_with(n: usize) -> (AuditLog, ExecutionId) {
        let log = AuditLog::new();
        let id = ExecutionId::new();
        for i in 0..n {
            log.record(id, Some("Facts"), Some("scan"), "actor_finished", &i.to_string());
        }
        (log, id)
    }

    #[test]
    fn chain_links_events() {
        let (log, _) = log_with(3);
        let events = log.events();
        assert_eq!(events[0].prev_hash, [0u8; 32]);
        assert_eq!(events[1].prev_hash, events[0].hash);
        assert!(log.verify_integrity().is_ok());
    }

    #[test]
    fn tampering_is_detected() {
        let (log, _) = log_with(3);
        let mut events = log.events();
        events[1].result = "forged".into();
        assert_eq!(
            verify_chain(&events),
            Err(AuditError::IntegrityViolation { index: 1 })
        );
    }

    #[test]
    fn restored_chain_continues() {
        let (log, id) = log_with(2);
        let restored = AuditLog::from_events(log.events());
        restored.record(id, None, None, "state", "resumed");
        assert_eq!(restored.len(), 3);
        assert!(restored.verify_integrity().is_ok());
    }

    #[test]
    fn chain_survives_json() {
        let (log, _) = log_with(2);
        let json = serde_json::to_string(&log.events()).unwrap();
        let back: Vec<AuditEvent> = serde_json::from_str(&json).unwrap();
        assert!(verify_chain(&back).is_ok());
    }
}
