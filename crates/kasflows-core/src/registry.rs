//! Session registry for announced clients.
//!
//! Stores connected clients indexed by name together with the instant they
//! last announced, so idle sessions can be swept out.

use crate::error::{RelayError, RelayResult};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// A live client session.
#[derive(Debug, Clone)]
pub struct Session {
    /// Client name (registry key).
    pub name: String,
    /// When the client first announced.
    pub connected_at: Instant,
    /// Last announce.
    pub last_seen_at: Instant,
}

/// Result of an announce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnounceOutcome {
    /// First sight of this name; a "connect" notification is owed.
    Connected,
    /// Session refreshed; nothing is owed.
    AlreadyConnected,
}

/// Result of an explicit disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectOutcome {
    /// Session removed; a "disconnect" notification is owed.
    Disconnected,
    /// No session existed for the name.
    NotConnected,
}

/// Registry of connected clients.
///
/// Every operation is a single critical section on one mutex. Callers must
/// not dispatch events while holding anything borrowed from the registry.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<IndexMap<String, Session>>,
}

impl SessionRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Announce `name` now. See [`SessionRegistry::announce_at`].
    pub fn announce(&self, name: &str) -> RelayResult<AnnounceOutcome> {
        self.announce_at(name, Instant::now())
    }

    /// Register `name` or refresh its last-seen instant.
    pub fn announce_at(&self, name: &str, now: Instant) -> RelayResult<AnnounceOutcome> {
        self.announce_authorized(name, now, || Ok(()))
    }

    /// Like [`SessionRegistry::announce_at`], but an existing session is only
    /// refreshed if `authorize` succeeds. `authorize` runs under the registry
    /// lock and must not touch the registry.
    pub fn announce_authorized<F>(
        &self,
        name: &str,
        now: Instant,
        authorize: F,
    ) -> RelayResult<AnnounceOutcome>
    where
        F: FnOnce() -> RelayResult<()>,
    {
        if name.is_empty() {
            return Err(RelayError::InvalidPayload("name must not be empty".into()));
        }

        let mut sessions = self.sessions.lock();
        if let Some(session) = sessions.get_mut(name) {
            authorize()?;
            session.last_seen_at = now;
            debug!(name = %name, "session refreshed");
            return Ok(AnnounceOutcome::AlreadyConnected);
        }

        sessions.insert(
            name.to_string(),
            Session {
                name: name.to_string(),
                connected_at: now,
                last_seen_at: now,
            },
        );
        debug!(name = %name, "session registered");
        Ok(AnnounceOutcome::Connected)
    }

    /// Remove a session by name.
    pub fn disconnect(&self, name: &str) -> DisconnectOutcome {
        let mut sessions = self.sessions.lock();
        if sessions.shift_remove(name).is_some() {
            debug!(name = %name, "session removed");
            DisconnectOutcome::Disconnected
        } else {
            DisconnectOutcome::NotConnected
        }
    }

    /// Whether `name` currently has a session.
    pub fn is_connected(&self, name: &str) -> bool {
        self.sessions.lock().contains_key(name)
    }

    /// Snapshot of connected names in registration order.
    pub fn list_connected(&self) -> Vec<String> {
        self.sessions.lock().keys().cloned().collect()
    }

    /// Look up a session.
    pub fn get(&self, name: &str) -> Option<Session> {
        self.sessions.lock().get(name).cloned()
    }

    /// Remove sessions idle for strictly longer than `timeout` as of `now`.
    ///
    /// Returns the evicted names; each one owes a "disconnect" notification.
    pub fn sweep(&self, now: Instant, timeout: Duration) -> Vec<String> {
        let mut sessions = self.sessions.lock();
        let mut removed = Vec::new();

        sessions.retain(|name, session| {
            if now.saturating_duration_since(session.last_seen_at) > timeout {
                removed.push(name.clone());
                false
            } else {
                true
            }
        });

        if !removed.is_empty() {
            debug!(count = removed.len(), "sweep removed idle sessions");
        }

        removed
    }

    /// Number of connected clients.
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_announce_connects() {
        let registry = SessionRegistry::new();
        assert_eq!(registry.announce("alice").unwrap(), AnnounceOutcome::Connected);
        assert!(registry.is_connected("alice"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn repeat_announce_refreshes() {
        let registry = SessionRegistry::new();
        let t0 = Instant::now();
        registry.announce_at("alice", t0).unwrap();

        let t1 = t0 + Duration::from_secs(3);
        assert_eq!(
            registry.announce_at("alice", t1).unwrap(),
            AnnounceOutcome::AlreadyConnected
        );

        let session = registry.get("alice").unwrap();
        assert_eq!(session.connected_at, t0);
        assert_eq!(session.last_seen_at, t1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn empty_name_rejected() {
        let registry = SessionRegistry::new();
        assert!(matches!(
            registry.announce(""),
            Err(RelayError::InvalidPayload(_))
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn disconnect_known_and_unknown() {
        let registry = SessionRegistry::new();
        registry.announce("alice").unwrap();
        assert_eq!(registry.disconnect("alice"), DisconnectOutcome::Disconnected);
        assert_eq!(registry.disconnect("alice"), DisconnectOutcome::NotConnected);
        assert!(!registry.is_connected("alice"));
    }

    #[test]
    fn list_keeps_registration_order() {
        let registry = SessionRegistry::new();
        for name in ["carol", "alice", "bob"] {
            registry.announce(name).unwrap();
        }
        registry.disconnect("alice");
        assert_eq!(registry.list_connected(), vec!["carol", "bob"]);
    }

    #[test]
    fn sweep_evicts_only_idle_sessions() {
        let registry = SessionRegistry::new();
        let t0 = Instant::now();
        registry.announce_at("stale", t0).unwrap();
        registry.announce_at("fresh", t0 + Duration::from_secs(8)).unwrap();

        let evicted = registry.sweep(t0 + Duration::from_secs(11), Duration::from_secs(10));
        assert_eq!(evicted, vec!["stale"]);
        assert!(!registry.is_connected("stale"));
        assert!(registry.is_connected("fresh"));
    }

    #[test]
    fn sweep_boundary_is_exclusive() {
        let registry = SessionRegistry::new();
        let t0 = Instant::now();
        registry.announce_at("alice", t0).unwrap();

        // Exactly at the timeout is still alive.
        let evicted = registry.sweep(t0 + Duration::from_secs(10), Duration::from_secs(10));
        assert!(evicted.is_empty());

        let evicted = registry.sweep(
            t0 + Duration::from_millis(10_001),
            Duration::from_secs(10),
        );
        assert_eq!(evicted, vec!["alice"]);
    }

    #[test]
    fn sweep_after_refresh_keeps_session() {
        let registry = SessionRegistry::new();
        let t0 = Instant::now();
        registry.announce_at("alice", t0).unwrap();
        registry.announce_at("alice", t0 + Duration::from_secs(5)).unwrap();

        let evicted = registry.sweep(t0 + Duration::from_secs(12), Duration::from_secs(10));
        assert!(evicted.is_empty());
    }

    #[test]
    fn rejected_refresh_leaves_session_untouched() {
        let registry = SessionRegistry::new();
        let t0 = Instant::now();
        registry.announce_at("alice", t0).unwrap();

        let later = t0 + Duration::from_secs(4);
        let result = registry.announce_authorized("alice", later, || {
            Err(RelayError::InvalidToken("token missing".into()))
        });
        assert!(matches!(result, Err(RelayError::InvalidToken(_))));
        assert_eq!(registry.get("alice").unwrap().last_seen_at, t0);

        // First sight does not consult the check.
        let outcome = registry
            .announce_authorized("bob", later, || {
                Err(RelayError::InvalidToken("unreachable".into()))
            })
            .unwrap();
        assert_eq!(outcome, AnnounceOutcome::Connected);
    }

    #[test]
    fn concurrent_announce_registers_each_name_once() {
        let registry = SessionRegistry::new();
        let connected = std::sync::atomic::AtomicUsize::new(0);

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for i in 0..50 {
                        let name = format!("client-{}", i % 10);
                        if registry.announce(&name).unwrap() == AnnounceOutcome::Connected {
                            connected.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                        }
                    }
                });
            }
        });

        assert_eq!(connected.into_inner(), 10);
        assert_eq!(registry.len(), 10);
    }
}
