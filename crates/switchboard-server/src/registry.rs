//! Connection registry: live connections and the Online Set.
//!
//! A connection is registered when the transport accepts it and appears in
//! the Online Set only after it announces. Unregistering removes both, so a
//! connection can never leave a stale presence entry behind.
//!
//! Both collections are ordered by connection ID. Snapshot and broadcast
//! order carry no meaning on the wire, but a stable order keeps simulation
//! runs reproducible for a given seed.

use std::collections::{BTreeMap, BTreeSet};

use switchboard_proto::{ConnectionId, Descriptor, PresenceEntry};

/// What was torn down when a connection left.
#[derive(Debug, Clone, PartialEq)]
pub struct Departure {
    /// The connection's presence entry, if it had announced
    pub presence: Option<PresenceEntry>,
}

/// Registry of live connections and their presence entries.
///
/// # Invariants
///
/// - Every key of the Online Set is a registered connection.
/// - Every entry's `connection_id()` equals its key.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    /// Every live connection, announced or not
    connections: BTreeSet<ConnectionId>,
    /// Connection ID → presence entry (the Online Set)
    online: BTreeMap<ConnectionId, PresenceEntry>,
}

impl ConnectionRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection.
    ///
    /// Returns `false` if the connection ID is already in use.
    pub fn register_connection(&mut self, connection_id: ConnectionId) -> bool {
        self.connections.insert(connection_id)
    }

    /// Unregister a connection and drop its presence entry.
    ///
    /// Returns `None` if the connection was not registered, so a second
    /// teardown of the same connection is a no-op.
    pub fn unregister_connection(&mut self, connection_id: &ConnectionId) -> Option<Departure> {
        if !self.connections.remove(connection_id) {
            return None;
        }

        Some(Departure { presence: self.online.remove(connection_id) })
    }

    /// Insert or overwrite a connection's presence entry.
    ///
    /// Returns the stored entry, or `None` if the connection is not
    /// registered.
    pub fn announce(
        &mut self,
        connection_id: &ConnectionId,
        descriptor: Descriptor,
    ) -> Option<&PresenceEntry> {
        if !self.connections.contains(connection_id) {
            return None;
        }

        let entry = PresenceEntry::new(connection_id.clone(), descriptor);
        self.online.insert(connection_id.clone(), entry);
        self.online.get(connection_id)
    }

    /// Presence entry for a connection. `None` if it has not announced.
    pub fn presence(&self, connection_id: &ConnectionId) -> Option<&PresenceEntry> {
        self.online.get(connection_id)
    }

    /// Check if a connection is registered.
    pub fn is_connected(&self, connection_id: &ConnectionId) -> bool {
        self.connections.contains(connection_id)
    }

    /// The full Online Set as a list of entries.
    pub fn snapshot(&self) -> Vec<PresenceEntry> {
        self.online.values().cloned().collect()
    }

    /// All live connections.
    pub fn connections(&self) -> impl Iterator<Item = &ConnectionId> + '_ {
        self.connections.iter()
    }

    /// Total number of live connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Number of connections in the Online Set.
    pub fn online_count(&self) -> usize {
        self.online.len()
    }
}

#[cfg(test)]
mod tests {
    use ciborium::Value;
    use switchboard_proto::CONNECTION_ID_KEY;

    use super::*;

    fn id(s: &str) -> ConnectionId {
        ConnectionId::from(s)
    }

    fn named(name: &str) -> Descriptor {
        Descriptor::new().with("name", name)
    }

    #[test]
    fn register_and_lookup_connection() {
        let mut registry = ConnectionRegistry::new();

        assert!(registry.register_connection(id("a")));
        assert!(registry.is_connected(&id("a")));
        assert!(!registry.is_connected(&id("b")));
        assert!(registry.presence(&id("a")).is_none());
    }

    #[test]
    fn register_duplicate_connection_fails() {
        let mut registry = ConnectionRegistry::new();

        assert!(registry.register_connection(id("a")));
        assert!(!registry.register_connection(id("a")));
        assert_eq!(registry.connection_count(), 1);
    }

    #[test]
    fn announce_merges_connection_id() {
        let mut registry = ConnectionRegistry::new();
        registry.register_connection(id("a"));

        let entry = registry.announce(&id("a"), named("alice")).unwrap();
        assert_eq!(entry.connection_id(), &id("a"));
        assert_eq!(entry.get(CONNECTION_ID_KEY).and_then(Value::as_text), Some("a"));
        assert_eq!(registry.online_count(), 1);
    }

    #[test]
    fn announce_overwrites_previous_entry() {
        let mut registry = ConnectionRegistry::new();
        registry.register_connection(id("a"));

        registry.announce(&id("a"), named("alice"));
        registry.announce(&id("a"), named("alicia"));

        assert_eq!(registry.online_count(), 1);
        let entry = registry.presence(&id("a")).unwrap();
        assert_eq!(entry.get("name").and_then(Value::as_text), Some("alicia"));
    }

    #[test]
    fn announce_from_unregistered_connection_fails() {
        let mut registry = ConnectionRegistry::new();

        assert!(registry.announce(&id("ghost"), named("ghost")).is_none());
        assert_eq!(registry.online_count(), 0);
    }

    #[test]
    fn unregister_removes_presence() {
        let mut registry = ConnectionRegistry::new();
        registry.register_connection(id("a"));
        registry.register_connection(id("b"));
        registry.announce(&id("a"), named("alice"));
        registry.announce(&id("b"), named("bob"));

        let departure = registry.unregister_connection(&id("a")).unwrap();
        assert_eq!(departure.presence.map(|e| e.connection_id().clone()), Some(id("a")));

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].connection_id(), &id("b"));
    }

    #[test]
    fn unregister_without_announce() {
        let mut registry = ConnectionRegistry::new();
        registry.register_connection(id("a"));

        let departure = registry.unregister_connection(&id("a")).unwrap();
        assert!(departure.presence.is_none());
        assert_eq!(registry.connection_count(), 0);
    }

    #[test]
    fn unregister_twice_is_noop() {
        let mut registry = ConnectionRegistry::new();
        registry.register_connection(id("a"));

        assert!(registry.unregister_connection(&id("a")).is_some());
        assert!(registry.unregister_connection(&id("a")).is_none());
    }

    #[test]
    fn snapshot_keys_match_entries() {
        let mut registry = ConnectionRegistry::new();
        for name in ["c", "a", "b"] {
            registry.register_connection(id(name));
            registry.announce(&id(name), named(name));
        }
        registry.register_connection(id("silent"));

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 3);
        for entry in &snapshot {
            assert_eq!(entry.get(CONNECTION_ID_KEY).and_then(Value::as_text), Some(entry.connection_id().as_str()));
        }
        assert_eq!(registry.connections().count(), 4);
    }
}
