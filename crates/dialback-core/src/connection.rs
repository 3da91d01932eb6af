//! Connection state and the generation-checked connection arena.

use dialback_types::{AuthMethod, AuthState, Direction, StreamId};
use std::collections::HashMap;

/// Non-owning reference to a connection in a [`ConnectionTable`].
///
/// A handle stays valid until its connection is removed; after that it
/// resolves to `None` even if the slot is reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnHandle {
    index: u32,
    generation: u32,
}

impl std::fmt::Display for ConnHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

/// Authentication bookkeeping for one remote domain on a connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainRecord {
    pub authenticated: bool,
    /// Key the peer asserted for this domain, held until a verdict arrives.
    pub pending_key: Option<String>,
    /// The assertion arrived for a domain other than the stream's own.
    pub multiplexed: bool,
}

/// A server-to-server stream as seen by the dialback layer.
#[derive(Debug, Clone)]
pub struct Connection {
    pub direction: Direction,
    pub state: AuthState,
    pub auth_method: AuthMethod,
    pub stream_id: StreamId,
    /// Transport is encrypted.
    pub secure: bool,
    /// Our domain on this stream.
    pub local_domain: Option<String>,
    /// The peer's domain on this stream.
    pub remote_domain: Option<String>,
    /// Remote domain -> authentication record.
    pub domains: HashMap<String, DomainRecord>,
    /// Connection this outbound stream shares authentication with.
    pub multiplex_parent: Option<ConnHandle>,
    /// Peer declared the dialback namespace on its stream header.
    pub peer_declares_dialback: bool,
    /// Peer advertised graceful dialback errors.
    pub peer_dialback_errors: bool,
    /// Dialback may be used on this stream.
    pub dialback_capable: bool,
    /// Key we asserted on this outbound stream.
    pub asserted_key: Option<String>,
}

impl Connection {
    fn new(direction: Direction, stream_id: StreamId, secure: bool) -> Self {
        Self {
            direction,
            state: AuthState::Unauthenticated,
            auth_method: AuthMethod::None,
            stream_id,
            secure,
            local_domain: None,
            remote_domain: None,
            domains: HashMap::new(),
            multiplex_parent: None,
            peer_declares_dialback: false,
            peer_dialback_errors: false,
            dialback_capable: false,
            asserted_key: None,
        }
    }

    /// A stream a peer opened to us. Domains are learned from its messages.
    pub fn inbound(stream_id: StreamId, secure: bool) -> Self {
        Self::new(Direction::Inbound, stream_id, secure)
    }

    /// A stream we opened from `local` to `remote`.
    pub fn outbound(stream_id: StreamId, local: &str, remote: &str, secure: bool) -> Self {
        Self {
            local_domain: Some(local.to_string()),
            remote_domain: Some(remote.to_string()),
            ..Self::new(Direction::Outbound, stream_id, secure)
        }
    }

    /// Marks that the peer declared the dialback namespace.
    pub fn with_dialback_namespace(mut self) -> Self {
        self.peer_declares_dialback = true;
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == AuthState::Authenticated
    }

    /// Whether `domain` has been authenticated on this stream.
    pub fn is_domain_authenticated(&self, domain: &str) -> bool {
        self.domains.get(domain).is_some_and(|r| r.authenticated)
    }
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    connection: Option<Connection>,
}

/// Arena of live connections.
///
/// Slots are reused after removal; each reuse bumps the slot generation so
/// stale handles never reach the new occupant.
#[derive(Debug, Default)]
pub struct ConnectionTable {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl ConnectionTable {
    pub fn insert(&mut self, connection: Connection) -> ConnHandle {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.connection = Some(connection);
            return ConnHandle {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            connection: Some(connection),
        });
        ConnHandle {
            index,
            generation: 0,
        }
    }

    pub fn get(&self, handle: ConnHandle) -> Option<&Connection> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.connection.as_ref())
    }

    pub fn get_mut(&mut self, handle: ConnHandle) -> Option<&mut Connection> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.connection.as_mut())
    }

    pub fn is_live(&self, handle: ConnHandle) -> bool {
        self.get(handle).is_some()
    }

    /// Removes a connection and invalidates every handle to it.
    pub fn remove(&mut self, handle: ConnHandle) -> Option<Connection> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let connection = slot.connection.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        Some(connection)
    }

    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates over live connections.
    pub fn iter(&self) -> impl Iterator<Item = (ConnHandle, &Connection)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.connection.as_ref().map(|connection| {
                (
                    ConnHandle {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    connection,
                )
            })
        })
    }

    /// Routing lookup: our outgoing stream from `local` to `remote`.
    pub fn find_outbound(&self, local: &str, remote: &str) -> Option<ConnHandle> {
        self.iter()
            .find(|(_, c)| {
                c.direction == Direction::Outbound
                    && c.local_domain.as_deref() == Some(local)
                    && c.remote_domain.as_deref() == Some(remote)
            })
            .map(|(handle, _)| handle)
    }

    /// Routing lookup: the peer's incoming stream from `remote` to `local`,
    /// matched on the stream's own domains (not multiplexed ones).
    pub fn find_inbound(&self, local: &str, remote: &str) -> Option<ConnHandle> {
        self.iter()
            .find(|(_, c)| {
                c.direction == Direction::Inbound
                    && c.local_domain.as_deref() == Some(local)
                    && c.remote_domain.as_deref() == Some(remote)
            })
            .map(|(handle, _)| handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inbound() -> Connection {
        Connection::inbound(StreamId::from("sid"), true)
    }

    #[test]
    fn insert_and_get() {
        let mut table = ConnectionTable::default();
        let handle = table.insert(inbound());
        assert!(table.is_live(handle));
        assert_eq!(table.get(handle).unwrap().stream_id.as_str(), "sid");
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn removed_handle_is_stale() {
        let mut table = ConnectionTable::default();
        let handle = table.insert(inbound());
        assert!(table.remove(handle).is_some());
        assert!(table.get(handle).is_none());
        assert!(table.remove(handle).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn reused_slot_does_not_resurrect_old_handle() {
        let mut table = ConnectionTable::default();
        let old = table.insert(inbound());
        table.remove(old);
        let new = table.insert(Connection::inbound(StreamId::from("other"), false));
        assert_ne!(old, new);
        assert!(table.get(old).is_none());
        assert!(table.get_mut(old).is_none());
        assert_eq!(table.get(new).unwrap().stream_id.as_str(), "other");
    }

    #[test]
    fn routing_lookups_match_direction_and_domains() {
        let mut table = ConnectionTable::default();
        let out = table.insert(Connection::outbound(
            StreamId::from("o"),
            "a.example",
            "b.example",
            true,
        ));
        let mut incoming = inbound();
        incoming.local_domain = Some("a.example".to_string());
        incoming.remote_domain = Some("b.example".to_string());
        let inc = table.insert(incoming);

        assert_eq!(table.find_outbound("a.example", "b.example"), Some(out));
        assert_eq!(table.find_inbound("a.example", "b.example"), Some(inc));
        assert_eq!(table.find_outbound("b.example", "a.example"), None);
        assert_eq!(table.find_inbound("a.example", "c.example"), None);
    }

    #[test]
    fn iter_skips_removed() {
        let mut table = ConnectionTable::default();
        let a = table.insert(inbound());
        let b = table.insert(inbound());
        table.remove(a);
        let handles: Vec<_> = table.iter().map(|(h, _)| h).collect();
        assert_eq!(handles, vec![b]);
    }
}
