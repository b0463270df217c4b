use dashmap::{mapref::entry::Entry, DashMap};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::types::ServerEvent;

pub type WsSender = mpsc::UnboundedSender<ServerEvent>;
pub type ConnectionId = Uuid;

/// Routing table from user identity to that user's open connections.
///
/// A user is present in the table exactly while at least one of their
/// connections is registered. This is the only answer to "is this user online".
#[derive(Clone, Default)]
pub struct PresenceRegistry {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    groups: DashMap<Uuid, HashMap<ConnectionId, WsSender>>,
    owners: DashMap<ConnectionId, Uuid>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to the user's presence group
    pub fn register(&self, user_id: Uuid, sender: WsSender) -> ConnectionId {
        let connection_id = Uuid::new_v4();

        self.inner
            .groups
            .entry(user_id)
            .or_default()
            .insert(connection_id, sender);
        self.inner.owners.insert(connection_id, user_id);

        tracing::info!("User {} connected via WebSocket ({})", user_id, connection_id);
        connection_id
    }

    /// Remove exactly this connection. Returns the owner if that was their last one.
    pub fn unregister(&self, connection_id: &ConnectionId) -> Option<Uuid> {
        let (_, user_id) = self.inner.owners.remove(connection_id)?;

        let went_offline = match self.inner.groups.entry(user_id) {
            Entry::Occupied(mut group) => {
                group.get_mut().remove(connection_id);
                if group.get().is_empty() {
                    group.remove();
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(_) => true,
        };

        tracing::info!("User {} disconnected from WebSocket ({})", user_id, connection_id);
        went_offline.then_some(user_id)
    }

    /// Send an event to every open connection of a user.
    /// Returns how many connections accepted it; an offline user is not an error.
    pub fn emit(&self, user_id: &Uuid, event: ServerEvent) -> usize {
        let Some(group) = self.inner.groups.get(user_id) else {
            return 0;
        };

        group
            .values()
            .filter(|sender| sender.send(event.clone()).is_ok())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::types::TypingPayload;

    fn typing() -> ServerEvent {
        ServerEvent::Typing(TypingPayload { from: Uuid::new_v4() })
    }

    #[test]
    fn test_emit_reaches_every_connection_of_user() {
        let presence = PresenceRegistry::new();
        let user = Uuid::new_v4();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();

        presence.register(user, tx1);
        presence.register(user, tx2);

        assert_eq!(presence.emit(&user, typing()), 2);
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn test_unregister_removes_only_that_connection() {
        let presence = PresenceRegistry::new();
        let user = Uuid::new_v4();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();

        let first = presence.register(user, tx1);
        let second = presence.register(user, tx2);

        assert_eq!(presence.unregister(&first), None);
        assert_eq!(presence.emit(&user, typing()), 1);
        assert!(rx1.try_recv().is_err());
        assert!(rx2.try_recv().is_ok());

        assert_eq!(presence.unregister(&second), Some(user));
        assert_eq!(presence.emit(&user, typing()), 0);
    }

    #[test]
    fn test_emit_to_offline_user_is_dropped() {
        let presence = PresenceRegistry::new();
        assert_eq!(presence.emit(&Uuid::new_v4(), typing()), 0);
    }

    #[test]
    fn test_unregister_unknown_connection_is_noop() {
        let presence = PresenceRegistry::new();
        let user = Uuid::new_v4();
        let (tx, _rx) = mpsc::unbounded_channel();
        presence.register(user, tx);

        assert_eq!(presence.unregister(&Uuid::new_v4()), None);
        assert_eq!(presence.emit(&user, typing()), 1);
    }

    #[test]
    fn test_users_are_isolated() {
        let presence = PresenceRegistry::new();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        presence.register(alice, tx_a);
        presence.register(bob, tx_b);

        presence.emit(&alice, typing());

        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_concurrent_register_and_unregister() {
        let presence = PresenceRegistry::new();
        let user = Uuid::new_v4();

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let presence = presence.clone();
                tokio::spawn(async move {
                    let (tx, _rx) = mpsc::unbounded_channel();
                    let id = presence.register(user, tx);
                    tokio::task::yield_now().await;
                    presence.unregister(&id)
                })
            })
            .collect();

        let mut offline_signals = 0;
        for handle in handles {
            if handle.await.unwrap().is_some() {
                offline_signals += 1;
            }
        }

        assert!(offline_signals >= 1);
        assert_eq!(presence.emit(&user, typing()), 0);
    }
}
