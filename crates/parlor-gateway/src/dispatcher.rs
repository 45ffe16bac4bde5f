use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use parlor_types::events::ServerEvent;
use parlor_types::models::SessionUser;

/// A bound realtime connection as seen by the registry.
struct BoundConnection {
    user: SessionUser,
    tx: mpsc::UnboundedSender<ServerEvent>,
}

/// Registry of every live, authenticated connection. Owns the broadcast group.
#[derive(Clone, Default)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

#[derive(Default)]
struct DispatcherInner {
    /// conn_id -> bound connection
    connections: RwLock<HashMap<Uuid, BoundConnection>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to the broadcast group. Returns (conn_id, receiver).
    pub async fn register(&self, user: SessionUser) -> (Uuid, mpsc::UnboundedReceiver<ServerEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .connections
            .write()
            .await
            .insert(conn_id, BoundConnection { user, tx });
        (conn_id, rx)
    }

    /// Remove a connection. Returns the user it was bound to, if it was registered.
    pub async fn unregister(&self, conn_id: Uuid) -> Option<SessionUser> {
        self.inner
            .connections
            .write()
            .await
            .remove(&conn_id)
            .map(|conn| conn.user)
    }

    /// Deliver an event to every registered connection, sender included.
    /// Returns how many connections accepted it.
    pub async fn broadcast(&self, event: ServerEvent) -> usize {
        let connections = self.inner.connections.read().await;
        connections
            .values()
            .filter(|conn| conn.tx.send(event.clone()).is_ok())
            .count()
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.connections.read().await.len()
    }
}
