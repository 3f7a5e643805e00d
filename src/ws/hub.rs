//! Live connection handles and outbound fan-out

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::ws::protocol::ServerMsg;

/// Outbound side of one connection
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub id: Uuid,
    tx: mpsc::Sender<ServerMsg>,
}

/// Every live connection, keyed by session id.
///
/// Sends never wait: each connection drains its own queue on its writer task,
/// and a full queue drops the message for that connection only.
#[derive(Debug)]
pub struct ConnectionHub {
    connections: DashMap<Uuid, ConnectionHandle>,
    queue_capacity: usize,
}

impl ConnectionHub {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            connections: DashMap::new(),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Add a connection; the receiver feeds its writer task
    pub fn attach(&self, id: Uuid) -> mpsc::Receiver<ServerMsg> {
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        self.connections.insert(id, ConnectionHandle { id, tx });
        rx
    }

    /// Drop the connection's queue. Its writer task ends once the queue drains.
    pub fn detach(&self, id: Uuid) -> bool {
        self.connections.remove(&id).is_some()
    }

    #[cfg(test)]
    pub fn is_attached(&self, id: Uuid) -> bool {
        self.connections.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Queue a message for one connection
    pub fn send_to(&self, id: Uuid, msg: ServerMsg) -> bool {
        let Some(handle) = self.connections.get(&id).map(|h| h.value().clone()) else {
            debug!(connection_id = %id, "Send to detached connection dropped");
            return false;
        };
        Self::enqueue(&handle, msg)
    }

    /// Queue a message for every connection
    pub fn broadcast(&self, msg: &ServerMsg) -> usize {
        self.fan_out(None, msg)
    }

    /// Queue a message for every connection except `sender`
    pub fn broadcast_except(&self, sender: Uuid, msg: &ServerMsg) -> usize {
        self.fan_out(Some(sender), msg)
    }

    fn fan_out(&self, skip: Option<Uuid>, msg: &ServerMsg) -> usize {
        // Collect first so no shard lock is held while sending
        let targets: Vec<ConnectionHandle> = self
            .connections
            .iter()
            .filter(|entry| Some(*entry.key()) != skip)
            .map(|entry| entry.value().clone())
            .collect();

        targets
            .iter()
            .filter(|handle| Self::enqueue(handle, msg.clone()))
            .count()
    }

    fn enqueue(handle: &ConnectionHandle, msg: ServerMsg) -> bool {
        match handle.tx.try_send(msg) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(connection_id = %handle.id, "Outbound queue full, dropping message");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(connection_id = %handle.id, "Outbound queue closed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pong() -> ServerMsg {
        ServerMsg::Pong { timestamp: 1.0 }
    }

    #[tokio::test]
    async fn broadcast_except_skips_sender() {
        let hub = ConnectionHub::new(8);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let mut rx_a = hub.attach(a);
        let mut rx_b = hub.attach(b);
        let mut rx_c = hub.attach(c);

        assert_eq!(hub.broadcast_except(a, &pong()), 2);

        assert!(rx_a.try_recv().is_err());
        assert_eq!(rx_b.recv().await, Some(pong()));
        assert_eq!(rx_c.recv().await, Some(pong()));
    }

    #[tokio::test]
    async fn broadcast_reaches_everyone() {
        let hub = ConnectionHub::new(8);
        let mut receivers: Vec<_> = (0..3).map(|_| hub.attach(Uuid::new_v4())).collect();

        assert_eq!(hub.broadcast(&pong()), 3);
        for rx in &mut receivers {
            assert_eq!(rx.recv().await, Some(pong()));
        }
    }

    #[tokio::test]
    async fn full_queue_drops_without_blocking() {
        let hub = ConnectionHub::new(1);
        let id = Uuid::new_v4();
        let mut rx = hub.attach(id);

        assert!(hub.send_to(id, pong()));
        assert!(!hub.send_to(id, ServerMsg::Pong { timestamp: 2.0 }));
        assert_eq!(rx.recv().await, Some(pong()));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn detach_closes_queue() {
        let hub = ConnectionHub::new(4);
        let id = Uuid::new_v4();
        let mut rx = hub.attach(id);

        assert!(hub.send_to(id, pong()));
        assert!(hub.detach(id));
        assert!(!hub.is_attached(id));
        assert!(!hub.send_to(id, pong()));

        // Queued messages still drain, then the queue reports closed
        assert_eq!(rx.recv().await, Some(pong()));
        assert_eq!(rx.recv().await, None);
        assert_eq!(hub.len(), 0);
    }
}
