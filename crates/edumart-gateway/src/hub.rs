//! Room registry: one broadcast channel per joined room, fed from the
//! Redis room channel.
//!
//! The hub is constructed once at startup and shared by `Arc`; there is
//! no ambient global. Emitting to a room nobody joined is a silent
//! no-op.

use std::collections::HashMap;

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, warn};

use edumart_models::{RealtimeEvent, Room};
use edumart_queue::RoomChannel;

use crate::metrics;

/// Per-room broadcast capacity. Slow consumers past this lag and drop.
const ROOM_CHANNEL_CAPACITY: usize = 256;

pub struct RoomHub {
    rooms: RwLock<HashMap<String, broadcast::Sender<RealtimeEvent>>>,
    channel: RoomChannel,
}

impl RoomHub {
    pub fn new(channel: RoomChannel) -> Arc<Self> {
        Arc::new(Self {
            rooms: RwLock::new(HashMap::new()),
            channel,
        })
    }

    /// Join a room: returns a receiver of its events. The first join
    /// creates the room entry and starts its upstream forwarder.
    pub async fn join(self: &Arc<Self>, room: &Room) -> broadcast::Receiver<RealtimeEvent> {
        let key = room.key();
        {
            let rooms = self.rooms.read().await;
            if let Some(tx) = rooms.get(&key) {
                return tx.subscribe();
            }
        }

        let mut rooms = self.rooms.write().await;
        // Re-check: another connection may have created the room while
        // we waited for the write lock.
        if let Some(tx) = rooms.get(&key) {
            return tx.subscribe();
        }

        let (tx, rx) = broadcast::channel(ROOM_CHANNEL_CAPACITY);
        rooms.insert(key, tx.clone());
        metrics::set_rooms_active(rooms.len());

        let hub = Arc::clone(self);
        let room = room.clone();
        tokio::spawn(async move {
            hub.forward_room(room, tx).await;
        });

        rx
    }

    /// Fire-and-forget local emit. No delivery acknowledgment; a room
    /// with no subscribers swallows the event.
    pub async fn emit_to_room(&self, room: &Room, event: RealtimeEvent) {
        let rooms = self.rooms.read().await;
        if let Some(tx) = rooms.get(&room.key()) {
            let _ = tx.send(event);
        }
    }

    /// Number of live room entries.
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Pump Redis events for one room into its local channel until the
    /// last receiver is gone.
    async fn forward_room(self: Arc<Self>, room: Room, tx: broadcast::Sender<RealtimeEvent>) {
        let key = room.key();
        let mut stream = match self.channel.subscribe(&room).await {
            Ok(stream) => stream,
            Err(e) => {
                // The room stays usable for local emission; upstream
                // events resume after a rejoin.
                warn!("Room {} has no upstream subscription: {}", key, e);
                return;
            }
        };

        debug!("Forwarding upstream events for room {}", key);
        while let Some(event) = stream.next().await {
            if tx.send(event).is_err() {
                debug!("Last subscriber left room {}", key);
                break;
            }
        }

        let mut rooms = self.rooms.write().await;
        if let Some(existing) = rooms.get(&key) {
            if existing.receiver_count() == 0 {
                rooms.remove(&key);
                metrics::set_rooms_active(rooms.len());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::TryRecvError;

    fn hub() -> Arc<RoomHub> {
        // Connections are lazy: no Redis is reached until a forwarder
        // subscribes, and a failed forwarder leaves local routing alive.
        RoomHub::new(RoomChannel::new("redis://127.0.0.1:1").unwrap())
    }

    #[tokio::test]
    async fn events_reach_only_the_published_room() {
        let hub = hub();
        let room_x = Room::Institution("x".to_string());
        let room_y = Room::Institution("y".to_string());

        let mut rx_x = hub.join(&room_x).await;
        let mut rx_y = hub.join(&room_y).await;

        let event = RealtimeEvent::course_views_updated("x", "c1", 5);
        hub.emit_to_room(&room_x, event.clone()).await;

        assert_eq!(rx_x.recv().await.unwrap(), event);
        assert!(matches!(rx_y.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn emitting_to_an_unjoined_room_is_a_silent_noop() {
        let hub = hub();
        let room = Room::Student("nobody".to_string());
        hub.emit_to_room(&room, RealtimeEvent::InstitutionAdminTotalViews { total_views: 1 })
            .await;
        assert_eq!(hub.room_count().await, 0);
    }

    #[tokio::test]
    async fn joining_twice_shares_one_room_entry() {
        let hub = hub();
        let room = Room::Branch("b1".to_string());

        let mut rx_1 = hub.join(&room).await;
        let mut rx_2 = hub.join(&room).await;
        assert_eq!(hub.room_count().await, 1);

        let event = RealtimeEvent::InstitutionAdminTotalLeads { total_leads: 4 };
        hub.emit_to_room(&room, event.clone()).await;

        assert_eq!(rx_1.recv().await.unwrap(), event);
        assert_eq!(rx_2.recv().await.unwrap(), event);
    }
}
