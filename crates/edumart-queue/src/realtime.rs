//! Room events via Redis Pub/Sub.
//!
//! Workers and watchers publish [`RealtimeEvent`]s to per-room channels;
//! the gateway subscribes and forwards to its WebSocket connections.
//! Publishing to a room nobody subscribes to is a silent no-op.

use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::debug;

use edumart_models::{RealtimeEvent, Room};

use crate::error::QueueResult;

/// The publish half of the broadcast layer, shared by reference with
/// every worker and watcher at construction time.
#[async_trait]
pub trait RealtimePublisher: Send + Sync + 'static {
    /// Fire-and-forget publish; no delivery acknowledgment.
    async fn emit_to_room(&self, room: &Room, event: &RealtimeEvent) -> QueueResult<()>;
}

/// Redis-backed room channel.
#[derive(Clone)]
pub struct RoomChannel {
    client: redis::Client,
    prefix: String,
}

impl RoomChannel {
    /// Create a new room channel.
    pub fn new(redis_url: &str) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            prefix: "edumart".to_string(),
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        Self::new(&redis_url)
    }

    /// Get the pub/sub channel name for a room.
    pub fn channel_name(&self, room: &Room) -> String {
        format!("{}:room:{}", self.prefix, room.key())
    }

    /// Publish an event to a room.
    pub async fn publish(&self, room: &Room, event: &RealtimeEvent) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let channel = self.channel_name(room);
        let payload = serde_json::to_string(event)?;

        debug!("Publishing {} to {}", event.event_name(), channel);
        conn.publish::<_, _, ()>(channel, payload).await?;

        metrics::counter!("edumart_room_events_published_total", "event" => event.event_name())
            .increment(1);
        Ok(())
    }

    /// Subscribe to a room's events.
    /// Returns a pinned stream that can be polled with `.next()`.
    pub async fn subscribe(
        &self,
        room: &Room,
    ) -> QueueResult<std::pin::Pin<Box<dyn futures_util::Stream<Item = RealtimeEvent> + Send>>>
    {
        use futures_util::StreamExt;

        let mut pubsub = self.client.get_async_pubsub().await?;
        let channel = self.channel_name(room);

        pubsub.subscribe(&channel).await?;

        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            let payload: String = msg.get_payload().ok()?;
            serde_json::from_str(&payload).ok()
        });

        Ok(Box::pin(stream))
    }
}

#[async_trait]
impl RealtimePublisher for RoomChannel {
    async fn emit_to_room(&self, room: &Room, event: &RealtimeEvent) -> QueueResult<()> {
        self.publish(room, event).await
    }
}
