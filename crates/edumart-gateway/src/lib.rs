//! Realtime WebSocket gateway.
//!
//! Connections join rooms (`institution:<id>`, `institutionAdmin:<id>`,
//! `student:<id>`, `branch:<id>`, `program:<id>`, `admin:<id>`) and
//! receive the events the workers and watchers publish to those rooms.

pub mod config;
pub mod hub;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod ws;

pub use config::GatewayConfig;
pub use hub::RoomHub;
pub use routes::create_router;
pub use state::AppState;
