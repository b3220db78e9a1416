//! Connection multiplexing: the live-connection registry and the
//! per-connection WebSocket handler.

mod handler;
mod registry;

pub use handler::handle_connection;
pub use registry::{
    ConnectionHandle, ConnectionId, ConnectionLimits, ConnectionRegistry,
    DEFAULT_INBOUND_QUEUE_CAPACITY, DEFAULT_MAX_MESSAGE_BYTES, DEFAULT_SEND_CHANNEL_CAPACITY,
};
