// Connection layer: transports, backoff and the manager that drives them
mod backoff;
mod manager;
mod memory;
mod state;
mod transport;
mod websocket;

pub use backoff::BackoffPolicy;
pub use manager::ConnectionManager;
pub use memory::{ChannelServer, ChannelTransport, ServerEnd};
pub use state::{ConnectionState, ConnectionStatus, LiveIndicator};
pub use transport::{Connection, Transport};
pub use websocket::WebSocketTransport;
