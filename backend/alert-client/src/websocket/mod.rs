/// Real-time alert transport
///
/// Architecture:
/// 1. ConnectionManager: owns the single gateway connection of a session
/// 2. Messages: JSON event frames exchanged with the gateway
/// 3. Transport: pluggable connector, WebSocket in production
/// 4. ConnectionListener: callbacks the layer above implements

pub mod manager;
pub mod messages;
pub mod transport;

pub use manager::{ConnectOutcome, ConnectionListener, ConnectionManager, ConnectionOptions};
pub use messages::{AcknowledgePayload, ClientEvent, ServerEvent};
pub use transport::{Connector, InboundFrame, Transport, WebSocketConnector};
