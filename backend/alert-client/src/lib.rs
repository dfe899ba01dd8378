pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod session;
pub mod store;
pub mod websocket;

pub use config::Config;
pub use error::{AlertError, Result};
pub use models::{Alert, ConnectionState, Notification, Severity};
pub use session::{FileSession, SessionStore, StaticSession};
pub use store::{NotificationStore, StoreOptions, StorePhase, Toast};
pub use websocket::{ConnectionListener, ConnectionManager, ConnectionOptions, WebSocketConnector};
