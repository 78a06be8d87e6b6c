//! Client configuration.
//!
//! [`ClientConfig`] holds everything needed to open a connection. It can be
//! built with the fluent [`ClientBuilder`](crate::ClientBuilder) or
//! deserialized from a config file; missing fields take their defaults.
//!
//! ```
//! use memstate_client::ClientConfig;
//!
//! let config: ClientConfig = serde_json::from_str(r#"{ "port": 4000 }"#).unwrap();
//! assert_eq!(config.host, "localhost");
//! assert_eq!(config.port, 4000);
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::protocol::DEFAULT_MAX_PAYLOAD_SIZE;
use crate::writer::{WriterConfig, DEFAULT_CHANNEL_CAPACITY};

/// Default engine host.
pub const DEFAULT_HOST: &str = "localhost";

/// Default engine port.
pub const DEFAULT_PORT: u16 = 3001;

/// Connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Engine host name or address.
    pub host: String,
    /// Engine TCP port.
    pub port: u16,
    /// Capacity of the outbound message queue.
    pub channel_capacity: usize,
    /// Largest frame payload accepted in either direction.
    pub max_payload_size: u32,
    /// Per-request deadline. `None` waits until the response or disconnect.
    pub request_timeout: Option<Duration>,
}

impl ClientConfig {
    /// `host:port` string to dial.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub(crate) fn writer_config(&self) -> WriterConfig {
        WriterConfig {
            channel_capacity: self.channel_capacity,
            max_payload_size: self.max_payload_size,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            request_timeout: None,
        }
    }
}
