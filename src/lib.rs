//! # memstate-client
//!
//! Rust client for a remote Memstate engine.
//!
//! The engine holds an in-memory model and applies commands to it; this
//! crate sends commands and queries over TCP and receives the domain events
//! those commands raise.
//!
//! ## Architecture
//!
//! - **Wire** ([`protocol`]): length-prefixed frames with a sequence number
//! - **Envelope** ([`message`]): one tagged message per frame, serialized by a
//!   [`Codec`](codec::Codec) (MsgPack by default)
//! - **Writer task** ([`writer`]): the only task that writes to the socket
//! - **Reader task**: routes responses to waiting callers and events to
//!   subscription handlers
//!
//! When the connection drops, every waiting request fails with
//! [`MemstateError::ConnectionClosed`].
//!
//! ## Example
//!
//! ```ignore
//! use memstate_client::{Command, RemoteClient};
//! use serde::Serialize;
//!
//! #[derive(Serialize)]
//! struct Create { name: String }
//!
//! impl Command for Create {
//!     const TYPE: &'static str = "Users.Create";
//!     type Output = u64;
//! }
//!
//! #[tokio::main]
//! async fn main() -> memstate_client::Result<()> {
//!     let client = RemoteClient::connect("localhost", 3001).await?;
//!     let id = client.execute(&Create { name: "Ada".into() }).await?;
//!     println!("created user {id}");
//!     client.close().await;
//!     Ok(())
//! }
//! ```

pub mod blocking;
pub mod codec;
pub mod config;
pub mod correlation;
pub mod error;
pub mod handler;
pub mod message;
pub mod model;
pub mod protocol;
pub mod transport;
pub mod writer;

mod client;
mod inbound;
mod state;

pub use client::{ClientBuilder, RemoteClient};
pub use config::ClientConfig;
pub use error::{MemstateError, Result};
pub use model::{Command, Event, EventFilter, Query};
pub use state::ConnectionState;
