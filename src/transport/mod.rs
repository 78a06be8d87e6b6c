//! Transport module - establishing the byte stream to the engine.
//!
//! The client itself works over any `AsyncRead + AsyncWrite` stream (see
//! [`RemoteClient::from_stream`](crate::RemoteClient::from_stream)); this
//! module provides the TCP connection used by default.

mod tcp;

pub use tcp::connect;
