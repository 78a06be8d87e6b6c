//! Traits implemented by user-defined commands, queries, events and filters.
//!
//! Each type carries a stable `TYPE` tag. The engine resolves the tag to its
//! own type; the client uses it to route events to handlers.
//!
//! # Example
//!
//! ```
//! use memstate_client::{Command, Event};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct User {
//!     id: u64,
//!     name: String,
//! }
//!
//! #[derive(Serialize)]
//! struct Create {
//!     name: String,
//! }
//!
//! impl Command for Create {
//!     const TYPE: &'static str = "users.Create";
//!     type Output = User;
//! }
//!
//! #[derive(Serialize, Deserialize)]
//! struct Created {
//!     user_id: u64,
//! }
//!
//! impl Event for Created {
//!     const TYPE: &'static str = "users.Created";
//! }
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;

/// A request that mutates engine state.
///
/// Commands with nothing to return use `type Output = ();` and are usually
/// sent with [`RemoteClient::submit`](crate::RemoteClient::submit).
pub trait Command: Serialize + Send + Sync {
    /// Stable type tag.
    const TYPE: &'static str;
    /// Result returned by the engine.
    type Output: DeserializeOwned + Send + 'static;
}

/// A read-only request against engine state.
pub trait Query: Serialize + Send + Sync {
    /// Stable type tag.
    const TYPE: &'static str;
    /// Result returned by the engine.
    type Output: DeserializeOwned + Send + 'static;
}

/// A fact raised by the engine as a result of a command.
pub trait Event: Serialize + DeserializeOwned + Send + 'static {
    /// Stable type tag.
    const TYPE: &'static str;
}

/// Predicate sent with a subscription and evaluated by the engine.
///
/// Events the filter rejects are never sent to this client.
pub trait EventFilter: Serialize + Send + Sync {
    /// Stable type tag.
    const TYPE: &'static str;
}
