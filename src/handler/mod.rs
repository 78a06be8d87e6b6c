//! Handler module - event subscriptions and dispatch.
//!
//! Provides:
//! - [`SubscriptionRegistry`] - maps event type tags to handlers
//! - [`TypedHandler`] - decodes the event body before calling user code
//!
//! Handlers run synchronously on the connection's reader task, one event at
//! a time and in arrival order. A slow handler delays every response and
//! event behind it.

mod registry;

pub(crate) use registry::RegistrationGuard;
pub use registry::{EventHandler, SharedHandler, SubscriptionRegistry, TypedHandler};
