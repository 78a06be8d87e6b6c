//! Subscription registry for dispatching events by type tag.
//!
//! The registry maps event type tags to handlers. At most one handler is
//! active per tag; registering again replaces the previous handler.
//!
//! # Example
//!
//! ```
//! use memstate_client::codec::MsgPackCodec;
//! use memstate_client::handler::{EventHandler, SubscriptionRegistry, TypedHandler};
//! use memstate_client::message::Payload;
//! use memstate_client::Event;
//! use serde::{Deserialize, Serialize};
//! use std::sync::Arc;
//!
//! #[derive(Serialize, Deserialize)]
//! struct Created {
//!     user_id: u64,
//! }
//!
//! impl Event for Created {
//!     const TYPE: &'static str = "users.Created";
//! }
//!
//! let registry = SubscriptionRegistry::new();
//! let handler = TypedHandler::<MsgPackCodec, Created, _>::new(|e: Created| {
//!     assert_eq!(e.user_id, 7);
//! });
//! registry.insert(Created::TYPE, Arc::new(handler));
//!
//! let event = Payload::encode::<MsgPackCodec, _>(Created::TYPE, &Created { user_id: 7 }).unwrap();
//! registry.dispatch(&event).unwrap();
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::codec::Codec;
use crate::error::{MemstateError, Result};
use crate::message::Payload;
use crate::model::Event;

/// Trait for event handlers.
pub trait EventHandler: Send + Sync + 'static {
    /// Handle one event given its encoded body.
    fn call(&self, body: &[u8]) -> Result<()>;
}

/// Wrapper that decodes the body into `E` before calling the handler.
pub struct TypedHandler<C, E, F> {
    handler: F,
    _phantom: PhantomData<fn() -> (C, E)>,
}

impl<C, E, F> TypedHandler<C, E, F>
where
    C: Codec,
    E: Event,
    F: Fn(E) + Send + Sync + 'static,
{
    /// Create a new typed handler.
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<C, E, F> EventHandler for TypedHandler<C, E, F>
where
    C: Codec,
    E: Event,
    F: Fn(E) + Send + Sync + 'static,
{
    fn call(&self, body: &[u8]) -> Result<()> {
        let event: E = C::decode(body)?;
        (self.handler)(event);
        Ok(())
    }
}

/// Shared handle to a registered handler.
pub type SharedHandler = Arc<dyn EventHandler>;

/// Registry mapping event type tags to handlers.
///
/// Shared between callers (subscribe/unsubscribe) and the reader task
/// (dispatch). Handlers are cloned out of the lock before they run, so a
/// handler may itself subscribe or unsubscribe.
#[derive(Default)]
pub struct SubscriptionRegistry {
    handlers: RwLock<HashMap<String, SharedHandler>>,
}

impl SubscriptionRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `event_type`, returning the handler it replaced.
    pub fn insert(&self, event_type: &str, handler: SharedHandler) -> Option<SharedHandler> {
        self.handlers.write().insert(event_type.to_string(), handler)
    }

    /// Remove the handler for `event_type`.
    pub fn remove(&self, event_type: &str) -> Option<SharedHandler> {
        self.handlers.write().remove(event_type)
    }

    /// Undo an [`insert`](Self::insert) that the engine did not accept.
    ///
    /// Only acts if `installed` is still the registered handler, so a newer
    /// subscription for the same type is left alone.
    pub fn restore(
        &self,
        event_type: &str,
        installed: &SharedHandler,
        previous: Option<SharedHandler>,
    ) {
        let mut handlers = self.handlers.write();
        let still_ours = handlers
            .get(event_type)
            .is_some_and(|current| Arc::ptr_eq(current, installed));
        if !still_ours {
            return;
        }
        match previous {
            Some(previous) => {
                handlers.insert(event_type.to_string(), previous);
            }
            None => {
                handlers.remove(event_type);
            }
        }
    }

    /// Whether a handler is registered for `event_type`.
    pub fn contains(&self, event_type: &str) -> bool {
        self.handlers.read().contains_key(event_type)
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    /// Whether no handlers are registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }

    /// Registered event type tags, sorted.
    pub fn event_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.read().keys().cloned().collect();
        types.sort();
        types
    }

    /// Deliver one event to its handler.
    ///
    /// # Errors
    ///
    /// - [`MemstateError::NoHandler`] if nothing is registered for the tag
    /// - a codec error if the body does not decode as the handler's type
    /// - [`MemstateError::HandlerPanicked`] if the handler panics; the panic
    ///   does not propagate to the reader task
    pub fn dispatch(&self, event: &Payload) -> Result<()> {
        let handler = self
            .handlers
            .read()
            .get(&event.type_tag)
            .cloned()
            .ok_or_else(|| MemstateError::NoHandler(event.type_tag.clone()))?;

        panic::catch_unwind(AssertUnwindSafe(|| handler.call(&event.body))).unwrap_or_else(
            |payload| {
                Err(MemstateError::HandlerPanicked {
                    event_type: event.type_tag.clone(),
                    message: panic_message(&*payload),
                })
            },
        )
    }
}

/// Undoes a tentative [`insert`](SubscriptionRegistry::insert) unless
/// [`commit`](Self::commit)ted.
///
/// Covers rejected subscriptions, send failures, timeouts and callers that
/// stop waiting for the engine's answer.
pub(crate) struct RegistrationGuard<'a> {
    registry: &'a SubscriptionRegistry,
    event_type: &'a str,
    installed: SharedHandler,
    previous: Option<SharedHandler>,
    committed: bool,
}

impl<'a> RegistrationGuard<'a> {
    /// Install `handler` for `event_type`, remembering what it replaced.
    pub(crate) fn insert(
        registry: &'a SubscriptionRegistry,
        event_type: &'a str,
        handler: SharedHandler,
    ) -> Self {
        let previous = registry.insert(event_type, handler.clone());
        Self {
            registry,
            event_type,
            installed: handler,
            previous,
            committed: false,
        }
    }

    /// Keep the new handler.
    pub(crate) fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for RegistrationGuard<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        self.registry
            .restore(self.event_type, &self.installed, self.previous.take());
        tracing::debug!(
            event_type = self.event_type,
            "subscription not confirmed: handler restored"
        );
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
