//! Blocking wrapper around the async client.
//!
//! [`RemoteClient`] owns a small tokio runtime and drives the async client
//! on it, so it can be used from plain threads.
//!
//! # Deadlocks
//!
//! Never call a blocking method from inside an async context, and never from
//! an event handler: handlers run on the connection's reader task, which is
//! the task that would deliver the response. Calls made from within a tokio
//! runtime are refused with [`MemstateError::BlockingInAsyncContext`].

use std::future::Future;
use std::time::Duration;

use tokio::runtime::{Handle, Runtime};

use crate::client::{ClientBuilder, RemoteClient as AsyncClient};
use crate::codec::{Codec, MsgPackCodec};
use crate::config::ClientConfig;
use crate::error::{MemstateError, Result};
use crate::model::{Command, Event, EventFilter, Query};
use crate::state::ConnectionState;

const RUNTIME_WORKER_THREADS: usize = 2;

/// Blocking client. See the [module docs](self) for the deadlock caveat.
pub struct RemoteClient<C = MsgPackCodec> {
    inner: AsyncClient<C>,
    runtime: Runtime,
}

impl RemoteClient<MsgPackCodec> {
    /// Connect to `host:port` with default settings.
    pub fn connect(host: &str, port: u16) -> Result<Self> {
        Self::connect_with(ClientBuilder::new().host(host).port(port).config().clone())
    }
}

impl<C: Codec> RemoteClient<C> {
    /// Connect using `config`.
    pub fn connect_with(config: ClientConfig) -> Result<Self> {
        ensure_blocking_allowed()?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(RUNTIME_WORKER_THREADS)
            .thread_name("memstate-client")
            .enable_all()
            .build()?;
        let inner = runtime.block_on(AsyncClient::connect_with(config))?;
        Ok(Self { inner, runtime })
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    /// Execute a command and return its result.
    pub fn execute<T: Command>(&self, command: &T) -> Result<T::Output> {
        self.block_on(self.inner.execute(command))
    }

    /// Execute a command, ignoring any result.
    pub fn submit<T: Command>(&self, command: &T) -> Result<()> {
        self.block_on(self.inner.submit(command))
    }

    /// Execute a query and return its result.
    pub fn query<Q: Query>(&self, query: &Q) -> Result<Q::Output> {
        self.block_on(self.inner.query(query))
    }

    /// Receive every `E` the engine raises.
    pub fn subscribe<E, F>(&self, handler: F) -> Result<()>
    where
        E: Event,
        F: Fn(E) + Send + Sync + 'static,
    {
        self.block_on(self.inner.subscribe(handler))
    }

    /// Receive the `E` events that pass `filter`.
    pub fn subscribe_filtered<E, Flt, F>(&self, filter: &Flt, handler: F) -> Result<()>
    where
        E: Event,
        Flt: EventFilter,
        F: Fn(E) + Send + Sync + 'static,
    {
        self.block_on(self.inner.subscribe_filtered(filter, handler))
    }

    /// Stop receiving `E`.
    pub fn unsubscribe<E: Event>(&self) -> Result<()> {
        self.block_on(self.inner.unsubscribe::<E>())
    }

    /// Close the connection and wait for its tasks.
    pub fn close(&self) {
        if Handle::try_current().is_ok() {
            tracing::warn!("blocking close called from an async context; skipping wait");
            return;
        }
        self.runtime.block_on(self.inner.close());
    }

    /// Close, giving the runtime up to `timeout` to finish background work.
    pub fn shutdown(self, timeout: Duration) {
        self.close();
        let Self { inner, runtime } = self;
        drop(inner);
        runtime.shutdown_timeout(timeout);
    }

    fn block_on<T>(&self, future: impl Future<Output = Result<T>>) -> Result<T> {
        ensure_blocking_allowed()?;
        self.runtime.block_on(future)
    }
}

fn ensure_blocking_allowed() -> Result<()> {
    if Handle::try_current().is_ok() {
        return Err(MemstateError::BlockingInAsyncContext);
    }
    Ok(())
}
