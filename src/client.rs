//! Client builder and connection façade.
//!
//! The [`ClientBuilder`] provides a fluent API for configuring the
//! connection. The [`RemoteClient`] manages the lifecycle:
//! 1. Open the TCP stream
//! 2. Spawn the writer task
//! 3. Spawn the reader task
//! 4. Correlate requests with responses and route events to handlers
//!
//! # Example
//!
//! ```ignore
//! use memstate_client::RemoteClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = RemoteClient::builder()
//!         .host("localhost")
//!         .port(3001)
//!         .connect()
//!         .await?;
//!
//!     client.subscribe(|e: Created| println!("created {}", e.user_id)).await?;
//!     let user = client.execute(&Create { name: "Kant".into() }).await?;
//!
//!     client.close().await;
//!     Ok(())
//! }
//! ```

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::codec::{Codec, MsgPackCodec};
use crate::config::ClientConfig;
use crate::correlation::{PendingGuard, PendingRequests};
use crate::error::{MemstateError, Result};
use crate::handler::{RegistrationGuard, SharedHandler, SubscriptionRegistry, TypedHandler};
use crate::inbound::Dispatcher;
use crate::message::{Message, Outcome, Payload, RequestKind};
use crate::model::{Command, Event, EventFilter, Query};
use crate::protocol::FrameReader;
use crate::state::{ConnectionState, StateCell};
use crate::transport;
use crate::writer::{spawn_writer_task, WriterHandle};

/// Builder for configuring and connecting a client.
pub struct ClientBuilder<C = MsgPackCodec> {
    config: ClientConfig,
    _codec: PhantomData<fn() -> C>,
}

impl ClientBuilder<MsgPackCodec> {
    /// Create a builder using the MsgPack codec and default settings.
    pub fn new() -> Self {
        Self::with_codec()
    }
}

impl Default for ClientBuilder<MsgPackCodec> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Codec> ClientBuilder<C> {
    /// Create a builder for codec `C`.
    pub fn with_codec() -> Self {
        Self::from_config(ClientConfig::default())
    }

    /// Start from an existing configuration.
    pub fn from_config(config: ClientConfig) -> Self {
        Self {
            config,
            _codec: PhantomData,
        }
    }

    /// Set the engine host. Default: `localhost`.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Set the engine port. Default: 3001.
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the outbound queue capacity.
    ///
    /// Default: 1024
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    /// Set the largest frame payload accepted in either direction.
    ///
    /// Default: 1 GB
    pub fn max_payload_size(mut self, size: u32) -> Self {
        self.config.max_payload_size = size;
        self
    }

    /// Fail requests that get no response within `timeout`.
    ///
    /// Default: no timeout
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = Some(timeout);
        self
    }

    /// The configuration built so far.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Connect to the configured engine.
    pub async fn connect(self) -> Result<RemoteClient<C>> {
        RemoteClient::connect_with(self.config).await
    }
}

/// A connected client.
///
/// All methods take `&self`; share the client between tasks with an `Arc`.
/// Dropping the client cancels its background tasks. Use
/// [`close`](Self::close) to shut down and wait for them.
pub struct RemoteClient<C = MsgPackCodec> {
    writer: WriterHandle,
    pending: Arc<PendingRequests>,
    subscriptions: Arc<SubscriptionRegistry>,
    state: Arc<StateCell>,
    cancel: CancellationToken,
    request_timeout: Option<Duration>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
    writer_task: Mutex<Option<JoinHandle<Result<()>>>>,
    _codec: PhantomData<fn() -> C>,
}

impl RemoteClient<MsgPackCodec> {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder<MsgPackCodec> {
        ClientBuilder::new()
    }

    /// Connect to `host:port` with default settings.
    pub async fn connect(host: &str, port: u16) -> Result<Self> {
        Self::builder().host(host).port(port).connect().await
    }
}

impl<C: Codec> RemoteClient<C> {
    /// Connect using `config`.
    ///
    /// # Errors
    ///
    /// Returns [`MemstateError::Connect`] if the engine cannot be reached.
    pub async fn connect_with(config: ClientConfig) -> Result<Self> {
        let stream = transport::connect(&config.host, config.port).await?;
        Ok(Self::from_stream(stream, config))
    }

    /// Run the protocol over an already established stream.
    ///
    /// `config.host` and `config.port` are ignored. Must be called from
    /// within a tokio runtime.
    pub fn from_stream<S>(stream: S, config: ClientConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let state = Arc::new(StateCell::new(ConnectionState::Connecting));
        let (read_half, write_half) = tokio::io::split(stream);
        let cancel = CancellationToken::new();

        let (writer, writer_task) =
            spawn_writer_task(write_half, config.writer_config(), cancel.clone());

        let pending = Arc::new(PendingRequests::new());
        let subscriptions = Arc::new(SubscriptionRegistry::new());
        let dispatcher = Dispatcher {
            pending: pending.clone(),
            subscriptions: subscriptions.clone(),
            state: state.clone(),
        };
        let reader = FrameReader::with_max_payload(read_half, config.max_payload_size);

        state.set(ConnectionState::Connected);
        let reader_task = tokio::spawn(dispatcher.run::<_, C>(reader, cancel.clone()));

        Self {
            writer,
            pending,
            subscriptions,
            state,
            cancel,
            request_timeout: config.request_timeout,
            reader_task: Mutex::new(Some(reader_task)),
            writer_task: Mutex::new(Some(writer_task)),
            _codec: PhantomData,
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Whether the connection is open.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Number of requests awaiting a response.
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    /// Messages queued but not yet written.
    pub fn pending_frames(&self) -> usize {
        self.writer.pending_count()
    }

    /// Event type tags with a registered handler.
    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.event_types()
    }

    /// Execute a command and return its result.
    pub async fn execute<T: Command>(&self, command: &T) -> Result<T::Output> {
        let body = self.send_command(command).await?;
        C::decode(&body)
    }

    /// Execute a command, waiting for the engine to accept it but ignoring
    /// any result.
    pub async fn submit<T: Command>(&self, command: &T) -> Result<()> {
        self.send_command(command).await.map(drop)
    }

    async fn send_command<T: Command>(&self, command: &T) -> Result<bytes::Bytes> {
        let message = Message::command_request(Payload::encode::<C, _>(T::TYPE, command)?);
        self.send(RequestKind::Command, message)
            .await?
            .into_result()
    }

    /// Execute a query and return its result.
    pub async fn query<Q: Query>(&self, query: &Q) -> Result<Q::Output> {
        let message = Message::query_request(Payload::encode::<C, _>(Q::TYPE, query)?);
        let body = self.send(RequestKind::Query, message).await?.into_result()?;
        C::decode(&body)
    }

    /// Receive every `E` the engine raises.
    ///
    /// The handler runs on the connection's reader task; keep it short and
    /// never block it on another request of this client. Subscribing again
    /// to the same event type replaces the handler. If the engine rejects the
    /// subscription, or the returned future is dropped before it completes,
    /// the previous handler is put back.
    pub async fn subscribe<E, F>(&self, handler: F) -> Result<()>
    where
        E: Event,
        F: Fn(E) + Send + Sync + 'static,
    {
        self.subscribe_with::<E, F>(handler, None).await
    }

    /// Receive the `E` events that pass `filter`. The engine evaluates the
    /// filter; rejected events never reach this client.
    pub async fn subscribe_filtered<E, Flt, F>(&self, filter: &Flt, handler: F) -> Result<()>
    where
        E: Event,
        Flt: EventFilter,
        F: Fn(E) + Send + Sync + 'static,
    {
        let filter = Payload::encode::<C, _>(Flt::TYPE, filter)?;
        self.subscribe_with::<E, F>(handler, Some(filter)).await
    }

    async fn subscribe_with<E, F>(&self, handler: F, filter: Option<Payload>) -> Result<()>
    where
        E: Event,
        F: Fn(E) + Send + Sync + 'static,
    {
        let handler: SharedHandler = Arc::new(TypedHandler::<C, E, F>::new(handler));

        // Registered before sending so events raised right after the engine
        // accepts the subscription are not lost. Restored on any exit short
        // of an accepted subscription, including a dropped future.
        let registration = RegistrationGuard::insert(&self.subscriptions, E::TYPE, handler);

        let message = Message::subscribe_request(E::TYPE, filter);
        self.send(RequestKind::Subscribe, message)
            .await?
            .into_result()?;

        registration.commit();
        tracing::debug!(event_type = E::TYPE, "subscribed");
        Ok(())
    }

    /// Stop receiving `E`. Local delivery stops immediately, before the
    /// engine acknowledges.
    pub async fn unsubscribe<E: Event>(&self) -> Result<()> {
        if self.subscriptions.remove(E::TYPE).is_none() {
            tracing::debug!(event_type = E::TYPE, "unsubscribing without a local handler");
        }

        let message = Message::unsubscribe_request(E::TYPE);
        self.send(RequestKind::Unsubscribe, message)
            .await?
            .into_result()?;

        tracing::debug!(event_type = E::TYPE, "unsubscribed");
        Ok(())
    }

    /// Send a request and wait for its response.
    async fn send(&self, kind: RequestKind, message: Message) -> Result<Outcome> {
        let id = message
            .request_id()
            .ok_or_else(|| MemstateError::Protocol(format!("{} is not a request", message.kind())))?;

        let completion = self.pending.register(id)?;
        let _guard = PendingGuard::new(&self.pending, id);

        tracing::trace!(%id, kind = message.kind(), "queueing request");
        self.writer.send_message::<C>(&message).await?;

        let response = match self.request_timeout {
            Some(timeout) => tokio::time::timeout(timeout, completion)
                .await
                .map_err(|_| MemstateError::Timeout)?,
            None => completion.await,
        };

        // A dropped sender means the table was torn down.
        let response = response.map_err(|_| MemstateError::ConnectionClosed)??;
        kind.outcome_of(response)
    }

    /// Close the connection.
    ///
    /// Stops the reader, fails pending requests, lets the writer shut the
    /// stream down, and waits for both tasks. Safe to call more than once
    /// and from several tasks.
    pub async fn close(&self) {
        let first = self.state.close();
        self.cancel.cancel();
        self.pending.fail_all();

        let reader_task = self.reader_task.lock().take();
        if let Some(task) = reader_task {
            if let Err(e) = task.await {
                tracing::warn!("reader task panicked: {}", e);
            }
        }

        let writer_task = self.writer_task.lock().take();
        if let Some(task) = writer_task {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::debug!("writer ended with error: {}", e),
                Err(e) => tracing::warn!("writer task panicked: {}", e),
            }
        }

        if first {
            tracing::info!("connection closed");
        }
    }

    /// Wait until the connection closes (peer disconnect, error, or
    /// [`close`](Self::close)).
    pub async fn closed(&self) {
        self.cancel.cancelled().await;
    }
}

impl<C> Drop for RemoteClient<C> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
