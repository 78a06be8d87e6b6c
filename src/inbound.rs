//! Inbound reader task: reads frames and dispatches messages.
//!
//! Responses go to the [`PendingRequests`] table, events to the
//! [`SubscriptionRegistry`]. Correlation, dispatch and envelope decode
//! failures are logged and absorbed: each frame is consumed whole, so the
//! stream stays in sync. Framing failures (oversize length, truncated frame)
//! and I/O errors end the connection.
//!
//! Whatever ends the loop (end of stream, error, or cancellation), every
//! still-pending request is failed with `ConnectionClosed` so no caller
//! waits forever.

use std::sync::Arc;

use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;

use crate::codec::Codec;
use crate::correlation::PendingRequests;
use crate::error::{MemstateError, Result};
use crate::handler::SubscriptionRegistry;
use crate::message::{Message, Payload};
use crate::protocol::FrameReader;
use crate::state::{ConnectionState, StateCell};

/// Shared state the reader task dispatches into.
pub(crate) struct Dispatcher {
    pub(crate) pending: Arc<PendingRequests>,
    pub(crate) subscriptions: Arc<SubscriptionRegistry>,
    pub(crate) state: Arc<StateCell>,
}

impl Dispatcher {
    /// Run the read loop until the stream ends, fails, or `cancel` fires,
    /// then tear the connection down.
    pub(crate) async fn run<R, C>(self, mut reader: FrameReader<R>, cancel: CancellationToken)
    where
        R: AsyncRead + Unpin,
        C: Codec,
    {
        tracing::trace!(codec = C::NAME, "reader task started");

        let result = tokio::select! {
            _ = cancel.cancelled() => Ok(()),
            result = self.read_loop::<R, C>(&mut reader) => result,
        };

        match &result {
            Ok(()) => tracing::debug!("reader task stopped"),
            Err(e) => tracing::error!("reader task failed: {}", e),
        }

        self.state.set(ConnectionState::Closed);
        let failed = self.pending.fail_all();
        if failed > 0 {
            tracing::warn!(failed, "connection closed with requests still pending");
        }
        cancel.cancel();
    }

    async fn read_loop<R, C>(&self, reader: &mut FrameReader<R>) -> Result<()>
    where
        R: AsyncRead + Unpin,
        C: Codec,
    {
        while let Some(frame) = reader.next_frame().await? {
            let sequence = frame.sequence();
            let message: Message = match C::decode(frame.payload()) {
                Ok(message) => message,
                Err(e) => {
                    tracing::warn!(
                        sequence,
                        len = frame.payload_len(),
                        "skipping undecodable message: {}",
                        e
                    );
                    continue;
                }
            };

            tracing::trace!(sequence, kind = message.kind(), "frame received");
            self.dispatch(message);
        }

        Ok(())
    }

    /// Route one decoded message.
    pub(crate) fn dispatch(&self, message: Message) {
        match message {
            Message::CommandResponse { response_to, .. }
            | Message::QueryResponse { response_to, .. }
            | Message::SubscribeResponse { response_to, .. }
            | Message::UnsubscribeResponse { response_to, .. } => {
                let kind = message.kind();
                if !self.pending.complete(response_to, message) {
                    let err = MemstateError::UnknownRequest(response_to);
                    tracing::warn!(kind, "discarding response: {}", err);
                }
            }

            Message::EventsRaised { events } => self.dispatch_events(&events),

            Message::CommandRequest { .. }
            | Message::QueryRequest { .. }
            | Message::SubscribeRequest { .. }
            | Message::UnsubscribeRequest { .. } => {
                let err = MemstateError::Protocol(format!(
                    "engine sent a {}, which clients do not handle",
                    message.kind()
                ));
                tracing::error!("ignoring message: {}", err);
            }
        }
    }

    fn dispatch_events(&self, events: &[Payload]) {
        tracing::debug!(count = events.len(), "events raised");
        for event in events {
            match self.subscriptions.dispatch(event) {
                Ok(()) => {}
                Err(e @ MemstateError::NoHandler(_)) => {
                    tracing::warn!("dropping event: {}", e);
                }
                Err(e @ MemstateError::HandlerPanicked { .. }) => {
                    tracing::error!("{}", e);
                }
                Err(e) => {
                    tracing::warn!(event_type = %event.type_tag, "event handler failed: {}", e);
                }
            }
        }
    }
}
