//! Protocol messages exchanged with the engine.
//!
//! [`Message`] is a closed set of variants. The codec writes the variant name
//! as an explicit discriminant (serde's externally tagged representation), so
//! the reader dispatches with an exhaustive `match` instead of by runtime type.
//!
//! User values (commands, queries, events, filters) travel as [`Payload`]s:
//! a stable type tag plus the value encoded with the connection's codec.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::codec::Codec;
use crate::error::{MemstateError, Result};

/// An opaque, encoded user value tagged with its type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    /// Stable type identifier, e.g. `"users.Created"`.
    pub type_tag: String,
    /// Value encoded with the connection's codec.
    pub body: Bytes,
}

impl Payload {
    /// Encode `value` under `type_tag`.
    pub fn encode<C: Codec, T: Serialize + ?Sized>(type_tag: &str, value: &T) -> Result<Self> {
        Ok(Self {
            type_tag: type_tag.to_string(),
            body: Bytes::from(C::encode(value)?),
        })
    }

    /// Decode the body as `T`.
    pub fn decode<C: Codec, T: DeserializeOwned>(&self) -> Result<T> {
        C::decode(&self.body)
    }
}

/// Result carried by every response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// The request succeeded; the body holds the encoded result (may be empty).
    Success(Bytes),
    /// The engine failed the request with this message.
    Failure(String),
}

impl Outcome {
    /// Successful outcome with an empty body.
    pub fn ok() -> Self {
        Self::Success(Bytes::new())
    }

    /// Convert into the result body, surfacing failures as
    /// [`MemstateError::Remote`].
    pub fn into_result(self) -> Result<Bytes> {
        match self {
            Self::Success(body) => Ok(body),
            Self::Failure(reason) => Err(MemstateError::Remote(reason)),
        }
    }
}

/// A single protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    /// Execute a command against the model.
    CommandRequest {
        /// Correlation id.
        id: Uuid,
        /// The encoded command.
        command: Payload,
    },
    /// Execute a read-only query against the model.
    QueryRequest {
        /// Correlation id.
        id: Uuid,
        /// The encoded query.
        query: Payload,
    },
    /// Start receiving events of one type, optionally narrowed by a filter
    /// the engine evaluates.
    SubscribeRequest {
        /// Correlation id.
        id: Uuid,
        /// Event type tag.
        event_type: String,
        /// Encoded filter.
        filter: Option<Payload>,
    },
    /// Stop receiving events of one type.
    UnsubscribeRequest {
        /// Correlation id.
        id: Uuid,
        /// Event type tag.
        event_type: String,
    },
    /// Answer to a `CommandRequest`.
    CommandResponse {
        /// Id of the request being answered.
        response_to: Uuid,
        /// Result or failure.
        outcome: Outcome,
    },
    /// Answer to a `QueryRequest`.
    QueryResponse {
        /// Id of the request being answered.
        response_to: Uuid,
        /// Result or failure.
        outcome: Outcome,
    },
    /// Answer to a `SubscribeRequest`.
    SubscribeResponse {
        /// Id of the request being answered.
        response_to: Uuid,
        /// Acceptance or failure.
        outcome: Outcome,
    },
    /// Answer to an `UnsubscribeRequest`.
    UnsubscribeResponse {
        /// Id of the request being answered.
        response_to: Uuid,
        /// Acceptance or failure.
        outcome: Outcome,
    },
    /// Events produced by one engine operation, in order.
    EventsRaised {
        /// The encoded events.
        events: Vec<Payload>,
    },
}

impl Message {
    /// Build a command request with a fresh id.
    pub fn command_request(command: Payload) -> Self {
        Self::CommandRequest {
            id: Uuid::new_v4(),
            command,
        }
    }

    /// Build a query request with a fresh id.
    pub fn query_request(query: Payload) -> Self {
        Self::QueryRequest {
            id: Uuid::new_v4(),
            query,
        }
    }

    /// Build a subscribe request with a fresh id.
    pub fn subscribe_request(event_type: &str, filter: Option<Payload>) -> Self {
        Self::SubscribeRequest {
            id: Uuid::new_v4(),
            event_type: event_type.to_string(),
            filter,
        }
    }

    /// Build an unsubscribe request with a fresh id.
    pub fn unsubscribe_request(event_type: &str) -> Self {
        Self::UnsubscribeRequest {
            id: Uuid::new_v4(),
            event_type: event_type.to_string(),
        }
    }

    /// Variant name, for logs and errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CommandRequest { .. } => "CommandRequest",
            Self::QueryRequest { .. } => "QueryRequest",
            Self::SubscribeRequest { .. } => "SubscribeRequest",
            Self::UnsubscribeRequest { .. } => "UnsubscribeRequest",
            Self::CommandResponse { .. } => "CommandResponse",
            Self::QueryResponse { .. } => "QueryResponse",
            Self::SubscribeResponse { .. } => "SubscribeResponse",
            Self::UnsubscribeResponse { .. } => "UnsubscribeResponse",
            Self::EventsRaised { .. } => "EventsRaised",
        }
    }

    /// Correlation id if this is a request.
    pub fn request_id(&self) -> Option<Uuid> {
        match self {
            Self::CommandRequest { id, .. }
            | Self::QueryRequest { id, .. }
            | Self::SubscribeRequest { id, .. }
            | Self::UnsubscribeRequest { id, .. } => Some(*id),
            _ => None,
        }
    }

    /// Id of the answered request if this is a response.
    pub fn response_to(&self) -> Option<Uuid> {
        match self {
            Self::CommandResponse { response_to, .. }
            | Self::QueryResponse { response_to, .. }
            | Self::SubscribeResponse { response_to, .. }
            | Self::UnsubscribeResponse { response_to, .. } => Some(*response_to),
            _ => None,
        }
    }
}

/// Kind of request awaiting a response; determines which response variant
/// is acceptable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RequestKind {
    Command,
    Query,
    Subscribe,
    Unsubscribe,
}

impl RequestKind {
    fn expected_response(self) -> &'static str {
        match self {
            Self::Command => "CommandResponse",
            Self::Query => "QueryResponse",
            Self::Subscribe => "SubscribeResponse",
            Self::Unsubscribe => "UnsubscribeResponse",
        }
    }

    /// Extract the outcome from a response of the matching kind.
    pub(crate) fn outcome_of(self, response: Message) -> Result<Outcome> {
        match (self, response) {
            (Self::Command, Message::CommandResponse { outcome, .. })
            | (Self::Query, Message::QueryResponse { outcome, .. })
            | (Self::Subscribe, Message::SubscribeResponse { outcome, .. })
            | (Self::Unsubscribe, Message::UnsubscribeResponse { outcome, .. }) => Ok(outcome),
            (kind, other) => Err(MemstateError::UnexpectedResponse {
                expected: kind.expected_response(),
                actual: other.kind(),
            }),
        }
    }
}
