//! Integration tests for memstate-client.
//!
//! A small in-process engine serves a users model over an in-memory duplex
//! stream (or TCP for the blocking client) and exercises the client end to
//! end.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use memstate_client::codec::{Codec, MsgPackCodec};
use memstate_client::message::{Message, Outcome, Payload};
use memstate_client::protocol::{build_frame, FrameReader, Header};
use memstate_client::{
    blocking, ClientConfig, Command, ConnectionState, Event, EventFilter, MemstateError, Query,
    RemoteClient,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::io::{duplex, AsyncRead, AsyncWrite, AsyncWriteExt, WriteHalf};
use uuid::Uuid;

// ============================================================================
// Users model
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct User {
    id: u64,
    name: String,
}

#[derive(Serialize, Deserialize)]
struct Create {
    name: String,
}

impl Command for Create {
    const TYPE: &'static str = "Users.Create";
    type Output = User;
}

#[derive(Serialize, Deserialize)]
struct Delete {
    id: u64,
}

impl Command for Delete {
    const TYPE: &'static str = "Users.Delete";
    type Output = ();
}

/// Makes the engine drop the connection without answering.
#[derive(Serialize, Deserialize)]
struct Crash;

impl Command for Crash {
    const TYPE: &'static str = "Users.Crash";
    type Output = ();
}

#[derive(Serialize, Deserialize)]
struct ListUsers;

impl Query for ListUsers {
    const TYPE: &'static str = "Users.List";
    type Output = Vec<User>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Created {
    user_id: u64,
    name: String,
}

impl Event for Created {
    const TYPE: &'static str = "Users.Created";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Deleted {
    user_id: u64,
}

impl Event for Deleted {
    const TYPE: &'static str = "Users.Deleted";
}

#[derive(Serialize, Deserialize)]
struct UserDeletedFilter {
    user_id: u64,
}

impl EventFilter for UserDeletedFilter {
    const TYPE: &'static str = "Users.DeletedFilter";
}

// ============================================================================
// Fake engine
// ============================================================================

type Mp = MsgPackCodec;

struct Engine<S> {
    reader: FrameReader<tokio::io::ReadHalf<S>>,
    writer: WriteHalf<S>,
    sequence: u64,
    users: BTreeMap<u64, User>,
    next_id: u64,
    subscriptions: HashMap<String, Option<Payload>>,
}

impl<S: AsyncRead + AsyncWrite> Engine<S> {
    fn new(stream: S) -> Self {
        let (read, write) = tokio::io::split(stream);
        Self {
            reader: FrameReader::new(read),
            writer: write,
            sequence: 0,
            users: BTreeMap::new(),
            next_id: 1,
            subscriptions: HashMap::new(),
        }
    }

    async fn serve(mut self) {
        while let Ok(Some(frame)) = self.reader.next_frame().await {
            let message: Message = Mp::decode(frame.payload()).unwrap();
            if !self.handle(message).await {
                return;
            }
        }
    }

    /// Returns `false` to drop the connection.
    async fn handle(&mut self, message: Message) -> bool {
        match message {
            Message::CommandRequest { id, command } => {
                if command.type_tag == Crash::TYPE {
                    return false;
                }
                let (outcome, events) = self.apply(&command);
                if !events.is_empty() {
                    self.send(&Message::EventsRaised { events }).await;
                }
                self.send(&Message::CommandResponse {
                    response_to: id,
                    outcome,
                })
                .await;
            }
            Message::QueryRequest { id, query } => {
                let outcome = if query.type_tag == ListUsers::TYPE {
                    success(&self.users.values().cloned().collect::<Vec<_>>())
                } else {
                    Outcome::Failure(format!("unknown query {}", query.type_tag))
                };
                self.send(&Message::QueryResponse {
                    response_to: id,
                    outcome,
                })
                .await;
            }
            Message::SubscribeRequest {
                id,
                event_type,
                filter,
            } => {
                let outcome = if event_type == Created::TYPE || event_type == Deleted::TYPE {
                    self.subscriptions.insert(event_type, filter);
                    Outcome::ok()
                } else {
                    Outcome::Failure(format!("unknown event type {event_type}"))
                };
                self.send(&Message::SubscribeResponse {
                    response_to: id,
                    outcome,
                })
                .await;
            }
            Message::UnsubscribeRequest { id, event_type } => {
                self.subscriptions.remove(&event_type);
                self.send(&Message::UnsubscribeResponse {
                    response_to: id,
                    outcome: Outcome::ok(),
                })
                .await;
            }
            other => panic!("engine received {}", other.kind()),
        }
        true
    }

    fn apply(&mut self, command: &Payload) -> (Outcome, Vec<Payload>) {
        match command.type_tag.as_str() {
            Create::TYPE => {
                let create: Create = command.decode::<Mp, _>().unwrap();
                let user = User {
                    id: self.next_id,
                    name: create.name,
                };
                self.next_id += 1;
                self.users.insert(user.id, user.clone());
                let event = Created {
                    user_id: user.id,
                    name: user.name.clone(),
                };
                (success(&user), self.raised(Created::TYPE, &event))
            }
            Delete::TYPE => {
                let delete: Delete = command.decode::<Mp, _>().unwrap();
                match self.users.remove(&delete.id) {
                    Some(_) => {
                        let event = Deleted { user_id: delete.id };
                        (Outcome::ok(), self.raised(Deleted::TYPE, &event))
                    }
                    None => (Outcome::Failure(format!("no user {}", delete.id)), Vec::new()),
                }
            }
            other => (Outcome::Failure(format!("unknown command {other}")), Vec::new()),
        }
    }

    /// The event as subscribers see it, or nothing if no subscription passes.
    fn raised<E: Event>(&self, tag: &str, event: &E) -> Vec<Payload> {
        let Some(filter) = self.subscriptions.get(tag) else {
            return Vec::new();
        };
        let payload = Payload::encode::<Mp, _>(tag, event).unwrap();
        let passes = match filter {
            Some(filter) if filter.type_tag == UserDeletedFilter::TYPE => {
                let filter: UserDeletedFilter = filter.decode::<Mp, _>().unwrap();
                let deleted: Deleted = payload.decode::<Mp, _>().unwrap();
                deleted.user_id == filter.user_id
            }
            Some(_) | None => true,
        };
        if passes {
            vec![payload]
        } else {
            Vec::new()
        }
    }

    async fn send(&mut self, message: &Message) {
        self.sequence += 1;
        let payload = Mp::encode(message).unwrap();
        let frame = build_frame(&Header::new(self.sequence, 0), &payload);
        // The client may already be gone
        let _ = self.writer.write_all(&frame).await;
    }
}

fn success<T: Serialize>(value: &T) -> Outcome {
    Outcome::Success(Mp::encode(value).unwrap().into())
}

fn start_with(config: ClientConfig) -> RemoteClient {
    let (client_side, engine_side) = duplex(256 * 1024);
    tokio::spawn(Engine::new(engine_side).serve());
    RemoteClient::from_stream(client_side, config)
}

fn start() -> RemoteClient {
    start_with(ClientConfig::default())
}

fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

// ============================================================================
// Execution
// ============================================================================

#[tokio::test]
async fn test_execute_and_query() {
    let client = start();

    let ada = client.execute(&Create { name: "Ada".into() }).await.unwrap();
    let kant = client.execute(&Create { name: "Kant".into() }).await.unwrap();
    assert_eq!(ada.name, "Ada");
    assert_ne!(ada.id, kant.id);

    client.submit(&Delete { id: ada.id }).await.unwrap();

    let users = client.query(&ListUsers).await.unwrap();
    assert_eq!(users, vec![kant]);
    assert_eq!(client.pending_requests(), 0);
}

#[tokio::test]
async fn test_remote_failure_surfaces_reason() {
    let client = start();

    let err = client.submit(&Delete { id: 42 }).await.unwrap_err();
    assert!(matches!(err, MemstateError::Remote(reason) if reason == "no user 42"));

    // The connection survives a failed request
    assert!(client.execute(&Create { name: "Ada".into() }).await.is_ok());
}

#[tokio::test]
async fn test_concurrent_requests_get_their_own_responses() {
    let client = Arc::new(start());

    let tasks: Vec<_> = (0..64)
        .map(|i| {
            let client = client.clone();
            tokio::spawn(async move {
                let name = format!("user-{i}");
                let user = client.execute(&Create { name: name.clone() }).await.unwrap();
                assert_eq!(user.name, name);
                user.id
            })
        })
        .collect();

    let mut ids = Vec::new();
    for task in tasks {
        ids.push(task.await.unwrap());
    }
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 64);
    assert_eq!(client.pending_requests(), 0);
}

// ============================================================================
// Subscriptions
// ============================================================================

#[tokio::test]
async fn test_event_delivered_once_with_payload() {
    let client = start();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();

    client
        .subscribe(move |e: Created| sink.lock().push(e))
        .await
        .unwrap();
    let user = client.execute(&Create { name: "Ada".into() }).await.unwrap();

    // Events precede the response on the wire, so the handler already ran
    assert_eq!(
        *seen.lock(),
        vec![Created {
            user_id: user.id,
            name: "Ada".into()
        }]
    );
}

#[tokio::test]
async fn test_filter_scenario() {
    let client = start();
    let a = client.execute(&Create { name: "A".into() }).await.unwrap();
    let b = client.execute(&Create { name: "B".into() }).await.unwrap();

    let deleted = Arc::new(Mutex::new(Vec::new()));
    let sink = deleted.clone();
    client
        .subscribe_filtered(&UserDeletedFilter { user_id: a.id }, move |e: Deleted| {
            sink.lock().push(e.user_id)
        })
        .await
        .unwrap();

    client.submit(&Delete { id: b.id }).await.unwrap();
    assert!(deleted.lock().is_empty());

    client.submit(&Delete { id: a.id }).await.unwrap();
    assert_eq!(*deleted.lock(), vec![a.id]);
}

#[tokio::test]
async fn test_multi_subscription_scenario() {
    let client = start();
    let count = counter();

    let c = count.clone();
    client
        .subscribe(move |_: Created| {
            c.fetch_add(1, Ordering::SeqCst);
        })
        .await
        .unwrap();
    let d = count.clone();
    client
        .subscribe(move |_: Deleted| {
            d.fetch_add(1, Ordering::SeqCst);
        })
        .await
        .unwrap();

    let user = client.execute(&Create { name: "Ada".into() }).await.unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 1);

    client.submit(&Delete { id: user.id }).await.unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_unsubscribe_then_create_scenario() {
    let client = start();
    let count = counter();

    let c = count.clone();
    client
        .subscribe(move |_: Created| {
            c.fetch_add(1, Ordering::SeqCst);
        })
        .await
        .unwrap();
    let d = count.clone();
    client
        .subscribe(move |_: Deleted| {
            d.fetch_add(1, Ordering::SeqCst);
        })
        .await
        .unwrap();

    client.execute(&Create { name: "first".into() }).await.unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 1);

    client.unsubscribe::<Created>().await.unwrap();
    assert_eq!(client.subscriptions(), vec![Deleted::TYPE.to_string()]);

    client.execute(&Create { name: "second".into() }).await.unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_resubscribe_replaces_handler() {
    let client = start();
    let first = counter();
    let second = counter();

    let f = first.clone();
    client
        .subscribe(move |_: Created| {
            f.fetch_add(1, Ordering::SeqCst);
        })
        .await
        .unwrap();
    let s = second.clone();
    client
        .subscribe(move |_: Created| {
            s.fetch_add(1, Ordering::SeqCst);
        })
        .await
        .unwrap();

    client.execute(&Create { name: "Ada".into() }).await.unwrap();
    assert_eq!(first.load(Ordering::SeqCst), 0);
    assert_eq!(second.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_panicking_handler_does_not_stall_requests() {
    let client = start();
    client
        .subscribe(|e: Created| panic!("cannot handle {}", e.name))
        .await
        .unwrap();

    let user = tokio::time::timeout(
        Duration::from_secs(2),
        client.execute(&Create { name: "Ada".into() }),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(user.name, "Ada");

    assert_eq!(client.query(&ListUsers).await.unwrap(), vec![user]);
    assert_eq!(client.state(), ConnectionState::Connected);
}

// ============================================================================
// Connection lifecycle
// ============================================================================

#[tokio::test]
async fn test_disconnect_fails_pending_requests() {
    let client = Arc::new(start());

    let waiter = {
        let client = client.clone();
        tokio::spawn(async move { client.query(&ListUsers).await })
    };
    // Crash is answered by dropping the connection
    let err = client.submit(&Crash).await.unwrap_err();
    assert!(matches!(err, MemstateError::ConnectionClosed));

    // The concurrent query either finished first or failed fast
    match waiter.await.unwrap() {
        Ok(users) => assert!(users.is_empty()),
        Err(e) => assert!(matches!(e, MemstateError::ConnectionClosed)),
    }

    client.closed().await;
    assert_eq!(client.state(), ConnectionState::Closed);
    assert_eq!(client.pending_requests(), 0);

    let err = client.execute(&Create { name: "late".into() }).await.unwrap_err();
    assert!(matches!(err, MemstateError::ConnectionClosed));
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let client = start();
    client.execute(&Create { name: "Ada".into() }).await.unwrap();

    client.close().await;
    client.close().await;

    assert_eq!(client.state(), ConnectionState::Closed);
    assert!(matches!(
        client.query(&ListUsers).await,
        Err(MemstateError::ConnectionClosed)
    ));
    assert!(matches!(
        client.subscribe(|_: Created| {}).await,
        Err(MemstateError::ConnectionClosed)
    ));
    assert!(client.subscriptions().is_empty());
}

#[tokio::test]
async fn test_unknown_response_is_ignored() {
    let (client_side, engine_side) = duplex(64 * 1024);
    let client = RemoteClient::<MsgPackCodec>::from_stream(client_side, ClientConfig::default());

    let engine = tokio::spawn(async move {
        let (read, mut write) = tokio::io::split(engine_side);
        let mut reader = FrameReader::new(read);
        let frame = reader.next_frame().await.unwrap().unwrap();
        let request: Message = Mp::decode(frame.payload()).unwrap();
        let id = request.request_id().unwrap();

        let stray = Message::QueryResponse {
            response_to: Uuid::new_v4(),
            outcome: success(&Vec::<User>::new()),
        };
        let real = Message::QueryResponse {
            response_to: id,
            outcome: success(&vec![User {
                id: 7,
                name: "Ada".into(),
            }]),
        };
        for (sequence, message) in [stray, real].iter().enumerate() {
            let payload = Mp::encode(message).unwrap();
            let frame = build_frame(&Header::new(sequence as u64 + 1, 0), &payload);
            write.write_all(&frame).await.unwrap();
        }
        (reader, write)
    });

    let users = client.query(&ListUsers).await.unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].id, 7);
    assert!(client.is_connected());
    drop(engine.await.unwrap());
}

#[tokio::test]
async fn test_oversize_frame_closes_connection() {
    let (client_side, mut engine_side) = duplex(64 * 1024);
    let config = ClientConfig {
        max_payload_size: 1024,
        ..ClientConfig::default()
    };
    let client = RemoteClient::<MsgPackCodec>::from_stream(client_side, config);

    engine_side
        .write_all(&Header::new(1, 4096).encode())
        .await
        .unwrap();

    client.closed().await;
    assert_eq!(client.state(), ConnectionState::Closed);
    assert!(matches!(
        client.query(&ListUsers).await,
        Err(MemstateError::ConnectionClosed)
    ));
}

#[tokio::test]
async fn test_timeout_keeps_connection_usable() {
    let (client_side, engine_side) = duplex(64 * 1024);
    let config = ClientConfig {
        request_timeout: Some(Duration::from_millis(100)),
        ..ClientConfig::default()
    };
    let client = RemoteClient::<MsgPackCodec>::from_stream(client_side, config);

    // Nobody answers yet
    let err = client.query(&ListUsers).await.unwrap_err();
    assert!(matches!(err, MemstateError::Timeout));
    assert_eq!(client.pending_requests(), 0);

    // The late answer to the first query is discarded by the client
    tokio::spawn(Engine::new(engine_side).serve());
    let user = client.execute(&Create { name: "Ada".into() }).await.unwrap();
    assert_eq!(user.name, "Ada");
}

#[tokio::test]
async fn test_json_codec_end_to_end() {
    use memstate_client::codec::JsonCodec;

    let (client_side, engine_side) = duplex(64 * 1024);
    let client = RemoteClient::<JsonCodec>::from_stream(client_side, ClientConfig::default());

    let engine = tokio::spawn(async move {
        let (read, mut write) = tokio::io::split(engine_side);
        let mut reader = FrameReader::new(read);
        let frame = reader.next_frame().await.unwrap().unwrap();
        let request: Message = JsonCodec::decode(frame.payload()).unwrap();
        let Message::CommandRequest { id, command } = request else {
            panic!("expected a command");
        };
        let create: Create = command.decode::<JsonCodec, _>().unwrap();
        let user = User { id: 1, name: create.name };
        let response = Message::CommandResponse {
            response_to: id,
            outcome: Outcome::Success(JsonCodec::encode(&user).unwrap().into()),
        };
        let payload = JsonCodec::encode(&response).unwrap();
        write
            .write_all(&build_frame(&Header::new(1, 0), &payload))
            .await
            .unwrap();
        (reader, write)
    });

    let user = client.execute(&Create { name: "Ada".into() }).await.unwrap();
    assert_eq!(user, User { id: 1, name: "Ada".into() });
    drop(engine.await.unwrap());
}

// ============================================================================
// Blocking client
// ============================================================================

#[test]
fn test_blocking_client_from_plain_thread() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let port = runtime.block_on(async {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            Engine::new(stream).serve().await;
        });
        port
    });

    let client = blocking::RemoteClient::connect("127.0.0.1", port).unwrap();
    assert_eq!(client.state(), ConnectionState::Connected);

    let count = counter();
    let c = count.clone();
    client
        .subscribe(move |_: Created| {
            c.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    let user = client.execute(&Create { name: "Ada".into() }).unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(client.query(&ListUsers).unwrap(), vec![user.clone()]);

    client.unsubscribe::<Created>().unwrap();
    client.submit(&Delete { id: user.id }).unwrap();
    assert!(client.query(&ListUsers).unwrap().is_empty());

    client.shutdown(Duration::from_secs(1));
}

#[tokio::test]
async fn test_blocking_client_refuses_inside_runtime() {
    let err = blocking::RemoteClient::connect("127.0.0.1", 3001).err().unwrap();
    assert!(matches!(err, MemstateError::BlockingInAsyncContext));
}
