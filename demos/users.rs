//! Users demo - commands, queries and filtered subscriptions.
//!
//! This example demonstrates:
//! - Executing commands with and without a result
//! - Subscribing to events, with and without an engine-side filter
//! - Unsubscribing
//!
//! Requires a Memstate engine hosting a users model, listening on
//! `localhost:3001` (override with `MEMSTATE_HOST` / `MEMSTATE_PORT`).
//!
//! ```text
//! cargo run --example users
//! ```

use memstate_client::{Command, Event, EventFilter, Query, RemoteClient};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
struct User {
    id: u64,
    name: String,
}

#[derive(Serialize)]
struct Create {
    name: String,
}

impl Command for Create {
    const TYPE: &'static str = "Users.Create";
    type Output = User;
}

#[derive(Serialize)]
struct Delete {
    id: u64,
}

impl Command for Delete {
    const TYPE: &'static str = "Users.Delete";
    type Output = ();
}

#[derive(Serialize)]
struct ListUsers;

impl Query for ListUsers {
    const TYPE: &'static str = "Users.List";
    type Output = Vec<User>;
}

#[derive(Debug, Serialize, Deserialize)]
struct Created {
    user_id: u64,
    name: String,
}

impl Event for Created {
    const TYPE: &'static str = "Users.Created";
}

#[derive(Debug, Serialize, Deserialize)]
struct Deleted {
    user_id: u64,
}

impl Event for Deleted {
    const TYPE: &'static str = "Users.Deleted";
}

/// Only deletions of one user.
#[derive(Serialize)]
struct UserDeletedFilter {
    user_id: u64,
}

impl EventFilter for UserDeletedFilter {
    const TYPE: &'static str = "Users.DeletedFilter";
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let host = std::env::var("MEMSTATE_HOST").unwrap_or_else(|_| "localhost".to_string());
    let port = match std::env::var("MEMSTATE_PORT") {
        Ok(port) => port.parse()?,
        Err(_) => 3001,
    };

    let client = RemoteClient::builder()
        .host(host)
        .port(port)
        .request_timeout(std::time::Duration::from_secs(10))
        .connect()
        .await?;

    client
        .subscribe(|e: Created| println!("created #{} {}", e.user_id, e.name))
        .await?;

    let ada = client.execute(&Create { name: "Ada".into() }).await?;
    let kant = client.execute(&Create { name: "Kant".into() }).await?;

    // Only hear about Kant leaving
    client
        .subscribe_filtered(&UserDeletedFilter { user_id: kant.id }, |e: Deleted| {
            println!("deleted #{}", e.user_id)
        })
        .await?;

    client.submit(&Delete { id: ada.id }).await?;
    client.submit(&Delete { id: kant.id }).await?;

    client.unsubscribe::<Created>().await?;
    client.unsubscribe::<Deleted>().await?;

    for user in client.query(&ListUsers).await? {
        println!("remaining: #{} {}", user.id, user.name);
    }

    client.close().await;
    Ok(())
}
