//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::time::Duration;

use anyhow::{Context, Result};
use chat_link::transport::{MemoryPeers, MemoryTransport};
use chat_link::{ConnectionConfig, Event, Subscription, Supervisor};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

/// Longest a test waits for one event.
pub const EVENT_WAIT: Duration = Duration::from_secs(3600);

/// Installs a test-friendly subscriber; `RUST_LOG` controls verbosity.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Config for the in-memory transport with the given retry budget.
pub fn memory_config(max_retries: u32) -> ConnectionConfig {
    ConnectionConfig::builder()
        .endpoint("ws://chat.test/ws")
        .session_id("conv-1")
        .credential("secret")
        .max_retries(max_retries)
        .build()
        .expect("valid test config")
}

/// Supervisor on a fresh in-memory transport, plus a subscription.
pub fn memory_supervisor(
    config: ConnectionConfig,
) -> (Supervisor, MemoryTransport, MemoryPeers, Subscription) {
    init_tracing();
    let (transport, peers) = MemoryTransport::new();
    let supervisor = Supervisor::builder(config)
        .transport(transport.clone())
        .spawn()
        .expect("spawn supervisor");
    let events = supervisor.subscribe();
    (supervisor, transport, peers, events)
}

/// Waits for the next event.
pub async fn next_event(events: &mut Subscription) -> Result<Event> {
    tokio::time::timeout(EVENT_WAIT, events.recv())
        .await
        .context("timed out waiting for event")?
        .context("event stream ended")
}

/// Waits for events until `pred` matches, returning the skipped ones too.
pub async fn wait_for(
    events: &mut Subscription,
    pred: impl Fn(&Event) -> bool,
) -> Result<(Event, Vec<Event>)> {
    let mut skipped = Vec::new();
    loop {
        let event = next_event(events).await?;
        if pred(&event) {
            return Ok((event, skipped));
        }
        skipped.push(event);
    }
}

/// Caller payloads a peer has received, ignoring heartbeats.
pub fn payloads(sent: &[Value]) -> Vec<Value> {
    sent.iter()
        .filter_map(|frame| frame.get("payload").cloned())
        .collect()
}

/// Number of heartbeat pings among `sent`.
pub fn ping_count(sent: &[Value]) -> usize {
    sent.iter()
        .filter(|frame| frame.get("type").and_then(Value::as_str) == Some("ping"))
        .count()
}

/// Lets the supervisor task process everything already posted.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
