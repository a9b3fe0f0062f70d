//! Watch - log every entity change pushed by a sync server.
//!
//! This example demonstrates:
//! - Exact `(command, type)` handlers next to a per-command fallback
//! - Ignoring a command with a no-op handler
//! - Following the connection lifecycle
//!
//! # Running
//!
//! ```text
//! RUST_LOG=info cargo run --example watch -- ws://localhost:8080/app/ws/ structr
//! ```

use entsync_client::protocol::{CommandKind, Envelope, TypeKey};
use entsync_client::{ConnectionState, SyncClient};
use tracing_subscriber::EnvFilter;

const DEFAULT_URL: &str = "ws://localhost:8080/app/ws/";
const DEFAULT_PROTOCOL: &str = "structr";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let url = args.next().unwrap_or_else(|| DEFAULT_URL.to_string());
    let protocol = args.next().unwrap_or_else(|| DEFAULT_PROTOCOL.to_string());

    let client = SyncClient::builder()
        .on_event(CommandKind::Create, "user", |env: &Envelope| {
            tracing::info!(
                "User {} created in group {}",
                env.id().unwrap_or("?"),
                env.field_str("groupId").unwrap_or("-")
            );
            Ok(())
        })
        .on_event(CommandKind::Create, "group", |env: &Envelope| {
            tracing::info!("Group {} created", env.id().unwrap_or("?"));
            Ok(())
        })
        .on_event(CommandKind::Create, TypeKey::Any, |env: &Envelope| {
            tracing::info!("{} {} created", env.entity_type(), env.id().unwrap_or("?"));
            Ok(())
        })
        .on_event(CommandKind::Delete, TypeKey::Any, |env: &Envelope| {
            tracing::info!("{} {} deleted", env.entity_type(), env.id().unwrap_or("?"));
            Ok(())
        })
        // Updates are not shown.
        .on_event(CommandKind::Update, TypeKey::Any, |_: &Envelope| Ok(()))
        .on_state_change(|event| match &event.reason {
            Some(reason) => tracing::info!("{} -> {} ({})", event.previous, event.state, reason),
            None => tracing::info!("{} -> {}", event.previous, event.state),
        })
        .build();

    client.connect(&url, &protocol)?;
    tracing::info!("Connecting to {} as {}", url, protocol);

    let mut state = client.subscribe();
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            if client.state() != ConnectionState::Open {
                return Ok(());
            }
            client.close()?;
        }
        _ = state.wait_for(|s| matches!(s, ConnectionState::Closed | ConnectionState::Disconnected)) => {}
    }

    client.wait_for(ConnectionState::Disconnected).await?;
    Ok(())
}
