//! `roomlink` -- terminal client for chat rooms.
//!
//! Joins a room over WebSocket, prints what others say, and sends each
//! line typed on stdin. Type `/help` for commands.
//!
//! Usage: `roomlink [ROOM]`
//!
//! # Environment variables
//!
//! | Variable                        | Required | Default                 | Description                          |
//! |---------------------------------|----------|-------------------------|--------------------------------------|
//! | `ROOMLINK_TOKEN`                | yes      | --                      | Access token appended to the endpoint |
//! | `ROOMLINK_BASE_URL`             | no       | `http://localhost:8000` | Server base URL (`http`/`https`/`ws`/`wss`) |
//! | `ROOMLINK_WS_PATH`              | no       | `ws/chat`               | Path prefix of room channels         |
//! | `ROOMLINK_CONNECT_TIMEOUT_SECS` | no       | `10`                    | Seconds before an open attempt fails |
//! | `ROOMLINK_ROOM`                 | no       | `general`               | Room to join when none is given      |

use std::sync::Arc;

use roomlink_cli::{commands, session};
use roomlink_client::config::ClientConfig;
use roomlink_client::credentials::{CredentialProvider, EnvCredential};
use roomlink_client::manager::RoomConnectionManager;
use roomlink_client::reconnect::ReconnectConfig;
use roomlink_client::transport::WebSocketConnector;
use tokio::io::BufReader;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // Chat goes to stdout; keep logs on stderr.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "roomlink_cli=info,roomlink_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = ClientConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        std::process::exit(1);
    });

    let room = commands::initial_room(
        std::env::args().nth(1),
        std::env::var("ROOMLINK_ROOM").ok(),
    )
    .unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid room name");
        std::process::exit(1);
    });

    let credentials = EnvCredential::default();
    if credentials.token().is_none() {
        tracing::error!(
            var = credentials.var(),
            "Access token environment variable is required"
        );
        std::process::exit(1);
    }

    tracing::info!(
        base_url = %config.base_url,
        room = %room,
        "Starting roomlink",
    );

    let manager = RoomConnectionManager::new(
        config,
        Arc::new(credentials),
        Arc::new(WebSocketConnector::new()),
    );

    session::run(
        manager,
        room,
        ReconnectConfig::default(),
        BufReader::new(tokio::io::stdin()),
    )
    .await;
}
