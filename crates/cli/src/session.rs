//! Interactive chat session.
//!
//! Joins the initial room, prints inbound messages to stdout, sends each
//! input line, and re-joins the room with backoff when the channel drops
//! unexpectedly.

use roomlink_client::events::{CloseReason, ConnectionState};
use roomlink_client::manager::RoomConnectionManager;
use roomlink_client::messages::OutboundMessage;
use roomlink_client::reconnect::{reconnect_loop, ReconnectConfig, ReconnectOutcome};
use roomlink_core::room::RoomId;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::commands::{parse_line, Command, HELP};

/// How long to wait for the channel to close on exit.
const SHUTDOWN_GRACE: std::time::Duration = std::time::Duration::from_secs(2);

/// Reconnect bookkeeping for the session loop.
enum Retry {
    /// No retry since the last join.
    None,
    Running { id: u64, cancel: CancellationToken },
    /// The last retry ended without reopening the room. Closes are ignored
    /// until the user joins again.
    GaveUp,
}

impl Retry {
    fn cancel(&mut self) {
        if let Retry::Running { cancel, .. } = std::mem::replace(self, Retry::None) {
            cancel.cancel();
        }
    }
}

/// Run the session until `/quit`, end of input, or Ctrl-C.
pub async fn run<R>(
    manager: RoomConnectionManager,
    initial_room: RoomId,
    reconnect: ReconnectConfig,
    input: R,
) where
    R: AsyncBufRead + Unpin,
{
    let (close_tx, mut close_rx) = mpsc::unbounded_channel::<CloseReason>();
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<(u64, bool)>();

    manager.on_message(|msg| {
        println!("{}: {}", msg.sender_name, msg.body);
    });
    manager.on_error(|err| {
        tracing::warn!(error = %err, "Room error");
    });
    manager.on_close(move |reason| {
        let _ = close_tx.send(reason);
    });

    let mut desired_room = Some(initial_room.clone());
    let mut retry = Retry::None;
    let mut next_retry_id = 0u64;
    join(&manager, initial_room);

    let mut lines = input.lines();

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    let command = match parse_line(&line) {
                        Ok(Some(command)) => command,
                        Ok(None) => continue,
                        Err(e) => {
                            println!("* {e}");
                            continue;
                        }
                    };
                    match command {
                        Command::Say(text) => {
                            if let Err(e) = manager.send(&OutboundMessage::new(text)) {
                                println!("* message not sent: {e}");
                            }
                        }
                        Command::Join(room) => {
                            retry.cancel();
                            desired_room = Some(room.clone());
                            join(&manager, room);
                        }
                        Command::Create => {
                            retry.cancel();
                            let room = RoomId::generate();
                            println!("* created room {room}");
                            desired_room = Some(room.clone());
                            join(&manager, room);
                        }
                        Command::Leave => {
                            retry.cancel();
                            desired_room = None;
                            manager.disconnect();
                        }
                        Command::Status => {
                            let status = manager.status();
                            match status.room {
                                Some(room) => println!("* {} ({room})", status.state),
                                None => println!("* {}", status.state),
                            }
                        }
                        Command::Help => println!("{HELP}"),
                        Command::Quit => break,
                    }
                }
                Ok(None) => {
                    tracing::debug!("Input closed");
                    break;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to read input");
                    break;
                }
            },

            Some(reason) = close_rx.recv() => {
                println!("* disconnected ({reason})");
                // Failed attempts of a running retry also land here; let it back off.
                if reason.is_unexpected() && matches!(retry, Retry::None) {
                    if let Some(room) = desired_room.clone() {
                        next_retry_id += 1;
                        let cancel = spawn_reconnect(
                            manager.clone(),
                            room,
                            reconnect.clone(),
                            next_retry_id,
                            done_tx.clone(),
                        );
                        retry = Retry::Running { id: next_retry_id, cancel };
                    }
                }
            }

            Some((id, rejoined)) = done_rx.recv() => {
                if matches!(retry, Retry::Running { id: current, .. } if current == id) {
                    retry = if rejoined { Retry::None } else { Retry::GaveUp };
                }
            }

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        }
    }

    retry.cancel();
    manager.disconnect();

    let mut state_rx = manager.watch_state();
    let _ = tokio::time::timeout(
        SHUTDOWN_GRACE,
        state_rx.wait_for(|s| *s == ConnectionState::Idle),
    )
    .await;
    manager.clear_listeners();
}

fn join(manager: &RoomConnectionManager, room: RoomId) {
    println!("* joining {room}");
    if let Err(e) = manager.connect(room) {
        println!("* cannot join: {e}");
    }
}

/// Run [`reconnect_loop`] in the background and report `(id, rejoined)`
/// on `done` unless cancelled.
fn spawn_reconnect(
    manager: RoomConnectionManager,
    room: RoomId,
    config: ReconnectConfig,
    id: u64,
    done: mpsc::UnboundedSender<(u64, bool)>,
) -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();

    tokio::spawn(async move {
        let rejoined = match reconnect_loop(&manager, &room, &config, &token).await {
            ReconnectOutcome::Connected { attempts } => {
                println!("* rejoined {room} after {attempts} attempt(s)");
                true
            }
            ReconnectOutcome::Cancelled => return,
            ReconnectOutcome::Exhausted { attempts } => {
                println!("* gave up rejoining {room} after {attempts} attempt(s)");
                false
            }
            ReconnectOutcome::Failed(e) => {
                println!("* cannot rejoin {room}: {e}");
                false
            }
        };
        let _ = done.send((id, rejoined));
    });

    cancel
}
