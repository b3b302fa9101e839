//! Parsing of interactive input lines.
//!
//! Plain text is a chat message; lines starting with `/` are commands.

use roomlink_core::error::CoreError;
use roomlink_core::room::RoomId;

/// One parsed line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Send the text to the current room.
    Say(String),
    /// Switch to an existing room.
    Join(RoomId),
    /// Create a fresh room and switch to it.
    Create,
    /// Leave the current room.
    Leave,
    /// Print connection status.
    Status,
    Help,
    Quit,
}

/// Usage text printed by `/help`.
pub const HELP: &str = "\
Commands:
  /join <room>   switch to a room
  /create        create a new room and join it
  /leave         leave the current room
  /status        show connection status
  /quit          exit
Anything else is sent to the current room.";

/// Room joined when none is given on the command line or in the environment.
pub const DEFAULT_ROOM: &str = "general";

/// Pick the room to join at startup: the command-line argument, then the
/// environment, then [`DEFAULT_ROOM`].
pub fn initial_room(arg: Option<String>, env: Option<String>) -> Result<RoomId, CoreError> {
    let given = |name: &String| !name.trim().is_empty();
    let name = arg
        .filter(given)
        .or_else(|| env.filter(given))
        .unwrap_or_else(|| DEFAULT_ROOM.to_string());
    RoomId::new(name.trim())
}

/// Parse a line of input.
///
/// Returns `Ok(None)` for blank lines, which are never sent.
pub fn parse_line(line: &str) -> Result<Option<Command>, CommandError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let Some(rest) = trimmed.strip_prefix('/') else {
        return Ok(Some(Command::Say(trimmed.to_string())));
    };

    let mut parts = rest.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let arg = parts.next();

    let command = match (name, arg) {
        ("join", Some(room)) => Command::Join(RoomId::new(room)?),
        ("join", None) => return Err(CommandError::MissingArgument("join")),
        ("create", _) => Command::Create,
        ("leave", _) => Command::Leave,
        ("status", _) => Command::Status,
        ("help", _) => Command::Help,
        ("quit" | "exit", _) => Command::Quit,
        (other, _) => return Err(CommandError::Unknown(other.to_string())),
    };
    Ok(Some(command))
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Unknown command: /{0} (try /help)")]
    Unknown(String),

    #[error("/{0} needs an argument")]
    MissingArgument(&'static str),

    #[error(transparent)]
    InvalidRoom(#[from] CoreError),
}
