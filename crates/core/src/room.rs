//! Room identity.
//!
//! The chat server routes `ws/chat/<room>/` with a `\w+` pattern, so a
//! [`RoomId`] is restricted to ASCII word characters. Ids are either
//! supplied by the user ("join") or generated client-side ("create").

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Maximum length of a room name in characters.
pub const MAX_ROOM_NAME_LENGTH: usize = 100;

/// Pattern a room name must match in full.
pub const ROOM_NAME_PATTERN: &str = r"^[A-Za-z0-9_]+$";

static ROOM_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(ROOM_NAME_PATTERN).expect("valid regex"));

/// Opaque name of a chat room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomId(String);

impl RoomId {
    /// Validate and wrap a room name.
    pub fn new(name: impl Into<String>) -> Result<Self, CoreError> {
        let name = name.into();
        validate_room_name(&name)?;
        Ok(Self(name))
    }

    /// Generate a fresh room name for a newly created room.
    ///
    /// Uses a UUID v4 in its 32-character hex form, which always matches
    /// [`ROOM_NAME_PATTERN`].
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RoomId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RoomId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for RoomId {
    type Error = CoreError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl std::str::FromStr for RoomId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl From<RoomId> for String {
    fn from(value: RoomId) -> Self {
        value.0
    }
}

/// Validate a room name: non-empty, bounded, word characters only.
pub fn validate_room_name(name: &str) -> Result<(), CoreError> {
    if name.is_empty() {
        return Err(CoreError::Validation("Room name must not be empty".into()));
    }
    if name.chars().count() > MAX_ROOM_NAME_LENGTH {
        return Err(CoreError::Validation(format!(
            "Room name exceeds maximum length of {MAX_ROOM_NAME_LENGTH} characters"
        )));
    }
    if !ROOM_NAME_RE.is_match(name) {
        return Err(CoreError::Validation(format!(
            "Room name '{name}' may only contain letters, digits and underscores"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_word_characters() {
        let room = RoomId::new("general_2").unwrap();
        assert_eq!(room.as_str(), "general_2");
        assert_eq!(room.to_string(), "general_2");
    }

    #[test]
    fn rejects_empty_name() {
        assert!(RoomId::new("").is_err());
    }

    #[test]
    fn rejects_path_characters() {
        assert!(RoomId::new("a/b").is_err());
        assert!(RoomId::new("room name").is_err());
        assert!(RoomId::new("room-1").is_err());
        assert!(RoomId::new("../etc").is_err());
    }

    #[test]
    fn rejects_overlong_name() {
        let name = "a".repeat(MAX_ROOM_NAME_LENGTH + 1);
        assert!(RoomId::new(name).is_err());

        let name = "a".repeat(MAX_ROOM_NAME_LENGTH);
        assert!(RoomId::new(name).is_ok());
    }

    #[test]
    fn generated_ids_are_valid_and_distinct() {
        let a = RoomId::generate();
        let b = RoomId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
        assert!(validate_room_name(a.as_str()).is_ok());
    }

    #[test]
    fn deserialize_validates() {
        let ok: RoomId = serde_json::from_str(r#""lobby""#).unwrap();
        assert_eq!(ok.as_str(), "lobby");
        assert!(serde_json::from_str::<RoomId>(r#""not ok""#).is_err());
    }
}
