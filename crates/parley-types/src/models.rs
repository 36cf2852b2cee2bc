use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Wall-clock format used for message timestamps, both on disk and on the wire.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A registered account. Field names on disk match the persisted collections,
/// so `password_hash` is stored under `password`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub email: String,
    pub username: String,
    #[serde(rename = "password")]
    pub password_hash: String,
}

impl User {
    /// True when `identifier` names this user by email or by username.
    pub fn is_identified_by(&self, identifier: &str) -> bool {
        self.email == identifier || self.username == identifier
    }
}

/// A chat message in the shared room.
///
/// Messages are never physically removed; `deleted` flips to true once and
/// stays there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: u64,
    pub sender: String,
    /// Already HTML-escaped.
    #[serde(rename = "message")]
    pub content: String,
    #[serde(rename = "timestamp", with = "timestamp")]
    pub created_at: NaiveDateTime,
    #[serde(default)]
    pub deleted: bool,
}

impl Message {
    pub fn is_owned_by(&self, username: &str) -> bool {
        self.sender == username
    }
}

/// The authenticated identity bound to a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionIdentity {
    pub username: String,
}

mod timestamp {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::TIMESTAMP_FORMAT;

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&ts.format(TIMESTAMP_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT).map_err(serde::de::Error::custom)
    }
}
