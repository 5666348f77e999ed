//! Data models
//!
//! Rust structs representing stored presence records and the logical
//! presence view derived from them. Timestamps use chrono, region IDs
//! use UUIDs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// =============================================================================
// Stored field names
// =============================================================================

pub const FIELD_HOME_REGION_ID: &str = "HomeRegionID";
pub const FIELD_HOME_POSITION: &str = "HomePosition";
pub const FIELD_HOME_LOOK_AT: &str = "HomeLookAt";
pub const FIELD_LAST_REGION_ID: &str = "LastRegionID";
pub const FIELD_LAST_POSITION: &str = "LastPosition";
pub const FIELD_LAST_LOOK_AT: &str = "LastLookAt";
pub const FIELD_ONLINE: &str = "Online";
pub const FIELD_LOGIN: &str = "Login";
pub const FIELD_LOGOUT: &str = "Logout";
pub const FIELD_DISPLAY_NAME: &str = "DisplayName";
pub const FIELD_NAME_CACHED: &str = "NameCached";

/// Every field `PresenceRecord` models
const PRESENCE_FIELDS: [&str; 11] = [
    FIELD_HOME_REGION_ID,
    FIELD_HOME_POSITION,
    FIELD_HOME_LOOK_AT,
    FIELD_LAST_REGION_ID,
    FIELD_LAST_POSITION,
    FIELD_LAST_LOOK_AT,
    FIELD_ONLINE,
    FIELD_LOGIN,
    FIELD_LOGOUT,
    FIELD_DISPLAY_NAME,
    FIELD_NAME_CACHED,
];

// =============================================================================
// Field defaults
// =============================================================================

/// Values a presence field takes when the stored text is missing or
/// does not parse.
pub struct FieldDefaults;

impl FieldDefaults {
    pub const REGION_ID: Uuid = Uuid::nil();
    pub const VECTOR: Vector3 = Vector3::ZERO;
    pub const ONLINE: bool = false;
    /// Login and logout default to the unix epoch (zero seconds).
    pub const TIMESTAMP: DateTime<Utc> = DateTime::<Utc>::UNIX_EPOCH;
    /// "Never refreshed": older than any real refresh time.
    pub const NAME_CACHED: DateTime<Utc> = DateTime::<Utc>::MIN_UTC;
}

// =============================================================================
// Vector3
// =============================================================================

/// Position or look-at direction inside a region
///
/// Text form is `<x, y, z>`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub const ZERO: Vector3 = Vector3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

impl fmt::Display for Vector3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}, {}, {}>", self.x, self.y, self.z)
    }
}

/// Error returned when a vector string is malformed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseVectorError(String);

impl fmt::Display for ParseVectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid vector: {}", self.0)
    }
}

impl std::error::Error for ParseVectorError {}

impl FromStr for Vector3 {
    type Err = ParseVectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let inner = s
            .trim()
            .trim_start_matches('<')
            .trim_end_matches('>');

        let parts: Vec<f32> = inner
            .split(',')
            .map(|part| part.trim().parse::<f32>())
            .collect::<Result<_, _>>()
            .map_err(|_| ParseVectorError(s.to_string()))?;

        match parts.as_slice() {
            [x, y, z] => Ok(Self::new(*x, *y, *z)),
            _ => Err(ParseVectorError(s.to_string())),
        }
    }
}

// =============================================================================
// Stored record
// =============================================================================

/// One backing row in the record store
///
/// `user_id` is the full key the row was written under, which may be
/// a bare UUID or a federated identifier. Several rows can share the
/// same 36-character UUID prefix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub user_id: String,
    pub data: BTreeMap<String, String>,
}

impl Record {
    /// Create an empty record for a user
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            data: BTreeMap::new(),
        }
    }

    /// Builder-style field setter
    pub fn with(mut self, field: &str, value: impl Into<String>) -> Self {
        self.data.insert(field.to_string(), value.into());
        self
    }

    pub fn field(&self, field: &str) -> Option<&str> {
        self.data.get(field).map(String::as_str)
    }
}

// =============================================================================
// Presence record
// =============================================================================

/// A user's current or most recent session state
#[derive(Debug, Clone, PartialEq)]
pub struct PresenceRecord {
    /// Key as last persisted (bare UUID or federated identifier)
    pub user_id: String,
    pub home_region_id: Uuid,
    pub home_position: Vector3,
    pub home_look_at: Vector3,
    pub last_region_id: Uuid,
    pub last_position: Vector3,
    pub last_look_at: Vector3,
    pub online: bool,
    pub login: DateTime<Utc>,
    pub logout: DateTime<Utc>,
    /// Empty until a display name has been resolved
    pub display_name: String,
    /// When `display_name` was last refreshed
    pub name_cached: DateTime<Utc>,
    /// Stored fields outside the presence set, written back as loaded
    pub extra: BTreeMap<String, String>,
}

impl PresenceRecord {
    /// A record carrying only its user ID, every other field at its default
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            home_region_id: FieldDefaults::REGION_ID,
            home_position: FieldDefaults::VECTOR,
            home_look_at: FieldDefaults::VECTOR,
            last_region_id: FieldDefaults::REGION_ID,
            last_position: FieldDefaults::VECTOR,
            last_look_at: FieldDefaults::VECTOR,
            online: FieldDefaults::ONLINE,
            login: FieldDefaults::TIMESTAMP,
            logout: FieldDefaults::TIMESTAMP,
            display_name: String::new(),
            name_cached: FieldDefaults::NAME_CACHED,
            extra: BTreeMap::new(),
        }
    }

    /// Most recent session activity, used to pick between duplicate rows
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.login.max(self.logout)
    }

    /// Decode a stored record
    ///
    /// Every field is parsed on its own; a field that is missing or
    /// malformed takes its `FieldDefaults` value and the rest of the
    /// record is still used.
    pub fn from_record(record: &Record) -> Self {
        Self {
            user_id: record.user_id.clone(),
            home_region_id: parse_field(record, FIELD_HOME_REGION_ID, FieldDefaults::REGION_ID, parse_uuid),
            home_position: parse_field(record, FIELD_HOME_POSITION, FieldDefaults::VECTOR, parse_vector),
            home_look_at: parse_field(record, FIELD_HOME_LOOK_AT, FieldDefaults::VECTOR, parse_vector),
            last_region_id: parse_field(record, FIELD_LAST_REGION_ID, FieldDefaults::REGION_ID, parse_uuid),
            last_position: parse_field(record, FIELD_LAST_POSITION, FieldDefaults::VECTOR, parse_vector),
            last_look_at: parse_field(record, FIELD_LAST_LOOK_AT, FieldDefaults::VECTOR, parse_vector),
            online: parse_field(record, FIELD_ONLINE, FieldDefaults::ONLINE, parse_bool),
            login: parse_field(record, FIELD_LOGIN, FieldDefaults::TIMESTAMP, parse_unix_seconds),
            logout: parse_field(record, FIELD_LOGOUT, FieldDefaults::TIMESTAMP, parse_unix_seconds),
            display_name: record
                .field(FIELD_DISPLAY_NAME)
                .map(str::to_string)
                .unwrap_or_default(),
            name_cached: parse_field(record, FIELD_NAME_CACHED, FieldDefaults::NAME_CACHED, parse_unix_seconds),
            extra: record
                .data
                .iter()
                .filter(|(field, _)| !PRESENCE_FIELDS.contains(&field.as_str()))
                .map(|(field, value)| (field.clone(), value.clone()))
                .collect(),
        }
    }

    /// Encode into a full stored record
    ///
    /// Fields in `extra` are carried over. A name that was never
    /// refreshed is written without `NameCached`.
    pub fn to_record(&self) -> Record {
        let base = Record {
            user_id: self.user_id.clone(),
            data: self.extra.clone(),
        };
        let mut record = base
            .with(FIELD_HOME_REGION_ID, self.home_region_id.to_string())
            .with(FIELD_HOME_POSITION, self.home_position.to_string())
            .with(FIELD_HOME_LOOK_AT, self.home_look_at.to_string())
            .with(FIELD_LAST_REGION_ID, self.last_region_id.to_string())
            .with(FIELD_LAST_POSITION, self.last_position.to_string())
            .with(FIELD_LAST_LOOK_AT, self.last_look_at.to_string())
            .with(FIELD_ONLINE, if self.online { "True" } else { "False" })
            .with(FIELD_LOGIN, self.login.timestamp().to_string())
            .with(FIELD_LOGOUT, self.logout.timestamp().to_string())
            .with(FIELD_DISPLAY_NAME, self.display_name.clone());

        if self.name_cached != FieldDefaults::NAME_CACHED {
            record = record.with(FIELD_NAME_CACHED, self.name_cached.timestamp().to_string());
        }

        record
    }
}

fn parse_field<T>(record: &Record, field: &str, default: T, parse: fn(&str) -> Option<T>) -> T {
    match record.field(field).map(str::trim) {
        None | Some("") => default,
        Some(raw) => match parse(raw) {
            Some(value) => value,
            None => {
                tracing::debug!(
                    user_id = %record.user_id,
                    field,
                    value = raw,
                    "Unparsable presence field, using default"
                );
                default
            }
        },
    }
}

fn parse_uuid(raw: &str) -> Option<Uuid> {
    Uuid::parse_str(raw).ok()
}

fn parse_vector(raw: &str) -> Option<Vector3> {
    raw.parse().ok()
}

fn parse_bool(raw: &str) -> Option<bool> {
    if raw.eq_ignore_ascii_case("true") {
        Some(true)
    } else if raw.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

fn parse_unix_seconds(raw: &str) -> Option<DateTime<Utc>> {
    let seconds = raw.parse::<i64>().ok()?;
    DateTime::from_timestamp(seconds, 0)
}
