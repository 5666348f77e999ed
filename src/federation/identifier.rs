//! User identifiers
//!
//! A local user is a bare 36-character UUID. A visitor from another grid
//! carries a federated identifier: the UUID followed by its home
//! authority and, optionally, its name, e.g.
//! `11111111-1111-1111-1111-111111111111@grid.example.org;First;Last`.
//! The classic `;` separated form (`<uuid>;<url>;First Last`) is also
//! accepted.

use uuid::Uuid;

/// Length of the UUID portion every user key starts with
pub const UUID_LEN: usize = 36;

/// Cache and disambiguation key for a user: its UUID prefix
///
/// Keys shorter than a UUID are returned unchanged.
pub fn canonical_key(user_id: &str) -> &str {
    user_id.get(..UUID_LEN).unwrap_or(user_id)
}

/// Whether the key names a user homed on another authority
pub fn is_federated(user_id: &str) -> bool {
    user_id.len() > UUID_LEN
}

/// Parsed federated identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniversalIdentifier {
    pub uuid: Uuid,
    /// Normalized home authority URL, always with scheme and trailing `/`
    pub home_url: String,
    pub first_name: String,
    pub last_name: String,
}

impl UniversalIdentifier {
    /// Parse a federated identifier
    ///
    /// Returns `None` for bare UUIDs and for keys whose UUID or
    /// authority portion is malformed.
    pub fn parse(user_id: &str) -> Option<Self> {
        if !is_federated(user_id) {
            return None;
        }

        let uuid = Uuid::parse_str(user_id.get(..UUID_LEN)?).ok()?;
        let rest = user_id[UUID_LEN..]
            .strip_prefix('@')
            .or_else(|| user_id[UUID_LEN..].strip_prefix(';'))?;

        let mut parts = rest.split(';');
        let home_url = normalize_authority(parts.next()?)?;

        let (first_name, last_name) = match (parts.next(), parts.next()) {
            (Some(first), Some(last)) => (first.trim().to_string(), last.trim().to_string()),
            (Some(full), None) => split_full_name(full),
            _ => (String::new(), String::new()),
        };

        Some(Self {
            uuid,
            home_url,
            first_name,
            last_name,
        })
    }
}

fn split_full_name(full: &str) -> (String, String) {
    let full = full.trim();
    match full.split_once([' ', '.']) {
        Some((first, last)) => (first.to_string(), last.to_string()),
        None => (full.to_string(), String::new()),
    }
}

/// Normalize an authority into an absolute URL with a trailing slash
///
/// Bare host names get an `http://` scheme.
pub fn normalize_authority(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let candidate = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("http://{}", raw)
    };

    let parsed = url::Url::parse(&candidate).ok()?;
    parsed.host_str()?;

    let mut normalized = parsed.to_string();
    if !normalized.ends_with('/') {
        normalized.push('/');
    }
    Some(normalized)
}
