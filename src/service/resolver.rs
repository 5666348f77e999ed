//! Presence resolver
//!
//! Maps a raw user key to the one authoritative presence record for
//! that user. Reads go through the TTL cache first and fall back to the
//! record store; every successful write refreshes the cache.

use chrono::{DateTime, SubsecRound, Utc};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::config::CacheConfig;
use crate::data::{PresenceRecord, RecordStore, TtlCache, Vector3};
use crate::error::Result;
use crate::federation::canonical_key;
use crate::metrics::observe_store_query;

/// What the presence cache remembers about a user
#[derive(Debug, Clone, PartialEq)]
pub enum CachedPresence {
    Found(PresenceRecord),
    /// The store had no row for this user
    Missing,
}

impl CachedPresence {
    fn into_record(self) -> Option<PresenceRecord> {
        match self {
            CachedPresence::Found(record) => Some(record),
            CachedPresence::Missing => None,
        }
    }
}

/// Presence cache keyed by the 36-character UUID prefix
pub type PresenceCache = TtlCache<String, CachedPresence>;

/// Pick the most recently active record
///
/// The winner has the greatest `max(login, logout)`. On a tie the
/// earlier record in iteration order is kept.
pub fn select_authoritative(
    candidates: impl IntoIterator<Item = PresenceRecord>,
) -> Option<PresenceRecord> {
    candidates.into_iter().fold(None, |best, candidate| match best {
        Some(best) if best.last_activity() >= candidate.last_activity() => Some(best),
        _ => Some(candidate),
    })
}

/// Presence resolver
pub struct PresenceResolver {
    store: Arc<dyn RecordStore>,
    cache: Arc<PresenceCache>,
    ttl: Duration,
    negative_ttl: Duration,
}

impl PresenceResolver {
    /// Create a resolver over an existing store and cache
    pub fn new(store: Arc<dyn RecordStore>, cache: Arc<PresenceCache>, config: &CacheConfig) -> Self {
        Self {
            store,
            cache,
            ttl: config.ttl(),
            negative_ttl: config.negative_ttl(),
        }
    }

    /// Resolve a user key to its authoritative record
    ///
    /// Federated and bare forms of the same user share one cache slot.
    /// Unknown users are cached as missing so repeated lookups stay off
    /// the store. A store failure is reported as "not found" and is not
    /// cached.
    pub async fn resolve(&self, user_id: &str) -> Option<PresenceRecord> {
        match self.try_resolve(user_id).await {
            Ok(record) => record,
            Err(error) => {
                tracing::warn!(user_id, %error, "Presence lookup failed");
                None
            }
        }
    }

    /// Like `resolve`, but keeps a store failure apart from "no row"
    async fn try_resolve(&self, user_id: &str) -> Result<Option<PresenceRecord>> {
        let key = canonical_key(user_id);
        if key.is_empty() {
            return Ok(None);
        }

        if let Some(cached) = self.cache.get(key).await {
            tracing::debug!(user_id = %key, "Presence cache hit");
            return Ok(cached.into_record());
        }

        let rows = self.store.get_all(key).await;
        observe_store_query("get_all", rows.is_ok());
        let rows = rows?;

        if rows.len() > 1 {
            tracing::debug!(
                user_id = %key,
                candidates = rows.len(),
                "Multiple presence rows, picking most recent"
            );
        }

        match select_authoritative(rows.iter().map(PresenceRecord::from_record)) {
            Some(record) => {
                self.cache
                    .put(key.to_string(), CachedPresence::Found(record.clone()), self.ttl)
                    .await;
                Ok(Some(record))
            }
            None => {
                self.cache
                    .put(key.to_string(), CachedPresence::Missing, self.negative_ttl)
                    .await;
                Ok(None)
            }
        }
    }

    /// Mark a user online and stamp the login time
    ///
    /// Returns the updated record, or `None` if the store refused it.
    pub async fn logged_in(&self, user_id: &str) -> Option<PresenceRecord> {
        tracing::debug!(user_id, "User is online");
        self.update(user_id, |record| {
            record.online = true;
            record.login = now();
        })
        .await
    }

    /// Mark a user offline and remember where they left
    pub async fn logged_out(
        &self,
        user_id: &str,
        region_id: Uuid,
        position: Vector3,
        look_at: Vector3,
    ) -> bool {
        tracing::debug!(user_id, "User is offline");
        self.update(user_id, |record| {
            record.online = false;
            record.logout = now();
            record.last_region_id = region_id;
            record.last_position = position;
            record.last_look_at = look_at;
        })
        .await
        .is_some()
    }

    pub async fn set_home(
        &self,
        user_id: &str,
        region_id: Uuid,
        position: Vector3,
        look_at: Vector3,
    ) -> bool {
        self.update(user_id, |record| {
            record.home_region_id = region_id;
            record.home_position = position;
            record.home_look_at = look_at;
        })
        .await
        .is_some()
    }

    pub async fn set_last_position(
        &self,
        user_id: &str,
        region_id: Uuid,
        position: Vector3,
        look_at: Vector3,
    ) -> bool {
        self.update(user_id, |record| {
            record.last_region_id = region_id;
            record.last_position = position;
            record.last_look_at = look_at;
        })
        .await
        .is_some()
    }

    /// Store a display name and mark it as freshly cached
    pub async fn set_display_name(&self, user_id: &str, display_name: &str) -> bool {
        self.set_display_name_at(user_id, display_name, now()).await
    }

    /// Store a display name with an explicit cache stamp
    pub(crate) async fn set_display_name_at(
        &self,
        user_id: &str,
        display_name: &str,
        cached_at: DateTime<Utc>,
    ) -> bool {
        self.update(user_id, |record| {
            record.display_name = display_name.to_string();
            record.name_cached = cached_at.trunc_subsecs(0);
        })
        .await
        .is_some()
    }

    /// Resolve-or-create, mutate, store, and refresh the cache on success
    ///
    /// A record is created only when the store has no row for the user.
    /// If the lookup itself fails nothing is written. The cache is left
    /// alone when the write does not persist.
    async fn update<F>(&self, user_id: &str, mutate: F) -> Option<PresenceRecord>
    where
        F: FnOnce(&mut PresenceRecord),
    {
        let key = canonical_key(user_id);
        if key.is_empty() {
            return None;
        }

        let mut record = match self.try_resolve(user_id).await {
            Ok(Some(record)) => record,
            Ok(None) => PresenceRecord::new(user_id),
            Err(error) => {
                tracing::warn!(user_id, %error, "Presence lookup failed, skipping write");
                return None;
            }
        };
        mutate(&mut record);

        match self.store.store(&record.to_record()).await {
            Ok(true) => {
                observe_store_query("store", true);
                self.cache
                    .put(key.to_string(), CachedPresence::Found(record.clone()), self.ttl)
                    .await;
                Some(record)
            }
            Ok(false) => {
                observe_store_query("store", false);
                tracing::warn!(user_id, "Presence store declined write");
                None
            }
            Err(error) => {
                observe_store_query("store", false);
                tracing::warn!(user_id, %error, "Presence write failed");
                None
            }
        }
    }
}

/// Current time at the one-second resolution rows are stored with
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}
