//! Presence service
//!
//! Batch presence lookups for callers that ask about many users at once,
//! plus the operator queries over raw rows.

use chrono::Utc;
use std::sync::Arc;

use super::resolver::PresenceResolver;
use crate::data::{PresenceRecord, Record, RecordStore};
use crate::error::AppError;
use crate::federation::DisplayNameRefresher;
use crate::metrics::observe_store_query;

/// How far back a login still counts as "recently online"
const RECENT_LOGIN_WINDOW_DAYS: i64 = 5;

/// Presence service
pub struct PresenceService {
    store: Arc<dyn RecordStore>,
    resolver: Arc<PresenceResolver>,
    /// Present only when remote display-name fetching is enabled
    refresher: Option<DisplayNameRefresher>,
}

impl PresenceService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        resolver: Arc<PresenceResolver>,
        refresher: Option<DisplayNameRefresher>,
    ) -> Self {
        Self {
            store,
            resolver,
            refresher,
        }
    }

    /// Look up presence for a batch of users
    ///
    /// The result has one slot per input, in input order. Without
    /// `refresh_names`, unknown users are `None`. With it, unknown users
    /// get a placeholder carrying only their ID, and stale federated
    /// names are fetched from their home authorities before returning.
    pub async fn get_presence_info(
        &self,
        user_ids: &[String],
        refresh_names: bool,
    ) -> Vec<Option<PresenceRecord>> {
        let mut found = Vec::with_capacity(user_ids.len());
        for user_id in user_ids {
            found.push(self.resolver.resolve(user_id).await);
        }

        if !refresh_names {
            return found;
        }

        let entries: Vec<PresenceRecord> = found
            .into_iter()
            .zip(user_ids)
            .map(|(record, user_id)| record.unwrap_or_else(|| PresenceRecord::new(user_id.as_str())))
            .collect();

        let entries = match &self.refresher {
            Some(refresher) => refresher.refresh(entries).await,
            None => entries,
        };

        entries.into_iter().map(Some).collect()
    }

    /// Raw rows whose user ID starts with `prefix`
    pub async fn show_user_records(&self, prefix: &str) -> Result<Vec<Record>, AppError> {
        let result = self.store.get_all(prefix).await;
        observe_store_query("get_all", result.is_ok());
        result
    }

    /// Number of users marked online whose login is under five days old
    pub async fn count_recently_online(&self) -> Result<usize, AppError> {
        let result = self.store.get_all("").await;
        observe_store_query("get_all", result.is_ok());

        let cutoff = Utc::now() - chrono::Duration::days(RECENT_LOGIN_WINDOW_DAYS);
        let count = result?
            .iter()
            .map(PresenceRecord::from_record)
            .filter(|record| record.online && record.login > cutoff)
            .count();

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::data::{FIELD_LOGIN, FIELD_ONLINE, MemoryRecordStore};
    use crate::service::PresenceCache;

    const ADA: &str = "11111111-1111-1111-1111-111111111111";
    const GRACE: &str = "22222222-2222-2222-2222-222222222222";
    const ALAN: &str = "33333333-3333-3333-3333-333333333333";

    fn service_over(records: Vec<Record>) -> PresenceService {
        let store: Arc<dyn RecordStore> = Arc::new(MemoryRecordStore::with_records(records));
        let config = CacheConfig::default();
        let cache = Arc::new(PresenceCache::new("presence-service-test", config.max_entries));
        let resolver = Arc::new(PresenceResolver::new(store.clone(), cache, &config));
        PresenceService::new(store, resolver, None)
    }

    fn online_since(user_id: &str, login: i64) -> Record {
        Record::new(user_id)
            .with(FIELD_ONLINE, "True")
            .with(FIELD_LOGIN, login.to_string())
    }

    #[tokio::test]
    async fn batch_keeps_input_order_and_length() {
        let service = service_over(vec![Record::new(ADA), Record::new(ALAN)]);
        let ids = vec![ALAN.to_string(), GRACE.to_string(), ADA.to_string()];

        let result = service.get_presence_info(&ids, false).await;

        assert_eq!(result.len(), 3);
        assert_eq!(result[0].as_ref().unwrap().user_id, ALAN);
        assert!(result[1].is_none());
        assert_eq!(result[2].as_ref().unwrap().user_id, ADA);
    }

    #[tokio::test]
    async fn refresh_fills_unknown_users_with_placeholders() {
        let service = service_over(vec![Record::new(ADA)]);
        let federated = format!("{GRACE}@grid.example.org;Grace;Hopper");
        let ids = vec![ADA.to_string(), federated.clone()];

        let result = service.get_presence_info(&ids, true).await;

        assert_eq!(result[0].as_ref().unwrap().user_id, ADA);
        assert_eq!(result[1], Some(PresenceRecord::new(federated)));
    }

    #[tokio::test]
    async fn show_user_records_matches_prefix() {
        let federated = format!("{ADA}@grid.example.org");
        let service = service_over(vec![
            Record::new(ADA),
            Record::new(GRACE),
            Record::new(federated.clone()),
        ]);

        let rows = service.show_user_records(ADA).await.unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r.user_id.as_str()).collect();
        assert_eq!(ids, vec![ADA, federated.as_str()]);
        assert_eq!(service.show_user_records("").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn counts_only_recent_online_logins() {
        let now = Utc::now().timestamp();
        let service = service_over(vec![
            online_since(ADA, now - 60),
            online_since(GRACE, now - 6 * 24 * 3600),
            Record::new(ALAN)
                .with(FIELD_ONLINE, "False")
                .with(FIELD_LOGIN, now.to_string()),
            Record::new("44444444-4444-4444-4444-444444444444")
                .with(FIELD_ONLINE, "True")
                .with(FIELD_LOGIN, "yesterday"),
        ]);

        assert_eq!(service.count_recently_online().await.unwrap(), 1);
    }
}
