//! Display-name refresher
//!
//! Refreshes stale display names of federated users in a presence batch.
//! Stale entries are grouped by home authority and each authority gets
//! one request, all in flight at once, each under its own deadline. An
//! authority that fails or times out contributes nothing; the rest of
//! the batch still completes.

use chrono::{DateTime, SubsecRound, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use super::connector::DisplayNameSource;
use super::identifier::{UniversalIdentifier, is_federated};
use crate::config::DisplayNameConfig;
use crate::data::PresenceRecord;
use crate::metrics::{DISPLAY_NAME_REQUESTS_TOTAL, observe_refresh};
use crate::service::PresenceResolver;

/// Users asked of one authority: remote UUID to the user keys carrying it
type AuthorityBatch = HashMap<Uuid, Vec<String>>;

/// Display-name refresher
#[derive(Clone)]
pub struct DisplayNameRefresher {
    source: Arc<dyn DisplayNameSource>,
    resolver: Arc<PresenceResolver>,
    expiration: chrono::Duration,
    request_timeout: Duration,
}

impl DisplayNameRefresher {
    pub fn new(
        source: Arc<dyn DisplayNameSource>,
        resolver: Arc<PresenceResolver>,
        config: &DisplayNameConfig,
    ) -> Self {
        Self {
            source,
            resolver,
            expiration: config.expiration(),
            request_timeout: config.request_timeout(),
        }
    }

    /// Whether an entry's display name should be fetched again
    ///
    /// Only federated users are refreshed; local names are authoritative.
    pub fn is_stale(&self, record: &PresenceRecord, now: DateTime<Utc>) -> bool {
        if !is_federated(&record.user_id) {
            return false;
        }
        match now.checked_sub_signed(self.expiration) {
            Some(cutoff) => record.name_cached < cutoff,
            None => false,
        }
    }

    /// Refresh stale names in `entries`, keeping their order
    ///
    /// Every stale entry with a parseable identifier has its cache stamp
    /// advanced and is written back, whether or not its authority
    /// answered.
    pub async fn refresh(&self, mut entries: Vec<PresenceRecord>) -> Vec<PresenceRecord> {
        let started = Instant::now();
        let now = Utc::now().trunc_subsecs(0);

        let mut batches: HashMap<String, AuthorityBatch> = HashMap::new();
        let mut stale = Vec::new();

        for (index, entry) in entries.iter().enumerate() {
            if !self.is_stale(entry, now) {
                continue;
            }
            let Some(identifier) = UniversalIdentifier::parse(&entry.user_id) else {
                tracing::debug!(user_id = %entry.user_id, "Unparseable federated identifier");
                continue;
            };

            batches
                .entry(identifier.home_url)
                .or_default()
                .entry(identifier.uuid)
                .or_default()
                .push(entry.user_id.clone());
            stale.push(index);
        }

        if batches.is_empty() {
            return entries;
        }

        let authority_count = batches.len();
        tracing::info!(
            "Refreshing {} display names across {} authorities",
            stale.len(),
            authority_count
        );

        let (names, answered) = self.fetch_all(batches).await;

        for index in stale {
            let entry = &mut entries[index];
            if let Some(name) = names.get(&entry.user_id) {
                entry.display_name = name.clone();
            }
            entry.name_cached = now;

            if !self
                .resolver
                .set_display_name_at(&entry.user_id, &entry.display_name, now)
                .await
            {
                tracing::warn!(user_id = %entry.user_id, "Failed to persist display name");
            }
        }

        let outcome = if answered == authority_count {
            "complete"
        } else {
            "partial"
        };
        observe_refresh(outcome, started.elapsed());

        tracing::info!(
            "Display-name refresh {}: {} of {} authorities answered",
            outcome,
            answered,
            authority_count
        );

        entries
    }

    /// Query every authority concurrently and merge the answers
    ///
    /// Returns user key to name, plus how many authorities answered.
    async fn fetch_all(
        &self,
        batches: HashMap<String, AuthorityBatch>,
    ) -> (HashMap<String, String>, usize) {
        let mut tasks = Vec::new();

        for (authority, users) in batches {
            let source = self.source.clone();
            let request_timeout = self.request_timeout;

            let task = tokio::spawn(async move {
                fetch_authority(source, authority, users, request_timeout).await
            });

            tasks.push(task);
        }

        let mut names = HashMap::new();
        let mut answered = 0;
        for task in tasks {
            match task.await {
                Ok(Some(resolved)) => {
                    answered += 1;
                    names.extend(resolved);
                }
                Ok(None) => {}
                Err(error) => tracing::warn!(%error, "Display-name task did not complete"),
            }
        }

        (names, answered)
    }
}

/// Fetch one authority's names under a deadline
///
/// `None` means the authority failed or ran out of time.
async fn fetch_authority(
    source: Arc<dyn DisplayNameSource>,
    authority: String,
    users: AuthorityBatch,
    request_timeout: Duration,
) -> Option<HashMap<String, String>> {
    let ids: Vec<Uuid> = users.keys().copied().collect();

    let reply = tokio::time::timeout(request_timeout, source.get_display_names(&authority, &ids)).await;

    let names = match reply {
        Ok(Ok(names)) => {
            DISPLAY_NAME_REQUESTS_TOTAL.with_label_values(&["success"]).inc();
            names
        }
        Ok(Err(error)) => {
            DISPLAY_NAME_REQUESTS_TOTAL.with_label_values(&["error"]).inc();
            tracing::warn!(%authority, %error, "Display-name request failed");
            return None;
        }
        Err(_) => {
            DISPLAY_NAME_REQUESTS_TOTAL.with_label_values(&["timeout"]).inc();
            tracing::warn!(
                %authority,
                timeout_secs = request_timeout.as_secs(),
                "Display-name request timed out"
            );
            return None;
        }
    };

    let mut resolved = HashMap::new();
    for (uuid, name) in names {
        // Authorities may answer for users we never asked about
        if let Some(keys) = users.get(&uuid) {
            for key in keys {
                resolved.insert(key.clone(), name.clone());
            }
        }
    }

    Some(resolved)
}
