//! Memoization database: retention, preventive pinning and value-level updates
//! layered over a [`MetadataStore`].

use crate::content::{ContentSession, PinResult};
use crate::error::{MetadataError, MetadataResult};
use crate::store::{CompareExchange, Expected, MetadataStore, SelectorEntry, SelectorQuery};
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use memo_core::config::MemoizationConfig;
use memo_core::{
    Clock, ContentHash, ContentHashListWithDeterminism, Record, RecordBody, StrongFingerprint,
    SystemClock, VersionToken, WeakFingerprint,
};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Result of a read that may have refreshed the record's pin time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LookupResult {
    pub record: Option<Record>,
    /// Set when pinning failed and the returned record is stale.
    pub warning: Option<String>,
}

impl LookupResult {
    fn miss() -> Self {
        Self {
            record: None,
            warning: None,
        }
    }

    fn hit(record: Record) -> Self {
        Self {
            record: Some(record),
            warning: None,
        }
    }
}

/// What `add_or_replace` did with the incoming value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AddOutcome {
    /// No record existed; the value was inserted.
    Added(Record),
    /// The stored record was replaced per the determinism policy.
    Replaced(Record),
    /// The stored record already holds this content.
    Unchanged(Record),
    /// A different record is kept and returned instead.
    Existing(Record),
}

impl AddOutcome {
    pub fn record(&self) -> &Record {
        match self {
            Self::Added(r) | Self::Replaced(r) | Self::Unchanged(r) | Self::Existing(r) => r,
        }
    }

    pub fn into_record(self) -> Record {
        match self {
            Self::Added(r) | Self::Replaced(r) | Self::Unchanged(r) | Self::Existing(r) => r,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Added(_) => "added",
            Self::Replaced(_) => "replaced",
            Self::Unchanged(_) => "unchanged",
            Self::Existing(_) => "existing",
        }
    }
}

struct LocalCache {
    ttl: std::time::Duration,
    max_entries: usize,
    entries: DashMap<StrongFingerprint, (Instant, Record)>,
}

impl LocalCache {
    fn get(&self, key: &StrongFingerprint) -> Option<Record> {
        let entry = self.entries.get(key)?;
        if entry.0.elapsed() <= self.ttl {
            return Some(entry.1.clone());
        }
        drop(entry);
        self.entries.remove(key);
        None
    }

    fn put(&self, key: &StrongFingerprint, record: &Record) {
        // len() must not run while an entry guard is held.
        if self.entries.len() >= self.max_entries && !self.entries.contains_key(key) {
            self.sweep();
            if self.entries.len() >= self.max_entries {
                debug!(max_entries = self.max_entries, "local cache full, not caching");
                return;
            }
        }
        self.entries
            .insert(key.clone(), (Instant::now(), record.clone()));
    }

    /// Drop every expired entry.
    fn sweep(&self) {
        let ttl = self.ttl;
        self.entries.retain(|_, (at, _)| at.elapsed() <= ttl);
    }
}

/// Retention-aware access to memoization records.
pub struct MemoizationDatabase {
    store: Arc<dyn MetadataStore>,
    clock: Arc<dyn Clock>,
    config: MemoizationConfig,
    cache: Option<LocalCache>,
}

impl std::fmt::Debug for MemoizationDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoizationDatabase")
            .field("backend", &self.store.backend_name())
            .field("namespace", &self.store.namespace())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl MemoizationDatabase {
    pub fn new(store: Arc<dyn MetadataStore>, config: MemoizationConfig) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn MetadataStore>,
        config: MemoizationConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let mut config = config;
        config.max_conflict_retries = config.max_conflict_retries.max(1);
        let cache = config.local_cache_ttl().map(|ttl| LocalCache {
            ttl,
            max_entries: config.local_cache_max_entries.max(1),
            entries: DashMap::new(),
        });
        Self {
            store,
            clock,
            config,
            cache,
        }
    }

    pub fn store(&self) -> &Arc<dyn MetadataStore> {
        &self.store
    }

    pub fn config(&self) -> &MemoizationConfig {
        &self.config
    }

    pub fn namespace(&self) -> &str {
        self.store.namespace()
    }

    /// Bound one backend call by the operation timeout.
    async fn timed<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = MetadataResult<T>>,
    ) -> MetadataResult<T> {
        let timeout = self.config.operation_timeout();
        match tokio::time::timeout(timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(MetadataError::Timeout {
                operation,
                after: timeout,
            }),
        }
    }

    fn backoff(&self, attempt: u32) -> std::time::Duration {
        self.config
            .retry_base_delay()
            .saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Run an idempotent backend call under the operation timeout, retrying
    /// transient failures.
    async fn call<T, F, Fut>(&self, operation: &'static str, mut f: F) -> MetadataResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = MetadataResult<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match self.timed(operation, f()).await {
                Err(e) if e.is_transient() && attempt < self.config.transient_retries => {
                    let delay = self.backoff(attempt);
                    attempt += 1;
                    warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient metadata failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }

    fn remember(&self, key: &StrongFingerprint, record: Option<&Record>) {
        if let Some(cache) = &self.cache {
            match record {
                Some(record) => cache.put(key, record),
                None => {
                    cache.entries.remove(key);
                }
            }
        }
    }

    async fn read(&self, key: &StrongFingerprint) -> MetadataResult<Option<Record>> {
        let store = &self.store;
        let record = self.call("get", || store.get(key)).await?;
        self.remember(key, record.as_ref());
        Ok(record)
    }

    async fn write(
        &self,
        key: &StrongFingerprint,
        expected: &Expected,
        body: &RecordBody,
    ) -> MetadataResult<CompareExchange> {
        let result = self.write_resolving(key, expected, body).await;
        match &result {
            Ok(CompareExchange::Succeeded(version)) => {
                let record = Record {
                    body: body.clone(),
                    version: version.clone(),
                };
                self.remember(key, Some(&record));
            }
            Ok(CompareExchange::Conflict(current)) => self.remember(key, current.as_ref()),
            Err(_) => self.remember(key, None),
        }
        result
    }

    /// Compare-exchange whose failures are resolved by re-reading.
    ///
    /// A transient error or timeout leaves the outcome unknown: the write may
    /// have landed. The record is re-read and the write is only resent while
    /// the precondition still holds.
    async fn write_resolving(
        &self,
        key: &StrongFingerprint,
        expected: &Expected,
        body: &RecordBody,
    ) -> MetadataResult<CompareExchange> {
        let store = &self.store;
        let mut attempt: u32 = 0;
        loop {
            let error = match self
                .timed("compare_exchange", store.compare_exchange(key, expected, body))
                .await
            {
                Err(e) if e.is_transient() => e,
                other => return other,
            };
            warn!(attempt, error = %error, "compare-exchange outcome unknown, re-reading");

            let current = self.call("get", || store.get(key)).await?;
            match current {
                Some(stored) if stored.body == *body => {
                    debug!(version = %stored.version, "unacknowledged compare-exchange had landed");
                    return Ok(CompareExchange::Succeeded(stored.version));
                }
                current if !expected.holds_for(current.as_ref()) => {
                    return Ok(CompareExchange::Conflict(current));
                }
                _ if attempt >= self.config.transient_retries => return Err(error),
                _ => {
                    let delay = self.backoff(attempt);
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Point lookup. With `prefer_shared == false` a fresh local cache entry may answer.
    #[instrument(skip(self), fields(fingerprint = %key))]
    pub async fn get_content_hash_list(
        &self,
        key: &StrongFingerprint,
        prefer_shared: bool,
    ) -> MetadataResult<Option<Record>> {
        if !prefer_shared
            && let Some(cache) = &self.cache
            && let Some(record) = cache.get(key)
        {
            debug!("served from local cache");
            return Ok(Some(record));
        }
        self.read(key).await
    }

    fn needs_pin(&self, record: &Record, now: OffsetDateTime) -> bool {
        let Some(retention) = self.config.retention_policy() else {
            return false;
        };
        match record.last_content_pinned_time() {
            Some(last) => now - last > retention,
            None => true,
        }
    }

    /// Pin every distinct hash of the record. Returns a description of the failures, if any.
    async fn pin_all(&self, record: &Record, content: &dyn ContentSession) -> Option<String> {
        let mut seen = HashSet::new();
        let hashes: Vec<ContentHash> = record
            .content_hash_list()
            .iter()
            .copied()
            .filter(|h| seen.insert(*h))
            .collect();

        let results: Vec<(ContentHash, PinResult)> = stream::iter(hashes)
            .map(|hash| async move { (hash, content.pin(&hash).await) })
            .buffer_unordered(self.config.pin_concurrency.max(1))
            .collect()
            .await;

        let failures: Vec<String> = results
            .into_iter()
            .filter_map(|(hash, result)| match result {
                PinResult::Success => None,
                PinResult::NotFound => Some(format!("{hash}: not found")),
                PinResult::Error(e) => Some(format!("{hash}: {e}")),
            })
            .collect();

        if failures.is_empty() {
            None
        } else {
            Some(format!(
                "failed to pin {} content hash(es): {}",
                failures.len(),
                failures.join(", ")
            ))
        }
    }

    /// Read a record, pinning its content first if the retention window has lapsed.
    ///
    /// Neither a failed pin nor a failed pin-time update turns a hit into a miss
    /// or an error: the record as read is returned with a warning instead.
    #[instrument(skip(self, content), fields(fingerprint = %key))]
    pub async fn get_and_refresh(
        &self,
        key: &StrongFingerprint,
        content: &dyn ContentSession,
    ) -> MetadataResult<LookupResult> {
        let Some(record) = self.get_content_hash_list(key, false).await? else {
            return Ok(LookupResult::miss());
        };

        let now = self.clock.now();
        if !self.needs_pin(&record, now) {
            return Ok(LookupResult::hit(record));
        }

        if let Some(warning) = self.pin_all(&record, content).await {
            warn!(%warning, "returning record without refreshing pin time");
            return Ok(LookupResult {
                record: Some(record),
                warning: Some(warning),
            });
        }

        let pinned_at = match record.last_content_pinned_time() {
            Some(last) if last > now => last,
            _ => now,
        };
        let body = RecordBody::new(record.body.value.clone(), Some(pinned_at));
        let expected = Expected::Version(record.version.clone());
        match self.write(key, &expected, &body).await {
            Ok(CompareExchange::Succeeded(version)) => {
                debug!(%version, "refreshed pin time");
                Ok(LookupResult::hit(Record { body, version }))
            }
            // Another writer got there first; its record is at least as fresh.
            Ok(CompareExchange::Conflict(Some(current))) => Ok(LookupResult::hit(current)),
            Ok(CompareExchange::Conflict(None)) => Ok(LookupResult::hit(record)),
            Err(e) => {
                warn!(error = %e, "content pinned but pin time not recorded");
                Ok(LookupResult {
                    record: Some(record),
                    warning: Some(format!("pin time not recorded: {e}")),
                })
            }
        }
    }

    /// Value-level compare-exchange.
    ///
    /// Succeeds only if the stored value equals `expected` (`None` meaning no
    /// record) and, when `selector_tie_break` is non-empty, the stored version
    /// equals it. Lost version races are re-evaluated up to
    /// `max_conflict_retries` times.
    #[instrument(skip(self, expected, replacement), fields(fingerprint = %key))]
    pub async fn compare_exchange(
        &self,
        key: &StrongFingerprint,
        selector_tie_break: &str,
        expected: Option<&ContentHashListWithDeterminism>,
        replacement: &ContentHashListWithDeterminism,
    ) -> MetadataResult<CompareExchange> {
        let attempts = self.config.max_conflict_retries;
        for attempt in 1..=attempts {
            let current = self.read(key).await?;
            let precondition = match (&current, expected) {
                (None, None) => Expected::Absent,
                (Some(record), Some(value))
                    if record.value() == value
                        && (selector_tie_break.is_empty()
                            || record.version.as_str() == selector_tie_break) =>
                {
                    Expected::Version(record.version.clone())
                }
                _ => return Ok(CompareExchange::Conflict(current)),
            };

            let body = RecordBody::new(replacement.clone(), Some(self.clock.now()));
            match self.write(key, &precondition, &body).await? {
                CompareExchange::Succeeded(version) => {
                    return Ok(CompareExchange::Succeeded(version));
                }
                CompareExchange::Conflict(_) => {
                    debug!(attempt, "lost version race, re-evaluating");
                }
            }
        }
        Err(MetadataError::RetriesExhausted {
            fingerprint: key.to_string(),
            attempts,
        })
    }

    /// Record-level compare-exchange against a known version.
    #[instrument(skip(self, replacement), fields(fingerprint = %key))]
    pub async fn compare_exchange_record(
        &self,
        key: &StrongFingerprint,
        expected: &Expected,
        replacement: &RecordBody,
    ) -> MetadataResult<CompareExchange> {
        self.write(key, expected, replacement).await
    }

    /// Insert `value`, or reconcile it with the stored record per the determinism policy.
    #[instrument(skip(self, value), fields(fingerprint = %key, determinism = %value.determinism))]
    pub async fn add_or_replace(
        &self,
        key: &StrongFingerprint,
        value: &ContentHashListWithDeterminism,
    ) -> MetadataResult<AddOutcome> {
        let attempts = self.config.max_conflict_retries;
        for attempt in 1..=attempts {
            let current = self.read(key).await?;
            let (expected, replacing) = match &current {
                None => (Expected::Absent, false),
                Some(record) => {
                    let existing = record.determinism();
                    let replaceable = existing.should_be_replaced_with(value.determinism);
                    if record.content_hash_list() == &value.content_hash_list {
                        if existing == value.determinism || !replaceable {
                            return Ok(AddOutcome::Unchanged(record.clone()));
                        }
                    } else if !replaceable {
                        if existing.is_hard_conflict_with(value.determinism) {
                            return Err(MetadataError::DeterminismConflict {
                                fingerprint: key.to_string(),
                            });
                        }
                        return Ok(AddOutcome::Existing(record.clone()));
                    }
                    (Expected::Version(record.version.clone()), true)
                }
            };

            let body = RecordBody::new(value.clone(), Some(self.clock.now()));
            match self.write(key, &expected, &body).await? {
                CompareExchange::Succeeded(version) => {
                    let record = Record { body, version };
                    return Ok(if replacing {
                        info!("replaced memoization record");
                        AddOutcome::Replaced(record)
                    } else {
                        AddOutcome::Added(record)
                    });
                }
                CompareExchange::Conflict(_) => {
                    debug!(attempt, "lost version race, re-evaluating");
                }
            }
        }
        Err(MetadataError::RetriesExhausted {
            fingerprint: key.to_string(),
            attempts,
        })
    }

    /// Overwrite the record unconditionally. Trusted maintenance only.
    #[instrument(skip(self, value), fields(fingerprint = %key))]
    pub async fn force_update(
        &self,
        key: &StrongFingerprint,
        value: &ContentHashListWithDeterminism,
    ) -> MetadataResult<Record> {
        let body = RecordBody::new(value.clone(), Some(self.clock.now()));
        let store = &self.store;
        let version: VersionToken = self
            .call("force_update", || store.force_update(key, &body))
            .await?;
        warn!(%version, "record force-updated");
        let record = Record { body, version };
        self.remember(key, Some(&record));
        Ok(record)
    }

    #[instrument(skip(self), fields(weak = %weak))]
    pub async fn get_selectors(
        &self,
        weak: &WeakFingerprint,
        query: &SelectorQuery,
    ) -> MetadataResult<Vec<SelectorEntry>> {
        let store = &self.store;
        self.call("get_selectors", || store.get_selectors(weak, query))
            .await
    }

    pub async fn health_check(&self) -> MetadataResult<()> {
        let store = &self.store;
        self.call("health_check", || store.health_check()).await
    }
}
