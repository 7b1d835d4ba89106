pub mod cache;
pub mod config;
pub mod date_util;
pub mod error;
pub mod manifest;
pub mod metrics;
pub mod order;
pub mod range;
pub mod reconcile;
pub mod storage;
pub mod sync;
pub mod window;

pub use cache::{InvalidationHook, ManifestCache};
pub use config::LedgerConfig;
pub use error::{Error, Result};
pub use manifest::merge::MergeOutcome;
pub use manifest::{ItemKind, Manifest};
pub use metrics::{CoverageSummary, KindAvailability, LedgerStatus};
pub use order::{Boundary, Order};
pub use range::{DateRange, IdRange};
pub use reconcile::{FetchedItem, OrderResults, ReconcileOutcome};
pub use storage::Database;
pub use sync::{NoopProgress, SyncOptions, SyncProgress, SyncReport, SyncStatus};
pub use window::Window;

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use date_util::resolution;
use manifest::merge::merge_all;
use order::gap::{compute_gaps, split_long_gaps};
use reconcile::reconcile;
use storage::repository;

fn stale(kind: ItemKind, message: String) -> Error {
    Error::StaleOrder {
        kind: kind.to_string(),
        message,
    }
}

/// Fail unless storage still matches what `order` was derived from: every
/// boundary manifest unchanged, and nothing recorded strictly inside it.
fn check_order_fresh(conn: &Connection, kind: ItemKind, order: &Order) -> Result<()> {
    for boundary in order.manifests() {
        let Some(id) = boundary.id else {
            return Err(stale(kind, format!("{boundary} was never saved")));
        };
        match repository::get_manifest(conn, id)? {
            Some(current) if current.same_coverage(boundary) => {}
            Some(current) => return Err(stale(kind, format!("{boundary} is now {current}"))),
            None => return Err(stale(kind, format!("{boundary} no longer exists"))),
        }
    }

    let mut start = order.lower_date();
    if order.lower().is_manifest() {
        start += resolution();
    }
    let mut end = order.upper_date();
    if order.upper().is_manifest() {
        end -= resolution();
    }
    if start > end {
        return Ok(());
    }

    let interior = DateRange { start, end };
    let known: Vec<i64> = order.manifests().filter_map(|m| m.id).collect();
    let intruder = repository::list_manifests(conn, Some(kind), Some(&interior))?
        .into_iter()
        .find(|m| m.id.is_some_and(|id| !known.contains(&id)));
    match intruder {
        Some(m) => Err(stale(kind, format!("{m} now lies inside {order}"))),
        None => Ok(()),
    }
}

/// Swap an unsaved manifest boundary for the saved manifest with the same coverage.
fn rebind(boundary: Boundary, saved: &[Manifest]) -> Boundary {
    match boundary {
        Boundary::Manifest(m) => Boundary::Manifest(
            saved
                .iter()
                .find(|s| s.same_coverage(&m))
                .cloned()
                .unwrap_or(m),
        ),
        raw => raw,
    }
}

/// Main entry point: the coverage ledger over one database.
pub struct SyncLedger {
    db: Database,
    cache: ManifestCache,
    config: LedgerConfig,
}

impl SyncLedger {
    pub fn new(db: Database, config: LedgerConfig) -> Self {
        Self {
            cache: ManifestCache::new(config.cache_ttl),
            db,
            config,
        }
    }

    /// Build a ledger with configuration read from the database.
    pub async fn open(db: Database) -> Result<Self> {
        let config = LedgerConfig::load(&db).await?;
        Ok(Self::new(db, config))
    }

    /// Access the database (for direct queries in the CLI).
    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Register a callback run after every write that changes coverage.
    pub fn on_invalidate(&self, hook: InvalidationHook) {
        self.cache.on_invalidate(hook);
    }

    // ── Reads ──────────────────────────────────────────────────────

    pub async fn get(&self, id: i64) -> Result<Manifest> {
        self.db
            .reader()
            .call(move |conn| repository::get_manifest(conn, id))
            .await?
            .ok_or_else(|| Error::NotFound(format!("manifest {id}")))
    }

    /// Manifests ordered by kind then start, optionally narrowed to those
    /// overlapping `window`.
    pub async fn list(
        &self,
        kind: Option<ItemKind>,
        window: Option<&DateRange>,
    ) -> Result<Vec<Manifest>> {
        if let Some(hit) = self.cache.get(kind, window) {
            return Ok(hit);
        }

        let generation = self.cache.generation();
        let owned = window.copied();
        let manifests = self
            .db
            .reader()
            .call(move |conn| repository::list_manifests(conn, kind, owned.as_ref()))
            .await?;
        self.cache.put(kind, window, &manifests, generation);
        Ok(manifests)
    }

    /// Orders still to fetch for `kind` within `window`, oldest first.
    pub async fn list_gaps(&self, kind: ItemKind, window: &DateRange) -> Result<Vec<Order>> {
        let manifests = self.list(Some(kind), Some(window)).await?;
        Ok(compute_gaps(&manifests, window))
    }

    /// Like [`list_gaps`](Self::list_gaps) with every order cut down to the
    /// configured maximum span.
    pub async fn list_gaps_split(&self, kind: ItemKind, window: &DateRange) -> Result<Vec<Order>> {
        let gaps = self.list_gaps(kind, window).await?;
        Ok(split_long_gaps(gaps, self.config.max_gap()))
    }

    /// Availability of each of `kinds` over `window`; every kind when empty.
    pub async fn availability(
        &self,
        window: &DateRange,
        kinds: &[ItemKind],
    ) -> Result<Vec<KindAvailability>> {
        self.availability_at(window, kinds, Utc::now()).await
    }

    pub async fn availability_at(
        &self,
        window: &DateRange,
        kinds: &[ItemKind],
        now: DateTime<Utc>,
    ) -> Result<Vec<KindAvailability>> {
        let kinds: &[ItemKind] = if kinds.is_empty() { &ItemKind::ALL } else { kinds };
        let mut out = Vec::with_capacity(kinds.len());
        for &kind in kinds {
            let manifests = self.list(Some(kind), Some(window)).await?;
            out.push(metrics::estimate(&manifests, window, kind, now));
        }
        Ok(out)
    }

    pub async fn list_stale(&self, kind: ItemKind, before: DateTime<Utc>) -> Result<Vec<Manifest>> {
        self.db
            .reader()
            .call(move |conn| repository::list_stale(conn, kind, before))
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    pub async fn status(&self) -> Result<LedgerStatus> {
        let manifests = self.list(None, None).await?;
        let last_synced = self
            .db
            .reader()
            .call(|conn| repository::last_completed_jobs(conn))
            .await?;
        Ok(LedgerStatus {
            kinds: ItemKind::ALL
                .into_iter()
                .map(|kind| metrics::summarize(kind, &manifests))
                .collect(),
            last_synced: last_synced.into_iter().collect(),
        })
    }

    // ── Writes ─────────────────────────────────────────────────────

    /// Fold one page of fetch results into storage.
    ///
    /// Runs as a single transaction: the order is checked against storage,
    /// reconciled, and the discards and saves applied together. The returned
    /// `remaining` order leans on the saved forms of any new manifests, so it
    /// can be handed straight back in with the next page.
    pub async fn save_fetch_outcome(&self, results: &OrderResults) -> Result<ReconcileOutcome> {
        let kind = results.kind;
        let results = results.clone();
        let outcome = self
            .db
            .transaction(move |tx| {
                check_order_fresh(tx, kind, &results.order)?;
                let outcome = reconcile(&results)?;
                if outcome.is_noop() {
                    return Ok(outcome);
                }
                repository::delete_manifests(tx, &outcome.discard)?;
                let saved = repository::save_manifests(tx, &outcome.save)?;
                let remaining = match outcome.remaining {
                    Some(order) => {
                        let (lower, upper) = order.into_boundaries();
                        Some(Order::new(rebind(lower, &saved), rebind(upper, &saved))?)
                    }
                    None => None,
                };
                Ok(ReconcileOutcome {
                    discard: outcome.discard,
                    save: saved,
                    remaining,
                })
            })
            .await?;

        if !outcome.is_noop() {
            self.cache.invalidate(&[kind]);
        }
        Ok(outcome)
    }

    /// Coalesce touching or overlapping manifests of `kind` that meet `window`.
    pub async fn merge_all_in_range(&self, kind: ItemKind, window: &DateRange) -> Result<MergeOutcome> {
        let window = *window;
        let outcome = self
            .db
            .transaction(move |tx| {
                let existing = repository::list_manifests(tx, Some(kind), Some(&window))?;
                let mut outcome = merge_all(existing.clone())?;
                repository::delete_manifests(tx, &outcome.discard)?;
                let changed: Vec<Manifest> = outcome
                    .keep
                    .iter()
                    .filter(|m| !existing.contains(m))
                    .cloned()
                    .collect();
                let saved = repository::save_manifests(tx, &changed)?;
                for m in outcome.keep.iter_mut() {
                    if let Some(s) = saved.iter().find(|s| s.id == m.id) {
                        *m = s.clone();
                    }
                }
                Ok(outcome)
            })
            .await?;

        if !outcome.discard.is_empty() {
            log::info!(
                "merged {kind} manifests in {window}: kept {}, discarded {}",
                outcome.keep.len(),
                outcome.discard.len()
            );
            self.cache.invalidate(&[kind]);
        }
        Ok(outcome)
    }

    /// Record that manifest `id` was re-validated for mutations at `at`.
    pub async fn mark_refreshed(&self, id: i64, at: DateTime<Utc>) -> Result<Manifest> {
        let updated = self
            .db
            .writer()
            .call(move |conn| {
                if !repository::mark_refreshed(conn, id, at)? {
                    return Ok(None);
                }
                repository::get_manifest(conn, id)
            })
            .await?
            .ok_or_else(|| Error::NotFound(format!("manifest {id}")))?;
        self.cache.invalidate(&[updated.kind]);
        Ok(updated)
    }

    // ── Config commands ────────────────────────────────────────────

    pub async fn config_get(&self, key: &str) -> Result<Option<String>> {
        self.db
            .reader()
            .call({
                let key = key.to_string();
                move |conn| repository::get_config(conn, &key)
            })
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    /// Store a setting. Takes effect the next time the ledger is opened.
    pub async fn config_set(&self, key: &str, value: &str) -> Result<()> {
        LedgerConfig::validate_setting(key, value)?;
        self.db
            .writer()
            .call({
                let key = key.to_string();
                let value = value.to_string();
                move |conn| repository::set_config(conn, &key, &value)
            })
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    pub async fn config_list(&self) -> Result<Vec<(String, String)>> {
        self.db
            .reader()
            .call(|conn| repository::list_config(conn))
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }
}
