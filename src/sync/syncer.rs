use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::date_util::truncate;
use crate::error::{Error, Result};
use crate::manifest::ItemKind;
use crate::order::gap::split_long_gaps;
use crate::order::Order;
use crate::range::{DateRange, IdRange};
use crate::reconcile::{FetchedItem, OrderResults};
use crate::storage::repository;
use crate::sync::{KindLocks, SyncOptions, SyncProgress, SyncReport, SyncStatus};
use crate::window::Window;
use crate::SyncLedger;

/// The search filters for one order, in both typed and rendered form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
    pub dates: DateRange,
    pub ids: IdRange,
    /// `X..Y` over timestamps.
    pub date_query: String,
    /// `X..Y`, `>X` or `<Y` over ids; `None` when ids are unconstrained.
    pub id_query: Option<String>,
}

impl PageQuery {
    pub fn for_order(order: &Order) -> Self {
        let dates = order.date_range();
        let ids = order.id_range();
        Self {
            date_query: dates.to_query(),
            id_query: ids.to_query(),
            dates,
            ids,
        }
    }
}

/// A remote collection that can be paged through, newest first.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Items per full page. A shorter page means no more pages follow.
    fn page_size(&self) -> usize;

    /// Page `page` (1-based) of the items matching `query`, newest first.
    async fn fetch_page(&self, kind: ItemKind, query: &PageQuery, page: u32) -> Result<Vec<FetchedItem>>;
}

/// Stale orders tolerated in one run before it gives up.
const MAX_STALE_RETRIES: u32 = 3;

fn cancelled(kind: ItemKind) -> Error {
    Error::Fetch {
        kind: kind.to_string(),
        message: "cancelled".into(),
    }
}

/// Page through one order until it is filled or the remote runs dry.
/// Returns whether the order closed.
#[allow(clippy::too_many_arguments)]
async fn fill_order(
    ledger: &SyncLedger,
    source: &dyn PageSource,
    kind: ItemKind,
    chunk: Order,
    now: DateTime<Utc>,
    report: &mut SyncReport,
    progress: &dyn SyncProgress,
    cancel: &CancellationToken,
) -> Result<bool> {
    let query = PageQuery::for_order(&chunk);
    let mut order = chunk;
    let mut page = 1u32;

    loop {
        if cancel.is_cancelled() {
            return Err(cancelled(kind));
        }
        let mut items = source.fetch_page(kind, &query, page).await?;
        let exhausted = items.len() < source.page_size();
        report.pages_fetched += 1;
        report.items_fetched += items.len() as u64;
        progress.on_page_fetched(kind, page, items.len());

        // Inserts at the remote shift later pages; anything above the
        // order's upper edge is already recorded.
        let range = order.date_range();
        items.retain(|item| range.contains(truncate(item.timestamp)));

        if cancel.is_cancelled() {
            return Err(cancelled(kind));
        }
        let results = OrderResults {
            kind,
            reached_top: order.upper_date() <= now,
            order,
            items,
            exhausted,
            reached_bottom: exhausted,
        };
        let outcome = ledger.save_fetch_outcome(&results).await?;

        match outcome.remaining {
            None => return Ok(true),
            Some(_) if exhausted => return Ok(false),
            Some(next) => {
                order = next;
                page += 1;
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_orders(
    ledger: &SyncLedger,
    source: &dyn PageSource,
    kind: ItemKind,
    window: &DateRange,
    max_gap: chrono::Duration,
    now: DateTime<Utc>,
    report: &mut SyncReport,
    progress: &dyn SyncProgress,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut last_chunk: Option<DateRange> = None;
    let mut stale_retries = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(cancelled(kind));
        }
        let gaps = ledger.list_gaps(kind, window).await?;
        let Some(chunk) = split_long_gaps(gaps, max_gap).pop() else {
            return Ok(());
        };

        let span = chunk.date_range();
        if last_chunk == Some(span) {
            log::warn!("{kind}: order {chunk} made no progress, stopping");
            return Ok(());
        }
        last_chunk = Some(span);

        let filled =
            match fill_order(ledger, source, kind, chunk.clone(), now, report, progress, cancel).await {
                Ok(filled) => filled,
                Err(Error::StaleOrder { message, .. }) if stale_retries < MAX_STALE_RETRIES => {
                    stale_retries += 1;
                    log::warn!("{kind}: {chunk} went stale ({message}), re-deriving gaps");
                    last_chunk = None;
                    continue;
                }
                Err(e) => return Err(e),
            };
        if filled {
            log::info!("{kind}: filled {chunk}");
            report.orders_filled += 1;
            progress.on_order_filled(kind, &chunk);
        }
    }
}

/// Fill every gap of `kind` within the configured window, newest gap first.
///
/// Gaps are re-derived from storage after each one is worked, so a run
/// resumed after a crash picks up exactly where durable state left off.
/// Returns a `Skipped` report when another run for `kind` is in progress.
pub async fn sync_kind(
    ledger: &SyncLedger,
    source: &dyn PageSource,
    locks: &KindLocks,
    kind: ItemKind,
    options: &SyncOptions,
    progress: &dyn SyncProgress,
    cancel: &CancellationToken,
) -> Result<SyncReport> {
    let mut report = SyncReport::new(kind);
    let Some(_guard) = locks.try_acquire(kind) else {
        log::warn!("{kind}: sync already running, skipping");
        report.status = SyncStatus::Skipped;
        return Ok(report);
    };

    let now = truncate(Utc::now());
    let config = ledger.config();
    let window = options
        .window
        .unwrap_or(Window::Rolling(config.window_days))
        .to_range(now)?;
    // Nothing past now can be fetched yet.
    let window = DateRange::new(window.start.min(now), window.end.min(now))?;
    let max_gap = chrono::Duration::days(options.max_gap_days.unwrap_or(config.max_gap_days) as i64);

    progress.on_kind_start(kind);
    let job_id = ledger
        .db()
        .writer()
        .call(move |conn| repository::insert_sync_job(conn, kind, Some(&window)))
        .await?;

    let result = run_orders(
        ledger,
        source,
        kind,
        &window,
        max_gap,
        now,
        &mut report,
        progress,
        cancel,
    )
    .await;

    match result {
        Ok(()) => {}
        Err(_) if cancel.is_cancelled() => {
            log::info!("{kind}: sync cancelled");
            report.status = SyncStatus::Cancelled;
        }
        Err(e) => {
            log::error!("{kind}: sync failed: {e}");
            report = report.fail(&e);
        }
    }

    let (status, pages, items, filled, error) = (
        report.status.as_str(),
        report.pages_fetched,
        report.items_fetched,
        report.orders_filled,
        report.error.clone(),
    );
    ledger
        .db()
        .writer()
        .call(move |conn| {
            repository::update_sync_job(conn, job_id, status, pages, items, filled, error.as_deref())
        })
        .await?;

    progress.on_kind_complete(&report);
    Ok(report)
}

/// Run [`sync_kind`] for `kind` every `every` until `cancel` fires.
/// Ticks that fall due while a run is still going are skipped, not queued.
#[allow(clippy::too_many_arguments)]
pub async fn run_periodic(
    ledger: Arc<SyncLedger>,
    source: Arc<dyn PageSource>,
    locks: Arc<KindLocks>,
    kind: ItemKind,
    options: SyncOptions,
    every: Duration,
    progress: Arc<dyn SyncProgress>,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }
        match sync_kind(&ledger, source.as_ref(), &locks, kind, &options, progress.as_ref(), &cancel).await {
            Ok(report) => log::debug!("{kind}: tick finished {:?}", report.status),
            Err(e) => log::warn!("{kind}: tick failed: {e}"),
        }
    }
    log::info!("{kind}: periodic sync stopped");
}
