pub mod guard;
pub mod syncer;

pub use guard::KindLocks;
pub use syncer::{run_periodic, sync_kind, PageQuery, PageSource};

use serde::Serialize;

use crate::manifest::ItemKind;
use crate::order::Order;
use crate::window::Window;

/// Options controlling a sync operation.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Span to fill. Defaults to the last `window_days` from config.
    pub window: Option<Window>,
    /// Overrides `max_gap_days` from config.
    pub max_gap_days: Option<u32>,
}

/// Report returned after a sync operation completes.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub kind: ItemKind,
    pub status: SyncStatus,
    pub pages_fetched: u64,
    pub items_fetched: u64,
    pub orders_filled: u64,
    pub error: Option<String>,
}

impl SyncReport {
    pub(crate) fn new(kind: ItemKind) -> Self {
        Self {
            kind,
            status: SyncStatus::Success,
            pages_fetched: 0,
            items_fetched: 0,
            orders_filled: 0,
            error: None,
        }
    }

    /// Mark the run failed, keeping what it managed before the error.
    pub(crate) fn fail(mut self, error: &crate::error::Error) -> Self {
        self.status = if self.orders_filled > 0 || self.pages_fetched > 0 {
            SyncStatus::PartialFailure
        } else {
            SyncStatus::Failed
        };
        self.error = Some(error.to_string());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SyncStatus {
    Success,
    PartialFailure,
    Failed,
    /// Another run for the same kind held the guard.
    Skipped,
    Cancelled,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Success => "completed",
            SyncStatus::PartialFailure => "partial",
            SyncStatus::Failed => "failed",
            SyncStatus::Skipped => "skipped",
            SyncStatus::Cancelled => "cancelled",
        }
    }
}

/// Callbacks for reporting sync progress to the caller.
pub trait SyncProgress: Send + Sync {
    fn on_kind_start(&self, _kind: ItemKind) {}
    fn on_page_fetched(&self, _kind: ItemKind, _page: u32, _items: usize) {}
    fn on_order_filled(&self, _kind: ItemKind, _order: &Order) {}
    fn on_kind_complete(&self, _report: &SyncReport) {}
}

/// Progress reporter that ignores every event.
pub struct NoopProgress;

impl SyncProgress for NoopProgress {}
