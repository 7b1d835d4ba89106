use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::manifest::ItemKind;

/// One guard per item kind. At most one sync run per kind at a time; runs
/// for different kinds proceed independently.
pub struct KindLocks {
    locks: HashMap<ItemKind, Arc<Mutex<()>>>,
}

impl KindLocks {
    pub fn new() -> Self {
        Self {
            locks: ItemKind::ALL
                .into_iter()
                .map(|kind| (kind, Arc::new(Mutex::new(()))))
                .collect(),
        }
    }

    /// Take the guard for `kind` if nobody holds it. Released on drop.
    pub fn try_acquire(&self, kind: ItemKind) -> Option<OwnedMutexGuard<()>> {
        self.locks.get(&kind)?.clone().try_lock_owned().ok()
    }
}

impl Default for KindLocks {
    fn default() -> Self {
        Self::new()
    }
}
