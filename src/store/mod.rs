//! Filesystem-rooted state store and state machine.
pub mod daemons;
pub mod exclusive;
pub mod inctl;
pub mod layout;
pub mod options;
pub mod primary;
pub mod schedule;

pub use exclusive::ExclusiveGuard;
pub use layout::StateHandle;
pub use primary::PrimaryState;

use std::path::Path;

use crate::error::StoreError;

/// Groups a service's state transition so a failure partway through restores
/// its previous primary state rather than leaving it in an intermediate one.
///
/// This is not a filesystem transaction in the database sense — the
/// individual symlink operations it wraps are already atomic — it exists to
/// give callers a single rollback point when a multi-step transition (mark
/// `starting`, run the payload, mark `started` or `failed`) needs to unwind.
pub struct Transaction<'a> {
    handle: &'a StateHandle,
    service: String,
    previous: Option<PrimaryState>,
    committed: bool,
}

impl<'a> Transaction<'a> {
    /// Begins a transaction for `service`, recording its current primary
    /// state so [`Transaction::rollback`] has something to restore.
    pub fn begin(handle: &'a StateHandle, service: &str) -> Self {
        Self {
            handle,
            service: service.to_string(),
            previous: primary::query(handle, service),
            committed: false,
        }
    }

    /// Marks the transition complete; no rollback will occur on drop.
    pub fn commit(mut self) {
        self.committed = true;
    }

    /// Explicitly restores the service's previous primary state.
    pub fn rollback(mut self, script_path: &Path) -> Result<(), StoreError> {
        self.committed = true; // prevent Drop from trying again
        self.restore(script_path)
    }

    fn restore(&self, script_path: &Path) -> Result<(), StoreError> {
        match self.previous {
            Some(state) => primary::mark(self.handle, &self.service, state, script_path),
            None => Ok(()),
        }
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.committed {
            tracing::warn!(
                service = %self.service,
                "state transaction dropped without commit or explicit rollback"
            );
        }
    }
}
