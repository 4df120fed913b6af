use crate::catalog::types::Rid;
use crate::error::EngineError;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;
use tracing::error;

/// Resource a committing transaction must hold exclusively.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LockToken {
    Index(String),
    Record(Rid),
}

/// Commit-time exclusion over records and indexes. A commit names every token it touches and
/// gets all of them at once or none, so two commits never each hold half of what the other
/// needs.
#[derive(Default)]
pub(crate) struct CommitLockTable {
    held: Mutex<BTreeSet<LockToken>>,
    released: Condvar,
    /// Latched when a holder panicked; the table refuses every later request.
    refused: AtomicBool,
}

impl std::fmt::Debug for CommitLockTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitLockTable")
            .field("refused", &self.refused.load(Ordering::Acquire))
            .finish()
    }
}

impl CommitLockTable {
    /// Takes every token in `tokens`, waiting at most `timeout` for holders to release them.
    pub(crate) fn lock_all(
        &self,
        tokens: &[LockToken],
        timeout: Duration,
    ) -> Result<HeldLocks<'_>, EngineError> {
        if self.refused.load(Ordering::Acquire) {
            return Err(EngineError::LockPoisoned { during: "acquire" });
        }
        let wanted: BTreeSet<LockToken> = tokens.iter().cloned().collect();
        if wanted.is_empty() {
            return Ok(HeldLocks {
                table: self,
                tokens: wanted,
            });
        }

        let held = self.held.lock().map_err(|_| self.refuse("acquire"))?;
        let (mut held, wait) = self
            .released
            .wait_timeout_while(held, timeout, |held| !held.is_disjoint(&wanted))
            .map_err(|_| self.refuse("wait"))?;
        if wait.timed_out() {
            return Err(EngineError::LockTimeout);
        }
        held.extend(wanted.iter().cloned());
        Ok(HeldLocks {
            table: self,
            tokens: wanted,
        })
    }

    fn refuse(&self, during: &'static str) -> EngineError {
        self.refused.store(true, Ordering::Release);
        error!(during, "commit lock table poisoned; refusing further commits");
        EngineError::LockPoisoned { during }
    }
}

/// Tokens owned by one commit; dropping it wakes waiters.
#[derive(Debug)]
pub(crate) struct HeldLocks<'a> {
    table: &'a CommitLockTable,
    tokens: BTreeSet<LockToken>,
}

impl Drop for HeldLocks<'_> {
    fn drop(&mut self) {
        if self.tokens.is_empty() {
            return;
        }
        let Ok(mut held) = self.table.held.lock() else {
            self.table.refuse("release");
            return;
        };
        for token in &self.tokens {
            held.remove(token);
        }
        drop(held);
        self.table.released.notify_all();
    }
}
