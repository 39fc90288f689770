//! Claiming entries for a proc
//!
//! A proc holds at most one outstanding claim. A claim that outlives the
//! proc's reclaim timeout is given back before a new one is handed out.

use crate::broker::Broker;
use crate::error::{BrokerError, Result};
use crate::id::ClaimRange;
use crate::keys;
use crate::proc::{Proc, ProcOptions};
use crate::range::{self, LogEntry};
use proven_kvstore::ScanRange;
use serde::Serialize;
use std::ops::Bound;

/// Entries handed to a proc by one claim
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Claimed {
    pub proc: String,
    pub topic: String,
    pub range: ClaimRange,
    pub entries: Vec<LogEntry>,
}

impl Broker {
    /// Claim the next entries for the proc named in `options`
    ///
    /// The proc is created on first use with the settings in `options`; for an
    /// existing proc only `count` is read. `Ok(None)` means there is nothing to
    /// hand out right now: the proc is caught up or still holds a claim.
    pub fn claim(&mut self, options: &ProcOptions) -> Result<Option<Claimed>> {
        if !keys::is_valid_name(&options.name) {
            return Err(BrokerError::InvalidProc);
        }
        if !keys::is_valid_name(&options.topic) {
            return Err(BrokerError::InvalidTopicFormat);
        }

        let now = self.now();
        let (mut proc, mut dirty) = match self.state.procs.get(&options.name) {
            Some(existing) if existing.topic != options.topic => {
                return Err(BrokerError::ProcNameNotUnique);
            }
            Some(existing) => (existing.clone(), false),
            None => {
                let proc = Proc::create(options, now, self.current_tone(&options.topic));
                tracing::debug!(
                    "Creating proc {} on {} from offset {}",
                    proc.name,
                    proc.topic,
                    proc.offset
                );
                (proc, true)
            }
        };

        if proc.is_disabled() {
            return Err(BrokerError::ProcIsDisabled);
        }

        if !proc.has_unconsumed(self.current_tone(&proc.topic)) {
            return self.finish_empty(proc, dirty);
        }

        if proc.claim_timed_out(now) {
            let given_back = proc.reclaim()?;
            dirty = true;
            tracing::warn!(
                "Proc {} claim {} timed out, reclaimed ({} reclaims)",
                proc.name,
                given_back,
                proc.reclaims
            );
            if proc.is_disabled() {
                tracing::warn!(
                    "Proc {} disabled after reaching {} reclaims",
                    proc.name,
                    proc.reclaims
                );
                self.save_proc(proc)?;
                return Err(BrokerError::ProcIsDisabled);
            }
        }

        if proc.has_outstanding_claim() {
            return self.finish_empty(proc, dirty);
        }

        let entries = self.next_entries(&proc, options.batch_size())?;
        let (Some(first), Some(last)) = (entries.first(), entries.last()) else {
            return self.finish_empty(proc, dirty);
        };
        let range = ClaimRange::new(first.id, last.id);
        proc.record_claim(range, now);

        tracing::debug!("Proc {} claimed {}", proc.name, range);
        let claimed = Claimed {
            proc: proc.name.clone(),
            topic: proc.topic.clone(),
            range,
            entries,
        };
        self.save_proc(proc)?;
        Ok(Some(claimed))
    }

    /// Up to `count` entries after the proc's resume point
    fn next_entries(&self, proc: &Proc, count: usize) -> Result<Vec<LogEntry>> {
        let store = self.store.as_ref();
        let Some(first) = range::first_id_after(store, &proc.topic, proc.resume_tone())? else {
            return Ok(Vec::new());
        };
        let prefix = keys::entry_prefix(&proc.topic);
        let scan = ScanRange::new(
            Bound::Included(keys::entry_key(&proc.topic, &first)),
            ScanRange::prefix(&prefix).upper,
        );
        range::scan_entries(store, &proc.topic, scan, Some(count))
    }

    /// No entries handed out; persist the proc only if it changed
    fn finish_empty(&mut self, proc: Proc, dirty: bool) -> Result<Option<Claimed>> {
        if dirty {
            self.save_proc(proc)?;
        }
        Ok(None)
    }
}
