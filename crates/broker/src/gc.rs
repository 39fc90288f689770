//! Garbage collection of consumed entries
//!
//! For a topic with active procs the watermark is the lowest tone any of them
//! could still be handed again; entries below it that are also older than the
//! minimum prune age are deleted. A topic with no active proc loses every
//! entry older than that age. Topic registrations, proc records (active or
//! not) and system-proc bindings are never collected.

use crate::broker::Broker;
use crate::error::Result;
use crate::keys;
use crate::tone::Tone;
use crate::txn::Transaction;
use proven_kvstore::ScanRange;
use serde::Serialize;

/// Outcome of one collection pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GcReport {
    pub topics_scanned: usize,
    pub entries_deleted: usize,
    /// Cutoff timestamp: only entries strictly older were eligible
    pub cutoff: u64,
}

impl Broker {
    /// Tone below which `topic` may be collected; `None` when no active proc
    /// reads it
    pub fn gc_watermark(&self, topic: &str) -> Option<Tone> {
        self.state
            .procs
            .iter()
            .filter(|proc| proc.topic == topic && proc.is_active())
            .map(|proc| proc.protected_tone())
            .min()
    }

    /// Delete collectable entries of every topic in one atomic batch
    pub fn collect_garbage(&mut self) -> Result<GcReport> {
        let cutoff = self.now().saturating_sub(self.config.min_prune_time);
        let mut report = GcReport {
            cutoff,
            ..GcReport::default()
        };
        let mut txn = Transaction::new();

        for topic in self.state.topics.keys() {
            report.topics_scanned += 1;
            let watermark = self.gc_watermark(topic);

            let scan = ScanRange::prefix(&keys::entry_prefix(topic));
            for item in self.store.scan(scan)? {
                let (key, _) = item?;
                let Some(id) = keys::parse_entry_key(topic, &key) else {
                    continue;
                };
                // Keys are ordered by timestamp first
                if id.timestamp >= cutoff {
                    break;
                }
                if watermark.is_some_and(|watermark| id.tone >= watermark) {
                    continue;
                }
                txn.delete(key);
                txn.delete(keys::id_index_key(topic, id.tone));
                report.entries_deleted += 1;
            }
        }

        txn.commit(self.store.as_ref())?;
        tracing::debug!(
            "GC pass over {} topics deleted {} entries older than {}",
            report.topics_scanned,
            report.entries_deleted,
            cutoff
        );
        Ok(report)
    }
}
