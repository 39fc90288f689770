//! Acknowledging claims, alone or together with new entries

use crate::broker::Broker;
use crate::error::{BrokerError, Result};
use crate::id::ClaimRange;
use crate::log::{Commit, Committed};
use crate::txn::Staged;

impl Broker {
    /// Stage an ack of the proc's last claim
    pub fn stage_ack(&self, name: &str) -> Result<Staged<Option<ClaimRange>>> {
        let mut proc = self
            .state
            .procs
            .get(name)
            .cloned()
            .ok_or(BrokerError::InvalidProc)?;
        let acked = proc.record_ack(self.now());
        Ok(proc.stage_save().map(move |_| acked))
    }

    /// Mark the last claim done; `None` when the proc never claimed
    pub fn ack(&mut self, name: &str) -> Result<Option<ClaimRange>> {
        let staged = self.stage_ack(name)?;
        let acked = self.apply(staged)?.flatten();
        tracing::debug!(
            "Proc {} acked {}",
            name,
            ClaimRange::format_optional(&acked)
        );
        Ok(acked)
    }

    /// Ack and commit in one atomic batch
    ///
    /// Either the ack and every new entry land, or nothing does.
    pub fn ack_commit(
        &mut self,
        name: &str,
        commit: impl Into<Commit>,
    ) -> Result<(Option<ClaimRange>, Committed)> {
        let staged = self.stage_ack(name)?.and(self.stage_commit(commit)?);
        self.apply(staged)?.ok_or(BrokerError::InvalidLogFormat)
    }
}
