//! Manual proc transitions: reclaim, disable, resume and destroy

use crate::broker::Broker;
use crate::error::{BrokerError, Result};
use crate::id::ClaimRange;
use crate::keys;
use crate::proc::Proc;
use crate::txn::{Staged, Transaction};
use proven_kvstore::ScanRange;

impl Broker {
    fn proc_for_update(&self, name: &str) -> Result<Proc> {
        self.state
            .procs
            .get(name)
            .cloned()
            .ok_or(BrokerError::InvalidProc)
    }

    /// Give back the outstanding claim; returns the range given back
    pub fn reclaim(&mut self, name: &str) -> Result<ClaimRange> {
        let mut proc = self.proc_for_update(name)?;
        let given_back = proc.reclaim()?;
        if proc.is_disabled() {
            tracing::warn!(
                "Proc {} disabled after reaching {} reclaims",
                proc.name,
                proc.reclaims
            );
        }
        tracing::debug!("Proc {} reclaimed {}", name, given_back);
        self.save_proc(proc)?;
        Ok(given_back)
    }

    pub fn disable_proc(&mut self, name: &str) -> Result<Proc> {
        let mut proc = self.proc_for_update(name)?;
        proc.disable()?;
        tracing::info!("Disabled proc {}", name);
        self.save_proc(proc.clone())?;
        Ok(proc)
    }

    /// Reactivate a disabled proc; its reclaim count starts over
    pub fn resume_proc(&mut self, name: &str) -> Result<Proc> {
        let mut proc = self.proc_for_update(name)?;
        proc.resume()?;
        tracing::info!("Resumed proc {}", name);
        self.save_proc(proc.clone())?;
        Ok(proc)
    }

    /// Delete every persisted field of the proc and forget it
    pub fn destroy_proc(&mut self, name: &str) -> Result<Proc> {
        let proc = self.proc_for_update(name)?;

        let mut txn = Transaction::new();
        let scan = ScanRange::prefix(&keys::proc_prefix(&proc.topic, &proc.name));
        for item in self.store.scan(scan)? {
            let (key, _) = item?;
            txn.delete(key);
        }

        let name = proc.name.clone();
        let staged = Staged::new(txn, move |state| {
            state.procs.remove(&name);
        });
        // A registered proc always has persisted fields, but forget it even
        // if the store held none
        if self.apply(staged)?.is_none() {
            self.state.procs.remove(&proc.name);
        }
        tracing::info!("Destroyed proc {}", proc.name);
        Ok(proc)
    }
}

#[cfg(test)]
mod tests {
    use crate::broker::Broker;
    use crate::error::BrokerError;
    use crate::log::NewEntry;
    use crate::proc::ProcOptions;

    #[test]
    fn test_unknown_proc() {
        let mut broker = Broker::in_memory();
        assert!(matches!(broker.reclaim("nope"), Err(BrokerError::InvalidProc)));
        assert!(matches!(
            broker.disable_proc("nope"),
            Err(BrokerError::InvalidProc)
        ));
        assert!(matches!(
            broker.resume_proc("nope"),
            Err(BrokerError::InvalidProc)
        ));
        assert!(matches!(
            broker.destroy_proc("nope"),
            Err(BrokerError::InvalidProc)
        ));
    }

    #[test]
    fn test_disable_and_resume_are_not_idempotent() {
        let mut broker = Broker::in_memory();
        broker.commit(NewEntry::new("t", "a")).unwrap();
        broker.claim(&ProcOptions::new("p", "t")).unwrap();

        broker.disable_proc("p").unwrap();
        assert!(matches!(
            broker.disable_proc("p"),
            Err(BrokerError::ProcAlreadyDisabled)
        ));
        assert!(matches!(
            broker.claim(&ProcOptions::new("p", "t")),
            Err(BrokerError::ProcIsDisabled)
        ));
        assert!(matches!(broker.reclaim("p"), Err(BrokerError::ProcIsDisabled)));

        broker.resume_proc("p").unwrap();
        assert!(matches!(
            broker.resume_proc("p"),
            Err(BrokerError::ProcAlreadyActive)
        ));
    }

    #[test]
    fn test_destroy_removes_record() {
        let mut broker = Broker::in_memory();
        broker.commit(NewEntry::new("t", "a")).unwrap();
        broker.claim(&ProcOptions::new("p", "t")).unwrap();

        let destroyed = broker.destroy_proc("p").unwrap();
        assert_eq!(destroyed.name, "p");
        assert!(broker.inspect_proc("p").is_none());

        // The name is free again, even on another topic
        broker.commit(NewEntry::new("u", "b")).unwrap();
        let claimed = broker.claim(&ProcOptions::new("p", "u")).unwrap().unwrap();
        assert_eq!(claimed.topic, "u");
    }
}
