//! Picking the next proc of a competing-consumer group

use crate::broker::Broker;
use crate::claim::Claimed;
use crate::error::{BrokerError, Result};
use crate::proc::ProcOptions;

impl Broker {
    /// Claim for the next available proc among `candidates`
    ///
    /// Candidates that do not exist yet are created and claimed first, in list
    /// order. After that the global proc registry is walked from the rotation
    /// cursor, and the first candidate that is active, has unconsumed entries
    /// and holds no live claim is claimed. The cursor then moves past it, so
    /// repeated calls cycle through every registered proc.
    pub fn get_available_proc(&mut self, candidates: &[ProcOptions]) -> Result<Option<Claimed>> {
        for candidate in candidates {
            if self.state.procs.contains(&candidate.name) {
                continue;
            }
            if let Some(claimed) = self.claim(candidate)? {
                return Ok(Some(claimed));
            }
        }

        let now = self.now();
        let eligible: Vec<(usize, &ProcOptions)> = self
            .state
            .procs
            .rotation()
            .filter(|(_, proc)| {
                proc.is_active()
                    && proc.has_unconsumed(self.state.current_tone(&proc.topic))
                    && (!proc.has_outstanding_claim() || proc.claim_timed_out(now))
            })
            .filter_map(|(index, proc)| {
                candidates
                    .iter()
                    .find(|c| c.name == proc.name && c.topic == proc.topic)
                    .map(|candidate| (index, candidate))
            })
            .collect();

        for (index, candidate) in eligible {
            self.state.procs.advance_past(index);
            match self.claim(candidate) {
                Ok(Some(claimed)) => return Ok(Some(claimed)),
                // Timed out one reclaim too many; try the next one
                Ok(None) | Err(BrokerError::ProcIsDisabled) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use crate::broker::Broker;
    use crate::log::NewEntry;
    use crate::proc::ProcOptions;

    #[test]
    fn test_uncreated_candidates_come_first() {
        let mut broker = Broker::in_memory();
        broker.commit(NewEntry::new("t", "a")).unwrap();
        broker.commit(NewEntry::new("u", "b")).unwrap();

        let candidates = [ProcOptions::new("p1", "t"), ProcOptions::new("p2", "u")];
        let first = broker.get_available_proc(&candidates).unwrap().unwrap();
        assert_eq!(first.proc, "p1");
        let second = broker.get_available_proc(&candidates).unwrap().unwrap();
        assert_eq!(second.proc, "p2");

        // Both hold claims now
        assert!(broker.get_available_proc(&candidates).unwrap().is_none());
    }

    #[test]
    fn test_skips_disabled_and_caught_up() {
        let mut broker = Broker::in_memory();
        broker.commit(NewEntry::new("t", "a")).unwrap();

        let candidates = [ProcOptions::new("a", "t"), ProcOptions::new("b", "t")];
        broker.get_available_proc(&candidates).unwrap().unwrap();
        broker.ack("a").unwrap();
        broker.get_available_proc(&candidates).unwrap().unwrap();
        broker.ack("b").unwrap();

        broker.commit(NewEntry::new("t", "c")).unwrap();
        broker.disable_proc("a").unwrap();

        let next = broker.get_available_proc(&candidates).unwrap().unwrap();
        assert_eq!(next.proc, "b");
        broker.ack("b").unwrap();
        assert!(broker.get_available_proc(&candidates).unwrap().is_none());
    }
}
