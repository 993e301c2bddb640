//! Cross-replica bank hash agreement.
//!
//! Every finalized slot records the locally computed bank hash. Votes from
//! other validators contribute the hash they computed for the same slot,
//! grouped by value with accumulated stake. A slot resolves once one hash
//! is backed by a supermajority of stake: it matches if that hash equals
//! ours and is a fatal mismatch otherwise.
//!
//! The watermark is the highest slot known to agree. It only moves forward.

use forkline_types::{has_supermajority, Hash, Pubkey, Slot};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, trace};

/// Comparator shared between the finalize path and epoch bookkeeping.
pub type SharedBankHashComparator = Arc<Mutex<BankHashComparator>>;

/// Result of checking one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashCheck {
    /// A supermajority agrees with the local hash.
    Match,
    /// A supermajority agrees on a different hash.
    Mismatch {
        /// Locally computed hash.
        local: Hash,
        /// Hash the cluster converged on.
        corroborated: Hash,
    },
    /// Not enough stake observed yet, or no local hash.
    Pending,
}

/// The local bank hash disagrees with the cluster.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("bank hash mismatch at slot {slot}: local {local}, cluster {corroborated}")]
pub struct BankHashMismatch {
    /// Slot.
    pub slot: Slot,
    /// Locally computed hash.
    pub local: Hash,
    /// Corroborated hash.
    pub corroborated: Hash,
}

/// A hash recorded for a slot the watermark has already passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("slot {slot} is at or below the bank hash watermark {watermark}")]
pub struct StaleBankHash {
    /// Slot.
    pub slot: Slot,
    /// Watermark at the time of the insert.
    pub watermark: Slot,
}

#[derive(Debug, Default)]
struct Entry {
    local: Option<Hash>,
    stake_by_hash: BTreeMap<Hash, u64>,
    voters: HashSet<Pubkey>,
}

/// Tracks observed bank hashes per slot.
#[derive(Debug)]
pub struct BankHashComparator {
    entries: BTreeMap<Slot, Entry>,
    watermark: Slot,
    total_stake: u64,
}

impl BankHashComparator {
    /// Create a comparator whose watermark starts at `watermark`.
    pub fn new(watermark: Slot, total_stake: u64) -> Self {
        Self {
            entries: BTreeMap::new(),
            watermark,
            total_stake,
        }
    }

    /// Wrap in a shared lock.
    pub fn shared(self) -> SharedBankHashComparator {
        Arc::new(Mutex::new(self))
    }

    /// Highest slot known to agree.
    pub fn watermark(&self) -> Slot {
        self.watermark
    }

    /// Raise the watermark. Never lowers it.
    pub fn set_watermark(&mut self, slot: Slot) {
        self.watermark = self.watermark.max(slot);
    }

    /// Stake the supermajority is computed against.
    pub fn total_stake(&self) -> u64 {
        self.total_stake
    }

    /// Update the stake the supermajority is computed against.
    pub fn set_total_stake(&mut self, total_stake: u64) {
        self.total_stake = total_stake;
    }

    /// Number of tracked slots.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no slot is tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record a hash for `slot`. `have_local` marks it as our own result;
    /// `stake` is the weight of the observation.
    ///
    /// Slots at or below the watermark can no longer be compared and are
    /// refused.
    pub fn insert(
        &mut self,
        slot: Slot,
        hash: Hash,
        have_local: bool,
        stake: u64,
    ) -> Result<(), StaleBankHash> {
        if slot <= self.watermark {
            return Err(StaleBankHash {
                slot,
                watermark: self.watermark,
            });
        }
        self.record(slot, hash, have_local, stake);
        Ok(())
    }

    /// Record `voter`'s hash for `slot`, counting each voter once per slot.
    /// Votes for slots at or below the watermark are dropped.
    pub fn observe(&mut self, slot: Slot, hash: Hash, voter: Pubkey, stake: u64) {
        if slot <= self.watermark {
            return;
        }
        if !self.entries.entry(slot).or_default().voters.insert(voter) {
            return;
        }
        self.record(slot, hash, false, stake);
    }

    fn record(&mut self, slot: Slot, hash: Hash, have_local: bool, stake: u64) {
        let entry = self.entries.entry(slot).or_default();
        if have_local {
            entry.local = Some(hash);
        }
        *entry.stake_by_hash.entry(hash).or_insert(0) += stake;
        trace!(slot = slot.0, hash = %hash, have_local, stake, "Bank hash recorded");
    }

    /// Check agreement for `slot`.
    pub fn check(&self, slot: Slot) -> HashCheck {
        let Some(entry) = self.entries.get(&slot) else {
            return HashCheck::Pending;
        };
        let Some(local) = entry.local else {
            return HashCheck::Pending;
        };
        let corroborated = entry
            .stake_by_hash
            .iter()
            .find(|(_, stake)| has_supermajority(**stake, self.total_stake))
            .map(|(hash, _)| *hash);
        match corroborated {
            Some(hash) if hash == local => HashCheck::Match,
            Some(hash) => HashCheck::Mismatch {
                local,
                corroborated: hash,
            },
            None => HashCheck::Pending,
        }
    }

    /// Advance the watermark through `watermark + 1 ..= up_to`.
    ///
    /// Slots nothing was recorded for are stepped over. The scan stops at
    /// the first tracked slot that is still pending, including one the
    /// cluster voted on that has not been replayed here yet. Returns the
    /// new watermark.
    pub fn scan(&mut self, up_to: Slot) -> Result<Slot, BankHashMismatch> {
        let start = self.watermark.next();
        if start > up_to {
            return Ok(self.watermark);
        }

        let candidates: Vec<Slot> = self
            .entries
            .range(start..=up_to)
            .map(|(slot, _)| *slot)
            .collect();
        for slot in candidates {
            match self.check(slot) {
                HashCheck::Match => self.watermark = slot,
                HashCheck::Pending => break,
                HashCheck::Mismatch {
                    local,
                    corroborated,
                } => {
                    error!(
                        slot = slot.0,
                        local = %local,
                        corroborated = %corroborated,
                        watermark = self.watermark.0,
                        "Bank hash mismatch"
                    );
                    return Err(BankHashMismatch {
                        slot,
                        local,
                        corroborated,
                    });
                }
            }
        }

        let watermark = self.watermark;
        self.entries.retain(|slot, _| *slot > watermark);
        debug!(watermark = watermark.0, "Bank hash watermark");
        Ok(watermark)
    }

    /// Drop every entry below `slot`.
    pub fn prune(&mut self, slot: Slot) -> usize {
        let before = self.entries.len();
        self.entries = self.entries.split_off(&slot);
        before - self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forkline_test_helpers::test_pubkey;
    use tracing_test::traced_test;

    fn hash(s: &str) -> Hash {
        Hash::from_bytes(s.as_bytes())
    }

    #[test]
    fn test_match_needs_supermajority() {
        let mut cmp = BankHashComparator::new(Slot(0), 30);
        cmp.insert(Slot(1), hash("a"), true, 0).unwrap();
        assert_eq!(cmp.check(Slot(1)), HashCheck::Pending);

        cmp.observe(Slot(1), hash("a"), test_pubkey(1), 10);
        cmp.observe(Slot(1), hash("a"), test_pubkey(2), 10);
        // Exactly two thirds is not enough.
        assert_eq!(cmp.check(Slot(1)), HashCheck::Pending);

        cmp.observe(Slot(1), hash("a"), test_pubkey(3), 1);
        assert_eq!(cmp.check(Slot(1)), HashCheck::Match);
    }

    #[test]
    fn test_voter_counted_once() {
        let mut cmp = BankHashComparator::new(Slot(0), 30);
        cmp.insert(Slot(1), hash("a"), true, 0).unwrap();
        for _ in 0..3 {
            cmp.observe(Slot(1), hash("a"), test_pubkey(1), 15);
        }
        assert_eq!(cmp.check(Slot(1)), HashCheck::Pending);
    }

    #[test]
    fn test_no_local_hash_is_pending() {
        let mut cmp = BankHashComparator::new(Slot(0), 30);
        cmp.insert(Slot(1), hash("a"), false, 30).unwrap();
        assert_eq!(cmp.check(Slot(1)), HashCheck::Pending);
        assert_eq!(cmp.check(Slot(2)), HashCheck::Pending);
    }

    #[traced_test]
    #[test]
    fn test_scan_steps_over_untracked_and_stops_at_pending() {
        let mut cmp = BankHashComparator::new(Slot(0), 30);
        for slot in [1, 3, 5] {
            cmp.insert(Slot(slot), hash("x"), true, 0).unwrap();
        }
        cmp.insert(Slot(1), hash("x"), false, 25).unwrap();
        cmp.insert(Slot(3), hash("x"), false, 25).unwrap();
        // Nothing recorded for slots 2 and 4; slot 5 is pending.
        assert_eq!(cmp.scan(Slot(5)), Ok(Slot(3)));
        assert_eq!(cmp.watermark(), Slot(3));

        cmp.insert(Slot(5), hash("x"), false, 25).unwrap();
        assert_eq!(cmp.scan(Slot(5)), Ok(Slot(5)));
        assert!(cmp.is_empty());
    }

    #[traced_test]
    #[test]
    fn test_voted_slot_not_yet_replayed_holds_scan() {
        let mut cmp = BankHashComparator::new(Slot(0), 30);
        cmp.observe(Slot(3), hash("cluster 3"), test_pubkey(1), 11);
        cmp.observe(Slot(3), hash("cluster 3"), test_pubkey(2), 11);
        assert_eq!(cmp.check(Slot(3)), HashCheck::Pending);

        cmp.insert(Slot(4), hash("bank 4"), true, 0).unwrap();
        cmp.observe(Slot(4), hash("bank 4"), test_pubkey(1), 11);
        cmp.observe(Slot(4), hash("bank 4"), test_pubkey(2), 11);
        assert_eq!(cmp.check(Slot(4)), HashCheck::Match);

        // Slot 4 agrees, but slot 3 is still waiting on its local hash.
        assert_eq!(cmp.scan(Slot(4)), Ok(Slot(0)));

        cmp.insert(Slot(3), hash("ours 3"), true, 0).unwrap();
        assert_eq!(
            cmp.scan(Slot(4)),
            Err(BankHashMismatch {
                slot: Slot(3),
                local: hash("ours 3"),
                corroborated: hash("cluster 3"),
            })
        );
        assert_eq!(cmp.watermark(), Slot(0));
    }

    #[traced_test]
    #[test]
    fn test_mismatch_holds_watermark() {
        let mut cmp = BankHashComparator::new(Slot(49), 30);
        cmp.observe(Slot(50), hash("cluster"), test_pubkey(1), 11);
        cmp.observe(Slot(50), hash("cluster"), test_pubkey(2), 11);
        cmp.insert(Slot(50), hash("ours"), true, 0).unwrap();

        assert_eq!(
            cmp.scan(Slot(50)),
            Err(BankHashMismatch {
                slot: Slot(50),
                local: hash("ours"),
                corroborated: hash("cluster"),
            })
        );
        assert_eq!(cmp.watermark(), Slot(49));
        assert!(logs_contain("Bank hash mismatch"));
    }

    #[test]
    fn test_watermark_never_decreases() {
        let mut cmp = BankHashComparator::new(Slot(10), 30);
        cmp.set_watermark(Slot(4));
        assert_eq!(cmp.watermark(), Slot(10));

        // Entries at or below the watermark are refused.
        assert_eq!(
            cmp.insert(Slot(8), hash("a"), true, 30),
            Err(StaleBankHash {
                slot: Slot(8),
                watermark: Slot(10),
            })
        );
        cmp.observe(Slot(9), hash("a"), test_pubkey(1), 30);
        assert!(cmp.is_empty());
        assert_eq!(cmp.scan(Slot(9)), Ok(Slot(10)));

        cmp.set_watermark(Slot(12));
        assert_eq!(cmp.watermark(), Slot(12));
    }

    #[test]
    fn test_prune_unblocks_scan() {
        let mut cmp = BankHashComparator::new(Slot(0), 30);
        cmp.insert(Slot(1), hash("a"), true, 0).unwrap();
        cmp.insert(Slot(2), hash("b"), true, 30).unwrap();
        assert_eq!(cmp.scan(Slot(2)), Ok(Slot(0)));

        assert_eq!(cmp.prune(Slot(2)), 1);
        assert_eq!(cmp.scan(Slot(2)), Ok(Slot(2)));
    }

    #[test]
    fn test_shared_lock() {
        let cmp = BankHashComparator::new(Slot(0), 3).shared();
        cmp.lock().insert(Slot(1), hash("a"), true, 3).unwrap();
        assert_eq!(cmp.lock().scan(Slot(1)), Ok(Slot(1)));
    }
}
