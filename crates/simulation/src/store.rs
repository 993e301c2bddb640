//! In-memory versioned account store.
//!
//! Each branch holds an `im::OrdMap` of the records written in it plus a
//! link to its parent. Publishing folds the ancestry into the new root,
//! which is cheap thanks to structural sharing.

use forkline_core::{RecordKey, StoreError, VersionedStore};
use forkline_types::BranchId;
use im::OrdMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone)]
struct Branch {
    parent: Option<BranchId>,
    records: OrdMap<RecordKey, Vec<u8>>,
}

#[derive(Debug)]
struct Inner {
    branches: HashMap<BranchId, Branch>,
    root: BranchId,
    max: usize,
}

impl Inner {
    fn branch(&self, id: &BranchId) -> Result<&Branch, StoreError> {
        self.branches.get(id).ok_or(StoreError::UnknownBranch(*id))
    }

    /// `id` and its ancestors, nearest first.
    fn lineage(&self, id: &BranchId) -> Vec<BranchId> {
        let mut chain = Vec::new();
        let mut curr = Some(*id);
        while let Some(b) = curr {
            let Some(branch) = self.branches.get(&b) else { break };
            chain.push(b);
            curr = branch.parent;
        }
        chain
    }

    fn descends_from(&self, id: &BranchId, ancestor: &BranchId) -> bool {
        self.lineage(id).contains(ancestor)
    }
}

/// Versioned account store for simulation and tests.
#[derive(Debug)]
pub struct SimStore {
    inner: RwLock<Inner>,
}

impl SimStore {
    /// Create a store whose root branch is `root`, holding at most
    /// `max_branches` live branches.
    pub fn new(root: BranchId, max_branches: usize) -> Self {
        let mut branches = HashMap::new();
        branches.insert(
            root,
            Branch {
                parent: None,
                records: OrdMap::new(),
            },
        );
        Self {
            inner: RwLock::new(Inner {
                branches,
                root,
                max: max_branches.max(1),
            }),
        }
    }

    /// Current root branch.
    pub fn root(&self) -> BranchId {
        self.inner.read().root
    }

    /// Number of live branches.
    pub fn branch_count(&self) -> usize {
        self.inner.read().branches.len()
    }
}

impl VersionedStore for SimStore {
    fn prepare(&self, parent: &BranchId, branch: BranchId) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        inner.branch(parent)?;
        if inner.branches.contains_key(&branch) {
            return Err(StoreError::DuplicateBranch(branch));
        }
        if inner.branches.len() >= inner.max {
            return Err(StoreError::BranchPoolExhausted { max: inner.max });
        }
        inner.branches.insert(
            branch,
            Branch {
                parent: Some(*parent),
                records: OrdMap::new(),
            },
        );
        Ok(())
    }

    fn exists(&self, branch: &BranchId) -> bool {
        self.inner.read().branches.contains_key(branch)
    }

    fn get(&self, branch: &BranchId, key: &RecordKey) -> Result<Option<Vec<u8>>, StoreError> {
        let inner = self.inner.read();
        inner.branch(branch)?;
        for id in inner.lineage(branch) {
            if let Some(value) = inner.branches.get(&id).and_then(|b| b.records.get(key)) {
                return Ok(Some(value.clone()));
            }
        }
        Ok(None)
    }

    fn put(&self, branch: &BranchId, key: RecordKey, value: Vec<u8>) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let entry = inner
            .branches
            .get_mut(branch)
            .ok_or(StoreError::UnknownBranch(*branch))?;
        entry.records.insert(key, value);
        Ok(())
    }

    fn branch_records(&self, branch: &BranchId) -> Result<Vec<RecordKey>, StoreError> {
        let inner = self.inner.read();
        Ok(inner.branch(branch)?.records.keys().copied().collect())
    }

    fn cancel(&self, branch: &BranchId) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        inner.branch(branch)?;
        let doomed: Vec<BranchId> = inner
            .branches
            .keys()
            .filter(|id| inner.descends_from(id, branch))
            .copied()
            .collect();
        for id in &doomed {
            inner.branches.remove(id);
        }
        debug!(branch = %branch, removed = doomed.len(), "Branch cancelled");
        Ok(())
    }

    fn publish(&self, branch: &BranchId) -> Result<usize, StoreError> {
        let mut inner = self.inner.write();
        inner.branch(branch)?;
        if inner.root == *branch {
            return Ok(0);
        }

        // Fold ancestors into the new root, nearest ancestor winning.
        let mut merged: OrdMap<RecordKey, Vec<u8>> = OrdMap::new();
        for id in inner.lineage(branch) {
            if let Some(b) = inner.branches.get(&id) {
                merged = merged.union(b.records.clone());
            }
        }

        let doomed: Vec<BranchId> = inner
            .branches
            .keys()
            .filter(|id| !inner.descends_from(id, branch))
            .copied()
            .collect();
        for id in &doomed {
            inner.branches.remove(id);
        }

        if let Some(root) = inner.branches.get_mut(branch) {
            root.parent = None;
            root.records = merged;
        }
        inner.root = *branch;
        debug!(root = %branch, removed = doomed.len(), "Store published");
        Ok(doomed.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forkline_test_helpers::{test_blockhash, test_pubkey};
    use forkline_types::Slot;

    fn branch(slot: u64) -> BranchId {
        BranchId::new(test_blockhash(slot), Slot(slot))
    }

    fn account(n: u8) -> RecordKey {
        RecordKey::Account(test_pubkey(n))
    }

    #[test]
    fn test_reads_fall_through_to_ancestors() {
        let store = SimStore::new(branch(0), 8);
        store.put(&branch(0), account(1), b"root".to_vec()).unwrap();
        store.prepare(&branch(0), branch(1)).unwrap();
        store.prepare(&branch(1), branch(2)).unwrap();
        store.put(&branch(1), account(1), b"one".to_vec()).unwrap();

        assert_eq!(store.get(&branch(2), &account(1)).unwrap(), Some(b"one".to_vec()));
        assert_eq!(store.get(&branch(0), &account(1)).unwrap(), Some(b"root".to_vec()));
        assert_eq!(store.get(&branch(2), &account(2)).unwrap(), None);
        assert!(store.branch_records(&branch(2)).unwrap().is_empty());
        assert_eq!(
            store.get(&branch(9), &account(1)),
            Err(StoreError::UnknownBranch(branch(9)))
        );
    }

    #[test]
    fn test_prepare_errors() {
        let store = SimStore::new(branch(0), 2);
        assert_eq!(
            store.prepare(&branch(5), branch(6)),
            Err(StoreError::UnknownBranch(branch(5)))
        );
        store.prepare(&branch(0), branch(1)).unwrap();
        assert_eq!(
            store.prepare(&branch(0), branch(1)),
            Err(StoreError::DuplicateBranch(branch(1)))
        );
        assert_eq!(
            store.prepare(&branch(0), branch(2)),
            Err(StoreError::BranchPoolExhausted { max: 2 })
        );
    }

    #[test]
    fn test_cancel_removes_descendants() {
        let store = SimStore::new(branch(0), 8);
        store.prepare(&branch(0), branch(1)).unwrap();
        store.prepare(&branch(1), branch(2)).unwrap();
        store.prepare(&branch(0), branch(3)).unwrap();

        store.cancel(&branch(1)).unwrap();
        assert!(!store.exists(&branch(1)));
        assert!(!store.exists(&branch(2)));
        assert!(store.exists(&branch(3)));
        assert_eq!(store.branch_count(), 2);
    }

    #[test]
    fn test_publish_folds_ancestry() {
        let store = SimStore::new(branch(0), 8);
        store.put(&branch(0), account(1), b"zero".to_vec()).unwrap();
        store.put(&branch(0), account(2), b"zero".to_vec()).unwrap();
        store.prepare(&branch(0), branch(1)).unwrap();
        store.put(&branch(1), account(1), b"one".to_vec()).unwrap();
        store.prepare(&branch(1), branch(2)).unwrap();
        store.prepare(&branch(0), branch(3)).unwrap();

        assert_eq!(store.publish(&branch(1)).unwrap(), 2);
        assert_eq!(store.root(), branch(1));
        assert!(!store.exists(&branch(0)));
        assert!(!store.exists(&branch(3)));
        assert!(store.exists(&branch(2)));
        assert_eq!(store.get(&branch(2), &account(1)).unwrap(), Some(b"one".to_vec()));
        assert_eq!(store.get(&branch(2), &account(2)).unwrap(), Some(b"zero".to_vec()));
        assert_eq!(store.publish(&branch(1)).unwrap(), 0);
    }
}
