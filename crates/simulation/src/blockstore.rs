//! In-memory blockstore.

use forkline_core::{Blockstore, BlockstoreError};
use forkline_types::{Hash, Slot};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;
use tracing::debug;

/// Metadata of a stored block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockMeta {
    /// Parent slot.
    pub parent: Slot,
    /// Blockhash.
    pub blockhash: Hash,
    /// Bank hash, once processed.
    pub bank_hash: Option<Hash>,
    /// Whether replay finished the block.
    pub processed: bool,
}

#[derive(Debug)]
struct Inner {
    blocks: BTreeMap<Slot, BlockMeta>,
    root: Slot,
}

/// Blockstore for simulation and tests.
#[derive(Debug)]
pub struct SimBlockstore {
    inner: RwLock<Inner>,
}

impl SimBlockstore {
    /// Create a blockstore rooted at the already processed bootstrap slot.
    pub fn new(root: Slot, blockhash: Hash, bank_hash: Hash) -> Self {
        let mut blocks = BTreeMap::new();
        blocks.insert(
            root,
            BlockMeta {
                parent: root,
                blockhash,
                bank_hash: Some(bank_hash),
                processed: true,
            },
        );
        Self {
            inner: RwLock::new(Inner { blocks, root }),
        }
    }

    /// Record a received (not yet replayed) block.
    pub fn insert_block(&self, slot: Slot, parent: Slot, blockhash: Hash) {
        self.inner.write().blocks.entry(slot).or_insert(BlockMeta {
            parent,
            blockhash,
            bank_hash: None,
            processed: false,
        });
    }

    /// Metadata of `slot`.
    pub fn block(&self, slot: Slot) -> Option<BlockMeta> {
        self.inner.read().blocks.get(&slot).copied()
    }

    /// Number of stored blocks.
    pub fn len(&self) -> usize {
        self.inner.read().blocks.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.read().blocks.is_empty()
    }
}

impl Blockstore for SimBlockstore {
    fn is_processed(&self, slot: Slot) -> bool {
        self.inner
            .read()
            .blocks
            .get(&slot)
            .is_some_and(|b| b.processed)
    }

    fn block_hash(&self, slot: Slot) -> Option<Hash> {
        self.inner.read().blocks.get(&slot).map(|b| b.blockhash)
    }

    fn bank_hash(&self, slot: Slot) -> Option<Hash> {
        self.inner.read().blocks.get(&slot).and_then(|b| b.bank_hash)
    }

    fn mark_processed(
        &self,
        slot: Slot,
        parent: Slot,
        blockhash: Hash,
        bank_hash: Hash,
    ) -> Result<(), BlockstoreError> {
        self.inner.write().blocks.insert(
            slot,
            BlockMeta {
                parent,
                blockhash,
                bank_hash: Some(bank_hash),
                processed: true,
            },
        );
        Ok(())
    }

    fn root(&self) -> Slot {
        self.inner.read().root
    }

    fn publish(&self, root: Slot) -> Result<usize, BlockstoreError> {
        let mut inner = self.inner.write();
        if !inner.blocks.contains_key(&root) {
            return Err(BlockstoreError::UnknownSlot(root));
        }
        if inner.root == root {
            return Ok(0);
        }

        let doomed: Vec<Slot> = inner
            .blocks
            .keys()
            .copied()
            .filter(|&slot| {
                let mut curr = slot;
                loop {
                    if curr == root {
                        return false;
                    }
                    match inner.blocks.get(&curr) {
                        Some(meta) if meta.parent < curr && meta.parent >= root => {
                            curr = meta.parent
                        }
                        _ => return true,
                    }
                }
            })
            .collect();
        for slot in &doomed {
            inner.blocks.remove(slot);
        }
        inner.root = root;
        debug!(root = root.0, pruned = doomed.len(), "Blockstore published");
        Ok(doomed.len())
    }

    fn checkpoint(&self, path: &Path) -> Result<(), BlockstoreError> {
        let inner = self.inner.read();
        let mut out = format!("root {}\n", inner.root);
        for (slot, meta) in &inner.blocks {
            let bank_hash = meta.bank_hash.map(|h| h.to_hex()).unwrap_or_default();
            // Writing into a String cannot fail.
            let _ = writeln!(
                out,
                "{} {} {} {} {}",
                slot, meta.parent, meta.blockhash, bank_hash, meta.processed
            );
        }
        std::fs::write(path, out)?;
        Ok(())
    }
}
