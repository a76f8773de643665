//! Block tracker — maintains a sliding window of recent block headers
//! for parent-hash chain verification and reorg detection.

use std::collections::VecDeque;

use crate::types::BlockHeader;

/// Information about a single tracked block.
pub type BlockInfo = BlockHeader;

/// Tracks the last N block headers to enable reorg detection.
///
/// When a new block arrives, the tracker checks whether its `parent_hash`
/// matches the hash of the previous block. A mismatch means a reorg occurred.
pub struct BlockTracker {
    /// Sliding window of recent blocks (oldest first).
    window: VecDeque<BlockInfo>,
    /// Maximum number of blocks to retain.
    window_size: usize,
}

impl BlockTracker {
    /// Create a new tracker with the given window size.
    /// A window of 128 covers deep reorgs for all major EVM chains.
    pub fn new(window_size: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(window_size),
            window_size,
        }
    }

    /// Add a new block to the tracker.
    ///
    /// Returns `Ok(())` if the block extends the current head.
    /// Returns `Err(reorg_depth)` if a reorg is detected (parent hash mismatch).
    pub fn push(&mut self, block: BlockInfo) -> Result<(), u64> {
        if let Some(head) = self.window.back() {
            if !block.extends(head) {
                let depth = self.find_reorg_depth(&block);
                return Err(depth);
            }
        }
        if self.window.len() >= self.window_size {
            self.window.pop_front();
        }
        self.window.push_back(block);
        Ok(())
    }

    /// Returns the current chain head (most recently added block).
    pub fn head(&self) -> Option<&BlockInfo> {
        self.window.back()
    }

    /// Returns a block by number if it's in the window.
    pub fn get(&self, number: u64) -> Option<&BlockInfo> {
        self.window.iter().find(|b| b.number == number)
    }

    /// Number of blocks in the window.
    pub fn len(&self) -> usize {
        self.window.len()
    }

    /// Returns `true` if the window is empty.
    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Snapshot of the tracked window, oldest first. For handing to
    /// `ReorgDetector::check`/`check_finalized`, which classify a reorg by
    /// scanning backward through it.
    pub fn window(&self) -> Vec<BlockInfo> {
        self.window.iter().cloned().collect()
    }

    /// Rewind the tracker to a given block number (discard everything after it).
    pub fn rewind_to(&mut self, block_number: u64) {
        while let Some(back) = self.window.back() {
            if back.number > block_number {
                self.window.pop_back();
            } else {
                break;
            }
        }
    }

    /// Find how deep the reorg is by scanning the window.
    fn find_reorg_depth(&self, new_block: &BlockInfo) -> u64 {
        for (i, tracked) in self.window.iter().enumerate().rev() {
            if tracked.hash == new_block.parent_hash {
                return (self.window.len() - 1 - i) as u64;
            }
        }
        // Common ancestor not in window — assume deep reorg
        self.window.len() as u64
    }
}
