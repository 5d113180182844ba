//! Address-keyed checkout table guarding buffer ownership transfers.

use parking_lot::Mutex;
use std::collections::HashSet;
use tracing::warn;

use crate::error::{Result, TierFsError};

/// Tracks which buffer addresses are currently handed out.
///
/// Two instances exist in practice: the pool's table (allocate = check in,
/// free = check out, so a double free fails fast) and the transfer path's
/// table (a buffer entering an operation is checked in until the operation
/// resolves, so feeding one buffer into two concurrent transfers fails fast
/// instead of corrupting whichever finishes last).
#[derive(Debug, Default)]
pub struct BufferCheckout {
    table: Mutex<HashSet<u64>>,
}

impl BufferCheckout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `addr` as handed out. Fails if it already is.
    pub fn check_in(&self, addr: u64) -> Result<()> {
        if !self.table.lock().insert(addr) {
            warn!(addr = format_args!("{addr:#x}"), "buffer already checked out");
            return Err(TierFsError::BufferInUse(addr));
        }
        Ok(())
    }

    /// Release `addr`. Fails if it was not handed out.
    pub fn check_out(&self, addr: u64) -> Result<()> {
        if !self.table.lock().remove(&addr) {
            warn!(addr = format_args!("{addr:#x}"), "buffer was not checked out");
            return Err(TierFsError::BufferNotCheckedOut(addr));
        }
        Ok(())
    }

    /// Number of addresses currently handed out.
    pub fn outstanding(&self) -> usize {
        self.table.lock().len()
    }
}
