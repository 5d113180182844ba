//! Asynchronous transfer fan-in.
//!
//! A stream operation (window refill, purge, zero-copy read/write) spans one
//! buffer but possibly several blocks, so it fans out into per-block
//! transfers and fans back into one result:
//!
//! ```text
//!   buffer ──split──► [view₀ view₁ view₂]
//!                        │     │     │      spawned endpoint transfers
//!                        ▼     ▼     ▼
//!                     TransferHandle × 3
//!                        └──┬──┴─────┘
//!                   TransferAggregator ──► DataOperation::wait
//! ```
//!
//! Waits are bounded but never cancel: a timed-out or abandoned operation
//! leaves its tasks running and hands the buffer to a detached reclaim task,
//! so pooled memory is never reused while a transfer can still write to it.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::buffer::{BufferCheckout, BufferPool, NativeBuffer};
use crate::error::{Result, TierFsError};
use crate::types::FileHandle;

/// Handle to one spawned per-block transfer.
pub struct TransferHandle {
    task: JoinHandle<Result<u64>>,
}

impl TransferHandle {
    /// Spawn a transfer future onto the runtime. The handle observes it;
    /// dropping the handle does not cancel it.
    pub fn spawn<F>(transfer: F) -> Self
    where
        F: Future<Output = Result<u64>> + Send + 'static,
    {
        Self {
            task: tokio::spawn(transfer),
        }
    }

    /// Whether the transfer has resolved.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Await the transfer, bounded by `limit`. On timeout only the wait
    /// fails; the transfer keeps running.
    pub async fn wait(&mut self, limit: Duration) -> Result<u64> {
        match tokio::time::timeout(limit, &mut self.task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(TierFsError::TaskFailed(join.to_string())),
            Err(_) => Err(TierFsError::Timeout(limit.as_millis() as u64)),
        }
    }

    /// Await without a bound; reclaim path only.
    async fn join(self) {
        let _ = self.task.await;
    }
}

/// Completion state of an aggregated operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpStatus {
    Pending,
    Done,
    Error,
}

/// Fans dynamically added transfer handles into one result.
///
/// Sub-results fold into a running byte count. The first failure moves the
/// aggregate to `Error`; the remaining handles are not awaited by the caller
/// path, they move to the straggler list for reclaim.
pub struct TransferAggregator {
    pending: VecDeque<TransferHandle>,
    stragglers: Vec<TransferHandle>,
    status: OpStatus,
    completed_len: u64,
    error: Option<TierFsError>,
}

impl Default for TransferAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferAggregator {
    pub fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            stragglers: Vec::new(),
            status: OpStatus::Pending,
            completed_len: 0,
            error: None,
        }
    }

    /// Add one sub-transfer. Only meaningful while the owner is still
    /// building the operation.
    pub fn add(&mut self, handle: TransferHandle) {
        self.pending.push_back(handle);
    }

    pub fn status(&self) -> OpStatus {
        self.status
    }

    /// Bytes transferred by sub-results folded in so far.
    pub fn completed_len(&self) -> u64 {
        self.completed_len
    }

    /// Drain already-finished sub-transfers without blocking and report
    /// whether the aggregate has resolved.
    pub fn is_done(&mut self) -> bool {
        if self.status != OpStatus::Pending {
            return true;
        }
        while let Some(front) = self.pending.front() {
            if !front.is_finished() {
                break;
            }
            let handle = self.pending.pop_front().expect("front exists");
            match handle.task.now_or_never() {
                Some(Ok(Ok(len))) => self.completed_len += len,
                Some(Ok(Err(e))) => {
                    self.fail(e, None);
                    return true;
                }
                Some(Err(join)) => {
                    self.fail(TierFsError::TaskFailed(join.to_string()), None);
                    return true;
                }
                // A finished task resolves immediately; reaching here means
                // the handle lied, treat it as a failed transfer.
                None => {
                    self.fail(
                        TierFsError::Internal("finished transfer did not resolve".into()),
                        None,
                    );
                    return true;
                }
            }
        }
        if self.pending.is_empty() {
            self.status = OpStatus::Done;
        }
        self.status != OpStatus::Pending
    }

    /// Await every sub-transfer in order, each bounded by `per_sub`.
    /// Resolves to the total byte count, or the first failure.
    pub async fn wait(&mut self, per_sub: Duration) -> Result<u64> {
        while self.status == OpStatus::Pending {
            match self.pending.pop_front() {
                None => self.status = OpStatus::Done,
                Some(mut handle) => match handle.wait(per_sub).await {
                    Ok(len) => self.completed_len += len,
                    Err(e) => {
                        // On timeout the transfer is still running and may
                        // yet write into its view; track it for reclaim.
                        let straggler =
                            matches!(e, TierFsError::Timeout(_)).then_some(handle);
                        self.fail(e, straggler);
                    }
                },
            }
        }
        match self.status {
            OpStatus::Done => Ok(self.completed_len),
            _ => Err(self.take_error()),
        }
    }

    fn fail(&mut self, error: TierFsError, straggler: Option<TransferHandle>) {
        if self.status == OpStatus::Pending {
            self.status = OpStatus::Error;
            self.error = Some(error);
        }
        if let Some(handle) = straggler {
            self.stragglers.push(handle);
        }
        self.stragglers.extend(self.pending.drain(..));
    }

    fn take_error(&mut self) -> TierFsError {
        self.error
            .take()
            .unwrap_or_else(|| TierFsError::Internal("aggregate failure already reported".into()))
    }

    /// Every handle not yet folded in; leaves the aggregator empty.
    fn take_remaining(&mut self) -> Vec<TransferHandle> {
        let mut remaining: Vec<TransferHandle> = self.pending.drain(..).collect();
        remaining.append(&mut self.stragglers);
        remaining
    }
}

/// Result of a completed data operation: bytes moved, and the parent buffer
/// handed back to whoever supplied it.
#[derive(Debug)]
pub struct Transfer {
    pub len: u64,
    pub buffer: Option<NativeBuffer>,
}

/// One logical data operation: per-block transfers fanned over one buffer.
///
/// The operation holds the parent buffer while views of it sit in transfer
/// tasks. `wait` hands the buffer back on success; on failure, timeout, or
/// drop-without-wait the buffer detours through a reclaim task that waits
/// out every remaining transfer before returning it to the pool.
pub struct DataOperation {
    agg: TransferAggregator,
    buffer: Option<NativeBuffer>,
    pool: Arc<BufferPool>,
    in_flight: Arc<BufferCheckout>,
    file: Arc<FileHandle>,
    start_offset: u64,
    write: bool,
    finished: bool,
}

impl DataOperation {
    /// Begin an operation over `buffer` at file offset `start_offset`.
    /// Fails fast if the buffer is already inside another in-flight
    /// operation.
    pub(crate) fn new(
        buffer: NativeBuffer,
        pool: Arc<BufferPool>,
        in_flight: Arc<BufferCheckout>,
        file: Arc<FileHandle>,
        start_offset: u64,
        write: bool,
    ) -> Result<Self> {
        in_flight.check_in(buffer.address())?;
        Ok(Self {
            agg: TransferAggregator::new(),
            buffer: Some(buffer),
            pool,
            in_flight,
            file,
            start_offset,
            write,
            finished: false,
        })
    }

    pub(crate) fn add(&mut self, handle: TransferHandle) {
        self.agg.add(handle);
    }

    /// Sub-transfers issued so far come from views of this buffer.
    pub(crate) fn buffer(&self) -> &NativeBuffer {
        self.buffer.as_ref().expect("operation holds its buffer")
    }

    /// Non-blocking completion probe; drains finished sub-transfers.
    pub fn is_done(&mut self) -> bool {
        self.agg.is_done()
    }

    pub fn completed_len(&self) -> u64 {
        self.agg.completed_len()
    }

    /// Await completion, bounding each sub-transfer wait by `per_sub`.
    ///
    /// On success for writes, the file capacity extends past the written
    /// range before the result is visible to the caller, so a subsequent
    /// read on the same handle sees the new bytes.
    pub async fn wait(mut self, per_sub: Duration) -> Result<Transfer> {
        match self.agg.wait(per_sub).await {
            Ok(len) => {
                self.finished = true;
                if self.write {
                    self.file.extend_capacity(self.start_offset + len);
                }
                let buffer = self.buffer.take();
                if let Some(b) = &buffer {
                    self.in_flight.check_out(b.address())?;
                }
                Ok(Transfer { len, buffer })
            }
            Err(e) => {
                self.finished = true;
                self.reclaim();
                Err(e)
            }
        }
    }

    /// Detach remaining transfers and route the buffer back to the pool
    /// once they settle.
    fn reclaim(&mut self) {
        let Some(buffer) = self.buffer.take() else {
            return;
        };
        let remaining = self.agg.take_remaining();
        let pool = Arc::clone(&self.pool);
        let in_flight = Arc::clone(&self.in_flight);

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            // No runtime to reclaim on; the buffer drops here and its
            // region stays alive until every transfer task drops its view.
            warn!(
                addr = format_args!("{:#x}", buffer.address()),
                "buffer dropped outside runtime, pool entry leaks"
            );
            return;
        };
        runtime.spawn(async move {
            for handle in remaining {
                handle.join().await;
            }
            let addr = buffer.address();
            let _ = in_flight.check_out(addr);
            if let Err(e) = pool.free(buffer) {
                debug!(addr = format_args!("{addr:#x}"), error = %e, "reclaimed buffer not poolable");
            } else {
                debug!(addr = format_args!("{addr:#x}"), "buffer reclaimed after abandoned transfer");
            }
        });
    }
}

impl Drop for DataOperation {
    fn drop(&mut self) {
        if !self.finished {
            self.reclaim();
        }
    }
}
