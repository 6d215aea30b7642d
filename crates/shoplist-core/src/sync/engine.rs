//! Queue flush.
//!
//! `SyncEngine::flush` replays deduplicated pending writes against the remote
//! in ascending timestamp order:
//! - success: dequeue (together with the entries it superseded), continue
//! - not found: the target is gone upstream, dequeue and continue
//! - network failure: stop, everything not yet sent stays queued in order
//! - any other failure: stop without discarding anything
//!
//! At most one flush runs at a time; overlapping calls coalesce.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::api::{classify, ErrorClass, RemoteListApi};
use crate::models::PendingOperation;
use crate::queue::{deduplicate_queue, superseded_by, PendingQueue};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Operations confirmed by the remote.
    pub sent: usize,
    /// Operations dropped because their item no longer exists.
    pub dropped: usize,
    /// Queue length after the pass.
    pub remaining: usize,
    /// Lists whose remote state changed during the pass.
    pub affected_lists: BTreeSet<String>,
    /// Why the pass stopped early, if it did.
    pub halted: Option<ErrorClass>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    Completed(FlushReport),
    /// Another flush was already running.
    Coalesced,
    /// Not attempted because the device is offline.
    Skipped,
}

impl FlushOutcome {
    pub fn report(&self) -> Option<&FlushReport> {
        match self {
            FlushOutcome::Completed(report) => Some(report),
            _ => None,
        }
    }
}

/// Holds the in-flight flag for the duration of a pass.
struct FlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> FlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

pub struct SyncEngine {
    api: Arc<dyn RemoteListApi>,
    queue: PendingQueue,
    in_flight: AtomicBool,
}

impl SyncEngine {
    pub fn new(api: Arc<dyn RemoteListApi>, queue: PendingQueue) -> Self {
        Self {
            api,
            queue,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn is_flushing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub async fn flush(&self) -> FlushOutcome {
        let Some(_guard) = FlightGuard::acquire(&self.in_flight) else {
            debug!("Flush already in progress, coalescing");
            return FlushOutcome::Coalesced;
        };
        FlushOutcome::Completed(self.drain().await)
    }

    async fn drain(&self) -> FlushReport {
        let mut report = FlushReport::default();

        let queue = self.queue.get_queue().await;
        if queue.is_empty() {
            return report;
        }

        let survivors = deduplicate_queue(&queue);
        info!(queued = queue.len(), sending = survivors.len(), "Flushing pending writes");

        for op in &survivors {
            let patch = op.operation.patch();
            match self.api.update_item(&op.list_id, &op.item_id, &patch).await {
                Ok(_) => {
                    report.sent += 1;
                    report.affected_lists.insert(op.list_id.clone());
                    if !self.retire(&queue, op).await {
                        report.halted = Some(ErrorClass::Other);
                        break;
                    }
                }
                Err(e) => match classify(&e) {
                    ErrorClass::NotFound => {
                        info!(op_id = %op.id, list_id = %op.list_id, item_id = %op.item_id, "Item gone upstream, dropping write");
                        report.dropped += 1;
                        report.affected_lists.insert(op.list_id.clone());
                        if !self.retire(&queue, op).await {
                            report.halted = Some(ErrorClass::Other);
                            break;
                        }
                    }
                    class => {
                        warn!(op_id = %op.id, ?class, error = %format!("{:#}", e), "Flush halted");
                        report.halted = Some(class);
                        break;
                    }
                },
            }
        }

        report.remaining = self.queue.len().await;
        info!(
            sent = report.sent,
            dropped = report.dropped,
            remaining = report.remaining,
            "Flush finished"
        );
        report
    }

    /// Dequeue a resolved operation and every entry it superseded. Returns
    /// false if the queue could not be written.
    async fn retire(&self, queue: &[PendingOperation], op: &PendingOperation) -> bool {
        let mut ids = superseded_by(queue, op);
        ids.push(op.id.clone());
        match self.queue.dequeue_many(&ids).await {
            Ok(()) => true,
            Err(e) => {
                error!(op_id = %op.id, error = %e, "Failed to dequeue resolved write");
                false
            }
        }
    }
}
