//! Work distribution engines shared by the workers of one execution group.
//!
//! Two engines are pipelined and implement [`StageQueue`]:
//! [`BlockingPriorityQueue`] parks idle workers on a condition variable, and
//! [`PollingSemaphoreQueue`] keeps them spinning on per-stage semaphores. The
//! third, [`SpinlockIndexAllocator`], serves the flat modes where a worker
//! claims an index and runs every stage inline.
//!
//! Every engine is a plain value owned by its group and lent to workers by
//! reference. Nothing here is process-global.

mod blocking;
mod semaphore;
pub mod spin;
mod spinlock;

use std::fmt;

use clap::ValueEnum;

pub use blocking::BlockingPriorityQueue;
pub use semaphore::PollingSemaphoreQueue;
pub use spinlock::SpinlockIndexAllocator;

use crate::catalog::Item;

/// Per-stage work queue shared by the workers of one group.
///
/// `dequeue_next` always prefers the most advanced stage that has work,
/// across all workers of the queue.
pub trait StageQueue: Send + Sync {
    /// Hands an item to the queue for its current stage.
    ///
    /// # Panics
    ///
    /// Panics if the item is already done.
    fn enqueue(&self, item: Item);

    /// Takes the next item, waiting while the queue is empty.
    ///
    /// Returns `None` once the queue has been shut down for this caller.
    fn dequeue_next(&self) -> Option<Item>;

    /// Signals `workers` workers to stop once the group's work is finished.
    fn shutdown(&self, workers: usize);

    /// Number of items currently owned by the queue.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Synchronization discipline used inside a hybrid execution group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum EngineKind {
    /// Mutex and condition variable, idle workers sleep.
    #[default]
    Blocking,
    /// Per-stage counting semaphores, idle workers spin.
    Semaphore,
    /// Spinlock-guarded index counter, no pipelining.
    Spinlock,
}

impl EngineKind {
    /// Builds the pipelined queue for this kind, if it has one.
    pub fn stage_queue(self) -> Option<Box<dyn StageQueue>> {
        match self {
            EngineKind::Blocking => Some(Box::new(BlockingPriorityQueue::new())),
            EngineKind::Semaphore => Some(Box::new(PollingSemaphoreQueue::new())),
            EngineKind::Spinlock => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EngineKind::Blocking => "blocking",
            EngineKind::Semaphore => "semaphore",
            EngineKind::Spinlock => "spinlock",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
