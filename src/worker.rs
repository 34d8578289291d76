use std::hint::black_box;

use parking_lot::{Condvar, Mutex};

use crate::catalog::{Item, Stage};
use crate::engine::StageQueue;

/// Iterations burned per cost unit unless configured otherwise.
pub const DEFAULT_TIME_MULTIPLIER: u64 = 10_000;

/// Cost weight of each transform stage, in units of item cost.
pub const STAGE_WEIGHTS: [u64; 3] = [5, 3, 2];

/// Synthetic cost model standing in for the real transforms.
///
/// Stage `k` of an item with cost `c` burns `STAGE_WEIGHTS[k] * c *
/// time_multiplier` floating-point multiplies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CostModel {
    time_multiplier: u64,
}

impl Default for CostModel {
    fn default() -> Self {
        Self::new(DEFAULT_TIME_MULTIPLIER)
    }
}

impl CostModel {
    pub fn new(time_multiplier: u64) -> Self {
        Self { time_multiplier }
    }

    pub fn time_multiplier(&self) -> u64 {
        self.time_multiplier
    }

    /// Iterations one stage costs for an item of the given cost.
    pub fn stage_iterations(&self, stage: Stage, cost: u32) -> u64 {
        let weight = match stage {
            Stage::Pending => STAGE_WEIGHTS[0],
            Stage::Stage1Done => STAGE_WEIGHTS[1],
            Stage::Stage2Done => STAGE_WEIGHTS[2],
            Stage::Done => 0,
        };
        weight * u64::from(cost) * self.time_multiplier
    }

    /// Runs the transform that moves `item` out of its current stage.
    pub fn run_stage(&self, item: &mut Item) -> Stage {
        burn_cpu(self.stage_iterations(item.stage(), item.cost()));
        item.advance()
    }

    /// Runs all three stages back to back on a catalog entry.
    pub fn run_inline(&self, index: usize, cost: u32) {
        let mut item = Item::new(index, cost);
        while item.stage() != Stage::Done {
            self.run_stage(&mut item);
        }
    }
}

/// Spends CPU for `iterations` multiply steps.
fn burn_cpu(iterations: u64) {
    let mut acc = 1.0_f64;
    for _ in 0..iterations {
        acc = black_box(acc * 1.000_000_1);
    }
    black_box(acc);
}

/// Counts items reaching `Done` within one group.
///
/// Reaching the target is reported to exactly one caller of [`record`]. A
/// worker that dies marks the counter abandoned so waiters are released.
///
/// [`record`]: CompletionCounter::record
#[derive(Debug)]
pub struct CompletionCounter {
    target: usize,
    state: Mutex<Tally>,
    all_done: Condvar,
}

#[derive(Debug, Default)]
struct Tally {
    completed: usize,
    abandoned: bool,
}

impl CompletionCounter {
    pub fn new(target: usize) -> Self {
        Self {
            target,
            state: Mutex::new(Tally::default()),
            all_done: Condvar::new(),
        }
    }

    pub fn target(&self) -> usize {
        self.target
    }

    pub fn completed(&self) -> usize {
        self.state.lock().completed
    }

    /// Records one finished item. Returns `true` for the call that reaches
    /// the target.
    ///
    /// # Panics
    ///
    /// Panics if more items finish than the target allows.
    pub fn record(&self) -> bool {
        let mut state = self.state.lock();
        assert!(
            state.completed < self.target,
            "completion counter would exceed target {}",
            self.target
        );
        state.completed += 1;
        let reached = state.completed == self.target;
        if reached {
            self.all_done.notify_all();
        }
        reached
    }

    /// Releases every waiter without reaching the target.
    pub fn abandon(&self) {
        self.state.lock().abandoned = true;
        self.all_done.notify_all();
    }

    /// Blocks until the target is reached or the counter is abandoned.
    /// Returns `true` if the target was reached.
    pub fn wait(&self) -> bool {
        let mut state = self.state.lock();
        while state.completed < self.target && !state.abandoned {
            self.all_done.wait(&mut state);
        }
        state.completed == self.target
    }
}

/// Abandons the counter if the owning worker unwinds.
struct AbandonOnPanic<'a>(&'a CompletionCounter);

impl Drop for AbandonOnPanic<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.abandon();
        }
    }
}

/// Worker loop for the pipelined engines.
///
/// Pulls items until the queue reports shutdown, runs one stage per pull,
/// and hands the item back until it is done. `on_done` is called once per
/// finished item. A panic in the loop abandons `counter`.
pub fn run_pipeline_worker<Q, F>(
    queue: &Q,
    model: &CostModel,
    counter: &CompletionCounter,
    on_done: F,
) where
    Q: StageQueue + ?Sized,
    F: Fn(&Item),
{
    let _guard = AbandonOnPanic(counter);
    while let Some(mut item) = queue.dequeue_next() {
        if model.run_stage(&mut item) == Stage::Done {
            on_done(&item);
            counter.record();
        } else {
            queue.enqueue(item);
        }
    }
}
