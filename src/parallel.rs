use anyhow::{anyhow, Context, Result};
use indicatif::ProgressBar;
use rayon::prelude::*;
use tracing::debug;

use crate::catalog::WorkCatalog;
use crate::config::Dispatch;
use crate::engine::{EngineKind, SpinlockIndexAllocator, StageQueue};
use crate::worker::{run_pipeline_worker, CompletionCounter, CostModel};

/// One isolated concurrency domain: a bucket of items and the workers that
/// process it.
///
/// With zero threads the bucket runs inline on the calling thread. Otherwise
/// `threads` workers share a single engine of kind `engine`.
#[derive(Debug, Clone)]
pub struct ExecutionGroup {
    index: usize,
    bucket: Vec<usize>,
    threads: usize,
    engine: EngineKind,
    model: CostModel,
}

impl ExecutionGroup {
    pub fn new(
        index: usize,
        bucket: Vec<usize>,
        threads: usize,
        engine: EngineKind,
        model: CostModel,
    ) -> Self {
        Self {
            index,
            bucket,
            threads,
            engine,
            model,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Runs the group to completion. Returns the number of finished items.
    pub fn run(&self, catalog: &WorkCatalog, progress: &ProgressBar) -> Result<usize> {
        debug!(
            group = self.index,
            items = self.bucket.len(),
            threads = self.threads,
            engine = %self.engine,
            "execution group starting"
        );

        if self.threads == 0 {
            let mut done = 0;
            for &index in &self.bucket {
                if let Some(cost) = catalog.cost(index) {
                    self.model.run_inline(index, cost);
                    progress.inc(1);
                    done += 1;
                }
            }
            return Ok(done);
        }

        match self.engine.stage_queue() {
            Some(queue) => self.run_pipelined(&*queue, catalog, progress),
            None => self.run_spinlock(catalog, progress),
        }
    }

    fn run_pipelined(
        &self,
        queue: &dyn StageQueue,
        catalog: &WorkCatalog,
        progress: &ProgressBar,
    ) -> Result<usize> {
        let items = catalog.materialize(&self.bucket);
        let counter = CompletionCounter::new(items.len());
        let model = &self.model;

        crossbeam::thread::scope(|s| {
            for _ in 0..self.threads {
                let counter = &counter;
                s.spawn(move |_| {
                    run_pipeline_worker(queue, model, counter, |_| progress.inc(1));
                });
            }

            for item in items {
                queue.enqueue(item);
            }
            if !counter.wait() {
                debug!(group = self.index, "worker died before the bucket finished");
            }
            queue.shutdown(self.threads);
        })
        .map_err(|_| anyhow!("worker thread panicked in group {}", self.index))?;

        Ok(counter.completed())
    }

    fn run_spinlock(&self, catalog: &WorkCatalog, progress: &ProgressBar) -> Result<usize> {
        let allocator = SpinlockIndexAllocator::over(self.bucket.clone());
        let counter = CompletionCounter::new(allocator.len());
        drain_allocator(&allocator, self.threads, catalog, &self.model, progress, Some(&counter))
            .with_context(|| format!("group {}", self.index))?;
        Ok(counter.completed())
    }
}

/// Single pass over the whole catalog on the calling thread.
pub fn run_sequential(catalog: &WorkCatalog, model: &CostModel, progress: &ProgressBar) -> usize {
    for (index, &cost) in catalog.costs().iter().enumerate() {
        model.run_inline(index, cost);
        progress.inc(1);
    }
    catalog.len()
}

/// Thread-parallel flat mode: `threads` threads over the whole catalog, every
/// stage of an item run inline by the thread that claimed it.
pub fn run_thread_flat(
    catalog: &WorkCatalog,
    threads: usize,
    dispatch: Dispatch,
    model: &CostModel,
    progress: &ProgressBar,
) -> Result<usize> {
    let threads = threads.max(1);
    match dispatch {
        Dispatch::Spinlock => {
            let allocator = SpinlockIndexAllocator::new(catalog.len());
            drain_allocator(&allocator, threads, catalog, model, progress, None)
        }
        Dispatch::Stride => {
            crossbeam::thread::scope(|s| {
                for first in 0..threads {
                    s.spawn(move |_| {
                        for index in (first..catalog.len()).step_by(threads) {
                            if let Some(cost) = catalog.cost(index) {
                                model.run_inline(index, cost);
                                progress.inc(1);
                            }
                        }
                    });
                }
            })
            .map_err(|_| anyhow!("stride worker thread panicked"))?;
            Ok(catalog.len())
        }
        Dispatch::WorkStealing => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .thread_name(|i| format!("stagebench-{i}"))
                .build()
                .context("Failed to build work-stealing pool")?;
            pool.install(|| {
                catalog.costs().par_iter().enumerate().for_each(|(index, &cost)| {
                    model.run_inline(index, cost);
                    progress.inc(1);
                });
            });
            Ok(catalog.len())
        }
    }
}

fn drain_allocator(
    allocator: &SpinlockIndexAllocator,
    threads: usize,
    catalog: &WorkCatalog,
    model: &CostModel,
    progress: &ProgressBar,
    counter: Option<&CompletionCounter>,
) -> Result<usize> {
    let per_thread = crossbeam::thread::scope(|s| {
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                s.spawn(move |_| {
                    let mut done = 0usize;
                    while let Some(index) = allocator.next() {
                        if let Some(cost) = catalog.cost(index) {
                            model.run_inline(index, cost);
                            progress.inc(1);
                            if let Some(counter) = counter {
                                counter.record();
                            }
                            done += 1;
                        }
                    }
                    done
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join()).collect::<Vec<_>>()
    })
    .map_err(|_| anyhow!("spinlock worker thread panicked"))?;

    per_thread
        .into_iter()
        .try_fold(0usize, |total, joined| {
            joined.map(|done| total + done)
        })
        .map_err(|_| anyhow!("spinlock worker thread panicked"))
}
