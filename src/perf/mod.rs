//! Wall-clock and resource usage sampling for a benchmark run.
//!
//! In-process modes report the change in `getrusage(RUSAGE_SELF)` across the
//! run. Process modes reap every child with `wait4` and aggregate what each
//! one reports: CPU times and context switches are summed, peak RSS is the
//! largest single child.

mod rusage;

use std::fmt;
use std::process::Child;
use std::time::{Duration, Instant};

use indicatif::ProgressBar;
use tracing::{debug, warn};

pub use rusage::{rusage_self, ResourceUsage};

/// A spawned execution group process awaiting collection.
#[derive(Debug)]
pub struct SpawnedGroup {
    pub index: usize,
    pub child: Child,
}

/// How one execution group process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupExit {
    pub index: usize,
    pub status: i32,
}

impl GroupExit {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Outcome of reaping spawned groups.
#[derive(Debug, Default)]
pub struct ChildCollection {
    pub usage: ResourceUsage,
    pub exits: Vec<GroupExit>,
    /// Groups that could not be reaped, with the wait error.
    pub lost: Vec<(usize, std::io::Error)>,
}

/// Raw timing and usage of one run, ready for the summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerfReport {
    pub label: String,
    pub wall_time: Duration,
    pub usage: ResourceUsage,
}

/// Samples a run from `start` to one of the `finish` calls.
#[derive(Debug)]
pub struct PerfRecorder {
    started: Instant,
    baseline: ResourceUsage,
}

impl PerfRecorder {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            baseline: rusage_self(),
        }
    }

    /// Finishes a run whose work happened in this process.
    pub fn finish_in_process(self, label: impl Into<String>) -> PerfReport {
        let usage = rusage_self().since(&self.baseline);
        PerfReport {
            label: label.into(),
            wall_time: self.started.elapsed(),
            usage,
        }
    }

    /// Reaps every spawned group, then finishes the run with their
    /// aggregated usage.
    pub fn finish_with_children(
        self,
        label: impl Into<String>,
        children: Vec<SpawnedGroup>,
        progress: &ProgressBar,
    ) -> (PerfReport, ChildCollection) {
        let collection = collect_children(children, progress);
        let report = PerfReport {
            label: label.into(),
            wall_time: self.started.elapsed(),
            usage: collection.usage,
        };
        (report, collection)
    }
}

/// Waits for each group in turn.
///
/// An interrupted wait is retried. Any other wait error, including "no child
/// processes" for a pid that was already reaped, marks that group as lost and
/// collection moves on to the next one.
pub fn collect_children(children: Vec<SpawnedGroup>, progress: &ProgressBar) -> ChildCollection {
    let mut collection = ChildCollection::default();
    for group in children {
        match rusage::wait_child(group.child) {
            rusage::WaitOutcome::Exited { status, usage } => {
                debug!(group = group.index, status, %usage, "execution group exited");
                collection.usage.accumulate(&usage);
                collection.exits.push(GroupExit {
                    index: group.index,
                    status,
                });
                progress.inc(1);
            }
            rusage::WaitOutcome::NoChild(err) => {
                warn!(group = group.index, error = %err, "execution group cannot be waited on");
                collection.lost.push((group.index, err));
            }
            rusage::WaitOutcome::Failed(err) => {
                warn!(group = group.index, error = %err, "wait failed, skipping group");
                collection.lost.push((group.index, err));
            }
        }
    }
    collection
}

impl fmt::Display for PerfReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let usage = &self.usage;
        writeln!(f, "Mode: {}", self.label)?;
        writeln!(f, "Total run time:         {:.3} ms", millis(self.wall_time))?;
        writeln!(f, "CPU User time (all):    {:.3} ms", millis(usage.user_time))?;
        writeln!(f, "CPU System time (all):  {:.3} ms", millis(usage.sys_time))?;
        writeln!(f, "Max Memory Usage:       {} KB", usage.max_rss_kb)?;
        writeln!(f, "Voluntary Ctx Switches:   {}", usage.voluntary_switches)?;
        writeln!(f, "Involuntary Ctx Switches: {}", usage.involuntary_switches)?;
        write!(f, "Total Context Switches:   {}", usage.total_switches())
    }
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_lists_every_metric() {
        let report = PerfReport {
            label: "sequential".to_string(),
            wall_time: Duration::from_micros(12_345),
            usage: ResourceUsage {
                user_time: Duration::from_millis(10),
                sys_time: Duration::from_micros(1_500),
                max_rss_kb: 2048,
                voluntary_switches: 3,
                involuntary_switches: 4,
            },
        };
        let text = report.to_string();
        assert!(text.contains("Mode: sequential"));
        assert!(text.contains("Total run time:         12.345 ms"));
        assert!(text.contains("CPU User time (all):    10.000 ms"));
        assert!(text.contains("CPU System time (all):  1.500 ms"));
        assert!(text.contains("Max Memory Usage:       2048 KB"));
        assert!(text.contains("Total Context Switches:   7"));
    }

    #[test]
    fn in_process_report_measures_wall_time() {
        let recorder = PerfRecorder::start();
        std::thread::sleep(Duration::from_millis(5));
        let report = recorder.finish_in_process("thread-only");
        assert!(report.wall_time >= Duration::from_millis(5));
        assert_eq!(report.label, "thread-only");
    }

    #[test]
    #[cfg(unix)]
    fn children_are_reaped_and_aggregated() {
        let spawn = |index, code: &str| SpawnedGroup {
            index,
            child: std::process::Command::new("sh")
                .args(["-c", &format!("exit {code}")])
                .spawn()
                .unwrap(),
        };
        let children = vec![spawn(0, "0"), spawn(1, "3")];
        let progress = ProgressBar::hidden();
        let collection = collect_children(children, &progress);

        assert_eq!(
            collection.exits,
            vec![
                GroupExit { index: 0, status: 0 },
                GroupExit { index: 1, status: 3 }
            ]
        );
        assert!(collection.lost.is_empty());
        assert_eq!(progress.position(), 2);
    }

    #[test]
    #[cfg(unix)]
    fn reaped_child_does_not_hide_later_failures() {
        let mut reaped = std::process::Command::new("true").spawn().unwrap();
        reaped.wait().unwrap();
        let failing = std::process::Command::new("sh")
            .args(["-c", "exit 3"])
            .spawn()
            .unwrap();
        let children = vec![
            SpawnedGroup {
                index: 0,
                child: reaped,
            },
            SpawnedGroup {
                index: 1,
                child: failing,
            },
        ];
        let collection = collect_children(children, &ProgressBar::hidden());

        assert_eq!(collection.exits, vec![GroupExit { index: 1, status: 3 }]);
        assert_eq!(collection.lost.len(), 1);
        assert_eq!(collection.lost[0].0, 0);
    }
}
