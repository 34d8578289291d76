use std::fmt;

use clap::ValueEnum;

use crate::engine::EngineKind;
use crate::error::{BenchError, Result};
use crate::worker::{CostModel, DEFAULT_TIME_MULTIPLIER};

/// How the catalog is split across process groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Partition {
    /// Longest-processing-time-first balancing.
    #[default]
    Greedy,
    /// Round-robin by catalog index.
    Stride,
}

/// How threads claim items in the thread-parallel flat mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Dispatch {
    /// Shared spinlock-guarded index counter.
    #[default]
    Spinlock,
    /// Fixed index stride per thread, no synchronization.
    Stride,
    /// Rayon work-stealing pool.
    WorkStealing,
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Partition::Greedy => "greedy",
            Partition::Stride => "stride",
        })
    }
}

impl fmt::Display for Dispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Dispatch::Spinlock => "spinlock",
            Dispatch::Stride => "stride",
            Dispatch::WorkStealing => "work-stealing",
        })
    }
}

/// Execution mode selected from the process and thread counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Sequential,
    ProcessFlat { processes: usize },
    ThreadFlat { threads: usize },
    Hybrid { processes: usize, threads: usize },
}

impl Mode {
    pub fn select(processes: usize, threads: usize) -> Self {
        match (processes, threads) {
            (0, 0) => Mode::Sequential,
            (processes, 0) => Mode::ProcessFlat { processes },
            (0, threads) => Mode::ThreadFlat { threads },
            (processes, threads) => Mode::Hybrid { processes, threads },
        }
    }

    /// Number of child processes the mode spawns.
    pub fn processes(&self) -> usize {
        match *self {
            Mode::ProcessFlat { processes } | Mode::Hybrid { processes, .. } => processes,
            Mode::Sequential | Mode::ThreadFlat { .. } => 0,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Sequential => write!(f, "sequential"),
            Mode::ProcessFlat { processes } => write!(f, "process-only (P={processes})"),
            Mode::ThreadFlat { threads } => write!(f, "thread-only (T={threads})"),
            Mode::Hybrid { processes, threads } => {
                write!(f, "hybrid (P={processes}, T={threads})")
            }
        }
    }
}

/// Validated settings for one benchmark run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchConfig {
    pub mode: Mode,
    pub engine: EngineKind,
    pub dispatch: Dispatch,
    pub partition: Partition,
    pub cost_model: CostModel,
    pub show_progress: bool,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Sequential,
            engine: EngineKind::default(),
            dispatch: Dispatch::default(),
            partition: Partition::default(),
            cost_model: CostModel::new(DEFAULT_TIME_MULTIPLIER),
            show_progress: false,
        }
    }
}

impl BenchConfig {
    pub fn new(processes: usize, threads: usize, time_multiplier: u64) -> Result<Self> {
        if time_multiplier == 0 {
            return Err(BenchError::InvalidConfig(
                "time multiplier must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            mode: Mode::select(processes, threads),
            cost_model: CostModel::new(time_multiplier),
            ..Self::default()
        })
    }
}
