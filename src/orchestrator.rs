use std::path::PathBuf;
use std::process::{Command, Stdio};

use anyhow::{bail, Context, Result};
use indicatif::ProgressBar;
use tracing::{info, warn};

use crate::balance::{lpt_partition, stride_partition, Bucket};
use crate::catalog::WorkCatalog;
use crate::config::{BenchConfig, Mode, Partition};
use crate::engine::EngineKind;
use crate::error::BenchError;
use crate::io::create_progress_bar;
use crate::parallel::{run_sequential, run_thread_flat, ExecutionGroup};
use crate::perf::{collect_children, ChildCollection, PerfRecorder, PerfReport, SpawnedGroup};
use crate::worker::CostModel;

/// Everything a child process needs to run one execution group.
///
/// Computed by the parent before spawning and passed on the command line, so
/// no state is shared between groups after the split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSpec {
    pub index: usize,
    pub items: Vec<usize>,
    pub threads: usize,
    pub engine: EngineKind,
    pub time_multiplier: u64,
}

impl GroupSpec {
    /// Arguments that re-enter the binary in group mode.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "0".to_string(),
            self.threads.to_string(),
            "--engine".to_string(),
            self.engine.to_string(),
            "--time-multiplier".to_string(),
            self.time_multiplier.to_string(),
            "--group-index".to_string(),
            self.index.to_string(),
        ];
        if !self.items.is_empty() {
            let items: Vec<String> = self.items.iter().map(ToString::to_string).collect();
            args.push("--group-items".to_string());
            args.push(items.join(","));
        }
        args
    }

    /// Runs this group in the current process.
    pub fn run(&self, catalog: &WorkCatalog) -> Result<()> {
        if let Some(&bad) = self.items.iter().find(|&&i| i >= catalog.len()) {
            bail!("group {} was given unknown item index {bad}", self.index);
        }

        let group = ExecutionGroup::new(
            self.index,
            self.items.clone(),
            self.threads,
            self.engine,
            CostModel::new(self.time_multiplier),
        );
        let done = group.run(catalog, &ProgressBar::hidden())?;
        if done != self.items.len() {
            bail!(
                "group {} finished {done} of {} items",
                self.index,
                self.items.len()
            );
        }
        Ok(())
    }
}

/// Selects the execution mode, creates the groups and drives them to
/// completion.
#[derive(Debug)]
pub struct Orchestrator {
    config: BenchConfig,
    catalog: WorkCatalog,
    program: Option<PathBuf>,
    verbosity: u8,
}

impl Orchestrator {
    pub fn new(config: BenchConfig, catalog: WorkCatalog) -> Self {
        Self {
            config,
            catalog,
            program: None,
            verbosity: 0,
        }
    }

    /// Binary to re-execute for process groups. Defaults to the current
    /// executable.
    pub fn with_program(mut self, program: PathBuf) -> Self {
        self.program = Some(program);
        self
    }

    /// Verbosity forwarded to group processes.
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn run(&self) -> Result<PerfReport> {
        let mode = self.config.mode;
        let model = &self.config.cost_model;
        let cpus = num_cpus::get();
        info!(%mode, cpus, items = self.catalog.len(), "starting benchmark");

        let workers = mode.processes().max(1) * self.threads().max(1);
        if workers > cpus {
            warn!(workers, cpus, "configuration oversubscribes available CPUs");
        }

        let label = self.label();
        match mode {
            Mode::Sequential => {
                let progress = self.progress(self.catalog.len(), "items");
                let recorder = PerfRecorder::start();
                run_sequential(&self.catalog, model, &progress);
                progress.finish_and_clear();
                Ok(recorder.finish_in_process(label))
            }
            Mode::ThreadFlat { threads } => {
                let progress = self.progress(self.catalog.len(), "items");
                let recorder = PerfRecorder::start();
                run_thread_flat(&self.catalog, threads, self.config.dispatch, model, &progress)?;
                progress.finish_and_clear();
                Ok(recorder.finish_in_process(label))
            }
            Mode::ProcessFlat { processes } => self.run_groups(processes, 0, label),
            Mode::Hybrid { processes, threads } => self.run_groups(processes, threads, label),
        }
    }

    fn run_groups(&self, processes: usize, threads: usize, label: String) -> Result<PerfReport> {
        let progress = self.progress(processes, "groups");
        let recorder = PerfRecorder::start();

        let buckets = self.partition(processes)?;
        let children = self.spawn_groups(&buckets, threads)?;
        let (report, collection) = recorder.finish_with_children(label, children, &progress);
        progress.finish_and_clear();

        verify_groups(collection, processes)?;
        Ok(report)
    }

    fn partition(&self, processes: usize) -> Result<Vec<Bucket>, BenchError> {
        match self.config.partition {
            Partition::Greedy => lpt_partition(self.catalog.costs(), processes),
            Partition::Stride => stride_partition(self.catalog.costs(), processes),
        }
    }

    /// Starts one process per bucket. If any spawn fails the run is aborted:
    /// groups already started are killed and reaped before the error returns.
    fn spawn_groups(&self, buckets: &[Bucket], threads: usize) -> Result<Vec<SpawnedGroup>> {
        let program = match &self.program {
            Some(program) => program.clone(),
            None => std::env::current_exe().context("Failed to locate benchmark executable")?,
        };

        let mut spawned = Vec::with_capacity(buckets.len());
        for (index, bucket) in buckets.iter().enumerate() {
            let spec = GroupSpec {
                index,
                items: bucket.indices().to_vec(),
                threads,
                engine: self.config.engine,
                time_multiplier: self.config.cost_model.time_multiplier(),
            };

            let mut command = Command::new(&program);
            command
                .args(spec.to_args())
                .args(self.forwarded_verbosity())
                .stdin(Stdio::null())
                .stdout(Stdio::null());

            match command.spawn() {
                Ok(child) => spawned.push(SpawnedGroup { index, child }),
                Err(source) => {
                    warn!(group = index, error = %source, "spawn failed, aborting run");
                    abort_groups(spawned);
                    return Err(BenchError::Spawn {
                        group: index,
                        source,
                    }
                    .into());
                }
            }
        }
        Ok(spawned)
    }

    fn forwarded_verbosity(&self) -> Option<String> {
        (self.verbosity > 0).then(|| format!("-{}", "v".repeat(usize::from(self.verbosity))))
    }

    fn threads(&self) -> usize {
        match self.config.mode {
            Mode::ThreadFlat { threads } | Mode::Hybrid { threads, .. } => threads,
            Mode::Sequential | Mode::ProcessFlat { .. } => 0,
        }
    }

    fn progress(&self, total: usize, unit: &str) -> ProgressBar {
        create_progress_bar(total, unit, self.config.show_progress)
    }

    fn label(&self) -> String {
        let config = &self.config;
        let mode = config.mode;
        match mode {
            Mode::Sequential => mode.to_string(),
            Mode::ThreadFlat { .. } => format!("{mode}, dispatch={}", config.dispatch),
            Mode::ProcessFlat { .. } => format!("{mode}, partition={}", config.partition),
            Mode::Hybrid { .. } => format!(
                "{mode}, engine={}, partition={}",
                config.engine, config.partition
            ),
        }
    }
}

/// Fails unless every spawned group was reaped and exited cleanly.
fn verify_groups(collection: ChildCollection, spawned: usize) -> Result<(), BenchError> {
    if let Some((group, source)) = collection.lost.into_iter().next() {
        return Err(BenchError::Wait { group, source });
    }
    if collection.exits.len() < spawned {
        return Err(BenchError::GroupsMissing {
            reaped: collection.exits.len(),
            spawned,
        });
    }
    match collection.exits.iter().find(|exit| !exit.success()) {
        Some(failed) => Err(BenchError::GroupFailed {
            group: failed.index,
            status: failed.status,
        }),
        None => Ok(()),
    }
}

fn abort_groups(mut spawned: Vec<SpawnedGroup>) {
    for group in &mut spawned {
        if let Err(err) = group.child.kill() {
            warn!(group = group.index, error = %err, "failed to kill execution group");
        }
    }
    collect_children(spawned, &ProgressBar::hidden());
}
