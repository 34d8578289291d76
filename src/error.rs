use thiserror::Error;

/// Errors surfaced by the benchmark core.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BenchError {
    /// A partition was requested with zero buckets.
    #[error("invalid bucket count: {0} (must be >= 1)")]
    InvalidBucketCount(usize),

    /// A configuration value was rejected before any work started.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// An execution group process could not be started.
    #[error("failed to spawn execution group {group}: {source}")]
    Spawn {
        group: usize,
        #[source]
        source: std::io::Error,
    },

    /// Waiting for an execution group failed with a non-recoverable error.
    #[error("failed to wait for execution group {group}: {source}")]
    Wait {
        group: usize,
        #[source]
        source: std::io::Error,
    },

    /// Fewer execution groups were reaped than were spawned.
    #[error("only {reaped} of {spawned} execution groups were reaped")]
    GroupsMissing { reaped: usize, spawned: usize },

    /// An execution group process exited unsuccessfully.
    #[error("execution group {group} exited with status {status}")]
    GroupFailed { group: usize, status: i32 },
}

pub type Result<T> = std::result::Result<T, BenchError>;
