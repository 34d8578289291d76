use std::fmt;
use std::process::Child;
use std::time::Duration;

/// Resource usage of a process or an aggregate of processes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResourceUsage {
    pub user_time: Duration,
    pub sys_time: Duration,
    /// Peak resident set size in KiB. A high-water mark, never a delta.
    pub max_rss_kb: u64,
    pub voluntary_switches: u64,
    pub involuntary_switches: u64,
}

impl ResourceUsage {
    pub fn total_switches(&self) -> u64 {
        self.voluntary_switches + self.involuntary_switches
    }

    /// Usage consumed since an earlier snapshot of the same process.
    ///
    /// Peak RSS is carried over as the ending value.
    pub fn since(&self, earlier: &ResourceUsage) -> ResourceUsage {
        ResourceUsage {
            user_time: self.user_time.saturating_sub(earlier.user_time),
            sys_time: self.sys_time.saturating_sub(earlier.sys_time),
            max_rss_kb: self.max_rss_kb,
            voluntary_switches: self
                .voluntary_switches
                .saturating_sub(earlier.voluntary_switches),
            involuntary_switches: self
                .involuntary_switches
                .saturating_sub(earlier.involuntary_switches),
        }
    }

    /// Folds another process's usage into this aggregate.
    pub fn accumulate(&mut self, other: &ResourceUsage) {
        self.user_time += other.user_time;
        self.sys_time += other.sys_time;
        self.max_rss_kb = self.max_rss_kb.max(other.max_rss_kb);
        self.voluntary_switches += other.voluntary_switches;
        self.involuntary_switches += other.involuntary_switches;
    }
}

impl fmt::Display for ResourceUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "user={:.3}s sys={:.3}s rss={}KiB csw={}/{}",
            self.user_time.as_secs_f64(),
            self.sys_time.as_secs_f64(),
            self.max_rss_kb,
            self.voluntary_switches,
            self.involuntary_switches
        )
    }
}

pub(super) enum WaitOutcome {
    Exited { status: i32, usage: ResourceUsage },
    /// The pid cannot be waited on, usually because it was already reaped.
    NoChild(std::io::Error),
    Failed(std::io::Error),
}

#[cfg(unix)]
fn timeval_to_duration(tv: libc::timeval) -> Duration {
    let secs = if tv.tv_sec < 0 { 0 } else { tv.tv_sec as u64 };
    let usec = tv.tv_usec.clamp(0, 999_999) as u64;
    Duration::from_secs(secs) + Duration::from_micros(usec)
}

#[cfg(unix)]
fn maxrss_to_kb(ru_maxrss: libc::c_long) -> u64 {
    let raw = if ru_maxrss <= 0 { 0 } else { ru_maxrss as u64 };
    // macOS reports bytes, everything else KiB.
    if cfg!(target_os = "macos") {
        raw / 1024
    } else {
        raw
    }
}

#[cfg(unix)]
fn from_raw(ru: &libc::rusage) -> ResourceUsage {
    ResourceUsage {
        user_time: timeval_to_duration(ru.ru_utime),
        sys_time: timeval_to_duration(ru.ru_stime),
        max_rss_kb: maxrss_to_kb(ru.ru_maxrss),
        voluntary_switches: ru.ru_nvcsw.max(0) as u64,
        involuntary_switches: ru.ru_nivcsw.max(0) as u64,
    }
}

/// Usage of the current process, all threads included.
///
/// Returns zeros if `getrusage` fails.
#[cfg(unix)]
pub fn rusage_self() -> ResourceUsage {
    // SAFETY: a zeroed rusage is a valid out-parameter and the return code is checked.
    unsafe {
        let mut ru: libc::rusage = std::mem::zeroed();
        if libc::getrusage(libc::RUSAGE_SELF, &mut ru) != 0 {
            tracing::warn!(
                error = %std::io::Error::last_os_error(),
                "getrusage(RUSAGE_SELF) failed"
            );
            return ResourceUsage::default();
        }
        from_raw(&ru)
    }
}

#[cfg(not(unix))]
pub fn rusage_self() -> ResourceUsage {
    ResourceUsage::default()
}

/// Reaps `child` and reads its usage with `wait4`.
#[cfg(unix)]
pub(super) fn wait_child(child: Child) -> WaitOutcome {
    let pid = child.id() as libc::pid_t;
    loop {
        let mut status: libc::c_int = 0;
        // SAFETY: both out-parameters are valid for writes and the return code is checked.
        let (rc, ru) = unsafe {
            let mut ru: libc::rusage = std::mem::zeroed();
            let rc = libc::wait4(pid, &mut status, 0, &mut ru);
            (rc, ru)
        };

        if rc == -1 {
            let err = std::io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EINTR) => continue,
                Some(libc::ECHILD) => return WaitOutcome::NoChild(err),
                _ => return WaitOutcome::Failed(err),
            }
        }

        let status = if libc::WIFEXITED(status) {
            libc::WEXITSTATUS(status)
        } else if libc::WIFSIGNALED(status) {
            128 + libc::WTERMSIG(status)
        } else {
            -1
        };
        return WaitOutcome::Exited {
            status,
            usage: from_raw(&ru),
        };
    }
}

#[cfg(not(unix))]
pub(super) fn wait_child(mut child: Child) -> WaitOutcome {
    match child.wait() {
        Ok(status) => WaitOutcome::Exited {
            status: status.code().unwrap_or(-1),
            usage: ResourceUsage::default(),
        },
        Err(err) => WaitOutcome::Failed(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn since_subtracts_times_and_keeps_peak() {
        let earlier = ResourceUsage {
            user_time: Duration::from_millis(100),
            sys_time: Duration::from_millis(50),
            max_rss_kb: 1024,
            voluntary_switches: 10,
            involuntary_switches: 1,
        };
        let later = ResourceUsage {
            user_time: Duration::from_millis(250),
            sys_time: Duration::from_millis(80),
            max_rss_kb: 2048,
            voluntary_switches: 15,
            involuntary_switches: 4,
        };
        let delta = later.since(&earlier);
        assert_eq!(delta.user_time, Duration::from_millis(150));
        assert_eq!(delta.sys_time, Duration::from_millis(30));
        assert_eq!(delta.max_rss_kb, 2048);
        assert_eq!(delta.total_switches(), 8);
    }

    #[test]
    fn since_saturates_on_regression() {
        let big = ResourceUsage {
            user_time: Duration::from_millis(5),
            ..Default::default()
        };
        assert_eq!(ResourceUsage::default().since(&big).user_time, Duration::ZERO);
    }

    #[test]
    fn accumulate_sums_times_and_takes_peak() {
        let mut total = ResourceUsage::default();
        total.accumulate(&ResourceUsage {
            user_time: Duration::from_micros(700_000),
            sys_time: Duration::from_millis(1),
            max_rss_kb: 900,
            voluntary_switches: 2,
            involuntary_switches: 3,
        });
        total.accumulate(&ResourceUsage {
            user_time: Duration::from_micros(600_000),
            sys_time: Duration::from_millis(2),
            max_rss_kb: 700,
            voluntary_switches: 5,
            involuntary_switches: 0,
        });
        assert_eq!(total.user_time, Duration::from_millis(1300));
        assert_eq!(total.sys_time, Duration::from_millis(3));
        assert_eq!(total.max_rss_kb, 900);
        assert_eq!(total.voluntary_switches, 7);
        assert_eq!(total.involuntary_switches, 3);
    }

    #[test]
    #[cfg(unix)]
    fn self_usage_reports_memory() {
        let usage = rusage_self();
        #[cfg(any(target_os = "linux", target_os = "macos"))]
        assert!(usage.max_rss_kb > 0);
        let _ = usage;
    }

    #[test]
    #[cfg(unix)]
    fn exit_status_is_decoded() {
        let child = std::process::Command::new("sh")
            .args(["-c", "exit 5"])
            .spawn()
            .unwrap();
        assert!(matches!(
            wait_child(child),
            WaitOutcome::Exited { status: 5, .. }
        ));
    }

    #[test]
    #[cfg(unix)]
    fn already_reaped_child_reports_no_child() {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        child.wait().unwrap();
        assert!(matches!(wait_child(child), WaitOutcome::NoChild(_)));
    }
}
