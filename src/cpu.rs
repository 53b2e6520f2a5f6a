//! CPU count detection with container awareness.
//!
//! The worker pool is sized from the number of CPUs actually available to
//! the process, which inside a container is the cgroup quota, not the host
//! core count. Detection order:
//!
//! 1. cgroup v2 `cpu.max` (`"<quota> <period>"`, quota `max` = no limit)
//! 2. cgroup v1 `cpu.cfs_quota_us` / `cpu.cfs_period_us` (quota `-1` = no limit)
//! 3. OS-reported logical CPU count
//!
//! The first source that yields a positive integer wins. A `WORKER_THREADS`
//! override is applied by the caller before detection is consulted.

use std::fs;
use std::path::Path;

use tracing::debug;

const CGROUP_V2_CPU_MAX: &str = "/sys/fs/cgroup/cpu.max";
const CGROUP_V1_QUOTA: &str = "/sys/fs/cgroup/cpu/cpu.cfs_quota_us";
const CGROUP_V1_PERIOD: &str = "/sys/fs/cgroup/cpu/cpu.cfs_period_us";

/// Detect the logical CPU count available to this process.
///
/// Always returns at least 1.
pub fn detect_cpus() -> usize {
    if let Some(n) = cgroup_v2_cpus(Path::new(CGROUP_V2_CPU_MAX)) {
        debug!(cpus = n, source = "cgroup_v2", "CPU count detected");
        return n;
    }
    if let Some(n) = cgroup_v1_cpus(Path::new(CGROUP_V1_QUOTA), Path::new(CGROUP_V1_PERIOD)) {
        debug!(cpus = n, source = "cgroup_v1", "CPU count detected");
        return n;
    }
    let n = num_cpus::get().max(1);
    debug!(cpus = n, source = "os", "CPU count detected");
    n
}

fn cgroup_v2_cpus(path: &Path) -> Option<usize> {
    let contents = fs::read_to_string(path).ok()?;
    parse_cpu_max(&contents)
}

fn cgroup_v1_cpus(quota_path: &Path, period_path: &Path) -> Option<usize> {
    let quota = fs::read_to_string(quota_path).ok()?;
    let period = fs::read_to_string(period_path).ok()?;
    parse_v1_quota(&quota, &period)
}

/// Parse a cgroup v2 `cpu.max` file: `"<quota> <period>"` where quota is
/// microseconds per period or the literal `max` for unlimited.
pub(crate) fn parse_cpu_max(contents: &str) -> Option<usize> {
    let mut parts = contents.split_whitespace();
    let quota = parts.next()?;
    if quota == "max" {
        return None;
    }
    let quota: u64 = quota.parse().ok()?;
    let period: u64 = parts.next()?.parse().ok()?;
    quota_to_cpus(quota, period)
}

/// Parse cgroup v1 quota/period files; a quota of `-1` means no limit.
pub(crate) fn parse_v1_quota(quota: &str, period: &str) -> Option<usize> {
    let quota: i64 = quota.trim().parse().ok()?;
    if quota < 0 {
        return None;
    }
    let period: u64 = period.trim().parse().ok()?;
    quota_to_cpus(quota as u64, period)
}

fn quota_to_cpus(quota: u64, period: u64) -> Option<usize> {
    if period == 0 {
        return None;
    }
    // Round up: a quota of 1.5 CPUs should size the pool for 2.
    let cpus = quota.div_ceil(period) as usize;
    if cpus == 0 {
        None
    } else {
        Some(cpus)
    }
}
