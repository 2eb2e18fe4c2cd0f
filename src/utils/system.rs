// src/utils/system.rs: System functions

use sysinfo::{CpuRefreshKind, RefreshKind, System};

/// Number of logical CPUs the host exposes, never less than 1.
pub fn detect_cores() -> usize {
    let refresh_kind = RefreshKind::nothing().with_cpu(CpuRefreshKind::nothing());
    let system = System::new_with_specifics(refresh_kind);
    let logical = system.cpus().len();
    if logical > 0 {
        logical
    } else {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}

/// Size of the fan-out worker pool.
///
/// # Arguments
///
/// * `requested` - thread count from the run parameters (already defaulted to 1)
/// * `host_cores` - result of `detect_cores`
///
/// # Returns
///
/// min(requested, host_cores), at least 1.
pub fn worker_count(requested: usize, host_cores: usize) -> usize {
    requested.min(host_cores).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_cores_positive() {
        assert!(detect_cores() >= 1);
    }

    #[test]
    fn test_worker_count_clamps() {
        assert_eq!(worker_count(8, 4), 4);
        assert_eq!(worker_count(2, 16), 2);
        assert_eq!(worker_count(0, 16), 1);
        assert_eq!(worker_count(4, 0), 1);
    }
}
