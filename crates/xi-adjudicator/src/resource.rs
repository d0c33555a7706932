//! Resource throttle (spec §5): a best-effort CPU/memory idleness probe
//! that scales down the ensemble worker pool, collapsing to a single
//! worker (degraded mode) when combined idleness falls below the
//! configured threshold. Grounded in `Framework::get_reaper_capacity` and
//! `OptimizedOrchestrator.execute_parallel`'s "Resource Shield" in the
//! original source: `cpu_idle = 1 - cpu_percent`, `ram_idle = 1 -
//! mem_percent`, `combined = min(cpu_idle, ram_idle)`, workers suggested
//! at `combined / 0.15` and capped by the caller's configured maximum.

const CAPACITY_PER_WORKER: f64 = 0.15;

/// Pure scaling decision, separated from the sysinfo probe so it can be
/// unit tested without depending on real machine load.
pub fn scaled_worker_count(configured_max: usize, cpu_idle: f64, ram_idle: f64, threshold: f64) -> usize {
    let configured_max = configured_max.max(1);
    let combined = cpu_idle.min(ram_idle);
    if combined < threshold {
        return 1;
    }
    let suggested = (combined / CAPACITY_PER_WORKER) as usize;
    suggested.max(1).min(configured_max)
}

/// Best-effort probe of CPU and memory idleness via `sysinfo`, folded
/// through [`scaled_worker_count`]. Never fails outright: an unreadable
/// probe clamps to a neutral 0.5/0.5 idleness reading, matching the
/// original source's fallback on a failed capacity read.
pub fn resource_throttle(configured_max: usize, threshold: f64) -> usize {
    let (cpu_idle, ram_idle) = probe_idleness();
    scaled_worker_count(configured_max, cpu_idle, ram_idle, threshold)
}

fn probe_idleness() -> (f64, f64) {
    use sysinfo::System;

    let mut sys = System::new_all();
    sys.refresh_cpu_usage();
    sys.refresh_memory();

    let cpu_idle = (1.0 - (sys.global_cpu_usage() as f64 / 100.0)).clamp(0.0, 1.0);
    let ram_idle = if sys.total_memory() > 0 {
        (1.0 - (sys.used_memory() as f64 / sys.total_memory() as f64)).clamp(0.0, 1.0)
    } else {
        0.5
    };

    (cpu_idle, ram_idle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_machine_scales_up_to_configured_max() {
        let workers = scaled_worker_count(5, 1.0, 1.0, 0.70);
        assert_eq!(workers, 5);
    }

    #[test]
    fn busy_machine_below_threshold_collapses_to_one() {
        let workers = scaled_worker_count(5, 0.4, 0.9, 0.70);
        assert_eq!(workers, 1);
    }

    #[test]
    fn combined_idleness_is_the_minimum_of_cpu_and_ram() {
        // ram idle dominates (lower), so the 0.5 ram reading drives the
        // collapse even though cpu is fully idle.
        let workers = scaled_worker_count(5, 1.0, 0.5, 0.70);
        assert_eq!(workers, 1);
    }

    #[test]
    fn suggested_workers_never_exceeds_configured_max() {
        let workers = scaled_worker_count(3, 1.0, 1.0, 0.70);
        assert_eq!(workers, 3);
    }

    #[test]
    fn zero_configured_max_still_yields_at_least_one_worker() {
        let workers = scaled_worker_count(0, 1.0, 1.0, 0.70);
        assert_eq!(workers, 1);
    }

    #[test]
    fn resource_throttle_runs_without_panicking() {
        let workers = resource_throttle(5, 0.70);
        assert!(workers >= 1 && workers <= 5);
    }
}
