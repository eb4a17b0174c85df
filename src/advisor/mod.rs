//! Parallelism degree heuristics
//!
//! Pure functions for choosing a concurrency width from the machine's
//! logical CPU count and the workload character (CPU-bound vs I/O-bound),
//! plus partition sizing for batch work. These are recommendations, not
//! guarantees; callers pass the result to a dispatcher as its budget.

/// Default fraction of logical CPUs for CPU-bound work
pub const DEFAULT_CPU_FRACTION: f64 = 0.75;
/// Default lower bound for the CPU-bound degree
pub const DEFAULT_MIN_DEGREE: usize = 1;
/// Default upper bound for the CPU-bound degree
pub const DEFAULT_MAX_DEGREE: usize = 16;

/// Default CPU multiplier for I/O-bound work
pub const DEFAULT_IO_MULTIPLIER: f64 = 2.0;
/// Default upper bound for the I/O-bound degree
pub const DEFAULT_IO_MAX_DEGREE: usize = 32;

/// Default target items per worker when sizing partitions
pub const DEFAULT_IDEAL_PER_WORKER: usize = 100;

/// Recommended degree for CPU-bound work.
///
/// Rounds `logical CPUs * fraction`, keeps it at least 1, then clamps it
/// into `[min, max]`.
pub fn cpu_degree(fraction: f64, min: usize, max: usize) -> usize {
    cpu_degree_for_cpus(num_cpus::get(), fraction, min, max)
}

/// Recommended degree for I/O-bound work.
///
/// I/O-bound workers spend most of their time waiting, so oversubscribing
/// relative to the core count (multiplier > 1) improves throughput. No lower
/// clamp beyond the natural >= 0 from rounding.
pub fn io_degree(multiplier: f64, max: usize) -> usize {
    io_degree_for_cpus(num_cpus::get(), multiplier, max)
}

/// Recommended partition size for splitting `total_items` across workers.
///
/// Small inputs (up to 10 items per CPU) favor wide, shallow partitioning;
/// larger inputs cap each partition at `ideal_per_worker`.
pub fn partition_size(total_items: usize, ideal_per_worker: usize) -> usize {
    partition_size_for_cpus(num_cpus::get(), total_items, ideal_per_worker)
}

/// Recommended degree adjusted to the current system load.
///
/// Samples a coarse load signal and linearly interpolates the CPU fraction
/// between `max_fraction` (idle system) and `min_fraction` (fully loaded),
/// then applies [`cpu_degree`] with the default bounds. The load signal is
/// best-effort: on platforms where it cannot be read, the midpoint fraction
/// 0.5 is used.
pub fn dynamic_degree(max_fraction: f64, min_fraction: f64) -> usize {
    let fraction = match sample_normalized_load() {
        Some(load) => max_fraction - (max_fraction - min_fraction) * load,
        None => 0.5,
    };
    cpu_degree(fraction, DEFAULT_MIN_DEGREE, DEFAULT_MAX_DEGREE)
}

pub(crate) fn cpu_degree_for_cpus(cpus: usize, fraction: f64, min: usize, max: usize) -> usize {
    let ideal = ((cpus as f64 * fraction).round() as usize).max(1);
    ideal.clamp(min, max)
}

pub(crate) fn io_degree_for_cpus(cpus: usize, multiplier: f64, max: usize) -> usize {
    let ideal = (cpus as f64 * multiplier).round() as usize;
    ideal.min(max)
}

pub(crate) fn partition_size_for_cpus(
    cpus: usize,
    total_items: usize,
    ideal_per_worker: usize,
) -> usize {
    let cpus = cpus.max(1);
    if total_items <= cpus * 10 {
        return (total_items / cpus).max(1);
    }
    (total_items / cpus).min(ideal_per_worker).max(1)
}

/// One-minute load average normalized by CPU count, clamped to [0, 1].
/// Returns `None` where no load signal is available.
fn sample_normalized_load() -> Option<f64> {
    #[cfg(target_os = "linux")]
    {
        let raw = std::fs::read_to_string("/proc/loadavg").ok()?;
        let one_minute: f64 = raw.split_whitespace().next()?.parse().ok()?;
        Some((one_minute / num_cpus::get() as f64).clamp(0.0, 1.0))
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_degree_full_fraction_uses_all_cores() {
        assert_eq!(cpu_degree_for_cpus(8, 1.0, 1, 16), 8);
    }

    #[test]
    fn cpu_degree_quarter_fraction() {
        assert_eq!(cpu_degree_for_cpus(8, 0.25, 1, 16), 2);
    }

    #[test]
    fn cpu_degree_clamps_to_bounds() {
        assert_eq!(cpu_degree_for_cpus(64, 1.0, 1, 16), 16);
        assert_eq!(cpu_degree_for_cpus(1, 0.1, 2, 16), 2);
    }

    #[test]
    fn cpu_degree_never_below_one_before_clamping() {
        // round(1 * 0.1) = 0, lifted to 1
        assert_eq!(cpu_degree_for_cpus(1, 0.1, 1, 16), 1);
    }

    #[test]
    fn io_degree_oversubscribes() {
        assert_eq!(io_degree_for_cpus(8, 2.0, 32), 16);
        assert_eq!(io_degree_for_cpus(8, 4.0, 32), 32);
    }

    #[test]
    fn io_degree_capped() {
        assert_eq!(io_degree_for_cpus(32, 2.0, 32), 32);
    }

    #[test]
    fn partition_size_small_input_goes_wide() {
        assert_eq!(partition_size_for_cpus(8, 10, 100), 1);
    }

    #[test]
    fn partition_size_large_input_caps_per_worker() {
        assert_eq!(partition_size_for_cpus(8, 10_000, 100), 100);
    }

    #[test]
    fn partition_size_large_input_below_ideal() {
        // 800 > 8 * 10, large-input branch: min(100, 800 / 8) = 100
        assert_eq!(partition_size_for_cpus(8, 800, 100), 100);
        // 160 / 8 = 20 stays under the per-worker ideal
        assert_eq!(partition_size_for_cpus(8, 160, 100), 20);
    }

    #[test]
    fn partition_size_never_zero() {
        assert_eq!(partition_size_for_cpus(8, 1, 100), 1);
        assert_eq!(partition_size_for_cpus(8, 0, 100), 1);
    }

    #[test]
    fn dynamic_degree_stays_in_default_bounds() {
        let degree = dynamic_degree(0.9, 0.3);
        assert!(degree >= DEFAULT_MIN_DEGREE);
        assert!(degree <= DEFAULT_MAX_DEGREE);
    }
}
