use sysinfo::System;

use crate::error::{Result, SortError};

/// Live bytes a record is assumed to occupy per serialized byte once materialized in memory.
pub const DEFAULT_MEMORY_OVERHEAD: f64 = 2.0;

/// Compute the target partition size in estimated in-memory bytes.
///
/// The naive size spreads the estimated footprint of the whole input over `max_spill_files`
/// partitions. When half of the available memory is larger, the block grows to that, trading
/// fewer and larger spill files for less I/O.
///
/// # Arguments
/// * `total_input_bytes` - serialized size of the input
/// * `max_spill_files` - desired upper bound on the number of spill files
/// * `available_memory_bytes` - memory the sort may use
/// * `memory_overhead` - in-memory bytes per serialized byte, see [DEFAULT_MEMORY_OVERHEAD]
///
/// # Examples
/// ```
/// use text_spill_sort::estimator::estimate_block_size;
/// assert_eq!(estimate_block_size(1000, 10, 100, 2.0).unwrap(), 200);
/// assert_eq!(estimate_block_size(1000, 10, 1000, 2.0).unwrap(), 500);
/// ```
pub fn estimate_block_size(
    total_input_bytes: u64,
    max_spill_files: usize,
    available_memory_bytes: u64,
    memory_overhead: f64,
) -> Result<u64> {
    if total_input_bytes == 0 {
        return Err(SortError::config("total input size must be positive"));
    }
    if max_spill_files == 0 {
        return Err(SortError::config("max spill files must be positive"));
    }
    if available_memory_bytes == 0 {
        return Err(SortError::config("available memory must be positive"));
    }
    validate_memory_overhead(memory_overhead)?;

    let footprint = estimated_footprint(total_input_bytes, memory_overhead);
    let files = max_spill_files as u64;
    let mut block_size = footprint / files + u64::from(footprint % files != 0);
    let half_memory = available_memory_bytes / 2;
    if half_memory > block_size {
        block_size = half_memory;
    }
    Ok(block_size.max(1))
}

pub(crate) fn validate_memory_overhead(memory_overhead: f64) -> Result<()> {
    if memory_overhead.is_finite() && memory_overhead > 0.0 {
        Ok(())
    } else {
        Err(SortError::config(format!("memory overhead must be a positive number, got {memory_overhead}")))
    }
}

/// Partitions that can be resident at once while `tasks` workers sort them: one accumulating,
/// one queued per worker and one executing per worker.
pub fn in_flight_partitions(tasks: usize) -> u64 {
    if tasks > 1 {
        2 * tasks as u64 + 1
    } else {
        1
    }
}

/// Estimated in-memory size of `bytes` serialized bytes.
pub fn estimated_footprint(bytes: u64, memory_overhead: f64) -> u64 {
    (bytes as f64 * memory_overhead).ceil() as u64
}

/// Memory currently available to the process as reported by the operating system.
pub fn available_memory() -> u64 {
    let mut system = System::new();
    system.refresh_memory();
    system.available_memory()
}

#[cfg(test)]
mod tests {
    use crate::error::SortError;
    use crate::estimator::{estimate_block_size, estimated_footprint, in_flight_partitions};

    #[test]
    fn test_naive_block_rounds_up() -> Result<(), anyhow::Error> {
        // 20 bytes at 2x overhead over 3 files
        assert_eq!(estimate_block_size(20, 3, 1, 2.0)?, 14);
        assert_eq!(estimate_block_size(20, 1, 1, 2.0)?, 40);
        assert_eq!(estimate_block_size(21, 7, 2, 1.0)?, 3);
        Ok(())
    }

    #[test]
    fn test_half_memory_wins() -> Result<(), anyhow::Error> {
        assert_eq!(estimate_block_size(20, 3, 1_000_000, 2.0)?, 500_000);
        Ok(())
    }

    #[test]
    fn test_never_below_one() -> Result<(), anyhow::Error> {
        assert_eq!(estimate_block_size(1, 1024, 1, 0.001)?, 1);
        Ok(())
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(matches!(estimate_block_size(0, 3, 10, 2.0), Err(SortError::Config(_))));
        assert!(matches!(estimate_block_size(10, 0, 10, 2.0), Err(SortError::Config(_))));
        assert!(matches!(estimate_block_size(10, 3, 0, 2.0), Err(SortError::Config(_))));
        assert!(matches!(estimate_block_size(10, 3, 10, 0.0), Err(SortError::Config(_))));
        assert!(matches!(estimate_block_size(10, 3, 10, f64::NAN), Err(SortError::Config(_))));
    }

    #[test]
    fn test_in_flight_partitions() {
        assert_eq!(in_flight_partitions(0), 1);
        assert_eq!(in_flight_partitions(1), 1);
        assert_eq!(in_flight_partitions(4), 9);
    }

    #[test]
    fn test_footprint() {
        assert_eq!(estimated_footprint(7, 2.0), 14);
        assert_eq!(estimated_footprint(3, 1.5), 5);
    }
}
