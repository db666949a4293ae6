use std::io;
use std::sync::Arc;

use command_executor::shutdown_mode::ShutdownMode;
use command_executor::thread_pool_builder::ThreadPoolBuilder;

use crate::cancel::CancellationToken;
use crate::compare::Comparator;
use crate::error::{Result, SortError};
use crate::estimator::{estimated_footprint, DEFAULT_MEMORY_OVERHEAD};
use crate::record::Record;
use crate::sort_command::{sort_partition, SortCommand, SpillResults};
use crate::spill::{write_spill, SpillFile, SpillStore};

/// Sorted output of the partitioning phase.
#[derive(Debug)]
pub enum Partitions<R> {
    /// Sorted spill files in input order. Empty for an empty input.
    Spilled(Vec<SpillFile>),
    /// The whole input fitted one partition and was kept in memory.
    InMemory(Vec<R>),
}

/// Cuts a record stream into partitions of at most `block_size` estimated in-memory bytes, sorts
/// each partition and spills it.
///
/// A record joins the current partition unless the partition already holds records and the
/// record would push it past the block size. The concatenated spills hold exactly the input
/// records, and each spill is sorted. Spill ids follow input order.
pub struct ChunkSorter<R> {
    comparator: Comparator<R>,
    store: Arc<dyn SpillStore>,
    block_size: u64,
    memory_overhead: f64,
    tasks: usize,
    in_memory_fast_path: bool,
    cancellation: CancellationToken,
}

impl<R: Record + Send + 'static> ChunkSorter<R> {
    pub fn new(comparator: Comparator<R>, store: Arc<dyn SpillStore>, block_size: u64) -> ChunkSorter<R> {
        ChunkSorter {
            comparator,
            store,
            block_size,
            memory_overhead: DEFAULT_MEMORY_OVERHEAD,
            tasks: 1,
            in_memory_fast_path: false,
            cancellation: CancellationToken::default(),
        }
    }

    pub fn with_memory_overhead(mut self, memory_overhead: f64) -> ChunkSorter<R> {
        self.memory_overhead = memory_overhead;
        self
    }

    /// Number of partitions sorted and spilled concurrently. 1 keeps everything on the calling
    /// thread.
    pub fn with_tasks(mut self, tasks: usize) -> ChunkSorter<R> {
        self.tasks = tasks.max(1);
        self
    }

    /// Keep a single partition input in memory instead of spilling it.
    pub fn with_in_memory_fast_path(mut self, in_memory_fast_path: bool) -> ChunkSorter<R> {
        self.in_memory_fast_path = in_memory_fast_path;
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> ChunkSorter<R> {
        self.cancellation = cancellation;
        self
    }

    /// Partition, sort and spill `input`.
    ///
    /// On any failure every spill created by this call is deleted before the error is returned.
    pub fn sort_in_partitions<I>(&self, input: I) -> Result<Partitions<R>>
    where
        I: IntoIterator<Item = io::Result<R>>,
    {
        log::info!("Start partitioning, block size: {} bytes, tasks: {}", self.block_size, self.tasks);
        let partitions = if self.tasks > 1 {
            self.sort_parallel(input)?
        } else {
            self.sort_sequential(input)?
        };
        match &partitions {
            Partitions::Spilled(spills) => log::info!("Finish partitioning, spill files: {}", spills.len()),
            Partitions::InMemory(records) => log::info!("Finish partitioning, {} records kept in memory", records.len()),
        }
        Ok(partitions)
    }

    // emit receives every full partition, returns the count emitted and the trailing partition
    fn accumulate<I, F>(&self, input: I, mut emit: F) -> Result<(u64, Vec<R>)>
    where
        I: IntoIterator<Item = io::Result<R>>,
        F: FnMut(u64, Vec<R>) -> Result<()>,
    {
        let mut partition: Vec<R> = Vec::new();
        let mut partition_bytes: u64 = 0;
        let mut next_id: u64 = 0;
        for item in input {
            let record = item.map_err(SortError::Input)?;
            let footprint = estimated_footprint(record.size_bytes() as u64, self.memory_overhead);
            if !partition.is_empty() && partition_bytes.saturating_add(footprint) > self.block_size {
                self.cancellation.check()?;
                let capacity = partition.len();
                emit(next_id, std::mem::replace(&mut partition, Vec::with_capacity(capacity)))?;
                next_id += 1;
                partition_bytes = 0;
            }
            partition_bytes = partition_bytes.saturating_add(footprint);
            partition.push(record);
        }
        self.cancellation.check()?;
        Ok((next_id, partition))
    }

    fn sort_sequential<I>(&self, input: I) -> Result<Partitions<R>>
    where
        I: IntoIterator<Item = io::Result<R>>,
    {
        let mut spills: Vec<SpillFile> = Vec::new();
        let (emitted, mut trailing) = self.accumulate(input, |id, mut partition| {
            sort_partition(&mut partition, &self.comparator);
            spills.push(write_spill(self.store.as_ref(), id, &partition)?);
            Ok(())
        })?;

        if trailing.is_empty() {
            return Ok(Partitions::Spilled(spills));
        }
        sort_partition(&mut trailing, &self.comparator);
        if emitted == 0 && self.in_memory_fast_path {
            return Ok(Partitions::InMemory(trailing));
        }
        spills.push(write_spill(self.store.as_ref(), emitted, &trailing)?);
        Ok(Partitions::Spilled(spills))
    }

    fn sort_parallel<I>(&self, input: I) -> Result<Partitions<R>>
    where
        I: IntoIterator<Item = io::Result<R>>,
    {
        // workers plus queue bound the resident partitions, see in_flight_partitions
        let mut sorting_pool = ThreadPoolBuilder::new()
            .with_name("sorting".to_string())
            .with_tasks(self.tasks)
            .with_queue_size(self.tasks)
            .with_shutdown_mode(ShutdownMode::CompletePending)
            .build()
            .map_err(|e| SortError::message(format!("Failed to start sorting pool: {e}")))?;
        let results = Arc::new(SpillResults::default());

        let accumulated = self.accumulate(input, |id, partition| {
            if results.failed() {
                return Err(SortError::message("partition sorting failed"));
            }
            sorting_pool.submit(Box::new(self.command(id, partition, &results)));
            Ok(())
        });
        let in_memory = accumulated.and_then(|(emitted, mut trailing)| {
            if trailing.is_empty() {
                Ok(None)
            } else if emitted == 0 && self.in_memory_fast_path {
                sort_partition(&mut trailing, &self.comparator);
                Ok(Some(trailing))
            } else {
                sorting_pool.submit(Box::new(self.command(emitted, trailing, &results)));
                Ok(None)
            }
        });

        log::info!("Shutting down sorting pool");
        sorting_pool.shutdown();
        let joined = sorting_pool.join();

        // a worker failure explains any later read abort, so it is reported first
        let spills = results.take()?;
        let in_memory = in_memory?;
        joined.map_err(|e| SortError::message(format!("Sorting pool failed: {e}")))?;

        match in_memory {
            Some(records) => Ok(Partitions::InMemory(records)),
            None => Ok(Partitions::Spilled(spills)),
        }
    }

    fn command(&self, id: u64, partition: Vec<R>, results: &Arc<SpillResults>) -> SortCommand<R> {
        SortCommand::new(
            id,
            partition,
            self.comparator.clone(),
            self.store.clone(),
            results.clone(),
            self.cancellation.clone(),
        )
    }
}
