use std::sync::{Arc, Mutex, PoisonError};

use anyhow::anyhow;
use command_executor::command::Command;

use crate::cancel::CancellationToken;
use crate::compare::Comparator;
use crate::error::{Result, SortError};
use crate::record::Record;
use crate::spill::{write_spill, SpillFile, SpillStore};

/// Spills produced by the sorting pool and the first failure, if any.
#[derive(Default)]
pub(crate) struct SpillResults {
    spills: Mutex<Vec<SpillFile>>,
    error: Mutex<Option<SortError>>,
}

impl SpillResults {
    fn push(&self, spill: SpillFile) {
        self.spills
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(spill);
    }

    pub(crate) fn fail(&self, error: SortError) {
        let mut guard = self.error.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.is_none() {
            *guard = Some(error);
        }
    }

    pub(crate) fn failed(&self) -> bool {
        self.error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Spills in id order, or the first failure. On failure every collected spill is deleted.
    pub(crate) fn take(&self) -> Result<Vec<SpillFile>> {
        let mut spills = std::mem::take(
            &mut *self.spills.lock().unwrap_or_else(PoisonError::into_inner)
        );
        if let Some(error) = self.error.lock().unwrap_or_else(PoisonError::into_inner).take() {
            log::info!("Discarding {} spill files after failure: {}", spills.len(), error);
            drop(spills);
            return Err(error);
        }
        spills.sort_by_key(|spill| spill.id());
        Ok(spills)
    }
}

/// Sorts one partition and spills it, executed on the sorting pool.
pub(crate) struct SortCommand<R> {
    id: u64,
    partition: Mutex<Option<Vec<R>>>,
    comparator: Comparator<R>,
    store: Arc<dyn SpillStore>,
    results: Arc<SpillResults>,
    cancellation: CancellationToken,
}

impl<R: Record + Send> SortCommand<R> {
    pub(crate) fn new(
        id: u64,
        partition: Vec<R>,
        comparator: Comparator<R>,
        store: Arc<dyn SpillStore>,
        results: Arc<SpillResults>,
        cancellation: CancellationToken,
    ) -> SortCommand<R> {
        SortCommand {
            id,
            partition: Mutex::new(Some(partition)),
            comparator,
            store,
            results,
            cancellation,
        }
    }

    fn sort_and_spill(&self, mut partition: Vec<R>) -> Result<SpillFile> {
        self.cancellation.check()?;
        sort_partition(&mut partition, &self.comparator);
        write_spill(self.store.as_ref(), self.id, &partition)
    }
}

impl<R: Record + Send> Command for SortCommand<R> {
    // failures are reported through SpillResults so the pool keeps draining its queue
    fn execute(&self) -> anyhow::Result<()> {
        let partition = self.partition
            .lock()
            .map_err(|_| anyhow!("partition {} lock poisoned", self.id))?
            .take();
        let partition = match partition {
            Some(partition) => partition,
            None => return Ok(()),
        };
        if self.results.failed() {
            return Ok(());
        }
        match self.sort_and_spill(partition) {
            Ok(spill) => self.results.push(spill),
            Err(e) => {
                log::debug!("Partition {} failed: {}", self.id, e);
                self.results.fail(e)
            }
        }
        Ok(())
    }
}

/// Stable in-memory sort of one partition.
pub(crate) fn sort_partition<R>(partition: &mut [R], comparator: &Comparator<R>) {
    partition.sort_by(|a, b| comparator(a, b));
}
