use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::thread;

use crate::cancel::CancellationToken;
use crate::compare::Comparator;
use crate::cursor::{MemoryCursor, RecordCursor};
use crate::error::Result;
use crate::record::RecordSink;

/// One live cursor in the merge frontier.
struct FrontierEntry<R> {
    cursor: Box<dyn RecordCursor<R>>,
    id: usize,
    comparator: Comparator<R>,
}

impl<R> Eq for FrontierEntry<R> {}

impl<R> PartialEq<Self> for FrontierEntry<R> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<R> PartialOrd<Self> for FrontierEntry<R> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<R> Ord for FrontierEntry<R> {
    fn cmp(&self, other: &Self) -> Ordering {
        let ordering = match (self.cursor.peek(), other.cursor.peek()) {
            (Some(a), Some(b)) => (self.comparator)(a, b),
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
        };
        // flipped so the BinaryHeap (max heap) pops the smallest record, lowest id on ties
        ordering.then_with(|| self.id.cmp(&other.id)).reverse()
    }
}

/// k-way merge of sorted cursors into one sorted sink.
///
/// The frontier is a binary heap keyed by `(current record, cursor id)`, where the id is the
/// position of the cursor in the input list. Each step costs O(log k). Equal records leave in
/// cursor order, so merging runs that were cut from the input in order is stable.
pub struct Merger<R> {
    comparator: Comparator<R>,
    cancellation: CancellationToken,
    distinct: bool,
    log_level: log::Level,
}

impl<R: Clone> Merger<R> {
    pub fn new(comparator: Comparator<R>) -> Merger<R> {
        Merger {
            comparator,
            cancellation: CancellationToken::default(),
            distinct: false,
            log_level: log::Level::Info,
        }
    }

    /// Checked before every merge step.
    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Merger<R> {
        self.cancellation = cancellation;
        self
    }

    /// Drop records equal to the previously emitted record.
    pub fn with_distinct(mut self, distinct: bool) -> Merger<R> {
        self.distinct = distinct;
        self
    }

    /// Level of the start and finish messages. Intermediate merges log at [log::Level::Debug].
    pub fn with_log_level(mut self, log_level: log::Level) -> Merger<R> {
        self.log_level = log_level;
        self
    }

    /// Merge `cursors` into `sink`, returning the number of records written.
    ///
    /// Every cursor is closed as soon as it is exhausted. On failure or cancellation all cursors
    /// still open are closed before the error is returned; the sink keeps what was already
    /// written.
    pub fn merge<S>(&self, cursors: Vec<Box<dyn RecordCursor<R>>>, sink: &mut S) -> Result<u64>
    where
        S: RecordSink<R> + ?Sized,
    {
        log::log!(
            self.log_level,
            "Merging {} sorted runs, thread: {}",
            cursors.len(),
            thread::current().name().unwrap_or("unnamed")
        );
        let mut frontier = BinaryHeap::with_capacity(cursors.len());
        for (id, mut cursor) in cursors.into_iter().enumerate() {
            if cursor.is_exhausted() {
                cursor.close()?;
            } else {
                frontier.push(
                    FrontierEntry {
                        cursor,
                        id,
                        comparator: self.comparator.clone(),
                    }
                );
            }
        }

        match self.drain(&mut frontier, sink) {
            Ok(merged) => {
                log::log!(
                    self.log_level,
                    "Finished merging sorted runs, thread: {}, merged length: {} records",
                    thread::current().name().unwrap_or("unnamed"),
                    merged
                );
                Ok(merged)
            }
            Err(e) => {
                for mut entry in frontier.into_vec() {
                    if let Err(close_error) = entry.cursor.close() {
                        log::warn!("Failed to close run {} after merge failure: {}", entry.id, close_error);
                    }
                }
                Err(e)
            }
        }
    }

    fn drain<S>(&self, frontier: &mut BinaryHeap<FrontierEntry<R>>, sink: &mut S) -> Result<u64>
    where
        S: RecordSink<R> + ?Sized,
    {
        let mut merged: u64 = 0;
        let mut last: Option<R> = None;
        while let Some(mut entry) = frontier.pop() {
            self.cancellation.check()?;
            if let Some(record) = entry.cursor.peek() {
                let duplicate = self.distinct
                    && last
                        .as_ref()
                        .map_or(false, |last| (self.comparator)(last, record) == Ordering::Equal);
                if !duplicate {
                    sink.write_record(record)?;
                    merged += 1;
                    if self.distinct {
                        last = Some(record.clone());
                    }
                }
            }

            entry.cursor.advance()?;
            if entry.cursor.is_exhausted() {
                entry.cursor.close()?;
            } else {
                frontier.push(entry);
            }
        }
        sink.finish()?;
        Ok(merged)
    }
}

/// Merge sorted in-memory runs; used where no spill is involved.
pub fn merge_vecs<R: Clone + 'static>(runs: Vec<Vec<R>>, comparator: Comparator<R>) -> Result<Vec<R>> {
    let cursors: Vec<Box<dyn RecordCursor<R>>> = runs
        .into_iter()
        .map(|run| Box::new(MemoryCursor::new(run)) as Box<dyn RecordCursor<R>>)
        .collect();
    let mut merged = Vec::new();
    Merger::new(comparator).merge(cursors, &mut merged)?;
    Ok(merged)
}
