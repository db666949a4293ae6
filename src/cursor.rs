use std::io::BufRead;
use std::path::{Path, PathBuf};

use crate::error::{Result, SortError};
use crate::record::Record;
use crate::spill::{SpillFile, SpillStore};

/// Pull based view over one sorted sequence of records.
///
/// A cursor is either exhausted or exposes exactly one current record: the next unconsumed
/// record of its source, in source order. Only [advance](RecordCursor::advance) moves it.
pub trait RecordCursor<R> {
    /// The current record, `None` once exhausted. Does not consume.
    fn peek(&self) -> Option<&R>;

    /// Consume the current record and load the next one.
    ///
    /// A read failure is returned as an error and never reported as exhaustion.
    fn advance(&mut self) -> Result<()>;

    fn is_exhausted(&self) -> bool {
        self.peek().is_none()
    }

    /// Release the source. Cursors over a spill file delete it. Safe to call more than once.
    fn close(&mut self) -> Result<()>;
}

enum CursorState<R> {
    Active(R),
    Exhausted,
}

impl<R> CursorState<R> {
    fn current(&self) -> Option<&R> {
        match self {
            CursorState::Active(record) => Some(record),
            CursorState::Exhausted => None,
        }
    }
}

/// Cursor over a serialized stream: a spill file it owns, or a caller's input it only reads.
pub struct StreamCursor<R> {
    name: PathBuf,
    reader: Option<Box<dyn BufRead + Send>>,
    spill: Option<SpillFile>,
    state: CursorState<R>,
}

impl<R: Record> StreamCursor<R> {
    /// Open a cursor that takes ownership of `spill` and deletes it when closed or dropped.
    pub fn from_spill(store: &dyn SpillStore, spill: SpillFile) -> Result<StreamCursor<R>> {
        let name = spill.path().to_path_buf();
        let reader = store.open(spill.path())
            .map_err(|source| SortError::MergeRead { path: name.clone(), source })?;
        Self::open(name, reader, Some(spill))
    }

    /// Open a cursor over an already sorted input that is left in place. `name` appears in errors.
    pub fn from_reader(name: PathBuf, reader: Box<dyn BufRead + Send>) -> Result<StreamCursor<R>> {
        Self::open(name, reader, None)
    }

    fn open(name: PathBuf, reader: Box<dyn BufRead + Send>, spill: Option<SpillFile>) -> Result<StreamCursor<R>> {
        let mut cursor = StreamCursor {
            name,
            reader: Some(reader),
            spill,
            state: CursorState::Exhausted,
        };
        cursor.advance()?;
        Ok(cursor)
    }
}

impl<R> StreamCursor<R> {
    pub fn name(&self) -> &Path {
        &self.name
    }

    fn release(&mut self) -> Result<()> {
        self.reader = None;
        self.state = CursorState::Exhausted;
        match self.spill.take() {
            Some(spill) => spill.delete(),
            None => Ok(()),
        }
    }
}

impl<R: Record> RecordCursor<R> for StreamCursor<R> {
    fn peek(&self) -> Option<&R> {
        self.state.current()
    }

    fn advance(&mut self) -> Result<()> {
        let reader = match self.reader.as_mut() {
            Some(reader) => reader,
            None => {
                self.state = CursorState::Exhausted;
                return Ok(());
            }
        };
        match R::read_from(&mut **reader) {
            Ok(Some(record)) => {
                self.state = CursorState::Active(record);
                Ok(())
            }
            Ok(None) => {
                self.state = CursorState::Exhausted;
                Ok(())
            }
            Err(source) => {
                self.state = CursorState::Exhausted;
                self.reader = None;
                Err(SortError::MergeRead { path: self.name.clone(), source })
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        self.release()
    }
}

impl<R> Drop for StreamCursor<R> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            log::warn!("Failed to release cursor {}: {}", self.name.display(), e);
        }
    }
}

/// Cursor over a partition that was sorted in memory and never spilled.
pub struct MemoryCursor<R> {
    records: std::vec::IntoIter<R>,
    state: CursorState<R>,
}

impl<R> MemoryCursor<R> {
    /// `records` must already be sorted.
    pub fn new(records: Vec<R>) -> MemoryCursor<R> {
        let mut records = records.into_iter();
        let state = match records.next() {
            Some(record) => CursorState::Active(record),
            None => CursorState::Exhausted,
        };
        MemoryCursor {
            records,
            state,
        }
    }
}

impl<R> RecordCursor<R> for MemoryCursor<R> {
    fn peek(&self) -> Option<&R> {
        self.state.current()
    }

    fn advance(&mut self) -> Result<()> {
        self.state = match self.records.next() {
            Some(record) => CursorState::Active(record),
            None => CursorState::Exhausted,
        };
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.records = Vec::new().into_iter();
        self.state = CursorState::Exhausted;
        Ok(())
    }
}
