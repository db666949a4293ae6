use std::fs::File;
use std::io;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::{Builder, TempPath};

use crate::error::{Result, SortError};
use crate::record::{Record, RecordSink};

/// Where spill files are materialized.
///
/// Implementations must allow concurrent, non-overlapping writers: partitions are spilled from
/// several worker threads when the sort runs in parallel.
pub trait SpillStore: Send + Sync {
    /// Create a new empty spill. Dropping the returned [TempPath] deletes the file.
    fn create(&self, id: u64) -> io::Result<(TempPath, Box<dyn Write + Send>)>;

    /// Open a spill created by this store for sequential reading.
    fn open(&self, path: &Path) -> io::Result<Box<dyn BufRead + Send>>;
}

/// Spill files in a directory, named `<prefix><id>-XXXXXX<suffix>`.
#[derive(Clone, Debug)]
pub struct TempDirStore {
    dir: PathBuf,
    prefix: String,
    suffix: String,
}

impl TempDirStore {
    pub fn new(dir: PathBuf) -> TempDirStore {
        TempDirStore {
            dir,
            prefix: "spill-".to_string(),
            suffix: ".run".to_string(),
        }
    }

    pub fn with_prefix(mut self, prefix: String) -> TempDirStore {
        self.prefix = prefix;
        self
    }

    pub fn with_suffix(mut self, suffix: String) -> TempDirStore {
        self.suffix = suffix;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl SpillStore for TempDirStore {
    fn create(&self, id: u64) -> io::Result<(TempPath, Box<dyn Write + Send>)> {
        let (file, path) = Builder::new()
            .prefix(&format!("{}{}-", self.prefix, id))
            .suffix(&self.suffix)
            .tempfile_in(&self.dir)?
            .into_parts();
        Ok((path, Box::new(BufWriter::new(file))))
    }

    fn open(&self, path: &Path) -> io::Result<Box<dyn BufRead + Send>> {
        Ok(Box::new(BufReader::new(File::open(path)?)))
    }
}

/// A sorted partition persisted by a [SpillStore].
///
/// Write-once, read-once. The file is deleted when the `SpillFile` is dropped, so a spill can not
/// outlive the sort that created it on any exit path.
#[derive(Debug)]
pub struct SpillFile {
    id: u64,
    path: TempPath,
    records: u64,
    bytes: u64,
}

impl SpillFile {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Delete the file now, reporting failures instead of ignoring them as drop does.
    pub fn delete(self) -> Result<()> {
        let path = self.path.to_path_buf();
        self.path.close().map_err(|source| SortError::Cleanup { path, source })
    }
}

/// Streams records into a new spill file.
pub struct SpillWriter {
    id: u64,
    // declared before `path` so the handle is closed before the file is removed
    writer: Box<dyn Write + Send>,
    path: TempPath,
    records: u64,
    bytes: u64,
}

impl SpillWriter {
    pub fn create(store: &dyn SpillStore, id: u64) -> Result<SpillWriter> {
        let (path, writer) = store.create(id).map_err(SortError::Spill)?;
        Ok(
            SpillWriter {
                id,
                writer,
                path,
                records: 0,
                bytes: 0,
            }
        )
    }

    /// Flush and seal the spill.
    pub fn into_spill(mut self) -> Result<SpillFile> {
        self.writer.flush().map_err(SortError::Spill)?;
        let SpillWriter { id, writer, path, records, bytes } = self;
        drop(writer);
        Ok(
            SpillFile {
                id,
                path,
                records,
                bytes,
            }
        )
    }
}

impl<R: Record> RecordSink<R> for SpillWriter {
    fn write_record(&mut self, record: &R) -> Result<()> {
        record.write_to(&mut *self.writer).map_err(SortError::Spill)?;
        self.records += 1;
        self.bytes += record.size_bytes() as u64;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush().map_err(SortError::Spill)
    }
}

/// Persist an already sorted partition as spill `id`.
pub fn write_spill<R: Record>(store: &dyn SpillStore, id: u64, records: &[R]) -> Result<SpillFile> {
    let mut writer = SpillWriter::create(store, id)?;
    for record in records {
        writer.write_record(record)?;
    }
    let spill = writer.into_spill()?;
    log::debug!(
        "Spilled partition {}: {} records, {} bytes, path: {}",
        spill.id(),
        spill.records(),
        spill.bytes(),
        spill.path().display()
    );
    Ok(spill)
}
