use std::fs;
use std::fs::File;
use std::io;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use data_encoding::HEXLOWER;
use rand::Rng;
use tempfile::TempPath;

use text_spill_sort::spill::{SpillStore, TempDirStore};

#[allow(dead_code)]
pub fn setup() -> Result<tempfile::TempDir, anyhow::Error> {
    let results_dir_path = PathBuf::from("./target/results/");
    if !results_dir_path.exists() {
        fs::create_dir_all(&results_dir_path)?;
    }
    Ok(tempfile::tempdir_in(results_dir_path)?)
}

#[allow(dead_code)]
pub fn read_lines(path: &Path) -> Result<Vec<String>, anyhow::Error> {
    let reader = BufReader::new(File::open(path)?);
    let lines = reader.lines().collect::<Result<Vec<String>, _>>()?;
    Ok(lines)
}

#[allow(dead_code)]
pub fn write_lines(path: &Path, lines: &[String]) -> Result<(), anyhow::Error> {
    let mut writer = BufWriter::new(File::create(path)?);
    for line in lines {
        writeln!(writer, "{}", line)?;
    }
    writer.flush()?;
    Ok(())
}

#[allow(dead_code)]
pub fn temp_file_name(dir: &Path) -> PathBuf {
    let mut result = dir.to_path_buf();
    let name = HEXLOWER.encode(&rand::random::<[u8; 16]>());
    result.push(name);
    result
}

#[allow(dead_code)]
pub fn count_files(dir: &Path) -> Result<usize, anyhow::Error> {
    Ok(fs::read_dir(dir)?.count())
}

/// Lines of `key\tvalue` with random integer keys in `0..keys` and a unique value.
#[allow(dead_code)]
pub fn random_records(count: usize, keys: i64) -> Vec<String> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|i| format!("{}\t{}", rng.gen_range(0..keys), HEXLOWER.encode(&(i as u64).to_be_bytes())))
        .collect()
}

struct FailingWriter;

impl Write for FailingWriter {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::Other, "injected spill write failure"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::Other, "injected spill flush failure"))
    }
}

/// Spill store whose writer for spill `fail_id` fails. The file is still created.
#[allow(dead_code)]
pub struct FailingWriteStore {
    inner: TempDirStore,
    fail_id: u64,
}

#[allow(dead_code)]
impl FailingWriteStore {
    pub fn new(dir: &Path, fail_id: u64) -> FailingWriteStore {
        FailingWriteStore {
            inner: TempDirStore::new(dir.to_path_buf()),
            fail_id,
        }
    }
}

impl SpillStore for FailingWriteStore {
    fn create(&self, id: u64) -> io::Result<(TempPath, Box<dyn Write + Send>)> {
        let (path, writer) = self.inner.create(id)?;
        if id == self.fail_id {
            drop(writer);
            Ok((path, Box::new(FailingWriter)))
        } else {
            Ok((path, writer))
        }
    }

    fn open(&self, path: &Path) -> io::Result<Box<dyn BufRead + Send>> {
        self.inner.open(path)
    }
}

struct TruncatedRead<R> {
    inner: R,
    remaining: usize,
}

impl<R: Read> Read for TruncatedRead<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 {
            return Err(io::Error::new(io::ErrorKind::Other, "injected spill read failure"));
        }
        let limit = buf.len().min(self.remaining);
        let n = self.inner.read(&mut buf[..limit])?;
        self.remaining -= n;
        Ok(n)
    }
}

/// Spill store whose `fail_open`-th opened spill fails after `bytes` bytes were read.
#[allow(dead_code)]
pub struct FailingReadStore {
    inner: TempDirStore,
    opened: AtomicUsize,
    fail_open: usize,
    bytes: usize,
}

#[allow(dead_code)]
impl FailingReadStore {
    pub fn new(dir: &Path, fail_open: usize, bytes: usize) -> FailingReadStore {
        FailingReadStore {
            inner: TempDirStore::new(dir.to_path_buf()),
            opened: AtomicUsize::new(0),
            fail_open,
            bytes,
        }
    }
}

impl SpillStore for FailingReadStore {
    fn create(&self, id: u64) -> io::Result<(TempPath, Box<dyn Write + Send>)> {
        self.inner.create(id)
    }

    fn open(&self, path: &Path) -> io::Result<Box<dyn BufRead + Send>> {
        if self.opened.fetch_add(1, Ordering::SeqCst) == self.fail_open {
            let reader = TruncatedRead {
                inner: File::open(path)?,
                remaining: self.bytes,
            };
            Ok(Box::new(BufReader::new(reader)))
        } else {
            self.inner.open(path)
        }
    }
}
