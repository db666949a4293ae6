use std::cmp::max;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use regex::Regex;
use rlimit::{getrlimit, setrlimit, Resource};
use tempfile::Builder;

use crate::cancel::CancellationToken;
use crate::chunk_sorter::{ChunkSorter, Partitions};
use crate::compare::{Comparator, LineComparator};
use crate::config::Config;
use crate::cursor::{MemoryCursor, RecordCursor, StreamCursor};
use crate::error::{Result, SortError};
use crate::estimator::{available_memory, estimate_block_size, in_flight_partitions, validate_memory_overhead, DEFAULT_MEMORY_OVERHEAD};
use crate::field::Field;
use crate::line_source::{total_size, LineSource};
use crate::merger::Merger;
use crate::order::Order;
use crate::record::{Record, RecordSink, RecordWriter};
use crate::spill::{SpillFile, SpillStore, SpillWriter, TempDirStore};

/// Outcome of a completed sort.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SortSummary {
    records: u64,
    spill_files: usize,
    merge_passes: usize,
}

impl SortSummary {
    /// Records written to the sink.
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Spill files created, intermediate merge results included.
    pub fn spill_files(&self) -> usize {
        self.spill_files
    }

    /// Merge passes over the data, the final one included.
    pub fn merge_passes(&self) -> usize {
        self.merge_passes
    }
}

/// Raised NOFILE soft limit, restored when dropped.
struct OpenFilesLimit {
    restore: Option<(u64, u64)>,
}

impl OpenFilesLimit {
    fn raise(files: usize) -> OpenFilesLimit {
        let (current_soft, current_hard) = match getrlimit(Resource::NOFILE) {
            Ok(limits) => limits,
            Err(e) => {
                log::warn!("Failed to get rlimit NOFILE: {}", e);
                return OpenFilesLimit { restore: None };
            }
        };
        log::info!("Current rlimit NOFILE, soft: {}, hard: {}", current_soft, current_hard);
        let new_soft = max((files + 256) as u64, current_soft).min(current_hard);
        if new_soft == current_soft {
            return OpenFilesLimit { restore: None };
        }
        log::info!("Set new rlimit NOFILE, soft: {}, hard: {}", new_soft, current_hard);
        match setrlimit(Resource::NOFILE, new_soft, current_hard) {
            Ok(()) => OpenFilesLimit { restore: Some((current_soft, current_hard)) },
            Err(e) => {
                log::warn!("Failed to set rlimit NOFILE, soft: {}, hard: {}: {}", new_soft, current_hard, e);
                OpenFilesLimit { restore: None }
            }
        }
    }
}

impl Drop for OpenFilesLimit {
    fn drop(&mut self) {
        if let Some((soft, hard)) = self.restore {
            log::info!("Restore rlimit NOFILE, soft: {}, hard: {}", soft, hard);
            if let Err(e) = setrlimit(Resource::NOFILE, soft, hard) {
                log::warn!("Failed to restore rlimit NOFILE: {}", e);
            }
        }
    }
}

/// External merge sort with bounded memory.
///
/// The input is cut into partitions sized from the input size, the spill file budget and the
/// available memory. Every partition is sorted in memory and spilled to a temporary file, then
/// the spill files are merged with a k-way merge. When there are more spill files than
/// `max_spill_files`, groups of them are merged into intermediate spill files first.
///
/// Temporary files never outlive the call that created them, whether it succeeds, fails or is
/// cancelled.
///
/// # Examples
/// ```
/// use text_spill_sort::compare::natural_order;
/// use text_spill_sort::sort::ExternalSort;
///
/// fn sort_numbers(input: Vec<u64>) -> Result<Vec<u64>, anyhow::Error> {
///     let mut external_sort = ExternalSort::new();
///     external_sort.with_max_spill_files(16);
///     external_sort.with_available_memory_bytes(64 * 1024 * 1024);
///
///     let mut sorted = Vec::new();
///     external_sort.sort(input.into_iter().map(Ok), natural_order(), &mut sorted)?;
///     Ok(sorted)
/// }
/// assert_eq!(sort_numbers(vec![3, 1, 2]).unwrap(), vec![1, 2, 3]);
/// ```
pub struct ExternalSort {
    tmp: PathBuf,
    tasks: usize,
    max_spill_files: usize,
    available_memory_bytes: Option<u64>,
    memory_overhead: f64,
    input_size_hint: Option<u64>,
    in_memory_fast_path: bool,
    distinct: bool,
    cancellation: CancellationToken,
    spill_store: Option<Arc<dyn SpillStore>>,
    field_separator: char,
    ignore_empty: bool,
    ignore_lines: Option<Regex>,
    fields: Vec<Field>,
    order: Order,
}

impl Default for ExternalSort {
    fn default() -> Self {
        ExternalSort::new()
    }
}

impl ExternalSort {
    /// Create a default sort definition.
    ///
    /// * spill files go to std::env::temp_dir()
    /// * one task, partitions are sorted on the calling thread
    /// * at most 1024 spill files are merged at once
    /// * available memory is queried from the operating system
    /// * memory overhead is [DEFAULT_MEMORY_OVERHEAD]
    /// * every partition is spilled, even when the input fits a single one
    /// * duplicates are kept
    /// * for text files: TAB separated fields, the complete line is the key, ascending order, no
    ///   lines ignored
    pub fn new() -> ExternalSort {
        ExternalSort {
            tmp: std::env::temp_dir(),
            tasks: 1,
            max_spill_files: 1024,
            available_memory_bytes: None,
            memory_overhead: DEFAULT_MEMORY_OVERHEAD,
            input_size_hint: None,
            in_memory_fast_path: false,
            distinct: false,
            cancellation: CancellationToken::default(),
            spill_store: None,
            field_separator: '\t',
            ignore_empty: false,
            ignore_lines: None,
            fields: vec![],
            order: Order::Asc,
        }
    }

    /// Set directory for spill files. By default use std::env::temp_dir()
    /// For large inputs use a dedicated directory, preferably on the same file system as the
    /// output.
    pub fn with_tmp_dir(&mut self, tmp: PathBuf) {
        self.tmp = tmp;
    }

    /// Set the number of partitions sorted concurrently. Zero uses all system cores.
    pub fn with_tasks(&mut self, tasks: usize) {
        self.tasks = tasks;
    }

    /// Desired upper bound on spill files, and the fan-in of each merge pass. The default is 1024.
    pub fn with_max_spill_files(&mut self, max_spill_files: usize) {
        self.max_spill_files = max_spill_files;
    }

    /// Memory the sort may use. By default the memory currently available to the system.
    pub fn with_available_memory_bytes(&mut self, available_memory_bytes: u64) {
        self.available_memory_bytes = Some(available_memory_bytes);
    }

    /// In-memory bytes assumed per serialized byte of a record.
    pub fn with_memory_overhead(&mut self, memory_overhead: f64) {
        self.memory_overhead = memory_overhead;
    }

    /// Serialized size of the input passed to [sort](ExternalSort::sort), used to size
    /// partitions. Without it the partition size is half of the available memory, split between
    /// the partitions in flight when sorting in parallel.
    pub fn with_input_size_hint(&mut self, input_size_hint: u64) {
        self.input_size_hint = Some(input_size_hint);
    }

    /// Skip spilling when the whole input fits in a single partition.
    pub fn with_in_memory_fast_path(&mut self, in_memory_fast_path: bool) {
        self.in_memory_fast_path = in_memory_fast_path;
    }

    /// Write only the first of each group of records the comparator considers equal.
    pub fn with_distinct(&mut self, distinct: bool) {
        self.distinct = distinct;
    }

    pub fn with_cancellation(&mut self, cancellation: CancellationToken) {
        self.cancellation = cancellation;
    }

    /// Replace the temporary directory store. The temp directory setting is then ignored.
    pub fn with_spill_store(&mut self, spill_store: Arc<dyn SpillStore>) {
        self.spill_store = Some(spill_store);
    }

    /// Set the field separator. The default is '\t'
    pub fn with_field_separator(&mut self, field_separator: char) {
        self.field_separator = field_separator
    }

    /// Ignore empty and whitespace only lines. The default is false
    pub fn with_ignore_empty(&mut self) {
        self.ignore_empty = true;
    }

    /// Specify which lines to ignore. Each line matching the regex will be ignored and will not
    /// appear in the output.
    pub fn with_ignore_lines(&mut self, r: Regex) {
        self.ignore_lines = Some(r)
    }

    /// Add field specification. The default is to treat the complete line as a single String
    /// field in the record
    pub fn add_field(&mut self, field: Field) {
        self.fields.push(field);
    }

    /// Replace all fields with the `fields` value.
    pub fn with_fields(&mut self, fields: Vec<Field>) {
        self.fields = fields
    }

    /// Set [Order]
    pub fn with_order(&mut self, order: Order) {
        self.order = order
    }

    /// Sort `input` with `comparator` into `sink`.
    ///
    /// Records leave in comparator order; records that compare equal keep their input order.
    /// On failure or cancellation the sink keeps the records already written and every spill
    /// file is deleted.
    pub fn sort<R, I, S>(&self, input: I, comparator: Comparator<R>, sink: &mut S) -> Result<SortSummary>
    where
        R: Record + Clone + Send + 'static,
        I: IntoIterator<Item = std::io::Result<R>>,
        S: RecordSink<R> + ?Sized,
    {
        let config = self.create_config()?;
        let store = self.spill_store(&config);
        Self::internal_sort(&config, store, config.input_size_hint(), input, comparator, sink)
    }

    /// Sort the lines of `inputs` into `output`, keyed by the configured fields and order.
    ///
    /// The output is written beside `output` and renamed over it only after the sort succeeded.
    pub fn sort_files(&self, inputs: &[PathBuf], output: &Path) -> Result<SortSummary> {
        let config = self.create_config()?;
        let comparator = Self::line_comparator(&config)?;
        let store = self.spill_store(&config);
        let size = match config.input_size_hint() {
            Some(size) => size,
            None => total_size(inputs).map_err(SortError::Input)?,
        };
        log::info!("Start sorting {} files, {} bytes", inputs.len(), size);
        let lines = LineSource::new(inputs.to_vec(), config.ignore_empty(), config.ignore_lines().clone());
        let summary = Self::write_output(output, |sink| {
            Self::internal_sort(&config, store, Some(size), lines, comparator, sink)
        })?;
        log::info!("Finish sorting, {} records written to {}", summary.records(), output.display());
        Ok(summary)
    }

    /// Merge already sorted text files into `output`. The inputs are left in place.
    ///
    /// Returns the number of lines written.
    pub fn merge_files(&self, inputs: &[PathBuf], output: &Path) -> Result<u64> {
        let config = self.create_config()?;
        let comparator = Self::line_comparator(&config)?;
        let store = self.spill_store(&config);
        let _limit = OpenFilesLimit::raise(config.fan_in());
        let merged = Self::write_output(output, |sink| {
            let cursors = if inputs.len() <= config.fan_in() {
                Self::open_inputs(inputs)?
            } else {
                let mut spills = Vec::new();
                for (id, group) in inputs.chunks(config.fan_in()).enumerate() {
                    spills.push(Self::merge_into_spill(&config, store.as_ref(), &comparator, Self::open_inputs(group)?, id as u64)?);
                }
                let (spills, _, _) = Self::reduce_spills(&config, store.as_ref(), &comparator, spills)?;
                Self::open_spills(store.as_ref(), spills)?
            };
            Self::merger(&config, comparator.clone()).merge(cursors, sink)
        })?;
        log::info!("Merged {} files, {} records written to {}", inputs.len(), merged, output.display());
        Ok(merged)
    }

    /// Check that every file in `inputs` is sorted by the configured fields and order.
    pub fn check_files(&self, inputs: &[PathBuf]) -> Result<bool> {
        let config = self.create_config()?;
        let comparator = Self::line_comparator(&config)?;
        for path in inputs {
            if !Self::internal_check(path, &config, &comparator)? {
                log::info!("{} is not sorted", path.display());
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn internal_check(path: &Path, config: &Config, comparator: &Comparator<String>) -> Result<bool> {
        let lines = LineSource::new(vec![path.to_path_buf()], config.ignore_empty(), config.ignore_lines().clone());
        let mut previous: Option<String> = None;
        for line in lines {
            config.cancellation().check()?;
            let line = line.map_err(SortError::Input)?;
            if let Some(previous) = &previous {
                if comparator(previous, &line).is_gt() {
                    return Ok(false);
                }
            }
            previous = Some(line);
        }
        Ok(true)
    }

    fn create_config(&self) -> Result<Config> {
        if self.max_spill_files == 0 {
            return Err(SortError::config("max spill files must be at least 1"));
        }
        validate_memory_overhead(self.memory_overhead)?;
        let available_memory_bytes = match self.available_memory_bytes {
            Some(0) => return Err(SortError::config("available memory must be at least 1 byte")),
            Some(bytes) => bytes,
            None => available_memory().max(1),
        };
        if self.spill_store.is_none() {
            if !self.tmp.is_dir() {
                return Err(SortError::config(format!("temp directory {} is not a directory", self.tmp.display())));
            }
            std::fs::read_dir(&self.tmp).map_err(|e| {
                SortError::config(format!("temp directory {} is not readable: {}", self.tmp.display(), e))
            })?;
        }

        let tasks = if self.tasks == 0 {
            num_cpus::get()
        } else {
            self.tasks
        };

        Ok(
            Config::new(
                self.tmp.clone(),
                "spill-".to_string(),
                ".run".to_string(),
                tasks,
                self.max_spill_files,
                available_memory_bytes,
                self.memory_overhead,
                self.input_size_hint,
                self.in_memory_fast_path,
                self.distinct,
                self.cancellation.clone(),
                self.field_separator,
                self.ignore_empty,
                self.ignore_lines.clone(),
                self.fields.clone(),
                self.order,
            )
        )
    }

    fn spill_store(&self, config: &Config) -> Arc<dyn SpillStore> {
        match &self.spill_store {
            Some(store) => store.clone(),
            None => Arc::new(
                TempDirStore::new(config.tmp().clone())
                    .with_prefix(config.tmp_prefix().clone())
                    .with_suffix(config.tmp_suffix().clone())
            ),
        }
    }

    fn line_comparator(config: &Config) -> Result<Comparator<String>> {
        Ok(
            LineComparator::new(config.fields().clone(), config.field_separator(), config.order())?
                .into_comparator()
        )
    }

    fn merger<R: Clone>(config: &Config, comparator: Comparator<R>) -> Merger<R> {
        Merger::new(comparator)
            .with_cancellation(config.cancellation().clone())
            .with_distinct(config.distinct())
    }

    fn internal_sort<R, I, S>(
        config: &Config,
        store: Arc<dyn SpillStore>,
        input_size: Option<u64>,
        input: I,
        comparator: Comparator<R>,
        sink: &mut S,
    ) -> Result<SortSummary>
    where
        R: Record + Clone + Send + 'static,
        I: IntoIterator<Item = std::io::Result<R>>,
        S: RecordSink<R> + ?Sized,
    {
        // every partition in flight on the sorting pool shares the memory budget
        let in_flight = in_flight_partitions(config.tasks());
        let block_size = estimate_block_size(
            input_size.unwrap_or(0).max(1),
            config.max_spill_files(),
            (config.available_memory_bytes() / in_flight).max(1),
            config.memory_overhead(),
        )?;
        log::info!(
            "Start sort, thread: {}, block size: {} bytes, tasks: {}",
            thread::current().name().unwrap_or("unnamed"),
            block_size,
            config.tasks()
        );

        let partitions = ChunkSorter::new(comparator.clone(), store.clone(), block_size)
            .with_memory_overhead(config.memory_overhead())
            .with_tasks(config.tasks())
            .with_in_memory_fast_path(config.in_memory_fast_path())
            .with_cancellation(config.cancellation().clone())
            .sort_in_partitions(input)?;

        let summary = match partitions {
            Partitions::InMemory(records) => {
                let cursors = vec![Box::new(MemoryCursor::new(records)) as Box<dyn RecordCursor<R>>];
                let records = Self::merger(config, comparator).merge(cursors, sink)?;
                SortSummary {
                    records,
                    spill_files: 0,
                    merge_passes: 1,
                }
            }
            Partitions::Spilled(spills) => {
                let spilled = spills.len();
                let _limit = OpenFilesLimit::raise(config.fan_in());
                let (spills, passes, intermediate) = Self::reduce_spills(config, store.as_ref(), &comparator, spills)?;
                let cursors = Self::open_spills(store.as_ref(), spills)?;
                let records = Self::merger(config, comparator).merge(cursors, sink)?;
                SortSummary {
                    records,
                    spill_files: spilled + intermediate,
                    merge_passes: passes + 1,
                }
            }
        };
        log::info!(
            "Finish sort, records: {}, spill files: {}, merge passes: {}",
            summary.records,
            summary.spill_files,
            summary.merge_passes
        );
        Ok(summary)
    }

    // merges groups of fan-in runs until the final merge can take them all at once,
    // returns the remaining runs, the passes made and the intermediate spills created
    fn reduce_spills<R>(
        config: &Config,
        store: &dyn SpillStore,
        comparator: &Comparator<R>,
        spills: Vec<SpillFile>,
    ) -> Result<(Vec<SpillFile>, usize, usize)>
    where
        R: Record + Clone + 'static,
    {
        let fan_in = config.fan_in();
        let mut next_id = spills.iter().map(|spill| spill.id() + 1).max().unwrap_or(0);
        let mut spills = spills;
        let mut passes = 0;
        let mut created = 0;
        while spills.len() > fan_in {
            passes += 1;
            log::info!("Intermediate merge pass {}, runs: {}, fan-in: {}", passes, spills.len(), fan_in);
            let mut merged = Vec::with_capacity(spills.len() / fan_in + 1);
            let mut remaining = spills.into_iter().peekable();
            while remaining.peek().is_some() {
                let mut group: Vec<SpillFile> = remaining.by_ref().take(fan_in).collect();
                if group.len() == 1 {
                    merged.append(&mut group);
                    continue;
                }
                let cursors = Self::open_spills(store, group)?;
                merged.push(Self::merge_into_spill(config, store, comparator, cursors, next_id)?);
                next_id += 1;
                created += 1;
            }
            spills = merged;
        }
        Ok((spills, passes, created))
    }

    fn merge_into_spill<R: Record + Clone>(
        config: &Config,
        store: &dyn SpillStore,
        comparator: &Comparator<R>,
        cursors: Vec<Box<dyn RecordCursor<R>>>,
        id: u64,
    ) -> Result<SpillFile> {
        let mut writer = SpillWriter::create(store, id)?;
        Merger::new(comparator.clone())
            .with_cancellation(config.cancellation().clone())
            .with_log_level(log::Level::Debug)
            .merge(cursors, &mut writer)?;
        writer.into_spill()
    }

    fn open_spills<R: Record + 'static>(store: &dyn SpillStore, spills: Vec<SpillFile>) -> Result<Vec<Box<dyn RecordCursor<R>>>> {
        let mut cursors: Vec<Box<dyn RecordCursor<R>>> = Vec::with_capacity(spills.len());
        for spill in spills {
            cursors.push(Box::new(StreamCursor::<R>::from_spill(store, spill)?));
        }
        Ok(cursors)
    }

    fn open_inputs(paths: &[PathBuf]) -> Result<Vec<Box<dyn RecordCursor<String>>>> {
        let mut cursors: Vec<Box<dyn RecordCursor<String>>> = Vec::with_capacity(paths.len());
        for path in paths {
            let file = File::open(path).map_err(|source| SortError::MergeRead { path: path.clone(), source })?;
            cursors.push(Box::new(StreamCursor::<String>::from_reader(path.clone(), Box::new(BufReader::new(file)))?));
        }
        Ok(cursors)
    }

    // the temp output is deleted on drop unless persisted
    fn write_output<T, F>(output: &Path, f: F) -> Result<T>
    where
        F: FnOnce(&mut RecordWriter<&mut File>) -> Result<T>,
    {
        let dir = match output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = Builder::new()
            .prefix(".spill-sort-")
            .suffix(".out")
            .tempfile_in(dir)
            .map_err(SortError::Output)?;
        let result = {
            let mut writer = RecordWriter::new(tmp.as_file_mut());
            f(&mut writer)?
        };
        tmp.persist(output).map_err(|e| SortError::Output(e.error))?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::Arc;

    use crate::compare::natural_order;
    use crate::error::SortError;
    use crate::sort::ExternalSort;
    use crate::spill::TempDirStore;

    #[test]
    fn test_invalid_config_is_rejected() -> Result<(), anyhow::Error> {
        let mut external_sort = ExternalSort::new();
        external_sort.with_max_spill_files(0);
        let mut sink: Vec<u64> = Vec::new();
        let result = external_sort.sort(vec![Ok(1u64)], natural_order(), &mut sink);
        assert!(matches!(result, Err(SortError::Config(_))));

        let mut external_sort = ExternalSort::new();
        external_sort.with_available_memory_bytes(0);
        assert!(matches!(external_sort.sort(vec![Ok(1u64)], natural_order(), &mut sink), Err(SortError::Config(_))));

        let mut external_sort = ExternalSort::new();
        external_sort.with_memory_overhead(f64::NAN);
        assert!(matches!(external_sort.sort(vec![Ok(1u64)], natural_order(), &mut sink), Err(SortError::Config(_))));

        let mut external_sort = ExternalSort::new();
        external_sort.with_tmp_dir("/no/such/dir".into());
        assert!(matches!(external_sort.sort(vec![Ok(1u64)], natural_order(), &mut sink), Err(SortError::Config(_))));
        assert!(sink.is_empty());
        Ok(())
    }

    #[test]
    fn test_custom_store_ignores_tmp_dir() -> Result<(), anyhow::Error> {
        let dir = tempfile::tempdir()?;
        let mut external_sort = ExternalSort::new();
        external_sort.with_tmp_dir("/no/such/dir".into());
        external_sort.with_spill_store(Arc::new(TempDirStore::new(dir.path().to_path_buf())));
        external_sort.with_available_memory_bytes(1024);
        let mut sink = Vec::new();
        external_sort.sort(vec![Ok(2u64), Ok(1)], natural_order(), &mut sink)?;
        assert_eq!(sink, vec![1, 2]);
        assert_eq!(fs::read_dir(dir.path())?.count(), 0);
        Ok(())
    }

    #[test]
    fn test_cascade_reduces_to_fan_in() -> Result<(), anyhow::Error> {
        let dir = tempfile::tempdir()?;
        let mut external_sort = ExternalSort::new();
        external_sort.with_tmp_dir(dir.path().to_path_buf());
        // 8 byte records at overhead 1 against a 16 byte block: two records per partition
        external_sort.with_max_spill_files(2);
        external_sort.with_available_memory_bytes(32);
        external_sort.with_memory_overhead(1.0);
        external_sort.with_input_size_hint(32);

        let input: Vec<u64> = (0..20).rev().collect();
        let mut sink = Vec::new();
        let summary = external_sort.sort(input.into_iter().map(Ok), natural_order(), &mut sink)?;
        assert_eq!(sink, (0..20).collect::<Vec<u64>>());
        assert_eq!(summary.records(), 20);
        // 10 partitions, then 5 + 2 + 1 intermediate runs
        assert_eq!(summary.spill_files(), 18);
        assert_eq!(summary.merge_passes(), 4);
        assert_eq!(fs::read_dir(dir.path())?.count(), 0);
        Ok(())
    }
}
