//! This crate implements an external merge sort: sorting record sequences far larger than the
//! memory available to the process.
//!
//! The input is cut into partitions whose estimated in-memory size fits the memory budget. Each
//! partition is sorted in memory, optionally on a pool of worker threads, and written to a spill
//! file. The spill files are then merged with a k-way merge into the sink. When the spill files
//! outnumber the configured budget they are merged in several passes.
//!
//! Any type implementing [Record](record::Record) can be sorted with a caller supplied
//! [Comparator](compare::Comparator). Text files composed of line records, that is lines made of
//! fields separated by a delimiter, such as CSV or TSV, are sorted with
//! [ExternalSort::sort_files](sort::ExternalSort::sort_files) using the configured
//! [Field](field::Field) keys.
//!
//! The sort is stable: records that compare equal leave in the order they arrived. Spill files
//! never outlive the call that created them, on success, failure or cancellation.
//!
//! # Examples
//! ```
//! use std::path::{Path, PathBuf};
//! use text_spill_sort::field::Field;
//! use text_spill_sort::field_type::FieldType;
//! use text_spill_sort::sort::ExternalSort;
//!
//! // sort a TSV file by its second column as an integer, then by the first column
//! fn sort_records(input: PathBuf, output: &Path, tmp: PathBuf) -> Result<(), anyhow::Error> {
//!     let mut external_sort = ExternalSort::new();
//!
//!     // number of partitions sorted concurrently, zero uses all available cores
//!     external_sort.with_tasks(2);
//!
//!     // directory for spill files. The default is std::env::temp_dir(), for large inputs use
//!     // a dedicated directory, preferably on the same file system as the output.
//!     external_sort.with_tmp_dir(tmp);
//!
//!     external_sort.add_field(Field::new(2, FieldType::Integer));
//!     external_sort.add_field(Field::new(1, FieldType::String));
//!     external_sort.sort_files(&[input], output)?;
//!     Ok(())
//! }
//! ```
//!

pub(crate) mod config;
pub(crate) mod key;
pub(crate) mod line_source;
pub(crate) mod sort_command;

pub mod cancel;
pub mod chunk_sorter;
pub mod compare;
pub mod cursor;
pub mod error;
pub mod estimator;
pub mod field;
pub mod field_type;
pub mod merger;
pub mod order;
pub mod record;
pub mod sort;
pub mod spill;

pub use cancel::CancellationToken;
pub use compare::{comparator, natural_order, Comparator, LineComparator};
pub use error::{Result, SortError};
pub use record::{Record, RecordSink, RecordWriter};
pub use sort::{ExternalSort, SortSummary};
pub use spill::{SpillStore, TempDirStore};
