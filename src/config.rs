use std::path::PathBuf;

use regex::Regex;

use crate::cancel::CancellationToken;
use crate::field::Field;
use crate::order::Order;

/// Validated settings of one sort call, resolved from [ExternalSort](crate::sort::ExternalSort).
#[derive(Clone)]
pub(crate) struct Config {
    tmp: PathBuf,
    tmp_prefix: String,
    tmp_suffix: String,
    tasks: usize,
    max_spill_files: usize,
    available_memory_bytes: u64,
    memory_overhead: f64,
    input_size_hint: Option<u64>,
    in_memory_fast_path: bool,
    distinct: bool,
    cancellation: CancellationToken,
    field_separator: char,
    ignore_empty: bool,
    ignore_lines: Option<Regex>,
    fields: Vec<Field>,
    order: Order,
}

impl Config {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        tmp: PathBuf,
        tmp_prefix: String,
        tmp_suffix: String,
        tasks: usize,
        max_spill_files: usize,
        available_memory_bytes: u64,
        memory_overhead: f64,
        input_size_hint: Option<u64>,
        in_memory_fast_path: bool,
        distinct: bool,
        cancellation: CancellationToken,
        field_separator: char,
        ignore_empty: bool,
        ignore_lines: Option<Regex>,
        fields: Vec<Field>,
        order: Order,
    ) -> Config {
        Config {
            tmp,
            tmp_prefix,
            tmp_suffix,
            tasks,
            max_spill_files,
            available_memory_bytes,
            memory_overhead,
            input_size_hint,
            in_memory_fast_path,
            distinct,
            cancellation,
            field_separator,
            ignore_empty,
            ignore_lines,
            fields,
            order,
        }
    }

    pub(crate) fn tmp(&self) -> &PathBuf {
        &self.tmp
    }

    pub(crate) fn tmp_prefix(&self) -> &String {
        &self.tmp_prefix
    }

    pub(crate) fn tmp_suffix(&self) -> &String {
        &self.tmp_suffix
    }

    pub(crate) fn tasks(&self) -> usize {
        self.tasks
    }

    pub(crate) fn max_spill_files(&self) -> usize {
        self.max_spill_files
    }

    /// Runs merged at once. A fan-in of one could never reduce the run count.
    pub(crate) fn fan_in(&self) -> usize {
        self.max_spill_files.max(2)
    }

    pub(crate) fn available_memory_bytes(&self) -> u64 {
        self.available_memory_bytes
    }

    pub(crate) fn memory_overhead(&self) -> f64 {
        self.memory_overhead
    }

    pub(crate) fn input_size_hint(&self) -> Option<u64> {
        self.input_size_hint
    }

    pub(crate) fn in_memory_fast_path(&self) -> bool {
        self.in_memory_fast_path
    }

    pub(crate) fn distinct(&self) -> bool {
        self.distinct
    }

    pub(crate) fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub(crate) fn field_separator(&self) -> char {
        self.field_separator
    }

    pub(crate) fn ignore_empty(&self) -> bool {
        self.ignore_empty
    }

    pub(crate) fn ignore_lines(&self) -> &Option<Regex> {
        &self.ignore_lines
    }

    pub(crate) fn fields(&self) -> &Vec<Field> {
        &self.fields
    }

    pub(crate) fn order(&self) -> Order {
        self.order
    }
}
