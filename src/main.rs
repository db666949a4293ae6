use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{anyhow, Context};
use clap::Parser;
use log::LevelFilter;
use regex::Regex;
use simple_logger::SimpleLogger;

use text_spill_sort::field::Field;
use text_spill_sort::field_type::FieldType;
use text_spill_sort::order::Order;
use text_spill_sort::sort::ExternalSort;

#[derive(Parser)]
#[command(name = "spill-sort")]
#[command(about = "Sort text files larger than memory")]
#[command(version)]
struct Args {
    #[arg(required = true, help = "Input files, read in order")]
    inputs: Vec<PathBuf>,

    #[arg(short, long, required_unless_present = "check", help = "Output file")]
    output: Option<PathBuf>,

    #[arg(long, help = "Directory for spill files, the system temp dir by default")]
    tmp_dir: Option<PathBuf>,

    #[arg(long, default_value_t = 1024, help = "Upper bound on spill files merged at once")]
    max_spill_files: usize,

    #[arg(long, help = "Memory budget in bytes, the available system memory by default")]
    available_memory_bytes: Option<u64>,

    #[arg(long, default_value_t = 2.0, help = "In-memory bytes assumed per input byte")]
    memory_overhead: f64,

    #[arg(long, default_value_t = 1, help = "Partitions sorted concurrently, 0 for all cores")]
    tasks: usize,

    #[arg(short, long = "key", value_parser = parse_key, help = "Sort key INDEX[:string|integer|number], 1 based, repeatable")]
    keys: Vec<Field>,

    #[arg(short = 't', long, default_value_t = '\t', help = "Field separator")]
    field_separator: char,

    #[arg(long, help = "Compare string keys ignoring case")]
    ignore_case: bool,

    #[arg(long, help = "Trim blanks around keys")]
    ignore_blanks: bool,

    #[arg(short, long, help = "Sort in descending order")]
    reverse: bool,

    #[arg(short, long, help = "Output only the first of equal lines")]
    unique: bool,

    #[arg(long, help = "Skip empty lines")]
    ignore_empty: bool,

    #[arg(long, help = "Skip lines matching the regex")]
    ignore_lines: Option<String>,

    #[arg(long, conflicts_with = "check", help = "Merge already sorted inputs")]
    merge: bool,

    #[arg(long, help = "Check that every input is sorted, exit status 1 when not")]
    check: bool,

    #[arg(short, long, action = clap::ArgAction::Count, help = "Verbose output, repeat for more")]
    verbose: u8,
}

fn parse_key(value: &str) -> Result<Field, String> {
    let (index, field_type) = match value.split_once(':') {
        Some((index, field_type)) => (index, FieldType::from_str(field_type).map_err(|e| e.to_string())?),
        None => (value, FieldType::String),
    };
    let index = index
        .parse::<usize>()
        .map_err(|e| format!("invalid key index {index}: {e}"))?;
    if index == 0 {
        return Err("key index is 1 based".to_string());
    }
    Ok(Field::new(index, field_type))
}

fn main() -> Result<(), anyhow::Error> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    SimpleLogger::new().with_level(level).init()?;

    let mut external_sort = ExternalSort::new();
    if let Some(tmp_dir) = args.tmp_dir {
        external_sort.with_tmp_dir(tmp_dir);
    }
    external_sort.with_max_spill_files(args.max_spill_files);
    if let Some(available_memory_bytes) = args.available_memory_bytes {
        external_sort.with_available_memory_bytes(available_memory_bytes);
    }
    external_sort.with_memory_overhead(args.memory_overhead);
    external_sort.with_tasks(args.tasks);
    external_sort.with_field_separator(args.field_separator);
    external_sort.with_distinct(args.unique);
    if args.ignore_empty {
        external_sort.with_ignore_empty();
    }
    if let Some(ignore_lines) = &args.ignore_lines {
        let r = Regex::new(ignore_lines).with_context(|| format!("ignore lines regex: {ignore_lines}"))?;
        external_sort.with_ignore_lines(r);
    }
    if args.reverse {
        external_sort.with_order(Order::Desc);
    }

    let mut keys = args.keys;
    if keys.is_empty() && (args.ignore_case || args.ignore_blanks) {
        keys.push(Field::new(0, FieldType::String));
    }
    external_sort.with_fields(
        keys.into_iter()
            .map(|field| field.with_ignore_case(args.ignore_case).with_ignore_blanks(args.ignore_blanks))
            .collect()
    );

    if args.check {
        if !external_sort.check_files(&args.inputs)? {
            std::process::exit(1);
        }
        return Ok(());
    }

    let output = args.output.ok_or_else(|| anyhow!("--output is required"))?;
    if args.merge {
        let merged = external_sort.merge_files(&args.inputs, &output)?;
        log::info!("Merged {} lines into {}", merged, output.display());
    } else {
        let summary = external_sort.sort_files(&args.inputs, &output)?;
        log::info!(
            "Sorted {} lines into {}, spill files: {}, merge passes: {}",
            summary.records(),
            output.display(),
            summary.spill_files(),
            summary.merge_passes()
        );
    }
    Ok(())
}
