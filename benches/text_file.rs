use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::fs;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use anyhow::{anyhow, Context, Error};
use benchmark_rs::benchmarks::Benchmarks;
use benchmark_rs::stopwatch::StopWatch;
use data_encoding::HEXLOWER;
use rand::Rng;
use simple_logger::SimpleLogger;

use text_spill_sort::field::Field;
use text_spill_sort::field_type::FieldType;
use text_spill_sort::sort::ExternalSort;

use tikv_jemallocator::Jemalloc;
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

#[derive(Clone)]
pub struct BenchmarkConfig {
    files: BTreeMap<usize, PathBuf>,
    bench_results_dir: PathBuf,
    bench_tmp_dir: PathBuf,
    tasks: usize,
    max_spill_files: usize,
    available_memory_bytes: u64,
    description: String,
}

impl BenchmarkConfig {
    pub fn new(
        files: BTreeMap<usize, PathBuf>,
        bench_results_dir: PathBuf,
        bench_tmp_dir: PathBuf,
        tasks: usize,
        max_spill_files: usize,
        available_memory_bytes: u64,
        description: &str,
    ) -> BenchmarkConfig {
        BenchmarkConfig {
            files,
            bench_results_dir,
            bench_tmp_dir,
            tasks,
            max_spill_files,
            available_memory_bytes,
            description: description.to_string(),
        }
    }

    pub fn get_input_path(&self, key: usize) -> Result<PathBuf, Error> {
        self.files.get(&key).cloned().ok_or_else(|| anyhow!("no input for {} lines", key))
    }
}

impl Display for BenchmarkConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "tasks: {}, max spill files: {}, available memory: {}, description: {}",
                 self.tasks,
                 self.max_spill_files,
                 self.available_memory_bytes,
                 self.description,
        )
    }
}

fn temp_file_name(dir: &PathBuf) -> PathBuf {
    let mut result = PathBuf::from(dir);
    let name = HEXLOWER.encode(&rand::random::<[u8; 16]>());
    result.push(name);
    result
}

fn setup(bench_input_dir: &PathBuf, bench_results_dir: &PathBuf, bench_tmp_dir: &PathBuf) -> Result<(), Error> {
    if bench_results_dir.exists() {
        fs::remove_dir_all(bench_results_dir).with_context(|| anyhow!("{}", bench_results_dir.to_string_lossy()))?;
    }
    for dir in [bench_input_dir, bench_results_dir, bench_tmp_dir] {
        fs::create_dir_all(dir).with_context(|| anyhow!("{}", dir.to_string_lossy()))?;
    }
    Ok(())
}

// `id<TAB>name` lines with random ids, one file per size
fn create_input_files(sizes: &[usize], base_path: &PathBuf) -> Result<BTreeMap<usize, PathBuf>, Error> {
    let mut files: BTreeMap<usize, PathBuf> = BTreeMap::new();
    let mut rng = rand::thread_rng();
    for &number_of_lines in sizes {
        let path = base_path.join(PathBuf::from(number_of_lines.to_string()));
        if !path.exists() {
            let mut writer = BufWriter::new(
                File::create(&path)
                    .with_context(|| anyhow!("path: {}", path.to_string_lossy()))?);
            for i in 0..number_of_lines {
                writeln!(writer, "{}\tname-{}", rng.gen_range(0..i64::MAX), i)?;
            }
            writer.flush()?;
        }
        files.insert(number_of_lines, path);
    }
    Ok(files)
}

fn sort(stop_watch: &mut StopWatch, config: BenchmarkConfig, work: usize) -> Result<(), Error> {
    stop_watch.pause();
    let input_path = config.get_input_path(work)?;
    let output_path = temp_file_name(&config.bench_results_dir);
    log::info!("Start sorting {}", input_path.to_string_lossy());
    stop_watch.resume();
    let mut external_sort = ExternalSort::new();
    external_sort.with_tmp_dir(config.bench_tmp_dir.clone());
    external_sort.with_tasks(config.tasks);
    external_sort.with_max_spill_files(config.max_spill_files);
    external_sort.with_available_memory_bytes(config.available_memory_bytes);
    external_sort.add_field(Field::new(1, FieldType::Integer));
    external_sort.sort_files(&[input_path.clone()], &output_path)?;
    stop_watch.pause();
    log::info!("Finish sorting {}", input_path.to_string_lossy());
    fs::remove_file(&output_path)
        .with_context(|| anyhow!("{}", output_path.to_string_lossy()))?;
    Ok(())
}

#[test]
fn text_spill_sort_bench() -> Result<(), Error> {
    SimpleLogger::new().init()?;
    log::info!("Started text_spill_sort_bench.");

    let bench_input_dir = PathBuf::from("./target/benchmarks/input");
    let bench_results_dir = PathBuf::from("./target/benchmarks/results");
    let bench_tmp_dir = PathBuf::from("./target/benchmarks/results/tmp");
    setup(&bench_input_dir, &bench_results_dir, &bench_tmp_dir)?;

    let files = create_input_files(&[100_000, 200_000, 400_000], &bench_input_dir)?;
    let mut benchmarks = Benchmarks::new("text-spill-sort");

    for tasks in [1, 2, 4] {
        for (max_spill_files, available_memory_bytes, description) in [
            (64, 1, "many spills"),
            (1024, 64_000_000, "memory bound"),
        ] {
            benchmarks.add(
                &format!("{}-tasks-{}-spills", tasks, max_spill_files),
                sort,
                BenchmarkConfig::new(
                    files.clone(),
                    bench_results_dir.clone(),
                    bench_tmp_dir.clone(),
                    tasks,
                    max_spill_files,
                    available_memory_bytes,
                    description,
                ),
                files.keys().cloned().collect(),
                3,
                0,
            )?;
        }
    }

    benchmarks.run()?;
    benchmarks.save_to_csv(PathBuf::from("./target/benchmarks/"), true, true)?;
    benchmarks.save_to_json(PathBuf::from("./target/benchmarks/"))?;

    log::info!("Finished text_spill_sort_bench.");
    Ok(())
}
