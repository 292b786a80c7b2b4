//! External line sorter.

use log;
use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::io;
use std::io::prelude::*;
use std::path::Path;

use rayon::slice::ParallelSliceMut;

use crate::buffer::RunBuffer;
use crate::compare::{LineComparator, SortOptions};
use crate::merger::{merge_runs, merge_runs_kway, MergeStrategy, MergedRun};
use crate::run::{RunHandle, SpillStore};

/// Sorting error.
#[derive(Debug)]
pub enum SortError {
    /// Input stream open or read error.
    Input(io::Error),
    /// Temporary directory creation error.
    TempDir(io::Error),
    /// Temporary run file creation or writing error.
    TempStore(io::Error),
    /// Temporary run file reading error.
    MergeRead(io::Error),
    /// Output stream writing error.
    Output(io::Error),
    /// Workers thread pool initialization error.
    ThreadPoolBuildError(rayon::ThreadPoolBuildError),
}

impl Error for SortError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(match &self {
            SortError::Input(err) => err,
            SortError::TempDir(err) => err,
            SortError::TempStore(err) => err,
            SortError::MergeRead(err) => err,
            SortError::Output(err) => err,
            SortError::ThreadPoolBuildError(err) => err,
        })
    }
}

impl Display for SortError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            SortError::Input(err) => write!(f, "input data stream error: {}", err),
            SortError::TempDir(err) => write!(f, "temporary directory not created: {}", err),
            SortError::TempStore(err) => write!(f, "temporary file not written: {}", err),
            SortError::MergeRead(err) => write!(f, "temporary file reading failed: {}", err),
            SortError::Output(err) => write!(f, "output data stream error: {}", err),
            SortError::ThreadPoolBuildError(err) => write!(f, "thread pool initialization failed: {}", err),
        }
    }
}

/// External sorter builder. Provides methods for [`ExternalSorter`] initialization.
#[derive(Clone, Debug, Default)]
pub struct ExternalSorterBuilder {
    /// Line ordering options.
    options: SortOptions,
    /// Buffered lines memory limit in bytes.
    max_memory: Option<u64>,
    /// Merge phase strategy.
    merge_strategy: MergeStrategy,
    /// Number of threads to be used to sort data in parallel.
    threads_number: Option<usize>,
    /// Directory to be used to store temporary data.
    tmp_dir: Option<Box<Path>>,
    /// Run file read/write buffer size.
    rw_buf_size: Option<usize>,
}

impl ExternalSorterBuilder {
    /// Creates an instance of a builder with default parameters.
    pub fn new() -> Self {
        ExternalSorterBuilder::default()
    }

    /// Builds an [`ExternalSorter`] instance using provided configuration.
    pub fn build(self) -> Result<ExternalSorter, SortError> {
        ExternalSorter::new(
            self.options,
            self.max_memory,
            self.merge_strategy,
            self.threads_number,
            self.tmp_dir.as_deref(),
            self.rw_buf_size,
        )
    }

    /// Sets line ordering options.
    pub fn with_options(mut self, options: SortOptions) -> ExternalSorterBuilder {
        self.options = options;
        return self;
    }

    /// Sets buffered lines memory limit. Exceeding the limit spills sorted lines to a temporary file.
    pub fn with_max_memory(mut self, max_memory: u64) -> ExternalSorterBuilder {
        self.max_memory = Some(max_memory);
        return self;
    }

    /// Sets merge phase strategy.
    pub fn with_merge_strategy(mut self, merge_strategy: MergeStrategy) -> ExternalSorterBuilder {
        self.merge_strategy = merge_strategy;
        return self;
    }

    /// Sets number of threads to be used to sort data in parallel.
    pub fn with_threads_number(mut self, threads_number: usize) -> ExternalSorterBuilder {
        self.threads_number = Some(threads_number);
        return self;
    }

    /// Sets directory to be used to store temporary data.
    pub fn with_tmp_dir(mut self, path: &Path) -> ExternalSorterBuilder {
        self.tmp_dir = Some(path.into());
        return self;
    }

    /// Sets run file read/write buffer size.
    pub fn with_rw_buf_size(mut self, buf_size: usize) -> ExternalSorterBuilder {
        self.rw_buf_size = Some(buf_size);
        return self;
    }
}

/// Sorted lines stream returned by [`ExternalSorter::sort`].
pub enum SortedLines {
    /// All lines fit the memory limit and were sorted in memory.
    Memory(std::vec::IntoIter<String>),
    /// Lines were spilled to temporary files and are read back merged.
    Merged(MergedRun),
}

impl Iterator for SortedLines {
    type Item = Result<String, SortError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            SortedLines::Memory(lines) => lines.next().map(Ok),
            SortedLines::Merged(lines) => lines.next(),
        }
    }
}

/// External sorter.
pub struct ExternalSorter {
    /// Line comparator.
    comparator: LineComparator,
    /// Buffered lines memory limit in bytes.
    max_memory: Option<u64>,
    /// Merge phase strategy.
    merge_strategy: MergeStrategy,
    /// Sorting thread pool.
    thread_pool: rayon::ThreadPool,
    /// Directory to be used to store temporary data.
    tmp_dir: Option<Box<Path>>,
    /// Run file read/write buffer size.
    rw_buf_size: Option<usize>,
}

impl ExternalSorter {
    /// Creates a new external sorter instance.
    ///
    /// # Arguments
    /// * `options` - Line ordering options.
    /// * `max_memory` - Buffered lines memory limit in bytes. If the parameter is [`None`] lines are never
    ///   spilled to temporary files.
    /// * `merge_strategy` - Strategy used to merge spilled runs.
    /// * `threads_number` - Number of threads to be used to sort data in parallel. If the parameter is [`None`]
    ///   threads number will be selected based on available CPU core number.
    /// * `tmp_path` - Directory to be used to store temporary data. If paramater is [`None`] default OS temporary
    ///   directory will be used. The directory is only touched once the first run is spilled.
    /// * `rw_buf_size` - Run files read/write buffer size.
    pub fn new(
        options: SortOptions,
        max_memory: Option<u64>,
        merge_strategy: MergeStrategy,
        threads_number: Option<usize>,
        tmp_path: Option<&Path>,
        rw_buf_size: Option<usize>,
    ) -> Result<Self, SortError> {
        return Ok(ExternalSorter {
            comparator: LineComparator::new(&options),
            max_memory,
            merge_strategy,
            thread_pool: Self::init_thread_pool(threads_number)?,
            tmp_dir: tmp_path.map(Box::from),
            rw_buf_size,
        });
    }

    fn init_thread_pool(threads_number: Option<usize>) -> Result<rayon::ThreadPool, SortError> {
        let mut thread_pool_builder = rayon::ThreadPoolBuilder::new();

        if let Some(threads_number) = threads_number {
            log::info!("initializing thread-pool (threads: {})", threads_number);
            thread_pool_builder = thread_pool_builder.num_threads(threads_number);
        } else {
            log::info!("initializing thread-pool (threads: default)");
        }
        let thread_pool = thread_pool_builder
            .build()
            .map_err(SortError::ThreadPoolBuildError)?;

        return Ok(thread_pool);
    }

    /// Returns the comparator lines are ordered with.
    pub fn comparator(&self) -> &LineComparator {
        &self.comparator
    }

    /// Sorts lines from the input.
    /// The input is consumed completely before the sorted stream is returned.
    ///
    /// # Arguments
    /// * `input` - Input lines stream
    pub fn sort<I>(&self, input: I) -> Result<SortedLines, SortError>
    where
        I: IntoIterator<Item = io::Result<String>>,
    {
        let mut buffer = RunBuffer::new(self.max_memory);
        let mut runs: Vec<RunHandle> = Vec::new();
        // created on the first spill only
        let mut store: Option<SpillStore> = None;

        for line in input.into_iter() {
            buffer.push(line.map_err(SortError::Input)?);

            if buffer.is_full() {
                log::debug!("memory limit exceeded ({} bytes, {} lines)", buffer.mem_size(), buffer.len());
                if store.is_none() {
                    store = Some(SpillStore::new(self.tmp_dir.as_deref(), self.rw_buf_size)?);
                }
                if let Some(store) = &store {
                    runs.push(self.spill(store, buffer.take())?);
                }
            }
        }

        let store = match store {
            Some(store) => store,
            None => {
                log::debug!("no spills occurred, sorting {} lines in memory", buffer.len());
                self.sort_buffer(&mut buffer);
                return Ok(SortedLines::Memory(buffer.into_iter()));
            }
        };

        runs.push(self.spill(&store, buffer)?);
        log::debug!("external sort preparation done ({} runs)", runs.len());

        let merged = match self.merge_strategy {
            MergeStrategy::Pairwise => merge_runs(&store, &self.comparator, runs)?,
            MergeStrategy::KWay => merge_runs_kway(&store, &self.comparator, runs)?,
        };

        return Ok(SortedLines::Merged(merged));
    }

    /// Sorts lines from the input and writes them to the output, each followed by a newline.
    pub fn sort_to_writer<I, W>(&self, input: I, mut output: W) -> Result<(), SortError>
    where
        I: IntoIterator<Item = io::Result<String>>,
        W: Write,
    {
        for line in self.sort(input)? {
            let line = line?;
            output.write_all(line.as_bytes()).map_err(SortError::Output)?;
            output.write_all(b"\n").map_err(SortError::Output)?;
        }
        output.flush().map_err(SortError::Output)?;

        return Ok(());
    }

    fn sort_buffer(&self, buffer: &mut RunBuffer) {
        let comparator = &self.comparator;
        self.thread_pool.install(|| {
            buffer.par_sort_by(|a, b| comparator.compare(a, b));
        });
    }

    fn spill(&self, store: &SpillStore, mut buffer: RunBuffer) -> Result<RunHandle, SortError> {
        log::debug!("sorting run data ...");
        self.sort_buffer(&mut buffer);

        log::debug!("saving run data");
        store.materialize(buffer)
    }
}

#[cfg(test)]
mod test {
    use std::io;
    use std::path::Path;

    use rand::distributions::Alphanumeric;
    use rand::seq::SliceRandom;
    use rand::Rng;
    use rstest::*;

    use super::{ExternalSorter, ExternalSorterBuilder, SortError, SortedLines};
    use crate::compare::SortOptions;
    use crate::merger::MergeStrategy;

    fn options(ignore_leading_whitespace: bool, ignore_case: bool, reverse: bool) -> SortOptions {
        SortOptions {
            ignore_leading_whitespace,
            ignore_case,
            reverse,
        }
    }

    fn input(lines: &[String]) -> Vec<io::Result<String>> {
        lines.iter().cloned().map(Ok).collect()
    }

    fn run_sort(sorter: &ExternalSorter, lines: &[String]) -> Vec<String> {
        let result: Result<Vec<String>, SortError> = sorter.sort(input(lines)).unwrap().collect();
        result.unwrap()
    }

    fn sorter(options: SortOptions, max_memory: Option<u64>, merge_strategy: MergeStrategy) -> ExternalSorter {
        let mut builder = ExternalSorterBuilder::new()
            .with_options(options)
            .with_merge_strategy(merge_strategy)
            .with_threads_number(2)
            .with_tmp_dir(Path::new("./"));
        if let Some(max_memory) = max_memory {
            builder = builder.with_max_memory(max_memory);
        }
        builder.build().unwrap()
    }

    fn random_lines(count: usize) -> Vec<String> {
        let mut rng = rand::thread_rng();
        (0..count)
            .map(|_| {
                let indent = " ".repeat(rng.gen_range(0..3));
                let len = rng.gen_range(0..12);
                let body: String = (&mut rng).sample_iter(&Alphanumeric).take(len).map(char::from).collect();
                indent + &body
            })
            .collect()
    }

    fn strings(lines: &[&str]) -> Vec<String> {
        lines.iter().map(|line| line.to_string()).collect()
    }

    #[rstest]
    #[case(false)]
    #[case(true)]
    fn test_external_sorter(#[case] reversed: bool) {
        let input_sorted: Vec<String> = (0..100).map(|n| format!("{:03}", n)).collect();

        let mut input_shuffled = input_sorted.clone();
        input_shuffled.shuffle(&mut rand::thread_rng());

        let sorter = sorter(options(false, false, reversed), Some(16), MergeStrategy::Pairwise);
        let actual_result = run_sort(&sorter, &input_shuffled);

        let expected_result = if reversed {
            input_sorted.into_iter().rev().collect::<Vec<_>>()
        } else {
            input_sorted
        };

        assert_eq!(actual_result, expected_result)
    }

    #[rstest]
    #[case(options(false, false, true), &["b", "a", "c"], &["c", "b", "a"])]
    #[case(options(true, true, false), &[" B", "a", " A", "b"], &["a", " A", " B", "b"])]
    #[case(options(false, false, false), &["b", "B", "a", "A"], &["A", "B", "a", "b"])]
    #[case(options(true, false, false), &["  c", "b", " a"], &[" a", "b", "  c"])]
    #[case(options(false, true, true), &["a", "C", "b"], &["C", "b", "a"])]
    #[case(options(false, false, false), &[], &[])]
    #[case(options(false, false, false), &["b\r", "a\r", "c"], &["a\r", "b\r", "c"])]
    #[case(options(true, false, true), &[" a\r\r", "b", "a\r"], &["b", " a\r\r", "a\r"])]
    fn test_sort_options(
        #[case] options: SortOptions,
        #[case] lines: &[&str],
        #[case] expected: &[&str],
        #[values(None, Some(1))] max_memory: Option<u64>,
        #[values(MergeStrategy::Pairwise, MergeStrategy::KWay)] merge_strategy: MergeStrategy,
    ) {
        let sorter = sorter(options, max_memory, merge_strategy);
        assert_eq!(run_sort(&sorter, &strings(lines)), strings(expected));
    }

    #[rstest]
    #[case(MergeStrategy::Pairwise)]
    #[case(MergeStrategy::KWay)]
    fn test_spill_matches_in_memory(#[case] merge_strategy: MergeStrategy) {
        let lines = random_lines(10_000);

        for options in [options(false, false, false), options(true, true, false), options(true, true, true)] {
            let in_memory = sorter(options, None, merge_strategy);
            let spilling = sorter(options, Some(4096), merge_strategy);

            let expected = run_sort(&in_memory, &lines);
            let actual = run_sort(&spilling, &lines);

            assert_eq!(actual.len(), lines.len());
            assert_eq!(actual, expected);

            let comparator = in_memory.comparator();
            assert!(expected.windows(2).all(|pair| !comparator.is_before(&pair[1], &pair[0])));

            let mut permutation = actual.clone();
            let mut original = lines.clone();
            permutation.sort();
            original.sort();
            assert_eq!(permutation, original);
        }
    }

    #[rstest]
    fn test_idempotence() {
        let lines = random_lines(500);
        let sorter = sorter(options(true, true, false), Some(256), MergeStrategy::Pairwise);

        let once = run_sort(&sorter, &lines);
        let twice = run_sort(&sorter, &once);
        assert_eq!(once, twice);
    }

    #[rstest]
    fn test_tie_break_determinism() {
        let mut lines = strings(&["a", "A", " a", "b", " A", "B"].repeat(20));
        lines.shuffle(&mut rand::thread_rng());
        let sorter = sorter(options(true, true, false), Some(8), MergeStrategy::Pairwise);

        let first = run_sort(&sorter, &lines);
        let second = run_sort(&sorter, &lines);
        assert_eq!(first, second);
    }

    #[test]
    fn test_in_memory_without_limit() {
        let sorter = sorter(SortOptions::default(), None, MergeStrategy::Pairwise);
        let sorted = sorter.sort(input(&strings(&["b", "a"]))).unwrap();
        assert!(matches!(sorted, SortedLines::Memory(_)));
    }

    #[test]
    fn test_merged_with_limit() {
        let sorter = sorter(SortOptions::default(), Some(1), MergeStrategy::Pairwise);
        let sorted = sorter.sort(input(&strings(&["b", "a", "c"]))).unwrap();
        assert!(matches!(sorted, SortedLines::Merged(_)));
    }

    #[test]
    fn test_missing_tmp_dir_without_spill() {
        let tmp_dir = tempfile::tempdir_in("./").unwrap();
        let missing = tmp_dir.path().join("missing");

        let sorter = ExternalSorterBuilder::new().with_tmp_dir(&missing).build().unwrap();
        assert_eq!(run_sort(&sorter, &strings(&["b", "a"])), strings(&["a", "b"]));
        assert!(!missing.exists());

        let sorter = ExternalSorterBuilder::new()
            .with_tmp_dir(&missing)
            .with_max_memory(1)
            .build()
            .unwrap();
        assert_eq!(run_sort(&sorter, &strings(&["b"])), strings(&["b"]));
        assert!(matches!(
            sorter.sort(input(&strings(&["b", "a"]))),
            Err(SortError::TempDir(_))
        ));
    }

    #[test]
    fn test_input_error() {
        let sorter = sorter(SortOptions::default(), None, MergeStrategy::Pairwise);
        let input = vec![
            Ok("a".to_string()),
            Err(io::Error::new(io::ErrorKind::InvalidData, "test error")),
        ];
        assert!(matches!(sorter.sort(input), Err(SortError::Input(_))));
    }

    #[test]
    fn test_sort_to_writer() {
        let sorter = sorter(options(false, false, true), Some(2), MergeStrategy::Pairwise);
        let mut output: Vec<u8> = Vec::new();
        sorter
            .sort_to_writer(input(&strings(&["b", "a", "", "c"])), &mut output)
            .unwrap();
        assert_eq!(String::from_utf8(output).unwrap(), "c\nb\na\n\n");
    }

    #[test]
    fn test_sort_to_writer_empty() {
        let sorter = sorter(SortOptions::default(), Some(2), MergeStrategy::Pairwise);
        let mut output: Vec<u8> = Vec::new();
        sorter.sort_to_writer(input(&[]), &mut output).unwrap();
        assert!(output.is_empty());
    }
}
