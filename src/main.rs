use std::fs;
use std::io::{self, prelude::*};
use std::path;
use std::process;

use bytesize::ByteSize;
use clap::ArgEnum;
use env_logger;
use log;

use ext_line_sort::{run, ExternalSorterBuilder, MergeStrategy, SortError, SortOptions};

fn main() {
    let arg_parser = build_arg_parser();

    let log_level: LogLevel = arg_parser.value_of_t_or_exit("log_level");
    init_logger(log_level);

    // destructors remove temporary files and must run before exit
    if let Err(err) = try_main(&arg_parser) {
        report(&err);
        process::exit(1);
    }
}

fn try_main(arg_parser: &clap::ArgMatches) -> Result<(), SortError> {
    let merge: Merge = arg_parser.value_of_t_or_exit("merge");
    let tmp_dir: Option<&str> = arg_parser.value_of("tmp_dir");
    let threads: Option<usize> = arg_parser
        .is_present("threads")
        .then(|| arg_parser.value_of_t_or_exit("threads"));
    let max_memory: Option<u64> = arg_parser
        .value_of("max_memory")
        .map(|value| parse_memory_size(value).expect("value is pre-validated"));

    let options = SortOptions {
        ignore_leading_whitespace: arg_parser.is_present("ignore_leading_whitespace"),
        ignore_case: arg_parser.is_present("ignore_case"),
        reverse: arg_parser.is_present("reverse_order"),
    };

    let input = open_input(arg_parser.value_of("input"))?;

    let mut sorter_builder = ExternalSorterBuilder::new()
        .with_options(options)
        .with_merge_strategy(merge.into());

    if let Some(max_memory) = max_memory {
        sorter_builder = sorter_builder.with_max_memory(max_memory);
    }

    if let Some(threads) = threads {
        sorter_builder = sorter_builder.with_threads_number(threads);
    }

    if let Some(tmp_dir) = tmp_dir {
        sorter_builder = sorter_builder.with_tmp_dir(path::Path::new(tmp_dir));
    }

    let sorter = sorter_builder.build()?;

    let stdout = io::stdout();
    let output = io::BufWriter::new(stdout.lock());

    sorter.sort_to_writer(run::lines(input), output)
}

fn open_input(path: Option<&str>) -> Result<Box<dyn BufRead>, SortError> {
    match path {
        Some(path) => {
            let file = fs::File::open(path).map_err(SortError::Input)?;
            Ok(Box::new(io::BufReader::new(file)))
        }
        None => Ok(Box::new(io::BufReader::new(io::stdin()))),
    }
}

fn report(err: &SortError) {
    match err {
        SortError::Input(_) => log::error!("data reading error: {}", err),
        SortError::TempDir(_) | SortError::ThreadPoolBuildError(_) => log::error!("sorter initialization error: {}", err),
        SortError::TempStore(_) => log::error!("data spilling error: {}", err),
        SortError::MergeRead(_) => log::error!("data merging error: {}", err),
        SortError::Output(_) => log::error!("data saving error: {}", err),
    }
}

fn parse_memory_size(value: &str) -> Result<u64, String> {
    let size = match value.parse::<u64>() {
        Ok(size) => size,
        Err(_) => value.parse::<ByteSize>()?.as_u64(),
    };

    if size == 0 {
        return Err("size must be positive".to_string());
    }

    return Ok(size);
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn possible_values() -> impl Iterator<Item = clap::PossibleValue<'static>> {
        Self::value_variants().iter().filter_map(|v| v.to_possible_value())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <LogLevel as clap::ArgEnum>::from_str(s, false)
    }
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum Merge {
    Pairwise,
    Kway,
}

impl Merge {
    pub fn possible_values() -> impl Iterator<Item = clap::PossibleValue<'static>> {
        Merge::value_variants().iter().filter_map(|v| v.to_possible_value())
    }
}

impl std::str::FromStr for Merge {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Merge as clap::ArgEnum>::from_str(s, false)
    }
}

impl From<Merge> for MergeStrategy {
    fn from(merge: Merge) -> Self {
        match merge {
            Merge::Pairwise => MergeStrategy::Pairwise,
            Merge::Kway => MergeStrategy::KWay,
        }
    }
}

fn build_arg_parser() -> clap::ArgMatches {
    clap::App::new("lsort")
        .about("sorts lines of text, spilling to temporary files when memory runs short")
        .arg(
            clap::Arg::new("input")
                .help("file to sort; if omitted, sorts lines from stdin")
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("max_memory")
                .short('m')
                .long("max-memory")
                .help("maximum in-memory usage in bytes; if exceeded, writes to temp files and merge sorts them")
                .takes_value(true)
                .validator(|v| match parse_memory_size(v) {
                    Ok(_) => Ok(()),
                    Err(err) => Err(format!("Memory size format incorrect: {}", err)),
                }),
        )
        .arg(
            clap::Arg::new("ignore_leading_whitespace")
                .short('b')
                .long("ignore-leading-whitespace")
                .help("leading whitespace doesn't affect sorting"),
        )
        .arg(
            clap::Arg::new("reverse_order")
                .short('r')
                .long("reverse-order")
                .help("reverse sort order"),
        )
        .arg(
            clap::Arg::new("ignore_case")
                .short('i')
                .long("ignore-case")
                .help("ignore case in sort order"),
        )
        .arg(
            clap::Arg::new("merge")
                .long("merge")
                .help("merge strategy for spilled runs")
                .takes_value(true)
                .default_value("pairwise")
                .possible_values(Merge::possible_values()),
        )
        .arg(
            clap::Arg::new("log_level")
                .short('l')
                .long("loglevel")
                .help("logging level")
                .takes_value(true)
                .default_value("warn")
                .possible_values(LogLevel::possible_values()),
        )
        .arg(
            clap::Arg::new("threads")
                .short('t')
                .long("threads")
                .help("number of threads to use for parallel sorting")
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("tmp_dir")
                .short('d')
                .long("tmp-dir")
                .help("directory to be used to store temporary data")
                .takes_value(true),
        )
        .get_matches()
}

fn init_logger(log_level: LogLevel) {
    env_logger::Builder::new()
        .filter_level(match log_level {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        })
        .format_timestamp_millis()
        .init();
}

#[cfg(test)]
mod test {
    use rstest::*;

    use super::{open_input, parse_memory_size};
    use ext_line_sort::{run, SortError};

    #[rstest]
    #[case("1", Ok(1))]
    #[case("4096", Ok(4096))]
    #[case("2KB", Ok(2000))]
    #[case("0", Err(()))]
    #[case("lots", Err(()))]
    fn test_parse_memory_size(#[case] value: &str, #[case] expected: Result<u64, ()>) {
        assert_eq!(parse_memory_size(value).map_err(|_| ()), expected);
    }

    #[test]
    fn test_open_input() {
        let dir = tempfile::tempdir_in("./").unwrap();
        let path = dir.path().join("input.txt");
        std::fs::write(&path, "b\r\na\n").unwrap();

        let input = open_input(path.to_str()).unwrap();
        let lines: Result<Vec<String>, _> = run::lines(input).collect();
        assert_eq!(lines.unwrap(), vec!["b\r", "a"]);
    }

    #[test]
    fn test_open_missing_input() {
        let dir = tempfile::tempdir_in("./").unwrap();
        let path = dir.path().join("missing.txt");

        let result = open_input(path.to_str());
        assert!(matches!(result, Err(SortError::Input(_))));
    }
}
