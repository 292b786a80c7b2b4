//! `ext-line-sort` is a memory-bounded external sort for text lines.
//!
//! Lines are accumulated in memory until the configured memory limit is exceeded. Every time the limit
//! is exceeded the buffered lines are sorted and spilled to a temporary file as a sorted run. When the input
//! is exhausted the runs are merged back into a single sorted stream. If the input fits the limit
//! no temporary files are created at all.
//!
//! # Overview
//!
//! * **Ordering options:**
//!   leading spaces may be ignored, letters may be compared case-insensitively and the order may be reversed.
//! * **Merge strategies:**
//!   runs are merged two at a time until a single run remains, or all at once using a binary heap.
//! * **Deterministic output:**
//!   lines that compare equal keep their input order, so spilling never changes the result.
//!
//! # Example
//!
//! ```no_run
//! use std::io;
//!
//! use ext_line_sort::{run, ExternalSorterBuilder, SortOptions};
//!
//! fn main() {
//!     let sorter = ExternalSorterBuilder::new()
//!         .with_options(SortOptions {
//!             ignore_case: true,
//!             ..SortOptions::default()
//!         })
//!         .with_max_memory(50 * 1024 * 1024)
//!         .build()
//!         .unwrap();
//!
//!     let stdin = io::stdin();
//!     let stdout = io::stdout();
//!     let output = io::BufWriter::new(stdout.lock());
//!
//!     sorter.sort_to_writer(run::lines(stdin.lock()), output).unwrap();
//! }
//! ```

pub mod buffer;
pub mod compare;
pub mod merger;
pub mod run;
pub mod sort;

pub use buffer::RunBuffer;
pub use compare::{LineComparator, Normalization, Order, SortOptions};
pub use merger::{merge_runs, merge_runs_kway, BinaryHeapMerger, MergeStrategy, MergedRun, TwoWayMerger};
pub use run::{Lines, RunHandle, RunReader, SpillStore};
pub use sort::{ExternalSorter, ExternalSorterBuilder, SortError, SortedLines};
