//! Sorted runs mergers.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use log;

use crate::compare::{LineComparator, Order};
use crate::run::{RunHandle, RunReader, SpillStore};
use crate::sort::SortError;

/// Merge phase strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    /// Merges runs two at a time until one remains.
    Pairwise,
    /// Merges all runs at once using a binary heap over run heads.
    KWay,
}

impl Default for MergeStrategy {
    fn default() -> Self {
        MergeStrategy::Pairwise
    }
}

/// Two-way merger.
/// Merges two sorted inputs into a single sorted output.
/// Lines that compare equal are taken from the left input first.
pub struct TwoWayMerger<L, R>
where
    L: Iterator<Item = Result<String, SortError>>,
    R: Iterator<Item = Result<String, SortError>>,
{
    left: L,
    right: R,
    left_head: Option<String>,
    right_head: Option<String>,
    comparator: LineComparator,
    initiated: bool,
    failed: bool,
}

impl<L, R> TwoWayMerger<L, R>
where
    L: Iterator<Item = Result<String, SortError>>,
    R: Iterator<Item = Result<String, SortError>>,
{
    /// Creates an instance of a two-way merger.
    /// Inputs should be sorted using the same comparator otherwise the result is undefined.
    pub fn new(left: L, right: R, comparator: LineComparator) -> Self {
        TwoWayMerger {
            left,
            right,
            left_head: None,
            right_head: None,
            comparator,
            initiated: false,
            failed: false,
        }
    }

    fn advance_left(&mut self) -> Result<(), SortError> {
        self.left_head = self.left.next().transpose()?;
        Ok(())
    }

    fn advance_right(&mut self) -> Result<(), SortError> {
        self.right_head = self.right.next().transpose()?;
        Ok(())
    }

    fn next_line(&mut self) -> Result<Option<String>, SortError> {
        if !self.initiated {
            self.advance_left()?;
            self.advance_right()?;
            self.initiated = true;
        }

        let take_right = match (&self.left_head, &self.right_head) {
            (None, None) => return Ok(None),
            (Some(_), None) => false,
            (None, Some(_)) => true,
            (Some(left), Some(right)) => self.comparator.is_before(right, left),
        };

        if take_right {
            let line = self.right_head.take();
            self.advance_right()?;
            Ok(line)
        } else {
            let line = self.left_head.take();
            self.advance_left()?;
            Ok(line)
        }
    }
}

impl<L, R> Iterator for TwoWayMerger<L, R>
where
    L: Iterator<Item = Result<String, SortError>>,
    R: Iterator<Item = Result<String, SortError>>,
{
    type Item = Result<String, SortError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        match self.next_line() {
            Ok(line) => line.map(Ok),
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

struct HeapEntry {
    key: String,
    line: String,
    run: usize,
    order: Order,
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // binary heap is max-heap by default so the ordering is reversed to make it min-heap
        self.order
            .apply(self.key.cmp(&other.key))
            .then_with(|| self.run.cmp(&other.run))
            .reverse()
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

/// Binary heap merger implementation.
/// Merges multiple sorted inputs into a single sorted output.
/// Time complexity is *m* \* log(*n*) in worst case where *m* is the number of lines,
/// *n* is the number of runs (inputs). Lines that compare equal are taken from the earlier run first.
pub struct BinaryHeapMerger<C>
where
    C: Iterator<Item = Result<String, SortError>>,
{
    items: BinaryHeap<HeapEntry>,
    runs: Vec<C>,
    comparator: LineComparator,
    initiated: bool,
    failed: bool,
}

impl<C> BinaryHeapMerger<C>
where
    C: Iterator<Item = Result<String, SortError>>,
{
    /// Creates an instance of a binary heap merger using runs as inputs.
    ///
    /// # Arguments
    /// * `runs` - Runs to be merged in a single sorted one
    /// * `comparator` - Comparator the runs are sorted with
    pub fn new<I>(runs: I, comparator: LineComparator) -> Self
    where
        I: IntoIterator<Item = C>,
    {
        let runs = Vec::from_iter(runs);
        let items = BinaryHeap::with_capacity(runs.len());

        return BinaryHeapMerger {
            runs,
            items,
            comparator,
            initiated: false,
            failed: false,
        };
    }

    fn pull(&mut self, run: usize) -> Result<(), SortError> {
        if let Some(line) = self.runs[run].next().transpose()? {
            let key = self.comparator.normalize(&line).into_owned();
            self.items.push(HeapEntry {
                key,
                line,
                run,
                order: self.comparator.order(),
            });
        }
        Ok(())
    }

    fn next_line(&mut self) -> Result<Option<String>, SortError> {
        if !self.initiated {
            for run in 0..self.runs.len() {
                self.pull(run)?;
            }
            self.initiated = true;
        }

        let entry = match self.items.pop() {
            Some(entry) => entry,
            None => return Ok(None),
        };
        self.pull(entry.run)?;

        Ok(Some(entry.line))
    }
}

impl<C> Iterator for BinaryHeapMerger<C>
where
    C: Iterator<Item = Result<String, SortError>>,
{
    type Item = Result<String, SortError>;

    /// Returns the next line from the inputs in comparator order.
    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        match self.next_line() {
            Ok(line) => line.map(Ok),
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

/// Result of the merge phase: a stream of lines in final order.
pub enum MergedRun {
    Empty,
    Single(RunReader),
    Pair(TwoWayMerger<RunReader, RunReader>),
    Heap(BinaryHeapMerger<RunReader>),
}

impl Iterator for MergedRun {
    type Item = Result<String, SortError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            MergedRun::Empty => None,
            MergedRun::Single(reader) => reader.next(),
            MergedRun::Pair(merger) => merger.next(),
            MergedRun::Heap(merger) => merger.next(),
        }
    }
}

/// Merges runs pairwise until a single run remains.
///
/// Every pass merges neighbouring runs so each merge combines contiguous ranges of the input
/// in their original order. Intermediate results are saved to the store, the last merge is
/// streamed directly.
pub fn merge_runs(
    store: &SpillStore,
    comparator: &LineComparator,
    mut runs: Vec<RunHandle>,
) -> Result<MergedRun, SortError> {
    let mut pass = 0;

    while runs.len() > 2 {
        pass += 1;
        log::debug!("merge pass {} ({} runs)", pass, runs.len());

        let mut merged = Vec::with_capacity((runs.len() + 1) / 2);
        let mut pending = runs.into_iter();

        while let Some(left) = pending.next() {
            match pending.next() {
                Some(right) => {
                    let merger = TwoWayMerger::new(store.open(left)?, store.open(right)?, comparator.clone());
                    merged.push(store.write_run(merger)?);
                }
                None => merged.push(left),
            }
        }

        runs = merged;
    }

    let mut runs = runs.into_iter();
    let merged = match (runs.next(), runs.next()) {
        (None, _) => MergedRun::Empty,
        (Some(run), None) => MergedRun::Single(store.open(run)?),
        (Some(left), Some(right)) => MergedRun::Pair(TwoWayMerger::new(
            store.open(left)?,
            store.open(right)?,
            comparator.clone(),
        )),
    };

    log::debug!("merge phase done");

    return Ok(merged);
}

/// Merges all runs at once using a binary heap.
pub fn merge_runs_kway(
    store: &SpillStore,
    comparator: &LineComparator,
    runs: Vec<RunHandle>,
) -> Result<MergedRun, SortError> {
    log::debug!("merging {} runs at once", runs.len());

    let readers = runs
        .into_iter()
        .map(|run| store.open(run))
        .collect::<Result<Vec<_>, _>>()?;

    return Ok(MergedRun::Heap(BinaryHeapMerger::new(readers, comparator.clone())));
}
