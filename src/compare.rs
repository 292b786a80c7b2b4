//! Line comparator composition.

use std::borrow::Cow;
use std::cmp::Ordering;

/// Options controlling how lines are ordered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SortOptions {
    /// Leading spaces don't affect sorting.
    pub ignore_leading_whitespace: bool,
    /// Letters are compared in their lowercase form.
    pub ignore_case: bool,
    /// Sort in descending order.
    pub reverse: bool,
}

/// Sorting direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

impl Order {
    /// Applies the direction to an ordering of normalized values.
    pub fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            Order::Asc => ordering,
            Order::Desc => ordering.reverse(),
        }
    }
}

/// A single unary normalization step applied to a line before comparison.
/// Normalization never alters the emitted line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Normalization {
    /// Removes all leading space characters.
    TrimLeadingSpaces,
    /// Converts the line to lowercase.
    Lowercase,
}

impl Normalization {
    fn apply<'a>(self, line: Cow<'a, str>) -> Cow<'a, str> {
        match self {
            Normalization::TrimLeadingSpaces => match line {
                Cow::Borrowed(s) => Cow::Borrowed(s.trim_start_matches(' ')),
                Cow::Owned(s) => Cow::Owned(s.trim_start_matches(' ').to_owned()),
            },
            Normalization::Lowercase => Cow::Owned(line.to_lowercase()),
        }
    }
}

/// Line comparator built from a normalization chain and a direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineComparator {
    chain: Vec<Normalization>,
    order: Order,
}

impl LineComparator {
    /// Builds a comparator from sort options.
    /// The chain starts as identity; whitespace trimming is applied before case folding.
    pub fn new(options: &SortOptions) -> Self {
        let mut chain = Vec::new();

        if options.ignore_leading_whitespace {
            chain.push(Normalization::TrimLeadingSpaces);
        }
        if options.ignore_case {
            chain.push(Normalization::Lowercase);
        }

        let order = if options.reverse { Order::Desc } else { Order::Asc };

        return LineComparator { chain, order };
    }

    /// Returns the sorting direction.
    pub fn order(&self) -> Order {
        self.order
    }

    /// Returns the normalized form of a line used as a comparison key.
    pub fn normalize<'a>(&self, line: &'a str) -> Cow<'a, str> {
        self.chain
            .iter()
            .fold(Cow::Borrowed(line), |line, step| step.apply(line))
    }

    /// Compares two lines.
    pub fn compare(&self, a: &str, b: &str) -> Ordering {
        self.order.apply(self.normalize(a).cmp(&self.normalize(b)))
    }

    /// Checks if `a` must be placed strictly before `b`.
    pub fn is_before(&self, a: &str, b: &str) -> bool {
        self.compare(a, b) == Ordering::Less
    }
}

impl Default for LineComparator {
    fn default() -> Self {
        LineComparator::new(&SortOptions::default())
    }
}
