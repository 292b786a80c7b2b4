//! Memory limited line buffer.

use rayon;

/// Buffer accumulating input lines until the memory limit is exceeded.
///
/// Memory consumption is approximated by the UTF-8 byte length of the buffered lines.
pub struct RunBuffer {
    limit: Option<u64>,
    current_size: u64,
    inner: Vec<String>,
}

impl RunBuffer {
    /// Creates a new buffer.
    ///
    /// # Arguments
    /// * `limit` - Memory limit in bytes. If the parameter is [`None`] the buffer never gets full.
    pub fn new(limit: Option<u64>) -> Self {
        RunBuffer {
            limit,
            current_size: 0,
            inner: Vec::new(),
        }
    }

    /// Adds a new line to the buffer.
    pub fn push(&mut self, line: String) {
        self.current_size += line.len() as u64;
        self.inner.push(line);
    }

    /// Returns the number of buffered lines.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns the number of bytes consumed by buffered lines.
    pub fn mem_size(&self) -> u64 {
        self.current_size
    }

    /// Checks if the buffered lines exceed the limit.
    pub fn is_full(&self) -> bool {
        match self.limit {
            Some(limit) => self.current_size > limit,
            None => false,
        }
    }

    /// Takes the buffered lines out leaving an empty buffer with the same limit.
    pub fn take(&mut self) -> RunBuffer {
        let limit = self.limit;
        std::mem::replace(self, RunBuffer::new(limit))
    }
}

impl IntoIterator for RunBuffer {
    type Item = String;
    type IntoIter = <Vec<String> as IntoIterator>::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.into_iter()
    }
}

impl rayon::slice::ParallelSliceMut<String> for RunBuffer {
    fn as_parallel_slice_mut(&mut self) -> &mut [String] {
        self.inner.as_mut_slice()
    }
}
