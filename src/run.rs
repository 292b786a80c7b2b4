//! Sorted runs stored on file system.

use std::fs;
use std::io;
use std::io::prelude::*;
use std::path::Path;
use std::sync::Arc;

use log;
use tempfile;

use crate::sort::SortError;

/// Temporary storage for sorted runs.
/// Every run is kept in its own newline-delimited file inside a private temporary directory.
pub struct SpillStore {
    dir: Arc<tempfile::TempDir>,
    rw_buf_size: Option<usize>,
}

impl SpillStore {
    /// Creates a new store.
    ///
    /// # Arguments
    /// * `tmp_path` - Directory the store directory is created in. If the parameter is [`None`]
    ///   default OS temporary directory will be used.
    /// * `rw_buf_size` - Run file read/write buffer size.
    pub fn new(tmp_path: Option<&Path>, rw_buf_size: Option<usize>) -> Result<Self, SortError> {
        let dir = if let Some(tmp_path) = tmp_path {
            tempfile::tempdir_in(tmp_path)
        } else {
            tempfile::tempdir()
        }
        .map_err(SortError::TempDir)?;

        log::info!("using {} as a temporary directory", dir.path().display());

        return Ok(SpillStore {
            dir: Arc::new(dir),
            rw_buf_size,
        });
    }

    /// Returns the store directory path.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Writes already sorted lines to a new run file.
    pub fn materialize<I>(&self, lines: I) -> Result<RunHandle, SortError>
    where
        I: IntoIterator<Item = String>,
    {
        self.write_run(lines.into_iter().map(Ok))
    }

    /// Writes a fallible stream of sorted lines to a new run file.
    /// The first stream error aborts writing and is returned as is.
    pub fn write_run<I>(&self, lines: I) -> Result<RunHandle, SortError>
    where
        I: IntoIterator<Item = Result<String, SortError>>,
    {
        let tmp_file = tempfile::Builder::new()
            .prefix("run-")
            .tempfile_in(self.dir.path())
            .map_err(SortError::TempStore)?;

        let mut writer = match self.rw_buf_size {
            Some(buf_size) => io::BufWriter::with_capacity(buf_size, tmp_file.as_file()),
            None => io::BufWriter::new(tmp_file.as_file()),
        };

        let mut count: usize = 0;
        for line in lines.into_iter() {
            let line = line?;
            writer.write_all(line.as_bytes()).map_err(SortError::TempStore)?;
            writer.write_all(b"\n").map_err(SortError::TempStore)?;
            count += 1;
        }
        writer.flush().map_err(SortError::TempStore)?;
        drop(writer);

        let path = tmp_file.into_temp_path();
        log::trace!("run {} saved ({} lines)", path.display(), count);

        return Ok(RunHandle {
            path,
            _dir: Arc::clone(&self.dir),
        });
    }

    /// Opens a run for sequential reading.
    pub fn open(&self, handle: RunHandle) -> Result<RunReader, SortError> {
        let file = fs::File::open(&handle.path).map_err(SortError::MergeRead)?;

        let reader = match self.rw_buf_size {
            Some(buf_size) => io::BufReader::with_capacity(buf_size, file),
            None => io::BufReader::new(file),
        };

        return Ok(RunReader {
            lines: lines(reader),
            failed: false,
            _handle: handle,
        });
    }
}

/// Handle to a run file. The file is removed when the handle is dropped.
pub struct RunHandle {
    path: tempfile::TempPath,
    // keeps the store directory alive while the run exists
    _dir: Arc<tempfile::TempDir>,
}

impl RunHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Iterator over the lines of a buffered reader.
///
/// Unlike [`BufRead::lines`] only the `\n` terminator is stripped, a trailing `\r` stays part of the line.
pub struct Lines<B> {
    reader: B,
}

/// Splits a buffered reader into lines.
pub fn lines<B: BufRead>(reader: B) -> Lines<B> {
    Lines { reader }
}

impl<B: BufRead> Iterator for Lines<B> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut line = String::new();
        match self.reader.read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => {
                if line.ends_with('\n') {
                    line.pop();
                }
                Some(Ok(line))
            }
            Err(err) => Some(Err(err)),
        }
    }
}

/// Forward-only run reader. Yields lines without terminators.
pub struct RunReader {
    lines: Lines<io::BufReader<fs::File>>,
    failed: bool,
    _handle: RunHandle,
}

impl Iterator for RunReader {
    type Item = Result<String, SortError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        match self.lines.next()? {
            Ok(line) => Some(Ok(line)),
            Err(err) => {
                self.failed = true;
                Some(Err(SortError::MergeRead(err)))
            }
        }
    }
}
