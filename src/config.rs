use std::path::PathBuf;

use crate::PREFETCH_PAGES;

/// Runtime knobs of a scheduler. Frame geometry is fixed at compile time by
/// the scheduler's const parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Pages loaded into the frame store when a program is admitted. The
    /// first page is mandatory, the rest only go into free frames.
    pub prefetch_pages: usize,
    /// Record a `TraceEvent` for every scheduling step.
    pub trace: bool,
    /// Where spooled batch input is written.
    pub spool_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prefetch_pages: PREFETCH_PAGES,
            trace: false,
            spool_dir: std::env::temp_dir(),
        }
    }
}

impl Config {
    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    pub fn with_prefetch_pages(mut self, pages: usize) -> Self {
        self.prefetch_pages = pages;
        self
    }

    pub fn with_spool_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.spool_dir = dir.into();
        self
    }
}
