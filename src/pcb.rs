use std::collections::BTreeMap;

use disk::Script;
use memory::{FrameStore, MemoryError, Pid};

/// Every live process, by id. Frames and the ready queue only hold ids.
pub type ProcessTable = BTreeMap<Pid, Pcb>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageTableEntry {
    NotLoaded,
    Resident(usize),
    /// The backing file could not be read when this page faulted.
    Unreadable,
}

/// Maps each virtual page of a program to a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageTable {
    entries: Vec<PageTableEntry>,
}

impl PageTable {
    pub fn init(page_count: usize) -> Self {
        Self {
            entries: vec![PageTableEntry::NotLoaded; page_count],
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, page: usize) -> Option<PageTableEntry> {
        self.entries.get(page).copied()
    }

    pub fn get_frame(&self, page: usize) -> Option<usize> {
        match self.get(page)? {
            PageTableEntry::Resident(frame) => Some(frame),
            _ => None,
        }
    }

    pub(crate) fn map_to_frame(&mut self, page: usize, frame: usize) {
        if let Some(entry) = self.entries.get_mut(page) {
            *entry = PageTableEntry::Resident(frame);
        }
    }

    pub(crate) fn mark_unreadable(&mut self, page: usize) {
        if let Some(entry) = self.entries.get_mut(page) {
            *entry = PageTableEntry::Unreadable;
        }
    }

    /// Drops every mapping to `frame`; returns how many pages were unmapped.
    pub(crate) fn unmap_frame(&mut self, frame: usize) -> usize {
        let mut unmapped = 0;
        for entry in self.entries.iter_mut() {
            if *entry == PageTableEntry::Resident(frame) {
                *entry = PageTableEntry::NotLoaded;
                unmapped += 1;
            }
        }
        unmapped
    }

    pub fn resident_frames(&self) -> impl Iterator<Item = usize> + '_ {
        self.entries.iter().filter_map(|entry| match entry {
            PageTableEntry::Resident(frame) => Some(*frame),
            _ => None,
        })
    }
}

/// Result of asking a PCB for its next instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Absolute line index into the frame store.
    Hit(usize),
    /// The page is gone for good; `pc` moved past the line.
    Missing,
    /// The page is not resident; `pc` did not move.
    Miss { page: usize },
}

#[derive(Debug, Clone)]
pub struct Pcb {
    pid: Pid,
    script: Script,
    page_table: PageTable,
    pc: usize,
    job_score: usize,
    admitted: bool,
}

impl Pcb {
    pub fn new(pid: Pid, script: Script, frame_size: usize) -> Self {
        let page_table = PageTable::init(script.page_count(frame_size));
        let job_score = script.line_count();
        Self {
            pid,
            script,
            page_table,
            pc: 0,
            job_score,
            admitted: false,
        }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Script name, empty for the batch input process.
    pub fn name(&self) -> &str {
        self.script.name()
    }

    pub fn script(&self) -> &Script {
        &self.script
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn line_count(&self) -> usize {
        self.script.line_count()
    }

    pub fn job_score(&self) -> usize {
        self.job_score
    }

    pub fn page_table(&self) -> &PageTable {
        &self.page_table
    }

    pub(crate) fn page_table_mut(&mut self) -> &mut PageTable {
        &mut self.page_table
    }

    /// False until the PCB has been placed on a ready queue once.
    pub fn is_admitted(&self) -> bool {
        self.admitted
    }

    pub(crate) fn mark_admitted(&mut self) {
        self.admitted = true;
    }

    pub(crate) fn age(&mut self) {
        self.job_score = self.job_score.saturating_sub(1);
    }

    pub fn has_next_instruction(&self) -> bool {
        self.pc < self.line_count()
    }

    /// Locates the line at `pc`. A hit stamps the frame and advances `pc`;
    /// a miss leaves `pc` alone so the same line is retried after paging.
    pub fn next_instruction<const FRAME_SIZE: usize, const CAPACITY: usize>(
        &mut self,
        store: &mut FrameStore<FRAME_SIZE, CAPACITY>,
    ) -> Result<Access, MemoryError> {
        let page = self.pc / FRAME_SIZE;
        let offset = self.pc % FRAME_SIZE;
        match self.page_table.get(page) {
            Some(PageTableEntry::Resident(frame)) => {
                store.touch(frame)?;
                self.pc += 1;
                Ok(Access::Hit(frame * FRAME_SIZE + offset))
            }
            Some(PageTableEntry::Unreadable) => {
                self.pc += 1;
                Ok(Access::Missing)
            }
            Some(PageTableEntry::NotLoaded) | None => Ok(Access::Miss { page }),
        }
    }
}
