use disk::{Disk, DiskError};
use log::{debug, error, info};
use memory::{Eviction, FrameStore, Pid};

use crate::{
    pcb::{Pcb, ProcessTable},
    scheduler::SchedulerError,
};

/// What `page_in` had to do to make a page available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageIn {
    /// Already resident, nothing was read.
    Resident(usize),
    /// Read from the backing file into `frame`, possibly evicting `victim`.
    Loaded {
        frame: usize,
        victim: Option<Eviction>,
    },
    /// The backing file could not supply the page. The page is marked
    /// unreadable and its lines will be skipped.
    Unreadable {
        error: DiskError,
        victim: Option<Eviction>,
    },
}

/// Moves program pages between script files and the frame store.
#[derive(Debug)]
pub struct Pager<const FRAME_SIZE: usize, const CAPACITY: usize> {
    store: FrameStore<FRAME_SIZE, CAPACITY>,
    disk: Disk,
}

impl<const FRAME_SIZE: usize, const CAPACITY: usize> Pager<FRAME_SIZE, CAPACITY> {
    pub fn new(disk: Disk) -> Self {
        Self {
            store: FrameStore::init(),
            disk,
        }
    }

    pub fn store(&self) -> &FrameStore<FRAME_SIZE, CAPACITY> {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut FrameStore<FRAME_SIZE, CAPACITY> {
        &mut self.store
    }

    pub fn disk(&self) -> &Disk {
        &self.disk
    }

    /// Makes `page` of `pid` resident. A resident page is only touched. A
    /// missing page goes into the lowest free frame, or else replaces the
    /// least recently used frame, whose owner loses its mapping to it.
    pub fn page_in(
        &mut self,
        processes: &mut ProcessTable,
        pid: Pid,
        page: usize,
    ) -> Result<PageIn, SchedulerError> {
        let pcb = processes
            .get(&pid)
            .ok_or(SchedulerError::NoSuchProcess(pid))?;
        if let Some(frame) = pcb.page_table().get_frame(page) {
            self.store.touch(frame)?;
            return Ok(PageIn::Resident(frame));
        }
        if page >= pcb.page_table().len() {
            return Err(SchedulerError::NoSuchPage { pid, page });
        }
        let name = pcb.name().to_string();

        let (frame, victim) = self.claim_frame(processes, &name)?;
        self.fill(processes, pid, page, frame, victim)
    }

    /// Reads `page` of `pid` into the already claimed `frame`.
    fn fill(
        &mut self,
        processes: &mut ProcessTable,
        pid: Pid,
        page: usize,
        frame: usize,
        victim: Option<Eviction>,
    ) -> Result<PageIn, SchedulerError> {
        let pcb = processes
            .get_mut(&pid)
            .ok_or(SchedulerError::NoSuchProcess(pid))?;
        let lines = match self.disk.read_page(pcb.script(), page, FRAME_SIZE) {
            Ok(lines) if lines.is_empty() => Err(DiskError::Read {
                name: pcb.script().path().display().to_string(),
                kind: std::io::ErrorKind::UnexpectedEof,
            }),
            other => other,
        };
        match lines {
            Ok(lines) => {
                self.store.load(frame, pid, lines)?;
                pcb.page_table_mut().map_to_frame(page, frame);
                debug!("Loaded page {} of process {} into frame {}", page, pid, frame);
                Ok(PageIn::Loaded { frame, victim })
            }
            Err(error) => {
                error!("Could not load page {} of process {}: {}", page, pid, error);
                pcb.page_table_mut().mark_unreadable(page);
                Ok(PageIn::Unreadable { error, victim })
            }
        }
    }

    fn claim_frame(
        &mut self,
        processes: &mut ProcessTable,
        name: &str,
    ) -> Result<(usize, Option<Eviction>), SchedulerError> {
        if let Some(frame) = self.store.find_free_frame() {
            return Ok((frame, None));
        }
        let frame = self
            .store
            .pick_victim()
            .ok_or_else(|| SchedulerError::ResourceExhausted {
                name: name.to_string(),
            })?;
        let eviction = self.store.evict(frame)?;
        if let Some(owner) = eviction.owner {
            if let Some(victim) = processes.get_mut(&owner) {
                victim.page_table_mut().unmap_frame(frame);
            }
        }
        info!("Evicted frame {} from process {:?}", frame, eviction.owner);
        Ok((frame, Some(eviction)))
    }

    /// Loads the first pages of a freshly created process. Page 0 must make it
    /// in, evicting if it has to. Later pages only use frames that are free.
    pub fn prefetch(
        &mut self,
        processes: &mut ProcessTable,
        pid: Pid,
        pages: usize,
    ) -> Result<Vec<Eviction>, SchedulerError> {
        let page_count = processes
            .get(&pid)
            .ok_or(SchedulerError::NoSuchProcess(pid))?
            .page_table()
            .len();
        let mut evictions = Vec::new();
        if page_count == 0 || pages == 0 {
            return Ok(evictions);
        }
        match self.page_in(processes, pid, 0)? {
            PageIn::Loaded {
                victim: Some(victim),
                ..
            } => evictions.push(victim),
            PageIn::Unreadable { error, .. } => return Err(SchedulerError::Disk(error)),
            _ => {}
        }
        for page in 1..pages.min(page_count) {
            let Some(frame) = self.store.allocate_frame() else {
                break;
            };
            self.fill(processes, pid, page, frame, None)?;
        }
        Ok(evictions)
    }

    /// Frees every frame slot owned by `pcb` and discards its spool file.
    /// Returns the number of slots freed.
    pub fn release(&mut self, pcb: &Pcb) -> usize {
        let mut released = 0;
        for frame in pcb.page_table().resident_frames() {
            match self.store.release(frame, pcb.pid()) {
                Ok(n) => released += n,
                Err(e) => error!("Could not release frame {}: {}", frame, e),
            }
        }
        self.disk.discard(pcb.script());
        released
    }
}
