use log::debug;

use crate::{MemoryError, Pid};

/// One line slot of a frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Slot {
    line: Option<String>,
    owner: Option<Pid>,
}

impl Slot {
    fn is_occupied(&self) -> bool {
        self.line.is_some()
    }

    fn line(&self) -> Option<&str> {
        self.line.as_deref()
    }

    fn clear(&mut self) {
        self.line = None;
        self.owner = None;
    }
}

#[derive(Debug, Clone)]
pub struct Frame<const FRAME_SIZE: usize> {
    slots: [Slot; FRAME_SIZE],
    last_access_time: u64,
}

impl<const FRAME_SIZE: usize> Frame<FRAME_SIZE> {
    fn empty() -> Self {
        Self {
            slots: std::array::from_fn(|_| Slot::default()),
            last_access_time: 0,
        }
    }

    pub fn is_free(&self) -> bool {
        self.slots.iter().all(|slot| !slot.is_occupied())
    }

    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_occupied()).count()
    }

    /// The process whose page this frame currently holds.
    pub fn owner(&self) -> Option<Pid> {
        self.slots.iter().find_map(|slot| slot.owner)
    }

    pub fn last_access_time(&self) -> u64 {
        self.last_access_time
    }

    fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            slot.clear();
        }
        self.last_access_time = 0;
    }
}

/// What was thrown out of a frame to make room for another page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eviction {
    pub frame: usize,
    pub owner: Option<Pid>,
    pub lines: Vec<String>,
}

/// Fixed array of `CAPACITY / FRAME_SIZE` frames holding program lines.
///
/// Every read, load or touch of a frame stamps it with the store's logical
/// clock, which only ever moves forward. A frame is either entirely free or
/// holds one page of one process.
#[derive(Debug, Clone)]
pub struct FrameStore<const FRAME_SIZE: usize, const CAPACITY: usize> {
    frames: Vec<Frame<FRAME_SIZE>>,
    clock: u64,
}

impl<const FRAME_SIZE: usize, const CAPACITY: usize> FrameStore<FRAME_SIZE, CAPACITY> {
    pub const NUM_FRAMES: usize = CAPACITY / FRAME_SIZE;

    pub fn init() -> Self {
        let mut frames = Vec::with_capacity(Self::NUM_FRAMES);
        for _ in 0..Self::NUM_FRAMES {
            frames.push(Frame::empty());
        }
        Self { frames, clock: 0 }
    }

    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }

    /// Current value of the logical clock.
    pub fn now(&self) -> u64 {
        self.clock
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    pub fn frames(&self) -> &[Frame<FRAME_SIZE>] {
        &self.frames
    }

    pub fn frame(&self, frame: usize) -> Option<&Frame<FRAME_SIZE>> {
        self.frames.get(frame)
    }

    fn frame_mut(&mut self, frame: usize) -> Result<&mut Frame<FRAME_SIZE>, MemoryError> {
        self.frames
            .get_mut(frame)
            .ok_or(MemoryError::NoSuchFrame { frame })
    }

    pub fn check_address(&self, index: usize) -> Result<(), MemoryError> {
        if index >= self.frames.len() * FRAME_SIZE {
            return Err(MemoryError::OverCapacity { index });
        }
        Ok(())
    }

    /// Lowest-indexed frame with no occupied slot.
    pub fn find_free_frame(&self) -> Option<usize> {
        self.frames.iter().position(|frame| frame.is_free())
    }

    /// Like `find_free_frame`, but also resets the frame and stamps it.
    pub fn allocate_frame(&mut self) -> Option<usize> {
        let frame = self.find_free_frame()?;
        let now = self.tick();
        let entry = &mut self.frames[frame];
        entry.clear();
        entry.last_access_time = now;
        debug!("Allocated frame {} at t={}", frame, now);
        Some(frame)
    }

    /// Least recently used frame among those holding anything. Ties go to the
    /// lowest index.
    pub fn pick_victim(&self) -> Option<usize> {
        let mut victim = None;
        let mut oldest = u64::MAX;
        for (frame, entry) in self.frames.iter().enumerate() {
            if entry.is_free() {
                continue;
            }
            if entry.last_access_time < oldest {
                oldest = entry.last_access_time;
                victim = Some(frame);
            }
        }
        victim
    }

    /// Frees every slot of `frame` and hands back what it held.
    pub fn evict(&mut self, frame: usize) -> Result<Eviction, MemoryError> {
        let entry = self.frame_mut(frame)?;
        let owner = entry.owner();
        let lines = entry.slots.iter_mut().filter_map(|slot| slot.line.take()).collect();
        entry.clear();
        debug!("Evicted frame {} (owner {:?})", frame, owner);
        Ok(Eviction {
            frame,
            owner,
            lines,
        })
    }

    /// Fills `frame` with up to `FRAME_SIZE` lines owned by `owner`. Slots
    /// past the end of `lines` stay unoccupied.
    pub fn load(&mut self, frame: usize, owner: Pid, lines: Vec<String>) -> Result<(), MemoryError> {
        let now = self.tick();
        let entry = self.frame_mut(frame)?;
        entry.clear();
        for (slot, line) in entry.slots.iter_mut().zip(lines) {
            slot.line = Some(line);
            slot.owner = Some(owner);
        }
        entry.last_access_time = now;
        Ok(())
    }

    /// Stamps `frame` as used now.
    pub fn touch(&mut self, frame: usize) -> Result<(), MemoryError> {
        let now = self.tick();
        self.frame_mut(frame)?.last_access_time = now;
        Ok(())
    }

    /// Reads the line at absolute slot `index`, stamping its frame.
    pub fn read_line(&mut self, index: usize) -> Result<&str, MemoryError> {
        self.check_address(index)?;
        let now = self.tick();
        let entry = &mut self.frames[index / FRAME_SIZE];
        entry.last_access_time = now;
        entry.slots[index % FRAME_SIZE]
            .line()
            .ok_or(MemoryError::Unallocated { index })
    }

    /// Frees the slots of `frame` that belong to `owner`; returns how many.
    pub fn release(&mut self, frame: usize, owner: Pid) -> Result<usize, MemoryError> {
        let entry = self.frame_mut(frame)?;
        let mut released = 0;
        for slot in entry.slots.iter_mut() {
            if slot.is_occupied() && slot.owner == Some(owner) {
                slot.clear();
                released += 1;
            }
        }
        if entry.is_free() {
            entry.last_access_time = 0;
        }
        Ok(released)
    }

    /// Occupied slots across the whole store.
    pub fn occupied_slots(&self) -> usize {
        self.frames.iter().map(|frame| frame.occupied()).sum()
    }
}
