use std::collections::VecDeque;

use memory::Pid;

use crate::pcb::ProcessTable;

/// FIFO of runnable process ids with the ordered inserts the policies need.
///
/// Ids missing from the process table sort last; they never come from the
/// scheduler, which removes an id from the queue before it retires the PCB.
#[derive(Debug, Clone, Default)]
pub struct ReadyQueue {
    pids: VecDeque<Pid>,
}

fn sort_key<'a>(processes: &'a ProcessTable, pid: &Pid) -> (usize, &'a str) {
    match processes.get(pid) {
        Some(pcb) => (pcb.job_score(), pcb.name()),
        None => (usize::MAX, ""),
    }
}

impl ReadyQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pids.is_empty()
    }

    pub fn head(&self) -> Option<Pid> {
        self.pids.front().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = Pid> + '_ {
        self.pids.iter().copied()
    }

    pub fn enqueue_tail(&mut self, pid: Pid) {
        self.pids.push_back(pid);
    }

    pub fn enqueue_head(&mut self, pid: Pid) {
        self.pids.push_front(pid);
    }

    pub fn dequeue(&mut self) -> Option<Pid> {
        self.pids.pop_front()
    }

    /// Inserts before the first entry whose (score, name) is strictly larger.
    pub fn enqueue_sorted(&mut self, pid: Pid, processes: &ProcessTable) {
        let key = sort_key(processes, &pid);
        let at = self
            .pids
            .iter()
            .position(|other| sort_key(processes, other) > key)
            .unwrap_or(self.pids.len());
        self.pids.insert(at, pid);
    }

    /// Inserts after every entry whose score is not larger, so equal scores
    /// keep arrival order.
    pub fn enqueue_by_score(&mut self, pid: Pid, processes: &ProcessTable) {
        let score = sort_key(processes, &pid).0;
        let at = self
            .pids
            .iter()
            .position(|other| sort_key(processes, other).0 > score)
            .unwrap_or(self.pids.len());
        self.pids.insert(at, pid);
    }

    pub fn remove(&mut self, pid: Pid) -> bool {
        match self.pids.iter().position(|&other| other == pid) {
            Some(at) => {
                self.pids.remove(at);
                true
            }
            None => false,
        }
    }

    /// Decrements the score of every queued process, flooring at zero.
    pub fn age(&self, processes: &mut ProcessTable) {
        for pid in self.pids.iter() {
            if let Some(pcb) = processes.get_mut(pid) {
                pcb.age();
            }
        }
    }

    /// Stable sort by (score, name).
    pub fn resort(&mut self, processes: &ProcessTable) {
        self.pids
            .make_contiguous()
            .sort_by(|a, b| sort_key(processes, a).cmp(&sort_key(processes, b)));
    }
}
