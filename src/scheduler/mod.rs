use std::fmt;

use disk::{Disk, DiskError, Script};
use log::{debug, error, info, warn};
use memory::{Eviction, FrameStore, MemoryError, Pid};

use crate::{
    config::Config,
    pager::{PageIn, Pager},
    pcb::{Access, Pcb, ProcessTable},
    policy::Policy,
    ready_queue::ReadyQueue,
    MAX_SCRIPTS,
};

#[cfg(test)]
mod tests;

/// Why a whole `exec` request was turned down. Nothing is admitted when one
/// of these is returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    NoScripts,
    TooManyScripts(usize),
    UnknownPolicy(String),
    DuplicateScript(String),
    ScriptUnavailable { name: String, source: DiskError },
    Spool(DiskError),
}

impl fmt::Display for AdmissionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdmissionError::NoScripts => write!(f, "no scripts given"),
            AdmissionError::TooManyScripts(n) => {
                write!(f, "{} scripts given, at most {} allowed", n, MAX_SCRIPTS)
            }
            AdmissionError::UnknownPolicy(_) => write!(f, "unknown scheduling policy"),
            AdmissionError::DuplicateScript(name) => {
                write!(f, "script named {} already scheduled", name)
            }
            AdmissionError::ScriptUnavailable { name, source } => {
                write!(f, "cannot open {}: {}", name, source)
            }
            AdmissionError::Spool(e) => write!(f, "cannot spool batch input: {}", e),
        }
    }
}

impl std::error::Error for AdmissionError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// Not even one frame could be found for the program's first page.
    ResourceExhausted { name: String },
    NoSuchProcess(Pid),
    /// The page lies past the end of the program.
    NoSuchPage { pid: Pid, page: usize },
    Memory(MemoryError),
    Disk(DiskError),
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerError::ResourceExhausted { name } => {
                write!(f, "no frame available for {}", name)
            }
            SchedulerError::NoSuchProcess(pid) => write!(f, "no process with id {}", pid),
            SchedulerError::NoSuchPage { pid, page } => {
                write!(f, "process {} has no page {}", pid, page)
            }
            SchedulerError::Memory(e) => write!(f, "{}", e),
            SchedulerError::Disk(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for SchedulerError {}

impl From<MemoryError> for SchedulerError {
    fn from(e: MemoryError) -> Self {
        SchedulerError::Memory(e)
    }
}

impl From<DiskError> for SchedulerError {
    fn from(e: DiskError) -> Self {
        SchedulerError::Disk(e)
    }
}

/// Whether the shell should keep going after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Executes program lines on behalf of the scheduler.
///
/// `dispatch` receives the scheduler back so a line can itself admit more
/// programs into the running batch.
pub trait Dispatcher<const FRAME_SIZE: usize, const CAPACITY: usize> {
    fn dispatch(&mut self, line: &str, scheduler: &mut Scheduler<FRAME_SIZE, CAPACITY>) -> Flow;

    fn page_fault(&mut self, _fault: &PageFault) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageFault {
    pub pid: Pid,
    pub page: usize,
    /// Frame the page went into, if it could be read.
    pub frame: Option<usize>,
    pub victim: Option<Eviction>,
    pub error: Option<DiskError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetch {
    Instruction(String),
    /// The line could not be read and was skipped.
    Missing,
    PageFault(PageFault),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    Requeued,
    Faulted,
    Retired,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnReport {
    pub pid: Pid,
    pub executed: usize,
    pub outcome: TurnOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    Admitted {
        pid: Pid,
        name: String,
        job_score: usize,
    },
    Executed {
        pid: Pid,
        line: String,
    },
    PageFault {
        pid: Pid,
        page: usize,
        frame: Option<usize>,
        victim: Option<Pid>,
    },
    Requeued {
        pid: Pid,
        job_score: usize,
    },
    Retired {
        pid: Pid,
    },
}

/// What came of an accepted `admit`. A program whose first page found no
/// frame is listed in `rejected`; the others are unaffected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Admission {
    pub admitted: Vec<Pid>,
    pub rejected: Vec<(String, SchedulerError)>,
    pub evictions: Vec<Eviction>,
}

/// Owns every process, the ready queue and the paged frame store.
#[derive(Debug)]
pub struct Scheduler<const FRAME_SIZE: usize, const CAPACITY: usize> {
    config: Config,
    pager: Pager<FRAME_SIZE, CAPACITY>,
    processes: ProcessTable,
    queue: ReadyQueue,
    policy: Option<Policy>,
    running: bool,
    next_pid: usize,
    trace: Vec<TraceEvent>,
}

impl<const FRAME_SIZE: usize, const CAPACITY: usize> Scheduler<FRAME_SIZE, CAPACITY> {
    pub fn new(config: Config) -> Self {
        let disk = Disk::new(config.spool_dir.clone());
        Self {
            config,
            pager: Pager::new(disk),
            processes: ProcessTable::new(),
            queue: ReadyQueue::new(),
            policy: None,
            running: false,
            next_pid: 1,
            trace: Vec::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &FrameStore<FRAME_SIZE, CAPACITY> {
        self.pager.store()
    }

    pub fn disk(&self) -> &Disk {
        self.pager.disk()
    }

    pub fn process(&self, pid: Pid) -> Option<&Pcb> {
        self.processes.get(&pid)
    }

    pub fn processes(&self) -> impl Iterator<Item = &Pcb> {
        self.processes.values()
    }

    pub fn queue(&self) -> &ReadyQueue {
        &self.queue
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Policy of the batch currently admitted, if any.
    pub fn policy(&self) -> Option<Policy> {
        self.policy
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Hands over the events recorded so far.
    pub fn take_trace(&mut self) -> Vec<TraceEvent> {
        std::mem::take(&mut self.trace)
    }

    fn record(&mut self, event: TraceEvent) {
        if self.config.trace {
            self.trace.push(event);
        }
    }

    /// Creates a process for each script, plus one for `batch` lines when
    /// given, and queues them under `policy`. The request is checked as a
    /// whole first: bad counts, duplicate names and unopenable files reject
    /// it before any process exists.
    ///
    /// While a run is in progress the new processes join it under the
    /// running policy.
    pub fn admit(
        &mut self,
        scripts: &[&str],
        policy: Policy,
        batch: Option<&[String]>,
    ) -> Result<Admission, AdmissionError> {
        if scripts.is_empty() {
            return Err(AdmissionError::NoScripts);
        }
        if scripts.len() > MAX_SCRIPTS {
            return Err(AdmissionError::TooManyScripts(scripts.len()));
        }
        for (i, name) in scripts.iter().enumerate() {
            if scripts[..i].contains(name) || self.processes.values().any(|p| p.name() == *name) {
                return Err(AdmissionError::DuplicateScript(name.to_string()));
            }
        }

        let mut opened = Vec::with_capacity(scripts.len());
        for name in scripts {
            let script = self.pager.disk().open(name).map_err(|source| {
                AdmissionError::ScriptUnavailable {
                    name: name.to_string(),
                    source,
                }
            })?;
            opened.push(script);
        }
        let spooled = match batch {
            Some(lines) => Some(self.pager.disk().spool(lines).map_err(AdmissionError::Spool)?),
            None => None,
        };

        let policy = match self.policy {
            Some(active) => {
                if active != policy {
                    warn!("Ignoring {} while {} batch is active", policy, active);
                }
                active
            }
            None => {
                self.policy = Some(policy);
                policy
            }
        };

        let mut admission = Admission::default();
        for script in opened {
            if let Some(pid) = self.create_process(script, &mut admission) {
                self.enqueue(pid, policy);
            }
        }
        if let Some(script) = spooled {
            if let Some(pid) = self.create_process(script, &mut admission) {
                self.queue.enqueue_head(pid);
                if let Some(pcb) = self.processes.get_mut(&pid) {
                    pcb.mark_admitted();
                }
            }
        }
        if self.processes.is_empty() {
            self.policy = None;
        }
        Ok(admission)
    }

    fn create_process(&mut self, script: Script, admission: &mut Admission) -> Option<Pid> {
        let pid = Pid(self.next_pid);
        self.next_pid += 1;
        let name = script.name().to_string();
        let pcb = Pcb::new(pid, script, FRAME_SIZE);
        let job_score = pcb.job_score();
        self.processes.insert(pid, pcb);

        match self
            .pager
            .prefetch(&mut self.processes, pid, self.config.prefetch_pages)
        {
            Ok(evictions) => admission.evictions.extend(evictions),
            Err(e) => {
                error!("Could not admit {}: {}", name, e);
                if let Some(pcb) = self.processes.remove(&pid) {
                    self.pager.release(&pcb);
                }
                admission.rejected.push((name, e));
                return None;
            }
        }
        info!("Admitted process {} ({}, {} lines)", pid, name, job_score);
        self.record(TraceEvent::Admitted {
            pid,
            name,
            job_score,
        });
        admission.admitted.push(pid);
        Some(pid)
    }

    fn enqueue(&mut self, pid: Pid, policy: Policy) {
        policy.enqueue(&mut self.queue, pid, &self.processes);
        if let Some(pcb) = self.processes.get_mut(&pid) {
            pcb.mark_admitted();
        }
    }

    /// Ensures `page` of `pid` is resident, reading it in if needed.
    pub fn page_in(&mut self, pid: Pid, page: usize) -> Result<PageIn, SchedulerError> {
        self.pager.page_in(&mut self.processes, pid, page)
    }

    pub fn has_next_instruction(&self, pid: Pid) -> bool {
        self.processes
            .get(&pid)
            .map_or(false, |pcb| pcb.has_next_instruction())
    }

    /// Fetches the line at `pid`'s program counter. A page fault reloads the
    /// page but hands back no line; the caller should end the turn.
    pub fn next_instruction(&mut self, pid: Pid) -> Result<Fetch, SchedulerError> {
        let pcb = self
            .processes
            .get_mut(&pid)
            .ok_or(SchedulerError::NoSuchProcess(pid))?;
        let pc = pcb.pc();
        match pcb.next_instruction(self.pager.store_mut())? {
            Access::Hit(index) => match self.pager.store_mut().read_line(index) {
                Ok(line) => Ok(Fetch::Instruction(line.to_string())),
                Err(e) => {
                    warn!("Process {} line {} unavailable: {}", pid, pc, e);
                    Ok(Fetch::Missing)
                }
            },
            Access::Missing => {
                warn!("Process {} skipping unreadable line {}", pid, pc);
                Ok(Fetch::Missing)
            }
            Access::Miss { page } => {
                info!("Page fault: process {} page {}", pid, page);
                let fault = match self.pager.page_in(&mut self.processes, pid, page)? {
                    PageIn::Resident(frame) => PageFault {
                        pid,
                        page,
                        frame: Some(frame),
                        victim: None,
                        error: None,
                    },
                    PageIn::Loaded { frame, victim } => PageFault {
                        pid,
                        page,
                        frame: Some(frame),
                        victim,
                        error: None,
                    },
                    PageIn::Unreadable { error, victim } => PageFault {
                        pid,
                        page,
                        frame: None,
                        victim,
                        error: Some(error),
                    },
                };
                self.record(TraceEvent::PageFault {
                    pid,
                    page,
                    frame: fault.frame,
                    victim: fault.victim.as_ref().and_then(|v| v.owner),
                });
                Ok(Fetch::PageFault(fault))
            }
        }
    }

    /// Runs one turn of the process at the head of the queue. Returns `None`
    /// once the queue is empty.
    pub fn step(
        &mut self,
        dispatcher: &mut dyn Dispatcher<FRAME_SIZE, CAPACITY>,
    ) -> Result<Option<TurnReport>, SchedulerError> {
        let Some(pid) = self.queue.dequeue() else {
            return Ok(None);
        };
        let policy = self.policy.unwrap_or(Policy::Fcfs);
        let mut executed = 0;
        let mut interrupted = None;

        while self.has_next_instruction(pid) {
            if policy.quantum().is_some_and(|quantum| executed >= quantum) {
                break;
            }
            match self.next_instruction(pid)? {
                Fetch::Instruction(line) => {
                    executed += 1;
                    debug!("Process {} executing: {}", pid, line);
                    self.record(TraceEvent::Executed {
                        pid,
                        line: line.clone(),
                    });
                    if dispatcher.dispatch(&line, self) == Flow::Quit {
                        interrupted = Some(TurnOutcome::Quit);
                        break;
                    }
                }
                Fetch::Missing => executed += 1,
                Fetch::PageFault(fault) => {
                    dispatcher.page_fault(&fault);
                    interrupted = Some(TurnOutcome::Faulted);
                    break;
                }
            }
        }

        if interrupted == Some(TurnOutcome::Quit) {
            info!("Process {} asked to quit, stopping the run", pid);
            self.retire_all();
            return Ok(Some(TurnReport {
                pid,
                executed,
                outcome: TurnOutcome::Quit,
            }));
        }

        if policy.ages() {
            self.queue.age(&mut self.processes);
            self.queue.resort(&self.processes);
        }

        let outcome = if self.has_next_instruction(pid) {
            self.enqueue(pid, policy);
            let job_score = self.processes.get(&pid).map_or(0, |pcb| pcb.job_score());
            self.record(TraceEvent::Requeued { pid, job_score });
            interrupted.unwrap_or(TurnOutcome::Requeued)
        } else {
            self.retire(pid);
            TurnOutcome::Retired
        };
        Ok(Some(TurnReport {
            pid,
            executed,
            outcome,
        }))
    }

    /// Steps until the queue drains or a program quits, then releases every
    /// remaining process and its frames.
    pub fn run_to_quiescence(
        &mut self,
        dispatcher: &mut dyn Dispatcher<FRAME_SIZE, CAPACITY>,
    ) -> Result<Flow, SchedulerError> {
        if self.running {
            warn!("Scheduler is already running");
            return Ok(Flow::Continue);
        }
        self.running = true;
        info!(
            "Running {} processes under {}",
            self.queue.len(),
            self.policy.unwrap_or(Policy::Fcfs)
        );

        let result = loop {
            match self.step(dispatcher) {
                Ok(Some(TurnReport {
                    outcome: TurnOutcome::Quit,
                    ..
                })) => break Ok(Flow::Quit),
                Ok(Some(_)) => {}
                Ok(None) => break Ok(Flow::Continue),
                Err(e) => {
                    error!("Run aborted: {}", e);
                    break Err(e);
                }
            }
        };

        self.retire_all();
        self.running = false;
        self.policy = None;
        let leaked = self.pager.store().occupied_slots();
        if leaked != 0 {
            error!("{} frame slots still occupied after the run", leaked);
        }
        result
    }

    fn retire(&mut self, pid: Pid) {
        self.queue.remove(pid);
        if let Some(pcb) = self.processes.remove(&pid) {
            let freed = self.pager.release(&pcb);
            info!(
                "Process {} ({}) retired, {} slots freed",
                pid,
                pcb.name(),
                freed
            );
            self.record(TraceEvent::Retired { pid });
        }
        if self.processes.is_empty() {
            self.policy = None;
        }
    }

    fn retire_all(&mut self) {
        let pids: Vec<Pid> = self.processes.keys().copied().collect();
        for pid in pids {
            self.retire(pid);
        }
    }
}
