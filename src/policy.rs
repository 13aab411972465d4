use std::{fmt, str::FromStr};

use log::warn;
use memory::Pid;

use crate::{pcb::ProcessTable, ready_queue::ReadyQueue, scheduler::AdmissionError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Policy {
    /// First come, first served. Runs each program to completion.
    Fcfs,
    /// Shortest job first, by line count at admission.
    Sjf,
    /// Round robin, two instructions per turn.
    Rr,
    /// Round robin, thirty instructions per turn.
    Rr30,
    /// One instruction per turn; waiting programs gain priority.
    Aging,
}

impl Policy {
    pub const ALL: [Policy; 5] = [
        Policy::Fcfs,
        Policy::Sjf,
        Policy::Rr,
        Policy::Rr30,
        Policy::Aging,
    ];

    /// Instructions per turn. `None` runs until the program ends or faults.
    pub fn quantum(self) -> Option<usize> {
        match self {
            Policy::Fcfs | Policy::Sjf => None,
            Policy::Rr => Some(2),
            Policy::Rr30 => Some(30),
            Policy::Aging => Some(1),
        }
    }

    pub fn ages(self) -> bool {
        self == Policy::Aging
    }

    /// Puts `pid` on the queue the way this policy orders it. A process that
    /// has never been queued is being admitted; otherwise it is returning
    /// from a turn that did not finish it.
    pub fn enqueue(self, queue: &mut ReadyQueue, pid: Pid, processes: &ProcessTable) {
        let Some(pcb) = processes.get(&pid) else {
            warn!("Process {} vanished before it could be queued", pid);
            return;
        };
        match self {
            Policy::Fcfs | Policy::Rr | Policy::Rr30 => queue.enqueue_tail(pid),
            Policy::Sjf => queue.enqueue_sorted(pid, processes),
            Policy::Aging if !pcb.is_admitted() => queue.enqueue_by_score(pid, processes),
            Policy::Aging => {
                let head_score = queue
                    .head()
                    .and_then(|head| processes.get(&head))
                    .map(|head| head.job_score());
                // keeps the turn unless someone now scores strictly lower
                match head_score {
                    Some(score) if score >= pcb.job_score() => queue.enqueue_head(pid),
                    _ => queue.enqueue_sorted(pid, processes),
                }
            }
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Policy::Fcfs => "FCFS",
            Policy::Sjf => "SJF",
            Policy::Rr => "RR",
            Policy::Rr30 => "RR30",
            Policy::Aging => "AGING",
        };
        f.write_str(name)
    }
}

impl FromStr for Policy {
    type Err = AdmissionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Policy::ALL
            .into_iter()
            .find(|policy| policy.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| AdmissionError::UnknownPolicy(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::{fs::remove_file, io::Write};

    use disk::Disk;

    use super::*;
    use crate::pcb::{Pcb, ProcessTable};

    fn table(jobs: &[(usize, &str, usize)]) -> ProcessTable {
        let mut processes = ProcessTable::new();
        for &(pid, name, lines) in jobs {
            let mut file = std::fs::File::create(name).unwrap();
            for i in 0..lines {
                writeln!(file, "echo {}", i).unwrap();
            }
            let script = Disk::default().open(name).unwrap();
            remove_file(name).unwrap();
            let mut pcb = Pcb::new(Pid(pid), script, 3);
            pcb.mark_admitted();
            processes.insert(Pid(pid), pcb);
        }
        processes
    }

    #[test]
    fn aging_requeue_keeps_head_on_tie() {
        // "a" would sort first by name, the tie still goes to the runner
        let processes = table(&[(1, "policy_tie_b", 2), (2, "policy_tie_a", 2)]);
        let mut queue = ReadyQueue::new();
        queue.enqueue_tail(Pid(2));
        Policy::Aging.enqueue(&mut queue, Pid(1), &processes);
        assert_eq!(queue.iter().collect::<Vec<_>>(), vec![Pid(1), Pid(2)]);
    }

    #[test]
    fn aging_requeue_yields_to_lower_score() {
        let processes = table(&[(1, "policy_yield_a", 3), (2, "policy_yield_b", 2)]);
        let mut queue = ReadyQueue::new();
        queue.enqueue_tail(Pid(2));
        Policy::Aging.enqueue(&mut queue, Pid(1), &processes);
        assert_eq!(queue.iter().collect::<Vec<_>>(), vec![Pid(2), Pid(1)]);
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("fcfs".parse::<Policy>().unwrap(), Policy::Fcfs);
        assert_eq!("Rr30".parse::<Policy>().unwrap(), Policy::Rr30);
        assert_eq!("AGING".parse::<Policy>().unwrap(), Policy::Aging);
    }

    #[test]
    fn parse_unknown() {
        assert_eq!(
            "LIFO".parse::<Policy>(),
            Err(AdmissionError::UnknownPolicy("LIFO".to_string()))
        );
    }

    #[test]
    fn quanta() {
        assert_eq!(Policy::Fcfs.quantum(), None);
        assert_eq!(Policy::Sjf.quantum(), None);
        assert_eq!(Policy::Rr.quantum(), Some(2));
        assert_eq!(Policy::Rr30.quantum(), Some(30));
        assert_eq!(Policy::Aging.quantum(), Some(1));
    }

    #[test]
    fn display_round_trips() {
        for policy in Policy::ALL {
            assert_eq!(policy.to_string().parse::<Policy>().unwrap(), policy);
        }
    }
}
