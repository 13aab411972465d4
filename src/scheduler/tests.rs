use std::{
    collections::HashMap,
    fs::{remove_file, File},
    io::Write,
};

use rand::Rng;

use super::*;
use crate::pcb::PageTableEntry;

#[derive(Default)]
struct Recorder {
    lines: Vec<String>,
    faults: Vec<PageFault>,
}

impl<const F: usize, const C: usize> Dispatcher<F, C> for Recorder {
    fn dispatch(&mut self, line: &str, _scheduler: &mut Scheduler<F, C>) -> Flow {
        self.lines.push(line.to_string());
        if line == "quit" {
            Flow::Quit
        } else {
            Flow::Continue
        }
    }

    fn page_fault(&mut self, fault: &PageFault) {
        self.faults.push(fault.clone());
    }
}

/// Admits the script named after `spawn ` into the running batch.
#[derive(Default)]
struct Spawner {
    lines: Vec<String>,
    rejected: Vec<AdmissionError>,
}

impl<const F: usize, const C: usize> Dispatcher<F, C> for Spawner {
    fn dispatch(&mut self, line: &str, scheduler: &mut Scheduler<F, C>) -> Flow {
        self.lines.push(line.to_string());
        if let Some(name) = line.strip_prefix("spawn ") {
            if let Err(e) = scheduler.admit(&[name], Policy::Sjf, None) {
                self.rejected.push(e);
            }
        }
        Flow::Continue
    }
}

fn write_script(name: &str, lines: usize) {
    let mut file = File::create(name).unwrap();
    for i in 0..lines {
        writeln!(file, "{} {}", name, i).unwrap();
    }
}

fn write_lines(name: &str, lines: &[&str]) {
    let mut file = File::create(name).unwrap();
    for line in lines {
        writeln!(file, "{}", line).unwrap();
    }
}

fn traced<const F: usize, const C: usize>() -> Scheduler<F, C> {
    Scheduler::new(Config::default().with_trace(true))
}

fn retired(trace: &[TraceEvent]) -> Vec<Pid> {
    trace
        .iter()
        .filter_map(|event| match event {
            TraceEvent::Retired { pid } => Some(*pid),
            _ => None,
        })
        .collect()
}

fn executed_by(trace: &[TraceEvent]) -> Vec<Pid> {
    trace
        .iter()
        .filter_map(|event| match event {
            TraceEvent::Executed { pid, .. } => Some(*pid),
            _ => None,
        })
        .collect()
}

#[test]
fn sjf_runs_shortest_first() {
    write_script("sched_sjf_a", 5);
    write_script("sched_sjf_b", 2);
    write_script("sched_sjf_c", 8);
    let mut scheduler = traced::<3, 18>();
    let admission = scheduler
        .admit(&["sched_sjf_a", "sched_sjf_b", "sched_sjf_c"], Policy::Sjf, None)
        .unwrap();
    assert_eq!(admission.admitted, vec![Pid(1), Pid(2), Pid(3)]);
    let order: Vec<Pid> = scheduler.queue().iter().collect();
    assert_eq!(order, vec![Pid(2), Pid(1), Pid(3)]);

    let mut recorder = Recorder::default();
    assert_eq!(scheduler.run_to_quiescence(&mut recorder).unwrap(), Flow::Continue);
    let trace = scheduler.take_trace();
    assert_eq!(retired(&trace), vec![Pid(2), Pid(1), Pid(3)]);
    assert_eq!(recorder.lines.len(), 15);
    assert_eq!(recorder.lines[0], "sched_sjf_b 0");
    assert_eq!(scheduler.store().occupied_slots(), 0);
    assert_eq!(scheduler.processes().count(), 0);

    remove_file("sched_sjf_a").unwrap();
    remove_file("sched_sjf_b").unwrap();
    remove_file("sched_sjf_c").unwrap();
}

#[test]
fn rr_splits_five_lines_into_three_turns() {
    write_script("sched_rr_five", 5);
    let mut scheduler = traced::<3, 18>();
    scheduler.admit(&["sched_rr_five"], Policy::Rr, None).unwrap();
    let mut recorder = Recorder::default();

    let mut turns = Vec::new();
    while let Some(report) = scheduler.step(&mut recorder).unwrap() {
        turns.push((report.executed, scheduler.queue_len()));
    }
    assert_eq!(turns, vec![(2, 1), (2, 1), (1, 0)]);
    assert!(recorder.faults.is_empty());
    assert_eq!(scheduler.store().occupied_slots(), 0);

    remove_file("sched_rr_five").unwrap();
}

#[test]
fn fcfs_keeps_arrival_order() {
    write_script("sched_fcfs_a", 4);
    write_script("sched_fcfs_b", 1);
    let mut scheduler = traced::<3, 18>();
    scheduler
        .admit(&["sched_fcfs_a", "sched_fcfs_b"], Policy::Fcfs, None)
        .unwrap();
    let mut recorder = Recorder::default();
    scheduler.run_to_quiescence(&mut recorder).unwrap();
    assert_eq!(
        recorder.lines,
        vec![
            "sched_fcfs_a 0",
            "sched_fcfs_a 1",
            "sched_fcfs_a 2",
            "sched_fcfs_a 3",
            "sched_fcfs_b 0"
        ]
    );
    assert_eq!(retired(&scheduler.take_trace()), vec![Pid(1), Pid(2)]);

    remove_file("sched_fcfs_a").unwrap();
    remove_file("sched_fcfs_b").unwrap();
}

#[test]
fn aging_lets_late_short_job_through() {
    write_script("sched_aging_p1", 10);
    write_script("sched_aging_p2", 10);
    write_script("sched_aging_p3", 3);
    let mut scheduler = traced::<3, 18>();
    scheduler
        .admit(&["sched_aging_p1", "sched_aging_p2"], Policy::Aging, None)
        .unwrap();
    let mut recorder = Recorder::default();
    for _ in 0..4 {
        scheduler.step(&mut recorder).unwrap();
    }
    assert_eq!(
        executed_by(&scheduler.take_trace()),
        vec![Pid(1), Pid(2), Pid(2), Pid(1)]
    );
    assert_eq!(scheduler.process(Pid(1)).unwrap().job_score(), 8);
    assert_eq!(scheduler.process(Pid(2)).unwrap().job_score(), 8);

    // joins the batch while it is still in progress
    scheduler
        .admit(&["sched_aging_p3"], Policy::Fcfs, None)
        .unwrap();
    assert_eq!(scheduler.queue().head(), Some(Pid(3)));
    let report = scheduler.step(&mut recorder).unwrap().unwrap();
    assert_eq!(report.pid, Pid(3));
    assert_eq!(report.outcome, TurnOutcome::Requeued);
    let p3 = scheduler.process(Pid(3)).unwrap().job_score();
    assert!(p3 < scheduler.process(Pid(1)).unwrap().job_score());
    assert!(p3 < scheduler.process(Pid(2)).unwrap().job_score());
    assert_eq!(scheduler.queue().head(), Some(Pid(3)));
    while scheduler.step(&mut recorder).unwrap().is_some() {}

    let trace = scheduler.take_trace();
    let order = retired(&trace);
    assert_eq!(order.len(), 3);
    assert_eq!(order[0], Pid(3));
    assert_eq!(recorder.lines.len(), 23);
    assert_eq!(scheduler.store().occupied_slots(), 0);

    remove_file("sched_aging_p1").unwrap();
    remove_file("sched_aging_p2").unwrap();
    remove_file("sched_aging_p3").unwrap();
}

#[test]
fn aging_admission_puts_ties_behind() {
    write_script("sched_tie_z", 3);
    write_script("sched_tie_a", 3);
    write_script("sched_tie_m", 2);
    let mut scheduler = traced::<3, 18>();
    scheduler
        .admit(&["sched_tie_z", "sched_tie_a", "sched_tie_m"], Policy::Aging, None)
        .unwrap();
    let order: Vec<Pid> = scheduler.queue().iter().collect();
    assert_eq!(order, vec![Pid(3), Pid(1), Pid(2)]);
    scheduler.run_to_quiescence(&mut Recorder::default()).unwrap();

    remove_file("sched_tie_z").unwrap();
    remove_file("sched_tie_a").unwrap();
    remove_file("sched_tie_m").unwrap();
}

#[test]
fn page_in_twice_reads_once() {
    write_script("sched_page_twice", 9);
    let mut scheduler =
        Scheduler::<3, 18>::new(Config::default().with_prefetch_pages(1));
    let admission = scheduler.admit(&["sched_page_twice"], Policy::Fcfs, None).unwrap();
    let pid = admission.admitted[0];
    assert_eq!(scheduler.disk().page_reads(), 1);

    let frame = match scheduler.page_in(pid, 1).unwrap() {
        PageIn::Loaded {
            frame,
            victim: None,
        } => frame,
        other => panic!("expected a fresh load, got {:?}", other),
    };
    let reads = scheduler.disk().page_reads();
    assert_eq!(scheduler.page_in(pid, 1).unwrap(), PageIn::Resident(frame));
    assert_eq!(scheduler.disk().page_reads(), reads);

    scheduler.run_to_quiescence(&mut Recorder::default()).unwrap();
    remove_file("sched_page_twice").unwrap();
}

#[test]
fn fault_evicts_least_recently_touched() {
    write_script("sched_lru_a", 6);
    write_script("sched_lru_b", 3);
    // two frames
    let mut scheduler = Scheduler::<3, 6>::new(Config::default().with_prefetch_pages(1));
    scheduler
        .admit(&["sched_lru_a", "sched_lru_b"], Policy::Fcfs, None)
        .unwrap();
    let (a, b) = (Pid(1), Pid(2));
    assert_eq!(scheduler.process(a).unwrap().page_table().get_frame(0), Some(0));
    assert_eq!(scheduler.process(b).unwrap().page_table().get_frame(0), Some(1));

    // touching a's frame leaves b's as the oldest
    assert_eq!(
        scheduler.next_instruction(a).unwrap(),
        Fetch::Instruction("sched_lru_a 0".to_string())
    );
    match scheduler.page_in(a, 1).unwrap() {
        PageIn::Loaded {
            frame,
            victim: Some(victim),
        } => {
            assert_eq!(frame, 1);
            assert_eq!(victim.owner, Some(b));
            assert_eq!(victim.lines[0], "sched_lru_b 0");
        }
        other => panic!("expected an eviction, got {:?}", other),
    }
    assert_eq!(
        scheduler.process(b).unwrap().page_table().get(0),
        Some(PageTableEntry::NotLoaded)
    );
    assert_eq!(scheduler.process(a).unwrap().page_table().get_frame(1), Some(1));

    let mut recorder = Recorder::default();
    scheduler.run_to_quiescence(&mut recorder).unwrap();
    assert_eq!(recorder.lines.len(), 8);
    assert_eq!(recorder.lines.last().unwrap(), "sched_lru_b 2");
    assert_eq!(scheduler.store().occupied_slots(), 0);

    remove_file("sched_lru_a").unwrap();
    remove_file("sched_lru_b").unwrap();
}

#[test]
fn admission_reports_its_evictions() {
    write_script("sched_admit_evict_a", 6);
    write_script("sched_admit_evict_b", 6);
    let mut scheduler = Scheduler::<3, 6>::new(Config::default());
    let first = scheduler.admit(&["sched_admit_evict_a"], Policy::Fcfs, None).unwrap();
    assert!(first.evictions.is_empty());
    assert_eq!(scheduler.store().find_free_frame(), None);

    let second = scheduler.admit(&["sched_admit_evict_b"], Policy::Fcfs, None).unwrap();
    // only page 0 may push anything out
    assert_eq!(second.evictions.len(), 1);
    assert_eq!(second.evictions[0].owner, Some(Pid(1)));
    assert_eq!(second.evictions[0].lines[0], "sched_admit_evict_a 0");
    let b = scheduler.process(Pid(2)).unwrap();
    assert_eq!(b.page_table().get_frame(0), Some(0));
    assert_eq!(b.page_table().get(1), Some(PageTableEntry::NotLoaded));
    assert_eq!(scheduler.process(Pid(1)).unwrap().page_table().get_frame(1), Some(1));

    scheduler.run_to_quiescence(&mut Recorder::default()).unwrap();
    remove_file("sched_admit_evict_a").unwrap();
    remove_file("sched_admit_evict_b").unwrap();
}

#[test]
fn page_past_the_end_evicts_nothing() {
    write_script("sched_past_end", 3);
    // one frame, already holding page 0
    let mut scheduler = Scheduler::<3, 3>::new(Config::default());
    let pid = scheduler.admit(&["sched_past_end"], Policy::Fcfs, None).unwrap().admitted[0];
    let reads = scheduler.disk().page_reads();

    assert_eq!(
        scheduler.page_in(pid, 5),
        Err(SchedulerError::NoSuchPage { pid, page: 5 })
    );
    assert_eq!(scheduler.process(pid).unwrap().page_table().get_frame(0), Some(0));
    assert_eq!(scheduler.store().occupied_slots(), 3);
    assert_eq!(scheduler.disk().page_reads(), reads);

    scheduler.run_to_quiescence(&mut Recorder::default()).unwrap();
    remove_file("sched_past_end").unwrap();
}

#[test]
fn fault_consumes_the_turn() {
    write_script("sched_fault_turn", 4);
    let mut scheduler = Scheduler::<3, 18>::new(Config::default().with_prefetch_pages(1));
    scheduler
        .admit(&["sched_fault_turn"], Policy::Fcfs, None)
        .unwrap();
    let mut recorder = Recorder::default();

    let first = scheduler.step(&mut recorder).unwrap().unwrap();
    assert_eq!(first.executed, 3);
    assert_eq!(first.outcome, TurnOutcome::Faulted);
    assert_eq!(scheduler.queue_len(), 1);
    assert_eq!(recorder.faults.len(), 1);
    assert_eq!(recorder.faults[0].page, 1);
    assert!(recorder.faults[0].victim.is_none());

    let second = scheduler.step(&mut recorder).unwrap().unwrap();
    assert_eq!(second.executed, 1);
    assert_eq!(second.outcome, TurnOutcome::Retired);
    assert_eq!(recorder.lines.last().unwrap(), "sched_fault_turn 3");

    remove_file("sched_fault_turn").unwrap();
}

#[test]
fn unreadable_page_is_skipped() {
    write_script("sched_gone", 6);
    let mut scheduler = Scheduler::<3, 18>::new(Config::default().with_prefetch_pages(1));
    scheduler.admit(&["sched_gone"], Policy::Fcfs, None).unwrap();
    remove_file("sched_gone").unwrap();

    let mut recorder = Recorder::default();
    scheduler.run_to_quiescence(&mut recorder).unwrap();
    assert_eq!(recorder.lines.len(), 3);
    assert_eq!(recorder.faults.len(), 1);
    assert!(recorder.faults[0].error.is_some());
    assert_eq!(scheduler.store().occupied_slots(), 0);
}

#[test]
fn batch_runs_before_scripts() {
    write_script("sched_batch_main", 2);
    let mut scheduler = traced::<3, 18>();
    let batch = vec!["echo first".to_string(), "echo second".to_string()];
    let admission = scheduler
        .admit(&["sched_batch_main"], Policy::Sjf, Some(&batch))
        .unwrap();
    assert_eq!(admission.admitted.len(), 2);
    let spool = scheduler
        .processes()
        .find(|pcb| pcb.script().is_spooled())
        .map(|pcb| pcb.script().path().to_path_buf())
        .unwrap();
    assert!(spool.exists());

    let mut recorder = Recorder::default();
    scheduler.run_to_quiescence(&mut recorder).unwrap();
    assert_eq!(
        recorder.lines,
        vec!["echo first", "echo second", "sched_batch_main 0", "sched_batch_main 1"]
    );
    assert!(!spool.exists());

    remove_file("sched_batch_main").unwrap();
}

#[test]
fn rejected_requests_leave_no_state() {
    write_script("sched_reject_a", 2);
    let mut scheduler = traced::<3, 18>();

    assert_eq!(
        scheduler.admit(&["sched_reject_a", "sched_reject_a"], Policy::Fcfs, None),
        Err(AdmissionError::DuplicateScript("sched_reject_a".to_string()))
    );
    assert!(matches!(
        scheduler.admit(&["sched_reject_a", "sched_reject_missing"], Policy::Fcfs, None),
        Err(AdmissionError::ScriptUnavailable { .. })
    ));
    assert_eq!(
        scheduler.admit(&["a", "b", "c", "d"], Policy::Fcfs, None),
        Err(AdmissionError::TooManyScripts(4))
    );
    assert_eq!(
        scheduler.admit(&[], Policy::Fcfs, None),
        Err(AdmissionError::NoScripts)
    );
    assert_eq!(scheduler.processes().count(), 0);
    assert_eq!(scheduler.queue_len(), 0);
    assert_eq!(scheduler.policy(), None);
    assert_eq!(scheduler.store().occupied_slots(), 0);
    assert!(scheduler.take_trace().is_empty());

    remove_file("sched_reject_a").unwrap();
}

#[test]
fn live_name_counts_as_duplicate() {
    write_script("sched_live_dup", 2);
    let mut scheduler = traced::<3, 18>();
    scheduler.admit(&["sched_live_dup"], Policy::Rr, None).unwrap();
    assert_eq!(
        scheduler.admit(&["sched_live_dup"], Policy::Rr, None),
        Err(AdmissionError::DuplicateScript("sched_live_dup".to_string()))
    );
    assert_eq!(scheduler.processes().count(), 1);
    scheduler.run_to_quiescence(&mut Recorder::default()).unwrap();

    remove_file("sched_live_dup").unwrap();
}

#[test]
fn no_frames_rejects_program() {
    write_script("sched_no_frames", 2);
    let mut scheduler = Scheduler::<3, 2>::new(Config::default());
    let admission = scheduler.admit(&["sched_no_frames"], Policy::Fcfs, None).unwrap();
    assert!(admission.admitted.is_empty());
    assert_eq!(
        admission.rejected,
        vec![(
            "sched_no_frames".to_string(),
            SchedulerError::ResourceExhausted {
                name: "sched_no_frames".to_string()
            }
        )]
    );
    assert_eq!(scheduler.processes().count(), 0);
    assert_eq!(scheduler.policy(), None);

    remove_file("sched_no_frames").unwrap();
}

#[test]
fn quit_stops_the_run() {
    write_lines("sched_quit_a", &["one", "quit", "never"]);
    write_script("sched_quit_b", 2);
    let mut scheduler = traced::<3, 18>();
    scheduler
        .admit(&["sched_quit_a", "sched_quit_b"], Policy::Fcfs, None)
        .unwrap();
    let mut recorder = Recorder::default();
    assert_eq!(scheduler.run_to_quiescence(&mut recorder).unwrap(), Flow::Quit);
    assert_eq!(recorder.lines, vec!["one", "quit"]);
    assert_eq!(scheduler.processes().count(), 0);
    assert_eq!(scheduler.store().occupied_slots(), 0);
    assert!(!scheduler.is_running());
    let mut trace = retired(&scheduler.take_trace());
    trace.sort();
    assert_eq!(trace, vec![Pid(1), Pid(2)]);

    remove_file("sched_quit_a").unwrap();
    remove_file("sched_quit_b").unwrap();
}

#[test]
fn nested_admission_joins_the_run() {
    write_lines("sched_nest_outer", &["spawn sched_nest_inner", "after", "spawn sched_nest_outer"]);
    write_script("sched_nest_inner", 2);
    let mut scheduler = traced::<3, 18>();
    scheduler.admit(&["sched_nest_outer"], Policy::Rr, None).unwrap();
    let mut spawner = Spawner::default();
    scheduler.run_to_quiescence(&mut spawner).unwrap();

    assert_eq!(
        spawner.lines,
        vec![
            "spawn sched_nest_inner",
            "after",
            "sched_nest_inner 0",
            "sched_nest_inner 1",
            "spawn sched_nest_outer"
        ]
    );
    assert_eq!(
        spawner.rejected,
        vec![AdmissionError::DuplicateScript("sched_nest_outer".to_string())]
    );
    assert_eq!(retired(&scheduler.take_trace()).len(), 2);
    assert_eq!(scheduler.policy(), None);

    remove_file("sched_nest_outer").unwrap();
    remove_file("sched_nest_inner").unwrap();
}

#[test]
fn every_process_retires_once() {
    let mut rng = rand::thread_rng();
    for round in 0..20 {
        let names: Vec<String> = (0..3).map(|i| format!("sched_rand_{}_{}", round, i)).collect();
        let sizes: Vec<usize> = (0..3).map(|_| rng.gen_range(0..=12)).collect();
        for (name, &size) in names.iter().zip(&sizes) {
            write_script(name, size);
        }
        let policy = Policy::ALL[rng.gen_range(0..Policy::ALL.len())];
        let mut scheduler = traced::<3, 36>();
        let scripts: Vec<&str> = names.iter().map(|name| name.as_str()).collect();
        let admission = scheduler.admit(&scripts, policy, None).unwrap();
        assert_eq!(admission.admitted.len(), 3);

        let mut recorder = Recorder::default();
        scheduler.run_to_quiescence(&mut recorder).unwrap();

        let mut counts: HashMap<Pid, usize> = HashMap::new();
        for pid in retired(&scheduler.take_trace()) {
            *counts.entry(pid).or_default() += 1;
        }
        assert_eq!(counts.len(), 3, "{} with sizes {:?}", policy, sizes);
        assert!(counts.values().all(|&n| n == 1));
        assert_eq!(scheduler.store().occupied_slots(), 0);

        // each program's own lines come out in order
        for (name, &size) in names.iter().zip(&sizes) {
            let mine: Vec<&String> = recorder
                .lines
                .iter()
                .filter(|line| line.rsplit_once(' ').map(|(n, _)| n) == Some(name.as_str()))
                .collect();
            let expected: Vec<String> = (0..size).map(|i| format!("{} {}", name, i)).collect();
            assert_eq!(mine, expected.iter().collect::<Vec<_>>(), "{}", policy);
            remove_file(name).unwrap();
        }
    }
}
