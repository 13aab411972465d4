use std::{env, io, process::ExitCode};

use cursive_table_view::{TableView, TableViewItem};
use log::info;
use paged_shell::{
    repl::REPL, Config, Interpreter, Pid, Policy, Scheduler, TraceEvent, FRAME_SIZE,
    FRAME_STORE_SIZE,
};

use cursive::{
    view::{Nameable, Resizable, Scrollable},
    views::{Dialog, LinearLayout, TextView},
};

#[derive(Debug, Hash, PartialEq, Eq, Clone, Copy)]
enum TraceColumn {
    Step,
    Pid,
    Event,
    Detail,
}

#[derive(Debug, Clone)]
struct TraceRow {
    step: usize,
    pid: Pid,
    event: &'static str,
    detail: String,
}

impl TraceRow {
    fn new(step: usize, event: TraceEvent) -> Self {
        let (pid, event, detail) = match event {
            TraceEvent::Admitted {
                pid,
                name,
                job_score,
            } => (pid, "admitted", format!("{} ({} lines)", name, job_score)),
            TraceEvent::Executed { pid, line } => (pid, "executed", line),
            TraceEvent::PageFault {
                pid,
                page,
                frame,
                victim,
            } => {
                let frame = frame.map_or("-".to_string(), |f| f.to_string());
                let victim = victim.map_or("none".to_string(), |v| v.to_string());
                (
                    pid,
                    "page fault",
                    format!("page {} -> frame {}, victim {}", page, frame, victim),
                )
            }
            TraceEvent::Requeued { pid, job_score } => {
                (pid, "requeued", format!("score {}", job_score))
            }
            TraceEvent::Retired { pid } => (pid, "retired", String::new()),
        };
        Self {
            step,
            pid,
            event,
            detail,
        }
    }
}

impl TableViewItem<TraceColumn> for TraceRow {
    fn to_column(&self, column: TraceColumn) -> String {
        match column {
            TraceColumn::Step => self.step.to_string(),
            TraceColumn::Pid => self.pid.to_string(),
            TraceColumn::Event => self.event.to_string(),
            TraceColumn::Detail => self.detail.clone(),
        }
    }

    fn cmp(&self, other: &Self, column: TraceColumn) -> std::cmp::Ordering
    where
        Self: Sized,
    {
        match column {
            TraceColumn::Pid => self.pid.cmp(&other.pid),
            TraceColumn::Event => self.event.cmp(other.event),
            TraceColumn::Detail => self.detail.cmp(&other.detail),
            TraceColumn::Step => self.step.cmp(&other.step),
        }
    }
}

fn make_table(rows: Vec<TraceRow>) -> TableView<TraceRow, TraceColumn> {
    let mut table = TableView::<TraceRow, TraceColumn>::new()
        .column(TraceColumn::Step, "Step", |c| c.width(6))
        .column(TraceColumn::Pid, "Pid", |c| c.width(5))
        .column(TraceColumn::Event, "Event", |c| c.width(12))
        .column(TraceColumn::Detail, "Detail", |c| c);
    table.set_items(rows);
    table
}

struct Run {
    rows: Vec<TraceRow>,
    output: String,
    summary: String,
}

fn run_batch(policy: Policy, scripts: &[&str]) -> Result<Run, String> {
    let mut scheduler =
        Scheduler::<FRAME_SIZE, FRAME_STORE_SIZE>::new(Config::default().with_trace(true));
    let mut interpreter = Interpreter::new(REPL::from_reader(io::empty()), Vec::new());

    let admission = scheduler
        .admit(scripts, policy, None)
        .map_err(|e| e.to_string())?;
    for (name, e) in &admission.rejected {
        info!("{} not admitted: {}", name, e);
    }
    scheduler
        .run_to_quiescence(&mut interpreter)
        .map_err(|e| e.to_string())?;

    let rows: Vec<TraceRow> = scheduler
        .take_trace()
        .into_iter()
        .enumerate()
        .map(|(step, event)| TraceRow::new(step, event))
        .collect();
    let faults = rows.iter().filter(|row| row.event == "page fault").count();
    let summary = format!(
        "{}: {} events, {} page faults, {} page reads, {}/{} slots occupied after the run",
        policy,
        rows.len(),
        faults,
        scheduler.disk().page_reads(),
        scheduler.store().occupied_slots(),
        FRAME_STORE_SIZE
    );
    Ok(Run {
        rows,
        output: String::from_utf8_lossy(&interpreter.into_output()).into_owned(),
        summary,
    })
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();
    let Some((policy, scripts)) = args.split_first() else {
        eprintln!("usage: simple_ui POLICY SCRIPT...");
        return ExitCode::from(2);
    };
    let policy = match policy.parse::<Policy>() {
        Ok(policy) => policy,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::from(2);
        }
    };
    let scripts: Vec<&str> = scripts.iter().map(|s| s.as_str()).collect();
    let run = match run_batch(policy, &scripts) {
        Ok(run) => run,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut siv = cursive::default();
    siv.add_global_callback('q', |s| s.quit());

    let output = run.output;
    let layout = LinearLayout::vertical()
        .child(TextView::new(run.summary))
        .child(make_table(run.rows).with_name("trace").min_size((80, 20)));
    siv.add_layer(
        Dialog::around(layout)
            .title("Scheduler trace")
            .button("Output", move |s| {
                s.add_layer(
                    Dialog::around(TextView::new(output.clone()).scrollable())
                        .title("Program output")
                        .dismiss_button("Back"),
                );
            })
            .button("Quit", |s| s.quit()),
    );
    siv.run();
    ExitCode::SUCCESS
}
