use std::{fmt, io::{self, Write}};

use log::{debug, error, warn};
use memory::{Eviction, VarStore};

use crate::{
    commands,
    policy::Policy,
    repl::REPL,
    scheduler::{AdmissionError, Dispatcher, Flow, PageFault, Scheduler, SchedulerError},
    MAX_ARGS_SIZE, MAX_USER_INPUT, VAR_MEM_SIZE,
};

const HELP: &str = "COMMAND\t\t\tDESCRIPTION
help\t\t\tDisplays all the commands
quit\t\t\tExits / terminates the shell with \"Bye!\"
set VAR STRING\t\tAssigns a value to shell memory
print VAR\t\tDisplays the STRING assigned to VAR
source SCRIPT.TXT\tExecutes the file SCRIPT.TXT
echo STRING\t\tDisplays STRING, or the value of $VAR
exec P1 [P2 [P3]] POLICY [#]\tRuns up to three scripts under FCFS, SJF, RR, RR30 or AGING
my_ls\t\t\tLists the current directory
my_mkdir DIR\t\tCreates directory DIR
my_touch FILE\t\tCreates an empty FILE
my_cd DIR\t\tChanges into DIR
run CMD ARGS\t\tRuns a host program";

#[derive(Debug)]
pub enum ShellError {
    UnknownCommand,
    FileNotFound,
    BadMkdir,
    BadCd,
    Admission(AdmissionError),
    Scheduler(SchedulerError),
    Run { program: String, kind: io::ErrorKind },
    Io(io::Error),
}

impl ShellError {
    /// Status code the command finished with.
    pub fn status(&self) -> i32 {
        match self {
            ShellError::FileNotFound
            | ShellError::Admission(AdmissionError::ScriptUnavailable { .. }) => 3,
            _ => 1,
        }
    }
}

impl fmt::Display for ShellError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShellError::UnknownCommand => write!(f, "Unknown Command"),
            ShellError::FileNotFound
            | ShellError::Admission(AdmissionError::ScriptUnavailable { .. }) => {
                write!(f, "Bad command: File not found")
            }
            ShellError::BadMkdir => write!(f, "Bad command: my_mkdir"),
            ShellError::BadCd => write!(f, "Bad command: my_cd"),
            ShellError::Admission(e) => write!(f, "Bad command: {}", e),
            ShellError::Scheduler(e) => write!(f, "Error: {}", e),
            ShellError::Run { program, kind } => {
                write!(f, "Bad command: run {}: {}", program, io::Error::from(*kind))
            }
            ShellError::Io(e) => write!(f, "Error: {}", e),
        }
    }
}

impl std::error::Error for ShellError {}

impl From<io::Error> for ShellError {
    fn from(e: io::Error) -> Self {
        ShellError::Io(e)
    }
}

impl From<AdmissionError> for ShellError {
    fn from(e: AdmissionError) -> Self {
        ShellError::Admission(e)
    }
}

impl From<SchedulerError> for ShellError {
    fn from(e: SchedulerError) -> Self {
        ShellError::Scheduler(e)
    }
}

/// Runs shell commands, typed or fetched from a scheduled program.
pub struct Interpreter<W: Write> {
    vars: VarStore<VAR_MEM_SIZE>,
    repl: REPL,
    out: W,
}

impl<W: Write> Interpreter<W> {
    pub fn new(repl: REPL, out: W) -> Self {
        Self {
            vars: VarStore::init(),
            repl,
            out,
        }
    }

    pub fn vars(&self) -> &VarStore<VAR_MEM_SIZE> {
        &self.vars
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    pub fn into_output(self) -> W {
        self.out
    }

    fn emit(&mut self, text: &str) {
        if let Err(e) = writeln!(self.out, "{}", text) {
            error!("Could not write output: {}", e);
        }
    }

    /// Reads and runs lines until end of input or `quit`.
    pub fn run_shell<const FRAME_SIZE: usize, const CAPACITY: usize>(
        &mut self,
        scheduler: &mut Scheduler<FRAME_SIZE, CAPACITY>,
    ) -> Result<(), io::Error> {
        writeln!(
            self.out,
            "Frame Store Size = {}; Variable Store Size = {}",
            CAPACITY, VAR_MEM_SIZE
        )?;
        loop {
            if self.repl.is_interactive() {
                write!(self.out, "$ ")?;
                self.out.flush()?;
            }
            let Some(line) = self.repl.read_line()? else {
                break;
            };
            if self.parse_input(&line, scheduler) == Flow::Quit {
                break;
            }
        }
        self.out.flush()
    }

    /// Runs each `;`-separated command of `line` in order. Failures are
    /// printed and do not stop the rest of the chain.
    pub fn parse_input<const FRAME_SIZE: usize, const CAPACITY: usize>(
        &mut self,
        line: &str,
        scheduler: &mut Scheduler<FRAME_SIZE, CAPACITY>,
    ) -> Flow {
        let line = match line.char_indices().nth(MAX_USER_INPUT) {
            Some((end, _)) => &line[..end],
            None => line,
        };
        for command in line.split(';') {
            let words: Vec<&str> = command.split_whitespace().collect();
            if words.is_empty() {
                continue;
            }
            match self.interpret(&words, scheduler) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Quit) => return Flow::Quit,
                Err(e) => {
                    debug!("{:?} failed with status {}: {:?}", words, e.status(), e);
                    self.emit(&e.to_string());
                }
            }
        }
        Flow::Continue
    }

    pub fn interpret<const FRAME_SIZE: usize, const CAPACITY: usize>(
        &mut self,
        words: &[&str],
        scheduler: &mut Scheduler<FRAME_SIZE, CAPACITY>,
    ) -> Result<Flow, ShellError> {
        if words.is_empty() || words.len() > MAX_ARGS_SIZE {
            return Err(ShellError::UnknownCommand);
        }
        let args = &words[1..];
        match (words[0], args.len()) {
            ("help", 0) => self.emit(HELP),
            ("quit", 0) => {
                self.emit("Bye!");
                return Ok(Flow::Quit);
            }
            ("set", n) if n >= 2 => {
                if let Err(e) = self.vars.set(args[0], &args[1..].join(" ")) {
                    warn!("set {}: {}", args[0], e);
                }
            }
            ("print", 1) => {
                let value = self
                    .vars
                    .get(args[0])
                    .unwrap_or("Variable does not exist")
                    .to_string();
                self.emit(&value);
            }
            ("echo", 1) => {
                let text = match args[0].strip_prefix('$') {
                    Some(var) => self.vars.get(var).unwrap_or("").to_string(),
                    None => args[0].to_string(),
                };
                self.emit(&text);
            }
            ("source", 1) => return self.exec(&[args[0]], Policy::Fcfs, false, scheduler),
            ("exec", 2..) => {
                let (args, background) = match args.split_last() {
                    Some((&"#", rest)) => (rest, true),
                    _ => (args, false),
                };
                let Some((policy, scripts)) = args.split_last() else {
                    return Err(ShellError::UnknownCommand);
                };
                if scripts.is_empty() {
                    return Err(ShellError::UnknownCommand);
                }
                let policy = policy.parse::<Policy>()?;
                return self.exec(scripts, policy, background, scheduler);
            }
            ("my_ls", 0) => commands::my_ls(&mut self.out)?,
            ("my_mkdir", 1) => {
                let name = match args[0].strip_prefix('$') {
                    Some(var) => self.vars.get(var).ok_or(ShellError::BadMkdir)?.to_string(),
                    None => args[0].to_string(),
                };
                commands::my_mkdir(&name)?;
            }
            ("my_touch", 1) => commands::my_touch(args[0])?,
            ("my_cd", 1) => commands::my_cd(args[0])?,
            ("run", 1..) => commands::run(args, &mut self.out)?,
            _ => return Err(ShellError::UnknownCommand),
        }
        Ok(Flow::Continue)
    }

    /// Admits `scripts` and, unless a run is already going, runs them.
    /// With `background` the rest of the input becomes one more program that
    /// runs first.
    fn exec<const FRAME_SIZE: usize, const CAPACITY: usize>(
        &mut self,
        scripts: &[&str],
        policy: Policy,
        background: bool,
        scheduler: &mut Scheduler<FRAME_SIZE, CAPACITY>,
    ) -> Result<Flow, ShellError> {
        let batch = if background && !scheduler.is_running() {
            Some(self.repl.drain()?)
        } else {
            if background {
                warn!("Ignoring # inside a running batch");
            }
            None
        };

        let admission = match scheduler.admit(scripts, policy, batch.as_deref()) {
            Ok(admission) => admission,
            Err(e) => {
                if let Some(lines) = batch {
                    self.repl.unread(lines);
                }
                return Err(e.into());
            }
        };
        for (name, e) in &admission.rejected {
            self.emit(&format!("Error: could not admit {}: {}", name, e));
        }
        for victim in &admission.evictions {
            self.dump_victim(victim);
        }

        if scheduler.is_running() {
            return Ok(Flow::Continue);
        }
        match scheduler.run_to_quiescence(self)? {
            // the batch took the rest of the input with it
            Flow::Continue if batch.is_some() => {
                self.emit("Bye!");
                Ok(Flow::Quit)
            }
            flow => Ok(flow),
        }
    }

    fn dump_victim(&mut self, victim: &Eviction) {
        let mut text = String::from("Page fault! Victim page contents:\n");
        for line in &victim.lines {
            text.push('\n');
            text.push_str(line);
        }
        text.push_str("\n\nEnd of victim page contents.");
        self.emit(&text);
    }
}

impl<W: Write, const FRAME_SIZE: usize, const CAPACITY: usize> Dispatcher<FRAME_SIZE, CAPACITY>
    for Interpreter<W>
{
    fn dispatch(&mut self, line: &str, scheduler: &mut Scheduler<FRAME_SIZE, CAPACITY>) -> Flow {
        self.parse_input(line, scheduler)
    }

    fn page_fault(&mut self, fault: &PageFault) {
        match &fault.victim {
            Some(victim) => self.dump_victim(victim),
            None => self.emit("Page fault!"),
        }
        if let Some(e) = &fault.error {
            self.emit(&format!("Error: could not load page {}: {}", fault.page, e));
        }
    }
}
