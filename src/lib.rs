pub mod commands;
pub mod config;
pub mod interpreter;
pub mod pager;
pub mod pcb;
pub mod policy;
pub mod ready_queue;
pub mod repl;
pub mod scheduler;

pub use config::Config;
pub use interpreter::{Interpreter, ShellError};
pub use memory::Pid;
pub use policy::Policy;
pub use scheduler::{
    Admission, AdmissionError, Dispatcher, Fetch, Flow, PageFault, Scheduler, SchedulerError,
    TraceEvent, TurnOutcome, TurnReport,
};

/// Lines per frame (and per page).
pub const FRAME_SIZE: usize = 3;
/// Total lines the frame store can hold.
pub const FRAME_STORE_SIZE: usize = 18;
/// Entries in the variable store.
pub const VAR_MEM_SIZE: usize = 10;
pub const MAX_USER_INPUT: usize = 1000;
pub const MAX_ARGS_SIZE: usize = 6;
/// Scripts accepted by a single `exec`.
pub const MAX_SCRIPTS: usize = 3;
/// Pages loaded when a program is admitted.
pub const PREFETCH_PAGES: usize = 2;
