use std::{io, process::ExitCode};

use log::error;
use paged_shell::{repl::REPL, Config, Interpreter, Scheduler, FRAME_SIZE, FRAME_STORE_SIZE};

fn main() -> ExitCode {
    env_logger::init();

    let mut scheduler = Scheduler::<FRAME_SIZE, FRAME_STORE_SIZE>::new(Config::default());
    let mut interpreter = Interpreter::new(REPL::stdin(), io::stdout().lock());
    match interpreter.run_shell(&mut scheduler) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Shell stopped: {}", e);
            ExitCode::from(99)
        }
    }
}
