use std::{
    collections::VecDeque,
    io::{self, BufRead, IsTerminal},
};

use log::debug;

/// Line source of the shell: stdin, or any reader in tests.
pub struct REPL {
    input: Box<dyn BufRead>,
    pending: VecDeque<String>,
    interactive: bool,
}

impl REPL {
    pub fn stdin() -> Self {
        let interactive = io::stdin().is_terminal();
        Self {
            input: Box::new(io::stdin().lock()),
            pending: VecDeque::new(),
            interactive,
        }
    }

    pub fn from_reader(reader: impl BufRead + 'static) -> Self {
        Self {
            input: Box::new(reader),
            pending: VecDeque::new(),
            interactive: false,
        }
    }

    /// True when a person is typing, so a prompt is worth printing.
    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    /// Next line without its line ending, `None` at end of input.
    pub fn read_line(&mut self) -> Result<Option<String>, io::Error> {
        if let Some(line) = self.pending.pop_front() {
            return Ok(Some(line));
        }
        let mut buffer = Vec::new();
        if self.input.read_until(b'\n', &mut buffer)? == 0 {
            return Ok(None);
        }
        // bad bytes become U+FFFD instead of ending the shell
        let line = String::from_utf8_lossy(&buffer);
        Ok(Some(line.trim_end_matches(['\n', '\r']).to_string()))
    }

    /// Consumes everything left in the input.
    pub fn drain(&mut self) -> Result<Vec<String>, io::Error> {
        let mut lines = Vec::new();
        while let Some(line) = self.read_line()? {
            lines.push(line);
        }
        debug!("Drained {} lines of input", lines.len());
        Ok(lines)
    }

    /// Puts lines back in front of the input, to be read again in order.
    pub fn unread(&mut self, lines: Vec<String>) {
        for line in lines.into_iter().rev() {
            self.pending.push_front(line);
        }
    }
}
