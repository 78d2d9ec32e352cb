use std::io::{self, BufRead, IsTerminal, Write};

/// Terminal capabilities and interactive input used by CLI commands.
pub trait TerminalClient {
    /// Whether stdout is attached to a terminal.
    fn stdout_is_terminal(&self) -> bool;

    /// Whether stderr is attached to a terminal.
    fn stderr_is_terminal(&self) -> bool;

    /// Shows `prompt` and reads one line of input.
    ///
    /// Returns `None` when input is closed before a line arrives.
    ///
    /// # Errors
    ///
    /// Returns an error if the prompt cannot be written or input cannot be read.
    fn prompt_line(&self, prompt: &str) -> io::Result<Option<String>>;
}

/// Terminal client backed by the process's standard streams.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct SystemTerminalClient;

impl TerminalClient for SystemTerminalClient {
    fn stdout_is_terminal(&self) -> bool {
        io::stdout().is_terminal()
    }

    fn stderr_is_terminal(&self) -> bool {
        io::stderr().is_terminal()
    }

    fn prompt_line(&self, prompt: &str) -> io::Result<Option<String>> {
        let mut stderr = io::stderr().lock();
        write!(stderr, "{prompt}")?;
        stderr.flush()?;

        let mut line = String::new();
        let read = io::stdin().lock().read_line(&mut line)?;
        Ok((read > 0).then_some(line))
    }
}
