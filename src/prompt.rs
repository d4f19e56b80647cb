//! Interactive operator prompts.
//!
//! Every question is asked through a [`Prompter`] over any reader/writer pair, so the
//! binary uses stdin/stdout while tests script the answers.

use std::fmt;
use std::io::{self, BufRead, Write};
use std::str::FromStr;

/// How many devices the run touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// A single device given by IP address.
    One,
    /// Every supported device in the inventory.
    All,
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "one" => Ok(Mode::One),
            "all" => Ok(Mode::All),
            other => Err(format!("expected 'one' or 'all', got '{other}'")),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::One => f.write_str("one"),
            Mode::All => f.write_str("all"),
        }
    }
}

pub struct Prompter<R, W> {
    input: R,
    output: W,
    hide_secret_echo: bool,
}

impl Prompter<io::StdinLock<'static>, io::Stdout> {
    /// Prompts on the process terminal. Secrets are read with echo turned off.
    pub fn stdio() -> Self {
        Self {
            input: io::stdin().lock(),
            output: io::stdout(),
            hide_secret_echo: true,
        }
    }
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            hide_secret_echo: false,
        }
    }

    /// Writes `label` and reads one line without its line ending.
    pub fn ask(&mut self, label: &str) -> io::Result<String> {
        write!(self.output, "{label}")?;
        self.output.flush()?;
        self.read_answer()
    }

    /// Like [`Prompter::ask`], with terminal echo off when prompting on a terminal.
    pub fn ask_secret(&mut self, label: &str) -> io::Result<String> {
        write!(self.output, "{label}")?;
        self.output.flush()?;
        let answer = if self.hide_secret_echo {
            let _guard = EchoGuard::disable();
            self.read_answer()
        } else {
            self.read_answer()
        };
        // The operator's Enter was not echoed.
        if self.hide_secret_echo {
            writeln!(self.output)?;
        }
        answer
    }

    /// Asks for the run mode until a valid answer is given.
    pub fn ask_mode(&mut self) -> io::Result<Mode> {
        loop {
            let answer = self.ask("Are you changing one device or all devices? (one/all): ")?;
            match answer.parse::<Mode>() {
                Ok(mode) => return Ok(mode),
                Err(_) => writeln!(self.output, "Enter a valid response.")?,
            }
        }
    }

    /// Asks for a value until a non-blank answer is given.
    pub fn ask_non_empty(&mut self, label: &str) -> io::Result<String> {
        loop {
            let answer = self.ask(label)?;
            if !answer.trim().is_empty() {
                return Ok(answer.trim().to_string());
            }
        }
    }

    fn read_answer(&mut self) -> io::Result<String> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "input closed while waiting for an answer",
            ));
        }
        let trimmed = line.trim_end_matches(['\r', '\n']).len();
        line.truncate(trimmed);
        Ok(line)
    }
}

/// Turns terminal echo off on stdin until dropped. Does nothing when stdin is not a tty.
struct EchoGuard {
    #[cfg(unix)]
    saved: Option<libc::termios>,
}

#[cfg(unix)]
impl EchoGuard {
    fn disable() -> Self {
        let fd = libc::STDIN_FILENO;
        unsafe {
            let mut term: libc::termios = std::mem::zeroed();
            if libc::isatty(fd) != 1 || libc::tcgetattr(fd, &mut term) != 0 {
                return Self { saved: None };
            }
            let saved = term;
            term.c_lflag &= !libc::ECHO;
            if libc::tcsetattr(fd, libc::TCSANOW, &term) != 0 {
                return Self { saved: None };
            }
            Self { saved: Some(saved) }
        }
    }
}

#[cfg(unix)]
impl Drop for EchoGuard {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            unsafe {
                libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, &saved);
            }
        }
    }
}

#[cfg(not(unix))]
impl EchoGuard {
    fn disable() -> Self {
        Self {}
    }
}
