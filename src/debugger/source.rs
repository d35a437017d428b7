//! Sources of debugger commands: an interactive terminal with history and
//! line editing, or piped standard input.

use std::io::{self, IsTerminal, Write};

use console::Key;

pub enum CommandSource {
    Terminal(Terminal),
    /// Piped stdin, read line by line. The lock is taken per read so that
    /// constructing a debugger never wedges other users of stdin.
    Stdin,
}

/// Interactive unbuffered terminal with an in-memory history.
pub struct Terminal {
    term: console::Term,
    next: String,
    history: Vec<String>,
    /// Line cursor within the current entry.
    cursor: usize,
    /// Focused item in history; new entry if `index == history.len()`.
    index: usize,
}

impl CommandSource {
    pub fn new() -> CommandSource {
        if io::stdin().is_terminal() {
            CommandSource::Terminal(Terminal::new())
        } else {
            CommandSource::Stdin
        }
    }

    /// Read the next command line. `None` indicates end of input.
    pub fn read(&mut self, prompt: &str) -> Option<String> {
        match self {
            CommandSource::Terminal(terminal) => terminal.read(prompt),
            CommandSource::Stdin => {
                print!("{}", prompt);
                let _ = io::stdout().flush();
                let mut line = String::new();
                match io::stdin().read_line(&mut line) {
                    Ok(0) | Err(_) => None,
                    Ok(_) => Some(line.trim_end_matches(['\n', '\r']).to_string()),
                }
            }
        }
    }
}

impl Terminal {
    fn new() -> Terminal {
        Terminal {
            term: console::Term::stdout(),
            next: String::new(),
            history: Vec::new(),
            cursor: 0,
            index: 0,
        }
    }

    /// If focused on a history item, clone it into the edit buffer first.
    fn focus_next(&mut self) {
        if self.index < self.history.len() {
            self.next = self.history[self.index].clone();
            self.index = self.history.len();
        }
    }

    fn current(&self) -> &str {
        if self.index < self.history.len() {
            &self.history[self.index]
        } else {
            &self.next
        }
    }

    fn print_prompt(&mut self, prompt: &str) {
        let current = self.current().to_string();
        let _ = self.term.clear_line();
        let _ = write!(self.term, "{}{}", prompt, current);
        let overshoot = current.len().saturating_sub(self.cursor);
        let _ = self.term.move_cursor_left(overshoot);
        let _ = self.term.flush();
    }

    /// Process one key. Returns true when a full line has been accepted.
    fn read_key(&mut self) -> Option<bool> {
        let key = self.term.read_key().ok()?;
        match key {
            Key::Enter | Key::Char('\n') => {
                self.focus_next();
                return Some(true);
            }
            // Ctrl-C and Ctrl-D end the session.
            Key::Char('\x03') | Key::Char('\x04') => return None,
            Key::Char(ch) => {
                // Other ASCII control characters are ignored.
                if !ch.is_control() {
                    self.focus_next();
                    self.next.insert(self.cursor, ch);
                    self.cursor += 1;
                }
            }
            Key::Backspace => {
                self.focus_next();
                if self.cursor > 0 {
                    self.cursor -= 1;
                    self.next.remove(self.cursor);
                }
            }
            Key::ArrowLeft => self.cursor = self.cursor.saturating_sub(1),
            Key::ArrowRight => {
                if self.cursor < self.current().len() {
                    self.cursor += 1;
                }
            }
            Key::ArrowUp => {
                if self.index > 0 {
                    self.index -= 1;
                    self.cursor = self.current().len();
                }
            }
            Key::ArrowDown => {
                if self.index < self.history.len() {
                    self.index += 1;
                    self.cursor = self.current().len();
                }
            }
            _ => (),
        }
        Some(false)
    }

    fn read(&mut self, prompt: &str) -> Option<String> {
        self.next.clear();
        self.cursor = 0;
        self.index = self.history.len();

        loop {
            self.print_prompt(prompt);
            match self.read_key() {
                None => {
                    println!();
                    return None;
                }
                Some(true) => break,
                Some(false) => (),
            }
        }
        println!();

        // Push to history unless it repeats the previous command.
        if !self.next.is_empty()
            && self.history.last().map(String::as_str) != Some(self.next.as_str())
        {
            self.history.push(self.next.clone());
        }
        self.index = self.history.len();

        Some(self.next.clone())
    }
}
