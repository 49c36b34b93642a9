//! Keyboard input: turns characters read from stdin into game commands

use shared::Command;
use std::io::{self, BufRead};

/// What a single input character means to the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Command(Command),
    /// Whitespace, including the newline that ends every line.
    Ignored,
    Invalid(char),
}

/// Maps one character to its meaning. Letters are case-insensitive.
pub fn parse_key(c: char) -> Key {
    match c.to_ascii_lowercase() {
        'w' => Key::Command(Command::Up),
        'a' => Key::Command(Command::Left),
        's' => Key::Command(Command::Down),
        'd' => Key::Command(Command::Right),
        'e' => Key::Command(Command::Disconnect),
        'x' => Key::Command(Command::Delete),
        c if c.is_whitespace() => Key::Ignored,
        c => Key::Invalid(c),
    }
}

/// Reads keys one character at a time from a line-buffered source
pub struct InputManager<R> {
    reader: R,
    pending: Vec<char>,
    next: usize,
}

impl<R: BufRead> InputManager<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            pending: Vec::new(),
            next: 0,
        }
    }

    /// Returns the next key, or `None` once the input is exhausted.
    pub fn next_key(&mut self) -> io::Result<Option<Key>> {
        while self.next >= self.pending.len() {
            let mut line = String::new();
            if self.reader.read_line(&mut line)? == 0 {
                return Ok(None);
            }
            self.pending = line.chars().collect();
            self.next = 0;
        }

        let c = self.pending[self.next];
        self.next += 1;
        Ok(Some(parse_key(c)))
    }

    /// Skips ignored and invalid keys until a command or the end of input.
    ///
    /// Invalid characters are passed to `on_invalid` before being skipped.
    pub fn next_command<F: FnMut(char)>(
        &mut self,
        mut on_invalid: F,
    ) -> io::Result<Option<Command>> {
        loop {
            match self.next_key()? {
                Some(Key::Command(command)) => return Ok(Some(command)),
                Some(Key::Invalid(c)) => on_invalid(c),
                Some(Key::Ignored) => {}
                None => return Ok(None),
            }
        }
    }
}
