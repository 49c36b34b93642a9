//! Terminal rendering of the playing field

use shared::{Field, FIELD_SIZE};
use std::fmt::Write as _;
use std::io::{self, Write};

pub const BORDER: &str = "+----+----+----+----+";

/// Draws the field as a bordered grid, one text row per field row.
///
/// Tiles show their face value `2^v`; empty cells stay blank.
pub fn render_field(field: &Field) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", BORDER);
    for row in 0..FIELD_SIZE {
        for col in 0..FIELD_SIZE {
            match field.get(row, col).display_value() {
                Some(value) => {
                    let _ = write!(out, "|{:>4}", value);
                }
                None => out.push_str("|    "),
            }
        }
        let _ = writeln!(out, "|\n{}", BORDER);
    }
    out
}

/// Writes fields and status messages to a terminal or any other sink
pub struct Renderer<W> {
    out: W,
    label: String,
}

impl<W: Write> Renderer<W> {
    pub fn new(out: W, label: impl Into<String>) -> Self {
        Self {
            out,
            label: label.into(),
        }
    }

    /// Prints the optional message line followed by the field.
    pub fn render(&mut self, field: &Field, message: Option<&str>) -> io::Result<()> {
        if let Some(message) = message {
            self.message(message)?;
        }
        self.out.write_all(render_field(field).as_bytes())?;
        self.out.flush()
    }

    pub fn message(&mut self, message: &str) -> io::Result<()> {
        writeln!(self.out, "{}\t{}", self.label, message)?;
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
