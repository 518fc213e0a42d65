//! Batching terminal writer.
//!
//! Groups consecutive plain single-width cell prints into one terminal
//! `Print` command so a full control repaint costs a handful of commands
//! instead of one per cell.
//!
//! Batching rules:
//! * A "plain cell" is a single visible character with no escape bytes
//!   (any string containing `\x1b` is styled and a hard batch boundary).
//! * Only 1-char plain strings are aggregated. Multi-char plain strings
//!   pass through as their own command.
//! * Movement, line clears, and cursor visibility changes flush the
//!   current batch.
//!
//! Metrics semantics: `print_commands` counts terminal `Print` commands
//! issued after batching; `cells_printed` counts logical cells (plain
//! chars batched plus one per styled or multi-char command), so
//! `print_commands <= cells_printed` always holds.

use anyhow::Result;
use crossterm::{
    cursor::{Hide, MoveTo, Show},
    queue,
    style::Print,
    terminal::{Clear, ClearType},
};
use std::io::{Write, stdout};

#[derive(Debug)]
pub enum Command {
    MoveTo(u16, u16),
    ClearLine,
    Print(String),
    HideCursor,
    ShowCursor,
}

#[derive(Default)]
pub struct BatchWriter {
    cmds: Vec<Command>,
    pending_plain: String,
    pub print_commands: u64,
    pub cells_printed: u64,
}

impl BatchWriter {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    fn flush_pending(&mut self) {
        if self.pending_plain.is_empty() {
            return;
        }
        let s = std::mem::take(&mut self.pending_plain);
        self.cmds.push(Command::Print(s));
        self.print_commands += 1;
        // cells already counted during accumulation
    }

    pub fn move_to(&mut self, x: u16, y: u16) {
        self.flush_pending();
        self.cmds.push(Command::MoveTo(x, y));
    }

    /// Clear the line the cursor is on. Callers issue a `move_to` first.
    pub fn clear_line(&mut self) {
        self.flush_pending();
        self.cmds.push(Command::ClearLine);
    }

    pub fn hide_cursor(&mut self) {
        self.flush_pending();
        self.cmds.push(Command::HideCursor);
    }

    pub fn show_cursor(&mut self) {
        self.flush_pending();
        self.cmds.push(Command::ShowCursor);
    }

    pub fn print<S: Into<String>>(&mut self, s: S) {
        let s: String = s.into();
        if s.is_empty() {
            return;
        }
        let is_plain_single = s.len() == 1 && !s.contains('\x1b');
        if is_plain_single {
            self.pending_plain.push_str(&s);
            self.cells_printed += 1;
            return;
        }
        // Styled or multi-char: flush batch then emit directly, counting one
        // logical cell.
        self.flush_pending();
        self.cmds.push(Command::Print(s));
        self.print_commands += 1;
        self.cells_printed += 1;
    }

    pub fn flush(mut self) -> Result<(u64, u64)> {
        self.flush_pending();
        let mut out = stdout();
        for c in self.cmds {
            match c {
                Command::MoveTo(x, y) => {
                    queue!(out, MoveTo(x, y))?;
                }
                Command::ClearLine => {
                    queue!(out, Clear(ClearType::CurrentLine))?;
                }
                Command::Print(s) => {
                    queue!(out, Print(s))?;
                }
                Command::HideCursor => {
                    queue!(out, Hide)?;
                }
                Command::ShowCursor => {
                    queue!(out, Show)?;
                }
            }
        }
        out.flush()?;
        Ok((self.print_commands, self.cells_printed))
    }
}
