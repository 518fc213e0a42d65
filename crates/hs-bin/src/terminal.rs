//! Terminal session setup and restoration.

use anyhow::Result;
use crossterm::{
    cursor::{Hide, Show},
    event::{DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{
        EnterAlternateScreen, LeaveAlternateScreen, SetTitle, disable_raw_mode, enable_raw_mode,
    },
};
use std::io::stdout;

pub struct TerminalSession {
    entered: bool,
}

/// RAII guard restoring the terminal even when the caller early-returns or
/// panics.
pub struct SessionGuard<'a> {
    session: &'a mut TerminalSession,
}

impl Default for TerminalSession {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalSession {
    pub fn new() -> Self {
        Self { entered: false }
    }

    pub fn set_title(&mut self, title: &str) -> Result<()> {
        execute!(stdout(), SetTitle(title))?;
        Ok(())
    }

    /// Enter raw mode, the alternate screen, and mouse capture; return a
    /// guard that undoes all three on drop.
    pub fn enter_guard(&mut self) -> Result<SessionGuard<'_>> {
        self.enter()?;
        Ok(SessionGuard { session: self })
    }

    fn enter(&mut self) -> Result<()> {
        if !self.entered {
            enable_raw_mode()?;
            execute!(stdout(), EnterAlternateScreen, EnableMouseCapture, Hide)?;
            self.entered = true;
        }
        Ok(())
    }

    fn leave(&mut self) -> Result<()> {
        if self.entered {
            execute!(stdout(), DisableMouseCapture, LeaveAlternateScreen, Show)?;
            disable_raw_mode()?;
            self.entered = false;
        }
        Ok(())
    }
}

impl Drop for TerminalSession {
    fn drop(&mut self) {
        let _ = self.leave();
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        let _ = self.session.leave();
    }
}
