use std::io::{self, Stdout, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crossterm::cursor::{Hide, MoveTo, Show};
use crossterm::style::Print;
use crossterm::terminal::{
    self, disable_raw_mode, enable_raw_mode, Clear, ClearType, EnterAlternateScreen,
    LeaveAlternateScreen,
};
use crossterm::{execute, queue};

/// A cell-addressed output surface.
pub trait Display {
    /// Current size as `(width, height)` in cells.
    fn size(&self) -> io::Result<(u16, u16)>;

    fn set_cell(&mut self, x: u16, y: u16, glyph: char) -> io::Result<()>;

    /// Makes every cell written since the last call visible.
    fn show(&mut self) -> io::Result<()>;
}

/// The display is shared by every pane and guarded by a single lock.
pub type SharedDisplay<D> = Arc<Mutex<D>>;

/// Locks `mutex`, carrying on with the inner value if a writer panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Renders cells by queueing crossterm commands on `W`; nothing reaches the
/// terminal until [Display::show].
pub struct CrosstermDisplay<W: Write> {
    output: W,
    fixed_size: Option<(u16, u16)>,
}

impl CrosstermDisplay<Stdout> {
    pub fn stdout() -> Self {
        Self {
            output: io::stdout(),
            fixed_size: None,
        }
    }
}

impl<W: Write> CrosstermDisplay<W> {
    /// A display over an arbitrary writer that reports a constant size
    /// instead of asking the terminal.
    pub fn with_size(output: W, width: u16, height: u16) -> Self {
        Self {
            output,
            fixed_size: Some((width, height)),
        }
    }

    pub fn into_inner(self) -> W {
        self.output
    }
}

impl<W: Write> Display for CrosstermDisplay<W> {
    fn size(&self) -> io::Result<(u16, u16)> {
        match self.fixed_size {
            Some(size) => Ok(size),
            None => terminal::size(),
        }
    }

    fn set_cell(&mut self, x: u16, y: u16, glyph: char) -> io::Result<()> {
        queue!(self.output, MoveTo(x, y), Print(glyph))
    }

    fn show(&mut self) -> io::Result<()> {
        self.output.flush()
    }
}

/// An off-screen grid of cells.
#[derive(Debug, Clone)]
pub struct MemoryDisplay {
    width: u16,
    height: u16,
    cells: Vec<char>,
    flushes: usize,
}

impl MemoryDisplay {
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            cells: vec![' '; usize::from(width) * usize::from(height)],
            flushes: 0,
        }
    }

    /// Changes the reported size. Cells that still fit keep their content.
    pub fn resize(&mut self, width: u16, height: u16) {
        let mut resized = Self::new(width, height);
        for y in 0..height.min(self.height) {
            for x in 0..width.min(self.width) {
                let to = resized.offset(x, y);
                resized.cells[to] = self.cells[self.offset(x, y)];
            }
        }
        resized.flushes = self.flushes;
        *self = resized;
    }

    pub fn row(&self, y: u16) -> String {
        let start = self.offset(0, y);
        self.cells[start..start + usize::from(self.width)]
            .iter()
            .collect()
    }

    /// All rows, each framed by `|` so trailing blanks stay visible.
    pub fn frame(&self) -> String {
        (0..self.height)
            .map(|y| format!("|{}|", self.row(y)))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn flushes(&self) -> usize {
        self.flushes
    }

    fn offset(&self, x: u16, y: u16) -> usize {
        usize::from(y) * usize::from(self.width) + usize::from(x)
    }
}

impl Display for MemoryDisplay {
    fn size(&self) -> io::Result<(u16, u16)> {
        Ok((self.width, self.height))
    }

    fn set_cell(&mut self, x: u16, y: u16, glyph: char) -> io::Result<()> {
        if x >= self.width || y >= self.height {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("cell ({x}, {y}) is outside {}x{}", self.width, self.height),
            ));
        }
        let offset = self.offset(x, y);
        self.cells[offset] = glyph;
        Ok(())
    }

    fn show(&mut self) -> io::Result<()> {
        self.flushes += 1;
        Ok(())
    }
}

/// Owns the real terminal for as long as it is alive: raw mode, alternate
/// screen and a hidden cursor. Everything is restored on drop.
pub struct TerminalSession {
    _private: (),
}

impl TerminalSession {
    pub fn acquire() -> io::Result<Self> {
        enable_raw_mode()?;
        let session = Self { _private: () };
        execute!(
            io::stdout(),
            EnterAlternateScreen,
            Hide,
            Clear(ClearType::All)
        )?;
        Ok(session)
    }
}

impl Drop for TerminalSession {
    fn drop(&mut self) {
        if let Err(err) = execute!(io::stdout(), Show, LeaveAlternateScreen) {
            log::warn!("failed to leave the alternate screen: {err}");
        }
        if let Err(err) = disable_raw_mode() {
            log::warn!("failed to disable raw mode: {err}");
        }
    }
}
