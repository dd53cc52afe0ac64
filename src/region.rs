use crate::error::{Error, Result};

/// Number of panes the allocator knows how to lay out.
pub const SUPPORTED_PANES: usize = 2;

/// Fails unless `count` panes can be laid out.
pub fn check_pane_count(count: usize) -> Result<()> {
    if count != SUPPORTED_PANES {
        return Err(Error::Configuration(format!(
            "can only tile exactly {SUPPORTED_PANES} commands, got {count}"
        )));
    }
    Ok(())
}

/// A half-open rectangle of display cells: columns `x0..x1`, rows `y0..y1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub x0: u16,
    pub y0: u16,
    pub x1: u16,
    pub y1: u16,
}

impl Bounds {
    pub fn width(&self) -> u16 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> u16 {
        self.y1 - self.y0
    }

    pub fn contains(&self, x: u16, y: u16) -> bool {
        (self.x0..self.x1).contains(&x) && (self.y0..self.y1).contains(&y)
    }
}

/// One tiled region of the display. Only constructible for a layout the
/// allocator supports, so computing its bounds cannot fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pane {
    index: usize,
    count: usize,
}

impl Pane {
    pub fn new(index: usize, count: usize) -> Result<Self> {
        check_pane_count(count)?;
        if index >= count {
            return Err(Error::Configuration(format!(
                "pane index {index} is out of range for {count} panes"
            )));
        }
        Ok(Self { index, count })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn count(&self) -> usize {
        self.count
    }

    // Two panes only: split down the middle, the right half takes the odd column.
    pub fn bounds(&self, width: u16, height: u16) -> Bounds {
        let middle = width / 2;
        let (x0, x1) = if self.index == 0 {
            (0, middle)
        } else {
            (middle, width)
        };
        Bounds {
            x0,
            y0: 0,
            x1,
            y1: height,
        }
    }
}

/// Computes the rectangle of pane `index` out of `count` on a `width` x `height` display.
pub fn bounds(index: usize, count: usize, width: u16, height: u16) -> Result<Bounds> {
    Ok(Pane::new(index, count)?.bounds(width, height))
}
