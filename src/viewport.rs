use std::collections::VecDeque;
use std::io::{self, Write};
use std::iter;
use std::sync::{Arc, Mutex};

use crate::decoder::{Fragment, OutputDecoder};
use crate::display::{lock, Display, SharedDisplay};
use crate::region::{Bounds, Pane};

const TAB_WIDTH: usize = 8;

/// The tail of a pane's output, oldest line first.
///
/// A line feed closes the current line but does not open the next one; that
/// happens when the next character arrives. Output ending in a newline
/// therefore never shows a trailing blank line.
#[derive(Debug, Default)]
pub struct ViewportState {
    lines: VecDeque<String>,
    line_closed: bool,
}

impl ViewportState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn push(&mut self, fragments: impl IntoIterator<Item = Fragment>) -> &mut Self {
        for fragment in fragments {
            match fragment {
                Fragment::Text(c) => self.current_line().push(c),
                Fragment::Tab => {
                    let line = self.current_line();
                    let pad = TAB_WIDTH - line.chars().count() % TAB_WIDTH;
                    line.extend(iter::repeat(' ').take(pad));
                }
                Fragment::LineFeed => {
                    if self.line_closed || self.lines.is_empty() {
                        self.lines.push_back(String::new());
                    }
                    self.line_closed = true;
                }
            }
        }
        self
    }

    /// Drops the oldest lines until at most `height` remain.
    pub fn retain_tail(&mut self, height: usize) -> &mut Self {
        let excess = self.lines.len().saturating_sub(height);
        self.lines.drain(..excess);
        self
    }

    fn current_line(&mut self) -> &mut String {
        if self.line_closed || self.lines.is_empty() {
            self.lines.push_back(String::new());
            self.line_closed = false;
        }
        let last = self.lines.len() - 1;
        &mut self.lines[last]
    }
}

/// One pane's output sink: buffers decoded output and repaints the pane on
/// the shared display after every write.
pub struct Viewport<D> {
    pane: Pane,
    state: ViewportState,
    decoder: OutputDecoder,
    display: SharedDisplay<D>,
    // Height from the last successful size query.
    last_height: Option<usize>,
}

impl<D: Display> Viewport<D> {
    pub fn new(pane: Pane, display: SharedDisplay<D>) -> Self {
        Self {
            pane,
            state: ViewportState::new(),
            decoder: OutputDecoder::new(),
            display,
            last_height: None,
        }
    }

    pub fn state(&self) -> &ViewportState {
        &self.state
    }

    /// Consumes `bytes` and redraws. Always reports every byte as written;
    /// display failures are logged and otherwise ignored.
    pub fn write(&mut self, bytes: &[u8]) -> usize {
        let fragments = self.decoder.decode(bytes);
        self.state.push(fragments);

        // Held across the whole repaint so frames from different panes never interleave.
        let mut display = lock(&self.display);
        let (width, height) = match display.size() {
            Ok(size) => size,
            Err(err) => {
                log::warn!("pane {}: cannot query display size: {err}", self.pane.index());
                if let Some(height) = self.last_height {
                    self.state.retain_tail(height);
                }
                return bytes.len();
            }
        };
        let bounds = self.pane.bounds(width, height);
        let height = usize::from(bounds.height());
        self.last_height = Some(height);
        self.state.retain_tail(height);
        if let Err(err) = self.redraw(&mut *display, bounds) {
            log::warn!("pane {}: redraw failed: {err}", self.pane.index());
        }
        bytes.len()
    }

    fn redraw(&self, display: &mut D, bounds: Bounds) -> io::Result<()> {
        let width = usize::from(bounds.width());
        let lines = self.state.lines().map(Some).chain(iter::repeat(None));
        for (y, line) in (bounds.y0..bounds.y1).zip(lines) {
            let glyphs = line
                .unwrap_or_default()
                .chars()
                .chain(iter::repeat(' '))
                .take(width);
            for (x, glyph) in (bounds.x0..bounds.x1).zip(glyphs) {
                display.set_cell(x, y, glyph)?;
            }
        }
        display.show()
    }
}

/// A clonable `Write` handle onto a [Viewport]. Clones share the same pane,
/// so one can go to a child's stdout and another to its stderr.
pub struct PaneWriter<D> {
    viewport: Arc<Mutex<Viewport<D>>>,
}

impl<D: Display> PaneWriter<D> {
    pub fn new(pane: Pane, display: SharedDisplay<D>) -> Self {
        Self {
            viewport: Arc::new(Mutex::new(Viewport::new(pane, display))),
        }
    }

    /// Snapshot of the lines currently held by the pane.
    pub fn lines(&self) -> Vec<String> {
        lock(&self.viewport)
            .state()
            .lines()
            .map(str::to_owned)
            .collect()
    }
}

impl<D> Clone for PaneWriter<D> {
    fn clone(&self) -> Self {
        Self {
            viewport: Arc::clone(&self.viewport),
        }
    }
}

impl<D: Display> Write for PaneWriter<D> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(lock(&self.viewport).write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::io::{self, Write};
    use std::sync::{Arc, Mutex};
    use std::thread;

    use crate::decoder::OutputDecoder;
    use crate::display::{lock, Display, MemoryDisplay};
    use crate::region::Pane;
    use crate::viewport::{PaneWriter, Viewport, ViewportState};

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Call {
        SetCell(u16),
        Show,
    }

    /// Logs every call; `size` of `None` makes size queries fail.
    struct RecordingDisplay {
        size: Option<(u16, u16)>,
        calls: Vec<Call>,
    }

    impl RecordingDisplay {
        fn shared(size: Option<(u16, u16)>) -> Arc<Mutex<Self>> {
            Arc::new(Mutex::new(Self {
                size,
                calls: Vec::new(),
            }))
        }
    }

    impl Display for RecordingDisplay {
        fn size(&self) -> io::Result<(u16, u16)> {
            self.size
                .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "no terminal"))
        }

        fn set_cell(&mut self, x: u16, _y: u16, _glyph: char) -> io::Result<()> {
            self.calls.push(Call::SetCell(x));
            Ok(())
        }

        fn show(&mut self) -> io::Result<()> {
            self.calls.push(Call::Show);
            Ok(())
        }
    }

    fn pushed(chunks: &[&str]) -> Vec<String> {
        let mut decoder = OutputDecoder::new();
        let mut state = ViewportState::new();
        for chunk in chunks {
            state.push(decoder.decode(chunk.as_bytes()));
        }
        state.lines().map(str::to_owned).collect()
    }

    fn viewport(index: usize, width: u16, height: u16) -> (Viewport<MemoryDisplay>, Arc<Mutex<MemoryDisplay>>) {
        let display = Arc::new(Mutex::new(MemoryDisplay::new(width, height)));
        let pane = Pane::new(index, 2).unwrap();
        (Viewport::new(pane, Arc::clone(&display)), display)
    }

    #[test]
    fn appends_fragments_to_open_line() {
        assert_eq!(pushed(&["a\nb\nc", "d\n"]), vec!["a", "b", "cd"]);
    }

    #[test]
    fn newline_opens_the_next_line_lazily() {
        assert_eq!(pushed(&["one\n"]), vec!["one"]);
        assert_eq!(pushed(&["one\n", "two"]), vec!["one", "two"]);
        assert_eq!(pushed(&["a\n\nb"]), vec!["a", "", "b"]);
        assert_eq!(pushed(&["\n", "x"]), vec!["", "x"]);
    }

    #[test]
    fn expands_tabs_to_next_stop() {
        assert_eq!(pushed(&["ab\tc", "\t|"]), vec!["ab      c       |"]);
    }

    #[test]
    fn retains_only_the_most_recent_lines() {
        let mut decoder = OutputDecoder::new();
        let mut state = ViewportState::new();
        state
            .push(decoder.decode(b"1\n2\n3\n4\n5\n"))
            .retain_tail(3);
        assert_eq!(state.lines().collect::<Vec<_>>(), vec!["3", "4", "5"]);

        state.retain_tail(0);
        assert!(state.is_empty());
        state.push(decoder.decode(b"6"));
        assert_eq!(state.lines().collect::<Vec<_>>(), vec!["6"]);
    }

    #[test]
    fn write_reports_every_byte() {
        let (mut viewport, _display) = viewport(0, 10, 2);
        assert_eq!(viewport.write(b"hello\nworld\n\xff"), 13);
        assert_eq!(viewport.write(b""), 0);
    }

    #[test]
    fn write_keeps_pane_height_lines() {
        let (mut viewport, display) = viewport(1, 8, 3);
        for n in 0..10 {
            viewport.write(format!("line{n}\n").as_bytes());
        }
        assert_eq!(viewport.state().len(), 3);
        assert_eq!(
            viewport.state().lines().collect::<Vec<_>>(),
            vec!["line7", "line8", "line9"]
        );
        assert_eq!(lock(&display).flushes(), 10);
    }

    #[test]
    fn clips_long_lines_to_pane_width() {
        let (mut viewport, display) = viewport(0, 8, 2);
        viewport.write(b"abcdefgh\nxy");
        insta::assert_snapshot!(lock(&display).frame(), @r###"
        |abcd    |
        |xy      |
        "###);
    }

    #[test]
    fn right_pane_draws_at_offset() {
        let (mut viewport, display) = viewport(1, 9, 2);
        viewport.write(b"right side");
        insta::assert_snapshot!(lock(&display).frame(), @r###"
        |    right|
        |         |
        "###);
    }

    #[test]
    fn scrolling_clears_stale_glyphs() {
        let (mut viewport, display) = viewport(0, 12, 2);
        viewport.write(b"a long line\nshort\n");
        viewport.write(b"x\n");
        let display = lock(&display);
        assert_eq!(display.row(0), "short       ");
        assert_eq!(display.row(1), "x           ");
    }

    #[test]
    fn picks_up_resize_on_next_write() {
        let (mut viewport, display) = viewport(1, 10, 4);
        viewport.write(b"1\n2\n3\n4\n");
        lock(&display).resize(20, 2);
        viewport.write(b"5\n");
        assert_eq!(viewport.state().lines().collect::<Vec<_>>(), vec!["4", "5"]);
        let display = lock(&display);
        assert_eq!(&display.row(0)[10..], "4         ");
        assert_eq!(&display.row(1)[10..], "5         ");
    }

    #[test]
    fn both_panes_share_a_display_without_overlap() {
        let display = Arc::new(Mutex::new(MemoryDisplay::new(10, 2)));
        let mut left = PaneWriter::new(Pane::new(0, 2).unwrap(), Arc::clone(&display));
        let mut right = PaneWriter::new(Pane::new(1, 2).unwrap(), Arc::clone(&display));
        left.write_all(b"LLLLLLLL\n").unwrap();
        right.write_all(b"RRRRRRRR\n").unwrap();
        left.write_all(b"l").unwrap();
        assert_eq!(lock(&display).row(0), "LLLLLRRRRR");
        assert_eq!(lock(&display).row(1), "l         ");
        assert_eq!(lock(&display).size().unwrap(), (10, 2));
    }

    #[test]
    fn writer_clones_feed_the_same_pane() {
        let display = Arc::new(Mutex::new(MemoryDisplay::new(10, 4)));
        let mut stdout = PaneWriter::new(Pane::new(0, 2).unwrap(), display);
        let mut stderr = stdout.clone();
        stdout.write_all(b"out ").unwrap();
        stderr.write_all(b"err\n").unwrap();
        stdout.write_all(b"done").unwrap();
        assert_eq!(stdout.lines(), vec!["out err", "done"]);
    }

    #[test]
    fn failed_size_query_keeps_last_height() {
        let display = RecordingDisplay::shared(Some((10, 3)));
        let mut viewport = Viewport::new(Pane::new(0, 2).unwrap(), Arc::clone(&display));
        viewport.write(b"first\n");
        lock(&display).size = None;
        for n in 0..50 {
            viewport.write(format!("line{n}\n").as_bytes());
        }
        assert_eq!(
            viewport.state().lines().collect::<Vec<_>>(),
            vec!["line47", "line48", "line49"]
        );
    }

    #[test]
    fn concurrent_writers_never_tear_frames() {
        const WRITES: usize = 200;
        let display = RecordingDisplay::shared(Some((20, 5)));
        let left = PaneWriter::new(Pane::new(0, 2).unwrap(), Arc::clone(&display));
        let left_stderr = left.clone();
        let right = PaneWriter::new(Pane::new(1, 2).unwrap(), Arc::clone(&display));

        thread::scope(|scope| {
            for (mut writer, text) in [(left, "out\n"), (left_stderr, "err\n"), (right, "right\n")] {
                scope.spawn(move || {
                    for _ in 0..WRITES {
                        writer.write_all(text.as_bytes()).unwrap();
                    }
                });
            }
        });

        let calls = lock(&display).calls.clone();
        let frames: Vec<&[Call]> = calls.split(|call| *call == Call::Show).collect();
        // split leaves an empty slice after the final show
        assert_eq!(frames.len(), 3 * WRITES + 1);
        assert!(frames.last().unwrap().is_empty());
        for frame in &frames[..frames.len() - 1] {
            assert_eq!(frame.len(), 10 * 5);
            let in_left = |call: &Call| matches!(call, Call::SetCell(x) if *x < 10);
            assert!(
                frame.iter().all(in_left) || !frame.iter().any(in_left),
                "a frame mixed cells from both panes"
            );
        }
    }
}
