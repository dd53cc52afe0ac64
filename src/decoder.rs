use vte::{Parser, Perform};

/// The pieces of child output a pane knows how to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fragment {
    Text(char),
    Tab,
    LineFeed,
}

/// Turns raw output bytes into [Fragment]s. Escape sequences and control
/// characters other than tab and line feed are dropped, undecodable bytes
/// come out as `U+FFFD`. Parser state is kept between calls, so a character
/// split across two reads still decodes.
pub struct OutputDecoder {
    parser: Parser,
}

impl OutputDecoder {
    pub fn new() -> Self {
        Self {
            parser: Parser::new(),
        }
    }

    pub fn decode(&mut self, bytes: &[u8]) -> Vec<Fragment> {
        let mut performer = Performer::default();
        for byte in bytes {
            self.parser.advance(&mut performer, *byte)
        }
        performer.fragments
    }
}

impl Default for OutputDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
struct Performer {
    fragments: Vec<Fragment>,
}

impl Perform for Performer {
    fn print(&mut self, c: char) {
        self.fragments.push(Fragment::Text(c))
    }

    fn execute(&mut self, byte: u8) {
        let fragment = match byte {
            b'\t' => Fragment::Tab,
            b'\n' => Fragment::LineFeed,
            _ => return,
        };
        self.fragments.push(fragment);
    }
}
