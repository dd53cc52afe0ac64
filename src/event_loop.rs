use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use crate::supervisor::Interrupt;

/// How long a single poll may block before `finished` is checked again.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Where the event loop reads terminal input from.
pub trait EventSource {
    /// Waits up to `timeout` for the next event.
    fn next_event(&mut self, timeout: Duration) -> io::Result<Option<Event>>;
}

impl<E: EventSource + ?Sized> EventSource for &mut E {
    fn next_event(&mut self, timeout: Duration) -> io::Result<Option<Event>> {
        (**self).next_event(timeout)
    }
}

/// Terminal input via crossterm.
pub struct TerminalEvents;

impl EventSource for TerminalEvents {
    fn next_event(&mut self, timeout: Duration) -> io::Result<Option<Event>> {
        if event::poll(timeout)? {
            event::read().map(Some)
        } else {
            Ok(None)
        }
    }
}

/// Ctrl-C. With the terminal in raw mode it arrives as a key press instead
/// of a signal.
pub fn is_cancel_gesture(event: &Event) -> bool {
    matches!(
        event,
        Event::Key(KeyEvent {
            code: KeyCode::Char('c'),
            modifiers,
            kind: KeyEventKind::Press,
            ..
        }) if modifiers.contains(KeyModifiers::CONTROL)
    )
}

/// Discards input until the cancellation gesture arrives, fires `interrupt`
/// and returns `true`. Returns `false` once `finished` is set without the
/// gesture having been seen.
pub fn run_event_loop<E: EventSource>(
    mut events: E,
    interrupt: &Interrupt,
    finished: &AtomicBool,
) -> io::Result<bool> {
    while !finished.load(Ordering::Acquire) {
        let Some(event) = events.next_event(POLL_INTERVAL)? else {
            continue;
        };
        if is_cancel_gesture(&event) {
            log::info!("cancellation requested, interrupting all processes");
            interrupt.trigger();
            return Ok(true);
        }
        log::debug!("ignoring {event:?}");
    }
    Ok(false)
}
