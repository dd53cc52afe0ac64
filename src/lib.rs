/*
Runs two commands side by side in one terminal.

Each command gets half of the screen. Its stdout and stderr both land in the
same pane, which follows the tail of the output like `tail -f`: only the last
screenful of lines is kept and long lines are cut at the pane edge.

Ctrl-C interrupts both commands at once; otherwise we wait for both to exit.
*/
pub mod command;
pub mod config;
pub mod decoder;
pub mod display;
pub mod error;
pub mod event_loop;
pub mod region;
pub mod supervisor;
pub mod viewport;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

pub use command::CommandSpec;
pub use display::{CrosstermDisplay, Display, MemoryDisplay, TerminalSession};
pub use error::{Error, Result};
pub use supervisor::{interrupt_channel, ProcessState, Report, Supervisor};

use event_loop::{run_event_loop, TerminalEvents};

/// Tiles `specs` on the real terminal until every command has exited or the
/// user hits Ctrl-C.
///
/// Bad input is reported before the terminal is touched. The terminal is
/// restored before this returns, whatever the outcome.
pub async fn run<S: AsRef<str>>(specs: &[S]) -> Result<()> {
    let supervisor = Supervisor::new(specs)?;
    let session = TerminalSession::acquire().map_err(Error::DisplayInit)?;
    let display = Arc::new(Mutex::new(CrosstermDisplay::stdout()));

    let (interrupt, listener) = interrupt_channel();
    let finished = Arc::new(AtomicBool::new(false));
    let events = tokio::task::spawn_blocking({
        let finished = Arc::clone(&finished);
        move || run_event_loop(TerminalEvents, &interrupt, &finished)
    });

    let report = supervisor.run(display, listener).await;

    finished.store(true, Ordering::Release);
    match events.await {
        Ok(Ok(_)) => {}
        Ok(Err(err)) => log::error!("reading terminal input failed: {err}"),
        Err(err) => log::error!("event loop did not complete: {err}"),
    }
    drop(session);

    if let Some(err) = report.first_error() {
        log::warn!("first failure: {err}");
    }
    if report.interrupted() {
        log::info!("interrupted; final states {:?}", report.states());
    } else {
        log::info!("all processes finished: {:?}", report.states());
    }
    report.into_result()
}
