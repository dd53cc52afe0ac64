use std::io::{self, Write};
use std::panic;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::command::CommandSpec;
use crate::display::{Display, SharedDisplay};
use crate::error::{Error, Result};
use crate::region::{check_pane_count, Pane};
use crate::viewport::PaneWriter;

const READ_CHUNK: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    NotStarted,
    Running,
    Exited(i32),
    /// Ended by a signal, or its exit status could not be collected.
    Signaled,
}

impl From<ExitStatus> for ProcessState {
    fn from(status: ExitStatus) -> Self {
        match status.code() {
            Some(code) => ProcessState::Exited(code),
            None => ProcessState::Signaled,
        }
    }
}

/// A command bound to the pane that shows its output.
#[derive(Debug)]
pub struct ManagedProcess {
    spec: CommandSpec,
    pane: Pane,
    state: ProcessState,
}

impl ManagedProcess {
    pub fn new(spec: CommandSpec, pane: Pane) -> Self {
        Self {
            spec,
            pane,
            state: ProcessState::NotStarted,
        }
    }

    pub fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    pub fn pane(&self) -> Pane {
        self.pane
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    fn spawn(&mut self) -> Result<Child> {
        let child = Command::new(self.spec.program())
            .args(self.spec.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| Error::ProcessSpawn {
                program: self.spec.program().to_owned(),
                source,
            })?;
        self.state = ProcessState::Running;
        Ok(child)
    }
}

/// Creates the one-shot, global cancellation signal.
pub fn interrupt_channel() -> (Interrupt, InterruptListener) {
    let (sender, receiver) = watch::channel(false);
    (
        Interrupt {
            sender: Arc::new(sender),
        },
        InterruptListener { receiver },
    )
}

#[derive(Clone)]
pub struct Interrupt {
    sender: Arc<watch::Sender<bool>>,
}

impl Interrupt {
    /// Fires the interrupt. Returns `false` if it had already fired.
    pub fn trigger(&self) -> bool {
        !self.sender.send_replace(true)
    }

    pub fn is_triggered(&self) -> bool {
        *self.sender.borrow()
    }
}

#[derive(Clone)]
pub struct InterruptListener {
    receiver: watch::Receiver<bool>,
}

impl InterruptListener {
    /// Resolves once the interrupt fires. Never resolves if every
    /// [Interrupt] is dropped without firing.
    pub async fn triggered(&mut self) {
        let closed = self.receiver.wait_for(|fired| *fired).await.is_err();
        if closed {
            std::future::pending::<()>().await;
        }
    }

    pub fn is_triggered(&self) -> bool {
        *self.receiver.borrow()
    }
}

/// What [Supervisor::run] observed once every process was done.
#[derive(Debug)]
pub struct Report {
    states: Vec<ProcessState>,
    interrupted: bool,
    first_error: Option<Error>,
}

impl Report {
    /// Final state of each process, in command order.
    pub fn states(&self) -> &[ProcessState] {
        &self.states
    }

    /// Whether any process was interrupted rather than left to exit.
    pub fn interrupted(&self) -> bool {
        self.interrupted
    }

    pub fn first_error(&self) -> Option<&Error> {
        self.first_error.as_ref()
    }

    pub fn into_result(self) -> Result<()> {
        match self.first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

pub struct Supervisor {
    processes: Vec<ManagedProcess>,
}

impl Supervisor {
    /// Validates and parses every command without starting anything.
    pub fn new<S: AsRef<str>>(specs: &[S]) -> Result<Self> {
        let count = specs.len();
        check_pane_count(count)?;
        let processes = specs
            .iter()
            .enumerate()
            .map(|(index, spec)| -> Result<ManagedProcess> {
                let spec: CommandSpec = spec.as_ref().parse()?;
                Ok(ManagedProcess::new(spec, Pane::new(index, count)?))
            })
            .collect::<Result<_>>()?;
        Ok(Self { processes })
    }

    pub fn processes(&self) -> &[ManagedProcess] {
        &self.processes
    }

    /// Launches every process into its pane and waits for all of them. A
    /// failing process never cancels its siblings; the first failure observed
    /// is kept in the [Report].
    pub async fn run<D>(mut self, display: SharedDisplay<D>, interrupt: InterruptListener) -> Report
    where
        D: Display + Send + 'static,
    {
        let mut first_error = None;
        let mut tasks = JoinSet::new();
        for (index, process) in self.processes.iter_mut().enumerate() {
            let writer = PaneWriter::new(process.pane(), Arc::clone(&display));
            match process.spawn() {
                Ok(child) => {
                    log::info!(
                        "pane {index}: started `{}` (pid {:?})",
                        process.spec(),
                        child.id()
                    );
                    let program = process.spec().program().to_owned();
                    tasks.spawn(supervise(index, program, child, writer, interrupt.clone()));
                }
                Err(err) => {
                    log::warn!("pane {index}: {err}");
                    first_error.get_or_insert(err);
                }
            }
        }

        let mut interrupted = false;
        while let Some(joined) = tasks.join_next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(err) if err.is_panic() => panic::resume_unwind(err.into_panic()),
                Err(err) => {
                    log::error!("process task did not complete: {err}");
                    continue;
                }
            };
            self.processes[outcome.index].state = outcome.state;
            interrupted |= outcome.interrupted;
            if let Some(err) = outcome.error {
                first_error.get_or_insert(err);
            }
        }

        Report {
            states: self.processes.iter().map(ManagedProcess::state).collect(),
            interrupted,
            first_error,
        }
    }
}

struct Outcome {
    index: usize,
    state: ProcessState,
    interrupted: bool,
    error: Option<Error>,
}

async fn supervise<D>(
    index: usize,
    program: String,
    mut child: Child,
    writer: PaneWriter<D>,
    mut interrupt: InterruptListener,
) -> Outcome
where
    D: Display + Send + 'static,
{
    // Dropping the set aborts whatever pumps are still running.
    let mut pumps = JoinSet::new();
    if let Some(stdout) = child.stdout.take() {
        pumps.spawn(pump(stdout, writer.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        pumps.spawn(pump(stderr, writer));
    }

    let waited = tokio::select! {
        status = child.wait() => Some(status),
        () = interrupt.triggered() => None,
    };

    match waited {
        Some(Ok(status)) => {
            log::info!("pane {index}: `{program}` finished with {status}");
            tokio::select! {
                () = drain(&mut pumps) => {}
                () = interrupt.triggered() => {}
            }
            let state = ProcessState::from(status);
            let error = match state {
                ProcessState::Exited(0) => None,
                ProcessState::Exited(code) => {
                    log::warn!("pane {index}: `{program}` exited with status {code}");
                    Some(Error::ProcessExit { program, code })
                }
                _ => {
                    log::warn!("pane {index}: `{program}` was killed by {status}");
                    Some(Error::ProcessSignaled {
                        program,
                        signal: termination_signal(status),
                    })
                }
            };
            Outcome {
                index,
                state,
                interrupted: false,
                error,
            }
        }
        Some(Err(err)) => {
            log::error!("pane {index}: lost track of `{program}`: {err}");
            if let Err(err) = child.start_kill() {
                log::warn!("pane {index}: cannot kill `{program}`: {err}");
            }
            Outcome {
                index,
                state: reap(index, &program, &mut child).await,
                interrupted: false,
                error: None,
            }
        }
        None => {
            log::info!("pane {index}: interrupting `{program}`");
            if let Err(err) = send_interrupt(&mut child) {
                log::warn!("pane {index}: cannot interrupt `{program}`: {err}");
            }
            // Exit codes after an interrupt are kept in the state but never reported as errors.
            Outcome {
                index,
                state: reap(index, &program, &mut child).await,
                interrupted: true,
                error: None,
            }
        }
    }
}

async fn reap(index: usize, program: &str, child: &mut Child) -> ProcessState {
    match child.wait().await {
        Ok(status) => ProcessState::from(status),
        Err(err) => {
            log::warn!("pane {index}: cannot reap `{program}`: {err}");
            ProcessState::Signaled
        }
    }
}

#[cfg(unix)]
fn termination_signal(status: ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;

    status.signal()
}

#[cfg(not(unix))]
fn termination_signal(_status: ExitStatus) -> Option<i32> {
    None
}

async fn drain(pumps: &mut JoinSet<io::Result<()>>) {
    while let Some(joined) = pumps.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(err)) => log::warn!("reading child output failed: {err}"),
            Err(err) => log::warn!("output pump did not complete: {err}"),
        }
    }
}

async fn pump<R, W>(mut reader: R, mut sink: W) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: Write,
{
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let read = reader.read(&mut buf).await?;
        if read == 0 {
            return Ok(());
        }
        sink.write_all(&buf[..read])?;
    }
}

#[cfg(unix)]
fn send_interrupt(child: &mut Child) -> io::Result<()> {
    // No id means the child has already been reaped.
    let Some(pid) = child.id() else {
        return Ok(());
    };
    let pid = libc::pid_t::try_from(pid).map_err(|_| {
        io::Error::new(io::ErrorKind::InvalidInput, format!("pid {pid} is out of range"))
    })?;
    if unsafe { libc::kill(pid, libc::SIGINT) } == -1 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            return Err(err);
        }
    }
    Ok(())
}

#[cfg(not(unix))]
fn send_interrupt(child: &mut Child) -> io::Result<()> {
    child.start_kill()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rejects_wrong_number_of_commands() {
        for specs in [vec![], vec!["true"], vec!["true", "true", "true"]] {
            let err = Supervisor::new(specs.as_slice()).err().unwrap();
            assert!(matches!(err, Error::Configuration(_)), "{specs:?}: {err}");
        }
    }

    #[test]
    fn rejects_unparseable_commands() {
        let err = Supervisor::new(&["echo hi", "  "]).err().unwrap();
        assert!(matches!(err, Error::CommandParse { .. }), "{err}");
    }

    #[test]
    fn binds_each_command_to_its_pane() {
        let supervisor = Supervisor::new(&["seq 3", "echo 'a b'"]).unwrap();
        let processes = supervisor.processes();
        assert_eq!(processes[0].spec().argv(), ["seq", "3"]);
        assert_eq!(processes[1].spec().argv(), ["echo", "a b"]);
        assert_eq!(processes[0].pane().index(), 0);
        assert_eq!(processes[1].pane().index(), 1);
        assert!(processes
            .iter()
            .all(|p| p.state() == ProcessState::NotStarted));
    }

    #[tokio::test]
    async fn interrupt_fires_once() {
        let (interrupt, mut listener) = interrupt_channel();
        assert!(!listener.is_triggered());
        assert!(interrupt.trigger());
        assert!(!interrupt.trigger());
        listener.triggered().await;
        assert!(listener.is_triggered());
        assert!(interrupt.is_triggered());
    }

    #[tokio::test]
    async fn listener_waits_forever_without_interrupt() {
        let (interrupt, mut listener) = interrupt_channel();
        drop(interrupt);
        let waited = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            listener.triggered(),
        )
        .await;
        assert!(waited.is_err());
    }
}
