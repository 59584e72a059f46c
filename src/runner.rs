use crate::command::{build_command, ScriptCommand};
use crate::error::{AdvisoryWarning, PanelError};
use crate::panel::PanelConfig;
use crate::validation::{check_mt5_path, validate_configuration};
use std::io::{self, BufRead, BufReader, PipeReader};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

pub const RUN_CHANNEL_CAPACITY: usize = 256;
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Terminal result of one script invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    Succeeded,
    /// Non-zero exit. `code` is `None` when the child was killed by a signal.
    Failed { code: Option<i32> },
    Cancelled,
}

impl RunOutcome {
    fn from_status(status: ExitStatus, cancelled: bool) -> Self {
        if status.success() {
            RunOutcome::Succeeded
        } else if cancelled {
            RunOutcome::Cancelled
        } else {
            RunOutcome::Failed { code: status.code() }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Succeeded)
    }

    pub fn status_text(&self) -> String {
        match self {
            RunOutcome::Succeeded => "Done.".to_string(),
            RunOutcome::Failed { code: Some(code) } => format!("Finished with errors (code {}).", code),
            RunOutcome::Failed { code: None } => "Finished with errors (terminated by signal).".to_string(),
            RunOutcome::Cancelled => "Cancelled.".to_string(),
        }
    }

    /// Closing line appended to the transcript.
    pub fn summary_line(&self) -> String {
        match self {
            RunOutcome::Succeeded => "[OK] Process completed successfully!".to_string(),
            RunOutcome::Failed { code: Some(code) } => format!("[ERR] Process exited with code {}", code),
            RunOutcome::Failed { code: None } => "[ERR] Process was terminated by a signal".to_string(),
            RunOutcome::Cancelled => "[ERR] Process was cancelled".to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunPhase {
    Validating,
    Building,
    Launching,
    Streaming,
}

/// Messages sent from the run worker back to the front end.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunMessage {
    Phase(RunPhase),
    Warning(AdvisoryWarning),
    Started { command_line: String },
    Line(String),
    Finished(RunOutcome),
    Error { title: &'static str, message: String },
}

impl RunMessage {
    fn from_error(err: PanelError) -> Self {
        error!("{}: {}", err.title(), err);
        RunMessage::Error {
            title: err.title(),
            message: err.to_string(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunMessage::Finished(_) | RunMessage::Error { .. })
    }
}

#[derive(Default)]
struct CancelInner {
    requested: AtomicBool,
    child: Mutex<Option<Child>>,
}

/// Shared handle that owns the running child and can kill it from any thread.
#[derive(Clone, Default)]
pub struct CancelHandle {
    inner: Arc<CancelInner>,
}

fn lock_poisoned() -> io::Error {
    io::Error::other("child process lock poisoned")
}

impl CancelHandle {
    pub fn cancel(&self) {
        if self.inner.requested.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Cancellation requested");
        match self.inner.child.lock() {
            Ok(mut slot) => {
                if let Some(child) = slot.as_mut() {
                    if let Err(e) = child.kill() {
                        warn!("Failed to kill child process: {}", e);
                    }
                }
            }
            Err(_) => warn!("Cancel skipped: {}", lock_poisoned()),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.requested.load(Ordering::SeqCst)
    }

    fn attach(&self, mut child: Child) -> io::Result<()> {
        let mut slot = self.inner.child.lock().map_err(|_| lock_poisoned())?;
        if self.is_cancelled() {
            child.kill()?;
        }
        *slot = Some(child);
        Ok(())
    }

    /// Polls instead of blocking in `wait()` so `cancel` can still take the lock.
    fn wait(&self) -> io::Result<ExitStatus> {
        loop {
            {
                let mut slot = self.inner.child.lock().map_err(|_| lock_poisoned())?;
                let child = slot
                    .as_mut()
                    .ok_or_else(|| io::Error::other("no child process attached"))?;
                if let Some(status) = child.try_wait()? {
                    return Ok(status);
                }
            }
            std::thread::sleep(EXIT_POLL_INTERVAL);
        }
    }
}

/// Lazy line sequence over the merged output pipe. Ends at EOF. `\n`, `\r\n`
/// and a lone `\r` each end a line, so carriage-return progress output arrives
/// one update at a time. Bytes that are not UTF-8 are replaced rather than
/// aborting the stream.
pub struct OutputLines<R> {
    reader: R,
    buf: Vec<u8>,
    skip_lf: bool,
}

pub fn output_lines<R: BufRead>(reader: R) -> OutputLines<R> {
    OutputLines {
        reader,
        buf: Vec::with_capacity(256),
        skip_lf: false,
    }
}

impl<R> OutputLines<R> {
    fn take_line(&mut self) -> String {
        let line = String::from_utf8_lossy(&self.buf).into_owned();
        self.buf.clear();
        line
    }
}

impl<R: BufRead> Iterator for OutputLines<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buf.clear();
        loop {
            let available = match self.reader.fill_buf() {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Some(Err(e)),
            };
            if available.is_empty() {
                return if self.buf.is_empty() { None } else { Some(Ok(self.take_line())) };
            }

            // `\n` right after a `\r` belongs to the previous line ending.
            if self.skip_lf {
                self.skip_lf = false;
                if available[0] == b'\n' {
                    self.reader.consume(1);
                    continue;
                }
            }

            match available.iter().position(|b| *b == b'\n' || *b == b'\r') {
                Some(i) => {
                    self.skip_lf = available[i] == b'\r';
                    self.buf.extend_from_slice(&available[..i]);
                    self.reader.consume(i + 1);
                    return Some(Ok(self.take_line()));
                }
                None => {
                    let n = available.len();
                    self.buf.extend_from_slice(available);
                    self.reader.consume(n);
                }
            }
        }
    }
}

/// A launched child whose stdout and stderr share one pipe.
pub struct ProcessOutput {
    reader: BufReader<PipeReader>,
    cancel: CancelHandle,
}

impl ProcessOutput {
    pub fn lines(&mut self) -> OutputLines<&mut BufReader<PipeReader>> {
        output_lines(&mut self.reader)
    }

    /// Waits for exit. Call after the output stream has ended.
    pub fn wait(self) -> io::Result<RunOutcome> {
        let ProcessOutput { reader, cancel } = self;
        drop(reader);
        let status = cancel.wait()?;
        info!("Child process exited with {}", status);
        Ok(RunOutcome::from_status(status, cancel.is_cancelled()))
    }
}

/// Spawns the command with stdout and stderr merged. Never retries.
pub fn launch(command: &ScriptCommand, cancel: &CancelHandle) -> Result<ProcessOutput, PanelError> {
    let (reader, writer) = io::pipe().map_err(PanelError::Launch)?;
    let writer_err = writer.try_clone().map_err(PanelError::Launch)?;

    // The Command keeps the parent's copies of the write end; it must be gone
    // before reading or EOF never arrives.
    let child = {
        let mut cmd = Command::new(command.program());
        cmd.args(command.arguments())
            .env("PYTHONUNBUFFERED", "1")
            .stdin(Stdio::null())
            .stdout(writer)
            .stderr(writer_err);
        cmd.spawn().map_err(PanelError::Launch)?
    };
    info!("Launched pid {}: {}", child.id(), command);

    cancel.attach(child).map_err(PanelError::Launch)?;
    Ok(ProcessOutput {
        reader: BufReader::new(reader),
        cancel: cancel.clone(),
    })
}

/// Relays every line to `sink` in order, then waits for exit. A sink returning
/// `false` (receiver gone) kills the child.
pub fn stream_output<F>(mut process: ProcessOutput, mut sink: F) -> io::Result<RunOutcome>
where
    F: FnMut(String) -> bool,
{
    let mut count = 0usize;
    for line in process.lines() {
        match line {
            Ok(line) => {
                count += 1;
                if !sink(line) {
                    warn!("Output sink closed; stopping child process");
                    process.cancel.cancel();
                    break;
                }
            }
            Err(e) => {
                warn!("Error reading child output: {}", e);
                break;
            }
        }
    }
    info!("Output stream ended after {} lines", count);
    process.wait()
}

/// Explicit single-run guard.
#[derive(Clone, Default)]
pub struct RunSlot {
    busy: Arc<AtomicBool>,
}

pub struct RunGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::SeqCst);
    }
}

impl RunSlot {
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    pub fn try_acquire(&self) -> Option<RunGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| RunGuard {
                busy: self.busy.clone(),
            })
    }
}

pub struct RunHandle {
    pub rx: mpsc::Receiver<RunMessage>,
    pub cancel: CancelHandle,
}

/// Starts validate → build → launch → stream → report on a blocking worker.
/// Must be called from within a tokio runtime.
pub fn start_run(config: PanelConfig, slot: &RunSlot) -> Result<RunHandle, PanelError> {
    let guard = slot.try_acquire().ok_or(PanelError::AlreadyRunning)?;
    let (tx, rx) = mpsc::channel(RUN_CHANNEL_CAPACITY);
    let cancel = CancelHandle::default();
    let worker_cancel = cancel.clone();

    tokio::task::spawn_blocking(move || {
        let last = execute_run(&config, &worker_cancel, &tx);
        // Release the slot before the terminal message so the receiver can
        // start the next run as soon as it sees it.
        drop(guard);
        let _ = tx.blocking_send(last);
    });

    Ok(RunHandle { rx, cancel })
}

/// Returns the terminal message; everything before it is sent on `tx`.
fn execute_run(config: &PanelConfig, cancel: &CancelHandle, tx: &mpsc::Sender<RunMessage>) -> RunMessage {
    let send = |msg: RunMessage| tx.blocking_send(msg).is_ok();

    send(RunMessage::Phase(RunPhase::Validating));
    if let Err(e) = check_mt5_path(&config.mt5_files_path) {
        return RunMessage::from_error(e.into());
    }
    let validated = match validate_configuration(config) {
        Ok(v) => v,
        Err(e) => return RunMessage::from_error(e),
    };
    for warning in &validated.warnings {
        send(RunMessage::Warning(warning.clone()));
    }

    send(RunMessage::Phase(RunPhase::Building));
    let command = match build_command(&validated) {
        Ok(c) => c,
        Err(e) => return RunMessage::from_error(e.into()),
    };

    send(RunMessage::Phase(RunPhase::Launching));
    let process = match launch(&command, cancel) {
        Ok(p) => p,
        Err(e) => return RunMessage::from_error(e),
    };
    send(RunMessage::Started {
        command_line: command.to_string(),
    });

    send(RunMessage::Phase(RunPhase::Streaming));
    match stream_output(process, |line| send(RunMessage::Line(line))) {
        Ok(outcome) => {
            info!("Run finished: {}", outcome.status_text());
            RunMessage::Finished(outcome)
        }
        Err(e) => {
            error!("Failed to wait for process: {}", e);
            RunMessage::Error {
                title: "Process error",
                message: format!("Failed to wait for process: {}", e),
            }
        }
    }
}
