use std::borrow::Cow;
use std::io::Read;
use std::process::{Child, ChildStdin, ChildStdout, ExitStatus};

use serde::Serialize;

use crate::error::{Error, StreamEnd, StreamState};

use super::plan::Mode;

/// A caller-facing stream end and its availability.
#[derive(Debug)]
enum Slot<T> {
    Open(T),
    NotRequested,
    Taken,
    Incomplete,
}

impl<T> Slot<T> {
    /// Initial state before the owning process is spawned.
    fn pending(requested: bool) -> Self {
        if requested {
            Slot::Incomplete
        } else {
            Slot::NotRequested
        }
    }

    fn state(&self) -> StreamState {
        match self {
            Slot::Open(_) => StreamState::Available,
            Slot::NotRequested => StreamState::NotRequested,
            Slot::Taken => StreamState::Taken,
            Slot::Incomplete => StreamState::Incomplete,
        }
    }

    fn get(&mut self, stream: StreamEnd) -> Result<&mut T, Error> {
        match self {
            Slot::Open(inner) => Ok(inner),
            other => Err(Error::StreamUnavailable {
                stream,
                state: other.state(),
            }),
        }
    }

    fn take(&mut self, stream: StreamEnd) -> Result<T, Error> {
        match std::mem::replace(self, Slot::Taken) {
            Slot::Open(inner) => Ok(inner),
            other => {
                let state = other.state();
                *self = other;
                Err(Error::StreamUnavailable { stream, state })
            }
        }
    }
}

#[derive(Debug)]
struct Process {
    argv: Vec<String>,
    child: Child,
    status: Option<ExitStatus>,
}

/// Exit record for one process of a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessExit {
    pub index: usize,
    pub argv: Vec<String>,
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    pub success: bool,
}

/// Exit statuses of every spawned process, in segment order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineStatus {
    exits: Vec<ProcessExit>,
    complete: bool,
}

impl PipelineStatus {
    /// True iff the whole pipeline was spawned and every process exited 0.
    pub fn success(&self) -> bool {
        self.complete && self.exits.iter().all(|e| e.success)
    }

    pub fn exits(&self) -> &[ProcessExit] {
        &self.exits
    }

    pub fn codes(&self) -> Vec<Option<i32>> {
        self.exits.iter().map(|e| e.code).collect()
    }

    pub fn code(&self, index: usize) -> Option<i32> {
        self.exits.get(index).and_then(|e| e.code)
    }

    /// Exit code of the last spawned process, as a shell's `$?` reports.
    pub fn last_code(&self) -> Option<i32> {
        self.exits.last().and_then(|e| e.code)
    }

    /// False when a spawn failure left later segments unstarted.
    pub fn is_complete(&self) -> bool {
        self.complete
    }
}

/// Captured tail output plus the final status, from [`Handle::collect`].
#[derive(Debug, Clone)]
pub struct Output {
    pub stdout: Vec<u8>,
    pub status: PipelineStatus,
}

impl Output {
    pub fn stdout_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }
}

/// A running or finished pipeline.
///
/// The caller owns every process and stream in it. Streaming handles must
/// eventually be waited on; dropping one does not kill or reap anything.
///
/// Driving both ends from one thread can deadlock once the OS pipe buffers
/// fill: write the input from another thread, or close it before reading
/// large outputs.
#[derive(Debug)]
pub struct Handle {
    processes: Vec<Process>,
    segments: usize,
    mode: Mode,
    stdin: Slot<ChildStdin>,
    stdout: Slot<ChildStdout>,
}

impl Handle {
    pub(crate) fn new(mode: Mode, segments: usize, reads_from_caller: bool, writes_to_caller: bool) -> Self {
        Self {
            processes: Vec::with_capacity(segments),
            segments,
            mode,
            stdin: Slot::pending(reads_from_caller),
            stdout: Slot::pending(writes_to_caller),
        }
    }

    pub(crate) fn attach_stdin(&mut self, stdin: Option<ChildStdin>) {
        if let Some(stdin) = stdin {
            self.stdin = Slot::Open(stdin);
        }
    }

    pub(crate) fn attach_stdout(&mut self, stdout: Option<ChildStdout>) {
        if let Some(stdout) = stdout {
            self.stdout = Slot::Open(stdout);
        }
    }

    pub(crate) fn push(&mut self, argv: Vec<String>, child: Child) {
        self.processes.push(Process {
            argv,
            child,
            status: None,
        });
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Number of processes actually spawned.
    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    /// Whether every segment of the template was spawned.
    pub fn is_complete(&self) -> bool {
        self.processes.len() == self.segments
    }

    pub fn argv(&self, index: usize) -> Option<&[String]> {
        self.processes.get(index).map(|p| p.argv.as_slice())
    }

    pub fn pids(&self) -> Vec<u32> {
        self.processes.iter().map(|p| p.child.id()).collect()
    }

    pub fn stdin_state(&self) -> StreamState {
        self.stdin.state()
    }

    pub fn stdout_state(&self) -> StreamState {
        self.stdout.state()
    }

    /// Head process input. Requires a leading `|` in the template.
    pub fn stdin(&mut self) -> Result<&mut ChildStdin, Error> {
        self.stdin.get(StreamEnd::HeadInput)
    }

    pub fn take_stdin(&mut self) -> Result<ChildStdin, Error> {
        self.stdin.take(StreamEnd::HeadInput)
    }

    /// Close the head input so the pipeline sees end-of-stream.
    pub fn close_stdin(&mut self) -> Result<(), Error> {
        self.take_stdin().map(drop)
    }

    /// Tail process output. Requires a trailing `|` in the template.
    pub fn stdout(&mut self) -> Result<&mut ChildStdout, Error> {
        self.stdout.get(StreamEnd::TailOutput)
    }

    pub fn take_stdout(&mut self) -> Result<ChildStdout, Error> {
        self.stdout.take(StreamEnd::TailOutput)
    }

    /// Wait for every process to exit.
    ///
    /// Head input still held by the handle is closed first, as
    /// [`std::process::Child::wait`] does. Tail output is left open: read it
    /// before waiting or the tail may block on a full pipe.
    pub fn wait(&mut self) -> Result<PipelineStatus, Error> {
        if let Slot::Open(_) = self.stdin {
            self.stdin = Slot::Taken;
        }
        for (index, process) in self.processes.iter_mut().enumerate() {
            if process.status.is_none() {
                let status = process
                    .child
                    .wait()
                    .map_err(|source| Error::Wait { index, source })?;
                log::debug!("segment {index} exited with {status}");
                process.status = Some(status);
            }
        }
        Ok(self.snapshot())
    }

    /// Poll without blocking. Returns the status once every process exited.
    pub fn try_wait(&mut self) -> Result<Option<PipelineStatus>, Error> {
        for (index, process) in self.processes.iter_mut().enumerate() {
            if process.status.is_none() {
                process.status = process
                    .child
                    .try_wait()
                    .map_err(|source| Error::Wait { index, source })?;
            }
        }
        Ok(self.status())
    }

    pub fn is_finished(&self) -> bool {
        self.processes.iter().all(|p| p.status.is_some())
    }

    /// Recorded status, once every spawned process has been reaped.
    pub fn status(&self) -> Option<PipelineStatus> {
        self.is_finished().then(|| self.snapshot())
    }

    fn snapshot(&self) -> PipelineStatus {
        let exits = self
            .processes
            .iter()
            .enumerate()
            .map(|(index, p)| ProcessExit {
                index,
                argv: p.argv.clone(),
                code: p.status.and_then(|s| s.code()),
                success: p.status.is_some_and(|s| s.success()),
            })
            .collect();
        PipelineStatus {
            exits,
            complete: self.is_complete(),
        }
    }

    /// Close the input, read the tail output to the end, then wait.
    ///
    /// Without a trailing marker there is nothing to read and `stdout` is
    /// empty. If the tail output was already taken, or never spawned, the
    /// processes are still waited on before the error is returned.
    pub fn collect(mut self) -> Result<Output, Error> {
        if let Slot::Open(_) = self.stdin {
            self.stdin = Slot::Taken;
        }
        let mut stdout = Vec::new();
        match self.stdout.state() {
            StreamState::Available => {
                self.take_stdout()?
                    .read_to_end(&mut stdout)
                    .map_err(|source| Error::Io {
                        context: "reading pipeline output".into(),
                        source,
                    })?;
            }
            StreamState::NotRequested => {}
            state => {
                self.wait()?;
                return Err(Error::StreamUnavailable {
                    stream: StreamEnd::TailOutput,
                    state,
                });
            }
        }
        let status = self.wait()?;
        Ok(Output { stdout, status })
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        let running = self.processes.iter().filter(|p| p.status.is_none()).count();
        if running > 0 {
            log::warn!("pipeline handle dropped with {running} unwaited process(es)");
        }
    }
}
