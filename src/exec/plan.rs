use std::fmt;
use std::io;
use std::process::{Child, ChildStdout, Command, Stdio};

use crate::bindings::{Bindings, ProcessOptions};
use crate::config::Config;
use crate::error::{Error, SpawnFailure};
use crate::parse::PipelineSpec;
use crate::resolve::resolve_pipeline;

use super::handle::Handle;

/// Where a process reads its standard input from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdinSource {
    /// The host's own stdin.
    Inherit,
    /// A pipe whose write end is handed to the caller.
    Caller,
    /// The previous segment's stdout.
    PreviousSegment,
}

/// Where a process writes its standard output to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdoutSink {
    /// The host's own stdout.
    Inherit,
    /// A pipe whose read end is handed to the caller.
    Caller,
    /// The next segment's stdin.
    NextSegment,
}

/// Whether building a pipeline waits for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// No edge markers: block until every process exits.
    Synchronous,
    /// At least one edge marker: return right after spawning.
    Streaming,
}

/// One fully resolved process of a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessDescriptor {
    pub index: usize,
    /// Program followed by its arguments. Never empty.
    pub argv: Vec<String>,
    pub stdin: StdinSource,
    pub stdout: StdoutSink,
}

impl fmt::Display for ProcessDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&crate::render_argv(&self.argv))
    }
}

/// A resolved pipeline that has not been spawned yet.
///
/// Building a plan performs every check that can fail before a process
/// starts: parsing has already happened, and every variable of every
/// segment is resolved here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    processes: Vec<ProcessDescriptor>,
    options: ProcessOptions,
    keep_env: Vec<String>,
    mode: Mode,
}

impl ExecutionPlan {
    /// Resolve `spec` against `bindings` and wire up the streams.
    ///
    /// Working directory and environment from the bindings apply to every
    /// process of the pipeline.
    pub fn new(spec: &PipelineSpec, bindings: &Bindings) -> Result<Self, Error> {
        let commands = resolve_pipeline(spec, bindings)?;
        let Some(last) = commands.len().checked_sub(1) else {
            return Err(Error::malformed("pipeline has no segments"));
        };

        let processes = commands
            .into_iter()
            .enumerate()
            .map(|(index, argv)| ProcessDescriptor {
                index,
                argv,
                stdin: if index > 0 {
                    StdinSource::PreviousSegment
                } else if spec.reads_from_caller {
                    StdinSource::Caller
                } else {
                    StdinSource::Inherit
                },
                stdout: if index < last {
                    StdoutSink::NextSegment
                } else if spec.writes_to_caller {
                    StdoutSink::Caller
                } else {
                    StdoutSink::Inherit
                },
            })
            .collect();

        Ok(Self {
            processes,
            options: bindings.options().clone(),
            keep_env: Vec::new(),
            mode: if spec.is_streaming() {
                Mode::Streaming
            } else {
                Mode::Synchronous
            },
        })
    }

    /// Apply the environment settings from `config`.
    pub fn with_config(mut self, config: &Config) -> Self {
        self.keep_env = config.environment.keep.clone();
        self
    }

    /// Host variables copied into a replacement environment.
    pub fn keep_env(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.keep_env = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn processes(&self) -> &[ProcessDescriptor] {
        &self.processes
    }

    pub fn options(&self) -> &ProcessOptions {
        &self.options
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Spawn every process left to right, connecting neighbours with OS
    /// pipes.
    ///
    /// In [`Mode::Synchronous`] this waits for the whole pipeline before
    /// returning. On a spawn failure, processes that already started are
    /// left running and returned inside [`Error::Spawn`].
    pub fn spawn(self) -> Result<Handle, Error> {
        let first = self.processes.first();
        let last = self.processes.last();
        let mut handle = Handle::new(
            self.mode,
            self.processes.len(),
            first.is_some_and(|p| p.stdin == StdinSource::Caller),
            last.is_some_and(|p| p.stdout == StdoutSink::Caller),
        );

        let mut upstream: Option<ChildStdout> = None;
        for desc in self.processes {
            let stdin = match desc.stdin {
                StdinSource::Inherit => Stdio::inherit(),
                StdinSource::Caller => Stdio::piped(),
                // The previous child was spawned with a piped stdout, so
                // `upstream` is always set here.
                StdinSource::PreviousSegment => upstream.take().map_or_else(Stdio::null, Stdio::from),
            };
            let stdout = match desc.stdout {
                StdoutSink::Inherit => Stdio::inherit(),
                StdoutSink::Caller | StdoutSink::NextSegment => Stdio::piped(),
            };

            log::info!("spawning segment {}: {desc}", desc.index);
            match spawn_process(&desc.argv, stdin, stdout, &self.options, &self.keep_env) {
                Ok(mut child) => {
                    if desc.stdin == StdinSource::Caller {
                        handle.attach_stdin(child.stdin.take());
                    }
                    match desc.stdout {
                        StdoutSink::NextSegment => upstream = child.stdout.take(),
                        StdoutSink::Caller => handle.attach_stdout(child.stdout.take()),
                        StdoutSink::Inherit => {}
                    }
                    handle.push(desc.argv, child);
                }
                Err(source) => {
                    log::warn!(
                        "failed to spawn segment {}: {desc}: {source}; {} process(es) already running",
                        desc.index,
                        handle.len()
                    );
                    // The read end meant for this segment went into the
                    // dropped `Command`, so the producer sees a broken pipe
                    // like it would in a shell.
                    return Err(Error::Spawn(Box::new(SpawnFailure {
                        index: desc.index,
                        argv: desc.argv,
                        source,
                        partial: handle,
                    })));
                }
            }
        }

        if self.mode == Mode::Synchronous {
            let status = handle.wait()?;
            log::debug!("pipeline finished: success={}", status.success());
        }
        Ok(handle)
    }
}

/// Spawn one process. The `Command` and the pipe ends it owns are dropped
/// on return, so the host keeps no copy of a write end it handed off and
/// readers see end-of-stream when the real producer exits.
fn spawn_process(
    argv: &[String],
    stdin: Stdio,
    stdout: Stdio,
    options: &ProcessOptions,
    keep_env: &[String],
) -> io::Result<Child> {
    let Some((program, args)) = argv.split_first() else {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty argv"));
    };

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(stdin)
        .stdout(stdout)
        .stderr(Stdio::inherit());

    if let Some(dir) = &options.cwd {
        command.current_dir(dir);
    }
    if let Some(env) = &options.env {
        command.env_clear();
        for name in keep_env {
            if let Some(value) = std::env::var_os(name) {
                command.env(name, value);
            }
        }
        command.envs(env.iter().map(|(k, v)| (k, v)));
    }

    command.spawn()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_template;
    use std::path::PathBuf;

    fn plan(template: &str, bindings: &Bindings) -> ExecutionPlan {
        ExecutionPlan::new(&parse_template(template).unwrap(), bindings).unwrap()
    }

    fn wiring(plan: &ExecutionPlan) -> Vec<(StdinSource, StdoutSink)> {
        plan.processes().iter().map(|p| (p.stdin, p.stdout)).collect()
    }

    #[test]
    fn synchronous_single_command_inherits_both_ends() {
        let plan = plan("ls -l", &Bindings::new());
        assert_eq!(plan.mode(), Mode::Synchronous);
        assert_eq!(wiring(&plan), vec![(StdinSource::Inherit, StdoutSink::Inherit)]);
    }

    #[test]
    fn trailing_marker_hands_tail_output_to_caller() {
        let plan = plan("dmesg | grep hda |", &Bindings::new());
        assert_eq!(plan.mode(), Mode::Streaming);
        assert_eq!(
            wiring(&plan),
            vec![
                (StdinSource::Inherit, StdoutSink::NextSegment),
                (StdinSource::PreviousSegment, StdoutSink::Caller),
            ]
        );
        assert_eq!(plan.processes()[1].argv, vec!["grep", "hda"]);
    }

    #[test]
    fn leading_marker_hands_head_input_to_caller() {
        let plan = plan("| sort | uniq -c | head", &Bindings::new());
        assert_eq!(plan.mode(), Mode::Streaming);
        assert_eq!(
            wiring(&plan),
            vec![
                (StdinSource::Caller, StdoutSink::NextSegment),
                (StdinSource::PreviousSegment, StdoutSink::NextSegment),
                (StdinSource::PreviousSegment, StdoutSink::Inherit),
            ]
        );
    }

    #[test]
    fn single_segment_with_both_markers() {
        let plan = plan("| cat |", &Bindings::new());
        assert_eq!(wiring(&plan), vec![(StdinSource::Caller, StdoutSink::Caller)]);
    }

    #[test]
    fn options_apply_pipeline_wide() {
        let b = Bindings::new()
            .with("_cwd", "/tmp")
            .unwrap()
            .with("_env", ["LANG=C"])
            .unwrap();
        let plan = plan("ls | wc -l", &b);
        assert_eq!(plan.options().cwd, Some(PathBuf::from("/tmp")));
        assert_eq!(plan.options().env, Some(vec![("LANG".into(), "C".into())]));
    }

    #[test]
    fn undefined_variable_fails_before_spawn() {
        let spec = parse_template("echo ok | grep $missing").unwrap();
        assert!(matches!(
            ExecutionPlan::new(&spec, &Bindings::new()),
            Err(Error::UndefinedVariable { segment: 1, .. })
        ));
    }

    #[test]
    fn descriptor_display_quotes_arguments() {
        let b = Bindings::new().with("msg", "hello world").unwrap();
        let plan = plan("echo $msg", &b);
        assert_eq!(plan.processes()[0].to_string(), "echo 'hello world'");
    }

    #[test]
    fn keep_env_from_config() {
        let mut config = Config::default_config();
        config.environment.keep = vec!["PATH".into()];
        let plan = plan("true", &Bindings::new()).with_config(&config);
        assert_eq!(plan.keep_env, vec!["PATH"]);
    }
}
