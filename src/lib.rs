//! safepipe: shell-like process pipelines without a shell.
//!
//! A template such as `"find $dir -name $pattern | sort |"` is split on
//! whitespace into words, cut into segments at standalone `|` words, and
//! every word that *starts* with `$` is replaced by its binding. Nothing else
//! is interpreted: no quotes, escapes, globs or redirections. A bound value is
//! always exactly one argument (a scalar) or exactly `k` arguments (a
//! sequence), so untrusted values cannot inject extra commands or arguments.
//!
//! A leading `|` hands the head process's stdin to the caller, a trailing `|`
//! hands over the tail's stdout. Without either marker the pipeline runs to
//! completion before [`sh`] returns.
//!
//! ```no_run
//! use safepipe::{Bindings, sh};
//!
//! let bindings = Bindings::new().with("dir", "/var/log")?;
//! let output = sh("ls -1 $dir | sort -r |", &bindings)?.collect()?;
//! print!("{}", output.stdout_lossy());
//! # Ok::<(), safepipe::Error>(())
//! ```
//!
//! # Architecture
//!
//! - **[`parse`]**: Template tokenizer: words, segments, edge markers.
//! - **[`bindings`]**: Variable values and reserved process options (`_cwd`, `_env`).
//! - **[`resolve`]**: Whole-word substitution and sequence expansion.
//! - **[`exec`]**: Execution plans, process spawning and the pipeline [`Handle`].
//! - **[`config`]**: Configuration loading: embedded defaults + user overlay merge.
//! - **[`logging`]**: Logger setup for the `log` records emitted by the crate.

/// Variable bindings and reserved process options.
pub mod bindings;
/// Configuration types, loading, and overlay merge logic.
pub mod config;
/// Error and stream-availability types.
pub mod error;
/// Execution plans, spawning and pipeline handles.
pub mod exec;
/// Logger initialisation.
pub mod logging;
/// Template parsing: words, tokens, segments, edge markers.
pub mod parse;
/// Variable resolution.
pub mod resolve;

pub use bindings::{Bindings, ProcessOptions, Value};
pub use config::Config;
pub use error::{Error, SpawnFailure, StreamEnd, StreamState};
pub use exec::{ExecutionPlan, Handle, Mode, Output, PipelineStatus};
pub use parse::{PipelineSpec, parse_template};

/// Parse `template` and resolve it against `bindings` without spawning.
pub fn plan(template: &str, bindings: &Bindings) -> Result<ExecutionPlan, Error> {
    let spec = parse_template(template)?;
    ExecutionPlan::new(&spec, bindings)
}

/// Build and start a pipeline.
///
/// Every segment is resolved before the first process is spawned. Without
/// edge markers the returned handle is already terminal; check
/// [`Handle::status`]. With markers the caller drives the streams and must
/// call [`Handle::wait`] (or [`Handle::collect`]).
pub fn sh(template: &str, bindings: &Bindings) -> Result<Handle, Error> {
    plan(template, bindings)?.spawn()
}

/// Like [`sh`], applying the environment settings from `config`.
pub fn sh_with_config(template: &str, bindings: &Bindings, config: &Config) -> Result<Handle, Error> {
    plan(template, bindings)?.with_config(config).spawn()
}

/// Render an argv for logs and error messages, quoted so it reads like the
/// command it is.
pub(crate) fn render_argv(argv: &[String]) -> String {
    shlex::try_join(argv.iter().map(String::as_str)).unwrap_or_else(|_| format!("{argv:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_reports_streaming_mode() {
        let plan = plan("dmesg | grep hda |", &Bindings::new()).unwrap();
        assert_eq!(plan.mode(), Mode::Streaming);
        assert_eq!(plan.processes().len(), 2);
    }

    #[test]
    fn malformed_template_never_spawns() {
        assert!(matches!(
            sh("a | | b", &Bindings::new()),
            Err(Error::MalformedPipeline { .. })
        ));
    }

    #[test]
    fn render_argv_quotes() {
        assert_eq!(render_argv(&["ls".to_string(), "a b".to_string()]), "ls 'a b'");
        assert_eq!(render_argv(&["true".to_string()]), "true");
    }
}
