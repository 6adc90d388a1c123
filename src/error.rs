//! Error types for pipeline parsing, resolution and execution.

use std::fmt;
use std::io;

use thiserror::Error;

use crate::exec::Handle;

/// Which caller-facing end of a pipeline a stream request targeted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// Standard input of the first process.
    HeadInput,
    /// Standard output of the last process.
    TailOutput,
}

impl fmt::Display for StreamEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamEnd::HeadInput => f.write_str("head input"),
            StreamEnd::TailOutput => f.write_str("tail output"),
        }
    }
}

/// Availability of a caller-facing stream on a [`Handle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// The stream is held by the handle and can be used.
    Available,
    /// The template had no edge marker for this end.
    NotRequested,
    /// The stream was already taken or closed by the caller.
    Taken,
    /// Pipeline construction failed before this end was spawned.
    Incomplete,
}

impl StreamState {
    pub fn as_str(self) -> &'static str {
        match self {
            StreamState::Available => "available",
            StreamState::NotRequested => "not requested by an edge marker",
            StreamState::Taken => "already taken",
            StreamState::Incomplete => "not spawned",
        }
    }
}

/// Everything that can go wrong between a template and a finished pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// Empty template, marker-only template, or an empty segment.
    #[error("malformed pipeline: {reason}")]
    MalformedPipeline { reason: String },

    /// A `$name` token has no binding.
    #[error("undefined variable ${name} in segment {segment}")]
    UndefinedVariable { name: String, segment: usize },

    /// A process could not be started. Carries the partially built pipeline.
    #[error(transparent)]
    Spawn(Box<SpawnFailure>),

    /// A caller stream was requested that the handle does not hold.
    #[error("{stream} is unavailable: {}", .state.as_str())]
    StreamUnavailable { stream: StreamEnd, state: StreamState },

    /// A regular variable used the reserved configuration prefix.
    #[error("binding name {name:?} uses the reserved prefix {prefix:?}")]
    ReservedName { name: String, prefix: String },

    /// A binding value has the wrong shape for where it is used.
    #[error("invalid binding {name:?}: {reason}")]
    InvalidBinding { name: String, reason: String },

    /// Waiting on a spawned process failed.
    #[error("failed to wait for segment {index}: {source}")]
    Wait {
        index: usize,
        #[source]
        source: io::Error,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("config parse error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("logger already initialised: {0}")]
    Logger(#[from] log::SetLoggerError),

    #[error("invalid log level {0:?}")]
    InvalidLogLevel(String),
}

impl Error {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Error::MalformedPipeline {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_binding(name: &str, reason: impl Into<String>) -> Self {
        Error::InvalidBinding {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// A failed spawn together with whatever did start before it.
///
/// Processes spawned before the failing segment keep running; nothing is
/// killed. Use [`SpawnFailure::into_partial`] to wait on them.
#[derive(Debug, Error)]
#[error("failed to spawn segment {index} ({}): {source}", crate::render_argv(.argv))]
pub struct SpawnFailure {
    pub index: usize,
    pub argv: Vec<String>,
    #[source]
    pub source: io::Error,
    pub partial: Handle,
}

impl SpawnFailure {
    /// The handle over the processes that did start.
    pub fn into_partial(self) -> Handle {
        self.partial
    }
}
