//! Types produced by the template parser and consumed by resolution.

use std::fmt;

/// The standalone word that separates segments and marks caller streams.
pub const PIPE: &str = "|";

/// A single whitespace-delimited word of a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Passed through to argv byte for byte.
    Literal(String),
    /// A word starting with `$`; holds everything after the `$`.
    Variable(String),
}

impl Token {
    /// Classify a raw word. Only a leading `$` makes a variable.
    pub fn from_word(word: &str) -> Self {
        match word.strip_prefix('$') {
            Some(name) => Token::Variable(name.to_string()),
            None => Token::Literal(word.to_string()),
        }
    }

    pub fn is_variable(&self) -> bool {
        matches!(self, Token::Variable(_))
    }

    /// The lookup key for a variable token.
    pub fn variable_name(&self) -> Option<&str> {
        match self {
            Token::Variable(name) => Some(name),
            Token::Literal(_) => None,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Literal(text) => f.write_str(text),
            Token::Variable(name) => write!(f, "${name}"),
        }
    }
}

/// One command and its arguments: a single process in the pipeline.
///
/// Never empty when produced by [`parse_template`](super::parse_template).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub tokens: Vec<Token>,
}

impl Segment {
    /// The variable names this segment references, in order.
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().filter_map(Token::variable_name)
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, token) in self.tokens.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{token}")?;
        }
        Ok(())
    }
}

/// A parsed template: segments in pipe order plus the two edge markers.
///
/// For `"| tr a-z A-Z | sort |"` there are two segments and both
/// `reads_from_caller` and `writes_to_caller` are set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSpec {
    pub segments: Vec<Segment>,
    /// A leading `|` was present: the caller feeds the head's stdin.
    pub reads_from_caller: bool,
    /// A trailing `|` was present: the caller reads the tail's stdout.
    pub writes_to_caller: bool,
}

impl PipelineSpec {
    /// True when either edge marker hands a stream to the caller.
    pub fn is_streaming(&self) -> bool {
        self.reads_from_caller || self.writes_to_caller
    }
}

impl fmt::Display for PipelineSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reads_from_caller {
            write!(f, "{PIPE} ")?;
        }
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, " {PIPE} ")?;
            }
            write!(f, "{segment}")?;
        }
        if self.writes_to_caller {
            write!(f, " {PIPE}")?;
        }
        Ok(())
    }
}
