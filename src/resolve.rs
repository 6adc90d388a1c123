//! Whole-word variable substitution.
//!
//! Substitution happens exactly once: resolved values are never re-split on
//! whitespace and never scanned again for `$` or `|`.

use crate::bindings::{Bindings, Value};
use crate::error::Error;
use crate::parse::{PipelineSpec, Segment, Token};

/// Append the arguments `token` resolves to onto `argv`.
fn resolve_into(
    token: &Token,
    segment: usize,
    bindings: &Bindings,
    argv: &mut Vec<String>,
) -> Result<(), Error> {
    match token {
        Token::Literal(text) => argv.push(text.clone()),
        Token::Variable(name) => match bindings.get(name) {
            Some(Value::Scalar(value)) => argv.push(value.clone()),
            Some(Value::Sequence(values)) => argv.extend(values.iter().cloned()),
            None => {
                return Err(Error::UndefinedVariable {
                    name: name.clone(),
                    segment,
                });
            }
        },
    }
    Ok(())
}

/// Resolve a single token of segment `segment` to zero or more arguments.
pub fn resolve_token(token: &Token, segment: usize, bindings: &Bindings) -> Result<Vec<String>, Error> {
    let mut argv = Vec::new();
    resolve_into(token, segment, bindings, &mut argv)?;
    Ok(argv)
}

/// Resolve every token of segment `index` into its argv.
///
/// The result may be empty when the segment consists only of variables
/// bound to empty sequences; the caller decides whether that is an error.
pub fn resolve_segment(
    segment: &Segment,
    index: usize,
    bindings: &Bindings,
) -> Result<Vec<String>, Error> {
    let mut argv = Vec::with_capacity(segment.tokens.len());
    for token in &segment.tokens {
        resolve_into(token, index, bindings, &mut argv)?;
    }
    Ok(argv)
}

/// Resolve all segments up front so a typo anywhere fails before anything
/// is spawned.
pub fn resolve_pipeline(spec: &PipelineSpec, bindings: &Bindings) -> Result<Vec<Vec<String>>, Error> {
    let mut commands = Vec::with_capacity(spec.segments.len());
    for (index, segment) in spec.segments.iter().enumerate() {
        let argv = resolve_segment(segment, index, bindings)?;
        if argv.is_empty() {
            return Err(Error::malformed(format!(
                "segment {index} ({segment}) resolved to an empty command"
            )));
        }
        log::debug!("segment {index} resolved to {}", crate::render_argv(&argv));
        commands.push(argv);
    }
    Ok(commands)
}
