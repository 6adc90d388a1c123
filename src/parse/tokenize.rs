use super::types::{PIPE, PipelineSpec, Segment, Token};
use crate::error::Error;

/// Split a template into words on runs of whitespace.
///
/// No quoting, escaping or globbing: `'a b'` is two words, `a|b` is one.
pub fn words(template: &str) -> impl Iterator<Item = &str> {
    template.split_whitespace()
}

/// Parse a template into segments and edge markers.
///
/// A standalone `|` separates segments. As the first word it sets
/// `reads_from_caller`, as the last word `writes_to_caller`. A `|` fused into
/// a longer word is an ordinary literal.
pub fn parse_template(template: &str) -> Result<PipelineSpec, Error> {
    let mut words: Vec<&str> = words(template).collect();
    if words.is_empty() {
        return Err(Error::malformed("empty template"));
    }

    let reads_from_caller = words.first() == Some(&PIPE);
    if reads_from_caller {
        words.remove(0);
    }
    let writes_to_caller = words.last() == Some(&PIPE);
    if writes_to_caller {
        words.pop();
    }
    if words.is_empty() {
        return Err(Error::malformed("template has pipe markers but no command"));
    }

    let mut segments = Vec::new();
    for (index, group) in words.split(|w| *w == PIPE).enumerate() {
        if group.is_empty() {
            return Err(Error::malformed(format!(
                "empty segment at position {index} (consecutive pipe markers)"
            )));
        }
        segments.push(Segment {
            tokens: group.iter().map(|w| Token::from_word(w)).collect(),
        });
    }

    log::debug!(
        "parsed {} segment(s), reads_from_caller={reads_from_caller}, writes_to_caller={writes_to_caller}",
        segments.len()
    );

    Ok(PipelineSpec {
        segments,
        reads_from_caller,
        writes_to_caller,
    })
}
