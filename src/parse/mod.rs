pub mod tokenize;
pub mod types;

pub use tokenize::{parse_template, words};
pub use types::{PIPE, PipelineSpec, Segment, Token};
