//! Outbound line protocol
//!
//! Every line the client receives is UTF-8 and newline terminated:
//!
//! ```text
//! [stdout]<diagnostic>
//! [stderr]<diagnostic>
//! [result]FAILED | [result]<image reference>
//! ```
//!
//! Exactly one `[result]` line is sent per connection and it is always last.

use crate::tag::ImageTag;
use std::fmt;

pub const RESULT_TAG: &str = "result";
pub const FAILURE_TOKEN: &str = "FAILED";

/// Which external-process stream a diagnostic line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    pub fn tag(&self) -> &'static str {
        match self {
            Stream::Stdout => "stdout",
            Stream::Stderr => "stderr",
        }
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// The terminal status of a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultLine {
    Failed,
    Success(ImageTag),
}

impl ResultLine {
    pub fn is_success(&self) -> bool {
        matches!(self, ResultLine::Success(_))
    }

    /// Encoded line, including the trailing newline
    pub fn encode(&self) -> String {
        format!("{}\n", self)
    }
}

impl fmt::Display for ResultLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultLine::Failed => write!(f, "[{}]{}", RESULT_TAG, FAILURE_TOKEN),
            ResultLine::Success(tag) => write!(f, "[{}]{}", RESULT_TAG, tag),
        }
    }
}

/// Encode a diagnostic line, including the trailing newline
pub fn encode_line(stream: Stream, text: &str) -> String {
    let mut line = String::with_capacity(stream.tag().len() + text.len() + 3);
    line.push('[');
    line.push_str(stream.tag());
    line.push(']');
    line.push_str(text);
    line.push('\n');
    line
}
