//! Line-oriented category outline parser.
//!
//! Each line reads `mode:Path-To-Category:Child1 Child2 ...`, e.g.
//! `one:Face-Eyes:Open Closed Wink`. Full-width colons are accepted, a
//! leading `root` path segment is ignored, blank lines and `#` comments are
//! skipped.

use crate::index::layer_index::PATH_SEPARATOR;
use crate::model::category::ROOT_CATEGORY_NAME;
use crate::model::mode::VisibilityMode;
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};

static OUTLINE_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([A-Za-z]+)\s*[:：]\s*([^:：]*?)\s*[:：]\s*(.*?)\s*$")
        .expect("valid outline line regex")
});
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid ws regex"));

/// Parse failure for one outline line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutlineError {
    /// Line does not have the `mode:path:children` shape.
    Malformed { line_no: usize, line: String },
    /// Mode field is not a known mode.
    UnknownMode { line_no: usize, mode: String },
    /// Line names no children.
    NoChildren { line_no: usize },
}

impl Display for OutlineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed { line_no, line } => {
                write!(f, "outline line {line_no} is malformed: `{line}`")
            }
            Self::UnknownMode { line_no, mode } => {
                write!(f, "outline line {line_no} has unknown mode `{mode}`")
            }
            Self::NoChildren { line_no } => write!(f, "outline line {line_no} names no children"),
        }
    }
}

impl Error for OutlineError {}

/// One parsed outline instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutlineLine {
    /// 1-based source line.
    pub line_no: usize,
    pub mode: VisibilityMode,
    /// Category path below the root; empty addresses the root.
    pub path: Vec<String>,
    /// New sub-category names, in order.
    pub children: Vec<String>,
}

/// Parses a whole outline document.
pub fn parse_outline(text: &str) -> Result<Vec<OutlineLine>, OutlineError> {
    let mut output = Vec::new();
    for (offset, raw) in text.lines().enumerate() {
        let line_no = offset + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        output.push(parse_line(line_no, trimmed)?);
    }
    Ok(output)
}

fn parse_line(line_no: usize, line: &str) -> Result<OutlineLine, OutlineError> {
    let captures = OUTLINE_LINE_RE
        .captures(line)
        .ok_or_else(|| OutlineError::Malformed {
            line_no,
            line: line.to_string(),
        })?;
    let mode_text = &captures[1];
    let mode = mode_text
        .to_ascii_lowercase()
        .parse()
        .map_err(|_| OutlineError::UnknownMode {
            line_no,
            mode: mode_text.to_string(),
        })?;

    let mut path: Vec<String> = captures[2]
        .split(PATH_SEPARATOR)
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect();
    if path.first().is_some_and(|first| first == ROOT_CATEGORY_NAME) {
        path.remove(0);
    }

    let children: Vec<String> = WHITESPACE_RE
        .split(&captures[3])
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect();
    if children.is_empty() {
        return Err(OutlineError::NoChildren { line_no });
    }

    Ok(OutlineLine {
        line_no,
        mode,
        path,
        children,
    })
}
