use std::fmt;
use std::rc::Rc;

use ruff_text_size::{TextRange, TextSize};
use serde::{Deserialize, Serialize};

/// A source location: filename plus a 1-based line span and 0-based column span.
///
/// Locations are attached to every AST node and carried by error annotations.
/// Structural AST comparisons ignore them (see [`crate::ast::Module::structurally_eq`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Loc {
    pub filename: Rc<str>,
    pub line_start: u32,
    pub line_end: u32,
    pub col_start: u32,
    pub col_end: u32,
}

impl Loc {
    pub fn new(filename: Rc<str>, line_start: u32, line_end: u32, col_start: u32, col_end: u32) -> Self {
        Self {
            filename,
            line_start,
            line_end,
            col_start,
            col_end,
        }
    }

    /// A placeholder location for nodes that have no source counterpart
    /// (builtins, synthesized residual code).
    pub fn fake() -> Self {
        Self {
            filename: Rc::from("<fake>"),
            line_start: 0,
            line_end: 0,
            col_start: 0,
            col_end: 0,
        }
    }

    /// Location spanning a whole line, used when only a line number is known
    /// (e.g. tokenizer errors).
    pub fn whole_line(filename: Rc<str>, line: u32) -> Self {
        Self {
            filename,
            line_start: line,
            line_end: line,
            col_start: 0,
            col_end: u32::MAX,
        }
    }

    pub fn is_fake(&self) -> bool {
        &*self.filename == "<fake>"
    }
}

impl fmt::Display for Loc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.filename, self.line_start)
    }
}

/// Maps byte offsets in a source file to line/column pairs.
///
/// Built once per parsed file and used while lowering the ruff AST, whose
/// nodes carry byte ranges rather than line/column spans.
pub struct LineIndex {
    /// Byte offset of the start of each line, first entry always 0.
    line_starts: Vec<u32>,
}

impl LineIndex {
    pub fn new(src: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in src.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(u32::try_from(i).unwrap_or(u32::MAX).saturating_add(1));
            }
        }
        Self { line_starts }
    }

    /// Returns the 1-based line and 0-based column of a byte offset.
    pub fn line_col(&self, offset: TextSize) -> (u32, u32) {
        let offset = offset.to_u32();
        let line = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        let col = offset - self.line_starts[line];
        (u32::try_from(line).unwrap_or(0) + 1, col)
    }

    /// Builds a [`Loc`] from a ruff byte range.
    pub fn loc(&self, filename: &Rc<str>, range: TextRange) -> Loc {
        let (line_start, col_start) = self.line_col(range.start());
        let (line_end, col_end) = self.line_col(range.end());
        Loc {
            filename: Rc::clone(filename),
            line_start,
            line_end,
            col_start,
            col_end,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_index_maps_offsets() {
        let idx = LineIndex::new("ab\ncd\n");
        assert_eq!(idx.line_col(TextSize::new(0)), (1, 0));
        assert_eq!(idx.line_col(TextSize::new(1)), (1, 1));
        assert_eq!(idx.line_col(TextSize::new(3)), (2, 0));
        assert_eq!(idx.line_col(TextSize::new(4)), (2, 1));
    }
}
