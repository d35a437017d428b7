use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use miette::SourceSpan;

/// A source file registered with the toolchain.
///
/// Parsed files are reference-counted so that every [`Location`] can carry a
/// cheap handle to the text it points into, for use by diagnostics and the
/// debugger's `list` command.
#[derive(Clone, Debug)]
pub struct SourceFile {
    pub path: Arc<str>,
    pub text: Arc<str>,
}

impl SourceFile {
    pub fn new(path: impl Into<Arc<str>>, text: impl Into<Arc<str>>) -> Self {
        SourceFile {
            path: path.into(),
            text: text.into(),
        }
    }

    /// Line `lineno` (counting from 1) of the file, without its terminator.
    pub fn line(&self, lineno: u32) -> Option<&str> {
        self.text.lines().nth(lineno as usize - 1)
    }

    pub fn line_count(&self) -> u32 {
        self.text.lines().count() as u32
    }
}

impl PartialEq for SourceFile {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.text, &other.text) || self.path == other.path
    }
}
impl Eq for SourceFile {}

/// Byte range within a single source file.
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub struct Span {
    start: u32,
    len: u32,
}

impl Span {
    pub fn new(start: u32, len: u32) -> Self {
        Span { start, len }
    }

    pub fn start(&self) -> usize {
        self.start as usize
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn end(&self) -> usize {
        (self.start + self.len) as usize
    }

    pub fn as_range(&self) -> Range<usize> {
        self.start()..self.end()
    }
}

impl From<Span> for SourceSpan {
    fn from(value: Span) -> Self {
        SourceSpan::new(value.start().into(), value.len())
    }
}

/// A position in a source file, carried by every token, operation and
/// diagnostic. Line and column count from 1.
#[derive(Clone, PartialEq, Debug)]
pub struct Location {
    pub file: SourceFile,
    pub line: u32,
    pub column: u32,
    pub span: Span,
}

impl Location {
    pub fn new(file: SourceFile, line: u32, column: u32, span: Span) -> Self {
        Location {
            file,
            line,
            column,
            span,
        }
    }

    /// Sort key for ordering diagnostics in source order.
    pub fn sort_key(&self) -> (Arc<str>, u32, u32) {
        (Arc::clone(&self.file.path), self.line, self.column)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file.path, self.line)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn line_lookup() {
        let file = SourceFile::new("<test>", "SET(R1, 1)\nHALT()\n");
        assert_eq!(file.line(1), Some("SET(R1, 1)"));
        assert_eq!(file.line(2), Some("HALT()"));
        assert_eq!(file.line(3), None);
        assert_eq!(file.line_count(), 2);
    }

    #[test]
    fn span_range() {
        let span = Span::new(4, 6);
        assert_eq!(span.as_range(), 4..10);
        assert_eq!(span.end(), 10);
    }
}
