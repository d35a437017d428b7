//! Character cursor over a source file, tracking line and column.

use crate::span::{Location, SourceFile, Span};

pub(crate) const NULL_CHAR: char = '\0';

/// Peekable cursor over the (ASCII) text of a source file.
#[derive(Clone)]
pub struct Cursor {
    file: SourceFile,
    pos: usize,
    line: u32,
    column: u32,
}

/// Saved cursor position, for building token spans.
#[derive(Clone, Copy)]
pub struct Mark {
    pos: usize,
    line: u32,
    column: u32,
}

impl Cursor {
    pub fn new(file: SourceFile) -> Cursor {
        Cursor {
            file,
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    pub fn file(&self) -> &SourceFile {
        &self.file
    }

    pub fn is_eof(&self) -> bool {
        self.pos >= self.file.text.len()
    }

    /// The character at the cursor, without consuming it.
    pub fn first(&self) -> char {
        self.file.text.as_bytes().get(self.pos).map_or(NULL_CHAR, |b| *b as char)
    }

    /// The character `n` past the cursor, without consuming anything.
    pub fn peek(&self, n: usize) -> char {
        self.file
            .text
            .as_bytes()
            .get(self.pos + n)
            .map_or(NULL_CHAR, |b| *b as char)
    }

    /// Advance by one character.
    pub fn bump(&mut self) -> Option<char> {
        let ch = self.file.text.as_bytes().get(self.pos).copied()? as char;
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    /// True if the text at the cursor begins with `prefix`.
    pub fn starts_with(&self, prefix: &str) -> bool {
        self.file.text[self.pos..].starts_with(prefix)
    }

    pub fn mark(&self) -> Mark {
        Mark {
            pos: self.pos,
            line: self.line,
            column: self.column,
        }
    }

    /// The source text between a mark and the current position.
    pub fn slice_from(&self, mark: Mark) -> &str {
        &self.file.text[mark.pos..self.pos]
    }

    /// A location spanning from a mark to the current position.
    pub fn loc_from(&self, mark: Mark) -> Location {
        Location::new(
            self.file.clone(),
            mark.line,
            mark.column,
            Span::new(mark.pos as u32, (self.pos - mark.pos) as u32),
        )
    }

    /// A zero-length location at the current position.
    pub fn loc_here(&self) -> Location {
        self.loc_from(self.mark())
    }
}
