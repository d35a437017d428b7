//! The lexer for HERA source text and the debugger's mini-language.
//!
//! Consumed by `parser.rs` and `debugger/eval.rs`. The lexer keeps one token
//! of lookahead in `tkn`, in the style of a scannerless recursive-descent
//! front end: `next_token` advances and returns the new current token.

use std::str::FromStr;

use crate::messages::Messages;
use crate::span::{Location, SourceFile};
use crate::symbol::{is_register, Register};

mod cursor;

use cursor::Cursor;

#[derive(Clone, PartialEq, Debug)]
pub struct Token {
    pub kind: TokenKind,
    pub loc: Location,
}

#[derive(Clone, PartialEq, Debug)]
pub enum TokenKind {
    /// Identifier that is not a register name.
    Symbol(String),
    Register(Register),
    /// Integer literal, unparsed so the parser can detect octal prefixes.
    Int(String),
    /// String literal with escapes already resolved.
    Str(String),
    /// Character literal, e.g. `'a'` or `'\n'`.
    Char(char),
    /// `<...>` path of a system include.
    Bracketed(String),
    /// `:xds`-style format specifier in the debugger mini-language.
    Fmt(String),
    /// The `#include` directive.
    Include,
    Minus,
    Plus,
    Slash,
    Asterisk,
    At,
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Semicolon,
    Eof,
    /// Malformed token; the payload is the error message.
    Error(String),
    Unknown,
}

impl TokenKind {
    /// Short description for "expected X, found Y" messages.
    pub fn describe(&self) -> &'static str {
        match self {
            TokenKind::Symbol(_) => "symbol",
            TokenKind::Register(_) => "register",
            TokenKind::Int(_) => "integer",
            TokenKind::Str(_) => "string",
            TokenKind::Char(_) => "character literal",
            TokenKind::Bracketed(_) => "bracketed path",
            TokenKind::Fmt(_) => "format specifier",
            TokenKind::Include => "#include",
            TokenKind::Minus => "`-`",
            TokenKind::Plus => "`+`",
            TokenKind::Slash => "`/`",
            TokenKind::Asterisk => "`*`",
            TokenKind::At => "`@`",
            TokenKind::LParen => "left parenthesis",
            TokenKind::RParen => "right parenthesis",
            TokenKind::LBrace => "left brace",
            TokenKind::RBrace => "right brace",
            TokenKind::Comma => "comma",
            TokenKind::Semicolon => "semicolon",
            TokenKind::Eof => "end of input",
            TokenKind::Error(_) => "malformed token",
            TokenKind::Unknown => "unknown token",
        }
    }
}

pub struct Lexer {
    cur: Cursor,
    /// The current token. Valid from construction onward.
    pub tkn: Token,
    pub messages: Messages,
}

impl Lexer {
    pub fn new(file: SourceFile) -> Lexer {
        let mut lexer = Lexer {
            cur: Cursor::new(file),
            tkn: Token {
                kind: TokenKind::Eof,
                loc: Location::new(SourceFile::new("", ""), 1, 1, Default::default()),
            },
            messages: Messages::new(),
        };
        if !lexer.cur.file().text.is_ascii() {
            lexer.tkn = Token {
                kind: TokenKind::Error("non-ASCII byte in input".to_string()),
                loc: lexer.cur.loc_here(),
            };
        } else {
            lexer.next_token();
        }
        lexer
    }

    pub fn file(&self) -> &SourceFile {
        self.cur.file()
    }

    /// Advance one token, set `self.tkn` to it, and return a copy.
    pub fn next_token(&mut self) -> Token {
        self.skip_trivia();

        let mark = self.cur.mark();
        let kind = if self.cur.is_eof() {
            TokenKind::Eof
        } else {
            let ch = self.cur.first();
            if ch.is_ascii_alphabetic() || ch == '_' {
                let text = self.read_symbol();
                if is_register(&text) {
                    // The parse cannot fail after the `is_register` check.
                    TokenKind::Register(Register::from_str(&text).unwrap_or(Register::R0))
                } else {
                    TokenKind::Symbol(text)
                }
            } else if ch.is_ascii_digit() {
                TokenKind::Int(self.read_int())
            } else if ch == '"' {
                self.consume_str()
            } else if ch == '\'' {
                self.consume_char()
            } else if ch == '#' {
                if self.cur.starts_with("#include") {
                    for _ in 0.."#include".len() {
                        self.cur.bump();
                    }
                    TokenKind::Include
                } else {
                    self.cur.bump();
                    let name = self.read_symbol();
                    TokenKind::Error(format!("unknown directive `#{}`", name))
                }
            } else if ch == '<' {
                self.consume_bracketed()
            } else if ch == ':' {
                self.cur.bump();
                TokenKind::Fmt(self.read_symbol())
            } else {
                self.cur.bump();
                match ch {
                    '-' => TokenKind::Minus,
                    '+' => TokenKind::Plus,
                    '/' => TokenKind::Slash,
                    '*' => TokenKind::Asterisk,
                    '@' => TokenKind::At,
                    '(' => TokenKind::LParen,
                    ')' => TokenKind::RParen,
                    '{' => TokenKind::LBrace,
                    '}' => TokenKind::RBrace,
                    ',' => TokenKind::Comma,
                    ';' => TokenKind::Semicolon,
                    _ => TokenKind::Unknown,
                }
            }
        };

        self.tkn = Token {
            kind,
            loc: self.cur.loc_from(mark),
        };
        self.tkn.clone()
    }

    /// Read an identifier starting at the cursor.
    fn read_symbol(&mut self) -> String {
        let mark = self.cur.mark();
        while {
            let ch = self.cur.first();
            ch.is_ascii_alphanumeric() || ch == '_'
        } {
            self.cur.bump();
        }
        self.cur.slice_from(mark).to_string()
    }

    /// Read an integer literal. Base prefixes (`0x`, `0o`, `0b`) are kept in
    /// the returned text; the parser decides the base.
    fn read_int(&mut self) -> String {
        let mark = self.cur.mark();
        let mut hex = false;
        if self.cur.first() == '0' && matches!(self.cur.peek(1), 'b' | 'o' | 'x' | 'B' | 'O' | 'X')
        {
            hex = matches!(self.cur.peek(1), 'x' | 'X');
            self.cur.bump();
            self.cur.bump();
        }
        while {
            let ch = self.cur.first();
            ch.is_ascii_digit() || (hex && ch.is_ascii_alphabetic())
        } {
            self.cur.bump();
        }
        self.cur.slice_from(mark).to_string()
    }

    /// Read an escape sequence, with the cursor on the backslash. Returns the
    /// resolved character, or `None` at end of input.
    fn read_escape_char(&mut self) -> Option<char> {
        let loc = self.cur.loc_here();
        self.cur.bump(); // backslash
        let ch = self.cur.bump()?;
        match ch {
            'n' => Some('\n'),
            't' => Some('\t'),
            'r' => Some('\r'),
            '\\' => Some('\\'),
            '\'' => Some('\''),
            '"' => Some('"'),
            'x' => {
                let hi = self.cur.first();
                let lo = self.cur.peek(1);
                if hi.is_ascii_hexdigit() && lo.is_ascii_hexdigit() {
                    self.cur.bump();
                    self.cur.bump();
                    let v = u32::from_str_radix(&format!("{}{}", hi, lo), 16)
                        .expect("two hex digits always parse");
                    Some(char::from_u32(v).expect("byte value is a valid char"))
                } else {
                    self.messages.err("invalid hex escape", Some(loc));
                    Some('x')
                }
            }
            '0'..='9' => {
                let mut digits = String::from(ch);
                while digits.len() < 3 && self.cur.first().is_ascii_digit() {
                    digits.push(self.cur.bump().expect("checked digit"));
                }
                match u32::from_str_radix(&digits, 8) {
                    Ok(v) if v < 256 => Some(v as u8 as char),
                    _ => {
                        self.messages.err("invalid octal escape", Some(loc));
                        Some(ch)
                    }
                }
            }
            _ => {
                self.messages
                    .err(format!("unrecognized backslash escape `\\{}`", ch), Some(loc));
                Some(ch)
            }
        }
    }

    /// Consume a delimited literal body, resolving escapes. Returns the body
    /// and whether the closing delimiter was found on the same line.
    fn consume_delimited(&mut self, delimiter: char) -> (String, bool) {
        let mut out = String::new();
        loop {
            if self.cur.is_eof() {
                return (out, false);
            }
            match self.cur.first() {
                ch if ch == delimiter => {
                    self.cur.bump();
                    return (out, true);
                }
                '\n' => return (out, false),
                '\\' => match self.read_escape_char() {
                    Some(ch) => out.push(ch),
                    None => return (out, false),
                },
                _ => {
                    out.push(self.cur.bump().expect("not at end of input"));
                }
            }
        }
    }

    fn consume_str(&mut self) -> TokenKind {
        self.cur.bump(); // opening quote
        let (s, closed) = self.consume_delimited('"');
        if closed {
            TokenKind::Str(s)
        } else if self.cur.is_eof() {
            TokenKind::Error("unclosed string literal".to_string())
        } else {
            TokenKind::Error("string literal contains an unescaped newline".to_string())
        }
    }

    fn consume_char(&mut self) -> TokenKind {
        self.cur.bump(); // opening quote
        let (s, closed) = self.consume_delimited('\'');
        if !closed {
            return TokenKind::Error("unclosed character literal".to_string());
        }
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(ch), None) => TokenKind::Char(ch),
            _ => TokenKind::Error("over-long character literal".to_string()),
        }
    }

    fn consume_bracketed(&mut self) -> TokenKind {
        self.cur.bump(); // '<'
        let mark = self.cur.mark();
        while !self.cur.is_eof() && self.cur.first() != '>' {
            self.cur.bump();
        }
        if self.cur.is_eof() {
            return TokenKind::Error("unclosed bracketed expression".to_string());
        }
        let path = self.cur.slice_from(mark).to_string();
        self.cur.bump(); // '>'
        TokenKind::Bracketed(path)
    }

    /// Skip past whitespace and `//` and `/* */` comments.
    fn skip_trivia(&mut self) {
        loop {
            while self.cur.first().is_ascii_whitespace() && !self.cur.is_eof() {
                self.cur.bump();
            }
            if self.cur.first() == '/' && self.cur.peek(1) == '/' {
                while !self.cur.is_eof() && self.cur.first() != '\n' {
                    self.cur.bump();
                }
            } else if self.cur.first() == '/' && self.cur.peek(1) == '*' {
                self.cur.bump();
                self.cur.bump();
                while !self.cur.is_eof() && !(self.cur.first() == '*' && self.cur.peek(1) == '/') {
                    self.cur.bump();
                }
                self.cur.bump();
                self.cur.bump();
            } else {
                break;
            }
        }
    }
}
