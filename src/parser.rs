//! The parser for the HERA language. As an assembly language, HERA has a
//! simple grammar:
//!
//! ```text
//!   start   := (op | include)*
//!   op      := SYMBOL LPAREN arglist? RPAREN SEMICOLON?
//!   include := INCLUDE (STRING | BRACKETED)
//!   arglist := (value COMMA)* value
//! ```
//!
//! The parser also owns `#include` resolution (paths are resolved relative
//! to the including file, with cycle detection) and `#ifdef` conditional
//! compilation, which runs as a line-oriented pass over the text before
//! lexing.

use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use regex::Regex;

use crate::lexer::{Lexer, Token, TokenKind};
use crate::messages::Messages;
use crate::op::{Op, OpKind, Operand, Value};
use crate::settings::{parse_int_literal, Settings};
use crate::span::SourceFile;
use crate::stdlib;

/// The only symbol the conditional-compilation pass defines.
const PREDEFINED_SYMBOL: &str = "HERA_PY";

/// Parse a HERA program from in-memory text.
pub fn parse(file: SourceFile, settings: &Settings) -> (Vec<Op>, Messages) {
    let file = SourceFile::new(file.path.clone(), evaluate_ifdefs(&file.text));
    let mut parser = Parser::new(Lexer::new(file), settings);
    let ops = parser.parse(None);
    (ops, parser.messages)
}

/// Parse a HERA program from a file on disk.
pub fn parse_file(path: &Path, settings: &Settings) -> (Vec<Op>, Messages) {
    let text = match read_source(path) {
        Ok(text) => text,
        Err(err) => return (Vec::new(), Messages::from_error(err, None)),
    };
    let file = SourceFile::new(path.to_string_lossy().to_string(), evaluate_ifdefs(&text));
    let mut parser = Parser::new(Lexer::new(file), settings);
    let ops = parser.parse(Some(path));
    (ops, parser.messages)
}

/// Read a file as ASCII HERA source, with human-sized error messages.
pub fn read_source(path: &Path) -> Result<String, String> {
    let display = path.display();
    let bytes = std::fs::read(path).map_err(|err| match err.kind() {
        std::io::ErrorKind::NotFound => format!("file \"{}\" does not exist", display),
        std::io::ErrorKind::PermissionDenied => {
            format!("permission denied to open file \"{}\"", display)
        }
        _ => format!("could not open file \"{}\"", display),
    })?;
    if !bytes.is_ascii() {
        return Err(format!("non-ASCII byte in file \"{}\"", display));
    }
    String::from_utf8(bytes).map_err(|_| format!("non-ASCII byte in file \"{}\"", display))
}

struct Parser<'a> {
    lexer: Lexer,
    settings: &'a Settings,
    messages: Messages,
    /// Canonical paths of every file entered so far, for cycle detection.
    visited: Vec<PathBuf>,
    /// The octal-literal advisory fires at most once per program.
    warned_octal: bool,
}

impl<'a> Parser<'a> {
    fn new(lexer: Lexer, settings: &'a Settings) -> Self {
        Parser {
            lexer,
            settings,
            messages: Messages::new(),
            visited: Vec::new(),
            warned_octal: false,
        }
    }

    fn parse(&mut self, path: Option<&Path>) -> Vec<Op> {
        if let Some(path) = path {
            self.visited.push(canonical(path));
        }
        let ops = self.match_program();
        self.drain_lexer_messages();
        ops
    }

    fn drain_lexer_messages(&mut self) {
        let taken = std::mem::take(&mut self.lexer.messages);
        self.messages.extend(taken);
    }

    /// Match an entire program (or included file).
    fn match_program(&mut self) -> Vec<Op> {
        let mut expecting_brace = false;
        let mut ops = Vec::new();
        while self.lexer.tkn.kind != TokenKind::Eof {
            let ok = self.expect(
                |kind| {
                    matches!(
                        kind,
                        TokenKind::Include | TokenKind::Symbol(_) | TokenKind::RBrace
                    )
                },
                "expected HERA operation or #include",
            );
            if !ok {
                self.skip_until(|kind| {
                    matches!(kind, TokenKind::Include | TokenKind::Symbol(_))
                });
                continue;
            }

            match self.lexer.tkn.kind.clone() {
                TokenKind::Include => ops.extend(self.match_include()),
                TokenKind::Symbol(name) => {
                    let name_tkn = self.lexer.tkn.clone();
                    self.lexer.next_token();
                    if name == "void" && matches!(self.lexer.tkn.kind, TokenKind::Symbol(_)) {
                        // Legacy programs are wrapped in `void HERA_main() { ... }`.
                        expecting_brace = true;
                        self.handle_cpp_boilerplate();
                    } else if self.lexer.tkn.kind == TokenKind::LParen {
                        if let Some(op) = self.match_op(&name_tkn, &name) {
                            ops.push(op);
                        }
                        // Operations may optionally be separated by semicolons.
                        if self.lexer.tkn.kind == TokenKind::Semicolon {
                            self.lexer.next_token();
                        }
                    } else {
                        self.err("expected left parenthesis");
                    }
                }
                TokenKind::RBrace => {
                    if expecting_brace {
                        expecting_brace = false;
                    } else {
                        self.err("unexpected right brace");
                    }
                    self.lexer.next_token();
                }
                _ => unreachable!("token kind was checked above"),
            }
        }
        ops
    }

    /// Match an operation, with the current token on the left parenthesis.
    fn match_op(&mut self, name_tkn: &Token, name: &str) -> Option<Op> {
        self.lexer.next_token();
        let args = self.match_optional_arglist();
        self.lexer.next_token();
        let args = args?;

        match OpKind::from_mnemonic(name) {
            Some(kind) => Some(Op {
                kind,
                args,
                loc: name_tkn.loc.clone(),
            }),
            None => {
                self.err_at(
                    format!("unknown instruction `{}`", name),
                    name_tkn,
                );
                None
            }
        }
    }

    /// Match zero or more comma-separated values, exiting with the right
    /// parenthesis as the current token. `None` means the argument list
    /// could not be parsed; an empty vector means it was empty.
    fn match_optional_arglist(&mut self) -> Option<Vec<Operand>> {
        if self.lexer.tkn.kind == TokenKind::RParen {
            return Some(Vec::new());
        }

        let mut args = Vec::new();
        let mut hit_error = false;
        loop {
            let ok = self.expect(
                |kind| {
                    matches!(
                        kind,
                        TokenKind::Int(_)
                            | TokenKind::Register(_)
                            | TokenKind::Symbol(_)
                            | TokenKind::Str(_)
                            | TokenKind::Char(_)
                            | TokenKind::Minus
                    )
                },
                "expected value",
            );
            let val = if ok { self.match_value() } else { None };

            match val {
                None => {
                    hit_error = true;
                    self.skip_until(|kind| {
                        matches!(kind, TokenKind::Comma | TokenKind::RParen)
                    });
                    if self.lexer.tkn.kind == TokenKind::Comma {
                        self.lexer.next_token();
                        continue;
                    } else {
                        break;
                    }
                }
                Some(val) => args.push(val),
            }

            self.lexer.next_token();
            match self.lexer.tkn.kind {
                TokenKind::RParen => break,
                TokenKind::Comma => {
                    self.lexer.next_token();
                }
                _ => {
                    hit_error = true;
                    self.err("expected comma or right parenthesis");
                    self.skip_until(|kind| {
                        matches!(kind, TokenKind::Comma | TokenKind::RParen)
                    });
                    if matches!(self.lexer.tkn.kind, TokenKind::Eof | TokenKind::RParen) {
                        break;
                    }
                    self.lexer.next_token();
                }
            }
        }

        (!hit_error).then_some(args)
    }

    /// Match a single value (integer, register, symbol, string...). The
    /// current token is left on the value's last token.
    fn match_value(&mut self) -> Option<Operand> {
        let loc = self.lexer.tkn.loc.clone();
        let value = match self.lexer.tkn.kind.clone() {
            TokenKind::Int(text) => Value::Int(self.match_int(&text)),
            TokenKind::Char(ch) => Value::Int(ch as i64),
            TokenKind::Register(reg) => Value::Reg(reg),
            TokenKind::Symbol(name) => Value::Sym(name),
            TokenKind::Str(s) => Value::Str(s),
            TokenKind::Minus => {
                self.lexer.next_token();
                match self.lexer.tkn.kind.clone() {
                    TokenKind::Int(text) => Value::Int(-self.match_int(&text)),
                    _ => {
                        self.err("expected integer");
                        return None;
                    }
                }
            }
            _ => unreachable!("token kind was checked by the caller"),
        };
        Some(Operand { value, loc })
    }

    /// Parse an integer literal, warning (once per program) about
    /// zero-prefixed octal.
    fn match_int(&mut self, text: &str) -> i64 {
        let bytes = text.as_bytes();
        if bytes.len() > 1 && bytes[0] == b'0' && bytes[1].is_ascii_digit() {
            if self.settings.warn_octal_on && !self.warned_octal {
                self.warned_octal = true;
                self.warn("consider using \"0o\" prefix for octal numbers");
            }
        }
        match parse_int_literal(text) {
            Some(v) => v,
            None => {
                self.err("invalid integer literal");
                // 1 is a neutral value that is valid anywhere an integer is.
                1
            }
        }
    }

    /// Match an `#include` statement.
    fn match_include(&mut self) -> Vec<Op> {
        let tkn = self.lexer.next_token();
        let ok = self.expect(
            |kind| matches!(kind, TokenKind::Str(_) | TokenKind::Bracketed(_)),
            "expected quote or angle-bracket delimited string",
        );
        if !ok {
            self.lexer.next_token();
            return Vec::new();
        }
        self.lexer.next_token();

        match tkn.kind.clone() {
            TokenKind::Str(relative) => {
                let root: &str = &self.lexer.file().path;
                let include_path = Path::new(root)
                    .parent()
                    .unwrap_or_else(|| Path::new(""))
                    .join(&relative);

                if self.visited.contains(&canonical(&include_path)) {
                    self.err_at("recursive include", &tkn);
                    return Vec::new();
                }

                let text = match read_source(&include_path) {
                    Ok(text) => text,
                    Err(err) => {
                        // The include site is what the user can fix.
                        self.err_at(err, &tkn);
                        return Vec::new();
                    }
                };
                let file = SourceFile::new(
                    include_path.to_string_lossy().to_string(),
                    evaluate_ifdefs(&text),
                );
                self.parse_included(file, Some(&include_path))
            }
            TokenKind::Bracketed(name) => self.expand_angle_include(&name, &tkn),
            _ => unreachable!("token kind was checked above"),
        }
    }

    /// Retrieve a system library named by `#include <...>`.
    fn expand_angle_include(&mut self, name: &str, tkn: &Token) -> Vec<Op> {
        if name == "HERA.h" {
            self.warn_at("#include <HERA.h> is not necessary for this interpreter", tkn);
            return Vec::new();
        }
        match stdlib::lookup(name) {
            Some(text) => {
                let file = SourceFile::new(name.to_string(), evaluate_ifdefs(text));
                self.parse_included(file, None)
            }
            None => {
                self.err_at(format!("unknown system library `{}`", name), tkn);
                Vec::new()
            }
        }
    }

    /// Parse an included file by temporarily swapping the lexer.
    fn parse_included(&mut self, file: SourceFile, path: Option<&Path>) -> Vec<Op> {
        self.drain_lexer_messages();
        let old_lexer = std::mem::replace(&mut self.lexer, Lexer::new(file));
        let ops = self.parse(path);
        self.lexer = old_lexer;
        ops
    }

    fn handle_cpp_boilerplate(&mut self) {
        self.lexer.next_token();
        if self.expect(|kind| *kind == TokenKind::LParen, "expected left parenthesis") {
            self.lexer.next_token();
        }
        if self.expect(|kind| *kind == TokenKind::RParen, "expected right parenthesis") {
            self.lexer.next_token();
        }
        self.expect(|kind| *kind == TokenKind::LBrace, "expected left curly brace");
        self.lexer.next_token();
    }

    /// Check the current token against a predicate, recording an error if it
    /// does not match.
    fn expect(&mut self, pred: impl Fn(&TokenKind) -> bool, msg: &str) -> bool {
        if pred(&self.lexer.tkn.kind) {
            return true;
        }
        match self.lexer.tkn.kind.clone() {
            TokenKind::Eof => self.err("premature end of input"),
            TokenKind::Error(payload) => self.err(payload),
            _ => self.err(msg),
        }
        false
    }

    /// Keep consuming tokens until one matches the predicate (or EOF).
    fn skip_until(&mut self, pred: impl Fn(&TokenKind) -> bool) {
        while self.lexer.tkn.kind != TokenKind::Eof && !pred(&self.lexer.tkn.kind) {
            self.lexer.next_token();
        }
    }

    fn err(&mut self, msg: impl Into<String>) {
        let loc = self.lexer.tkn.loc.clone();
        self.messages.err(msg, Some(loc));
    }

    fn err_at(&mut self, msg: impl Into<String>, tkn: &Token) {
        self.messages.err(msg, Some(tkn.loc.clone()));
    }

    fn warn(&mut self, msg: impl Into<String>) {
        let loc = self.lexer.tkn.loc.clone();
        self.messages.warn(msg, Some(loc));
    }

    fn warn_at(&mut self, msg: impl Into<String>, tkn: &Token) {
        self.messages.warn(msg, Some(tkn.loc.clone()));
    }
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

lazy_static! {
    static ref IFDEF: Regex = Regex::new(r"^#(ifdef|ifndef)\s+([A-Za-z_][A-Za-z0-9_]*)$").unwrap();
    static ref ELSE: Regex = Regex::new(r"^#else$").unwrap();
    static ref ENDIF: Regex = Regex::new(r"^#endif$").unwrap();
}

/// Evaluate `#ifdef`/`#ifndef`/`#else`/`#endif` blocks, keeping line numbers
/// stable by blanking excluded lines. The only defined symbol is `HERA_PY`,
/// so HERA-C-only sections (which may contain C++) are stripped before the
/// lexer sees them.
pub fn evaluate_ifdefs(text: &str) -> String {
    let mut keeping = vec![true];
    let mut out = String::with_capacity(text.len());
    for line in text.split_inclusive('\n') {
        let trimmed = line.trim();
        let mut directive = true;
        if let Some(caps) = IFDEF.captures(trimmed) {
            let defined = &caps[2] == PREDEFINED_SYMBOL;
            let keep = if &caps[1] == "ifdef" { defined } else { !defined };
            keeping.push(keep);
        } else if ELSE.is_match(trimmed) && keeping.len() > 1 {
            let last = keeping.last_mut().expect("stack is never empty");
            *last = !*last;
        } else if ENDIF.is_match(trimmed) && keeping.len() > 1 {
            keeping.pop();
        } else {
            directive = false;
        }

        if !directive && keeping.iter().all(|k| *k) {
            out.push_str(line);
        } else if line.ends_with('\n') {
            out.push('\n');
        }
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::op::BranchCond;
    use crate::symbol::Register;

    fn parse_str(text: &str) -> (Vec<Op>, Messages) {
        parse(SourceFile::new("<test>", text), &Settings::default())
    }

    fn r(i: u8) -> Register {
        Register::new(i).expect("test register index in range")
    }

    #[test]
    fn basic_ops() {
        let (ops, messages) = parse_str("SET(R1, 42)\nADD(R3, R1, R2)\nHALT()");
        assert!(!messages.has_errors());
        assert_eq!(ops.len(), 3);
        assert_eq!(ops[0].kind, OpKind::Set);
        assert_eq!(ops[0].args[0].value, Value::Reg(r(1)));
        assert_eq!(ops[0].args[1].value, Value::Int(42));
        assert_eq!(ops[2].kind, OpKind::Halt);
        assert!(ops[2].args.is_empty());
    }

    #[test]
    fn semicolon_separators() {
        let (ops, messages) = parse_str("SET(R1, 1); SET(R2, 2)");
        assert!(!messages.has_errors());
        assert_eq!(ops.len(), 2);
    }

    #[test]
    fn negative_and_char_values() {
        let (ops, messages) = parse_str("SET(R1, -42)\nSET(R2, 'a')");
        assert!(!messages.has_errors());
        assert_eq!(ops[0].args[1].value, Value::Int(-42));
        assert_eq!(ops[1].args[1].value, Value::Int(97));
    }

    #[test]
    fn labels_and_symbols() {
        let (ops, messages) = parse_str("LABEL(top)\nBR(top)");
        assert!(!messages.has_errors());
        assert_eq!(ops[0].kind, OpKind::Label);
        assert_eq!(ops[1].kind, OpKind::RegBranch(BranchCond::Uncond));
        assert_eq!(ops[1].args[0].value, Value::Sym("top".to_string()));
    }

    #[test]
    fn line_numbers_tracked() {
        let (ops, _) = parse_str("SET(R1, 1)\n\nSET(R2, 2)");
        assert_eq!(ops[0].loc.line, 1);
        assert_eq!(ops[1].loc.line, 3);
    }

    #[test]
    fn octal_warns_once() {
        let (_, messages) = parse_str("SET(R1, 017)\nSET(R2, 017)");
        assert!(!messages.has_errors());
        assert_eq!(messages.warning_count(), 1);
    }

    #[test]
    fn octal_warning_can_be_disabled() {
        let mut settings = Settings::default();
        settings.warn_octal_on = false;
        let (_, messages) = parse(SourceFile::new("<test>", "SET(R1, 017)"), &settings);
        assert_eq!(messages.warning_count(), 0);
    }

    #[test]
    fn unknown_instruction() {
        let (ops, messages) = parse_str("FROB(R1)");
        assert!(ops.is_empty());
        assert!(messages.has_errors());
    }

    #[test]
    fn missing_paren() {
        let (_, messages) = parse_str("SET R1, 42");
        assert!(messages.has_errors());
    }

    #[test]
    fn arglist_error_recovery() {
        // The bad argument poisons the op but parsing continues to find the
        // second error.
        let (ops, messages) = parse_str("SET(R1, ))\nFROB()");
        assert!(messages.has_errors());
        assert!(ops.is_empty());
    }

    #[test]
    fn cpp_boilerplate() {
        let (ops, messages) = parse_str("void HERA_main() {\nSET(R1, 1)\n}");
        assert!(!messages.has_errors(), "{:?}", messages);
        assert_eq!(ops.len(), 1);
    }

    #[test]
    fn hera_h_include_warns() {
        let (ops, messages) = parse_str("#include <HERA.h>\nSET(R1, 1)");
        assert!(!messages.has_errors());
        assert_eq!(messages.warning_count(), 1);
        assert_eq!(ops.len(), 1);
    }

    #[test]
    fn tiger_stdlib_include() {
        let (ops, messages) = parse_str("#include <Tiger-stdlib-stack.hera>");
        assert!(!messages.has_errors(), "{:?}", messages);
        assert!(ops.iter().any(|op| op.kind == OpKind::Label));
    }

    #[test]
    fn unknown_system_library() {
        let (_, messages) = parse_str("#include <no-such-lib.hera>");
        assert!(messages.has_errors());
    }

    #[test]
    fn missing_include_file() {
        let (_, messages) = parse_str("#include \"does-not-exist.hera\"");
        assert!(messages.has_errors());
    }

    #[test]
    fn ifdef_keeps_hera_py_sections() {
        let text = "#ifdef HERA_PY\nSET(R1, 1)\n#else\nthis is C++ {{{\n#endif\nHALT()";
        let (ops, messages) = parse_str(text);
        assert!(!messages.has_errors(), "{:?}", messages);
        assert_eq!(ops.len(), 2);
        // Blanked lines keep later locations accurate.
        assert_eq!(ops[1].loc.line, 6);
    }

    #[test]
    fn ifndef_inverts() {
        let (ops, messages) = parse_str("#ifndef HERA_PY\nnot hera !!\n#endif\nNOP()");
        assert!(!messages.has_errors(), "{:?}", messages);
        assert_eq!(ops.len(), 1);
    }

    #[test]
    fn unknown_directive() {
        let (_, messages) = parse_str("#define X 1\nSET(R1, 1)");
        assert!(messages.has_errors());
    }

    #[test]
    fn string_arguments() {
        let (ops, messages) = parse_str("print(\"hello\\n\")");
        assert!(!messages.has_errors());
        assert_eq!(ops[0].args[0].value, Value::Str("hello\n".to_string()));
    }
}
