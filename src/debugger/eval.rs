//! The expression mini-language used by the debugger's `print` and `assign`
//! commands (and the `__eval` debugging instruction).
//!
//! A small Pratt parser over the main lexer:
//!
//! ```text
//!   start    := FMT? exprlist
//!   exprlist := (expr COMMA)* expr
//!   expr     := expr op expr | LPAREN expr RPAREN | MINUS expr | AT expr | atom
//!   op       := PLUS | MINUS | ASTERISK | SLASH
//!   atom     := REGISTER | INT | SYMBOL
//! ```
//!
//! Evaluation is pure over a read-only view of the machine, except for
//! `assign`, which the debugger runs under an undo snapshot.

use std::fmt;

use crate::checker::Program;
use crate::lexer::{Lexer, TokenKind};
use crate::op::{out_of_range, to_u16};
use crate::runtime::{format_int, RunState};
use crate::settings::parse_int_literal;
use crate::span::SourceFile;
use crate::symbol::Register;

const PREC_LOWEST: u8 = 0;
const PREC_SUM: u8 = 1;
const PREC_PRODUCT: u8 = 2;
const PREC_PREFIX: u8 = 3;

#[derive(Clone, PartialEq, Debug)]
pub enum Node {
    Int(i64),
    Reg(Register),
    Sym(String),
    /// `@expr`: the memory cell the operand addresses.
    Mem(Box<Node>),
    Neg(Box<Node>),
    Infix(char, Box<Node>, Box<Node>),
}

/// A parsed command line: an optional format specifier and one or more
/// comma-separated expressions.
#[derive(Clone, PartialEq, Debug)]
pub struct SeqNode {
    pub fmt: String,
    pub seq: Vec<Node>,
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Int(v) => write!(f, "{}", v),
            Node::Reg(r) => write!(f, "{}", r),
            Node::Sym(s) => write!(f, "{}", s),
            Node::Mem(addr) => write!(f, "@{}", addr),
            Node::Neg(arg) => write!(f, "-{}", arg),
            Node::Infix(op, left, right) => write!(f, "({} {} {})", left, op, right),
        }
    }
}

/// Parse a line of the mini-language.
pub fn parse(line: &str) -> Result<SeqNode, String> {
    let mut parser = MiniParser {
        lexer: Lexer::new(SourceFile::new("<expr>", line)),
    };
    let tree = parser.match_exprlist()?;
    if parser.lexer.tkn.kind == TokenKind::Eof {
        Ok(tree)
    } else {
        Err("trailing input".to_string())
    }
}

struct MiniParser {
    lexer: Lexer,
}

impl MiniParser {
    fn match_exprlist(&mut self) -> Result<SeqNode, String> {
        let fmt = match &self.lexer.tkn.kind {
            TokenKind::Fmt(spec) => {
                let spec = spec.clone();
                self.lexer.next_token();
                spec
            }
            _ => String::new(),
        };

        let mut seq = Vec::new();
        loop {
            seq.push(self.match_expr(PREC_LOWEST)?);
            if self.lexer.tkn.kind == TokenKind::Comma {
                self.lexer.next_token();
            } else {
                break;
            }
        }
        Ok(SeqNode { fmt, seq })
    }

    fn match_expr(&mut self, precedence: u8) -> Result<Node, String> {
        let mut left = match self.lexer.tkn.kind.clone() {
            TokenKind::At => {
                self.lexer.next_token();
                Node::Mem(Box::new(self.match_expr(PREC_PREFIX)?))
            }
            TokenKind::Minus => {
                self.lexer.next_token();
                Node::Neg(Box::new(self.match_expr(PREC_PREFIX)?))
            }
            TokenKind::Int(text) => {
                let value = parse_int_literal(&text)
                    .ok_or_else(|| format!("invalid integer literal: {}", text))?;
                self.lexer.next_token();
                Node::Int(value)
            }
            TokenKind::Register(reg) => {
                self.lexer.next_token();
                Node::Reg(reg)
            }
            TokenKind::Symbol(name) => {
                self.lexer.next_token();
                Node::Sym(name)
            }
            TokenKind::LParen => {
                self.lexer.next_token();
                let inner = self.match_expr(PREC_LOWEST)?;
                if self.lexer.tkn.kind != TokenKind::RParen {
                    return Err(self.unexpected());
                }
                self.lexer.next_token();
                inner
            }
            _ => return Err(self.unexpected()),
        };

        loop {
            let (op, op_precedence) = match self.lexer.tkn.kind {
                TokenKind::Plus => ('+', PREC_SUM),
                TokenKind::Minus => ('-', PREC_SUM),
                TokenKind::Asterisk => ('*', PREC_PRODUCT),
                TokenKind::Slash => ('/', PREC_PRODUCT),
                _ => break,
            };
            if precedence >= op_precedence {
                break;
            }
            self.lexer.next_token();
            let right = self.match_expr(op_precedence)?;
            left = Node::Infix(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unexpected(&self) -> String {
        match &self.lexer.tkn.kind {
            TokenKind::Eof => "premature end of input".to_string(),
            TokenKind::Error(msg) => msg.clone(),
            kind => format!("did not expect {} in this position", kind.describe()),
        }
    }
}

/// Evaluate a node to an integer against the machine and symbol table.
pub fn evaluate(node: &Node, vm: &RunState, program: &Program) -> Result<i64, String> {
    match node {
        Node::Int(v) => {
            if out_of_range(*v) {
                Err("integer literal exceeds 16 bits".to_string())
            } else {
                Ok(*v)
            }
        }
        Node::Reg(r) => Ok(vm.reg(*r) as i64),
        Node::Sym(name) => {
            if name.eq_ignore_ascii_case("pc") {
                Ok(vm.pc as i64)
            } else {
                program
                    .symbols
                    .get(name)
                    .map(|sym| sym.value() as i64)
                    .ok_or_else(|| format!("{} is not defined", name))
            }
        }
        Node::Mem(addr) => {
            let addr = evaluate(addr, vm, program)?;
            Ok(vm.mem(to_u16(addr)) as i64)
        }
        Node::Neg(arg) => {
            let result = -evaluate(arg, vm, program)?;
            if out_of_range(result) {
                Err("overflow from unary -".to_string())
            } else {
                Ok(result)
            }
        }
        Node::Infix(op, left, right) => {
            let left = evaluate(left, vm, program)?;
            let right = evaluate(right, vm, program)?;
            let result = match op {
                '+' => left + right,
                '-' => left - right,
                '*' => left * right,
                '/' => {
                    if right == 0 {
                        return Err("division by zero".to_string());
                    }
                    left / right
                }
                _ => unreachable!("parser only produces the four operators"),
            };
            if out_of_range(result) {
                Err(format!("overflow from {}", op))
            } else {
                Ok(result)
            }
        }
    }
}

/// Assign the value of one single-expression tree to another.
pub fn assign(vm: &mut RunState, program: &Program, lhs: &str, rhs: &str) -> Result<(), String> {
    let ltree = single_expr(lhs)?;
    let rtree = single_expr(rhs)?;
    let value = to_u16(evaluate(&rtree, vm, program)?);
    match ltree {
        Node::Reg(r) => vm.set_reg(r, value),
        Node::Mem(addr) => {
            let addr = to_u16(evaluate(&addr, vm, program)?);
            vm.set_mem(addr, value);
        }
        Node::Sym(name) if name.eq_ignore_ascii_case("pc") => vm.pc = value,
        Node::Sym(_) => return Err("cannot assign to symbol".to_string()),
        _ => return Err("cannot assign to arithmetic expression".to_string()),
    }
    Ok(())
}

fn single_expr(text: &str) -> Result<Node, String> {
    let mut tree = parse(text)?;
    if tree.seq.len() != 1 {
        return Err("cannot use a sequence here".to_string());
    }
    Ok(tree.seq.remove(0))
}

/// Execute a mini-language statement: an assignment if an `=` is present,
/// otherwise an expression list that is evaluated and printed.
pub fn execute(vm: &mut RunState, program: &Program, line: &str) -> Result<(), String> {
    if let Some((lhs, rhs)) = line.split_once('=') {
        return assign(vm, program, lhs.trim(), rhs.trim());
    }
    let tree = parse(line)?;
    let spec = if tree.fmt.is_empty() {
        "xdsc"
    } else {
        tree.fmt.as_str()
    };
    for node in &tree.seq {
        let value = to_u16(evaluate(node, vm, program)?);
        println!("{} = {}", node, format_int(value, spec));
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::checker::check;
    use crate::parser;
    use crate::settings::Settings;

    fn fixture() -> (RunState, Program) {
        let settings = Settings::default();
        let (ops, _) = parser::parse(
            SourceFile::new(
                "<test>",
                "CONSTANT(N, 100)\nDLABEL(X)\nINTEGER(42)\nLABEL(top)\nHALT()",
            ),
            &settings,
        );
        let (program, messages) = check(ops, &settings);
        assert!(!messages.has_errors(), "{:?}", messages);
        let mut vm = RunState::new(&settings);
        vm.load_data(&program);
        (vm, program)
    }

    fn eval_str(text: &str, vm: &RunState, program: &Program) -> Result<i64, String> {
        let tree = parse(text)?;
        evaluate(&tree.seq[0], vm, program)
    }

    #[test]
    fn parses_precedence() {
        let tree = parse("1 + 2 * 3").expect("valid expression");
        assert_eq!(
            tree.seq[0],
            Node::Infix(
                '+',
                Box::new(Node::Int(1)),
                Box::new(Node::Infix(
                    '*',
                    Box::new(Node::Int(2)),
                    Box::new(Node::Int(3))
                ))
            )
        );
    }

    #[test]
    fn parses_format_and_sequence() {
        let tree = parse(":xb R1, @0xC000, N").expect("valid expression");
        assert_eq!(tree.fmt, "xb");
        assert_eq!(tree.seq.len(), 3);
    }

    #[test]
    fn negative_literal_may_abut() {
        let tree = parse("-42").expect("valid expression");
        assert_eq!(tree.seq[0], Node::Neg(Box::new(Node::Int(42))));
    }

    #[test]
    fn evaluates_arithmetic() {
        let (vm, program) = fixture();
        assert_eq!(eval_str("2 + 3 * 4", &vm, &program), Ok(14));
        assert_eq!(eval_str("(2 + 3) * 4", &vm, &program), Ok(20));
        assert_eq!(eval_str("7 / 2", &vm, &program), Ok(3));
        assert_eq!(
            eval_str("1 / 0", &vm, &program),
            Err("division by zero".to_string())
        );
    }

    #[test]
    fn evaluates_machine_state() {
        let (mut vm, program) = fixture();
        vm.set_reg(Register::new(1).unwrap(), 7);
        assert_eq!(eval_str("R1", &vm, &program), Ok(7));
        assert_eq!(eval_str("R1 * 2", &vm, &program), Ok(14));
        assert_eq!(eval_str("@0xC000", &vm, &program), Ok(42));
        assert_eq!(eval_str("@X", &vm, &program), Ok(42));
        assert_eq!(eval_str("N", &vm, &program), Ok(100));
        assert_eq!(eval_str("top", &vm, &program), Ok(0));
        assert_eq!(eval_str("pc", &vm, &program), Ok(0));
    }

    #[test]
    fn undefined_symbol() {
        let (vm, program) = fixture();
        assert_eq!(
            eval_str("bogus", &vm, &program),
            Err("bogus is not defined".to_string())
        );
    }

    #[test]
    fn assign_register_and_memory() {
        let (mut vm, program) = fixture();
        assign(&mut vm, &program, "R1", "42").expect("assign to register");
        assert_eq!(vm.reg(Register::new(1).unwrap()), 42);
        assign(&mut vm, &program, "@(X + 1)", "R1 * 2").expect("assign to memory");
        assert_eq!(vm.mem(0xC001), 84);
        assign(&mut vm, &program, "pc", "3").expect("assign to pc");
        assert_eq!(vm.pc, 3);
        assert!(assign(&mut vm, &program, "N", "1").is_err());
        assert!(assign(&mut vm, &program, "1 + 1", "1").is_err());
    }

    #[test]
    fn execute_statement() {
        let (mut vm, program) = fixture();
        execute(&mut vm, &program, "R2 = 5").expect("assignment runs");
        assert_eq!(vm.reg(Register::new(2).unwrap()), 5);
    }

    #[test]
    fn overflow_detection() {
        let (vm, program) = fixture();
        assert!(eval_str("30000 + 40000", &vm, &program).is_err());
        assert!(eval_str("70000", &vm, &program).is_err());
    }
}
