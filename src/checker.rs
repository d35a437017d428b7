//! Type-checking, symbol resolution and pseudo-operation expansion.
//!
//! The checker turns the parser's raw operation list into a [`Program`]: a
//! stream of real operations with all labels and constants substituted, plus
//! the laid-out data segment. It runs in three passes: symbol layout,
//! per-operation type checking, and expansion. Per-operation rules live in
//! `op.rs`; this module owns the program-wide ones.

use std::fmt;

use fxhash::FxHashMap;

use crate::messages::Messages;
use crate::op::{
    self, expand, operation_length, out_of_range, to_u16, Op, OpKind, ResolvedOp, Value,
};
use crate::settings::Settings;
use crate::symbol::{Symbol, SymbolTable};

/// A checked, resolved HERA program, ready for the virtual machine or the
/// assembler.
#[derive(Clone, Default, Debug)]
pub struct Program {
    /// The resolved operation stream; only real and debugging operations.
    pub code: Vec<ResolvedOp>,
    /// Data directives in source order.
    pub data: Vec<DataOp>,
    /// First address of the static data segment.
    pub data_start: u16,
    pub symbols: SymbolTable,
    /// Label name to `path:line`, for the debugger.
    pub label_locations: FxHashMap<String, String>,
}

impl Program {
    /// Materialize the data directives into the initial contents of the data
    /// segment.
    pub fn data_image(&self) -> Vec<u16> {
        let mut image = Vec::new();
        for data_op in &self.data {
            match data_op {
                DataOp::Integer(v) => image.push(*v),
                DataOp::LpString(s) => {
                    image.push(s.len() as u16);
                    image.extend(s.bytes().map(u16::from));
                }
                DataOp::Dskip(n) => image.extend(std::iter::repeat(0).take(*n as usize)),
            }
        }
        image
    }
}

/// A data directive that survives checking and shapes the data segment.
#[derive(Clone, PartialEq, Debug)]
pub enum DataOp {
    Integer(u16),
    LpString(String),
    Dskip(u16),
}

impl DataOp {
    /// Number of data cells the directive occupies.
    pub fn cells(&self) -> u32 {
        match self {
            DataOp::Integer(_) => 1,
            DataOp::LpString(s) => s.len() as u32 + 1,
            DataOp::Dskip(n) => *n as u32,
        }
    }
}

impl fmt::Display for DataOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataOp::Integer(v) => write!(f, "INTEGER({})", v),
            DataOp::LpString(s) => write!(f, "LP_STRING({:?})", s),
            DataOp::Dskip(n) => write!(f, "DSKIP({})", n),
        }
    }
}

/// Type-check a program and preprocess it. The input is generally the
/// output of parsing; the messages carry everything the user needs to fix.
pub fn check(oplist: Vec<Op>, settings: &Settings) -> (Program, Messages) {
    let (symbols, mut messages) = typecheck(&oplist, settings);
    if messages.has_errors() {
        return (Program::default(), messages);
    }

    let label_locations = labels_to_locations(&oplist);
    let (program, convert_messages) = convert(oplist, symbols, label_locations, settings);
    messages.extend(convert_messages);
    (program, messages)
}

/// Type-check the program and build its symbol table.
///
/// Labels and data labels are laid out up front so that forward references
/// work; constants enter the table in source order so that each one is in
/// scope only after its declaration.
pub fn typecheck(oplist: &[Op], settings: &Settings) -> (SymbolTable, Messages) {
    let mut messages = check_symbol_redeclaration(oplist);

    let (mut symbols, label_messages) = layout_symbols(oplist, settings);
    messages.extend(label_messages);

    let mut seen_code = false;
    // The calling-convention advisories fire at most once per program.
    let mut warned_call_reg = false;
    let mut warned_return_reg = false;
    for op in oplist {
        let mut op_messages = op::typecheck(op, &symbols, settings);
        op_messages.retain(|m| {
            if m.text.starts_with("first argument to CALL") {
                !std::mem::replace(&mut warned_call_reg, true)
            } else if m.text.starts_with("second argument to RETURN") {
                !std::mem::replace(&mut warned_return_reg, true)
            } else {
                true
            }
        });
        messages.extend(op_messages);

        if op.kind.is_data() {
            if seen_code {
                messages.err("data statement after code", Some(op.loc.clone()));
            }
        } else {
            seen_code = true;
        }

        if let Some((name, value)) = constant_parts(op) {
            let value = if out_of_range(value) { 0 } else { value };
            symbols.insert(name, Symbol::Constant(value as i32));
        }
    }

    (symbols, messages)
}

/// Report symbols defined more than once. Runs before layout so that every
/// clash is reported at its second definition site.
fn check_symbol_redeclaration(oplist: &[Op]) -> Messages {
    let mut messages = Messages::new();
    let mut seen: FxHashMap<&str, ()> = FxHashMap::default();
    for op in oplist {
        if !matches!(op.kind, OpKind::Constant | OpKind::Label | OpKind::Dlabel) {
            continue;
        }
        if let Some(Value::Sym(name)) = op.args.first().map(|a| &a.value) {
            if seen.insert(name.as_str(), ()).is_some() {
                messages.err(
                    format!("symbol `{}` has already been defined", name),
                    Some(op.loc.clone()),
                );
            }
        }
    }
    messages
}

/// Walk the program maintaining the resolved program counter and the data
/// counter, assigning a value to every label and data label.
fn layout_symbols(oplist: &[Op], settings: &Settings) -> (SymbolTable, Messages) {
    let mut messages = Messages::new();
    let mut symbols = SymbolTable::new();
    // DSKIP can take a named constant, which has to be resolved during
    // layout so later DLABELs land on the right address.
    let mut constants: FxHashMap<&str, i64> = FxHashMap::default();
    let mut pc: u32 = 0;
    let mut dc: u32 = settings.data_start as u32;

    for op in oplist {
        let odc = dc;
        match op.kind {
            OpKind::Label => {
                if let Some(Value::Sym(name)) = op.args.first().map(|a| &a.value) {
                    symbols.insert(name.clone(), Symbol::Label(pc as u16));
                }
            }
            OpKind::Dlabel => {
                if let Some(Value::Sym(name)) = op.args.first().map(|a| &a.value) {
                    if dc >= 0x10000 {
                        // Keep a dummy value to avoid cascading overflow
                        // errors downstream.
                        symbols.insert(name.clone(), Symbol::DataLabel(0));
                    } else {
                        symbols.insert(name.clone(), Symbol::DataLabel(dc as u16));
                    }
                }
            }
            OpKind::Constant => {
                if let Some((name, value)) = constant_parts(op) {
                    constants.insert(name, value);
                }
            }
            OpKind::Integer => dc += 1,
            OpKind::LpString => {
                if let Some(Value::Str(s)) = op.args.first().map(|a| &a.value) {
                    dc += s.len() as u32 + 1;
                }
            }
            OpKind::Dskip => match op.args.first().map(|a| &a.value) {
                Some(Value::Int(n)) if (0..0x10000).contains(n) => dc += *n as u32,
                Some(Value::Sym(name)) => {
                    if let Some(n) = constants.get(name.as_str()) {
                        if (0..0x10000).contains(n) {
                            dc += *n as u32;
                        }
                    }
                }
                _ => (),
            },
            _ if op.kind.is_debug() && settings.elide_debug_ops() => continue,
            _ => pc += operation_length(op) as u32,
        }

        if dc >= 0x10000 && odc < 0x10000 {
            messages.err("past the end of available memory", Some(op.loc.clone()));
        }
    }

    (symbols, messages)
}

/// Extract the `(name, value)` of an op that looks like a well-formed
/// CONSTANT declaration.
fn constant_parts(op: &Op) -> Option<(&str, i64)> {
    if op.kind != OpKind::Constant || op.args.len() != 2 {
        return None;
    }
    match (&op.args[0].value, &op.args[1].value) {
        (Value::Sym(name), Value::Int(value)) => Some((name, *value)),
        _ => None,
    }
}

/// Record the source location of every label for the debugger.
fn labels_to_locations(oplist: &[Op]) -> FxHashMap<String, String> {
    let mut locations = FxHashMap::default();
    for op in oplist {
        if op.kind == OpKind::Label {
            if let Some(Value::Sym(name)) = op.args.first().map(|a| &a.value) {
                locations.insert(
                    name.clone(),
                    format!("{}:{}", op.loc.file.path, op.loc.line),
                );
            }
        }
    }
    locations
}

/// Convert the operations from pseudo-ops to real ops, substituting values
/// for labels and constants. The program must already be type-checked.
fn convert(
    oplist: Vec<Op>,
    symbols: SymbolTable,
    label_locations: FxHashMap<String, String>,
    settings: &Settings,
) -> (Program, Messages) {
    let mut messages = Messages::new();
    let mut code = Vec::new();
    let mut data = Vec::new();
    let mut pc: u32 = 0;
    let mut warned_branch_distance = false;

    for (original_id, op) in oplist.into_iter().enumerate() {
        if op.kind.is_debug() && settings.elide_debug_ops() {
            continue;
        }

        // The display form, before symbols are rewritten to bare integers.
        let original = op.to_string();

        let mut values: Vec<Value> = op.args.iter().map(|a| a.value.clone()).collect();
        if matches!(op.kind, OpKind::RelBranch(_)) {
            if let Some(Value::Sym(name)) = values.first() {
                // A relative branch to a label becomes an offset from the
                // current resolved position.
                let target = symbols
                    .get(name)
                    .expect("symbol was resolved during type checking")
                    .value() as i64;
                let jump = target - pc as i64;
                if !(-128..128).contains(&jump) && !warned_branch_distance {
                    warned_branch_distance = true;
                    messages.warn(
                        "label is too far for a relative branch",
                        Some(op.args[0].loc.clone()),
                    );
                }
                values[0] = Value::Int(jump);
            }
        } else {
            substitute_symbols(&mut values, &symbols);
        }

        if op.kind.is_data() {
            match op.kind {
                OpKind::Integer => {
                    if let Some(Value::Int(v)) = values.first() {
                        data.push(DataOp::Integer(to_u16(*v)));
                    }
                }
                OpKind::LpString => {
                    if let Some(Value::Str(s)) = values.first() {
                        data.push(DataOp::LpString(s.clone()));
                    }
                }
                OpKind::Dskip => {
                    if let Some(Value::Int(v)) = values.first() {
                        data.push(DataOp::Dskip(to_u16(*v)));
                    }
                }
                // CONSTANT and DLABEL only shape the symbol table.
                _ => (),
            }
            continue;
        }

        let expanded = expand(op.kind, &values);
        pc += expanded.len() as u32;
        for real in expanded {
            code.push(ResolvedOp {
                op: real,
                loc: op.loc.clone(),
                original: original.clone(),
                original_id,
                from_call: op.kind == OpKind::Call,
            });
        }
    }

    let program = Program {
        code,
        data,
        data_start: settings.data_start,
        symbols,
        label_locations,
    };
    (program, messages)
}

/// Rewrite symbol arguments to their concrete integer values.
fn substitute_symbols(values: &mut [Value], symbols: &SymbolTable) {
    for value in values.iter_mut() {
        if let Value::Sym(name) = value {
            let symbol = symbols
                .get(name)
                .expect("symbol was resolved during type checking");
            *value = Value::Int(symbol.value() as i64);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::op::{BranchCond, CodeOp, DebugOp, RealOp};
    use crate::parser::parse;
    use crate::settings::Mode;
    use crate::span::SourceFile;
    use crate::symbol::{Register, R_TEMP};

    fn check_str(text: &str) -> (Program, Messages) {
        check_with(text, Settings::default())
    }

    fn check_with(text: &str, settings: Settings) -> (Program, Messages) {
        let (ops, parse_messages) = parse(SourceFile::new("<test>", text), &settings);
        assert!(!parse_messages.has_errors(), "{:?}", parse_messages);
        check(ops, &settings)
    }

    fn real_ops(program: &Program) -> Vec<RealOp> {
        program
            .code
            .iter()
            .filter_map(|rop| match rop.op {
                CodeOp::Real(op) => Some(op),
                CodeOp::Debug(_) => None,
            })
            .collect()
    }

    fn r(i: u8) -> Register {
        Register::new(i).expect("test register index in range")
    }

    #[test]
    fn set_expands_and_labels_account_for_it() {
        // One SET before the label: the label lands at resolved index 2.
        let (program, messages) = check_str("SET(R1, label2)\nLABEL(label2)\nHALT()");
        assert!(!messages.has_errors(), "{:?}", messages);
        assert_eq!(program.symbols.get("label2"), Some(Symbol::Label(2)));
        assert_eq!(
            real_ops(&program),
            vec![
                RealOp::Setlo(r(1), 2),
                RealOp::Sethi(r(1), 0),
                RealOp::Halt,
            ]
        );
    }

    #[test]
    fn data_layout() {
        let (program, messages) =
            check_str("DLABEL(X)\nINTEGER(42)\nDLABEL(S)\nLP_STRING(\"hi\")\nDLABEL(Y)\nDSKIP(3)\nDLABEL(END)");
        assert!(!messages.has_errors(), "{:?}", messages);
        assert_eq!(program.symbols.get("X"), Some(Symbol::DataLabel(0xC000)));
        assert_eq!(program.symbols.get("S"), Some(Symbol::DataLabel(0xC001)));
        assert_eq!(program.symbols.get("Y"), Some(Symbol::DataLabel(0xC004)));
        assert_eq!(program.symbols.get("END"), Some(Symbol::DataLabel(0xC007)));
        assert_eq!(
            program.data_image(),
            vec![42, 2, 'h' as u16, 'i' as u16, 0, 0, 0]
        );
    }

    #[test]
    fn dskip_with_constant() {
        let (program, messages) = check_str("CONSTANT(N, 4)\nDLABEL(A)\nDSKIP(N)\nDLABEL(B)");
        assert!(!messages.has_errors(), "{:?}", messages);
        assert_eq!(program.symbols.get("B"), Some(Symbol::DataLabel(0xC004)));
    }

    #[test]
    fn data_after_code_is_an_error() {
        let (_, messages) = check_str("SET(R1, 1)\nINTEGER(0)");
        assert!(messages.has_errors());
        let text: Vec<_> = messages.iter().map(|m| m.text.clone()).collect();
        assert!(text.iter().any(|t| t.contains("data statement after code")));
    }

    #[test]
    fn branch_to_data_label_is_an_error() {
        let (_, messages) = check_str("DLABEL(X)\nINTEGER(1)\nBR(X)");
        assert!(messages.has_errors());
    }

    #[test]
    fn branch_to_constant_is_an_error() {
        let (_, messages) = check_str("CONSTANT(X, 5)\nBR(X)");
        assert!(messages.has_errors());
    }

    #[test]
    fn undefined_symbol() {
        let (_, messages) = check_str("BR(nowhere)");
        assert!(messages.has_errors());
    }

    #[test]
    fn constant_use_before_declaration() {
        let (_, messages) = check_str("SET(R1, N)\nCONSTANT(N, 4)");
        assert!(messages.has_errors());
    }

    #[test]
    fn redefinition() {
        let (_, messages) = check_str("LABEL(x)\nLABEL(x)");
        assert!(messages.has_errors());
    }

    #[test]
    fn register_branch_with_label_expands_through_scratch() {
        let (program, messages) = check_str("LABEL(top)\nNOP()\nBR(top)");
        assert!(!messages.has_errors(), "{:?}", messages);
        assert_eq!(
            real_ops(&program),
            vec![
                RealOp::Nop,
                RealOp::Setlo(R_TEMP, 0),
                RealOp::Sethi(R_TEMP, 0),
                RealOp::RegBranch(BranchCond::Uncond, R_TEMP),
            ]
        );
    }

    #[test]
    fn relative_branch_offset() {
        let (program, messages) = check_str("LABEL(top)\nNOP()\nBRR(top)");
        assert!(!messages.has_errors(), "{:?}", messages);
        assert_eq!(
            real_ops(&program),
            vec![RealOp::Nop, RealOp::RelBranch(BranchCond::Uncond, -1)]
        );
    }

    #[test]
    fn relative_branch_too_far_warns_once() {
        let mut text = String::from("BRR(far)\nBRR(far)\n");
        for _ in 0..200 {
            text.push_str("NOP()\n");
        }
        text.push_str("LABEL(far)\nHALT()");
        let (_, messages) = check_str(&text);
        assert!(!messages.has_errors(), "{:?}", messages);
        assert_eq!(messages.warning_count(), 1);
    }

    #[test]
    fn cmp_occupies_two_slots() {
        let (program, messages) = check_str("CMP(R1, R2)\nLABEL(after)\nHALT()");
        assert!(!messages.has_errors(), "{:?}", messages);
        assert_eq!(program.symbols.get("after"), Some(Symbol::Label(2)));
        assert_eq!(
            real_ops(&program),
            vec![
                RealOp::Fon(8),
                RealOp::Sub(Register::R0, r(1), r(2)),
                RealOp::Halt,
            ]
        );
    }

    #[test]
    fn debug_ops_occupy_slots_when_running() {
        let (program, messages) = check_str("print(\"x\")\nLABEL(after)\nHALT()");
        assert!(!messages.has_errors(), "{:?}", messages);
        assert_eq!(program.symbols.get("after"), Some(Symbol::Label(1)));
        assert!(matches!(
            program.code[0].op,
            CodeOp::Debug(DebugOp::Print(_))
        ));
    }

    #[test]
    fn debug_ops_elided_when_assembling() {
        // Relative offsets are computed after debug-op elision.
        let text = "BRR(end)\nprint(\"x\")\nLABEL(end)\nHALT()";

        let (program, messages) = check_with(text, Settings::default());
        assert!(!messages.has_errors(), "{:?}", messages);
        assert_eq!(
            real_ops(&program)[0],
            RealOp::RelBranch(BranchCond::Uncond, 2)
        );

        let (program, messages) = check_with(text, Settings::new(Mode::Assemble));
        assert!(!messages.has_errors(), "{:?}", messages);
        assert_eq!(program.code.len(), 2);
        assert_eq!(
            real_ops(&program)[0],
            RealOp::RelBranch(BranchCond::Uncond, 1)
        );
    }

    #[test]
    fn interrupts_rejected_when_running() {
        let (_, messages) = check_str("SWI(1)");
        assert!(messages.has_errors());
        let (_, messages) = check_with("SWI(1)", Settings::new(Mode::Assemble));
        assert!(!messages.has_errors(), "{:?}", messages);
    }

    #[test]
    fn no_debug_ops_flag() {
        let mut settings = Settings::default();
        settings.no_debug_ops = true;
        let (_, messages) = check_with("print_reg(R1)", settings);
        assert!(messages.has_errors());
    }

    #[test]
    fn call_with_atypical_register_warns_once() {
        let (_, messages) = check_str("LABEL(f)\nCALL(R5, f)\nCALL(R6, f)");
        assert!(!messages.has_errors(), "{:?}", messages);
        assert_eq!(messages.warning_count(), 1);
    }

    #[test]
    fn not_with_scratch_register_warns() {
        let (_, messages) = check_str("NOT(R1, R11)");
        assert!(!messages.has_errors(), "{:?}", messages);
        assert_eq!(messages.warning_count(), 1);
    }

    #[test]
    fn opcode_must_decode() {
        let (_, messages) = check_str("OPCODE(0x0102)");
        assert!(messages.has_errors());
        let (program, messages) = check_str("OPCODE(0xA312)");
        assert!(!messages.has_errors(), "{:?}", messages);
        // Opaque at this stage; decoded only by the VM.
        assert_eq!(real_ops(&program), vec![RealOp::Opcode(0xA312)]);
    }

    #[test]
    fn checked_output_contains_only_real_ops() {
        let (program, messages) = check_str(
            "CONSTANT(N, 3)\nDLABEL(X)\nINTEGER(9)\nSET(R1, N)\nMOVE(R2, R1)\nNEG(R3, R2)\n\
             NOT(R4, R2)\nCMP(R1, R2)\nSETRF(R5, X)\nFLAGS(R5)\nCON()\nCOFF()\nCBON()\nCCBOFF()\n\
             LABEL(end)\nBR(end)",
        );
        assert!(!messages.has_errors(), "{:?}", messages);
        // Every op in the output stream is real and executable.
        for rop in &program.code {
            assert!(matches!(rop.op, CodeOp::Real(_)));
        }
    }

    #[test]
    fn original_ids_group_expansions() {
        let (program, messages) = check_str("SET(R1, 1)\nHALT()");
        assert!(!messages.has_errors(), "{:?}", messages);
        assert_eq!(program.code[0].original_id, program.code[1].original_id);
        assert_ne!(program.code[1].original_id, program.code[2].original_id);
        assert_eq!(program.code[0].original, "SET(R1, 1)");
    }
}
