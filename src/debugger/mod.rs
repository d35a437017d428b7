//! The interactive HERA debugger.
//!
//! The debugger operates on the resolved operation stream but presents
//! everything in terms of the operations the user wrote: a single `SET`
//! shows and steps as one instruction even though it resolved to a
//! `SETLO`/`SETHI` pair. Every state-changing command first pushes a
//! snapshot of the machine onto a bounded history, which is what `undo`
//! pops.

pub mod command;
pub mod eval;
mod source;

use fxhash::FxHashMap;

use crate::assembler;
use crate::checker::{check, Program};
use crate::op::{CodeOp, OpKind, RealOp};
use crate::parser;
use crate::runtime::{format_int, RunState};
use crate::settings::{Mode, Settings};
use crate::span::Location;
use crate::symbol::{Symbol, R_PC_RET};

use source::CommandSource;

/// Snapshots kept for `undo`. Each one is a full copy of the machine, which
/// at 128 KiB of memory is cheap enough to keep a generous history.
const MAX_UNDO: usize = 100;

/// Begin an interactive debugging session.
pub fn debug(program: Program, settings: Settings) {
    Debugger::new(program, settings).run();
}

struct Snapshot {
    vm: RunState,
    breakpoints: FxHashMap<u16, String>,
    calls: i32,
    command: &'static str,
}

pub struct Debugger {
    program: Program,
    settings: Settings,
    vm: RunState,
    /// Instruction number to human-readable location.
    breakpoints: FxHashMap<u16, String>,
    /// How many CALLs without RETURNs, for step-over.
    calls: i32,
    history: Vec<Snapshot>,
    last_line: Option<String>,
    source: CommandSource,
}

impl Debugger {
    pub fn new(program: Program, settings: Settings) -> Debugger {
        let mut vm = RunState::new(&settings);
        vm.load_data(&program);
        Debugger {
            program,
            settings,
            vm,
            breakpoints: FxHashMap::default(),
            calls: 0,
            history: Vec::new(),
            last_line: None,
            source: CommandSource::new(),
        }
    }

    /// The debug loop.
    pub fn run(&mut self) {
        if self.program.code.is_empty() {
            println!("Cannot debug an empty program.");
            return;
        }

        println!(
            "HERA debugging session started. Type 'help' for a list of commands.\n\
             Remember to end your HERA program with HALT()!\n"
        );
        self.print_current_op();

        loop {
            let Some(line) = self.source.read(">>> ") else {
                println!();
                break;
            };
            let line = line.trim().to_string();
            // An empty line repeats the previous command.
            let line = if line.is_empty() {
                match &self.last_line {
                    Some(previous) => previous.clone(),
                    None => continue,
                }
            } else {
                self.last_line = Some(line.clone());
                line
            };
            if !self.handle_command(&line) {
                break;
            }
        }
    }

    /// Parse and execute one command. Returns false when the loop should
    /// exit.
    fn handle_command(&mut self, response: &str) -> bool {
        let (cmd, argstr) = match response.split_once(char::is_whitespace) {
            Some((cmd, rest)) => (cmd, rest.trim()),
            None => (response, ""),
        };

        let Some(full) = command::expand(cmd) else {
            if response.contains('=') {
                self.save("assign");
                let (lhs, rhs) = response.split_once('=').expect("checked above");
                self.assign(lhs.trim(), rhs.trim());
            } else {
                println!("{} is not a recognized command.", cmd);
            }
            return true;
        };

        if full == "quit" {
            return false;
        }

        // State-changing commands push an undo snapshot first.
        if matches!(
            full,
            "assign"
                | "break"
                | "clear"
                | "continue"
                | "execute"
                | "goto"
                | "next"
                | "off"
                | "on"
                | "restart"
                | "step"
        ) {
            self.save(full);
        }

        let args: Vec<&str> = argstr.split_whitespace().collect();
        match full {
            "asm" => self.handle_asm(argstr),
            "assign" => self.handle_assign(&args),
            "break" => self.handle_break(&args),
            "clear" => self.handle_clear(&args),
            "continue" => self.handle_continue(&args),
            "dis" => self.handle_dis(&args),
            "doc" => self.handle_doc(&args),
            "execute" => self.handle_execute(argstr),
            "goto" => self.handle_goto(&args),
            "help" => self.handle_help(&args),
            "info" => self.handle_info(&args),
            "list" => self.handle_list(&args),
            "ll" => self.handle_ll(&args),
            "next" => self.handle_next(&args),
            "off" => self.handle_flags(&args, false),
            "on" => self.handle_flags(&args, true),
            "print" => self.handle_print(argstr),
            "restart" => self.handle_restart(&args),
            "step" => self.handle_step(&args),
            "undo" => self.handle_undo(&args),
            _ => unreachable!("every expanded command is dispatched"),
        }
        true
    }

    fn save(&mut self, command: &'static str) {
        if self.history.len() == MAX_UNDO {
            self.history.remove(0);
        }
        self.history.push(Snapshot {
            vm: self.vm.clone(),
            breakpoints: self.breakpoints.clone(),
            calls: self.calls,
            command,
        });
    }

    // == Command handlers ==

    fn handle_asm(&mut self, argstr: &str) {
        if argstr.is_empty() {
            println!("asm takes one argument.");
            return;
        }
        let mut settings = self.settings.clone();
        settings.mode = Mode::Assemble;
        let (ops, mut messages) = parser::parse(
            crate::span::SourceFile::new("<asm>", argstr.to_string()),
            &settings,
        );
        let (program, check_messages) = check(ops, &settings);
        messages.extend(check_messages);
        if messages.has_errors() {
            messages.print();
            return;
        }
        let (code, data) = assembler::assemble(&program);
        for word in code.iter().chain(&data) {
            println!("{:04X}", word);
        }
    }

    fn handle_assign(&mut self, args: &[&str]) {
        if args.len() != 2 {
            println!("assign takes two arguments.");
            return;
        }
        self.assign(args[0], args[1]);
    }

    fn assign(&mut self, lhs: &str, rhs: &str) {
        if let Err(err) = eval::assign(&mut self.vm, &self.program, lhs, rhs) {
            println!("Eval error: {}.", err);
        }
    }

    fn handle_break(&mut self, args: &[&str]) {
        match args {
            [] => {
                if self.breakpoints.is_empty() {
                    println!("No breakpoints set.");
                } else {
                    for brk in self.breakpoints.values() {
                        println!("{}", brk);
                    }
                }
            }
            [loc] => match self.location_to_instruction_number(loc) {
                Ok(b) => {
                    let display = self.instruction_number_to_location(b, true);
                    self.breakpoints.insert(b, display);
                    let loc = &self.program.code[b as usize].loc;
                    println!("Breakpoint set in file {}, line {}.", loc.file.path, loc.line);
                }
                Err(err) => println!("Error: {}", err),
            },
            _ => println!("break takes zero or one arguments."),
        }
    }

    fn handle_clear(&mut self, args: &[&str]) {
        if args.is_empty() {
            println!("clear takes one or more arguments.");
            return;
        }
        if args.contains(&"*") {
            self.breakpoints.clear();
            println!("Cleared all breakpoints.");
            return;
        }
        for arg in args {
            match self.location_to_instruction_number(arg) {
                Ok(b) => {
                    if self.breakpoints.remove(&b).is_some() {
                        let loc = &self.program.code[b as usize].loc;
                        println!(
                            "Cleared breakpoint in file {}, line {}.",
                            loc.file.path, loc.line
                        );
                    } else {
                        println!("No breakpoint at that location.");
                    }
                }
                Err(err) => println!("Error: {}", err),
            }
        }
    }

    fn handle_continue(&mut self, args: &[&str]) {
        if !args.is_empty() {
            println!("continue takes no arguments.");
            return;
        }
        if self.next(true).is_ok() {
            while !self.finished() && !self.at_breakpoint() {
                if self.next(true).is_err() {
                    break;
                }
            }
        }
        self.print_current_op();
    }

    fn handle_dis(&mut self, args: &[&str]) {
        if args.is_empty() {
            match self.current_op().map(|rop| &rop.op) {
                Some(CodeOp::Real(RealOp::Opcode(word))) => match RealOp::decode(*word) {
                    Some(op) => println!("{}", op),
                    None => println!("Error: unknown instruction"),
                },
                _ => println!("Current operation is not an OPCODE."),
            }
            return;
        }
        for arg in args {
            match crate::settings::parse_int_literal(arg) {
                Some(v) if (0..0x10000).contains(&v) => match RealOp::decode(v as u16) {
                    Some(op) => println!("{}", op),
                    None => println!("Error: unknown instruction"),
                },
                _ => {
                    println!("Could not parse argument `{}` to dis.", arg);
                    return;
                }
            }
        }
    }

    fn handle_doc(&mut self, args: &[&str]) {
        let args: Vec<String> = if args.is_empty() {
            match self.current_op() {
                Some(rop) => {
                    // The mnemonic of the original operation.
                    let original = rop.original.clone();
                    vec![original
                        .split('(')
                        .next()
                        .unwrap_or(&original)
                        .to_string()]
                }
                None => {
                    println!("Program has finished executing.");
                    return;
                }
            }
        } else {
            args.iter().map(|s| s.to_string()).collect()
        };

        for arg in args {
            if arg.eq_ignore_ascii_case("branch") {
                println!("{}", crate::op::DOC_BRANCH);
                continue;
            }
            let kind = OpKind::from_mnemonic(&arg)
                .or_else(|| OpKind::from_mnemonic(&arg.to_uppercase()));
            match kind {
                Some(kind) => println!("{}", kind.doc()),
                None => println!("{} is not a HERA operation.", arg),
            }
        }
    }

    fn handle_execute(&mut self, argstr: &str) {
        if argstr.is_empty() {
            println!("execute takes one argument.");
            return;
        }
        let (ops, mut messages) = parser::parse(
            crate::span::SourceFile::new("<execute>", argstr.to_string()),
            &self.settings,
        );
        if messages.has_errors() {
            messages.print();
            return;
        }
        for op in &ops {
            if op.kind.is_branch() {
                println!("execute cannot take branching operations.");
                return;
            }
            if op.kind.is_data() {
                println!("execute cannot take data statements.");
                return;
            }
            if op.kind == OpKind::Label {
                println!("execute cannot take labels.");
                return;
            }
        }

        let (program, mut check_messages) = check(ops, &self.settings);
        if check_messages.has_errors() {
            check_messages.print();
            return;
        }

        // Run the snippet as its own little program, then restore the
        // program counter.
        let old_pc = self.vm.pc;
        let old_halted = self.vm.halted;
        self.vm.pc = 0;
        for _ in 0..program.code.len() {
            if self.vm.pc as usize >= program.code.len() || self.vm.halted {
                break;
            }
            if let Err(err) = self.vm.step(&program) {
                println!("Runtime error: {}.", err);
                break;
            }
        }
        self.vm.pc = old_pc;
        self.vm.halted = old_halted;
    }

    fn handle_goto(&mut self, args: &[&str]) {
        let [loc] = args else {
            println!("goto takes one argument.");
            return;
        };
        match self.location_to_instruction_number(loc) {
            Ok(new_pc) => self.vm.pc = new_pc,
            Err(err) => {
                println!("Error: {}", err);
                return;
            }
        }
        self.print_current_op();
    }

    fn handle_help(&mut self, args: &[&str]) {
        if args.is_empty() {
            println!("{}", command::HELP);
            return;
        }
        for (i, arg) in args.iter().enumerate() {
            match command::expand(arg) {
                Some(full) => println!("{}", command::help_for(full)),
                None => println!("{} is not a recognized command.", arg),
            }
            if i != args.len() - 1 {
                println!();
            }
        }
    }

    fn handle_info(&mut self, args: &[&str]) {
        let aspects: Vec<&'static str> = if args.is_empty() {
            vec!["registers", "flags", "stack"]
        } else {
            let mut aspects = Vec::new();
            for arg in args {
                match expand_info_arg(arg) {
                    Some(aspect) => aspects.push(aspect),
                    None => {
                        println!("Error: unrecognized argument `{}`.", arg);
                        return;
                    }
                }
            }
            aspects
        };

        for (i, aspect) in aspects.iter().enumerate() {
            match *aspect {
                "registers" => self.info_registers(),
                "flags" => self.info_flags(),
                "stack" => self.info_stack(),
                "symbols" => self.info_symbols(),
                "memory" => self.info_memory(),
                _ => unreachable!("expand_info_arg returns known aspects"),
            }
            if i != aspects.len() - 1 {
                println!();
            }
        }
    }

    fn handle_list(&mut self, args: &[&str]) {
        if args.len() > 1 {
            println!("list takes zero or one arguments.");
            return;
        }
        let context = match args.first() {
            Some(arg) => match crate::settings::parse_int_literal(arg) {
                Some(n) if n >= 0 => n as u32,
                _ => {
                    println!("Could not parse argument to list.");
                    return;
                }
            },
            None => 3,
        };
        match self.current_op() {
            Some(rop) => {
                let loc = rop.loc.clone();
                self.print_range_of_ops(&loc, Some(context));
            }
            None => println!("Program has finished executing."),
        }
    }

    fn handle_ll(&mut self, args: &[&str]) {
        if !args.is_empty() {
            println!("ll takes no arguments.");
            return;
        }
        match self.current_op() {
            Some(rop) => {
                let loc = rop.loc.clone();
                self.print_range_of_ops(&loc, None);
            }
            None => println!("Program has finished executing."),
        }
    }

    fn handle_next(&mut self, args: &[&str]) {
        if args.len() > 1 {
            println!("next takes zero or one arguments.");
            return;
        }
        let n = match args.first() {
            Some(arg) => match arg.parse::<u32>() {
                Ok(n) => n,
                Err(_) => {
                    println!("Could not parse argument to next.");
                    return;
                }
            },
            None => 1,
        };
        for _ in 0..n {
            if self.finished() || self.next(false).is_err() {
                break;
            }
        }
        self.print_current_op();
    }

    fn handle_flags(&mut self, args: &[&str], value: bool) {
        if args.is_empty() {
            println!("{} takes one or more arguments.", if value { "on" } else { "off" });
            return;
        }
        for arg in args {
            let flag = arg.replace('-', "_");
            match flag.as_str() {
                "cb" | "carry_block" => self.vm.flag_carry_block = value,
                "c" | "carry" => self.vm.flag_carry = value,
                "v" | "overflow" => self.vm.flag_overflow = value,
                "s" | "sign" => self.vm.flag_sign = value,
                "z" | "zero" => self.vm.flag_zero = value,
                _ => println!("Unrecognized flag: `{}`.", arg),
            }
        }
    }

    fn handle_print(&mut self, argstr: &str) {
        if argstr.is_empty() {
            println!("print takes one or more arguments.");
            return;
        }
        let tree = match eval::parse(argstr) {
            Ok(tree) => tree,
            Err(err) => {
                println!("Parse error: {}.", err);
                return;
            }
        };

        let mut spec = tree.fmt.clone();
        for c in spec.chars() {
            if !"dxobcsl".contains(c) {
                println!("Unknown format specifier `{}`.", c);
                return;
            }
        }
        // An explicit 'c' or 's' forces output even for values that are not
        // characters or negative.
        spec = spec.replace('c', "C").replace('s', "S");

        let with_lhs = tree.seq.len() > 1;
        for node in &tree.seq {
            if let Err(err) = self.print_one_expr(node, &spec, with_lhs) {
                println!("Eval error: {}.", err);
                return;
            }
        }
    }

    fn print_one_expr(&self, node: &eval::Node, spec: &str, with_lhs: bool) -> Result<(), String> {
        let mut spec = spec.to_string();
        // Some expressions deserve a source location by default.
        match node {
            eval::Node::Reg(r) if *r == R_PC_RET && spec.is_empty() => {
                spec = augment_spec(&spec, 'l');
            }
            eval::Node::Sym(name) => {
                if name.eq_ignore_ascii_case("pc") {
                    spec = augment_spec(&spec, 'l');
                } else if let Some(Symbol::Label(_)) = self.program.symbols.get(name) {
                    spec = augment_spec(&spec, 'l');
                }
            }
            eval::Node::Int(_) if spec.is_empty() => spec = "d".to_string(),
            _ => (),
        }

        let value = crate::op::to_u16(eval::evaluate(node, &self.vm, &self.program)?);
        if with_lhs {
            println!("{} = {}", node, self.format_int(value, &spec));
        } else {
            println!("{}", self.format_int(value, &spec));
        }
        Ok(())
    }

    fn format_int(&self, v: u16, spec: &str) -> String {
        let spec = if spec.is_empty() { DEFAULT_SPEC } else { spec };
        if !spec.contains('l') {
            return format_int(v, spec);
        }
        let without_l: String = spec.chars().filter(|c| *c != 'l').collect();
        if (v as usize) < self.program.code.len() {
            format!(
                "{} [{}]",
                format_int(v, &without_l),
                self.instruction_number_to_location(v, false)
            )
        } else {
            format_int(v, &without_l)
        }
    }

    fn handle_restart(&mut self, args: &[&str]) {
        if !args.is_empty() {
            println!("restart takes no arguments.");
            return;
        }
        self.vm.reset(&self.program, &self.settings);
        self.calls = 0;
        self.print_current_op();
    }

    fn handle_step(&mut self, args: &[&str]) {
        if !args.is_empty() {
            println!("step takes no arguments.");
            return;
        }
        match self.current_op() {
            Some(rop) if rop.from_call => {
                let _ = self.next(true);
                self.print_current_op();
            }
            _ => println!("step is only valid when the current instruction is CALL."),
        }
    }

    fn handle_undo(&mut self, args: &[&str]) {
        if !args.is_empty() {
            println!("undo takes no arguments.");
            return;
        }
        match self.history.pop() {
            Some(snapshot) => {
                println!("Undid {}.", snapshot.command);
                self.vm = snapshot.vm;
                self.breakpoints = snapshot.breakpoints;
                self.calls = snapshot.calls;
            }
            None => println!("Nothing to undo."),
        }
    }

    // == Debugging primitives ==

    fn finished(&self) -> bool {
        self.vm.finished(&self.program)
    }

    fn at_breakpoint(&self) -> bool {
        !self.finished() && self.breakpoints.contains_key(&self.vm.pc)
    }

    fn current_op(&self) -> Option<&crate::op::ResolvedOp> {
        if self.finished() {
            None
        } else {
            self.program.code.get(self.vm.pc as usize)
        }
    }

    /// The range of resolved indices belonging to the current original
    /// operation.
    fn current_group(&self) -> std::ops::Range<usize> {
        let start = self.vm.pc as usize;
        let id = self.program.code[start].original_id;
        let mut end = start;
        while end < self.program.code.len() && self.program.code[end].original_id == id {
            end += 1;
        }
        start..end
    }

    /// Advance by one original instruction. With `step` false, a CALL is
    /// executed through to its matching RETURN.
    fn next(&mut self, step: bool) -> Result<(), ()> {
        if self.finished() {
            return Ok(());
        }

        if !step && self.current_op().is_some_and(|rop| rop.from_call) {
            let calls = self.calls;
            self.next(true)?;
            while !self.finished() && !self.at_breakpoint() && self.calls > calls {
                self.next(true)?;
            }
            return Ok(());
        }

        let group = self.current_group();
        for _ in 0..group.len() {
            if self.finished() || !group.contains(&(self.vm.pc as usize)) {
                break;
            }
            match &self.program.code[self.vm.pc as usize].op {
                CodeOp::Real(RealOp::Call(..)) => self.calls += 1,
                CodeOp::Real(RealOp::Return(..)) => self.calls -= 1,
                _ => (),
            }
            if let Err(err) = self.vm.step(&self.program) {
                match err.location() {
                    Some(loc) => println!("Runtime error: {} (line {}).", err, loc.line),
                    None => println!("Runtime error: {}.", err),
                }
                return Err(());
            }
        }
        Ok(())
    }

    /// Resolve a user-supplied location (line number, `path:line`, label, or
    /// `.`) into an instruction number.
    fn location_to_instruction_number(&self, loc: &str) -> Result<u16, String> {
        let resolved = if loc == "." {
            Ok(self.vm.pc)
        } else {
            let (path, lineno) = match loc.split_once(':') {
                Some((path, lineno)) => (path.to_string(), lineno.to_string()),
                None => {
                    let path = match self.current_op() {
                        Some(rop) => rop.loc.file.path.to_string(),
                        None => String::new(),
                    };
                    (path, loc.to_string())
                }
            };

            match lineno.parse::<u32>() {
                Ok(lineno) => self
                    .program
                    .code
                    .iter()
                    .position(|rop| *rop.loc.file.path == path && rop.loc.line == lineno)
                    .map(|pc| pc as u16)
                    .ok_or_else(|| "could not find corresponding line.".to_string()),
                Err(_) => match self.program.symbols.get(loc) {
                    Some(Symbol::Label(pc)) => Ok(pc),
                    _ => Err(format!("could not locate label `{}`.", loc)),
                },
            }
        }?;

        if (resolved as usize) < self.program.code.len() {
            Ok(resolved)
        } else {
            Err("location is past the end of the program.".to_string())
        }
    }

    /// Turn an instruction number into a human-readable location string.
    fn instruction_number_to_location(&self, b: u16, append_label: bool) -> String {
        let loc = &self.program.code[b as usize].loc;
        let formatted = format!("{}:{}", loc.file.path, loc.line);
        if append_label {
            if let Some(label) = self.program.symbols.label_for(b) {
                return format!("{} ({})", formatted, label);
            }
        }
        formatted
    }

    // == Output helpers ==

    fn print_current_op(&self) {
        match self.current_op() {
            Some(rop) => {
                let loc = rop.loc.clone();
                self.print_range_of_ops(&loc, Some(1));
            }
            None => println!("Program has finished executing."),
        }
    }

    /// Print the line at `loc` with `context` lines around it, or the whole
    /// file when `context` is `None`.
    fn print_range_of_ops(&self, loc: &Location, context: Option<u32>) {
        let lines: Vec<&str> = loc.file.text.lines().collect();
        let lineno = loc.line.saturating_sub(1) as usize;
        let width = lines.len().to_string().len();

        let (lo, hi) = match context {
            None => (0, lines.len()),
            Some(context) => (
                lineno.saturating_sub(context as usize),
                usize::min(lineno + context as usize + 1, lines.len()),
            ),
        };

        println!("[{}]\n", loc.file.path);
        for (i, line) in lines.iter().enumerate().take(hi).skip(lo) {
            let prefix = if i == lineno { "->  " } else { "    " };
            let line = line.trim_end();
            if line.is_empty() {
                println!("{}{:>width$}", prefix, i + 1, width = width);
            } else {
                println!("{}{:>width$}  {}", prefix, i + 1, line, width = width);
            }
        }
    }

    fn info_registers(&self) {
        let mut nonzero = 0;
        let mut parts = Vec::new();
        for i in 1..16u8 {
            let reg = crate::symbol::Register::new(i).expect("index is in range");
            let value = self.vm.reg(reg);
            if value != 0 {
                nonzero += 1;
                parts.push(format!("R{} = {}", i, value));
            }
        }
        if nonzero == 0 {
            println!("All registers set to zero.");
        } else if nonzero != 15 {
            println!("{}, all other registers set to zero.", parts.join(", "));
        } else {
            println!("{}", parts.join(", "));
        }
    }

    fn info_flags(&self) {
        let mut on = Vec::new();
        if self.vm.flag_carry_block {
            on.push("carry-block flag is on");
        }
        if self.vm.flag_carry {
            on.push("carry flag is on");
        }
        if self.vm.flag_overflow {
            on.push("overflow flag is on");
        }
        if self.vm.flag_zero {
            on.push("zero flag is on");
        }
        if self.vm.flag_sign {
            on.push("sign flag is on");
        }

        match on.len() {
            5 => println!("All flags are on."),
            0 => println!("All flags are off."),
            _ => {
                let joined = on.join(", ");
                let capitalized = joined[..1].to_uppercase() + &joined[1..];
                println!("{}, all other flags are off.", capitalized);
            }
        }
    }

    fn info_stack(&self) {
        if self.vm.expected_returns.is_empty() {
            println!("The call stack is empty.");
            return;
        }
        println!("Call stack (last call at bottom)");
        for (call_address, return_address) in &self.vm.expected_returns {
            let floc = self.safe_location(*call_address);
            let rloc = self.safe_location(return_address.wrapping_sub(1));
            match self.program.symbols.label_for(*call_address) {
                Some(name) => println!("  {} ({}, called from {})", name, floc, rloc),
                None => println!("  {} (called from {})", floc, rloc),
            }
        }
    }

    fn safe_location(&self, b: u16) -> String {
        if (b as usize) < self.program.code.len() {
            self.instruction_number_to_location(b, false)
        } else {
            format!("<{}>", b)
        }
    }

    fn info_symbols(&self) {
        let mut constants = Vec::new();
        let mut labels = Vec::new();
        let mut dlabels = Vec::new();
        for (name, symbol) in self.program.symbols.iter() {
            match symbol {
                Symbol::Constant(v) => constants.push(format!("{} ({})", name, v)),
                Symbol::Label(_) => {
                    let loc = self
                        .program
                        .label_locations
                        .get(name)
                        .cloned()
                        .unwrap_or_default();
                    labels.push(format!("{} ({})", name, loc));
                }
                Symbol::DataLabel(addr) => dlabels.push(format!("{} (0x{:x})", name, addr)),
            }
        }
        constants.sort();
        labels.sort();
        dlabels.sort();

        if !constants.is_empty() {
            println!("Constants: {}", constants.join(", "));
        }
        if !labels.is_empty() {
            println!("Labels: {}", labels.join(", "));
        }
        if !dlabels.is_empty() {
            println!("Data labels: {}", dlabels.join(", "));
        }
        if constants.is_empty() && labels.is_empty() && dlabels.is_empty() {
            println!("The program defines no symbols.");
        }
    }

    fn info_memory(&self) {
        let data_cells: u32 = self.program.data.iter().map(|d| d.cells()).sum();
        let top = (self.program.data_start as u32 + data_cells).min(0x10000);
        let mut any = false;
        for addr in self.program.data_start as u32..top {
            let value = self.vm.mem(addr as u16);
            if value != 0 {
                any = true;
                println!("@0x{:04x} = {}", addr, format_int(value, "dsc"));
            }
        }
        if !any {
            println!("The data segment is empty.");
        }
    }
}

const DEFAULT_SPEC: &str = "dsc";

fn augment_spec(spec: &str, f: char) -> String {
    if spec.is_empty() {
        return augment_spec(DEFAULT_SPEC, f);
    }
    if spec.contains(f) {
        spec.to_string()
    } else {
        format!("{}{}", spec, f)
    }
}

fn expand_info_arg(arg: &str) -> Option<&'static str> {
    let arg = arg.to_lowercase();
    // "stack" comes before "symbols" so that "s" resolves to "stack".
    for full in ["stack", "symbols", "registers", "flags", "memory"] {
        if full.starts_with(&arg) {
            return Some(full);
        }
    }
    None
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::span::SourceFile;

    fn debugger(text: &str) -> Debugger {
        let settings = Settings::new(Mode::Debug);
        let (ops, parse_messages) = parser::parse(SourceFile::new("<test>", text), &settings);
        assert!(!parse_messages.has_errors(), "{:?}", parse_messages);
        let (program, messages) = check(ops, &settings);
        assert!(!messages.has_errors(), "{:?}", messages);
        Debugger::new(program, settings)
    }

    fn r(i: u8) -> crate::symbol::Register {
        crate::symbol::Register::new(i).expect("test register index in range")
    }

    #[test]
    fn next_steps_one_original_op() {
        let mut dbg = debugger("SET(R1, 7)\nSET(R2, 8)\nHALT()");
        dbg.next(false).expect("step should succeed");
        // SET is a single step, despite resolving to SETLO + SETHI.
        assert_eq!(dbg.vm.pc, 2);
        assert_eq!(dbg.vm.reg(r(1)), 7);
        assert_eq!(dbg.vm.reg(r(2)), 0);
    }

    #[test]
    fn next_steps_over_calls() {
        let mut dbg = debugger(
            "CALL(FP_alt, f)\nHALT()\nLABEL(f)\nSET(R1, 1)\nRETURN(FP_alt, PC_ret)",
        );
        dbg.next(false).expect("step should succeed");
        // The whole function ran and control is back after the CALL.
        assert_eq!(dbg.vm.reg(r(1)), 1);
        assert_eq!(dbg.vm.pc, 3);
    }

    #[test]
    fn step_enters_calls() {
        let mut dbg = debugger(
            "CALL(FP_alt, f)\nHALT()\nLABEL(f)\nSET(R1, 1)\nRETURN(FP_alt, PC_ret)",
        );
        dbg.next(true).expect("step should succeed");
        // Stopped at the first instruction of the function body.
        assert_eq!(dbg.vm.reg(r(1)), 0);
        assert_eq!(dbg.vm.pc, 4);
    }

    #[test]
    fn breakpoints_stop_continue() {
        let mut dbg = debugger("SET(R1, 1)\nSET(R2, 2)\nLABEL(stop)\nSET(R3, 3)\nHALT()");
        let b = dbg
            .location_to_instruction_number("stop")
            .expect("label exists");
        dbg.breakpoints.insert(b, String::new());
        dbg.handle_continue(&[]);
        assert_eq!(dbg.vm.pc, b);
        assert_eq!(dbg.vm.reg(r(2)), 2);
        assert_eq!(dbg.vm.reg(r(3)), 0);
    }

    #[test]
    fn location_resolution() {
        let dbg = debugger("SET(R1, 1)\nLABEL(two)\nHALT()");
        assert_eq!(dbg.location_to_instruction_number("."), Ok(0));
        assert_eq!(dbg.location_to_instruction_number("two"), Ok(2));
        assert_eq!(dbg.location_to_instruction_number("1"), Ok(0));
        assert_eq!(dbg.location_to_instruction_number("<test>:3"), Ok(2));
        assert!(dbg.location_to_instruction_number("nowhere").is_err());
        assert!(dbg.location_to_instruction_number("99").is_err());
    }

    #[test]
    fn undo_restores_machine_state() {
        let mut dbg = debugger("SET(R1, 7)\nHALT()");
        assert!(dbg.handle_command("next"));
        assert_eq!(dbg.vm.reg(r(1)), 7);
        assert!(dbg.handle_command("undo"));
        assert_eq!(dbg.vm.reg(r(1)), 0);
        assert_eq!(dbg.vm.pc, 0);
    }

    #[test]
    fn undo_restores_breakpoints() {
        let mut dbg = debugger("LABEL(top)\nSET(R1, 1)\nHALT()");
        assert!(dbg.handle_command("break top"));
        assert_eq!(dbg.breakpoints.len(), 1);
        assert!(dbg.handle_command("undo"));
        assert!(dbg.breakpoints.is_empty());
    }

    #[test]
    fn assign_alias() {
        let mut dbg = debugger("HALT()");
        assert!(dbg.handle_command("R1 = 21 * 2"));
        assert_eq!(dbg.vm.reg(r(1)), 42);
    }

    #[test]
    fn execute_runs_snippet_and_restores_pc() {
        let mut dbg = debugger("SET(R1, 1)\nHALT()");
        assert!(dbg.handle_command("execute SET(R5, 40)  INC(R5, 2)"));
        assert_eq!(dbg.vm.reg(r(5)), 42);
        assert_eq!(dbg.vm.pc, 0);
    }

    #[test]
    fn execute_rejects_branches() {
        let mut dbg = debugger("LABEL(top)\nHALT()");
        assert!(dbg.handle_command("execute BR(top)"));
        assert_eq!(dbg.vm.pc, 0);
        assert!(dbg.handle_command("execute INTEGER(4)"));
        assert!(dbg.handle_command("execute LABEL(x)"));
    }

    #[test]
    fn goto_and_restart() {
        let mut dbg = debugger("SET(R1, 1)\nSET(R2, 2)\nHALT()");
        assert!(dbg.handle_command("goto 2"));
        assert_eq!(dbg.vm.pc, 2);
        assert!(dbg.handle_command("next"));
        assert!(dbg.handle_command("restart"));
        assert_eq!(dbg.vm.pc, 0);
        assert_eq!(dbg.vm.reg(r(2)), 0);
    }

    #[test]
    fn flags_on_off() {
        let mut dbg = debugger("HALT()");
        assert!(dbg.handle_command("on carry zero"));
        assert!(dbg.vm.flag_carry);
        assert!(dbg.vm.flag_zero);
        assert!(dbg.handle_command("off c"));
        assert!(!dbg.vm.flag_carry);
        assert!(dbg.vm.flag_zero);
    }

    #[test]
    fn quit_ends_loop() {
        let mut dbg = debugger("HALT()");
        assert!(!dbg.handle_command("quit"));
        assert!(!dbg.handle_command("q"));
    }

    #[test]
    fn runtime_error_returns_to_prompt() {
        let mut dbg = debugger("SET(SP, 0xD000)\nSET(R1, 1)\nHALT()");
        // The stack overflow surfaces as a message, not a panic or exit.
        assert!(dbg.handle_command("continue"));
        assert!(dbg.vm.halted);
    }

    #[test]
    fn label_past_the_end_is_rejected() {
        let dbg = debugger("NOP()\nLABEL(end)");
        assert!(dbg.location_to_instruction_number("end").is_err());
    }
}
