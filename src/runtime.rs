//! The HERA virtual machine.
//!
//! [`RunState`] holds the complete machine state: sixteen registers, 64K
//! words of memory, the five flags, the program counter and the halt latch.
//! The program counter indexes into the resolved operation stream, not into
//! memory. Cloning a `RunState` snapshots the whole machine, which is what
//! the debugger's `undo` command leans on.

use std::fmt;
use std::io::Write as _;

use colored::Colorize;

use crate::checker::Program;
use crate::op::{from_u16, CodeOp, DebugOp, RealOp, ResolvedOp};
use crate::settings::Settings;
use crate::span::Location;
use crate::symbol::{Register, R_FP, R_SP};

/// The HERA address space: 2^16 words.
pub const MEMORY_MAX: usize = 0x10000;

/// A fault that stops execution and surfaces to the caller (the CLI exits
/// with code 3; the debugger returns to its prompt).
#[derive(Clone, PartialEq, Debug)]
pub enum RuntimeError {
    /// SWI or RTI reached the execution unit.
    Interrupt(&'static str, Option<Location>),
    /// The stack pointer crossed into the data segment.
    StackOverflow(u16, Option<Location>),
    /// The throttle bound on executed instructions was reached.
    Throttled(u64),
}

impl RuntimeError {
    pub fn location(&self) -> Option<&Location> {
        match self {
            RuntimeError::Interrupt(_, loc) | RuntimeError::StackOverflow(_, loc) => loc.as_ref(),
            RuntimeError::Throttled(_) => None,
        }
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::Interrupt(name, _) => {
                write!(f, "{} is a no-op in this simulator", name)
            }
            RuntimeError::StackOverflow(sp, _) => {
                write!(f, "stack overflow (SP = 0x{:04x})", sp)
            }
            RuntimeError::Throttled(n) => {
                write!(f, "program throttled after {} instructions", n)
            }
        }
    }
}

impl std::error::Error for RuntimeError {}

/// Complete machine state.
#[derive(Clone)]
pub struct RunState {
    reg: [u16; 16],
    mem: Box<[u16]>,
    pub pc: u16,
    pub flag_sign: bool,
    pub flag_zero: bool,
    pub flag_overflow: bool,
    pub flag_carry: bool,
    pub flag_carry_block: bool,
    pub halted: bool,
    pub op_count: u64,
    /// `(call_target, expected_return)` pairs, for the debugger's call
    /// stack and the RETURN address check.
    pub expected_returns: Vec<(u16, u16)>,
    /// Number of runtime warnings issued so far.
    pub warning_count: u32,
    data_start: u16,
    warn_return: bool,
    warned_return: bool,
    warned_interrupt: bool,
}

impl RunState {
    pub fn new(settings: &Settings) -> RunState {
        let mut state = RunState {
            reg: [0; 16],
            mem: vec![0; MEMORY_MAX].into_boxed_slice(),
            pc: 0,
            flag_sign: false,
            flag_zero: false,
            flag_overflow: false,
            flag_carry: false,
            flag_carry_block: false,
            halted: false,
            op_count: 0,
            expected_returns: Vec::new(),
            warning_count: 0,
            data_start: settings.data_start,
            warn_return: settings.warn_return_on,
            warned_return: false,
            warned_interrupt: false,
        };
        for (reg, value) in &settings.init {
            state.set_reg(*reg, *value);
        }
        state
    }

    /// Reset to the initial state and load the program's data segment.
    pub fn reset(&mut self, program: &Program, settings: &Settings) {
        *self = RunState::new(settings);
        self.load_data(program);
    }

    /// Write the program's static data into memory starting at the
    /// data-segment base address.
    pub fn load_data(&mut self, program: &Program) {
        let mut addr = program.data_start;
        for word in program.data_image() {
            self.set_mem(addr, word);
            addr = addr.wrapping_add(1);
        }
    }

    /// Read a register. R0 always reads zero.
    pub fn reg(&self, reg: Register) -> u16 {
        self.reg[reg.index()]
    }

    /// Write a register. Writes to R0 are discarded.
    pub fn set_reg(&mut self, reg: Register, value: u16) {
        if reg.index() != 0 {
            self.reg[reg.index()] = value;
        }
    }

    pub fn mem(&self, addr: u16) -> u16 {
        self.mem[addr as usize]
    }

    pub fn set_mem(&mut self, addr: u16, value: u16) {
        self.mem[addr as usize] = value;
    }

    /// True once the program can make no further progress.
    pub fn finished(&self, program: &Program) -> bool {
        self.halted || self.pc as usize >= program.code.len()
    }

    /// Run the program to completion (or fault).
    pub fn run(&mut self, program: &Program, throttle: Option<u64>) -> Result<(), RuntimeError> {
        while !self.finished(program) {
            if let Some(limit) = throttle {
                if self.op_count >= limit {
                    return Err(RuntimeError::Throttled(limit));
                }
            }
            self.step(program)?;
        }
        Ok(())
    }

    /// Execute the single operation at the program counter.
    pub fn step(&mut self, program: &Program) -> Result<(), RuntimeError> {
        let rop: &ResolvedOp = &program.code[self.pc as usize];
        let loc = rop.loc.clone();
        match rop.op.clone() {
            CodeOp::Real(op) => self.exec(op, Some(&loc))?,
            CodeOp::Debug(op) => self.exec_debug(&op, program),
        }
        self.op_count += 1;
        let sp = self.reg(R_SP);
        if sp >= self.data_start {
            self.halted = true;
            return Err(RuntimeError::StackOverflow(sp, Some(loc)));
        }
        Ok(())
    }

    /// Execute one real operation. The operation decides the new program
    /// counter; everything except branches, CALL and RETURN advances by one.
    pub fn exec(&mut self, op: RealOp, loc: Option<&Location>) -> Result<(), RuntimeError> {
        use RealOp::*;
        match op {
            Setlo(d, v) => {
                // Sign-extended: SETLO(R1, 200) leaves R1 holding -56.
                self.set_reg(d, v as i8 as i16 as u16);
                self.pc += 1;
            }
            Sethi(d, v) => {
                let low = self.reg(d) & 0x00FF;
                self.set_reg(d, (v as u16) << 8 | low);
                self.pc += 1;
            }
            Add(d, a, b) => {
                let left = self.reg(a);
                let right = self.reg(b);
                let carry = u32::from(!self.flag_carry_block && self.flag_carry);
                let total = left as u32 + right as u32 + carry;
                let result = total as u16;
                self.flag_carry = total > 0xFFFF;
                self.flag_overflow =
                    from_u16(result) as i32 != from_u16(left) as i32 + from_u16(right) as i32;
                self.set_result(d, result);
            }
            Sub(d, a, b) => {
                let left = self.reg(a);
                let right = self.reg(b);
                let borrow = u16::from(!self.flag_carry_block && !self.flag_carry);
                let result = left.wrapping_sub(right).wrapping_sub(borrow);
                // Carry is set when no borrow from the 2^16 place is needed.
                self.flag_carry = left >= right;
                self.flag_overflow = from_u16(result) as i32
                    != from_u16(left) as i32 - from_u16(right) as i32 - borrow as i32;
                self.set_result(d, result);
            }
            Mul(d, a, b) => {
                let left = self.reg(a);
                let right = self.reg(b);
                let result = if self.flag_sign && !self.flag_carry_block {
                    // High 16 bits of the signed 32-bit product.
                    let product = from_u16(left) as i32 * from_u16(right) as i32;
                    ((product as u32) >> 16) as u16
                } else {
                    left.wrapping_mul(right)
                };
                self.flag_carry = (result as u32) < left as u32 * right as u32;
                self.flag_overflow =
                    from_u16(result) as i64 != from_u16(left) as i64 * from_u16(right) as i64;
                self.set_result(d, result);
            }
            And(d, a, b) => {
                let result = self.reg(a) & self.reg(b);
                self.set_result(d, result);
            }
            Or(d, a, b) => {
                let result = self.reg(a) | self.reg(b);
                self.set_result(d, result);
            }
            Xor(d, a, b) => {
                let result = self.reg(a) ^ self.reg(b);
                self.set_result(d, result);
            }
            Inc(d, v) => {
                let original = self.reg(d);
                let result = original.wrapping_add(v as u16);
                self.flag_overflow = from_u16(result) as i32 != from_u16(original) as i32 + v as i32;
                self.flag_carry = original as u32 + v as u32 >= 0x10000;
                self.set_result(d, result);
            }
            Dec(d, v) => {
                let original = self.reg(d);
                let result = original.wrapping_sub(v as u16);
                self.flag_overflow = from_u16(result) as i32 != from_u16(original) as i32 - v as i32;
                self.flag_carry = original < v as u16;
                self.set_result(d, result);
            }
            Lsl(d, b) => {
                let arg = self.reg(b);
                let carry = u16::from(self.flag_carry && !self.flag_carry_block);
                let result = arg.wrapping_shl(1).wrapping_add(carry);
                self.flag_carry = arg & 0x8000 != 0;
                self.set_result(d, result);
            }
            Lsr(d, b) => {
                let arg = self.reg(b);
                let carry = if self.flag_carry && !self.flag_carry_block {
                    0x8000
                } else {
                    0
                };
                let result = (arg >> 1) + carry;
                self.flag_carry = arg & 1 != 0;
                self.set_result(d, result);
            }
            Lsl8(d, b) => {
                let result = self.reg(b).wrapping_shl(8);
                self.set_result(d, result);
            }
            Lsr8(d, b) => {
                let result = self.reg(b) >> 8;
                self.set_result(d, result);
            }
            Asl(d, b) => {
                let arg = self.reg(b);
                let carry = u16::from(self.flag_carry && !self.flag_carry_block);
                let result = arg.wrapping_shl(1).wrapping_add(carry);
                self.flag_carry = arg & 0x8000 != 0;
                self.flag_overflow = arg & 0x8000 != 0 && result & 0x8000 == 0;
                self.set_result(d, result);
            }
            Asr(d, b) => {
                let arg = self.reg(b);
                // Arithmetic shift: negative values round toward -infinity.
                let result = (from_u16(arg) >> 1) as u16;
                self.flag_carry = arg & 1 != 0;
                self.set_result(d, result);
            }
            Savef(d) => {
                let value = u16::from(self.flag_sign)
                    | u16::from(self.flag_zero) << 1
                    | u16::from(self.flag_overflow) << 2
                    | u16::from(self.flag_carry) << 3
                    | u16::from(self.flag_carry_block) << 4;
                self.set_reg(d, value);
                self.pc += 1;
            }
            Rstrf(d) => {
                let value = self.reg(d);
                self.set_flags_from_bits(value, true);
                self.pc += 1;
            }
            Fon(v) => {
                self.flag_sign |= v & 1 != 0;
                self.flag_zero |= v & 0b10 != 0;
                self.flag_overflow |= v & 0b100 != 0;
                self.flag_carry |= v & 0b1000 != 0;
                self.flag_carry_block |= v & 0b10000 != 0;
                self.pc += 1;
            }
            Foff(v) => {
                self.flag_sign &= v & 1 == 0;
                self.flag_zero &= v & 0b10 == 0;
                self.flag_overflow &= v & 0b100 == 0;
                self.flag_carry &= v & 0b1000 == 0;
                self.flag_carry_block &= v & 0b10000 == 0;
                self.pc += 1;
            }
            Fset5(v) => {
                self.set_flags_from_bits(v as u16, true);
                self.pc += 1;
            }
            Fset4(v) => {
                self.set_flags_from_bits(v as u16, false);
                self.pc += 1;
            }
            Load(d, o, b) => {
                let addr = self.reg(b).wrapping_add(o as u16);
                let result = self.mem(addr);
                self.set_zero_and_sign(result);
                self.set_reg(d, result);
                self.pc += 1;
            }
            Store(s, o, b) => {
                let addr = self.reg(b).wrapping_add(o as u16);
                let value = self.reg(s);
                self.set_mem(addr, value);
                self.pc += 1;
            }
            RegBranch(cond, r) => {
                if cond.should(
                    self.flag_sign,
                    self.flag_zero,
                    self.flag_overflow,
                    self.flag_carry,
                ) {
                    self.pc = self.reg(r);
                } else {
                    self.pc += 1;
                }
            }
            RelBranch(cond, offset) => {
                if cond.should(
                    self.flag_sign,
                    self.flag_zero,
                    self.flag_overflow,
                    self.flag_carry,
                ) {
                    self.pc = self.pc.wrapping_add(offset as i16 as u16);
                } else {
                    self.pc += 1;
                }
            }
            Call(a, b) => {
                self.expected_returns
                    .push((self.reg(b), self.pc.wrapping_add(1)));
                self.jump_and_swap(a, b);
            }
            Return(a, b) => {
                let got = self.reg(b);
                if self.warn_return && !self.warned_return {
                    let valid = match self.expected_returns.pop() {
                        Some((_, expected)) => expected == got,
                        None => false,
                    };
                    if !valid {
                        self.warned_return = true;
                        self.warning(format!("incorrect return address (got {})", got), loc);
                    }
                } else {
                    self.expected_returns.pop();
                }
                self.jump_and_swap(a, b);
            }
            Swi(_) => {
                self.pc += 1;
                if !self.warned_interrupt {
                    self.warned_interrupt = true;
                    return Err(RuntimeError::Interrupt("SWI", loc.cloned()));
                }
            }
            Rti => {
                self.pc += 1;
                if !self.warned_interrupt {
                    self.warned_interrupt = true;
                    return Err(RuntimeError::Interrupt("RTI", loc.cloned()));
                }
            }
            Halt => self.halted = true,
            Nop => self.pc += 1,
            Opcode(word) => match RealOp::decode(word) {
                // Opaque to the assembler, but executed as the instruction
                // it decodes to.
                Some(decoded) => return self.exec(decoded, loc),
                None => self.pc += 1,
            },
        }
        Ok(())
    }

    /// The common tail of CALL and RETURN: exchange the program counter with
    /// the second register (leaving the return address behind) and swap the
    /// frame pointer with the first.
    fn jump_and_swap(&mut self, a: Register, b: Register) {
        let old_pc = self.pc;
        self.pc = self.reg(b);
        self.set_reg(b, old_pc.wrapping_add(1));
        let old_fp = self.reg(R_FP);
        let fp_value = self.reg(a);
        self.set_reg(R_FP, fp_value);
        self.set_reg(a, old_fp);
    }

    fn exec_debug(&mut self, op: &DebugOp, program: &Program) {
        match op {
            DebugOp::Print(s) => {
                print!("{}", s);
                let _ = std::io::stdout().flush();
            }
            DebugOp::Println(s) => println!("{}", s),
            DebugOp::PrintReg(r) => {
                println!("{} = {}", r, format_int(self.reg(*r), "xdsc"));
            }
            DebugOp::Eval(line) => {
                if let Err(err) = crate::debugger::eval::execute(self, program, line) {
                    eprintln!("Eval error: {}.", err);
                }
            }
            DebugOp::DumpState => self.dump_state(false),
        }
        self.pc += 1;
    }

    /// Store an ALU result and update the zero and sign flags.
    fn set_result(&mut self, dest: Register, result: u16) {
        self.set_zero_and_sign(result);
        self.set_reg(dest, result);
        self.pc += 1;
    }

    fn set_zero_and_sign(&mut self, value: u16) {
        self.flag_zero = value == 0;
        self.flag_sign = value & 0x8000 != 0;
    }

    fn set_flags_from_bits(&mut self, value: u16, with_carry_block: bool) {
        self.flag_sign = value & 1 != 0;
        self.flag_zero = value & 0b10 != 0;
        self.flag_overflow = value & 0b100 != 0;
        self.flag_carry = value & 0b1000 != 0;
        if with_carry_block {
            self.flag_carry_block = value & 0b10000 != 0;
        }
    }

    fn warning(&mut self, msg: String, loc: Option<&Location>) {
        self.warning_count += 1;
        let tag = "Warning".magenta().bold();
        match loc {
            Some(loc) => eprintln!("{}: {}, line {} of {}", tag, msg, loc.line, loc.file.path),
            None => eprintln!("{}: {}", tag, msg),
        }
    }

    /// Print a human-readable summary of the machine state to stderr.
    pub fn dump_state(&self, verbose: bool) {
        // Make sure all program output lands before the summary.
        let _ = std::io::stdout().flush();

        let last_register = if verbose {
            15
        } else {
            let mut last = 10;
            while last > 0 && self.reg[last] == 0 {
                last -= 1;
            }
            last
        };

        eprintln!("\nVirtual machine state after execution:");
        for i in 1..=last_register {
            let name = format!("R{}{}", i, if i < 10 { " " } else { "" });
            eprintln!("    {} = {}", name, format_int(self.reg[i], "xdsc"));
        }
        if last_register > 0 {
            eprintln!();
        } else {
            eprintln!("    R1 through R10 are all zero.\n");
        }

        let flags = [
            ("Carry-block", self.flag_carry_block),
            ("Carry", self.flag_carry),
            ("Overflow", self.flag_overflow),
            ("Zero", self.flag_zero),
            ("Sign", self.flag_sign),
        ];
        if !verbose && flags.iter().all(|(_, on)| *on) {
            eprintln!("    All flags are ON");
        } else if !verbose && flags.iter().all(|(_, on)| !*on) {
            eprintln!("    All flags are OFF");
        } else {
            for (name, on) in flags {
                eprintln!("    {} flag is {}", name, if on { "ON" } else { "OFF" });
            }
        }
    }
}

/// Format an integer in several representations joined by " = ". Each
/// character of `spec` selects one: `d` decimal, `x` hex, `o` octal, `b`
/// binary, `c` character (only when printable; force with `C`), `s` signed
/// (only when negative; force with `S`).
pub fn format_int(v: u16, spec: &str) -> String {
    let mut parts: Vec<String> = Vec::new();
    for c in spec.chars() {
        match c {
            'd' => parts.push(format!("{}", v)),
            'x' => parts.push(format!("0x{:04x}", v)),
            'o' => parts.push(format!("0o{:08o}", v)),
            'b' => parts.push(format!("0b{:016b}", v)),
            'c' => {
                if v < 128 && (v as u8 as char).is_ascii_graphic() || v == 32 {
                    parts.push(format!("{:?}", v as u8 as char));
                }
            }
            'C' => {
                if v < 128 {
                    parts.push(format!("{:?}", v as u8 as char));
                } else {
                    parts.push("not an ASCII character".to_string());
                }
            }
            's' => {
                if v & 0x8000 != 0 {
                    parts.push(format!("{}", from_u16(v)));
                }
            }
            'S' => {
                if v & 0x8000 != 0 {
                    parts.push(format!("{}", from_u16(v)));
                } else {
                    parts.push("not a signed integer".to_string());
                }
            }
            _ => (),
        }
    }
    parts.join(" = ")
}
