use std::fmt;
use std::str::FromStr;

use fxhash::FxHashMap;

/// One of the sixteen CPU registers.
///
/// `R0` is hard-wired to zero; writes to it are discarded by the virtual
/// machine. The named aliases (`Rt`, `FP`, `PC_ret`, `FP_alt`, `SP`) resolve
/// here, before any type checking happens.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Register(u8);

/// Scratch register clobbered by pseudo-op expansion.
pub const R_TEMP: Register = Register(11);
/// Frame pointer, swapped by CALL and RETURN.
pub const R_FP: Register = Register(12);
/// Conventional home of the return address.
pub const R_PC_RET: Register = Register(13);
/// Conventional first argument to CALL.
pub const R_FP_ALT: Register = Register(14);
/// Stack pointer.
pub const R_SP: Register = Register(15);

impl Register {
    pub const R0: Register = Register(0);

    pub fn new(index: u8) -> Option<Register> {
        (index < 16).then_some(Register(index))
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn bits(self) -> u16 {
        self.0 as u16
    }

    /// Build a register from the low four bits of an encoded word field.
    pub fn from_bits(bits: u16) -> Register {
        Register((bits & 0xF) as u8)
    }
}

impl FromStr for Register {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "rt" => return Ok(R_TEMP),
            "fp" => return Ok(R_FP),
            "pc_ret" => return Ok(R_PC_RET),
            "fp_alt" => return Ok(R_FP_ALT),
            "sp" => return Ok(R_SP),
            _ => (),
        }
        let rest = s.strip_prefix(['r', 'R']).ok_or(())?;
        if rest.is_empty() || !rest.bytes().all(|b| b.is_ascii_digit()) {
            return Err(());
        }
        let index: u8 = rest.parse().map_err(|_| ())?;
        Register::new(index).ok_or(())
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.0)
    }
}

/// Return true if the identifier names a register (case-insensitive).
///
/// Symbols are allowed to begin with a register prefix (e.g. `R1_INIT`), so
/// the whole string must match.
pub fn is_register(s: &str) -> bool {
    Register::from_str(s).is_ok()
}

/// A resolved symbol. Labels index into the resolved operation stream,
/// data labels are memory addresses, constants are plain values.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Symbol {
    Label(u16),
    Constant(i32),
    DataLabel(u16),
}

impl Symbol {
    pub fn value(self) -> i32 {
        match self {
            Symbol::Label(v) | Symbol::DataLabel(v) => v as i32,
            Symbol::Constant(v) => v,
        }
    }
}

/// Flat mapping from identifiers to symbols. Identifiers are case-sensitive
/// and may be defined at most once per program.
#[derive(Clone, Default, Debug)]
pub struct SymbolTable {
    map: FxHashMap<String, Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    pub fn get(&self, name: &str) -> Option<Symbol> {
        self.map.get(name).copied()
    }

    pub fn insert(&mut self, name: impl Into<String>, symbol: Symbol) {
        self.map.insert(name.into(), symbol);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Symbol)> {
        self.map.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Find a code label mapping to the given instruction number, if any.
    pub fn label_for(&self, index: u16) -> Option<&str> {
        self.map.iter().find_map(|(name, sym)| match sym {
            Symbol::Label(v) if *v == index => Some(name.as_str()),
            _ => None,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn register_aliases() {
        assert_eq!("R0".parse(), Ok(Register::R0));
        assert_eq!("r15".parse(), Ok(R_SP));
        assert_eq!("Rt".parse(), Ok(R_TEMP));
        assert_eq!("SP".parse(), Ok(R_SP));
        assert_eq!("PC_ret".parse(), Ok(R_PC_RET));
        assert_eq!("fp_alt".parse(), Ok(R_FP_ALT));
        assert_eq!("FP".parse(), Ok(R_FP));
    }

    #[test]
    fn register_rejections() {
        assert!(Register::from_str("R16").is_err());
        assert!(Register::from_str("R1_INIT").is_err());
        assert!(Register::from_str("PC").is_err());
        assert!(Register::from_str("").is_err());
        assert!(!is_register("R1_INIT"));
        assert!(is_register("r11"));
    }

    #[test]
    fn label_lookup() {
        let mut table = SymbolTable::new();
        table.insert("loop", Symbol::Label(4));
        table.insert("X", Symbol::DataLabel(0xC000));
        table.insert("N", Symbol::Constant(-7));
        assert_eq!(table.get("loop"), Some(Symbol::Label(4)));
        assert_eq!(table.label_for(4), Some("loop"));
        assert_eq!(table.label_for(5), None);
        assert_eq!(table.get("N").unwrap().value(), -7);
    }
}
