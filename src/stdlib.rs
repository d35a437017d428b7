//! Stub bodies for the Tiger runtime libraries.
//!
//! The real Tiger standard library ships with HERA-C; the toolchain only
//! needs the routines to exist as named entry points so that programs which
//! `#include` the library parse, check and link against sensible labels.
//! Each stub simply returns to its caller.

/// `#include <Tiger-stdlib-stack.hera>`: routines using the stack calling
/// convention.
pub const TIGER_STDLIB_STACK: &str = "\
LABEL(div) RETURN(FP_alt, PC_ret)
LABEL(mod) RETURN(FP_alt, PC_ret)
LABEL(not) RETURN(FP_alt, PC_ret)
LABEL(exit) HALT()
LABEL(flush) RETURN(FP_alt, PC_ret)
LABEL(getchar_ord) RETURN(FP_alt, PC_ret)
LABEL(getline) RETURN(FP_alt, PC_ret)
LABEL(malloc) RETURN(FP_alt, PC_ret)
LABEL(free) RETURN(FP_alt, PC_ret)
LABEL(putchar_ord) RETURN(FP_alt, PC_ret)
LABEL(print) RETURN(FP_alt, PC_ret)
LABEL(println) RETURN(FP_alt, PC_ret)
LABEL(printint) RETURN(FP_alt, PC_ret)
LABEL(printbool) RETURN(FP_alt, PC_ret)
LABEL(ord) RETURN(FP_alt, PC_ret)
LABEL(chr) RETURN(FP_alt, PC_ret)
LABEL(size) RETURN(FP_alt, PC_ret)
LABEL(substring) RETURN(FP_alt, PC_ret)
LABEL(concat) RETURN(FP_alt, PC_ret)
";

/// `#include <Tiger-stdlib-stack-data.hera>`: the data cells the stack
/// library expects.
pub const TIGER_STDLIB_STACK_DATA: &str = "\
DLABEL(tiger_stdlib_endl) LP_STRING(\"\\n\")
DLABEL(tiger_stdlib_true) LP_STRING(\"true\")
DLABEL(tiger_stdlib_false) LP_STRING(\"false\")
DLABEL(tiger_stdlib_printing_one_char_tmp) DSKIP(2)
";

/// `#include <Tiger-stdlib-reg.hera>`: the register-convention variants.
pub const TIGER_STDLIB_REG: &str = "\
LABEL(div) RETURN(FP_alt, PC_ret)
LABEL(mod) RETURN(FP_alt, PC_ret)
LABEL(not) RETURN(FP_alt, PC_ret)
LABEL(exit) HALT()
LABEL(flush) RETURN(FP_alt, PC_ret)
LABEL(getchar_ord) RETURN(FP_alt, PC_ret)
LABEL(putchar_ord) RETURN(FP_alt, PC_ret)
LABEL(print) RETURN(FP_alt, PC_ret)
LABEL(println) RETURN(FP_alt, PC_ret)
LABEL(printint) RETURN(FP_alt, PC_ret)
";

/// `#include <Tiger-stdlib-reg-data.hera>`.
pub const TIGER_STDLIB_REG_DATA: &str = "\
DLABEL(tiger_stdlib_endl) LP_STRING(\"\\n\")
DLABEL(tiger_stdlib_true) LP_STRING(\"true\")
DLABEL(tiger_stdlib_false) LP_STRING(\"false\")
";

/// Resolve an angle-bracketed include path to embedded library text.
pub fn lookup(name: &str) -> Option<&'static str> {
    match name {
        "Tiger-stdlib-stack.hera" => Some(TIGER_STDLIB_STACK),
        "Tiger-stdlib-stack-data.hera" => Some(TIGER_STDLIB_STACK_DATA),
        "Tiger-stdlib-reg.hera" => Some(TIGER_STDLIB_REG),
        "Tiger-stdlib-reg-data.hera" => Some(TIGER_STDLIB_REG_DATA),
        _ => None,
    }
}
