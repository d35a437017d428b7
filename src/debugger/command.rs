//! Debugger command names, abbreviation expansion, and help text.

/// Commands that may be abbreviated with any unique-enough prefix. Order
/// determines precedence when several share a prefix (`c` is `continue`).
const CAN_BE_ABBREVIATED: &[&str] = &[
    "assign", "break", "continue", "clear", "execute", "goto", "help", "info", "list", "next",
    "print", "quit", "step", "undo",
];

/// Commands that must be spelled out in full, either because they are
/// destructive (`restart`) or too short to abbreviate further.
const CANNOT_BE_ABBREVIATED: &[&str] = &["asm", "dis", "doc", "ll", "off", "on", "restart"];

/// Commands whose argument is the raw remainder of the line rather than a
/// whitespace-separated list.
pub fn takes_argstr(command: &str) -> bool {
    matches!(command, "asm" | "execute" | "print")
}

/// Expand an abbreviated command name into its full name. Returns `None`
/// if the abbreviation is not recognized.
pub fn expand(cmd: &str) -> Option<&'static str> {
    let cmd = cmd.to_lowercase();
    for full in CAN_BE_ABBREVIATED {
        if full.starts_with(&cmd) {
            return Some(full);
        }
    }
    for full in CANNOT_BE_ABBREVIATED {
        if *full == cmd {
            return Some(full);
        }
    }
    None
}

/// Detailed help for a single command, shown by `help <cmd>`.
pub fn help_for(command: &str) -> &'static str {
    match command {
        "asm" => "asm <op>\n  Assemble the HERA operation into machine code.",
        "assign" => "assign <x> <y>\n  Assign the value of y to x. x may be a register, a memory \
                     location, or the program counter. y may additionally be a symbol or an \
                     integer.\n\n<x> = <y>\n  Alias for \"assign <x> <y>\", with the advantage \
                     that <x> and <y> may contain spaces.\n\n  Examples:\n    Assign to a \
                     register:          R1 = 42\n    Assign to a memory location:   @1000 = R4\n\
                     \x20   Assign a label to a register:  R1 = some_label\n    Arithmetic:      \
                     \x20             R7 = R5 * 10",
        "break" => "break\n  Print all current breakpoints.\n\nbreak <n>\n  Set a breakpoint at \
                    the given line number in the file that the debugger was opened on.\n\nbreak \
                    <path>:<n>\n  Set a breakpoint at the given line number in the given file.\n\n\
                    break <label>\n  Set a breakpoint at the given label.\n\nbreak .\n  Set a \
                    breakpoint at the current instruction.",
        "clear" => "clear <loc>\n  Clear a breakpoint at the given location. Location formats \
                    accepted are the same as the break command.\n\nclear *\n  Clear all \
                    breakpoints.",
        "continue" => "continue\n  Execute the program until a breakpoint is encountered or the \
                       program terminates.",
        "dis" => "dis <n>...\n  Interpret each 16-bit integer as a HERA machine instruction and \
                  disassemble it into its assembly-language mnemonic.\n\ndis\n  If the current \
                  instruction is an OPCODE, disassemble its contents.",
        "doc" => "doc <opname>...\n  For each operation, print a message detailing its use and \
                  behavior.\n\ndoc\n  Same as above, for the current operation.",
        "execute" => "execute <op>\n  Execute a HERA operation. The operation must not be a data \
                      statement or a branch. The operation may affect registers and memory.\n\n  \
                      Examples:\n    execute ASR(R5, R4)\n    execute SET(R1, 20)  SET(R2, 22)  \
                      ADD(R3, R2, R1)",
        "goto" => "goto <loc>\n  Jump to the given location (a line number or a label) without \
                   executing any of the intermediate instructions.",
        "help" => "help\n  Print a summary of all debugging commands.\n\nhelp <cmd>...\n  Print \
                   a detailed help message for each command.",
        "info" => "info <arg>...\n  Print information about the current state of the program. \
                   Valid arguments are \"registers\", \"flags\", \"stack\", \"symbols\" and \
                   \"memory\"; arguments may be abbreviated with a unique prefix. Defaults to \
                   \"registers\", \"flags\" and \"stack\".",
        "list" => "list\n  Print the current line of source and the three previous and next \
                   lines.\n\nlist <n>\n  Print the current line of source and the n previous \
                   and next lines.",
        "ll" => "ll\n  Print every line of the current file's source code.",
        "next" => "next\n  Execute the current line. If the current line is a CALL instruction, \
                   the entire function call is executed. Use `step` to enter the function \
                   instead.\n\nnext <n>\n  Execute the next n lines. This command follows \
                   branches, so be careful!",
        "off" => "off <f1> <f2>...\n  Turn off the given machine flags. Flags may be given in \
                  long form (carry-block, carry, overflow, sign, zero) or short form (cb, c, v, \
                  s, z).",
        "on" => "on <f1> <f2>...\n  Turn on the given machine flags. Flags may be given in long \
                 form (carry-block, carry, overflow, sign, zero) or short form (cb, c, v, s, z).",
        "print" => "print <x>, <y>, <z>...\n  Print the values of all the supplied arguments. \
                    The first argument may optionally be a format specifier, e.g. \":xds\". The \
                    following formats are recognized: d for decimal, x for hexadecimal, o for \
                    octal, b for binary, c for character literals, s for signed integers, and l \
                    for source code locations.\n\n  Examples:\n    A register:        print R7\n\
                    \x20   A memory location: print @1000\n    A symbol:          print \
                    some_label\n    Multiple values:   print R1, R2, R3\n    Formatted:         \
                    print :bl PC_ret\n    Arithmetic:        print @(@(FP+1)) * 7",
        "restart" => "restart\n  Restart execution of the program from the beginning. All \
                      registers and memory cells are reset.",
        "step" => "step\n  Step into the execution of a function. Only valid when the current \
                   instruction is CALL.",
        "undo" => "undo\n  Undo the last operation that changed the state of the debugger.",
        "quit" => "quit\n  Exit the debugger.",
        _ => "",
    }
}

pub const HELP: &str = "\
Available commands:
    asm <op>        Show the binary machine code that the HERA operation
                    assembles to.

    assign <x> <y>  Assign the value of y to x.

    break <loc>     Set a breakpoint at the given location. When no arguments
                    are given, all current breakpoints are printed.

    clear <loc>     Clear a breakpoint at the given location.

    continue        Execute the program until a breakpoint is encountered or
                    the program terminates.

    dis <n>         Disassemble the 16-bit integer into a HERA operation.

    doc <op>        Print documentation for a HERA operation.

    execute <op>    Execute a HERA operation.

    goto <loc>      Jump to the given location.

    help            Print this help message.

    info            Print information about the current state of the program.

    list <n>        Print the current line of source code and the n previous
                    and next lines. If not provided, n defaults to 3.

    ll              Print the entire program.

    next            Execute the current line.

    off <flag>      Turn the given machine flag off.

    on <flag>       Turn the given machine flag on.

    print <x>       Print the value of x.

    restart         Restart the execution of the program from the beginning.

    step            Step into the execution of a function.

    undo            Undo the last operation.

    quit            Exit the debugger.

    <x> = <y>       Alias for \"assign <x> <y>\".

An empty line repeats the previous command. Command names can generally be
abbreviated with a unique prefix, e.g. \"n\" for \"next\".";

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn abbreviations() {
        assert_eq!(expand("n"), Some("next"));
        assert_eq!(expand("c"), Some("continue"));
        assert_eq!(expand("cl"), Some("clear"));
        assert_eq!(expand("b"), Some("break"));
        assert_eq!(expand("CONT"), Some("continue"));
        assert_eq!(expand("restart"), Some("restart"));
        // Destructive commands may not be abbreviated.
        assert_eq!(expand("rest"), None);
        assert_eq!(expand("bogus"), None);
    }

    #[test]
    fn argstr_commands() {
        assert!(takes_argstr("print"));
        assert!(takes_argstr("execute"));
        assert!(takes_argstr("asm"));
        assert!(!takes_argstr("break"));
    }

    #[test]
    fn every_command_has_help() {
        for cmd in CAN_BE_ABBREVIATED.iter().chain(CANNOT_BE_ABBREVIATED) {
            assert!(!help_for(cmd).is_empty(), "{} has no help", cmd);
        }
    }
}
