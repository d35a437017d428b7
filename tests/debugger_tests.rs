use assert_cmd::Command;
use predicates::str::contains;

fn debug_session(file: &str, commands: &str) -> assert_cmd::assert::Assert {
    Command::cargo_bin("hera")
        .expect("binary builds")
        .args(["debug", file])
        .write_stdin(commands.to_string())
        .assert()
}

#[test]
fn session_starts_and_quits() {
    debug_session("tests/files/add.hera", "quit\n")
        .success()
        .stdout(contains("HERA debugging session started"))
        .stdout(contains("->"));
}

#[test]
fn next_and_print() {
    debug_session(
        "tests/files/add.hera",
        "next\nnext\nnext\nprint :xd R3\nquit\n",
    )
    .success()
    .stdout(contains("0x0007 = 7"));
}

#[test]
fn empty_line_repeats_previous_command() {
    // Three SETs via one explicit `next` and two empty lines.
    debug_session("tests/files/add.hera", "next\n\n\nprint :xd R3\nquit\n")
        .success()
        .stdout(contains("0x0007 = 7"));
}

#[test]
fn continue_runs_to_completion() {
    debug_session("tests/files/add.hera", "continue\ninfo registers\nquit\n")
        .success()
        .stdout(contains("Program has finished executing."))
        .stdout(contains("R1 = 3, R2 = 4, R3 = 7"));
}

#[test]
fn breakpoints() {
    debug_session(
        "tests/files/branch.hera",
        "break skip\nbreak\ncontinue\nprint pc\nquit\n",
    )
    .success()
    .stdout(contains("Breakpoint set in file tests/files/branch.hera, line 5."))
    .stdout(contains("(skip)"));
}

#[test]
fn assign_and_undo() {
    debug_session(
        "tests/files/add.hera",
        "R1 = 99\nprint :xd R1\nundo\nprint :xd R1\nquit\n",
    )
    .success()
    .stdout(contains("0x0063 = 99"))
    .stdout(contains("Undid assign."))
    .stdout(contains("0x0000 = 0"));
}

#[test]
fn execute_snippet() {
    debug_session(
        "tests/files/add.hera",
        "execute SET(R5, 40) INC(R5, 2)\nprint :xd R5\nquit\n",
    )
    .success()
    .stdout(contains("0x002a = 42"));
}

#[test]
fn goto_skips_execution() {
    debug_session(
        "tests/files/branch.hera",
        "goto skip\nprint pc\nquit\n",
    )
    .success()
    .stdout(contains("[tests/files/branch.hera:5]"));
}

#[test]
fn info_flags_and_stack() {
    debug_session(
        "tests/files/add.hera",
        "info flags\ninfo stack\nquit\n",
    )
    .success()
    .stdout(contains("All flags are off."))
    .stdout(contains("The call stack is empty."));
}

#[test]
fn inline_assemble_and_disassemble() {
    debug_session(
        "tests/files/add.hera",
        "asm ADD(R3, R1, R2)\ndis 0xA312\nquit\n",
    )
    .success()
    .stdout(contains("A312"))
    .stdout(contains("ADD(R3, R1, R2)"));
}

#[test]
fn doc_command() {
    debug_session("tests/files/add.hera", "doc ASR\ndoc branch\nquit\n")
        .success()
        .stdout(contains("Arithmetic right shift"))
        .stdout(contains("two kinds of branching instructions"));
}

#[test]
fn restart_resets_state() {
    debug_session(
        "tests/files/add.hera",
        "continue\nrestart\nprint :xd R3\nquit\n",
    )
    .success()
    .stdout(contains("0x0000 = 0"));
}

#[test]
fn list_shows_source_context() {
    debug_session("tests/files/add.hera", "list\nquit\n")
        .success()
        .stdout(contains("SET(R1, 3)"));
}

#[test]
fn unknown_command_is_reported() {
    debug_session("tests/files/add.hera", "frobnicate\nquit\n")
        .success()
        .stdout(contains("frobnicate is not a recognized command."));
}

#[test]
fn step_requires_call() {
    debug_session("tests/files/add.hera", "step\nquit\n")
        .success()
        .stdout(contains("step is only valid when the current instruction is CALL."));
}

#[test]
fn runtime_error_returns_to_prompt() {
    debug_session(
        "tests/files/add.hera",
        "R15 = 0xD000\nnext\nprint :xd R1\nquit\n",
    )
    .success()
    .stdout(contains("Runtime error: stack overflow"))
    // The session is still alive after the error.
    .stdout(contains("0x0003 = 3"));
}
