use assert_cmd::Command;
use predicates::prelude::PredicateBooleanExt;
use predicates::str::contains;

fn hera() -> Command {
    Command::cargo_bin("hera").expect("binary builds")
}

#[test]
fn runs_arithmetic_smoke() {
    hera()
        .arg("tests/files/add.hera")
        .assert()
        .success()
        .stderr(contains("R3  = 0x0007 = 7"))
        .stderr(contains("All flags are OFF"));
}

#[test]
fn run_subcommand_is_the_default() {
    hera()
        .args(["run", "tests/files/add.hera"])
        .assert()
        .success()
        .stderr(contains("R3  = 0x0007 = 7"));
}

#[test]
fn branch_skips_instruction() {
    hera()
        .arg("tests/files/branch.hera")
        .assert()
        .success()
        .stderr(contains("R1 through R10 are all zero."));
}

#[test]
fn data_segment_load() {
    hera()
        .arg("tests/files/data.hera")
        .assert()
        .success()
        .stderr(contains("R1  = 0xc000"))
        .stderr(contains("R2  = 0x002a = 42"));
}

#[test]
fn include_resolves_relative_to_file() {
    hera()
        .arg("tests/files/include_main.hera")
        .assert()
        .success()
        .stderr(contains("R1  = 0x000f = 15"));
}

#[test]
fn debug_ops_print() {
    hera()
        .arg("tests/files/hello.hera")
        .assert()
        .success()
        .stdout(contains("Hello, world!"))
        .stdout(contains("R1 = 0x0007 = 7"));
}

#[test]
fn quiet_suppresses_dump() {
    hera()
        .args(["--quiet", "tests/files/add.hera"])
        .assert()
        .success()
        .stderr(contains("Virtual machine state").not());
}

#[test]
fn init_flag_seeds_registers() {
    hera()
        .args(["--init=r1=20,r2=22", "-"])
        .write_stdin("ADD(R3, R1, R2)\nHALT()")
        .assert()
        .success()
        .stderr(contains("R3  = 0x002a = 42"));
}

#[test]
fn data_after_code_is_rejected() {
    hera()
        .arg("tests/files/data_after_code.hera")
        .assert()
        .code(1)
        .stderr(contains("data statement after code"));
}

#[test]
fn missing_file_is_an_error() {
    hera()
        .arg("tests/files/no_such_file.hera")
        .assert()
        .code(1)
        .stderr(contains("does not exist"));
}

#[test]
fn usage_error_without_path() {
    hera().assert().code(2).stderr(contains("No file path supplied."));
}

#[test]
fn throttle_exits_with_runtime_error() {
    hera()
        .args(["--throttle", "1000", "tests/files/loop.hera"])
        .assert()
        .code(3)
        .stderr(contains("throttled after 1000 instructions"));
}

#[test]
fn octal_warning_fires_once_and_can_be_disabled() {
    hera()
        .arg("-")
        .write_stdin("SET(R1, 017)\nSET(R2, 017)\nHALT()")
        .assert()
        .success()
        .stderr(contains("1 warning emitted."));

    hera()
        .args(["--warn-octal-off", "-"])
        .write_stdin("SET(R1, 017)\nHALT()")
        .assert()
        .success()
        .stderr(contains("warning").not());
}

#[test]
fn assemble_produces_uppercase_hex_listing() {
    hera()
        .args(["assemble", "-"])
        .write_stdin("SET(R1, 10)\nHALT()")
        .assert()
        .success()
        .stdout("E10A\nF100\n0100\n");
}

#[test]
fn assemble_elides_debug_ops() {
    hera()
        .args(["assemble", "-"])
        .write_stdin("print_reg(R1)\nNOP()")
        .assert()
        .success()
        .stdout("0101\n");
}

#[test]
fn disassemble_round_trips() {
    hera()
        .args(["disassemble", "-"])
        .write_stdin("E10A\nF100\nA312\n0100\n")
        .assert()
        .success()
        .stdout("SETLO(R1, 10)\nSETHI(R1, 0)\nADD(R3, R1, R2)\nHALT()\n");
}

#[test]
fn disassemble_unknown_words() {
    hera()
        .args(["disassemble", "-"])
        .write_stdin("0102\nnothex\n")
        .assert()
        .success()
        .stdout(contains("OPCODE(0x0102)"))
        .stdout(contains("// Invalid hex literal: nothex"));
}

#[test]
fn preprocess_expands_pseudo_ops() {
    hera()
        .args(["preprocess", "-"])
        .write_stdin("DLABEL(X)\nINTEGER(42)\nSET(R1, X)\nHALT()")
        .assert()
        .success()
        .stdout(contains("[DATA]"))
        .stdout(contains("INTEGER(42)"))
        .stdout(contains("[CODE]"))
        .stdout(contains("0000  SETLO(R1, 0)"))
        .stdout(contains("0001  SETHI(R1, 192)"))
        .stdout(contains("0002  HALT()"));
}

#[test]
fn swi_rejected_outside_assembly() {
    hera()
        .arg("-")
        .write_stdin("SWI(1)")
        .assert()
        .code(1)
        .stderr(contains("SWI is not supported in this mode"));

    hera()
        .args(["assemble", "-"])
        .write_stdin("SWI(1)")
        .assert()
        .success()
        .stdout("2201\n");
}

#[test]
fn credits_flag() {
    hera().arg("--credits").assert().success().stdout(contains("hera"));
}
