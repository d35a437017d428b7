use std::io::{IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use hera::debugger;
use hera::messages::install_report_handler;
use hera::parser::read_source;
use hera::settings::{parse_init_string, Mode, Settings, BIG_STACK_DATA_START};
use hera::span::SourceFile;
use hera::{assembler, check, Program, RunState};

/// An interpreter, debugger and assembler for the Haverford Educational
/// RISC Architecture.
#[derive(Parser)]
#[command(name = "hera", version, about)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// HERA file to run (shorthand for the `run` subcommand); `-` for stdin
    path: Option<PathBuf>,

    /// Print verbose output
    #[arg(long, global = true)]
    verbose: bool,

    /// Set output level to quiet
    #[arg(long, short, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Do not print colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Disallow debugging instructions
    #[arg(long, global = true)]
    no_debug_ops: bool,

    /// Do not warn about zero-prefixed octal literals
    #[arg(long, global = true)]
    warn_octal_off: bool,

    /// Do not warn about invalid RETURN addresses
    #[arg(long, global = true)]
    warn_return_off: bool,

    /// Reserve more space for the stack
    #[arg(long, global = true)]
    big_stack: bool,

    /// Exit with an error after N instructions have been executed
    #[arg(long, global = true, value_name = "N")]
    throttle: Option<u64>,

    /// Initialize registers before execution, e.g. --init="r1=5, r2=7"
    #[arg(long, global = true, value_name = "ASSIGNMENTS")]
    init: Option<String>,

    /// Print the credits for hera development
    #[arg(long)]
    credits: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Parse, check and execute a program (the default)
    Run { path: PathBuf },
    /// Debug a program interactively
    Debug { path: PathBuf },
    /// Print the program after labels, constants and pseudo-ops are resolved
    Preprocess { path: PathBuf },
    /// Assemble the program into a machine-code listing
    Assemble { path: PathBuf },
    /// Reconstruct HERA from a machine-code listing
    Disassemble { path: PathBuf },
}

const CREDITS: &str = "\
hera: a toolchain for the Haverford Educational RISC Architecture.

Based on the hera-py interpreter by Ian Fisher (HC '19).";

fn main() -> ExitCode {
    let args = Args::parse();

    if args.credits {
        println!("{}", CREDITS);
        return ExitCode::SUCCESS;
    }

    let (mode, path) = match (&args.command, &args.path) {
        (Some(Command::Run { path }), _) => (Mode::Run, path.clone()),
        (Some(Command::Debug { path }), _) => (Mode::Debug, path.clone()),
        (Some(Command::Preprocess { path }), _) => (Mode::Preprocess, path.clone()),
        (Some(Command::Assemble { path }), _) => (Mode::Assemble, path.clone()),
        (Some(Command::Disassemble { path }), _) => (Mode::Disassemble, path.clone()),
        (None, Some(path)) => (Mode::Run, path.clone()),
        (None, None) => {
            eprintln!("No file path supplied.");
            return ExitCode::from(2);
        }
    };

    let mut settings = Settings::new(mode);
    settings.color = !args.no_color && std::io::stderr().is_terminal();
    settings.volume = if args.verbose {
        hera::settings::Volume::Verbose
    } else if args.quiet {
        hera::settings::Volume::Quiet
    } else {
        hera::settings::Volume::Normal
    };
    settings.no_debug_ops = args.no_debug_ops;
    settings.warn_octal_on = !args.warn_octal_off;
    settings.warn_return_on = !args.warn_return_off;
    if args.big_stack {
        settings.data_start = BIG_STACK_DATA_START;
    }
    settings.throttle = args.throttle;
    if let Some(initstr) = &args.init {
        match parse_init_string(initstr) {
            Some(init) => settings.init = init,
            None => {
                eprintln!("Invalid syntax for --init argument.\n");
                eprintln!("Sample correct syntax: --init=\"r1=5, r2=7\"");
                return ExitCode::from(2);
            }
        }
    }

    colored::control::set_override(settings.color);
    install_report_handler(settings.color);

    match settings.mode {
        Mode::Run => main_execute(&path, &settings),
        Mode::Debug => main_debug(&path, &settings),
        Mode::Preprocess => main_preprocess(&path, &settings),
        Mode::Assemble => main_assemble(&path, &settings),
        Mode::Disassemble => main_disassemble(&path),
    }
}

/// Parse and check the program, printing all diagnostics. Returns the
/// program and the number of warnings, or `None` if there were errors.
fn load_program(path: &Path, settings: &Settings) -> Option<(Program, usize)> {
    let (ops, mut messages) = if path == Path::new("-") {
        let text = match read_stdin() {
            Ok(text) => text,
            Err(err) => {
                eprintln!("{}", err);
                return None;
            }
        };
        hera::parser::parse(SourceFile::new("<stdin>", text), settings)
    } else {
        hera::parser::parse_file(path, settings)
    };

    let (program, check_messages) = check(ops, settings);
    messages.extend(check_messages);
    let has_errors = messages.has_errors();
    let warnings = messages.warning_count();
    messages.print();
    (!has_errors).then_some((program, warnings))
}

fn read_stdin() -> Result<String, String> {
    let mut text = String::new();
    std::io::stdin()
        .read_to_string(&mut text)
        .map_err(|_| "could not read standard input".to_string())?;
    if !text.is_ascii() {
        return Err("non-ASCII byte in input".to_string());
    }
    Ok(text)
}

fn main_execute(path: &Path, settings: &Settings) -> ExitCode {
    let Some((program, warnings)) = load_program(path, settings) else {
        return ExitCode::FAILURE;
    };

    let mut vm = RunState::new(settings);
    vm.load_data(&program);
    let result = vm.run(&program, settings.throttle);

    if settings.volume != hera::settings::Volume::Quiet {
        vm.dump_state(settings.volume == hera::settings::Volume::Verbose);
        let total = warnings + vm.warning_count as usize;
        if total > 0 {
            eprintln!(
                "\n{} warning{} emitted.",
                total,
                if total == 1 { "" } else { "s" }
            );
        }
    }

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.location() {
                Some(loc) => eprintln!("Runtime error: {}, line {} of {}", err, loc.line, loc.file.path),
                None => eprintln!("Runtime error: {}", err),
            }
            ExitCode::from(3)
        }
    }
}

fn main_debug(path: &Path, settings: &Settings) -> ExitCode {
    let Some((program, _)) = load_program(path, settings) else {
        return ExitCode::FAILURE;
    };
    debugger::debug(program, settings.clone());
    ExitCode::SUCCESS
}

fn main_preprocess(path: &Path, settings: &Settings) -> ExitCode {
    let Some((program, _)) = load_program(path, settings) else {
        return ExitCode::FAILURE;
    };

    if !program.data.is_empty() {
        println!("[DATA]");
        for data_op in &program.data {
            println!("  {}", data_op);
        }
        if !program.code.is_empty() {
            println!("\n[CODE]");
        }
    }
    for (i, rop) in program.code.iter().enumerate() {
        println!("  {:0>4}  {}", i, rop.op);
    }
    ExitCode::SUCCESS
}

fn main_assemble(path: &Path, settings: &Settings) -> ExitCode {
    let Some((program, _)) = load_program(path, settings) else {
        return ExitCode::FAILURE;
    };
    print!("{}", assembler::code_listing(&program));
    ExitCode::SUCCESS
}

fn main_disassemble(path: &Path) -> ExitCode {
    let text = if path == Path::new("-") {
        match read_stdin() {
            Ok(text) => text,
            Err(err) => {
                eprintln!("{}", err);
                return ExitCode::FAILURE;
            }
        }
    } else {
        match read_source(path) {
            Ok(text) => text,
            Err(err) => {
                eprintln!("{}", err);
                return ExitCode::FAILURE;
            }
        }
    };
    print!("{}", assembler::disassemble_listing(&text));
    ExitCode::SUCCESS
}
