//! Pith CLI

use clap::Parser;
use pith::interp::Interpreter;
use pith::lexer::tokenize;
use pith::parser::parse;
use pith::repl::Repl;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "pith", version, about = "Pith interpreter")]
struct Cli {
    /// Script file to execute; omit for interactive mode
    file: Option<PathBuf>,

    /// Enter interactive mode after running the script
    #[arg(short = 'i', long = "interactive")]
    interactive: bool,

    /// Tokenize and dump tokens (debug)
    #[arg(long)]
    tokens: bool,

    /// Parse and dump the AST as JSON (debug)
    #[arg(long)]
    ast: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let path = match cli.file {
        Some(path) => path,
        None => {
            if cli.interactive || cli.tokens || cli.ast {
                eprintln!("Usage: pith [-i] [--tokens] [--ast] <file>");
                return ExitCode::FAILURE;
            }
            return run_repl(Interpreter::new());
        }
    };

    let source = match std::fs::read_to_string(&path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("Could not read '{}': {err}", path.display());
            return ExitCode::FAILURE;
        }
    };
    let filename = path.display().to_string();

    let tokens = match tokenize(&source) {
        Ok(tokens) => tokens,
        Err(err) => {
            pith::error::report_error(&filename, &source, err.line(), err.message());
            return ExitCode::FAILURE;
        }
    };
    if cli.tokens {
        for token in &tokens {
            println!("{:?} @ line {}", token.kind, token.line);
        }
        return ExitCode::SUCCESS;
    }

    let program = match parse(&tokens) {
        Ok(program) => program,
        Err(err) => {
            pith::error::report_error(&filename, &source, err.line(), err.message());
            return ExitCode::FAILURE;
        }
    };
    if cli.ast {
        match serde_json::to_string_pretty(&program) {
            Ok(json) => println!("{json}"),
            Err(err) => {
                eprintln!("Error: {err}");
                return ExitCode::FAILURE;
            }
        }
        return ExitCode::SUCCESS;
    }

    let mut interpreter = Interpreter::new();
    if let Err(err) = interpreter.interpret(&program) {
        pith::error::report_error(&filename, &source, err.line, &err.message);
        return ExitCode::FAILURE;
    }

    if cli.interactive {
        return run_repl(interpreter);
    }
    ExitCode::SUCCESS
}

fn run_repl(interpreter: Interpreter) -> ExitCode {
    match Repl::with_interpreter(interpreter) {
        Ok(mut repl) => match repl.run() {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                eprintln!("Error: {err}");
                ExitCode::FAILURE
            }
        },
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}
