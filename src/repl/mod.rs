//! Interactive shell
//!
//! Reads statements with rustyline, keeping one interpreter alive for the
//! whole session. A line whose last non-blank character is `:` opens a
//! multi-line buffer read under a continuation prompt until a blank line.
//! A sole expression statement is evaluated and its non-void result
//! echoed; anything else executes as statements. Errors print and the
//! loop resumes with the session state intact.

use crate::error::report_error;
use crate::interp::Interpreter;
use crate::lexer::tokenize;
use crate::parser::parse;
use rustyline::error::ReadlineError;
use rustyline::{DefaultEditor, Result as RlResult};
use std::path::PathBuf;

const PROMPT: &str = "pith> ";
const CONTINUATION_PROMPT: &str = " ...> ";
const HISTORY_FILE: &str = ".pith_history";

/// REPL state
pub struct Repl {
    editor: DefaultEditor,
    interpreter: Interpreter,
    history_path: Option<PathBuf>,
}

impl Repl {
    /// Create a REPL with a fresh interpreter
    pub fn new() -> RlResult<Self> {
        Self::with_interpreter(Interpreter::new())
    }

    /// Create a REPL around an existing interpreter (the `-i` flag)
    pub fn with_interpreter(interpreter: Interpreter) -> RlResult<Self> {
        let editor = DefaultEditor::new()?;
        let history_path = home_dir().map(|home| home.join(HISTORY_FILE));

        let mut repl = Repl {
            editor,
            interpreter,
            history_path,
        };
        if let Some(ref path) = repl.history_path {
            let _ = repl.editor.load_history(path);
        }
        Ok(repl)
    }

    /// Run the read-eval-print loop until `exit` or EOF
    pub fn run(&mut self) -> RlResult<()> {
        println!("Pith REPL");
        println!("Type 'exit' to quit.");

        loop {
            let line = match self.editor.readline(PROMPT) {
                Ok(line) => line,
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                    continue;
                }
                Err(ReadlineError::Eof) => break,
                Err(err) => {
                    eprintln!("Error: {err}");
                    break;
                }
            };

            if line.trim() == "exit" {
                break;
            }
            if line.trim().is_empty() {
                continue;
            }
            let _ = self.editor.add_history_entry(line.trim_end());

            let mut buffer = line;
            buffer.push('\n');
            while line_is_incomplete(&buffer) {
                match self.editor.readline(CONTINUATION_PROMPT) {
                    Ok(more) => {
                        if more.trim().is_empty() {
                            break;
                        }
                        let _ = self.editor.add_history_entry(more.trim_end());
                        buffer.push_str(&more);
                        buffer.push('\n');
                    }
                    Err(_) => break,
                }
            }

            self.eval_input(&buffer);
        }

        if let Some(ref path) = self.history_path {
            let _ = self.editor.save_history(path);
        }
        println!("Exiting REPL.");
        Ok(())
    }

    /// Parse and run one buffered input
    fn eval_input(&mut self, source: &str) {
        let tokens = match tokenize(source) {
            Ok(tokens) => tokens,
            Err(err) => {
                report_error("<repl>", source, err.line(), err.message());
                return;
            }
        };
        let program = match parse(&tokens) {
            Ok(program) => program,
            Err(err) => {
                report_error("<repl>", source, err.line(), err.message());
                return;
            }
        };

        // a sole expression is echoed; statements just execute
        if program.children.len() == 1 && program.children[0].kind.is_expression() {
            match self.interpreter.eval_expr(&program.children[0]) {
                Ok(value) => {
                    if value != crate::interp::Value::Void {
                        println!("{}", self.interpreter.display_value(&value));
                    }
                }
                Err(err) => report_error("<repl>", source, err.line, &err.message),
            }
            return;
        }

        if let Err(err) = self.interpreter.interpret(&program) {
            report_error("<repl>", source, err.line, &err.message);
        }
    }
}

/// True when the buffer still needs lines: its last non-blank character
/// opens a block
fn line_is_incomplete(buffer: &str) -> bool {
    match buffer.trim_end().chars().last() {
        Some(':') => true,
        _ => false,
    }
}

fn home_dir() -> Option<PathBuf> {
    #[cfg(windows)]
    {
        std::env::var("USERPROFILE").ok().map(PathBuf::from)
    }
    #[cfg(not(windows))]
    {
        std::env::var("HOME").ok().map(PathBuf::from)
    }
}
