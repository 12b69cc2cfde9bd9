// Interactive Read-Eval-Print Loop with rustyline
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use crate::session::{EvalError, Session};

const PROMPT: &str = ">> ";
const HISTORY_FILE: &str = ".simian_history";

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("simian {}", env!("CARGO_PKG_VERSION"));
    println!("Type exit or Ctrl+D to quit");
    println!();

    let mut session = Session::new();
    let mut rl = DefaultEditor::new()?;

    // Load history if it exists
    let _ = rl.load_history(HISTORY_FILE);

    loop {
        match rl.readline(PROMPT) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line == "exit" {
                    break;
                }

                rl.add_history_entry(line)?;

                match session.eval(line) {
                    Ok(value) => println!("{}", value),
                    Err(EvalError::Parse(errors)) => {
                        eprintln!("parser errors:");
                        for e in errors {
                            eprintln!("\t{}", e);
                        }
                    }
                    Err(e) => eprintln!("{}", e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        }
    }

    if let Err(e) = rl.save_history(HISTORY_FILE) {
        log::warn!("could not save history: {}", e);
    }

    Ok(())
}
