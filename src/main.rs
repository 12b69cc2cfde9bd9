use std::{env, fs, path::Path};

use simian::bytecode::disasm::print_bc;
use simian::bytecode::ir::Bytecode;
use simian::frontend::lexer::Lexer;
use simian::frontend::parser::parse_source;
use simian::frontend::token_dumper::TokenDumper;
use simian::repl;
use simian::session::{EvalError, Session};

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return;
    }

    let tokens_only = args.contains(&"--tokens".to_string());
    let no_color = args.contains(&"--no-color".to_string());
    let pretty = args.contains(&"--pretty".to_string());
    let ast = args.contains(&"--ast".to_string());
    let bytecode = args.contains(&"--bc".to_string()) || args.contains(&"--bytecode".to_string());
    let emit = flag_value(&args, "--emit");
    let load = flag_value(&args, "--load");

    if let Some(path) = load {
        run_snapshot(path);
        return;
    }

    // first non-flag argument that is not a flag's value is the filename
    let filename = args
        .iter()
        .enumerate()
        .skip(1)
        .find(|(i, a)| !a.starts_with('-') && !is_flag_value(&args, *i))
        .map(|(_, a)| a);

    match filename {
        Some(filename) => {
            ensure_extension(filename);
            match fs::read_to_string(filename) {
                Ok(source) => {
                    if tokens_only {
                        dump_tokens(&source, no_color, pretty);
                    } else if ast {
                        print_ast(&source);
                    } else {
                        run_program(&source, bytecode, emit);
                    }
                }
                Err(e) => {
                    eprintln!("Failed to read '{}': {}", filename, e);
                    std::process::exit(1);
                }
            }
        }
        None => {
            if args.len() == 1 || args.iter().any(|a| a == "--repl" || a == "-i") {
                if let Err(e) = repl::run() {
                    eprintln!("REPL error: {}", e);
                    std::process::exit(1);
                }
            } else {
                print_usage();
            }
        }
    }
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    let pos = args.iter().position(|a| a == flag)?;
    match args.get(pos + 1) {
        Some(value) => Some(value.as_str()),
        None => {
            eprintln!("Error: {} needs a file argument", flag);
            std::process::exit(1);
        }
    }
}

fn is_flag_value(args: &[String], index: usize) -> bool {
    index > 0 && matches!(args[index - 1].as_str(), "--emit" | "--load")
}

fn ensure_extension(filename: &str) {
    let path = Path::new(filename);
    if path.extension().and_then(|e| e.to_str()) != Some("mk") {
        eprintln!("Error: expected a .mk file, got {}", filename);
        std::process::exit(1);
    }
}

fn print_usage() {
    println!("SIMIAN - bytecode compiler and VM for a small dynamic language");
    println!();
    println!("Usage:");
    println!("  simian                              Start interactive REPL");
    println!("  simian <file.mk>                    Run a program, print its last value");
    println!("  simian --tokens [--no-color] [--pretty] <file.mk>");
    println!("                                      Show tokens only");
    println!("  simian --ast <file.mk>              Print the parsed program");
    println!("  simian --bc <file.mk>               Print disassembly, then run");
    println!("  simian --emit <out> <file.mk>       Compile and write a bytecode snapshot");
    println!("  simian --load <snapshot>            Run a bytecode snapshot");
    println!("  simian --help, -h                   Show this help");
}

fn dump_tokens(source: &str, no_color: bool, pretty: bool) {
    let mut lexer = Lexer::new(source);

    match lexer.tokenize() {
        Ok(tokens) => {
            let mut dumper = TokenDumper::new();

            if no_color {
                dumper = dumper.no_color();
            }
            if pretty {
                dumper = dumper.pretty();
            }

            dumper.dump(&tokens);
        }
        Err(e) => {
            eprintln!("Lexer error: {}", e);
            std::process::exit(1);
        }
    }
}

fn print_ast(source: &str) {
    match parse_source(source) {
        Ok(program) => print!("{}", program),
        Err(errors) => exit_with(EvalError::Parse(errors)),
    }
}

fn run_program(source: &str, show_bytecode: bool, emit: Option<&str>) {
    let mut session = Session::new();

    let bytecode = match session.compile(source) {
        Ok(bytecode) => bytecode,
        Err(e) => exit_with(e),
    };

    if show_bytecode {
        print_bc(&bytecode);
    }

    if let Some(out) = emit {
        let bytes = match bytecode.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                eprintln!("Failed to encode bytecode: {}", e);
                std::process::exit(1);
            }
        };
        if let Err(e) = fs::write(out, bytes) {
            eprintln!("Failed to write '{}': {}", out, e);
            std::process::exit(1);
        }
        log::info!("wrote bytecode snapshot to {}", out);
        return;
    }

    match session.run(bytecode) {
        Ok(value) => println!("{}", value),
        Err(e) => exit_with(e),
    }
}

fn run_snapshot(path: &str) {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Failed to read '{}': {}", path, e);
            std::process::exit(1);
        }
    };

    let bytecode = match Bytecode::from_bytes(&bytes) {
        Ok(bytecode) => bytecode,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    match Session::new().run(bytecode) {
        Ok(value) => println!("{}", value),
        Err(e) => exit_with(e),
    }
}

fn exit_with(e: EvalError) -> ! {
    eprintln!("{}", e);
    std::process::exit(1);
}
