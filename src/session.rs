use std::mem;

use crate::bytecode::compile::Compiler;
use crate::bytecode::compile_error::CompileError;
use crate::bytecode::ir::{Bytecode, Constant};
use crate::bytecode::symbol_table::SymbolTable;
use crate::frontend::parser::parse_source;
use crate::frontend::parser_error::ParserError;
use crate::lang::value::Object;
use crate::runtime::runtime_error::RuntimeError;
use crate::runtime::vm_bc::{Vm, VmConfig};

/// Why one input failed. The session stays usable after any of them.
#[derive(Debug)]
pub enum EvalError {
    Parse(Vec<ParserError>),
    Compile(CompileError),
    Runtime(RuntimeError),
}

impl std::fmt::Display for EvalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvalError::Parse(errors) => {
                write!(f, "parser errors:")?;
                for e in errors {
                    write!(f, "\n\t{}", e)?;
                }
                Ok(())
            }
            EvalError::Compile(e) => write!(f, "{}", e),
            EvalError::Runtime(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for EvalError {}

impl From<Vec<ParserError>> for EvalError {
    fn from(errors: Vec<ParserError>) -> Self {
        EvalError::Parse(errors)
    }
}

impl From<CompileError> for EvalError {
    fn from(e: CompileError) -> Self {
        EvalError::Compile(e)
    }
}

impl From<RuntimeError> for EvalError {
    fn from(e: RuntimeError) -> Self {
        EvalError::Runtime(e)
    }
}

/// State that persists across inputs: the global symbol table, the constant
/// pool and the globals store. Each input gets a fresh compiler and VM that
/// borrow this state and hand it back.
pub struct Session {
    symbol_table: SymbolTable,
    constants: Vec<Constant>,
    globals: Vec<Object>,
    config: VmConfig,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    pub fn with_config(config: VmConfig) -> Self {
        Self {
            symbol_table: SymbolTable::with_builtins(),
            constants: Vec::new(),
            globals: Vec::new(),
            config,
        }
    }

    /// Parses, compiles and runs one input. Returns the value most recently
    /// popped off the stack. `let` pops its value too, so `let a = 1;`
    /// yields `1`, and an input that never pops yields `null`.
    pub fn eval(&mut self, source: &str) -> Result<Object, EvalError> {
        let bytecode = self.compile(source)?;
        self.run(bytecode)
    }

    /// Compiles one input against the session's bindings.
    ///
    /// Symbols and constants are only committed when compilation succeeds;
    /// a failed input leaves the session as it was.
    pub fn compile(&mut self, source: &str) -> Result<Bytecode, EvalError> {
        let program = parse_source(source)?;

        let mut compiler = Compiler::new_with_state(self.symbol_table.clone(), self.constants.clone());
        compiler.compile(&program)?;
        let bytecode = compiler.bytecode();

        let (symbol_table, constants) = compiler.into_state();
        self.symbol_table = symbol_table;
        self.constants = constants;

        log::debug!(
            "session compiled {} bytes, {} constants total",
            bytecode.instructions.len(),
            self.constants.len()
        );
        Ok(bytecode)
    }

    /// Runs bytecode against the session's globals. Globals written before a
    /// runtime error are kept.
    pub fn run(&mut self, bytecode: Bytecode) -> Result<Object, EvalError> {
        let globals = mem::take(&mut self.globals);
        let mut vm = Vm::with_state(bytecode, globals, self.config.clone());

        let result = vm.run();
        let value = vm.last_popped_stack_elem();
        self.globals = vm.into_globals();

        result?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_globals_persist_across_inputs() {
        let mut session = Session::new();
        session.eval("let a = 5;").unwrap();
        session.eval("let b = a * 2;").unwrap();
        assert_eq!(session.eval("a + b").unwrap(), Object::Integer(15));
    }

    #[test]
    fn test_functions_persist_across_inputs() {
        let mut session = Session::new();
        session
            .eval("let add = fn(a, b) { a + b };")
            .unwrap();
        assert_eq!(session.eval("add(2, 3)").unwrap(), Object::Integer(5));
    }

    #[test]
    fn test_let_yields_its_value() {
        let mut session = Session::new();
        assert_eq!(session.eval("let a = 1;").unwrap(), Object::Integer(1));
    }

    #[test]
    fn test_result_is_last_popped_value() {
        let mut session = Session::new();
        assert_eq!(session.eval("5; let b = 7;").unwrap(), Object::Integer(7));
        assert_eq!(session.eval("let c = 1; b").unwrap(), Object::Integer(7));
    }

    #[test]
    fn test_nothing_popped_yields_null() {
        let mut session = Session::new();
        assert_eq!(session.eval("").unwrap(), Object::Null);
    }

    #[test]
    fn test_parse_error_reports_all() {
        let mut session = Session::new();
        match session.eval("let = 1; let x 2;") {
            Err(EvalError::Parse(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected parse errors, got {:?}", other),
        }
    }

    #[test]
    fn test_failed_compile_rolls_back() {
        let mut session = Session::new();
        session.eval("let a = 1;").unwrap();

        let err = session.eval("let b = 2; let c = nope;").unwrap_err();
        assert!(matches!(err, EvalError::Compile(_)));

        // `b` was never committed, so it stays undefined and the next global
        // reuses its slot.
        assert!(matches!(session.eval("b"), Err(EvalError::Compile(_))));
        session.eval("let d = 4;").unwrap();
        assert_eq!(session.symbol_table.clone().resolve("d").map(|s| s.index), Some(1));
        assert_eq!(session.eval("a + d").unwrap(), Object::Integer(5));
    }

    #[test]
    fn test_runtime_error_keeps_session() {
        let mut session = Session::new();
        session.eval("let a = 10;").unwrap();

        let err = session.eval("let b = 1; a / 0").unwrap_err();
        assert!(err.to_string().contains("division by zero"));

        assert_eq!(session.eval("a + b").unwrap(), Object::Integer(11));
    }

    #[test]
    fn test_snapshot_runs_in_session() {
        let mut session = Session::new();
        let bytecode = session.compile("let x = 6; x * 7").unwrap();
        let bytes = bytecode.to_bytes().unwrap();

        let loaded = Bytecode::from_bytes(&bytes).unwrap();
        assert_eq!(Session::new().run(loaded).unwrap(), Object::Integer(42));
    }
}
