use std::mem;
use std::rc::Rc;

use crate::{
    bytecode::{
        compile_error::CompileError,
        ir::{Bytecode, CompiledFunction, Constant},
        op::{Instructions, Opcode, make},
        symbol_table::{Symbol, SymbolScope, SymbolTable},
    },
    lang::{
        node::{Block, Expression, InfixOperator, PrefixOperator, Statement},
        program::Program,
    },
};

/// Placeholder for jump operands that get back-patched.
const JUMP_PLACEHOLDER: usize = 9999;

#[derive(Debug, Clone, Copy)]
struct EmittedInstruction {
    opcode: Opcode,
    position: usize,
}

/// Instructions of one function body (or of the main program) while it is
/// being compiled.
#[derive(Debug, Default)]
struct CompilationScope {
    instructions: Instructions,
    last: Option<EmittedInstruction>,
    previous: Option<EmittedInstruction>,
}

pub struct Compiler {
    /// Shared constant pool; append-only
    constants: Vec<Constant>,

    /// Innermost symbol table; owns its enclosing tables
    symbol_table: SymbolTable,

    /// One entry per function literal being compiled, main program at the bottom
    scopes: Vec<CompilationScope>,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    /// Fresh compiler with the builtins bound.
    pub fn new() -> Self {
        Self::new_with_state(SymbolTable::with_builtins(), Vec::new())
    }

    /// Continues from a previous compilation, so globals and constants keep
    /// their indices across inputs.
    pub fn new_with_state(symbol_table: SymbolTable, constants: Vec<Constant>) -> Self {
        Self {
            constants,
            symbol_table,
            scopes: vec![CompilationScope::default()],
        }
    }

    /// Hands back the global symbol table and the constant pool.
    pub fn into_state(self) -> (SymbolTable, Vec<Constant>) {
        (self.symbol_table, self.constants)
    }

    pub fn compile(&mut self, program: &Program) -> Result<(), CompileError> {
        for stmt in &program.statements {
            self.compile_statement(stmt)?;
        }
        Ok(())
    }

    /// Main-program instructions plus a snapshot of the constant pool.
    pub fn bytecode(&self) -> Bytecode {
        Bytecode {
            instructions: self.current().instructions.clone(),
            constants: self.constants.clone(),
        }
    }

    // =========================================================================
    // STATEMENTS
    // =========================================================================

    fn compile_statement(&mut self, stmt: &Statement) -> Result<(), CompileError> {
        match stmt {
            Statement::Expression(expr) => {
                self.compile_expression(expr)?;
                self.emit(Opcode::Pop, &[])?;
            }

            Statement::Let { name, value } => {
                self.compile_expression(value)?;
                let symbol = self.symbol_table.define(name);
                match symbol.scope {
                    SymbolScope::Global => self.emit(Opcode::SetGlobal, &[symbol.index])?,
                    _ => self.emit(Opcode::SetLocal, &[symbol.index])?,
                };
            }

            Statement::Return(value) => {
                if self.scopes.len() == 1 {
                    return Err(CompileError::return_outside_function());
                }
                self.compile_expression(value)?;
                self.emit(Opcode::ReturnValue, &[])?;
            }
        }
        Ok(())
    }

    fn compile_block(&mut self, block: &Block) -> Result<(), CompileError> {
        for stmt in &block.statements {
            self.compile_statement(stmt)?;
        }
        Ok(())
    }

    // =========================================================================
    // EXPRESSIONS
    // =========================================================================

    fn compile_expression(&mut self, expr: &Expression) -> Result<(), CompileError> {
        match expr {
            Expression::Integer(n) => {
                let index = self.add_constant(Constant::Integer(*n));
                self.emit(Opcode::Constant, &[index])?;
            }

            Expression::String(s) => {
                let index = self.add_constant(Constant::String(Rc::from(s.as_str())));
                self.emit(Opcode::Constant, &[index])?;
            }

            Expression::Boolean(true) => {
                self.emit(Opcode::True, &[])?;
            }
            Expression::Boolean(false) => {
                self.emit(Opcode::False, &[])?;
            }

            Expression::Identifier(name) => {
                let symbol = self
                    .symbol_table
                    .resolve(name)
                    .ok_or_else(|| CompileError::unresolved(name))?;
                self.load_symbol(&symbol)?;
            }

            Expression::Prefix { operator, right } => {
                self.compile_expression(right)?;
                match operator {
                    PrefixOperator::Bang => self.emit(Opcode::Bang, &[])?,
                    PrefixOperator::Minus => self.emit(Opcode::Minus, &[])?,
                };
            }

            Expression::Infix {
                operator,
                left,
                right,
            } => self.compile_infix(*operator, left, right)?,

            Expression::If {
                condition,
                consequence,
                alternative,
            } => self.compile_if(condition, consequence, alternative.as_ref())?,

            Expression::Array(elements) => {
                for element in elements {
                    self.compile_expression(element)?;
                }
                self.emit(Opcode::Array, &[elements.len()])?;
            }

            Expression::Hash(pairs) => {
                // Sorted by source text so the emitted order does not depend
                // on how the literal was written. The sort is stable, so
                // repeated keys with the same text keep source order and the
                // last one wins at runtime. Keys that are equal only after
                // evaluation (`1` and `1 + 0`) win in text order instead.
                let mut sorted: Vec<&(Expression, Expression)> = pairs.iter().collect();
                sorted.sort_by_cached_key(|(key, _)| key.to_string());

                for (key, value) in sorted {
                    self.compile_expression(key)?;
                    self.compile_expression(value)?;
                }
                self.emit(Opcode::Hash, &[pairs.len() * 2])?;
            }

            Expression::Index { left, index } => {
                self.compile_expression(left)?;
                self.compile_expression(index)?;
                self.emit(Opcode::Index, &[])?;
            }

            Expression::Function {
                parameters,
                body,
                name,
            } => self.compile_function(parameters, body, name.as_deref())?,

            Expression::Call {
                function,
                arguments,
            } => {
                self.compile_expression(function)?;
                for arg in arguments {
                    self.compile_expression(arg)?;
                }
                self.emit(Opcode::Call, &[arguments.len()])?;
            }
        }
        Ok(())
    }

    fn compile_infix(
        &mut self,
        operator: InfixOperator,
        left: &Expression,
        right: &Expression,
    ) -> Result<(), CompileError> {
        let opcode = match operator {
            InfixOperator::Plus => Opcode::Add,
            InfixOperator::Minus => Opcode::Sub,
            InfixOperator::Star => Opcode::Mul,
            InfixOperator::Slash => Opcode::Div,
            InfixOperator::Gt => Opcode::GreaterThan,
            InfixOperator::Eq => Opcode::Equal,
            InfixOperator::NotEq => Opcode::NotEqual,
            InfixOperator::Lt => {
                // a < b  is  b > a
                self.compile_expression(right)?;
                self.compile_expression(left)?;
                self.emit(Opcode::GreaterThan, &[])?;
                return Ok(());
            }
            InfixOperator::LtEq | InfixOperator::GtEq => {
                return Err(CompileError::unknown_operator(operator));
            }
        };

        self.compile_expression(left)?;
        self.compile_expression(right)?;
        self.emit(opcode, &[])?;
        Ok(())
    }

    /// Layout:
    ///
    /// ```text
    ///     <condition>
    ///     JumpNotTruthy  else
    ///     <consequence>
    ///     Jump           end
    /// else:
    ///     <alternative, or Null>
    /// end:
    /// ```
    ///
    /// Each branch leaves exactly one value.
    fn compile_if(
        &mut self,
        condition: &Expression,
        consequence: &Block,
        alternative: Option<&Block>,
    ) -> Result<(), CompileError> {
        self.compile_expression(condition)?;
        let jump_not_truthy = self.emit(Opcode::JumpNotTruthy, &[JUMP_PLACEHOLDER])?;

        self.compile_branch(consequence)?;
        let jump = self.emit(Opcode::Jump, &[JUMP_PLACEHOLDER])?;

        let else_target = self.current().instructions.len();
        self.change_operand(jump_not_truthy, else_target)?;

        match alternative {
            Some(block) => self.compile_branch(block)?,
            None => {
                self.emit(Opcode::Null, &[])?;
            }
        }

        let end_target = self.current().instructions.len();
        self.change_operand(jump, end_target)?;
        Ok(())
    }

    /// A branch body whose value stays on the stack.
    fn compile_branch(&mut self, block: &Block) -> Result<(), CompileError> {
        self.compile_block(block)?;
        if self.last_instruction_is(Opcode::Pop) {
            self.remove_last_pop();
        } else {
            self.emit(Opcode::Null, &[])?;
        }
        Ok(())
    }

    fn compile_function(
        &mut self,
        parameters: &[String],
        body: &Block,
        name: Option<&str>,
    ) -> Result<(), CompileError> {
        if parameters.len() > u8::MAX as usize {
            return Err(CompileError::out_of_range(
                "parameters",
                parameters.len(),
                u8::MAX as usize,
            ));
        }

        self.enter_scope();
        if let Some(name) = name {
            self.symbol_table.define_function_name(name);
        }
        for param in parameters {
            self.symbol_table.define(param);
        }

        // Leave the scope even when the body fails, so the compiler is back
        // at its definer's scope either way.
        let compiled = self.compile_function_body(body);
        let free_symbols = self.symbol_table.free_symbols().to_vec();
        let num_locals = self.symbol_table.num_definitions();
        let instructions = self.leave_scope()?;
        compiled?;

        log::debug!(
            "compiled fn {}: {} bytes, {} params, {} locals, {} free",
            name.unwrap_or("<anonymous>"),
            instructions.len(),
            parameters.len(),
            num_locals,
            free_symbols.len()
        );

        // Captured values are loaded in the definer's scope, in capture order.
        for symbol in &free_symbols {
            self.load_symbol(symbol)?;
        }

        let func = CompiledFunction {
            instructions,
            num_locals,
            num_parameters: parameters.len(),
        };
        let index = self.add_constant(Constant::Function(Rc::new(func)));
        self.emit(Opcode::Closure, &[index, free_symbols.len()])?;
        Ok(())
    }

    fn compile_function_body(&mut self, body: &Block) -> Result<(), CompileError> {
        self.compile_block(body)?;

        if self.last_instruction_is(Opcode::Pop) {
            self.replace_last_pop_with_return();
        }
        if !self.last_instruction_is(Opcode::ReturnValue) {
            self.emit(Opcode::Return, &[])?;
        }
        Ok(())
    }

    fn load_symbol(&mut self, symbol: &Symbol) -> Result<(), CompileError> {
        match symbol.scope {
            SymbolScope::Global => self.emit(Opcode::GetGlobal, &[symbol.index])?,
            SymbolScope::Local => self.emit(Opcode::GetLocal, &[symbol.index])?,
            SymbolScope::Builtin => self.emit(Opcode::GetBuiltin, &[symbol.index])?,
            SymbolScope::Free => self.emit(Opcode::GetFree, &[symbol.index])?,
            SymbolScope::Function => self.emit(Opcode::CurrentClosure, &[])?,
        };
        Ok(())
    }

    // =========================================================================
    // EMISSION
    // =========================================================================

    fn current(&self) -> &CompilationScope {
        // The main scope is pushed in the constructor and never popped.
        &self.scopes[self.scopes.len() - 1]
    }

    fn current_mut(&mut self) -> &mut CompilationScope {
        let last = self.scopes.len() - 1;
        &mut self.scopes[last]
    }

    fn add_constant(&mut self, constant: Constant) -> usize {
        self.constants.push(constant);
        self.constants.len() - 1
    }

    /// Appends an instruction and returns its offset.
    fn emit(&mut self, opcode: Opcode, operands: &[usize]) -> Result<usize, CompileError> {
        check_operands(opcode, operands)?;
        let instruction = make(opcode, operands);

        let scope = self.current_mut();
        let position = scope.instructions.push(&instruction);
        scope.previous = scope.last;
        scope.last = Some(EmittedInstruction { opcode, position });
        Ok(position)
    }

    /// Rewrites the operand of the single-operand instruction at `position`.
    fn change_operand(&mut self, position: usize, operand: usize) -> Result<(), CompileError> {
        let byte = self
            .current()
            .instructions
            .as_bytes()
            .get(position)
            .copied()
            .ok_or_else(|| CompileError::internal(format!("no instruction at {}", position)))?;
        let opcode = Opcode::try_from(byte)
            .map_err(|b| CompileError::internal(format!("unknown opcode {} at {}", b, position)))?;

        check_operands(opcode, &[operand])?;
        let instruction = make(opcode, &[operand]);
        self.current_mut().instructions.replace(position, &instruction);
        Ok(())
    }

    fn last_instruction_is(&self, opcode: Opcode) -> bool {
        matches!(self.current().last, Some(last) if last.opcode == opcode)
    }

    fn remove_last_pop(&mut self) {
        let scope = self.current_mut();
        if let Some(last) = scope.last {
            scope.instructions.truncate(last.position);
            scope.last = scope.previous;
        }
    }

    fn replace_last_pop_with_return(&mut self) {
        let scope = self.current_mut();
        if let Some(last) = scope.last.as_mut() {
            scope
                .instructions
                .replace(last.position, &make(Opcode::ReturnValue, &[]));
            last.opcode = Opcode::ReturnValue;
        }
    }

    fn enter_scope(&mut self) {
        self.scopes.push(CompilationScope::default());
        let outer = mem::take(&mut self.symbol_table);
        self.symbol_table = SymbolTable::new_enclosed(outer);
    }

    fn leave_scope(&mut self) -> Result<Instructions, CompileError> {
        if self.scopes.len() == 1 {
            return Err(CompileError::internal("cannot leave the main scope"));
        }
        let scope = self
            .scopes
            .pop()
            .ok_or_else(|| CompileError::internal("scope stack is empty"))?;

        let inner = mem::take(&mut self.symbol_table);
        self.symbol_table = inner
            .into_outer()
            .ok_or_else(|| CompileError::internal("function scope has no outer table"))?;

        Ok(scope.instructions)
    }
}

/// Rejects operands that do not fit the widths `op` encodes them at.
fn check_operands(op: Opcode, operands: &[usize]) -> Result<(), CompileError> {
    for (i, (operand, width)) in operands.iter().zip(op.definition().operand_widths).enumerate() {
        let max = match width {
            1 => u8::MAX as usize,
            _ => u16::MAX as usize,
        };
        if *operand > max {
            return Err(CompileError::out_of_range(operand_name(op, i), *operand, max));
        }
    }
    Ok(())
}

fn operand_name(op: Opcode, i: usize) -> &'static str {
    match (op, i) {
        (Opcode::Constant, _) | (Opcode::Closure, 0) => "constants",
        (Opcode::Closure, _) | (Opcode::GetFree, _) => "free variables",
        (Opcode::GetGlobal | Opcode::SetGlobal, _) => "globals",
        (Opcode::GetLocal | Opcode::SetLocal, _) => "locals",
        (Opcode::GetBuiltin, _) => "builtins",
        (Opcode::Array, _) => "array elements",
        (Opcode::Hash, _) => "hash operands",
        (Opcode::Call, _) => "arguments",
        (Opcode::Jump | Opcode::JumpNotTruthy, _) => "bytes of code before a jump target",
        _ => "operands",
    }
}
