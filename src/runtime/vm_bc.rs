use std::rc::Rc;

use crate::bytecode::ir::{Bytecode, CompiledFunction, Constant};
use crate::bytecode::op::{Opcode, read_u8, read_u16};
use crate::lang::value::{Closure, HashObject, HashPair, Object};
use crate::runtime::builtins::BUILTINS;
use crate::runtime::frame::Frame;
use crate::runtime::runtime_error::{
    RuntimeError, division_by_zero, frame_overflow, not_callable, stack_overflow,
    stack_underflow, step_limit, type_mismatch, unknown_infix, unknown_prefix,
    unsupported_index, unusable_hash_key, wrong_arity,
};

#[derive(Debug, Clone)]
pub struct VmConfig {
    /// Value stack slots.
    pub stack_size: usize,
    /// Call depth, main frame included.
    pub max_frames: usize,
    /// Global slots. `SetGlobal`/`GetGlobal` take a u16, so more than
    /// 65536 is never addressed.
    pub globals_size: usize,
    pub max_steps: Option<usize>,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            stack_size: 2048,
            max_frames: 1024,
            globals_size: 65536,
            max_steps: None,
        }
    }
}

/// Stack machine for one `Bytecode`.
///
/// The stack is pre-sized and never shrinks; `sp` marks the live region
/// `[0, sp)`. Popping only moves `sp`, so the slot at `sp` keeps the last
/// popped value until something overwrites it.
pub struct Vm {
    constants: Vec<Constant>,
    stack: Vec<Object>,
    sp: usize,
    globals: Vec<Object>,
    frames: Vec<Frame>,
    config: VmConfig,
    steps: usize,
}

impl Vm {
    pub fn new(bytecode: Bytecode) -> Self {
        Self::with_state(bytecode, Vec::new(), VmConfig::default())
    }

    pub fn with_config(bytecode: Bytecode, config: VmConfig) -> Self {
        Self::with_state(bytecode, Vec::new(), config)
    }

    /// Runs against globals left behind by an earlier VM of the same session.
    pub fn with_globals(bytecode: Bytecode, globals: Vec<Object>) -> Self {
        Self::with_state(bytecode, globals, VmConfig::default())
    }

    pub fn with_state(bytecode: Bytecode, mut globals: Vec<Object>, config: VmConfig) -> Self {
        if globals.len() < config.globals_size {
            globals.resize(config.globals_size, Object::Null);
        }

        let main = Rc::new(Closure {
            func: Rc::new(CompiledFunction {
                instructions: bytecode.instructions,
                num_locals: 0,
                num_parameters: 0,
            }),
            free: Vec::new(),
        });

        let mut frames = Vec::with_capacity(config.max_frames.min(64));
        frames.push(Frame::new(main, 0));

        Self {
            constants: bytecode.constants,
            stack: vec![Object::Null; config.stack_size],
            sp: 0,
            globals,
            frames,
            config,
            steps: 0,
        }
    }

    /// Hands the globals back so the next input of a session can see them.
    pub fn into_globals(self) -> Vec<Object> {
        self.globals
    }

    /// The value most recently removed from the stack: the result of the
    /// last expression statement.
    pub fn last_popped_stack_elem(&self) -> Object {
        self.stack.get(self.sp).cloned().unwrap_or(Object::Null)
    }

    pub fn stack_top(&self) -> Option<&Object> {
        self.sp.checked_sub(1).map(|i| &self.stack[i])
    }

    pub fn sp(&self) -> usize {
        self.sp
    }

    // =========================================================================
    // EXECUTION
    // =========================================================================

    /// Runs until the main frame reaches the end of its instructions.
    ///
    /// On error, one line per active frame is attached to the error, outermost
    /// first.
    pub fn run(&mut self) -> Result<(), RuntimeError> {
        log::debug!(
            "vm run: {} bytes main, {} constants",
            self.frames[0].instructions().len(),
            self.constants.len()
        );
        self.steps = 0;

        let result = self.run_loop();
        log::debug!("vm finished after {} steps, sp={}", self.steps, self.sp);
        result.map_err(|e| self.attach_call_stack(e))
    }

    fn run_loop(&mut self) -> Result<(), RuntimeError> {
        while let Some((op, operands)) = self.fetch()? {
            self.check_limits()?;
            self.execute(op, operands)?;
        }
        Ok(())
    }

    fn check_limits(&mut self) -> Result<(), RuntimeError> {
        self.steps += 1;

        if let Some(max) = self.config.max_steps {
            if self.steps > max {
                return Err(step_limit(max));
            }
        }
        Ok(())
    }

    /// Decodes the instruction at the current frame's `ip` and advances past
    /// it. `None` once the main frame has run off its end.
    fn fetch(&mut self) -> Result<Option<(Opcode, [usize; 2])>, RuntimeError> {
        let is_main = self.frames.len() == 1;
        let frame = self
            .frames
            .last_mut()
            .ok_or_else(|| RuntimeError::new("no active frame"))?;

        let bytes = frame.closure.func.instructions.as_bytes();
        let ip = frame.ip;
        if ip >= bytes.len() {
            if is_main {
                return Ok(None);
            }
            return Err(RuntimeError::new("function body ended without a return"));
        }

        let op = Opcode::try_from(bytes[ip])
            .map_err(|b| RuntimeError::new(format!("unknown opcode {} at {:04}", b, ip)))?;
        let def = op.definition();

        let mut operands = [0usize; 2];
        let mut offset = ip + 1;
        for (slot, width) in operands.iter_mut().zip(def.operand_widths) {
            let value = match width {
                2 => read_u16(bytes, offset).map(usize::from),
                _ => read_u8(bytes, offset).map(usize::from),
            };
            *slot = value.ok_or_else(|| {
                RuntimeError::new(format!("truncated {} at {:04}", def.name, ip))
            })?;
            offset += width;
        }

        frame.ip = offset;
        Ok(Some((op, operands)))
    }

    fn execute(&mut self, op: Opcode, operands: [usize; 2]) -> Result<(), RuntimeError> {
        let [a, b] = operands;

        match op {
            Opcode::Constant => {
                let value = self
                    .constants
                    .get(a)
                    .ok_or_else(|| RuntimeError::new(format!("constant {} out of range", a)))?
                    .to_object();
                self.push(value)?;
            }

            Opcode::Pop => {
                self.pop()?;
            }

            Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div => self.binary_op(op)?,

            Opcode::Equal | Opcode::NotEqual | Opcode::GreaterThan => self.comparison(op)?,

            Opcode::True => self.push(Object::TRUE)?,
            Opcode::False => self.push(Object::FALSE)?,
            Opcode::Null => self.push(Object::Null)?,

            Opcode::Bang => {
                let operand = self.pop()?;
                self.push(Object::from(!operand.is_truthy()))?;
            }

            Opcode::Minus => match self.pop()? {
                Object::Integer(n) => self.push(Object::Integer(n.wrapping_neg()))?,
                other => return Err(unknown_prefix("-", other.type_name())),
            },

            Opcode::Jump => self.current_frame_mut()?.ip = a,

            Opcode::JumpNotTruthy => {
                let condition = self.pop()?;
                if !condition.is_truthy() {
                    self.current_frame_mut()?.ip = a;
                }
            }

            Opcode::SetGlobal => {
                let value = self.pop()?;
                let slot = self
                    .globals
                    .get_mut(a)
                    .ok_or_else(|| RuntimeError::new(format!("global {} out of range", a)))?;
                *slot = value;
            }

            Opcode::GetGlobal => {
                let value = self
                    .globals
                    .get(a)
                    .cloned()
                    .ok_or_else(|| RuntimeError::new(format!("global {} out of range", a)))?;
                self.push(value)?;
            }

            Opcode::SetLocal => {
                let slot = self.current_frame()?.base_pointer + a;
                let value = self.pop()?;
                self.stack[slot] = value;
            }

            Opcode::GetLocal => {
                let slot = self.current_frame()?.base_pointer + a;
                let value = self.stack[slot].clone();
                self.push(value)?;
            }

            Opcode::GetBuiltin => {
                let builtin = BUILTINS
                    .get(a)
                    .ok_or_else(|| RuntimeError::new(format!("builtin {} out of range", a)))?;
                self.push(Object::Builtin(builtin))?;
            }

            Opcode::GetFree => {
                let value = self
                    .current_frame()?
                    .closure
                    .free
                    .get(a)
                    .cloned()
                    .ok_or_else(|| RuntimeError::new(format!("free variable {} out of range", a)))?;
                self.push(value)?;
            }

            Opcode::CurrentClosure => {
                let closure = self.current_frame()?.closure.clone();
                self.push(Object::Closure(closure))?;
            }

            Opcode::Array => {
                let elements = self.take_run(a)?;
                self.push(Object::array(elements))?;
            }

            Opcode::Hash => {
                let run = self.take_run(a)?;
                let hash = build_hash(run)?;
                self.push(hash)?;
            }

            Opcode::Index => {
                let index = self.pop()?;
                let left = self.pop()?;
                self.push(index_value(&left, &index)?)?;
            }

            Opcode::Call => self.call(a)?,

            Opcode::ReturnValue => {
                let value = self.pop()?;
                self.return_from_frame(value)?;
            }

            Opcode::Return => self.return_from_frame(Object::Null)?,

            Opcode::Closure => self.push_closure(a, b)?,
        }

        Ok(())
    }

    // =========================================================================
    // STACK
    // =========================================================================

    fn push(&mut self, value: Object) -> Result<(), RuntimeError> {
        if self.sp >= self.stack.len() {
            return Err(stack_overflow(self.stack.len()));
        }
        self.stack[self.sp] = value;
        self.sp += 1;
        Ok(())
    }

    fn pop(&mut self) -> Result<Object, RuntimeError> {
        if self.sp == 0 {
            return Err(stack_underflow());
        }
        self.sp -= 1;
        Ok(self.stack[self.sp].clone())
    }

    /// Removes the top `n` values, bottom first.
    fn take_run(&mut self, n: usize) -> Result<Vec<Object>, RuntimeError> {
        let start = self.sp.checked_sub(n).ok_or_else(stack_underflow)?;
        let run = self.stack[start..self.sp].to_vec();
        self.sp = start;
        Ok(run)
    }

    fn current_frame(&self) -> Result<&Frame, RuntimeError> {
        self.frames
            .last()
            .ok_or_else(|| RuntimeError::new("no active frame"))
    }

    fn current_frame_mut(&mut self) -> Result<&mut Frame, RuntimeError> {
        self.frames
            .last_mut()
            .ok_or_else(|| RuntimeError::new("no active frame"))
    }

    // =========================================================================
    // OPERATORS
    // =========================================================================

    fn binary_op(&mut self, op: Opcode) -> Result<(), RuntimeError> {
        let right = self.pop()?;
        let left = self.pop()?;

        let result = match (&left, &right) {
            (Object::Integer(l), Object::Integer(r)) => {
                let (l, r) = (*l, *r);
                let n = match op {
                    Opcode::Add => l.wrapping_add(r),
                    Opcode::Sub => l.wrapping_sub(r),
                    Opcode::Mul => l.wrapping_mul(r),
                    _ => {
                        if r == 0 {
                            return Err(division_by_zero());
                        }
                        l.wrapping_div(r)
                    }
                };
                Object::Integer(n)
            }

            (Object::String(l), Object::String(r)) if op == Opcode::Add => {
                let mut joined = String::with_capacity(l.len() + r.len());
                joined.push_str(l);
                joined.push_str(r);
                Object::string(joined)
            }

            _ => return Err(operand_error(op, &left, &right)),
        };

        self.push(result)
    }

    fn comparison(&mut self, op: Opcode) -> Result<(), RuntimeError> {
        let right = self.pop()?;
        let left = self.pop()?;

        let result = match (op, &left, &right) {
            (Opcode::GreaterThan, Object::Integer(l), Object::Integer(r)) => l > r,
            (Opcode::GreaterThan, _, _) => return Err(operand_error(op, &left, &right)),
            (Opcode::Equal, _, _) => left.identical(&right),
            _ => !left.identical(&right),
        };

        self.push(Object::from(result))
    }

    // =========================================================================
    // CALLS
    // =========================================================================

    fn call(&mut self, argc: usize) -> Result<(), RuntimeError> {
        let callee_slot = self
            .sp
            .checked_sub(argc + 1)
            .ok_or_else(stack_underflow)?;

        match self.stack[callee_slot].clone() {
            Object::Closure(closure) => self.call_closure(closure, argc),

            Object::Builtin(builtin) => {
                let result = (builtin.func)(&self.stack[self.sp - argc..self.sp])
                    .map_err(|e| e.with_context(format!("in builtin {}", builtin.name)))?;
                self.sp = callee_slot;
                self.push(result.unwrap_or(Object::Null))
            }

            other => Err(not_callable(other.type_name())),
        }
    }

    fn call_closure(&mut self, closure: Rc<Closure>, argc: usize) -> Result<(), RuntimeError> {
        let func = &closure.func;
        if argc != func.num_parameters {
            return Err(wrong_arity(func.num_parameters, argc));
        }
        if self.frames.len() >= self.config.max_frames {
            return Err(frame_overflow(self.config.max_frames));
        }

        let base_pointer = self.sp - argc;
        let new_sp = match base_pointer.checked_add(func.num_locals) {
            Some(sp) if sp <= self.stack.len() => sp,
            _ => return Err(stack_overflow(self.stack.len())),
        };
        if func.num_parameters > func.num_locals {
            return Err(RuntimeError::new(format!(
                "function declares {} parameters but {} locals",
                func.num_parameters, func.num_locals
            )));
        }

        self.frames.push(Frame::new(closure, base_pointer));
        self.sp = new_sp;
        Ok(())
    }

    /// Drops the callee's locals and the callee itself, then pushes `value`
    /// for the caller.
    fn return_from_frame(&mut self, value: Object) -> Result<(), RuntimeError> {
        if self.frames.len() <= 1 {
            return Err(RuntimeError::new("return outside a function"));
        }
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| RuntimeError::new("no active frame"))?;

        self.sp = frame.base_pointer - 1;
        self.push(value)
    }

    fn push_closure(&mut self, const_index: usize, num_free: usize) -> Result<(), RuntimeError> {
        let func = match self.constants.get(const_index) {
            Some(Constant::Function(func)) => func.clone(),
            Some(other) => {
                return Err(RuntimeError::new(format!(
                    "not a function: {}",
                    other.to_object().type_name()
                )));
            }
            None => {
                return Err(RuntimeError::new(format!(
                    "constant {} out of range",
                    const_index
                )));
            }
        };

        let free = self.take_run(num_free)?;
        self.push(Object::Closure(Rc::new(Closure { func, free })))
    }

    fn attach_call_stack(&self, mut err: RuntimeError) -> RuntimeError {
        let last = self.frames.len().saturating_sub(1);
        let call_len = Opcode::Call.definition().instruction_len();

        for (depth, frame) in self.frames.iter().enumerate().rev() {
            // Suspended frames stopped right after their Call instruction.
            let at = if depth == last {
                frame.ip
            } else {
                frame.ip.saturating_sub(call_len)
            };
            let context = if depth == 0 {
                format!("in main near {:04}", at)
            } else {
                format!(
                    "in fn/{} near {:04}",
                    frame.closure.func.num_parameters, at
                )
            };
            err = err.with_context(context);
        }
        err
    }
}

fn operator_symbol(op: Opcode) -> &'static str {
    match op {
        Opcode::Add => "+",
        Opcode::Sub => "-",
        Opcode::Mul => "*",
        Opcode::Div => "/",
        Opcode::Equal => "==",
        Opcode::NotEqual => "!=",
        Opcode::GreaterThan => ">",
        _ => "?",
    }
}

/// Same kinds: the operator is not defined for them. Different kinds: a
/// mismatch.
fn operand_error(op: Opcode, left: &Object, right: &Object) -> RuntimeError {
    let (l, r) = (left.type_name(), right.type_name());
    if l == r {
        unknown_infix(operator_symbol(op), l, r)
    } else {
        type_mismatch(operator_symbol(op), l, r)
    }
}

/// Builds a hash from `k1 v1 k2 v2 ...`. Later duplicates win.
fn build_hash(run: Vec<Object>) -> Result<Object, RuntimeError> {
    let mut hash = HashObject::default();
    let mut items = run.into_iter();

    while let (Some(key), Some(value)) = (items.next(), items.next()) {
        let hash_key = key
            .hash_key()
            .ok_or_else(|| unusable_hash_key(key.type_name()))?;
        hash.pairs.insert(hash_key, HashPair { key, value });
    }

    Ok(Object::Hash(Rc::new(hash)))
}

fn index_value(left: &Object, index: &Object) -> Result<Object, RuntimeError> {
    match (left, index) {
        (Object::Array(items), Object::Integer(i)) => Ok(usize::try_from(*i)
            .ok()
            .and_then(|i| items.get(i))
            .cloned()
            .unwrap_or(Object::Null)),

        (Object::Hash(hash), key) => {
            let hash_key = key
                .hash_key()
                .ok_or_else(|| unusable_hash_key(key.type_name()))?;
            Ok(hash
                .pairs
                .get(&hash_key)
                .map(|pair| pair.value.clone())
                .unwrap_or(Object::Null))
        }

        _ => Err(unsupported_index(left.type_name(), index.type_name())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::compile::Compiler;
    use crate::frontend::parser::parse_source;

    // ============================================================
    // HELPERS
    // ============================================================

    fn compile(source: &str) -> Bytecode {
        let program = parse_source(source).expect("parse should succeed");
        let mut compiler = Compiler::new();
        compiler.compile(&program).expect("compile should succeed");
        compiler.bytecode()
    }

    fn run_with_config(source: &str, config: VmConfig) -> Result<Vm, RuntimeError> {
        let mut vm = Vm::with_config(compile(source), config);
        vm.run()?;
        Ok(vm)
    }

    fn run(source: &str) -> Result<Object, RuntimeError> {
        let vm = run_with_config(source, VmConfig::default())?;
        assert_eq!(vm.sp(), 0, "stack not balanced after: {}", source);
        Ok(vm.last_popped_stack_elem())
    }

    /// Assert the last popped value
    fn assert_result(source: &str, expected: Object) {
        let result = run(source).unwrap_or_else(|e| panic!("{}: {}", source, e));
        assert_eq!(result, expected, "source: {}", source);
    }

    /// Assert that running code produces an error containing substring
    fn assert_error(source: &str, contains: &str) {
        match run(source) {
            Ok(value) => panic!("expected error '{}', got: {}", contains, value),
            Err(e) => assert!(
                e.message.contains(contains),
                "expected '{}' in error, got: {}",
                contains,
                e.message
            ),
        }
    }

    // Shorthand constructors
    fn int(n: i64) -> Object {
        Object::Integer(n)
    }
    fn string(s: &str) -> Object {
        Object::string(s)
    }
    fn array(items: Vec<Object>) -> Object {
        Object::array(items)
    }

    // ============================================================
    // ARITHMETIC AND LOGIC
    // ============================================================

    #[test]
    fn test_integer_arithmetic() {
        assert_result("1", int(1));
        assert_result("1 + 2", int(3));
        assert_result("4 / 2", int(2));
        assert_result("50 / 2 * 2 + 10 - 5", int(55));
        assert_result("5 * (2 + 10)", int(60));
        assert_result("-5", int(-5));
        assert_result("-50 + 100 + -50", int(0));
        assert_result("(5 + 10 * 2 + 15 / 3) * 2 + -10", int(50));
        assert_result("7 / 2", int(3));
        assert_result("-7 / 2", int(-3));
    }

    #[test]
    fn test_integer_overflow_wraps() {
        assert_result("9223372036854775807 + 1", int(i64::MIN));
        assert_result("-9223372036854775807 - 2", int(i64::MAX));
    }

    #[test]
    fn test_division_by_zero() {
        assert_error("1 / 0", "division by zero");
    }

    #[test]
    fn test_boolean_expressions() {
        assert_result("true", Object::TRUE);
        assert_result("1 < 2", Object::TRUE);
        assert_result("1 > 2", Object::FALSE);
        assert_result("1 < 1", Object::FALSE);
        assert_result("1 == 1", Object::TRUE);
        assert_result("1 != 2", Object::TRUE);
        assert_result("true == false", Object::FALSE);
        assert_result("(1 < 2) == true", Object::TRUE);
        assert_result("!true", Object::FALSE);
        assert_result("!!5", Object::TRUE);
        assert_result("!(if (false) { 5; })", Object::TRUE);
    }

    #[test]
    fn test_equality_is_identity_for_composites() {
        assert_result("[1] == [1]", Object::FALSE);
        assert_result("let a = [1]; a == a", Object::TRUE);
        assert_result(r#""a" == "a""#, Object::FALSE);
        assert_result(r#"let s = "a"; s == s"#, Object::TRUE);
        assert_result("1 == true", Object::FALSE);
    }

    #[test]
    fn test_operator_type_errors() {
        assert_error(r#"1 + "a""#, "type mismatch: INTEGER + STRING");
        assert_error(r#""a" - "b""#, "unknown operator: STRING - STRING");
        assert_error("true > false", "unknown operator: BOOLEAN > BOOLEAN");
        assert_error("-true", "unknown operator: -BOOLEAN");
    }

    #[test]
    fn test_string_concatenation() {
        assert_result(r#""mon" + "key" + "banana""#, string("monkeybanana"));
    }

    // ============================================================
    // CONDITIONALS AND BINDINGS
    // ============================================================

    #[test]
    fn test_conditionals() {
        assert_result("if (true) { 10 }", int(10));
        assert_result("if (true) { 10 } else { 20 }", int(10));
        assert_result("if (false) { 10 } else { 20 }", int(20));
        assert_result("if (1) { 10 }", int(10));
        assert_result("if (1 > 2) { 10 }", Object::Null);
        assert_result("if (false) { 10 }", Object::Null);
        assert_result("if ((if (false) { 10 })) { 10 } else { 20 }", int(20));
        assert_result("if (true) { }", Object::Null);
    }

    #[test]
    fn test_global_let() {
        assert_result("let one = 1; one", int(1));
        assert_result("let one = 1; let two = one + one; one + two", int(3));
    }

    #[test]
    fn test_shadowing() {
        assert_result("let x = 1; let x = x + 1; x", int(2));
    }

    #[test]
    fn test_stack_balanced_after_statements() {
        let vm = run_with_config("1; 2; let a = 3; a; [a, a]; 4", VmConfig::default()).unwrap();
        assert_eq!(vm.sp(), 0);
        assert_eq!(vm.last_popped_stack_elem(), int(4));
        assert!(vm.stack_top().is_none());
    }

    // ============================================================
    // COLLECTIONS
    // ============================================================

    #[test]
    fn test_arrays() {
        assert_result("[]", array(vec![]));
        assert_result("[1, 2 + 3, 4 * 5]", array(vec![int(1), int(5), int(20)]));
    }

    #[test]
    fn test_hashes() {
        let result = run("{1: 2, 2: 3}[2]").unwrap();
        assert_eq!(result, int(3));
        assert_result(r#"{"a": 1, "a": 2}["a"]"#, int(2));
        assert_result("{}", Object::Hash(Rc::new(HashObject::default())));
    }

    #[test]
    fn test_hash_duplicate_keys() {
        // same text: last in source order wins
        assert_result(r#"{"a": 1, "b": 0, "a": 2}["a"]"#, int(2));
        assert_result(r#"{2: "p", 1: "q", 2: "r"}[2]"#, string("r"));
        // equal only after evaluation: the later key in text order wins
        assert_result(r#"{1: "y", 1 + 0: "x"}[1]"#, string("y"));
        assert_result(r#"{1 + 0: "x", 1: "y"}[1]"#, string("y"));
    }

    #[test]
    fn test_index_expressions() {
        assert_result("[1, 2, 3][1]", int(2));
        assert_result("[1, 2, 3][0 + 2]", int(3));
        assert_result("[[1, 1, 1]][0][0]", int(1));
        assert_result("[][0]", Object::Null);
        assert_result("[1, 2, 3][99]", Object::Null);
        assert_result("[1][-1]", Object::Null);
        assert_result("{1: 1, 2: 2}[1]", int(1));
        assert_result("{1: 1}[0]", Object::Null);
        assert_result("{}[0]", Object::Null);
        assert_result("{true: 5}[true]", int(5));
    }

    #[test]
    fn test_index_errors() {
        assert_error("[1][true]", "index operator not supported: ARRAY[BOOLEAN]");
        assert_error("1[0]", "index operator not supported: INTEGER[INTEGER]");
        assert_error("{}[[]]", "unusable as hash key: ARRAY");
        assert_error("{[1]: 2}", "unusable as hash key: ARRAY");
    }

    // ============================================================
    // FUNCTIONS
    // ============================================================

    #[test]
    fn test_calling_functions() {
        assert_result("let f = fn() { 5 + 10; }; f();", int(15));
        assert_result(
            "let one = fn() { 1; }; let two = fn() { 2; }; one() + two()",
            int(3),
        );
        assert_result("let early = fn() { return 99; 100; }; early();", int(99));
        assert_result("let noReturn = fn() { }; noReturn();", Object::Null);
        assert_result(
            "let returnsOne = fn() { 1; }; let returnsOneReturner = fn() { returnsOne; }; returnsOneReturner()();",
            int(1),
        );
    }

    #[test]
    fn test_locals_and_arguments() {
        assert_result("let one = fn() { let one = 1; one }; one();", int(1));
        assert_result(
            "let sum = fn(a, b) { let c = a + b; c; }; sum(1, 2) + sum(3, 4);",
            int(10),
        );
        assert_result(
            "let globalNum = 10; let sum = fn(a, b) { let c = a + b; c + globalNum; }; \
             let outer = fn() { sum(1, 2) + sum(3, 4) + globalNum; }; outer() + globalNum;",
            int(50),
        );
    }

    #[test]
    fn test_wrong_arity() {
        assert_error("fn() { 1; }(1);", "wrong number of arguments: want=0, got=1");
        assert_error("fn(a) { a; }();", "wrong number of arguments: want=1, got=0");
    }

    #[test]
    fn test_calling_non_function() {
        assert_error("1();", "calling non-function: INTEGER");
    }

    #[test]
    fn test_builtin_calls() {
        assert_result(r#"len("")"#, int(0));
        assert_result(r#"len("hello world")"#, int(11));
        assert_result("len([1, 2, 3])", int(3));
        assert_result("first([1, 2, 3])", int(1));
        assert_result("first([])", Object::Null);
        assert_result("rest([1, 2, 3])", array(vec![int(2), int(3)]));
        assert_result("push([], 1)", array(vec![int(1)]));
        assert_result(r#"puts("hello")"#, Object::Null);
        assert_error("len(1)", "argument to `len` must be STRING or ARRAY, got INTEGER");
    }

    #[test]
    fn test_builtin_error_names_builtin_in_call_stack() {
        let err = run("len(1, 2)").unwrap_err();
        assert!(err.call_stack.iter().any(|c| c == "in builtin len"));
    }

    #[test]
    fn test_closures() {
        assert_result(
            "let newClosure = fn(a) { fn() { a; }; }; let closure = newClosure(99); closure();",
            int(99),
        );
        assert_result(
            "let newAdder = fn(a, b) { fn(c) { a + b + c }; }; let adder = newAdder(1, 2); adder(8);",
            int(11),
        );
        assert_result(
            "let newAdderOuter = fn(a, b) { let c = a + b; fn(d) { let e = d + c; fn(f) { e + f; }; }; }; \
             let newAdderInner = newAdderOuter(1, 2); let adder = newAdderInner(3); adder(8);",
            int(14),
        );
        assert_result(
            "let newClosure = fn(a, b) { let one = fn() { a; }; let two = fn() { b; }; fn() { one() + two(); }; }; \
             let closure = newClosure(9, 90); closure();",
            int(99),
        );
    }

    #[test]
    fn test_closures_are_independent() {
        assert_result(
            "let adder = fn(x) { fn(y) { x + y } }; let a = adder(1); let b = adder(10); [a(1), b(1)]",
            array(vec![int(2), int(11)]),
        );
    }

    #[test]
    fn test_recursive_functions() {
        assert_result(
            "let countDown = fn(x) { if (x == 0) { return 0; } else { countDown(x - 1); } }; countDown(1);",
            int(0),
        );
        assert_result(
            "let wrapper = fn() { let countDown = fn(x) { if (x == 0) { return 0; } else { countDown(x - 1); } }; countDown(1); }; wrapper();",
            int(0),
        );
        assert_result(
            "let factorial = fn(n) { if (n < 2) { 1 } else { n * factorial(n - 1) } }; factorial(5)",
            int(120),
        );
    }

    #[test]
    fn test_recursive_fibonacci() {
        assert_result(
            "let fibonacci = fn(x) { if (x == 0) { return 0; } else { if (x == 1) { return 1; } else { fibonacci(x - 1) + fibonacci(x - 2); } } }; fibonacci(15);",
            int(610),
        );
    }

    // ============================================================
    // LIMITS AND ERROR CONTEXT
    // ============================================================

    #[test]
    fn test_unbounded_recursion_overflows_frames() {
        assert_error("let f = fn() { f() }; f();", "frame stack overflow");
    }

    #[test]
    fn test_stack_overflow() {
        let config = VmConfig {
            stack_size: 8,
            ..VmConfig::default()
        };
        let err = run_with_config("[1, 2, 3, 4, 5, 6, 7, 8, 9]", config).err().unwrap();
        assert!(err.message.contains("stack overflow"));
    }

    #[test]
    fn test_step_limit() {
        let config = VmConfig {
            max_steps: Some(100),
            ..VmConfig::default()
        };
        let err = run_with_config("let f = fn(n) { if (n > 0) { f(n - 1) } else { 0 } }; f(1000);", config)
            .err()
            .unwrap();
        assert!(err.message.contains("step limit exceeded (100)"));
    }

    #[test]
    fn test_error_carries_frames() {
        let err = run("let f = fn(a) { a / 0 }; f(1);").unwrap_err();
        assert_eq!(err.call_stack.len(), 2);
        assert!(err.call_stack[0].starts_with("in fn/1"));
        assert!(err.call_stack[1].starts_with("in main"));
        assert!(err.to_string().contains("call stack:"));
    }

    #[test]
    fn test_globals_survive_across_vms() {
        let mut compiler = Compiler::new();
        compiler.compile(&parse_source("let a = 40;").unwrap()).unwrap();
        let mut vm = Vm::new(compiler.bytecode());
        vm.run().unwrap();
        let globals = vm.into_globals();

        let (symbols, constants) = compiler.into_state();
        let mut compiler = Compiler::new_with_state(symbols, constants);
        compiler.compile(&parse_source("a + 2").unwrap()).unwrap();
        let mut vm = Vm::with_globals(compiler.bytecode(), globals);
        vm.run().unwrap();
        assert_eq!(vm.last_popped_stack_elem(), int(42));
    }

    #[test]
    fn test_rejects_return_from_main() {
        let bytecode = Bytecode {
            instructions: [crate::bytecode::op::make(Opcode::Return, &[])]
                .into_iter()
                .collect(),
            constants: vec![],
        };
        let err = Vm::new(bytecode).run().unwrap_err();
        assert!(err.message.contains("return outside a function"));
    }

    fn unverified_call(num_locals: usize, num_parameters: usize) -> Bytecode {
        use crate::bytecode::op::make;
        let func = CompiledFunction {
            instructions: [make(Opcode::Return, &[])].into_iter().collect(),
            num_locals,
            num_parameters,
        };
        Bytecode {
            instructions: [
                make(Opcode::Closure, &[0, 0]),
                make(Opcode::Call, &[0]),
                make(Opcode::Pop, &[]),
            ]
            .into_iter()
            .collect(),
            constants: vec![Constant::Function(Rc::new(func))],
        }
    }

    #[test]
    fn test_huge_local_count_is_stack_overflow() {
        let err = Vm::new(unverified_call(usize::MAX, 0)).run().unwrap_err();
        assert!(err.message.contains("stack overflow"));
    }

    #[test]
    fn test_parameters_beyond_locals_is_error() {
        use crate::bytecode::op::make;
        let func = CompiledFunction {
            instructions: [make(Opcode::GetLocal, &[0]), make(Opcode::ReturnValue, &[])]
                .into_iter()
                .collect(),
            num_locals: 0,
            num_parameters: 2,
        };
        let bytecode = Bytecode {
            instructions: [
                make(Opcode::Closure, &[0, 0]),
                make(Opcode::Constant, &[1]),
                make(Opcode::Constant, &[1]),
                make(Opcode::Call, &[2]),
                make(Opcode::Pop, &[]),
            ]
            .into_iter()
            .collect(),
            constants: vec![Constant::Function(Rc::new(func)), Constant::Integer(7)],
        };
        let err = Vm::new(bytecode).run().unwrap_err();
        assert!(err.message.contains("2 parameters but 0 locals"));
    }
}
