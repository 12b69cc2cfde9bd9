#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    pub message: String,
    /// Innermost frame first, as pushed by `with_context`.
    pub call_stack: Vec<String>,
}

impl std::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "runtime error: {}", self.message)?;

        if !self.call_stack.is_empty() {
            write!(f, "\n  call stack:")?;

            for (i, frame) in self.call_stack.iter().rev().enumerate() {
                write!(f, "\n    {}: {}", i, frame)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for RuntimeError {}

impl RuntimeError {
    pub fn new(msg: impl Into<String>) -> Self {
        RuntimeError {
            message: msg.into(),
            call_stack: Vec::new(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.call_stack.push(context.into());
        self
    }
}

// Constructors for the errors the VM and builtins raise.

pub fn type_mismatch(op: &str, left: &str, right: &str) -> RuntimeError {
    RuntimeError::new(format!("type mismatch: {} {} {}", left, op, right))
}

pub fn unknown_infix(op: &str, left: &str, right: &str) -> RuntimeError {
    RuntimeError::new(format!("unknown operator: {} {} {}", left, op, right))
}

pub fn unknown_prefix(op: &str, operand: &str) -> RuntimeError {
    RuntimeError::new(format!("unknown operator: {}{}", op, operand))
}

pub fn division_by_zero() -> RuntimeError {
    RuntimeError::new("division by zero")
}

pub fn stack_overflow(size: usize) -> RuntimeError {
    RuntimeError::new(format!("stack overflow (limit {} slots)", size))
}

pub fn frame_overflow(max: usize) -> RuntimeError {
    RuntimeError::new(format!(
        "frame stack overflow (limit {} frames) - possible infinite recursion",
        max
    ))
}

pub fn wrong_arity(want: usize, got: usize) -> RuntimeError {
    RuntimeError::new(format!(
        "wrong number of arguments: want={}, got={}",
        want, got
    ))
}

pub fn not_callable(type_name: &str) -> RuntimeError {
    RuntimeError::new(format!("calling non-function: {}", type_name))
}

pub fn unusable_hash_key(type_name: &str) -> RuntimeError {
    RuntimeError::new(format!("unusable as hash key: {}", type_name))
}

pub fn unsupported_index(container: &str, index: &str) -> RuntimeError {
    RuntimeError::new(format!(
        "index operator not supported: {}[{}]",
        container, index
    ))
}

pub fn stack_underflow() -> RuntimeError {
    RuntimeError::new("stack underflow")
}

pub fn step_limit(max: usize) -> RuntimeError {
    RuntimeError::new(format!("execution step limit exceeded ({})", max))
}

/// Builtin called with the wrong number of arguments.
pub fn builtin_arity(name: &str, want: &str, got: usize) -> RuntimeError {
    RuntimeError::new(format!(
        "wrong number of arguments to `{}`: got={}, want={}",
        name, got, want
    ))
}

/// Builtin called with an argument of the wrong kind.
pub fn builtin_argument(name: &str, expected: &str, got: &str) -> RuntimeError {
    RuntimeError::new(format!(
        "argument to `{}` must be {}, got {}",
        name, expected, got
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_without_context() {
        assert_eq!(division_by_zero().to_string(), "runtime error: division by zero");
    }

    #[test]
    fn test_display_with_context_outermost_first() {
        let err = RuntimeError::new("boom")
            .with_context("in fn at 0004")
            .with_context("in main at 0010");
        assert_eq!(
            err.to_string(),
            "runtime error: boom\n  call stack:\n    0: in main at 0010\n    1: in fn at 0004"
        );
    }

    #[test]
    fn test_helper_messages() {
        assert_eq!(
            type_mismatch("+", "INTEGER", "STRING").message,
            "type mismatch: INTEGER + STRING"
        );
        assert_eq!(wrong_arity(1, 2).message, "wrong number of arguments: want=1, got=2");
        assert!(frame_overflow(8).message.contains("frame stack overflow"));
        assert_eq!(
            builtin_argument("len", "STRING or ARRAY", "INTEGER").message,
            "argument to `len` must be STRING or ARRAY, got INTEGER"
        );
    }
}
