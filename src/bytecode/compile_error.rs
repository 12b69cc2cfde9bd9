#[derive(Debug, Clone, PartialEq)]
pub enum CompileError {
    /// An identifier with no binding in any enclosing scope
    UnresolvedIdentifier {
        name: String,
        hint: Option<String>,
    },
    /// An operator the parser accepts but the instruction set cannot express
    UnknownOperator {
        operator: String,
        hint: Option<String>,
    },
    /// An operand that does not fit its encoded width
    OperandOutOfRange {
        what: &'static str,
        value: usize,
        max: usize,
    },
    /// A construct that's valid but appeared in an invalid position
    InvalidPosition {
        construct: String,
        reason: String,
        hint: Option<String>,
    },
    /// Internal compiler error (shouldn't happen in normal use)
    Internal(String),
}

impl CompileError {
    pub fn unresolved(name: &str) -> Self {
        CompileError::UnresolvedIdentifier {
            name: name.to_string(),
            hint: Some("bind it with `let` before using it".to_string()),
        }
    }

    pub fn unknown_operator(operator: impl ToString) -> Self {
        let operator = operator.to_string();
        let hint = match operator.as_str() {
            "<=" => Some("write `!(a > b)` instead".to_string()),
            ">=" => Some("write `!(a < b)` instead".to_string()),
            _ => None,
        };
        CompileError::UnknownOperator { operator, hint }
    }

    pub fn out_of_range(what: &'static str, value: usize, max: usize) -> Self {
        CompileError::OperandOutOfRange { what, value, max }
    }

    pub fn return_outside_function() -> Self {
        CompileError::InvalidPosition {
            construct: "return".to_string(),
            reason: "return statements cannot appear at the top level".to_string(),
            hint: Some("the value of the last expression is the program's result".to_string()),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        CompileError::Internal(msg.into())
    }
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let hint = match self {
            CompileError::UnresolvedIdentifier { name, hint } => {
                write!(f, "compile error: undefined variable '{}'", name)?;
                hint
            }
            CompileError::UnknownOperator { operator, hint } => {
                write!(f, "compile error: unknown operator '{}'", operator)?;
                hint
            }
            CompileError::OperandOutOfRange { what, value, max } => {
                return write!(
                    f,
                    "compile error: too many {} ({}, at most {})",
                    what, value, max
                );
            }
            CompileError::InvalidPosition {
                construct,
                reason,
                hint,
            } => {
                write!(f, "compile error: {}: {}", construct, reason)?;
                hint
            }
            CompileError::Internal(msg) => {
                return write!(f, "compile error: internal error: {}", msg);
            }
        };

        if let Some(h) = hint {
            write!(f, "\n  hint: {}", h)?;
        }
        Ok(())
    }
}

impl std::error::Error for CompileError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unresolved_display() {
        let msg = CompileError::unresolved("foo").to_string();
        assert!(msg.starts_with("compile error: undefined variable 'foo'"));
        assert!(msg.contains("hint"));
    }

    #[test]
    fn test_unknown_operator_hint() {
        let msg = CompileError::unknown_operator("<=").to_string();
        assert!(msg.contains("unknown operator '<='"));
        assert!(msg.contains("!(a > b)"));

        let msg = CompileError::unknown_operator("%").to_string();
        assert!(!msg.contains("hint"));
    }

    #[test]
    fn test_out_of_range_display() {
        let msg = CompileError::out_of_range("constants", 65536, 65535).to_string();
        assert_eq!(msg, "compile error: too many constants (65536, at most 65535)");
    }

    #[test]
    fn test_return_outside_function_display() {
        let msg = CompileError::return_outside_function().to_string();
        assert!(msg.contains("return"));
        assert!(msg.contains("top level"));
    }

    #[test]
    fn test_internal_error_display() {
        let msg = CompileError::internal("scope underflow").to_string();
        assert_eq!(msg, "compile error: internal error: scope underflow");
    }

    #[test]
    fn test_error_implements_std_error() {
        let err = CompileError::internal("test");
        let _: &dyn std::error::Error = &err;
    }
}
