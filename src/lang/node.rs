use std::fmt;

/// A statement inside a program or block.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `let <name> = <value>;`
    Let { name: String, value: Expression },

    /// `return <value>;`
    Return(Expression),

    /// An expression evaluated for its value. At top level the value is
    /// discarded once computed.
    Expression(Expression),
}

/// A `{ ... }` sequence of statements.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixOperator {
    /// `!x`
    Bang,
    /// `-x`
    Minus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfixOperator {
    Plus,
    Minus,
    Star,
    Slash,
    Lt,
    Gt,
    Eq,
    NotEq,
    /// Parsed so the compiler can reject it with a precise error.
    LtEq,
    /// Parsed so the compiler can reject it with a precise error.
    GtEq,
}

/// Expression nodes.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    // ───────────────────────────── Literals ─────────────────────────────
    Identifier(String),
    Integer(i64),
    Boolean(bool),
    String(String),

    /// `[a, b, c]`
    Array(Vec<Expression>),

    /// `{k: v, ...}`, pairs kept in source order.
    Hash(Vec<(Expression, Expression)>),

    // ───────────────────────────── Operators ────────────────────────────
    Prefix {
        operator: PrefixOperator,
        right: Box<Expression>,
    },

    Infix {
        operator: InfixOperator,
        left: Box<Expression>,
        right: Box<Expression>,
    },

    /// `left[index]`
    Index {
        left: Box<Expression>,
        index: Box<Expression>,
    },

    // ──────────────────────────── Control flow ──────────────────────────
    If {
        condition: Box<Expression>,
        consequence: Block,
        alternative: Option<Block>,
    },

    // ───────────────────────────── Functions ────────────────────────────
    /// `fn(params) { body }`
    ///
    /// `name` is filled in by the parser when the literal is the direct value
    /// of a `let`, which lets the body refer to itself.
    Function {
        parameters: Vec<String>,
        body: Block,
        name: Option<String>,
    },

    Call {
        function: Box<Expression>,
        arguments: Vec<Expression>,
    },
}

impl fmt::Display for PrefixOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrefixOperator::Bang => write!(f, "!"),
            PrefixOperator::Minus => write!(f, "-"),
        }
    }
}

impl fmt::Display for InfixOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InfixOperator::Plus => "+",
            InfixOperator::Minus => "-",
            InfixOperator::Star => "*",
            InfixOperator::Slash => "/",
            InfixOperator::Lt => "<",
            InfixOperator::Gt => ">",
            InfixOperator::Eq => "==",
            InfixOperator::NotEq => "!=",
            InfixOperator::LtEq => "<=",
            InfixOperator::GtEq => ">=",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Let { name, value } => write!(f, "let {} = {};", name, value),
            Statement::Return(value) => write!(f, "return {};", value),
            Statement::Expression(expr) => write!(f, "{}", expr),
        }
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{ ")?;
        for stmt in &self.statements {
            write!(f, "{} ", stmt)?;
        }
        write!(f, "}}")
    }
}

/// Source-like rendering. The compiler sorts hash literal keys by this text.
impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Identifier(name) => write!(f, "{}", name),
            Expression::Integer(n) => write!(f, "{}", n),
            Expression::Boolean(b) => write!(f, "{}", b),
            Expression::String(s) => write!(f, "\"{}\"", s),
            Expression::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Expression::Hash(pairs) => {
                write!(f, "{{")?;
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
            Expression::Prefix { operator, right } => write!(f, "({}{})", operator, right),
            Expression::Infix {
                operator,
                left,
                right,
            } => write!(f, "({} {} {})", left, operator, right),
            Expression::Index { left, index } => write!(f, "({}[{}])", left, index),
            Expression::If {
                condition,
                consequence,
                alternative,
            } => {
                write!(f, "if {} {}", condition, consequence)?;
                if let Some(alt) = alternative {
                    write!(f, " else {}", alt)?;
                }
                Ok(())
            }
            Expression::Function {
                parameters,
                body,
                name,
            } => {
                write!(f, "fn")?;
                if let Some(name) = name {
                    write!(f, "<{}>", name)?;
                }
                write!(f, "({}) {}", parameters.join(", "), body)
            }
            Expression::Call {
                function,
                arguments,
            } => {
                write!(f, "{}(", function)?;
                for (i, arg) in arguments.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}
