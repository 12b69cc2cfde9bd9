use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::bytecode::ir::CompiledFunction;
use crate::runtime::builtins::Builtin;

/// Runtime value.
///
/// The set of kinds is closed; every consumer matches exhaustively.
/// Composite kinds are reference counted, so cloning an `Object` never
/// copies an array, hash, string or closure.
#[derive(Debug, Clone)]
pub enum Object {
    /// 64-bit signed integer.
    Integer(i64),

    /// `true` / `false`.
    Boolean(bool),

    /// The null sentinel.
    Null,

    /// Immutable UTF-8 string.
    String(Rc<str>),

    /// `[a, b, c]`
    Array(Rc<Vec<Object>>),

    /// `{k: v}`
    Hash(Rc<HashObject>),

    /// A function template straight out of the constant pool.
    CompiledFunction(Rc<CompiledFunction>),

    /// A compiled function bound to its captured free variables.
    Closure(Rc<Closure>),

    /// Host function from the builtin registry.
    Builtin(&'static Builtin),
}

/// Closure: a function template plus captured values, in compile-time order.
#[derive(Debug)]
pub struct Closure {
    pub func: Rc<CompiledFunction>,
    pub free: Vec<Object>,
}

/// The hashable subset of values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HashKey {
    Integer(i64),
    Boolean(bool),
    String(Rc<str>),
}

/// One hash entry; keeps the original key object for display.
#[derive(Debug, Clone)]
pub struct HashPair {
    pub key: Object,
    pub value: Object,
}

/// Hash value. Ordered by key so printing is deterministic.
#[derive(Debug, Clone, Default)]
pub struct HashObject {
    pub pairs: BTreeMap<HashKey, HashPair>,
}

impl Object {
    pub const TRUE: Object = Object::Boolean(true);
    pub const FALSE: Object = Object::Boolean(false);

    pub fn string(s: impl Into<Rc<str>>) -> Self {
        Object::String(s.into())
    }

    pub fn array(items: Vec<Object>) -> Self {
        Object::Array(Rc::new(items))
    }

    /// Kind tag, as reported by `typeOf` and in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Object::Integer(_) => "INTEGER",
            Object::Boolean(_) => "BOOLEAN",
            Object::Null => "NULL",
            Object::String(_) => "STRING",
            Object::Array(_) => "ARRAY",
            Object::Hash(_) => "HASH",
            Object::CompiledFunction(_) => "COMPILED_FUNCTION",
            Object::Closure(_) => "CLOSURE",
            Object::Builtin(_) => "BUILTIN",
        }
    }

    /// Only `false` and `null` are falsy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Object::Boolean(false) | Object::Null)
    }

    pub fn hash_key(&self) -> Option<HashKey> {
        match self {
            Object::Integer(n) => Some(HashKey::Integer(*n)),
            Object::Boolean(b) => Some(HashKey::Boolean(*b)),
            Object::String(s) => Some(HashKey::String(s.clone())),
            _ => None,
        }
    }

    /// Equality as the `==` operator sees it: integers by value, everything
    /// else by identity. Booleans and null are singletons, so they compare
    /// equal to themselves; two separately built arrays never do.
    pub fn identical(&self, other: &Object) -> bool {
        match (self, other) {
            (Object::Integer(a), Object::Integer(b)) => a == b,
            (Object::Boolean(a), Object::Boolean(b)) => a == b,
            (Object::Null, Object::Null) => true,
            (Object::String(a), Object::String(b)) => Rc::ptr_eq(a, b),
            (Object::Array(a), Object::Array(b)) => Rc::ptr_eq(a, b),
            (Object::Hash(a), Object::Hash(b)) => Rc::ptr_eq(a, b),
            (Object::CompiledFunction(a), Object::CompiledFunction(b)) => Rc::ptr_eq(a, b),
            (Object::Closure(a), Object::Closure(b)) => Rc::ptr_eq(a, b),
            (Object::Builtin(a), Object::Builtin(b)) => std::ptr::eq(*a, *b),
            _ => false,
        }
    }
}

impl From<bool> for Object {
    fn from(b: bool) -> Self {
        if b { Object::TRUE } else { Object::FALSE }
    }
}

impl From<i64> for Object {
    fn from(n: i64) -> Self {
        Object::Integer(n)
    }
}

/// Structural equality, for tests and host-side comparisons. The language's
/// own `==` is `Object::identical`.
impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Object::Integer(a), Object::Integer(b)) => a == b,
            (Object::Boolean(a), Object::Boolean(b)) => a == b,
            (Object::Null, Object::Null) => true,
            (Object::String(a), Object::String(b)) => a == b,
            (Object::Array(a), Object::Array(b)) => a == b,
            (Object::Hash(a), Object::Hash(b)) => {
                a.pairs.len() == b.pairs.len()
                    && a
                        .pairs
                        .iter()
                        .zip(b.pairs.iter())
                        .all(|((ka, pa), (kb, pb))| ka == kb && pa.value == pb.value)
            }
            _ => self.identical(other),
        }
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Object::Integer(n) => write!(f, "{}", n),
            Object::Boolean(b) => write!(f, "{}", b),
            Object::Null => write!(f, "null"),
            Object::String(s) => write!(f, "{}", s),
            Object::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Object::Hash(hash) => {
                write!(f, "{{")?;
                for (i, pair) in hash.pairs.values().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", pair.key, pair.value)?;
                }
                write!(f, "}}")
            }
            Object::CompiledFunction(func) => {
                write!(f, "CompiledFunction[{} params]", func.num_parameters)
            }
            Object::Closure(closure) => write!(
                f,
                "Closure[{} params, {} free]",
                closure.func.num_parameters,
                closure.free.len()
            ),
            Object::Builtin(builtin) => write!(f, "builtin function {}", builtin.name),
        }
    }
}
