use std::rc::Rc;

use crate::lang::value::{HashObject, Object};
use crate::runtime::runtime_error::{RuntimeError, builtin_argument, builtin_arity};

/// Host function callable from the language.
///
/// Returning `Ok(None)` means "no value"; the VM pushes `null` for it.
#[derive(Debug)]
pub struct Builtin {
    pub name: &'static str,
    pub func: fn(&[Object]) -> Result<Option<Object>, RuntimeError>,
}

/// The registry. `GetBuiltin` operands index into it, so the order is part
/// of the bytecode format.
pub static BUILTINS: &[Builtin] = &[
    Builtin { name: "puts", func: puts },
    Builtin { name: "typeOf", func: type_of },
    Builtin { name: "len", func: len },
    Builtin { name: "first", func: first },
    Builtin { name: "last", func: last },
    Builtin { name: "rest", func: rest },
    Builtin { name: "push", func: push },
    Builtin { name: "pop", func: pop },
    Builtin { name: "reverse", func: reverse },
    Builtin { name: "join", func: join },
    Builtin { name: "split", func: split },
    Builtin { name: "replace", func: replace },
    Builtin { name: "toLower", func: to_lower },
    Builtin { name: "toUpper", func: to_upper },
    Builtin { name: "trim", func: trim },
    Builtin { name: "trimLeft", func: trim_left },
    Builtin { name: "trimRight", func: trim_right },
    Builtin { name: "contains", func: contains },
    Builtin { name: "merge", func: merge },
    Builtin { name: "findIndex", func: find_index },
];

fn arity(name: &str, args: &[Object], want: usize) -> Result<(), RuntimeError> {
    if args.len() != want {
        return Err(builtin_arity(name, &want.to_string(), args.len()));
    }
    Ok(())
}

fn array_arg<'a>(name: &str, arg: &'a Object) -> Result<&'a Rc<Vec<Object>>, RuntimeError> {
    match arg {
        Object::Array(items) => Ok(items),
        other => Err(builtin_argument(name, "ARRAY", other.type_name())),
    }
}

fn string_arg<'a>(name: &str, arg: &'a Object) -> Result<&'a str, RuntimeError> {
    match arg {
        Object::String(s) => Ok(s),
        other => Err(builtin_argument(name, "STRING", other.type_name())),
    }
}

// =============================================================================
// GENERAL
// =============================================================================

fn puts(args: &[Object]) -> Result<Option<Object>, RuntimeError> {
    for arg in args {
        println!("{}", arg);
    }
    Ok(None)
}

fn type_of(args: &[Object]) -> Result<Option<Object>, RuntimeError> {
    arity("typeOf", args, 1)?;
    Ok(Some(Object::string(args[0].type_name())))
}

/// Byte length of a string, element count of an array.
fn len(args: &[Object]) -> Result<Option<Object>, RuntimeError> {
    arity("len", args, 1)?;
    match &args[0] {
        Object::String(s) => Ok(Some(Object::Integer(s.len() as i64))),
        Object::Array(items) => Ok(Some(Object::Integer(items.len() as i64))),
        other => Err(builtin_argument("len", "STRING or ARRAY", other.type_name())),
    }
}

fn reverse(args: &[Object]) -> Result<Option<Object>, RuntimeError> {
    arity("reverse", args, 1)?;
    match &args[0] {
        Object::String(s) => Ok(Some(Object::string(s.chars().rev().collect::<String>()))),
        Object::Array(items) => Ok(Some(Object::array(items.iter().rev().cloned().collect()))),
        other => Err(builtin_argument("reverse", "STRING or ARRAY", other.type_name())),
    }
}

/// `contains(string, substring)` or `contains(array, element)`.
fn contains(args: &[Object]) -> Result<Option<Object>, RuntimeError> {
    arity("contains", args, 2)?;
    match &args[0] {
        Object::String(s) => {
            let needle = string_arg("contains", &args[1])?;
            Ok(Some(Object::from(s.contains(needle))))
        }
        Object::Array(items) => Ok(Some(Object::from(items.contains(&args[1])))),
        other => Err(builtin_argument("contains", "STRING or ARRAY", other.type_name())),
    }
}

// =============================================================================
// ARRAYS
// =============================================================================

fn first(args: &[Object]) -> Result<Option<Object>, RuntimeError> {
    arity("first", args, 1)?;
    Ok(array_arg("first", &args[0])?.first().cloned())
}

fn last(args: &[Object]) -> Result<Option<Object>, RuntimeError> {
    arity("last", args, 1)?;
    Ok(array_arg("last", &args[0])?.last().cloned())
}

/// All but the first element; `null` for an empty array.
fn rest(args: &[Object]) -> Result<Option<Object>, RuntimeError> {
    arity("rest", args, 1)?;
    let items = array_arg("rest", &args[0])?;
    if items.is_empty() {
        return Ok(None);
    }
    Ok(Some(Object::array(items[1..].to_vec())))
}

/// New array with the element appended; the argument is left untouched.
fn push(args: &[Object]) -> Result<Option<Object>, RuntimeError> {
    arity("push", args, 2)?;
    let items = array_arg("push", &args[0])?;
    let mut extended = Vec::with_capacity(items.len() + 1);
    extended.extend(items.iter().cloned());
    extended.push(args[1].clone());
    Ok(Some(Object::array(extended)))
}

/// New array without the last element. An empty array comes back as is.
fn pop(args: &[Object]) -> Result<Option<Object>, RuntimeError> {
    arity("pop", args, 1)?;
    let items = array_arg("pop", &args[0])?;
    if items.is_empty() {
        return Ok(Some(args[0].clone()));
    }
    Ok(Some(Object::array(items[..items.len() - 1].to_vec())))
}

/// Index of the first element equal to the value, or -1.
fn find_index(args: &[Object]) -> Result<Option<Object>, RuntimeError> {
    arity("findIndex", args, 2)?;
    let items = array_arg("findIndex", &args[0])?;
    let index = items
        .iter()
        .position(|item| *item == args[1])
        .map_or(-1, |i| i as i64);
    Ok(Some(Object::Integer(index)))
}

/// `join(array, sep)` joins the elements' printed forms;
/// `join(a, b, sep)` joins two strings.
fn join(args: &[Object]) -> Result<Option<Object>, RuntimeError> {
    match args.first() {
        Some(Object::Array(items)) => {
            arity("join", args, 2)?;
            let separator = string_arg("join", &args[1])?;
            let parts: Vec<String> = items.iter().map(|item| item.to_string()).collect();
            Ok(Some(Object::string(parts.join(separator))))
        }
        Some(Object::String(left)) => {
            arity("join", args, 3)?;
            let right = string_arg("join", &args[1])?;
            let separator = string_arg("join", &args[2])?;
            Ok(Some(Object::string(format!("{}{}{}", left, separator, right))))
        }
        Some(other) => Err(builtin_argument("join", "ARRAY or STRING", other.type_name())),
        None => Err(builtin_arity("join", "2 or 3", 0)),
    }
}

// =============================================================================
// STRINGS
// =============================================================================

/// An empty separator splits into characters.
fn split(args: &[Object]) -> Result<Option<Object>, RuntimeError> {
    arity("split", args, 2)?;
    let s = string_arg("split", &args[0])?;
    let separator = string_arg("split", &args[1])?;

    let parts: Vec<Object> = if separator.is_empty() {
        s.chars().map(|c| Object::string(c.to_string())).collect()
    } else {
        s.split(separator).map(Object::string).collect()
    };
    Ok(Some(Object::array(parts)))
}

/// Replaces every occurrence.
fn replace(args: &[Object]) -> Result<Option<Object>, RuntimeError> {
    arity("replace", args, 3)?;
    let s = string_arg("replace", &args[0])?;
    let from = string_arg("replace", &args[1])?;
    let to = string_arg("replace", &args[2])?;
    Ok(Some(Object::string(s.replace(from, to))))
}

fn map_string(
    name: &str,
    args: &[Object],
    f: impl Fn(&str) -> String,
) -> Result<Option<Object>, RuntimeError> {
    arity(name, args, 1)?;
    Ok(Some(Object::string(f(string_arg(name, &args[0])?))))
}

fn to_lower(args: &[Object]) -> Result<Option<Object>, RuntimeError> {
    map_string("toLower", args, str::to_lowercase)
}

fn to_upper(args: &[Object]) -> Result<Option<Object>, RuntimeError> {
    map_string("toUpper", args, str::to_uppercase)
}

fn trim(args: &[Object]) -> Result<Option<Object>, RuntimeError> {
    map_string("trim", args, |s| s.trim().to_string())
}

fn trim_left(args: &[Object]) -> Result<Option<Object>, RuntimeError> {
    map_string("trimLeft", args, |s| s.trim_start().to_string())
}

fn trim_right(args: &[Object]) -> Result<Option<Object>, RuntimeError> {
    map_string("trimRight", args, |s| s.trim_end().to_string())
}

// =============================================================================
// HASHES
// =============================================================================

/// New hash with the entries of both; the second argument wins on conflicts.
fn merge(args: &[Object]) -> Result<Option<Object>, RuntimeError> {
    arity("merge", args, 2)?;
    match (&args[0], &args[1]) {
        (Object::Hash(a), Object::Hash(b)) => {
            let mut pairs = a.pairs.clone();
            pairs.extend(b.pairs.iter().map(|(k, v)| (k.clone(), v.clone())));
            Ok(Some(Object::Hash(Rc::new(HashObject { pairs }))))
        }
        (Object::Hash(_), other) | (other, _) => {
            Err(builtin_argument("merge", "HASH", other.type_name()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::value::HashPair;

    fn call(name: &str, args: Vec<Object>) -> Result<Option<Object>, RuntimeError> {
        let builtin = BUILTINS
            .iter()
            .find(|b| b.name == name)
            .unwrap_or_else(|| panic!("no builtin {}", name));
        (builtin.func)(&args)
    }

    fn assert_returns(name: &str, args: Vec<Object>, expected: Object) {
        assert_eq!(call(name, args).unwrap(), Some(expected), "builtin {}", name);
    }

    fn assert_error(name: &str, args: Vec<Object>, contains: &str) {
        match call(name, args) {
            Ok(v) => panic!("expected error '{}', got {:?}", contains, v),
            Err(e) => assert!(
                e.message.contains(contains),
                "expected '{}' in error, got: {}",
                contains,
                e.message
            ),
        }
    }

    fn int(n: i64) -> Object {
        Object::Integer(n)
    }

    fn s(v: &str) -> Object {
        Object::string(v)
    }

    fn arr(items: Vec<Object>) -> Object {
        Object::array(items)
    }

    fn hash(pairs: Vec<(Object, Object)>) -> Object {
        let mut h = HashObject::default();
        for (key, value) in pairs {
            h.pairs.insert(key.hash_key().unwrap(), HashPair { key, value });
        }
        Object::Hash(Rc::new(h))
    }

    #[test]
    fn test_registry_order() {
        let names: Vec<&str> = BUILTINS.iter().map(|b| b.name).collect();
        assert_eq!(
            names,
            vec![
                "puts", "typeOf", "len", "first", "last", "rest", "push", "pop", "reverse",
                "join", "split", "replace", "toLower", "toUpper", "trim", "trimLeft",
                "trimRight", "contains", "merge", "findIndex",
            ]
        );
    }

    #[test]
    fn test_puts_returns_nothing() {
        assert_eq!(call("puts", vec![s("hello")]).unwrap(), None);
    }

    #[test]
    fn test_type_of() {
        assert_returns("typeOf", vec![int(1)], s("INTEGER"));
        assert_returns("typeOf", vec![arr(vec![])], s("ARRAY"));
    }

    #[test]
    fn test_len() {
        assert_returns("len", vec![s("")], int(0));
        assert_returns("len", vec![s("four")], int(4));
        assert_returns("len", vec![arr(vec![int(1), int(2)])], int(2));
        assert_error("len", vec![int(1)], "argument to `len` must be STRING or ARRAY, got INTEGER");
        assert_error("len", vec![s("one"), s("two")], "wrong number of arguments");
    }

    #[test]
    fn test_first_last_rest() {
        let a = arr(vec![int(1), int(2), int(3)]);
        assert_returns("first", vec![a.clone()], int(1));
        assert_returns("last", vec![a.clone()], int(3));
        assert_returns("rest", vec![a], arr(vec![int(2), int(3)]));

        assert_eq!(call("first", vec![arr(vec![])]).unwrap(), None);
        assert_eq!(call("last", vec![arr(vec![])]).unwrap(), None);
        assert_eq!(call("rest", vec![arr(vec![])]).unwrap(), None);
        assert_error("first", vec![int(1)], "must be ARRAY");
    }

    #[test]
    fn test_push_does_not_touch_argument() {
        let original = arr(vec![int(1)]);
        assert_returns("push", vec![original.clone(), int(2)], arr(vec![int(1), int(2)]));
        assert_returns("push", vec![arr(vec![]), int(1)], arr(vec![int(1)]));
        assert_eq!(original, arr(vec![int(1)]));
    }

    #[test]
    fn test_pop() {
        assert_returns("pop", vec![arr(vec![int(1), int(2)])], arr(vec![int(1)]));

        let empty = arr(vec![]);
        let popped = call("pop", vec![empty.clone()]).unwrap().unwrap();
        assert!(popped.identical(&empty));
    }

    #[test]
    fn test_reverse() {
        assert_returns("reverse", vec![s("abc")], s("cba"));
        assert_returns("reverse", vec![arr(vec![int(1), int(2)])], arr(vec![int(2), int(1)]));
    }

    #[test]
    fn test_join() {
        assert_returns(
            "join",
            vec![arr(vec![int(1), s("a"), Object::TRUE]), s(", ")],
            s("1, a, true"),
        );
        assert_returns("join", vec![s("foo"), s("bar"), s("-")], s("foo-bar"));
        assert_error("join", vec![s("foo"), s("bar")], "wrong number of arguments");
        assert_error("join", vec![int(1), s("-")], "must be ARRAY or STRING");
        assert_error("join", vec![], "wrong number of arguments");
    }

    #[test]
    fn test_split() {
        assert_returns("split", vec![s("a,b,c"), s(",")], arr(vec![s("a"), s("b"), s("c")]));
        assert_returns("split", vec![s("ab"), s("")], arr(vec![s("a"), s("b")]));
        assert_error("split", vec![s("a"), int(1)], "must be STRING");
    }

    #[test]
    fn test_replace() {
        assert_returns("replace", vec![s("a-b-c"), s("-"), s("+")], s("a+b+c"));
    }

    #[test]
    fn test_case_and_trim() {
        assert_returns("toLower", vec![s("HeLLo")], s("hello"));
        assert_returns("toUpper", vec![s("HeLLo")], s("HELLO"));
        assert_returns("trim", vec![s("  x  ")], s("x"));
        assert_returns("trimLeft", vec![s("  x  ")], s("x  "));
        assert_returns("trimRight", vec![s("  x  ")], s("  x"));
        assert_error("trim", vec![int(1)], "argument to `trim` must be STRING");
    }

    #[test]
    fn test_contains() {
        assert_returns("contains", vec![s("monkey"), s("key")], Object::TRUE);
        assert_returns("contains", vec![s("monkey"), s("cat")], Object::FALSE);
        assert_returns("contains", vec![arr(vec![int(1), s("x")]), s("x")], Object::TRUE);
        assert_returns("contains", vec![arr(vec![int(1)]), int(2)], Object::FALSE);
    }

    #[test]
    fn test_merge_second_wins() {
        let a = hash(vec![(s("a"), int(1)), (s("b"), int(2))]);
        let b = hash(vec![(s("b"), int(3))]);
        assert_returns(
            "merge",
            vec![a, b],
            hash(vec![(s("a"), int(1)), (s("b"), int(3))]),
        );
        assert_error("merge", vec![hash(vec![]), int(1)], "must be HASH, got INTEGER");
    }

    #[test]
    fn test_find_index() {
        let a = arr(vec![s("x"), s("y")]);
        assert_returns("findIndex", vec![a.clone(), s("y")], int(1));
        assert_returns("findIndex", vec![a, s("z")], int(-1));
    }
}
