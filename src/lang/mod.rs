//! # Language model
//!
//! The AST produced by the parser and consumed by the bytecode compiler,
//! and the runtime `Object` values the VM manipulates.
//!
//! ## Conventions
//!
//! - Stack effects in doc comments are written as `( before -- after )`.
//! - Composite runtime values are shared through `Rc`; the language never
//!   mutates them in place.

pub mod node;
pub mod program;
pub mod value;
