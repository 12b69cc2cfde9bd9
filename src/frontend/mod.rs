//! Source text to AST: tokens, lexer, Pratt parser and a token dumper for
//! `--tokens`.

pub mod lexer;
pub mod parser;
pub mod parser_error;
pub mod token;
pub mod token_dumper;
