use crate::frontend::lexer::Spanned;
use crate::frontend::token::Token;

pub struct TokenDumper {
    pub color: bool,
    pub show_debug_repr: bool, // if false, prints the surface spelling instead
}

impl Default for TokenDumper {
    fn default() -> Self {
        Self {
            color: true,
            show_debug_repr: true,
        }
    }
}

impl TokenDumper {
    // ANSI colors
    const RESET: &'static str = "\x1b[0m";
    const DIM: &'static str = "\x1b[2m";
    const GRN: &'static str = "\x1b[32m";
    const YEL: &'static str = "\x1b[33m";
    const CYN: &'static str = "\x1b[36m";
    const MAG: &'static str = "\x1b[35m";
    const BLU: &'static str = "\x1b[34m";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn no_color(mut self) -> Self {
        self.color = false;
        self
    }

    pub fn pretty(mut self) -> Self {
        self.show_debug_repr = false;
        self
    }

    pub fn dump(&self, tokens: &[Spanned]) {
        print!("{}", self.render(tokens));
    }

    pub fn render(&self, tokens: &[Spanned]) -> String {
        tokens.iter().map(|s| self.render_one(s)).collect()
    }

    fn render_one(&self, s: &Spanned) -> String {
        let colr = if self.color { self.color(&s.token) } else { "" };
        let reset = if self.color { Self::RESET } else { "" };

        let text = if self.show_debug_repr {
            format!("{:?}", s.token)
        } else {
            s.token.describe()
        };

        format!(
            "[{:02}:{:02}] {}{:<8} {}{}\n",
            s.span.line,
            s.span.col,
            colr,
            self.kind(&s.token),
            text,
            reset
        )
    }

    fn kind(&self, t: &Token) -> &'static str {
        use Token::*;
        match t {
            Eof => "EOF",

            // literals
            Integer(_) => "INT",
            String(_) => "STRING",
            True | False => "BOOL",

            // names
            Ident(_) => "IDENT",

            // ops / comparisons
            Assign | Plus | Minus | Bang | Star | Slash => "OP",
            Eq | NotEq | Lt | LtEq | Gt | GtEq => "CMP",

            Comma | Semicolon | Colon | LParen | RParen | LBrace | RBrace | LBracket
            | RBracket => "DELIM",

            Fn | Let | If | Else | Return => "KEYWORD",
        }
    }

    fn color(&self, t: &Token) -> &'static str {
        use Token::*;
        match t {
            Eof => Self::DIM,
            String(_) => Self::GRN,
            Integer(_) | True | False => Self::CYN,
            Ident(_) => Self::YEL,
            Assign | Plus | Minus | Bang | Star | Slash => Self::MAG,
            Eq | NotEq | Lt | LtEq | Gt | GtEq => Self::MAG,
            Fn | Let | If | Else | Return => Self::BLU,
            _ => Self::RESET,
        }
    }
}
