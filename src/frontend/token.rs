#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    Integer(i64),
    String(std::string::String),
    Ident(std::string::String),

    // Keywords
    Fn,
    Let,
    True,
    False,
    If,
    Else,
    Return,

    // Operators
    Assign,
    Plus,
    Minus,
    Bang,
    Star,
    Slash,
    Lt,
    Gt,
    Eq,
    NotEq,
    LtEq,
    GtEq,

    // Delimiters
    Comma,
    Semicolon,
    Colon,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,

    Eof,
}

impl Token {
    /// Keyword lookup for a scanned identifier.
    pub fn keyword(ident: &str) -> Option<Token> {
        let token = match ident {
            "fn" => Token::Fn,
            "let" => Token::Let,
            "true" => Token::True,
            "false" => Token::False,
            "if" => Token::If,
            "else" => Token::Else,
            "return" => Token::Return,
            _ => return None,
        };
        Some(token)
    }

    /// Surface spelling, used in parser diagnostics.
    pub fn describe(&self) -> std::string::String {
        match self {
            Token::Integer(n) => format!("integer {}", n),
            Token::String(s) => format!("string \"{}\"", s),
            Token::Ident(name) => format!("identifier `{}`", name),
            Token::Fn => "`fn`".to_string(),
            Token::Let => "`let`".to_string(),
            Token::True => "`true`".to_string(),
            Token::False => "`false`".to_string(),
            Token::If => "`if`".to_string(),
            Token::Else => "`else`".to_string(),
            Token::Return => "`return`".to_string(),
            Token::Assign => "`=`".to_string(),
            Token::Plus => "`+`".to_string(),
            Token::Minus => "`-`".to_string(),
            Token::Bang => "`!`".to_string(),
            Token::Star => "`*`".to_string(),
            Token::Slash => "`/`".to_string(),
            Token::Lt => "`<`".to_string(),
            Token::Gt => "`>`".to_string(),
            Token::Eq => "`==`".to_string(),
            Token::NotEq => "`!=`".to_string(),
            Token::LtEq => "`<=`".to_string(),
            Token::GtEq => "`>=`".to_string(),
            Token::Comma => "`,`".to_string(),
            Token::Semicolon => "`;`".to_string(),
            Token::Colon => "`:`".to_string(),
            Token::LParen => "`(`".to_string(),
            Token::RParen => "`)`".to_string(),
            Token::LBrace => "`{`".to_string(),
            Token::RBrace => "`}`".to_string(),
            Token::LBracket => "`[`".to_string(),
            Token::RBracket => "`]`".to_string(),
            Token::Eof => "end of input".to_string(),
        }
    }
}
