use crate::frontend::lexer::{Span, Spanned};
use crate::frontend::parser_error::ParserError;
use crate::frontend::token::Token;
use crate::lang::node::{Block, Expression, InfixOperator, PrefixOperator, Statement};
use crate::lang::program::Program;

/// Binding power of infix positions, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    Lowest,
    Equals,
    LessGreater,
    Sum,
    Product,
    Prefix,
    Call,
    Index,
}

fn precedence_of(token: &Token) -> Precedence {
    match token {
        Token::Eq | Token::NotEq => Precedence::Equals,
        Token::Lt | Token::Gt | Token::LtEq | Token::GtEq => Precedence::LessGreater,
        Token::Plus | Token::Minus => Precedence::Sum,
        Token::Star | Token::Slash => Precedence::Product,
        Token::LParen => Precedence::Call,
        Token::LBracket => Precedence::Index,
        _ => Precedence::Lowest,
    }
}

fn infix_operator(token: &Token) -> Option<InfixOperator> {
    let op = match token {
        Token::Plus => InfixOperator::Plus,
        Token::Minus => InfixOperator::Minus,
        Token::Star => InfixOperator::Star,
        Token::Slash => InfixOperator::Slash,
        Token::Lt => InfixOperator::Lt,
        Token::Gt => InfixOperator::Gt,
        Token::Eq => InfixOperator::Eq,
        Token::NotEq => InfixOperator::NotEq,
        Token::LtEq => InfixOperator::LtEq,
        Token::GtEq => InfixOperator::GtEq,
        _ => return None,
    };
    Some(op)
}

/// Pratt parser.
///
/// Consumes lexed `Spanned` tokens and produces a `Program`. Errors do not
/// stop parsing: each failed top-level statement records one `ParserError`
/// and the parser skips ahead to the next `;`, so a single pass reports every
/// independent mistake on the line.
pub struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    /// Span of the most recently consumed token, for errors at end-of-input.
    last_span: Option<Span>,
}

impl Parser {
    pub fn new(tokens: Vec<Spanned>) -> Self {
        Parser {
            tokens,
            pos: 0,
            last_span: None,
        }
    }

    fn current(&self) -> Option<&Spanned> {
        self.tokens.get(self.pos)
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).map(|s| &s.token).unwrap_or(&Token::Eof)
    }

    fn check(&self, token: &Token) -> bool {
        self.peek() == token
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if let Some(s) = self.tokens.get(self.pos) {
            self.last_span = Some(s.span.clone());
        }
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    /// Builds a `ParserError` at the current token, falling back to the last
    /// consumed one and finally to `1:1` for empty input.
    fn error(&self, message: impl Into<String>) -> ParserError {
        let span = self
            .current()
            .map(|s| s.span.clone())
            .or_else(|| self.last_span.clone())
            .unwrap_or(Span { line: 1, col: 1 });
        ParserError {
            message: message.into(),
            line: span.line,
            col: span.col,
        }
    }

    fn expect(&mut self, token: Token) -> Result<(), ParserError> {
        if self.check(&token) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(format!(
                "expected next token to be {}, got {} instead",
                token.describe(),
                self.peek().describe()
            )))
        }
    }

    fn expect_ident(&mut self) -> Result<String, ParserError> {
        match self.peek() {
            Token::Ident(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            other => Err(self.error(format!(
                "expected an identifier, got {} instead",
                other.describe()
            ))),
        }
    }

    fn skip_semicolons(&mut self) {
        while self.check(&Token::Semicolon) {
            self.advance();
        }
    }

    /// Discards tokens through the next `;` after a failed statement.
    fn synchronize(&mut self) {
        loop {
            match self.peek() {
                Token::Eof => break,
                Token::Semicolon => {
                    self.advance();
                    break;
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    /// Parses a complete program, collecting every statement-level error.
    pub fn parse(&mut self) -> Result<Program, Vec<ParserError>> {
        let mut statements = Vec::new();
        let mut errors = Vec::new();

        loop {
            self.skip_semicolons();
            if self.check(&Token::Eof) {
                break;
            }

            match self.parse_statement() {
                Ok(stmt) => statements.push(stmt),
                Err(e) => {
                    errors.push(e);
                    self.synchronize();
                }
            }
        }

        if errors.is_empty() {
            Ok(Program { statements })
        } else {
            Err(errors)
        }
    }

    fn parse_statement(&mut self) -> Result<Statement, ParserError> {
        let stmt = match self.peek() {
            Token::Let => self.parse_let()?,
            Token::Return => {
                self.advance();
                Statement::Return(self.parse_expression(Precedence::Lowest)?)
            }
            _ => Statement::Expression(self.parse_expression(Precedence::Lowest)?),
        };
        self.skip_semicolons();
        Ok(stmt)
    }

    fn parse_let(&mut self) -> Result<Statement, ParserError> {
        self.expect(Token::Let)?;
        let name = self.expect_ident()?;
        self.expect(Token::Assign)?;
        let mut value = self.parse_expression(Precedence::Lowest)?;

        // Naming the literal is what lets its body call itself.
        if let Expression::Function { name: fn_name, .. } = &mut value {
            if fn_name.is_none() {
                *fn_name = Some(name.clone());
            }
        }

        Ok(Statement::Let { name, value })
    }

    fn parse_block(&mut self) -> Result<Block, ParserError> {
        self.expect(Token::LBrace)?;
        let mut statements = Vec::new();

        loop {
            self.skip_semicolons();
            if self.check(&Token::RBrace) || self.check(&Token::Eof) {
                break;
            }
            statements.push(self.parse_statement()?);
        }

        self.expect(Token::RBrace)?;
        Ok(Block { statements })
    }

    fn parse_expression(&mut self, precedence: Precedence) -> Result<Expression, ParserError> {
        let mut left = self.parse_prefix()?;

        while !self.check(&Token::Semicolon) && precedence < precedence_of(self.peek()) {
            left = self.parse_infix(left)?;
        }

        Ok(left)
    }

    fn parse_prefix(&mut self) -> Result<Expression, ParserError> {
        match self.peek().clone() {
            Token::Ident(name) => {
                self.advance();
                Ok(Expression::Identifier(name))
            }
            Token::Integer(n) => {
                self.advance();
                Ok(Expression::Integer(n))
            }
            Token::String(s) => {
                self.advance();
                Ok(Expression::String(s))
            }
            Token::True => {
                self.advance();
                Ok(Expression::Boolean(true))
            }
            Token::False => {
                self.advance();
                Ok(Expression::Boolean(false))
            }
            Token::Bang | Token::Minus => {
                let operator = if self.advance() == Token::Bang {
                    PrefixOperator::Bang
                } else {
                    PrefixOperator::Minus
                };
                let right = self.parse_expression(Precedence::Prefix)?;
                Ok(Expression::Prefix {
                    operator,
                    right: Box::new(right),
                })
            }
            Token::LParen => {
                self.advance();
                let expr = self.parse_expression(Precedence::Lowest)?;
                self.expect(Token::RParen)?;
                Ok(expr)
            }
            Token::If => self.parse_if(),
            Token::Fn => self.parse_function(),
            Token::LBracket => {
                let items = self.parse_expression_list(Token::LBracket, Token::RBracket)?;
                Ok(Expression::Array(items))
            }
            Token::LBrace => self.parse_hash(),
            other => Err(self.error(format!(
                "no prefix parse function for {} found",
                other.describe()
            ))),
        }
    }

    fn parse_infix(&mut self, left: Expression) -> Result<Expression, ParserError> {
        let token = self.peek().clone();

        if let Some(operator) = infix_operator(&token) {
            let precedence = precedence_of(&token);
            self.advance();
            let right = self.parse_expression(precedence)?;
            return Ok(Expression::Infix {
                operator,
                left: Box::new(left),
                right: Box::new(right),
            });
        }

        match token {
            Token::LParen => {
                let arguments = self.parse_expression_list(Token::LParen, Token::RParen)?;
                Ok(Expression::Call {
                    function: Box::new(left),
                    arguments,
                })
            }
            Token::LBracket => {
                self.advance();
                let index = self.parse_expression(Precedence::Lowest)?;
                self.expect(Token::RBracket)?;
                Ok(Expression::Index {
                    left: Box::new(left),
                    index: Box::new(index),
                })
            }
            other => Err(self.error(format!(
                "no infix parse function for {} found",
                other.describe()
            ))),
        }
    }

    /// `if (<cond>) { ... } [else { ... }]`
    fn parse_if(&mut self) -> Result<Expression, ParserError> {
        self.expect(Token::If)?;
        self.expect(Token::LParen)?;
        let condition = self.parse_expression(Precedence::Lowest)?;
        self.expect(Token::RParen)?;

        let consequence = self.parse_block()?;
        let alternative = if self.check(&Token::Else) {
            self.advance();
            Some(self.parse_block()?)
        } else {
            None
        };

        Ok(Expression::If {
            condition: Box::new(condition),
            consequence,
            alternative,
        })
    }

    /// `fn(<params>) { ... }`
    fn parse_function(&mut self) -> Result<Expression, ParserError> {
        self.expect(Token::Fn)?;
        self.expect(Token::LParen)?;

        let mut parameters = Vec::new();
        if self.check(&Token::RParen) {
            self.advance();
        } else {
            loop {
                parameters.push(self.expect_ident()?);
                if self.check(&Token::Comma) {
                    self.advance();
                } else {
                    self.expect(Token::RParen)?;
                    break;
                }
            }
        }

        let body = self.parse_block()?;
        Ok(Expression::Function {
            parameters,
            body,
            name: None,
        })
    }

    fn parse_hash(&mut self) -> Result<Expression, ParserError> {
        self.expect(Token::LBrace)?;
        let mut pairs = Vec::new();

        while !self.check(&Token::RBrace) {
            let key = self.parse_expression(Precedence::Lowest)?;
            self.expect(Token::Colon)?;
            let value = self.parse_expression(Precedence::Lowest)?;
            pairs.push((key, value));

            if !self.check(&Token::RBrace) {
                self.expect(Token::Comma)?;
            }
        }

        self.expect(Token::RBrace)?;
        Ok(Expression::Hash(pairs))
    }

    /// Comma-separated expressions between `open` and `close`.
    fn parse_expression_list(
        &mut self,
        open: Token,
        close: Token,
    ) -> Result<Vec<Expression>, ParserError> {
        self.expect(open)?;
        let mut items = Vec::new();

        if self.check(&close) {
            self.advance();
            return Ok(items);
        }

        loop {
            items.push(self.parse_expression(Precedence::Lowest)?);
            if self.check(&Token::Comma) {
                self.advance();
            } else {
                break;
            }
        }

        self.expect(close)?;
        Ok(items)
    }
}

/// Lexes and parses `source`, folding a lexer failure into the error list.
pub fn parse_source(source: &str) -> Result<Program, Vec<ParserError>> {
    let tokens = crate::frontend::lexer::Lexer::new(source)
        .tokenize()
        .map_err(|e| vec![ParserError::from(e)])?;
    Parser::new(tokens).parse()
}
