//! Reader for equations written in prefix (S-expression) notation.
//!
//! `(* 10 (- y x))` reads as an application whose head is the operator symbol
//! `*` followed by its operands. Atoms that parse as a number become
//! `Expr::Number`, everything else becomes `Expr::Symbol`, so `-3` is a literal
//! and a lone `-` is an operator.

use crate::equation_engine::Expr;
use crate::error::ParseError;

/// Parses exactly one expression from `input`.
pub fn parse(input: &str) -> Result<Expr, ParseError> {
    let tokens = tokenize(input);
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: input.len(),
    };
    let expr = parser.parse_expression()?;
    if let Some((_, offset)) = parser.peek() {
        return Err(ParseError::new("Unexpected trailing input", offset));
    }
    Ok(expr)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    Atom(String),
}

fn tokenize(input: &str) -> Vec<(Token, usize)> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(offset, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '(' {
            tokens.push((Token::LParen, offset));
            chars.next();
        } else if c == ')' {
            tokens.push((Token::RParen, offset));
            chars.next();
        } else {
            let mut atom = String::new();
            while let Some(&(_, d)) = chars.peek() {
                if d.is_whitespace() || d == '(' || d == ')' {
                    break;
                }
                atom.push(d);
                chars.next();
            }
            tokens.push((Token::Atom(atom), offset));
        }
    }
    tokens
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<(Token, usize)> {
        self.tokens.get(self.pos).cloned()
    }

    fn consume(&mut self) -> Option<(Token, usize)> {
        let token = self.peek();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        match self.consume() {
            Some((Token::Atom(text), offset)) => atom(text, offset),
            Some((Token::LParen, offset)) => self.parse_list(offset),
            Some((Token::RParen, offset)) => Err(ParseError::new("Unexpected ')'", offset)),
            None => Err(ParseError::new("Expected an expression", self.end)),
        }
    }

    fn parse_list(&mut self, open: usize) -> Result<Expr, ParseError> {
        let mut items = Vec::new();
        loop {
            match self.peek() {
                Some((Token::RParen, _)) => {
                    self.consume();
                    return Ok(Expr::Application(items));
                }
                Some(_) => items.push(self.parse_expression()?),
                None => return Err(ParseError::new("Unclosed '('", open)),
            }
        }
    }
}

fn atom(text: String, offset: usize) -> Result<Expr, ParseError> {
    // "inf" and "nan" parse as floats but are meant as names here.
    let numeric_start = text
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+'));
    match text.parse::<f64>() {
        Ok(value) if numeric_start && value.is_finite() => Ok(Expr::Number(value)),
        Ok(_) if numeric_start => Err(ParseError::new(
            format!("Number literal '{text}' is not finite"),
            offset,
        )),
        _ => Ok(Expr::Symbol(text)),
    }
}
