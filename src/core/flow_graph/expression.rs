//! Condition evaluation for condition nodes.
//!
//! Expressions use a closed grammar interpreted over the variable bag:
//!
//! ```text
//! or      := and ("||" and)*
//! and     := unary ("&&" unary)*
//! unary   := "!" unary | compare
//! compare := operand (("==" | "!=" | "<" | "<=" | ">" | ">=") operand)?
//! operand := number | string | "true" | "false" | "null" | identifier
//!          | placeholder | "-" operand | "(" or ")"
//! ```
//!
//! Placeholders are resolved after parsing. A bare `{{name}}` reads the
//! variable like an identifier. Inside a quoted literal the value is spliced
//! into the string and never re-tokenized, so variable text cannot add
//! operators to the expression.

use crate::core::flow_graph::model::{VarValue, Variables};
use crate::core::flow_graph::template;
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

const DEFAULT_MAX_LENGTH: usize = 1024;
const DEFAULT_MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExpressionError {
    #[error("expression is empty")]
    Empty,
    #[error("expression is {len} characters long, limit is {max}")]
    TooLong { len: usize, max: usize },
    #[error("unexpected character '{ch}' at position {position}")]
    UnexpectedChar { ch: char, position: usize },
    #[error("unterminated string literal starting at position {position}")]
    UnterminatedString { position: usize },
    #[error("invalid number '{literal}'")]
    InvalidNumber { literal: String },
    #[error("unexpected token '{found}' at position {position}")]
    UnexpectedToken { found: String, position: usize },
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("expression nesting exceeds {max} levels")]
    TooDeep { max: usize },
    #[error("unknown variable '{0}'")]
    UnknownVariable(String),
    #[error("cannot apply '{op}' to {left} and {right}")]
    TypeMismatch {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
}

impl CompareOp {
    fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Equal => "==",
            CompareOp::NotEqual => "!=",
            CompareOp::Less => "<",
            CompareOp::LessOrEqual => "<=",
            CompareOp::Greater => ">",
            CompareOp::GreaterOrEqual => ">=",
        }
    }
}

/// Parsed condition expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    /// Quoted literal containing `{{name}}` placeholders.
    Interpolated(String),
    Variable(String),
    Negate(Box<Expr>),
    Not(Box<Expr>),
    Compare(CompareOp, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

/// Runtime value produced while interpreting an [`Expr`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Text(_) => "string",
        }
    }

    fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Text(s) => !s.is_empty(),
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Text(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }
}

impl From<&VarValue> for Value {
    fn from(value: &VarValue) -> Self {
        match value {
            VarValue::Bool(b) => Value::Bool(*b),
            VarValue::Number(n) => Value::Number(*n),
            VarValue::Text(s) => Value::Text(s.clone()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(s) => write!(f, "'{}'", s),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Text(String),
    Template(String),
    Ident(String),
    Placeholder(String),
    True,
    False,
    Null,
    Compare(CompareOp),
    And,
    Or,
    Bang,
    Minus,
    LParen,
    RParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{}", n),
            Token::Text(s) | Token::Template(s) => write!(f, "'{}'", s),
            Token::Ident(name) => write!(f, "{}", name),
            Token::Placeholder(name) => write!(f, "{{{{{}}}}}", name),
            Token::True => write!(f, "true"),
            Token::False => write!(f, "false"),
            Token::Null => write!(f, "null"),
            Token::Compare(op) => write!(f, "{}", op.symbol()),
            Token::And => write!(f, "&&"),
            Token::Or => write!(f, "||"),
            Token::Bang => write!(f, "!"),
            Token::Minus => write!(f, "-"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<(Token, usize)>, ExpressionError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        let start = i;
        let next = chars.get(i + 1).copied();

        match ch {
            c if c.is_whitespace() => {
                i += 1;
                continue;
            }
            '(' => {
                tokens.push((Token::LParen, start));
                i += 1;
            }
            ')' => {
                tokens.push((Token::RParen, start));
                i += 1;
            }
            '-' => {
                tokens.push((Token::Minus, start));
                i += 1;
            }
            '=' if next == Some('=') => {
                tokens.push((Token::Compare(CompareOp::Equal), start));
                i += 2;
            }
            '!' if next == Some('=') => {
                tokens.push((Token::Compare(CompareOp::NotEqual), start));
                i += 2;
            }
            '!' => {
                tokens.push((Token::Bang, start));
                i += 1;
            }
            '<' if next == Some('=') => {
                tokens.push((Token::Compare(CompareOp::LessOrEqual), start));
                i += 2;
            }
            '<' => {
                tokens.push((Token::Compare(CompareOp::Less), start));
                i += 1;
            }
            '>' if next == Some('=') => {
                tokens.push((Token::Compare(CompareOp::GreaterOrEqual), start));
                i += 2;
            }
            '>' => {
                tokens.push((Token::Compare(CompareOp::Greater), start));
                i += 1;
            }
            '&' if next == Some('&') => {
                tokens.push((Token::And, start));
                i += 2;
            }
            '|' if next == Some('|') => {
                tokens.push((Token::Or, start));
                i += 2;
            }
            '\'' | '"' => {
                let quote = ch;
                i += 1;
                let mut text = String::new();
                loop {
                    match chars.get(i) {
                        None => return Err(ExpressionError::UnterminatedString { position: start }),
                        Some('\\') if matches!(chars.get(i + 1), Some(c) if *c == quote || *c == '\\') => {
                            text.push(chars[i + 1]);
                            i += 2;
                        }
                        Some(c) if *c == quote => {
                            i += 1;
                            break;
                        }
                        Some(c) => {
                            text.push(*c);
                            i += 1;
                        }
                    }
                }
                let token = if template::placeholders(&text).is_empty() {
                    Token::Text(text)
                } else {
                    Token::Template(text)
                };
                tokens.push((token, start));
            }
            '{' if next == Some('{') => {
                let rest: String = chars[i + 2..].iter().collect();
                let Some(close) = rest.find("}}") else {
                    return Err(ExpressionError::UnexpectedChar { ch, position: start });
                };
                let name = rest[..close].trim();
                if name.is_empty() || name.contains(['{', '}']) {
                    return Err(ExpressionError::UnexpectedChar { ch, position: start });
                }
                tokens.push((Token::Placeholder(name.to_string()), start));
                i += 2 + rest[..close].chars().count() + 2;
            }
            c if c.is_ascii_digit() => {
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let literal: String = chars[start..i].iter().collect();
                let value = literal
                    .parse::<f64>()
                    .map_err(|_| ExpressionError::InvalidNumber { literal })?;
                tokens.push((Token::Number(value), start));
            }
            c if c.is_alphabetic() || c == '_' => {
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                let token = match word.as_str() {
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    _ => Token::Ident(word),
                };
                tokens.push((token, start));
            }
            other => {
                return Err(ExpressionError::UnexpectedChar {
                    ch: other,
                    position: start,
                })
            }
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    depth: usize,
    max_depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(token, _)| token)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(token, _)| token.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn unexpected(&self) -> ExpressionError {
        match self.tokens.get(self.pos) {
            Some((token, position)) => ExpressionError::UnexpectedToken {
                found: token.to_string(),
                position: *position,
            },
            None => ExpressionError::UnexpectedEnd,
        }
    }

    fn enter(&mut self) -> Result<(), ExpressionError> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(ExpressionError::TooDeep {
                max: self.max_depth,
            });
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn parse_or(&mut self) -> Result<Expr, ExpressionError> {
        self.enter()?;
        let mut lhs = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        self.leave();
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, ExpressionError> {
        let mut lhs = self.parse_unary()?;
        while self.peek() == Some(&Token::And) {
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExpressionError> {
        if self.peek() == Some(&Token::Bang) {
            self.advance();
            self.enter()?;
            let inner = self.parse_unary()?;
            self.leave();
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_compare()
    }

    fn parse_compare(&mut self) -> Result<Expr, ExpressionError> {
        let lhs = self.parse_operand()?;
        if let Some(Token::Compare(op)) = self.peek() {
            let op = *op;
            self.advance();
            let rhs = self.parse_operand()?;
            return Ok(Expr::Compare(op, Box::new(lhs), Box::new(rhs)));
        }
        Ok(lhs)
    }

    fn parse_operand(&mut self) -> Result<Expr, ExpressionError> {
        let Some(token) = self.peek().cloned() else {
            return Err(ExpressionError::UnexpectedEnd);
        };
        let expr = match token {
            Token::Number(n) => Expr::Literal(Value::Number(n)),
            Token::Text(s) => Expr::Literal(Value::Text(s)),
            Token::Template(s) => Expr::Interpolated(s),
            Token::Placeholder(name) => Expr::Variable(name),
            Token::True => Expr::Literal(Value::Bool(true)),
            Token::False => Expr::Literal(Value::Bool(false)),
            Token::Null => Expr::Literal(Value::Null),
            Token::Ident(name) => Expr::Variable(name),
            Token::Minus => {
                self.advance();
                self.enter()?;
                let inner = self.parse_operand()?;
                self.leave();
                return Ok(Expr::Negate(Box::new(inner)));
            }
            Token::LParen => {
                self.advance();
                let inner = self.parse_or()?;
                if self.peek() != Some(&Token::RParen) {
                    return Err(self.unexpected());
                }
                self.advance();
                return Ok(inner);
            }
            _ => return Err(self.unexpected()),
        };
        self.advance();
        Ok(expr)
    }
}

/// Outcome of a fail-safe evaluation: the boolean used for branching plus the
/// error that forced it to `false`, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub value: bool,
    pub error: Option<ExpressionError>,
}

/// Parser and interpreter for condition expressions with bounded input size.
#[derive(Debug, Clone)]
pub struct ConditionEvaluator {
    max_length: usize,
    max_depth: usize,
}

impl Default for ConditionEvaluator {
    fn default() -> Self {
        Self {
            max_length: DEFAULT_MAX_LENGTH,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl ConditionEvaluator {
    pub fn new(max_length: usize, max_depth: usize) -> Self {
        Self {
            max_length,
            max_depth,
        }
    }

    /// Parse an expression without resolving any variables.
    pub fn compile(&self, expression: &str) -> Result<Expr, ExpressionError> {
        let len = expression.chars().count();
        if len > self.max_length {
            return Err(ExpressionError::TooLong {
                len,
                max: self.max_length,
            });
        }
        let tokens = tokenize(expression)?;
        if tokens.is_empty() {
            return Err(ExpressionError::Empty);
        }
        let mut parser = Parser {
            tokens,
            pos: 0,
            depth: 0,
            max_depth: self.max_depth,
        };
        let expr = parser.parse_or()?;
        if parser.pos < parser.tokens.len() {
            return Err(parser.unexpected());
        }
        Ok(expr)
    }

    /// Check that an expression parses.
    pub fn check_syntax(&self, expression: &str) -> Result<(), ExpressionError> {
        self.compile(expression).map(|_| ())
    }

    /// Parse and interpret `expression`, propagating any failure.
    pub fn try_evaluate(
        &self,
        expression: &str,
        variables: &Variables,
    ) -> Result<bool, ExpressionError> {
        let expr = self.compile(expression)?;
        Ok(interpret(&expr, variables)?.truthy())
    }

    /// Fail-safe evaluation: any failure yields `false` with the error attached.
    pub fn evaluate(&self, expression: &str, variables: &Variables) -> Evaluation {
        match self.try_evaluate(expression, variables) {
            Ok(value) => Evaluation { value, error: None },
            Err(error) => {
                tracing::warn!(
                    expression = %expression,
                    error = %error,
                    "condition evaluation failed, defaulting to false"
                );
                Evaluation {
                    value: false,
                    error: Some(error),
                }
            }
        }
    }
}

/// Evaluate `expression` against `variables`, returning `false` on any failure.
pub fn evaluate(expression: &str, variables: &Variables) -> bool {
    ConditionEvaluator::default()
        .evaluate(expression, variables)
        .value
}

fn interpret(expr: &Expr, variables: &Variables) -> Result<Value, ExpressionError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Interpolated(text) => Ok(Value::Text(template::substitute(text, variables))),
        Expr::Variable(name) => variables
            .get(name)
            .map(Value::from)
            .ok_or_else(|| ExpressionError::UnknownVariable(name.clone())),
        Expr::Negate(inner) => {
            let value = interpret(inner, variables)?;
            match value.as_number() {
                Some(n) => Ok(Value::Number(-n)),
                None => Err(ExpressionError::TypeMismatch {
                    op: "-",
                    left: value.type_name(),
                    right: value.type_name(),
                }),
            }
        }
        Expr::Not(inner) => Ok(Value::Bool(!interpret(inner, variables)?.truthy())),
        Expr::And(lhs, rhs) => {
            if !interpret(lhs, variables)?.truthy() {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(interpret(rhs, variables)?.truthy()))
        }
        Expr::Or(lhs, rhs) => {
            if interpret(lhs, variables)?.truthy() {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(interpret(rhs, variables)?.truthy()))
        }
        Expr::Compare(op, lhs, rhs) => {
            let left = interpret(lhs, variables)?;
            let right = interpret(rhs, variables)?;
            compare(*op, &left, &right).map(Value::Bool)
        }
    }
}

fn loose_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Number(a), Value::Number(b)) => a == b,
        (Value::Text(a), Value::Text(b)) => a == b,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Number(n), Value::Text(s)) | (Value::Text(s), Value::Number(n)) => {
            s.trim().parse::<f64>().map(|v| v == *n).unwrap_or(false)
        }
        (Value::Bool(b), Value::Text(s)) | (Value::Text(s), Value::Bool(b)) => {
            s.trim() == b.to_string()
        }
        _ => false,
    }
}

fn compare(op: CompareOp, left: &Value, right: &Value) -> Result<bool, ExpressionError> {
    let ordering = match op {
        CompareOp::Equal => return Ok(loose_equal(left, right)),
        CompareOp::NotEqual => return Ok(!loose_equal(left, right)),
        _ => order(op, left, right)?,
    };
    Ok(match op {
        CompareOp::Less => ordering == Ordering::Less,
        CompareOp::LessOrEqual => ordering != Ordering::Greater,
        CompareOp::Greater => ordering == Ordering::Greater,
        CompareOp::GreaterOrEqual => ordering != Ordering::Less,
        CompareOp::Equal | CompareOp::NotEqual => false,
    })
}

fn order(op: CompareOp, left: &Value, right: &Value) -> Result<Ordering, ExpressionError> {
    let mismatch = || ExpressionError::TypeMismatch {
        op: op.symbol(),
        left: left.type_name(),
        right: right.type_name(),
    };
    match (left, right) {
        (Value::Text(a), Value::Text(b)) => match (a.trim().parse::<f64>(), b.trim().parse::<f64>())
        {
            (Ok(x), Ok(y)) => x.partial_cmp(&y).ok_or_else(mismatch),
            _ => Ok(a.cmp(b)),
        },
        _ => {
            let x = left.as_number().ok_or_else(mismatch)?;
            let y = right.as_number().ok_or_else(mismatch)?;
            x.partial_cmp(&y).ok_or_else(mismatch)
        }
    }
}
