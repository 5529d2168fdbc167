//! Sandboxed integer arithmetic.
//!
//! Arithmetic blocks in destination templates (`{(n + 1)}`) are evaluated
//! here after capture names have been replaced with their digit strings. The
//! accepted language is deliberately tiny:
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '//' | '%') unary)*
//! unary   := ('+' | '-') unary | primary
//! primary := INTEGER | '(' expr ')'
//! ```
//!
//! Text is parsed into an [`Expr`] tree first and only a successfully parsed
//! tree is evaluated, so a rejected expression never produces a partial
//! result. `//` and `%` follow floor semantics: the quotient rounds toward
//! negative infinity and the remainder takes the sign of the divisor. Nesting
//! is capped at [`MAX_DEPTH`] and operator count at [`MAX_OPERATORS`].
//!
//! # Example
//!
//! ```
//! use state_bridge::expr::eval_math_expr;
//!
//! assert_eq!(eval_math_expr("(3 + 1) * 2").unwrap(), 8);
//! assert_eq!(eval_math_expr("-7 // 2").unwrap(), -4);
//! assert!(eval_math_expr("abs(3)").is_err());
//! ```

use crate::error::ExprError;

/// Parenthesis/unary nesting accepted before the parser gives up.
pub const MAX_DEPTH: usize = 256;

/// Binary operators accepted in one expression. Together with [`MAX_DEPTH`]
/// this bounds the height of the tree that [`Expr::evaluate`] walks.
pub const MAX_OPERATORS: usize = 1024;

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `+x`
    Plus,
    /// `-x`
    Minus,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `a + b`
    Add,
    /// `a - b`
    Sub,
    /// `a * b`
    Mul,
    /// `a // b`, rounding toward negative infinity.
    FloorDiv,
    /// `a % b`, sign follows the divisor.
    Mod,
}

/// A parsed arithmetic expression. The three variants are the whole language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// Integer literal.
    Literal(i64),
    /// Unary sign applied to an operand.
    Unary {
        /// The operator.
        op: UnaryOp,
        /// The operand.
        operand: Box<Expr>,
    },
    /// Binary operation.
    Binary {
        /// The operator.
        op: BinaryOp,
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
    },
}

impl Expr {
    /// Evaluates the tree with checked `i64` arithmetic.
    ///
    /// # Errors
    ///
    /// Returns [`ExprError::DivisionByZero`] for a zero divisor and
    /// [`ExprError::Overflow`] when a result leaves the `i64` range.
    pub fn evaluate(&self) -> Result<i64, ExprError> {
        match self {
            Self::Literal(value) => Ok(*value),
            Self::Unary { op, operand } => {
                let value = operand.evaluate()?;
                match op {
                    UnaryOp::Plus => Ok(value),
                    UnaryOp::Minus => value.checked_neg().ok_or(ExprError::Overflow),
                }
            }
            Self::Binary { op, left, right } => {
                let lhs = left.evaluate()?;
                let rhs = right.evaluate()?;
                match op {
                    BinaryOp::Add => lhs.checked_add(rhs).ok_or(ExprError::Overflow),
                    BinaryOp::Sub => lhs.checked_sub(rhs).ok_or(ExprError::Overflow),
                    BinaryOp::Mul => lhs.checked_mul(rhs).ok_or(ExprError::Overflow),
                    BinaryOp::FloorDiv => floor_div(lhs, rhs),
                    BinaryOp::Mod => floor_mod(lhs, rhs),
                }
            }
        }
    }
}

/// Parses and evaluates `text` in one step.
///
/// # Errors
///
/// Returns [`ExprError::Invalid`] for anything outside the grammar, and the
/// evaluation errors of [`Expr::evaluate`].
pub fn eval_math_expr(text: &str) -> Result<i64, ExprError> {
    parse(text)?.evaluate()
}

/// Parses `text` into an expression tree without evaluating it.
///
/// # Errors
///
/// Returns [`ExprError::Invalid`] with the byte offset of the first rejected
/// token, or [`ExprError::Overflow`] for an integer literal beyond `i64`.
pub fn parse(text: &str) -> Result<Expr, ExprError> {
    let tokens = Lexer::new(text).tokenize()?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        operators: 0,
    };
    let expr = parser.parse_additive()?;
    match parser.current() {
        (Token::Eof, _) => Ok(expr),
        (token, at) => Err(ExprError::invalid(
            at,
            format!("unexpected {} after complete expression", token.describe()),
        )),
    }
}

fn floor_div(lhs: i64, rhs: i64) -> Result<i64, ExprError> {
    if rhs == 0 {
        return Err(ExprError::DivisionByZero);
    }
    let quotient = lhs.checked_div(rhs).ok_or(ExprError::Overflow)?;
    if lhs % rhs != 0 && ((lhs < 0) != (rhs < 0)) {
        Ok(quotient - 1)
    } else {
        Ok(quotient)
    }
}

fn floor_mod(lhs: i64, rhs: i64) -> Result<i64, ExprError> {
    if rhs == 0 {
        return Err(ExprError::DivisionByZero);
    }
    // i64::MIN % -1 overflows in checked_rem but is mathematically 0.
    let remainder = lhs.checked_rem(rhs).unwrap_or(0);
    if remainder != 0 && ((remainder < 0) != (rhs < 0)) {
        Ok(remainder + rhs)
    } else {
        Ok(remainder)
    }
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Integer(i64),
    Plus,
    Minus,
    Star,
    SlashSlash,
    Percent,
    LParen,
    RParen,
    Eof,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Self::Integer(value) => format!("integer `{value}`"),
            Self::Plus => "`+`".to_string(),
            Self::Minus => "`-`".to_string(),
            Self::Star => "`*`".to_string(),
            Self::SlashSlash => "`//`".to_string(),
            Self::Percent => "`%`".to_string(),
            Self::LParen => "`(`".to_string(),
            Self::RParen => "`)`".to_string(),
            Self::Eof => "end of expression".to_string(),
        }
    }
}

struct Lexer<'a> {
    text: &'a str,
    input: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            input: text.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn tokenize(mut self) -> Result<Vec<(Token, usize)>, ExprError> {
        let mut tokens = Vec::new();
        loop {
            while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
                self.pos += 1;
            }
            let start = self.pos;
            let Some(byte) = self.peek() else {
                tokens.push((Token::Eof, start));
                return Ok(tokens);
            };

            let token = match byte {
                b'0'..=b'9' => self.scan_integer()?,
                b'+' => self.single(Token::Plus),
                b'-' => self.single(Token::Minus),
                b'*' => self.single(Token::Star),
                b'%' => self.single(Token::Percent),
                b'(' => self.single(Token::LParen),
                b')' => self.single(Token::RParen),
                b'/' => {
                    if self.input.get(self.pos + 1) == Some(&b'/') {
                        self.pos += 2;
                        Token::SlashSlash
                    } else {
                        return Err(ExprError::invalid(
                            start,
                            "true division `/` is not supported, use `//`",
                        ));
                    }
                }
                b'.' => {
                    return Err(ExprError::invalid(start, "float literals are not supported"))
                }
                b if b == b'_' || b.is_ascii_alphabetic() || !b.is_ascii() => {
                    return Err(ExprError::invalid(
                        start,
                        format!("unexpected name `{}`", self.scan_name()),
                    ));
                }
                other => {
                    return Err(ExprError::invalid(
                        start,
                        format!("unexpected character `{}`", other as char),
                    ));
                }
            };
            tokens.push((token, start));
        }
    }

    fn single(&mut self, token: Token) -> Token {
        self.pos += 1;
        token
    }

    fn scan_integer(&mut self) -> Result<Token, ExprError> {
        let start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        match self.peek() {
            Some(b'.') => {
                return Err(ExprError::invalid(start, "float literals are not supported"));
            }
            Some(b) if b == b'_' || b.is_ascii_alphabetic() => {
                return Err(ExprError::invalid(
                    start,
                    format!("malformed integer literal `{}`", self.scan_name_from(start)),
                ));
            }
            _ => {}
        }
        let digits = &self.text[start..self.pos];
        // Digit-only text fails to parse only when it is out of range.
        digits
            .parse::<i64>()
            .map(Token::Integer)
            .map_err(|_| ExprError::Overflow)
    }

    fn scan_name(&mut self) -> &'a str {
        let start = self.pos;
        self.scan_name_from(start)
    }

    fn scan_name_from(&mut self, start: usize) -> &'a str {
        let text: &'a str = self.text;
        let rest = &text[self.pos..];
        let len = rest
            .char_indices()
            .find(|&(_, c)| !(c == '_' || c.is_alphanumeric()))
            .map_or(rest.len(), |(i, _)| i);
        // A lone non-word character (e.g. a non-ASCII symbol) still advances.
        let len = if len == 0 {
            rest.chars().next().map_or(0, char::len_utf8)
        } else {
            len
        };
        self.pos += len;
        &text[start..self.pos]
    }
}

// ---------------------------------------------------------------------------
// Parser (recursive descent, lowest precedence first)
// ---------------------------------------------------------------------------

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    depth: usize,
    operators: usize,
}

impl Parser {
    fn current(&self) -> (Token, usize) {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .cloned()
            .unwrap_or((Token::Eof, 0))
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn enter(&mut self, at: usize) -> Result<(), ExprError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ExprError::invalid(at, "expression nested too deeply"));
        }
        Ok(())
    }

    fn count_operator(&mut self, at: usize) -> Result<(), ExprError> {
        self.operators += 1;
        if self.operators > MAX_OPERATORS {
            return Err(ExprError::invalid(at, "expression has too many operators"));
        }
        Ok(())
    }

    fn parse_additive(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let (token, at) = self.current();
            let op = match token {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.count_operator(at)?;
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_unary()?;
        loop {
            let (token, at) = self.current();
            let op = match token {
                Token::Star => BinaryOp::Mul,
                Token::SlashSlash => BinaryOp::FloorDiv,
                Token::Percent => BinaryOp::Mod,
                _ => return Ok(left),
            };
            self.count_operator(at)?;
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        let (token, at) = self.current();
        let op = match token {
            Token::Plus => UnaryOp::Plus,
            Token::Minus => UnaryOp::Minus,
            _ => return self.parse_primary(),
        };
        self.advance();
        self.enter(at)?;
        let operand = self.parse_unary()?;
        self.depth -= 1;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        let (token, at) = self.current();
        match token {
            Token::Integer(value) => {
                self.advance();
                Ok(Expr::Literal(value))
            }
            Token::LParen => {
                self.advance();
                self.enter(at)?;
                let inner = self.parse_additive()?;
                self.depth -= 1;
                match self.current() {
                    (Token::RParen, _) => {
                        self.advance();
                        Ok(inner)
                    }
                    (other, at) => Err(ExprError::invalid(
                        at,
                        format!("expected `)`, found {}", other.describe()),
                    )),
                }
            }
            Token::Eof if at == 0 => Err(ExprError::invalid(at, "empty expression")),
            other => Err(ExprError::invalid(
                at,
                format!("expected an integer or `(`, found {}", other.describe()),
            )),
        }
    }
}
