//! Recursive-descent parser producing a small formula AST.
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! expr       := additive ( ("<" | "<=" | ">" | ">=" | "==" | "!=") additive )*
//! additive   := multiplicative ( ("+" | "-") multiplicative )*
//! multiplicative := unary ( ("*" | "/" | "%") unary )*
//! unary      := "-" unary | primary
//! primary    := number | ident | ident "." ident | ident "(" args ")" | "(" expr ")"
//! ```
//!
//! Comparisons evaluate to 1.0 or 0.0 so formulas can gate terms
//! arithmetically, e.g. `base * (target.hp < 100) * 2`.

use crate::token::{tokenize, Token, TokenKind};
use crate::ExprError;

// ---------------------------------------------------------------------------
// AST
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Equal,
    NotEqual,
}

/// A parsed formula node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    /// Bare identifier, bound from the evaluation context's variables.
    Variable(String),
    /// Dotted path: an attribute read off a bound entity, e.g.
    /// `target.max_hp`.
    Attribute { entity: String, attribute: String },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        function: String,
        args: Vec<Expr>,
    },
}

/// Parse `source` into an AST.
pub fn parse(source: &str) -> Result<Expr, ExprError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.expression()?;
    if let Some(token) = parser.peek() {
        return Err(ExprError::UnexpectedToken {
            found: token.kind.to_string(),
            offset: token.offset,
        });
    }
    Ok(expr)
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<(), ExprError> {
        match self.advance() {
            Some(token) if token.kind == *kind => Ok(()),
            Some(token) => Err(ExprError::UnexpectedToken {
                found: token.kind.to_string(),
                offset: token.offset,
            }),
            None => Err(ExprError::UnexpectedEnd),
        }
    }

    fn expression(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.additive()?;
        while let Some(op) = self.peek().and_then(|t| comparison_op(&t.kind)) {
            self.advance();
            let rhs = self.additive()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn additive(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.peek().map(|t| &t.kind) {
                Some(TokenKind::Plus) => BinaryOp::Add,
                Some(TokenKind::Minus) => BinaryOp::Subtract,
                _ => break,
            };
            self.advance();
            let rhs = self.multiplicative()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn multiplicative(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek().map(|t| &t.kind) {
                Some(TokenKind::Star) => BinaryOp::Multiply,
                Some(TokenKind::Slash) => BinaryOp::Divide,
                Some(TokenKind::Percent) => BinaryOp::Modulo,
                _ => break,
            };
            self.advance();
            let rhs = self.unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, ExprError> {
        if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Minus)) {
            self.advance();
            let operand = self.unary()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Negate,
                operand: Box::new(operand),
            });
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, ExprError> {
        let token = self.advance().ok_or(ExprError::UnexpectedEnd)?;
        match token.kind {
            TokenKind::Number(value) => Ok(Expr::Number(value)),
            TokenKind::LParen => {
                let inner = self.expression()?;
                self.expect(&TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::Ident(name) => match self.peek().map(|t| &t.kind) {
                Some(TokenKind::Dot) => {
                    self.advance();
                    let attr = self.advance().ok_or(ExprError::UnexpectedEnd)?;
                    match attr.kind {
                        TokenKind::Ident(attribute) => Ok(Expr::Attribute {
                            entity: name,
                            attribute,
                        }),
                        other => Err(ExprError::UnexpectedToken {
                            found: other.to_string(),
                            offset: attr.offset,
                        }),
                    }
                }
                Some(TokenKind::LParen) => {
                    self.advance();
                    let args = self.arguments()?;
                    Ok(Expr::Call {
                        function: name,
                        args,
                    })
                }
                _ => Ok(Expr::Variable(name)),
            },
            other => Err(ExprError::UnexpectedToken {
                found: other.to_string(),
                offset: token.offset,
            }),
        }
    }

    /// Parses a comma-separated argument list. The opening paren is already
    /// consumed.
    fn arguments(&mut self) -> Result<Vec<Expr>, ExprError> {
        let mut args = Vec::new();
        if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::RParen)) {
            self.advance();
            return Ok(args);
        }
        loop {
            args.push(self.expression()?);
            match self.advance() {
                Some(token) if token.kind == TokenKind::Comma => continue,
                Some(token) if token.kind == TokenKind::RParen => break,
                Some(token) => {
                    return Err(ExprError::UnexpectedToken {
                        found: token.kind.to_string(),
                        offset: token.offset,
                    })
                }
                None => return Err(ExprError::UnexpectedEnd),
            }
        }
        Ok(args)
    }
}

fn comparison_op(kind: &TokenKind) -> Option<BinaryOp> {
    match kind {
        TokenKind::Lt => Some(BinaryOp::Less),
        TokenKind::Le => Some(BinaryOp::LessEqual),
        TokenKind::Gt => Some(BinaryOp::Greater),
        TokenKind::Ge => Some(BinaryOp::GreaterEqual),
        TokenKind::EqEq => Some(BinaryOp::Equal),
        TokenKind::NotEq => Some(BinaryOp::NotEqual),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_number() {
        assert_eq!(parse("42").unwrap(), Expr::Number(42.0));
    }

    #[test]
    fn parses_variable_and_attribute() {
        assert_eq!(
            parse("damage").unwrap(),
            Expr::Variable("damage".to_owned())
        );
        assert_eq!(
            parse("caster.magical_atk").unwrap(),
            Expr::Attribute {
                entity: "caster".to_owned(),
                attribute: "magical_atk".to_owned(),
            }
        );
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let expr = parse("1 + 2 * 3").unwrap();
        let Expr::Binary { op, rhs, .. } = expr else {
            panic!("expected binary node");
        };
        assert_eq!(op, BinaryOp::Add);
        assert!(matches!(
            *rhs,
            Expr::Binary {
                op: BinaryOp::Multiply,
                ..
            }
        ));
    }

    #[test]
    fn comparison_binds_loosest() {
        let expr = parse("a + 1 > b * 2").unwrap();
        assert!(matches!(
            expr,
            Expr::Binary {
                op: BinaryOp::Greater,
                ..
            }
        ));
    }

    #[test]
    fn parens_override_precedence() {
        let expr = parse("(1 + 2) * 3").unwrap();
        let Expr::Binary { op, lhs, .. } = expr else {
            panic!("expected binary node");
        };
        assert_eq!(op, BinaryOp::Multiply);
        assert!(matches!(
            *lhs,
            Expr::Binary {
                op: BinaryOp::Add,
                ..
            }
        ));
    }

    #[test]
    fn unary_minus_nests() {
        assert_eq!(
            parse("--3").unwrap(),
            Expr::Unary {
                op: UnaryOp::Negate,
                operand: Box::new(Expr::Unary {
                    op: UnaryOp::Negate,
                    operand: Box::new(Expr::Number(3.0)),
                }),
            }
        );
    }

    #[test]
    fn parses_calls_with_expression_arguments() {
        let expr = parse("max(caster.physical_atk - target.physical_def, 1)").unwrap();
        let Expr::Call { function, args } = expr else {
            panic!("expected call node");
        };
        assert_eq!(function, "max");
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn parses_zero_argument_call() {
        assert_eq!(
            parse("random()").unwrap(),
            Expr::Call {
                function: "random".to_owned(),
                args: vec![],
            }
        );
    }

    #[test]
    fn rejects_trailing_garbage() {
        assert!(parse("1 + 2 3").is_err());
        assert!(parse("a.").is_err());
        assert!(parse("(1 + 2").is_err());
        assert!(parse("f(1,").is_err());
        assert!(parse("").is_err());
    }

    #[test]
    fn typical_damage_formula_roundtrips() {
        let expr = parse("caster.physical_atk * 1.5 - target.physical_def").unwrap();
        assert!(matches!(
            expr,
            Expr::Binary {
                op: BinaryOp::Subtract,
                ..
            }
        ));
    }
}
