//! Edit-condition expressions.
//!
//! A field's `EditCondition` metadata holds a small boolean expression over
//! its sibling fields, e.g. `bEnabled && Mode == EMode::Advanced`. The
//! expression is parsed once per node and evaluated against every edited
//! instance; the field is editable only when all of them evaluate to
//! `true`. Anything that fails to parse or evaluate reads as "not met".
//!
//! # Grammar
//!
//! Operators from tightest to loosest binding:
//!
//! | Level | Operators |
//! |-------|-----------|
//! | unary | `!` `-` |
//! | 4 | `*` `/` |
//! | 3 | `+` `-` `&` |
//! | 2 | `==` `!=` `<` `<=` `>` `>=` |
//! | 1 | `&&` `\|\|` |
//!
//! Binary operators are left associative. Operands are numbers, `true` /
//! `false` (any case), `nullptr`, sibling field names, and enum values
//! written `EnumType::Variant`.
//!
//! # Example
//!
//! ```
//! use proptree_editor::condition::{ConditionContext, ConditionError, EditCondition, Operand};
//!
//! struct Fields;
//! impl ConditionContext for Fields {
//!     fn field(&self, name: &str) -> Result<Operand, ConditionError> {
//!         match name {
//!             "bEnabled" => Ok(Operand::Bool(true)),
//!             "Count" => Ok(Operand::Number(3.0)),
//!             _ => Err(ConditionError::UnknownField { name: name.to_owned() }),
//!         }
//!     }
//!     fn enum_value(&self, enum_name: &str, variant: &str) -> Result<Operand, ConditionError> {
//!         Err(ConditionError::UnknownEnum { name: enum_name.to_owned() })
//!     }
//! }
//!
//! let condition = EditCondition::parse("bEnabled && Count * 2 > 5");
//! assert_eq!(condition.evaluate(&Fields), Ok(true));
//! assert!(EditCondition::parse("Count >").evaluate(&Fields).is_err());
//! ```

use proptree_reflect::instance::InstanceId;
use proptree_reflect::schema::EnumKey;

// ---------------------------------------------------------------------------
// Errors and operands
// ---------------------------------------------------------------------------

/// Why a condition could not be parsed or evaluated.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConditionError {
    #[error("parse error at {position}: {message}")]
    Parse { position: usize, message: String },

    #[error("no sibling field named '{name}'")]
    UnknownField { name: String },

    #[error("field '{name}' cannot be used in an edit condition")]
    UnsupportedField { name: String },

    #[error("unknown enum '{name}'")]
    UnknownEnum { name: String },

    #[error("enum '{enum_name}' has no value '{variant}'")]
    UnknownEnumValue { enum_name: String, variant: String },

    #[error("operator {op} cannot combine {lhs} and {rhs}")]
    TypeMismatch {
        op: &'static str,
        lhs: &'static str,
        rhs: &'static str,
    },

    #[error("division by zero")]
    DivideByZero,

    #[error("condition evaluated to {found}, not a boolean")]
    NotBoolean { found: &'static str },

    #[error("condition could not be evaluated: no instance is being edited")]
    NoInstances,
}

/// A value an expression operates on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand {
    Bool(bool),
    Number(f64),
    Enum { key: EnumKey, value: i64 },
    Object(Option<InstanceId>),
    Null,
}

impl Operand {
    fn kind_name(&self) -> &'static str {
        match self {
            Operand::Bool(_) => "bool",
            Operand::Number(_) => "number",
            Operand::Enum { .. } => "enum",
            Operand::Object(_) => "object",
            Operand::Null => "nullptr",
        }
    }
}

/// Resolves the names an expression refers to.
pub trait ConditionContext {
    /// Current value of a sibling field.
    fn field(&self, name: &str) -> Result<Operand, ConditionError>;

    /// Value of `EnumType::Variant`.
    fn enum_value(&self, enum_name: &str, variant: &str) -> Result<Operand, ConditionError>;
}

// ---------------------------------------------------------------------------
// AST
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Mul,
    Div,
    Add,
    Sub,
    BitAnd,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinOp {
    fn precedence(self) -> u8 {
        match self {
            BinOp::Mul | BinOp::Div => 4,
            BinOp::Add | BinOp::Sub | BinOp::BitAnd => 3,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => 2,
            BinOp::And | BinOp::Or => 1,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::BitAnd => "&",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Bool(bool),
    Number(f64),
    Null,
    Field(String),
    EnumValue { enum_name: String, variant: String },
    Not(Box<Expr>),
    Neg(Box<Expr>),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

// ---------------------------------------------------------------------------
// EditCondition
// ---------------------------------------------------------------------------

/// A parsed edit condition. Parse failures are kept and reported on every
/// evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct EditCondition {
    text: String,
    expr: Result<Expr, ConditionError>,
}

impl EditCondition {
    pub fn parse(text: &str) -> Self {
        let expr = tokenize(text).and_then(|tokens| {
            let mut parser = Parser { tokens, pos: 0 };
            let expr = parser.expression(0)?;
            match parser.tokens.get(parser.pos) {
                None => Ok(expr),
                Some((position, _)) => Err(ConditionError::Parse {
                    position: *position,
                    message: "unexpected trailing input".to_owned(),
                }),
            }
        });
        if let Err(e) = &expr {
            tracing::warn!(condition = %text, error = %e, "invalid edit condition");
        }
        Self {
            text: text.to_owned(),
            expr,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_valid(&self) -> bool {
        self.expr.is_ok()
    }

    pub fn parse_error(&self) -> Option<&ConditionError> {
        self.expr.as_ref().err()
    }

    /// Evaluate against one instance.
    pub fn evaluate(&self, ctx: &dyn ConditionContext) -> Result<bool, ConditionError> {
        let expr = self.expr.as_ref().map_err(Clone::clone)?;
        match eval(expr, ctx)? {
            Operand::Bool(b) => Ok(b),
            other => Err(ConditionError::NotBoolean {
                found: other.kind_name(),
            }),
        }
    }

    /// The field name when the whole expression is a single field
    /// reference, the shape an inline toggle needs.
    pub fn single_field(&self) -> Option<&str> {
        match &self.expr {
            Ok(Expr::Field(name)) => Some(name.as_str()),
            _ => None,
        }
    }

    /// Every sibling field the expression reads.
    pub fn referenced_fields(&self) -> Vec<&str> {
        fn walk<'e>(expr: &'e Expr, out: &mut Vec<&'e str>) {
            match expr {
                Expr::Field(name) => {
                    if !out.contains(&name.as_str()) {
                        out.push(name);
                    }
                }
                Expr::Not(e) | Expr::Neg(e) => walk(e, out),
                Expr::Binary { lhs, rhs, .. } => {
                    walk(lhs, out);
                    walk(rhs, out);
                }
                _ => {}
            }
        }
        let mut out = Vec::new();
        if let Ok(expr) = &self.expr {
            walk(expr, &mut out);
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    EnumLiteral(String, String),
    Number(f64),
    Bool(bool),
    Null,
    Op(BinOp),
    Not,
    LParen,
    RParen,
}

fn parse_error(position: usize, message: impl Into<String>) -> ConditionError {
    ConditionError::Parse {
        position,
        message: message.into(),
    }
}

fn tokenize(text: &str) -> Result<Vec<(usize, Token)>, ConditionError> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        let start = i;
        let token = match c {
            c if c.is_whitespace() => {
                i += 1;
                continue;
            }
            '(' => Token::LParen,
            ')' => Token::RParen,
            '!' if next == Some('=') => Token::Op(BinOp::Ne),
            '!' => Token::Not,
            '=' if next == Some('=') => Token::Op(BinOp::Eq),
            '<' if next == Some('=') => Token::Op(BinOp::Le),
            '<' => Token::Op(BinOp::Lt),
            '>' if next == Some('=') => Token::Op(BinOp::Ge),
            '>' => Token::Op(BinOp::Gt),
            '&' if next == Some('&') => Token::Op(BinOp::And),
            '&' => Token::Op(BinOp::BitAnd),
            '|' if next == Some('|') => Token::Op(BinOp::Or),
            '+' => Token::Op(BinOp::Add),
            '-' => Token::Op(BinOp::Sub),
            '*' => Token::Op(BinOp::Mul),
            '/' => Token::Op(BinOp::Div),
            c if c.is_ascii_digit() || (c == '.' && next.is_some_and(|n| n.is_ascii_digit())) => {
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let literal: String = chars[start..i].iter().collect();
                let value = literal
                    .parse::<f64>()
                    .map_err(|_| parse_error(start, format!("bad number '{literal}'")))?;
                tokens.push((start, Token::Number(value)));
                continue;
            }
            c if c.is_alphabetic() || c == '_' => {
                let ident = read_ident(&chars, &mut i);
                let token = if chars.get(i) == Some(&':') && chars.get(i + 1) == Some(&':') {
                    i += 2;
                    let variant = read_ident(&chars, &mut i);
                    if variant.is_empty() {
                        return Err(parse_error(i, "expected enum value after '::'"));
                    }
                    Token::EnumLiteral(ident, variant)
                } else if ident.eq_ignore_ascii_case("true") {
                    Token::Bool(true)
                } else if ident.eq_ignore_ascii_case("false") {
                    Token::Bool(false)
                } else if ident == "nullptr" {
                    Token::Null
                } else {
                    Token::Ident(ident)
                };
                tokens.push((start, token));
                continue;
            }
            other => return Err(parse_error(start, format!("unexpected character '{other}'"))),
        };
        i += match &token {
            Token::Op(op) => op.symbol().len(),
            _ => 1,
        };
        tokens.push((start, token));
    }
    Ok(tokens)
}

fn read_ident(chars: &[char], i: &mut usize) -> String {
    let start = *i;
    while *i < chars.len() && (chars[*i].is_alphanumeric() || chars[*i] == '_') {
        *i += 1;
    }
    chars[start..*i].iter().collect()
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
}

impl Parser {
    fn end_position(&self) -> usize {
        self.tokens.last().map_or(0, |(p, _)| p + 1)
    }

    fn next(&mut self) -> Result<(usize, Token), ConditionError> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| parse_error(self.end_position(), "unexpected end of expression"))?;
        self.pos += 1;
        Ok(token)
    }

    fn peek_op(&self) -> Option<BinOp> {
        match self.tokens.get(self.pos) {
            Some((_, Token::Op(op))) => Some(*op),
            _ => None,
        }
    }

    fn expression(&mut self, min_precedence: u8) -> Result<Expr, ConditionError> {
        let mut lhs = self.unary()?;
        while let Some(op) = self.peek_op() {
            if op.precedence() < min_precedence {
                break;
            }
            self.pos += 1;
            let rhs = self.expression(op.precedence() + 1)?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, ConditionError> {
        let (position, token) = self.next()?;
        Ok(match token {
            Token::Not => Expr::Not(Box::new(self.unary()?)),
            Token::Op(BinOp::Sub) => Expr::Neg(Box::new(self.unary()?)),
            Token::LParen => {
                let inner = self.expression(0)?;
                match self.next()? {
                    (_, Token::RParen) => inner,
                    (p, _) => return Err(parse_error(p, "expected ')'")),
                }
            }
            Token::Ident(name) => Expr::Field(name),
            Token::EnumLiteral(enum_name, variant) => Expr::EnumValue { enum_name, variant },
            Token::Number(n) => Expr::Number(n),
            Token::Bool(b) => Expr::Bool(b),
            Token::Null => Expr::Null,
            Token::Op(op) => {
                return Err(parse_error(
                    position,
                    format!("operator '{}' is missing its left operand", op.symbol()),
                ))
            }
            Token::RParen => return Err(parse_error(position, "unexpected ')'")),
        })
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

fn mismatch(op: &'static str, lhs: &Operand, rhs: &Operand) -> ConditionError {
    ConditionError::TypeMismatch {
        op,
        lhs: lhs.kind_name(),
        rhs: rhs.kind_name(),
    }
}

fn eval(expr: &Expr, ctx: &dyn ConditionContext) -> Result<Operand, ConditionError> {
    match expr {
        Expr::Bool(b) => Ok(Operand::Bool(*b)),
        Expr::Number(n) => Ok(Operand::Number(*n)),
        Expr::Null => Ok(Operand::Null),
        Expr::Field(name) => ctx.field(name),
        Expr::EnumValue { enum_name, variant } => ctx.enum_value(enum_name, variant),
        Expr::Not(inner) => match eval(inner, ctx)? {
            Operand::Bool(b) => Ok(Operand::Bool(!b)),
            other => Err(mismatch("!", &other, &other)),
        },
        Expr::Neg(inner) => match eval(inner, ctx)? {
            Operand::Number(n) => Ok(Operand::Number(-n)),
            other => Err(mismatch("-", &other, &other)),
        },
        Expr::Binary { op, lhs, rhs } => {
            // Both sides are always evaluated so an error on either side
            // fails the whole condition.
            let l = eval(lhs, ctx)?;
            let r = eval(rhs, ctx)?;
            apply(*op, l, r)
        }
    }
}

fn apply(op: BinOp, l: Operand, r: Operand) -> Result<Operand, ConditionError> {
    use Operand::*;
    let symbol = op.symbol();
    match op {
        BinOp::And | BinOp::Or => match (l, r) {
            (Bool(a), Bool(b)) => Ok(Bool(if op == BinOp::And { a && b } else { a || b })),
            _ => Err(mismatch(symbol, &l, &r)),
        },
        BinOp::Eq => equals(&l, &r).map(Bool),
        BinOp::Ne => equals(&l, &r).map(|e| Bool(!e)),
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => match (l, r) {
            (Number(a), Number(b)) => Ok(Bool(match op {
                BinOp::Lt => a < b,
                BinOp::Le => a <= b,
                BinOp::Gt => a > b,
                _ => a >= b,
            })),
            _ => Err(mismatch(symbol, &l, &r)),
        },
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div => match (l, r) {
            (Number(_), Number(b)) if op == BinOp::Div && b == 0.0 => {
                Err(ConditionError::DivideByZero)
            }
            (Number(a), Number(b)) => Ok(Number(match op {
                BinOp::Add => a + b,
                BinOp::Sub => a - b,
                BinOp::Mul => a * b,
                _ => a / b,
            })),
            _ => Err(mismatch(symbol, &l, &r)),
        },
        BinOp::BitAnd => match (l, r) {
            (Number(a), Number(b)) => Ok(Number(((a as i64) & (b as i64)) as f64)),
            (Enum { key: ka, value: a }, Enum { key: kb, value: b }) if ka == kb => {
                Ok(Bool(a & b != 0))
            }
            _ => Err(mismatch(symbol, &l, &r)),
        },
    }
}

fn equals(l: &Operand, r: &Operand) -> Result<bool, ConditionError> {
    use Operand::*;
    match (l, r) {
        (Bool(a), Bool(b)) => Ok(a == b),
        (Number(a), Number(b)) => Ok(a == b),
        (Enum { key: ka, value: a }, Enum { key: kb, value: b }) if ka == kb => Ok(a == b),
        (Object(a), Object(b)) => Ok(a == b),
        (Object(a), Null) | (Null, Object(a)) => Ok(a.is_none()),
        (Null, Null) => Ok(true),
        _ => Err(mismatch("==", l, r)),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const MODE: EnumKey = EnumKey(0);
    const OTHER: EnumKey = EnumKey(1);

    struct Ctx;

    impl ConditionContext for Ctx {
        fn field(&self, name: &str) -> Result<Operand, ConditionError> {
            match name {
                "bOn" => Ok(Operand::Bool(true)),
                "bOff" => Ok(Operand::Bool(false)),
                "Count" => Ok(Operand::Number(4.0)),
                "Mode" => Ok(Operand::Enum { key: MODE, value: 2 }),
                "Mask" => Ok(Operand::Enum { key: MODE, value: 6 }),
                "Target" => Ok(Operand::Object(None)),
                _ => Err(ConditionError::UnknownField {
                    name: name.to_owned(),
                }),
            }
        }

        fn enum_value(&self, enum_name: &str, variant: &str) -> Result<Operand, ConditionError> {
            let key = match enum_name {
                "EMode" => MODE,
                "EOther" => OTHER,
                _ => {
                    return Err(ConditionError::UnknownEnum {
                        name: enum_name.to_owned(),
                    })
                }
            };
            let value = match variant {
                "Basic" => 1,
                "Advanced" => 2,
                "Expert" => 4,
                _ => {
                    return Err(ConditionError::UnknownEnumValue {
                        enum_name: enum_name.to_owned(),
                        variant: variant.to_owned(),
                    })
                }
            };
            Ok(Operand::Enum { key, value })
        }
    }

    fn eval_str(text: &str) -> Result<bool, ConditionError> {
        EditCondition::parse(text).evaluate(&Ctx)
    }

    // -- literals and fields ------------------------------------------------

    #[test]
    fn single_field_reference() {
        assert_eq!(eval_str("bOn"), Ok(true));
        assert_eq!(eval_str("!bOn"), Ok(false));
        assert_eq!(EditCondition::parse("bOn").single_field(), Some("bOn"));
        assert_eq!(EditCondition::parse("!bOn").single_field(), None);
    }

    #[test]
    fn boolean_keywords_ignore_case() {
        assert_eq!(eval_str("TRUE"), Ok(true));
        assert_eq!(eval_str("False || bOn"), Ok(true));
    }

    // -- precedence ---------------------------------------------------------

    #[test]
    fn arithmetic_binds_tighter_than_comparison() {
        assert_eq!(eval_str("Count * 2 + 1 == 9"), Ok(true));
        assert_eq!(eval_str("Count - 1 - 1 == 2"), Ok(true));
        assert_eq!(eval_str("(Count + 2) / 3 == 2"), Ok(true));
        assert_eq!(eval_str("-Count < 0"), Ok(true));
    }

    #[test]
    fn logical_operators_are_left_associative() {
        // (false && true) || true
        assert_eq!(eval_str("bOff && bOn || bOn"), Ok(true));
        // (true || true) && false
        assert_eq!(eval_str("bOn || bOn && bOff"), Ok(false));
    }

    // -- enums and objects --------------------------------------------------

    #[test]
    fn enum_comparison_and_mask() {
        assert_eq!(eval_str("Mode == EMode::Advanced"), Ok(true));
        assert_eq!(eval_str("Mode != EMode::Basic"), Ok(true));
        assert_eq!(eval_str("Mask & EMode::Expert"), Ok(true));
        assert_eq!(eval_str("Mask & EMode::Basic"), Ok(false));
        assert!(matches!(
            eval_str("Mode == EOther::Basic"),
            Err(ConditionError::TypeMismatch { .. })
        ));
        assert!(matches!(
            eval_str("Mode == EMode::Missing"),
            Err(ConditionError::UnknownEnumValue { .. })
        ));
    }

    #[test]
    fn null_checks() {
        assert_eq!(eval_str("Target == nullptr"), Ok(true));
        assert_eq!(eval_str("Target != nullptr"), Ok(false));
    }

    // -- failures -----------------------------------------------------------

    #[test]
    fn malformed_expressions_fail() {
        for text in ["Count >", "(bOn", "bOn bOff", "== bOn", "bOn | bOff", "a = b", ""] {
            let condition = EditCondition::parse(text);
            assert!(!condition.is_valid(), "{text:?} should not parse");
            assert!(condition.evaluate(&Ctx).is_err());
        }
    }

    #[test]
    fn evaluation_errors_fail() {
        assert!(matches!(eval_str("Missing"), Err(ConditionError::UnknownField { .. })));
        assert_eq!(eval_str("Count"), Err(ConditionError::NotBoolean { found: "number" }));
        assert_eq!(eval_str("Count / 0 > 1"), Err(ConditionError::DivideByZero));
        // An error on the right-hand side fails even when the left decides.
        assert!(eval_str("bOn || Missing").is_err());
    }

    #[test]
    fn referenced_fields_are_unique() {
        let condition = EditCondition::parse("bOn && (Count > 1 || bOn) && Mode == EMode::Basic");
        assert_eq!(condition.referenced_fields(), vec!["bOn", "Count", "Mode"]);
    }
}
