//! Query expression tree.
//!
//! The tree only describes what a caller wrote; it says nothing about whether
//! the shape is supported. The [`visitor`](super::visitor) and
//! [`compiler`](super::compiler) match on it exhaustively and reject whatever
//! the remote API cannot express.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::parser::parse_expr;
use crate::cache::ResourceKind;

/// A literal value appearing in an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    String(String),
    Bool(bool),
    Integer(i64),
    /// A decimal number. `scale` overrides the number of rendered fractional
    /// digits; without it the value renders at its own scale.
    Decimal {
        value: Decimal,
        scale: Option<u32>,
    },
    DateTime(DateTime<Utc>),
    Null,
}

impl Constant {
    pub fn decimal(value: Decimal) -> Self {
        Constant::Decimal { value, scale: None }
    }

    pub fn decimal_with_scale(value: Decimal, scale: u32) -> Self {
        Constant::Decimal {
            value,
            scale: Some(scale),
        }
    }

    /// Short name of the constant's type, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Constant::String(_) => "string",
            Constant::Bool(_) => "boolean",
            Constant::Integer(_) => "integer",
            Constant::Decimal { .. } => "decimal",
            Constant::DateTime(_) => "datetime",
            Constant::Null => "null",
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::String(s) => write!(f, "\"{}\"", s.replace('"', "\\\"")),
            Constant::Bool(b) => write!(f, "{}", b),
            Constant::Integer(i) => write!(f, "{}", i),
            Constant::Decimal { value, scale: None } => write!(f, "{}", value),
            Constant::Decimal {
                value,
                scale: Some(scale),
            } => write!(f, "decimal({}, {})", value, scale),
            Constant::DateTime(dt) => write!(f, "datetime(\"{}\")", dt.to_rfc3339()),
            Constant::Null => write!(f, "null"),
        }
    }
}

impl From<&str> for Constant {
    fn from(value: &str) -> Self {
        Constant::String(value.to_string())
    }
}

impl From<String> for Constant {
    fn from(value: String) -> Self {
        Constant::String(value)
    }
}

impl From<bool> for Constant {
    fn from(value: bool) -> Self {
        Constant::Bool(value)
    }
}

impl From<i64> for Constant {
    fn from(value: i64) -> Self {
        Constant::Integer(value)
    }
}

impl From<Decimal> for Constant {
    fn from(value: Decimal) -> Self {
        Constant::decimal(value)
    }
}

impl From<DateTime<Utc>> for Constant {
    fn from(value: DateTime<Utc>) -> Self {
        Constant::DateTime(value)
    }
}

/// Binary operators understood by the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    And,
    Or,
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl BinaryOp {
    /// The operator seen from the other side (`a < b` ⇔ `b > a`).
    pub fn flipped(self) -> Self {
        match self {
            BinaryOp::Gt => BinaryOp::Lt,
            BinaryOp::Ge => BinaryOp::Le,
            BinaryOp::Lt => BinaryOp::Gt,
            BinaryOp::Le => BinaryOp::Ge,
            other => other,
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
        };
        write!(f, "{}", s)
    }
}

/// Method names recognised on members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    StartsWith,
    EndsWith,
    Equals,
    Contains,
    /// Truncated-precision date match: `createdAt.Within(2015, 1)`.
    Within,
    /// Free-text search on the parameter itself: `x.Filter("vader")`.
    Filter,
    Other(String),
}

impl Method {
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "startswith" => Method::StartsWith,
            "endswith" => Method::EndsWith,
            "equals" => Method::Equals,
            "contains" => Method::Contains,
            "within" => Method::Within,
            "filter" => Method::Filter,
            _ => Method::Other(name.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Method::StartsWith => "StartsWith",
            Method::EndsWith => "EndsWith",
            Method::Equals => "Equals",
            Method::Contains => "Contains",
            Method::Within => "Within",
            Method::Filter => "Filter",
            Method::Other(name) => name,
        }
    }
}

/// An expression over the query parameter (the resource being filtered).
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// The lambda parameter itself (`x` in `x => ...`).
    Parameter,
    Member {
        target: Box<Expr>,
        name: String,
    },
    Constant(Constant),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Not(Box<Expr>),
    Call {
        target: Box<Expr>,
        method: Method,
        args: Vec<Expr>,
    },
}

impl Expr {
    /// Member access on the parameter: `x.<name>`.
    pub fn field(name: impl Into<String>) -> Self {
        Expr::Member {
            target: Box::new(Expr::Parameter),
            name: name.into(),
        }
    }

    pub fn constant(value: impl Into<Constant>) -> Self {
        Expr::Constant(value.into())
    }

    /// Free-text search clause: `x.Filter(term)`.
    pub fn free_text(term: impl Into<String>) -> Self {
        Expr::Parameter.call(Method::Filter, vec![Expr::constant(term.into())])
    }

    /// Parse predicate text such as `x => x.Email.EndsWith("@example.com")`.
    pub fn parse(input: &str) -> Result<Self, super::parser::ParseError> {
        parse_expr(input)
    }

    pub fn member(self, name: impl Into<String>) -> Self {
        Expr::Member {
            target: Box::new(self),
            name: name.into(),
        }
    }

    pub fn call(self, method: Method, args: Vec<Expr>) -> Self {
        Expr::Call {
            target: Box::new(self),
            method,
            args,
        }
    }

    fn binary(self, op: BinaryOp, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(self),
            right: Box::new(right),
        }
    }

    pub fn and(self, right: Expr) -> Self {
        self.binary(BinaryOp::And, right)
    }

    pub fn or(self, right: Expr) -> Self {
        self.binary(BinaryOp::Or, right)
    }

    pub fn negate(self) -> Self {
        Expr::Not(Box::new(self))
    }

    pub fn equal_to(self, value: impl Into<Constant>) -> Self {
        self.binary(BinaryOp::Eq, Expr::constant(value))
    }

    pub fn not_equal_to(self, value: impl Into<Constant>) -> Self {
        self.binary(BinaryOp::Ne, Expr::constant(value))
    }

    pub fn gt(self, value: impl Into<Constant>) -> Self {
        self.binary(BinaryOp::Gt, Expr::constant(value))
    }

    pub fn ge(self, value: impl Into<Constant>) -> Self {
        self.binary(BinaryOp::Ge, Expr::constant(value))
    }

    pub fn lt(self, value: impl Into<Constant>) -> Self {
        self.binary(BinaryOp::Lt, Expr::constant(value))
    }

    pub fn le(self, value: impl Into<Constant>) -> Self {
        self.binary(BinaryOp::Le, Expr::constant(value))
    }

    pub fn starts_with(self, value: impl Into<String>) -> Self {
        self.call(Method::StartsWith, vec![Expr::constant(value.into())])
    }

    pub fn ends_with(self, value: impl Into<String>) -> Self {
        self.call(Method::EndsWith, vec![Expr::constant(value.into())])
    }

    pub fn contains(self, value: impl Into<String>) -> Self {
        self.call(Method::Contains, vec![Expr::constant(value.into())])
    }

    pub fn equals(self, value: impl Into<String>) -> Self {
        self.call(Method::Equals, vec![Expr::constant(value.into())])
    }

    /// `Within(year[, month[, day[, hour[, minute[, second]]]]])`.
    pub fn within(self, components: &[i64]) -> Self {
        let args = components.iter().map(|c| Expr::constant(*c)).collect();
        self.call(Method::Within, args)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Parameter => write!(f, "x"),
            Expr::Member { target, name } => write!(f, "{}.{}", target, name),
            Expr::Constant(c) => write!(f, "{}", c),
            Expr::Binary { op, left, right } => write!(f, "({} {} {})", left, op, right),
            Expr::Not(inner) => write!(f, "!({})", inner),
            Expr::Call {
                target,
                method,
                args,
            } => {
                write!(f, "{}.{}(", target, method.name())?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Projection carried by a `Select` operator.
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    /// `x => x`, inserted by paging adapters.
    Identity,
    Expr(Expr),
}

/// One operator in a query chain, in the order the caller applied it.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOp {
    Where(Expr),
    OrderBy { key: Expr, descending: bool },
    ThenBy { key: Expr, descending: bool },
    Skip(u64),
    Take(u64),
    First,
    Single,
    Any,
    /// Free-text search term.
    Filter(String),
    Expand {
        selector: Expr,
        offset: Option<u64>,
        limit: Option<u64>,
    },
    Select(Projection),
    Join,
    GroupJoin,
    /// Any operator outside the supported set (`GroupBy`, `Distinct`, ...).
    Other(String),
}

impl QueryOp {
    pub fn name(&self) -> &str {
        match self {
            QueryOp::Where(_) => "Where",
            QueryOp::OrderBy {
                descending: false, ..
            } => "OrderBy",
            QueryOp::OrderBy {
                descending: true, ..
            } => "OrderByDescending",
            QueryOp::ThenBy {
                descending: false, ..
            } => "ThenBy",
            QueryOp::ThenBy {
                descending: true, ..
            } => "ThenByDescending",
            QueryOp::Skip(_) => "Skip",
            QueryOp::Take(_) => "Take",
            QueryOp::First => "First",
            QueryOp::Single => "Single",
            QueryOp::Any => "Any",
            QueryOp::Filter(_) => "Filter",
            QueryOp::Expand { .. } => "Expand",
            QueryOp::Select(_) => "Select",
            QueryOp::Join => "Join",
            QueryOp::GroupJoin => "GroupJoin",
            QueryOp::Other(name) => name,
        }
    }
}

/// Conversion into an [`Expr`], parsing text where necessary.
pub trait IntoExpr {
    fn into_expr(self) -> Result<Expr, super::parser::ParseError>;
}

impl IntoExpr for Expr {
    fn into_expr(self) -> Result<Expr, super::parser::ParseError> {
        Ok(self)
    }
}

impl IntoExpr for &str {
    fn into_expr(self) -> Result<Expr, super::parser::ParseError> {
        parse_expr(self)
    }
}

impl IntoExpr for String {
    fn into_expr(self) -> Result<Expr, super::parser::ParseError> {
        parse_expr(&self)
    }
}

/// A declarative query against one resource collection.
///
/// Builder methods never fail. A predicate that does not parse is remembered
/// and reported by [`compile`](super::compile_query), so a query either
/// compiles completely or not at all.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    source: ResourceKind,
    ops: Vec<QueryOp>,
    deferred_error: Option<super::parser::ParseError>,
}

impl Query {
    pub fn new(source: ResourceKind) -> Self {
        Self {
            source,
            ops: Vec::new(),
            deferred_error: None,
        }
    }

    pub fn source(&self) -> ResourceKind {
        self.source
    }

    pub fn ops(&self) -> &[QueryOp] {
        &self.ops
    }

    pub(crate) fn deferred_error(&self) -> Option<&super::parser::ParseError> {
        self.deferred_error.as_ref()
    }

    /// Append a raw operator.
    pub fn push(mut self, op: QueryOp) -> Self {
        self.ops.push(op);
        self
    }

    fn with_expr(self, expr: impl IntoExpr, build: impl FnOnce(Expr) -> QueryOp) -> Self {
        match expr.into_expr() {
            Ok(expr) => self.push(build(expr)),
            Err(err) => {
                let mut query = self;
                if query.deferred_error.is_none() {
                    query.deferred_error = Some(err);
                }
                query
            }
        }
    }

    pub fn where_(self, predicate: impl IntoExpr) -> Self {
        self.with_expr(predicate, QueryOp::Where)
    }

    pub fn order_by(self, key: impl IntoExpr) -> Self {
        self.with_expr(key, |key| QueryOp::OrderBy {
            key,
            descending: false,
        })
    }

    pub fn order_by_descending(self, key: impl IntoExpr) -> Self {
        self.with_expr(key, |key| QueryOp::OrderBy {
            key,
            descending: true,
        })
    }

    pub fn then_by(self, key: impl IntoExpr) -> Self {
        self.with_expr(key, |key| QueryOp::ThenBy {
            key,
            descending: false,
        })
    }

    pub fn then_by_descending(self, key: impl IntoExpr) -> Self {
        self.with_expr(key, |key| QueryOp::ThenBy {
            key,
            descending: true,
        })
    }

    pub fn skip(self, count: u64) -> Self {
        self.push(QueryOp::Skip(count))
    }

    pub fn take(self, count: u64) -> Self {
        self.push(QueryOp::Take(count))
    }

    pub fn first(self) -> Self {
        self.push(QueryOp::First)
    }

    pub fn single(self) -> Self {
        self.push(QueryOp::Single)
    }

    pub fn any(self) -> Self {
        self.push(QueryOp::Any)
    }

    pub fn filter(self, term: impl Into<String>) -> Self {
        self.push(QueryOp::Filter(term.into()))
    }

    pub fn expand(self, selector: impl IntoExpr) -> Self {
        self.with_expr(selector, |selector| QueryOp::Expand {
            selector,
            offset: None,
            limit: None,
        })
    }

    pub fn expand_paged(
        self,
        selector: impl IntoExpr,
        offset: Option<u64>,
        limit: Option<u64>,
    ) -> Self {
        self.with_expr(selector, |selector| QueryOp::Expand {
            selector,
            offset,
            limit,
        })
    }
}
