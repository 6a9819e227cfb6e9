//! Predicate text parser.
//!
//! Turns predicate text into an [`Expr`] tree. The parser accepts more than the
//! remote API supports (`||`, `!`, `!=`, arbitrary method names) so that the
//! visitor can reject those shapes with a precise error instead of a syntax
//! error.
//!
//! ## Grammar
//!
//! ```text
//! lambda   = [IDENT "=>"] orExpr
//! orExpr   = andExpr { "||" andExpr }
//! andExpr  = unary { "&&" unary }
//! unary    = "!" unary | compare
//! compare  = postfix [ compOp postfix ]
//! compOp   = "==" | "!=" | ">" | ">=" | "<" | "<="
//! postfix  = primary { "." IDENT [ "(" args ")" ] }
//! primary  = "(" orExpr ")" | literal | IDENT [ "(" args ")" ]
//! literal  = STRING | NUMBER | "true" | "false" | "null"
//!          | "datetime" "(" STRING ")" | "decimal" "(" NUMBER "," INTEGER ")"
//! ```
//!
//! Without a lambda prefix bare identifiers are members of the parameter,
//! so `email == "a@b.c"` and `x => x.email == "a@b.c"` are the same tree.
//!
//! ## Examples
//!
//! ```text
//! x => x.Email.EndsWith("@galacticempire.co") && x.Status == "ENABLED"
//! x => x.CreatedAt >= datetime("2015-01-01T00:00:00Z")
//! createdAt.Within(2015, 6)
//! Filter("vader")
//! ```

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::ast::{BinaryOp, Constant, Expr, Method};

/// Maximum accepted length of predicate text (bytes).
pub const MAX_EXPR_LENGTH: usize = 4096;

/// Maximum nesting depth of parentheses and unary operators.
pub const MAX_EXPR_DEPTH: usize = 32;

/// Predicate parsing error.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at position {}", self.message, self.position)
    }
}

impl std::error::Error for ParseError {}

/// Parse predicate text into an expression tree.
///
/// # Errors
///
/// Returns an error if the text exceeds [`MAX_EXPR_LENGTH`] bytes or
/// [`MAX_EXPR_DEPTH`] nesting levels, or is not valid syntax.
pub fn parse_expr(input: &str) -> Result<Expr, ParseError> {
    if input.len() > MAX_EXPR_LENGTH {
        return Err(ParseError {
            message: format!(
                "Expression exceeds maximum length ({} bytes, max {})",
                input.len(),
                MAX_EXPR_LENGTH
            ),
            position: 0,
        });
    }

    let mut parser = Parser::new(input);
    parser.parse_lambda_prefix();
    let expr = parser.parse_or_expr()?;

    parser.skip_whitespace();
    if parser.position < parser.input.len() {
        return Err(parser.error(format!(
            "Unexpected input: '{}'",
            &parser.input[parser.position..]
        )));
    }

    Ok(expr)
}

// =============================================================================
// Parser Implementation
// =============================================================================

struct Parser<'a> {
    input: &'a str,
    position: usize,
    depth: usize,
    /// Lambda parameter name, if the text started with `name =>`.
    parameter: Option<&'a str>,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            position: 0,
            depth: 0,
            parameter: None,
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            position: self.position,
        }
    }

    fn enter_scope(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_EXPR_DEPTH {
            return Err(self.error(format!(
                "Expression exceeds maximum nesting depth ({})",
                MAX_EXPR_DEPTH
            )));
        }
        Ok(())
    }

    fn exit_scope(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Consume `ident =>` if present.
    fn parse_lambda_prefix(&mut self) {
        let start = self.position;
        self.skip_whitespace();
        if let Some(name) = self.try_identifier() {
            self.skip_whitespace();
            if self.try_str("=>") {
                self.parameter = Some(name);
                return;
            }
        }
        self.position = start;
    }

    // orExpr = andExpr { "||" andExpr }
    fn parse_or_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_and_expr()?;
        loop {
            self.skip_whitespace();
            if !self.try_str("||") {
                break;
            }
            let right = self.parse_and_expr()?;
            left = left.or(right);
        }
        Ok(left)
    }

    // andExpr = unary { "&&" unary }
    fn parse_and_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary()?;
        loop {
            self.skip_whitespace();
            if !self.try_str("&&") {
                break;
            }
            let right = self.parse_unary()?;
            left = left.and(right);
        }
        Ok(left)
    }

    // unary = "!" unary | compare
    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        self.skip_whitespace();
        if self.peek() == Some('!') && !self.input[self.position..].starts_with("!=") {
            self.advance();
            self.enter_scope()?;
            let inner = self.parse_unary()?;
            self.exit_scope();
            return Ok(inner.negate());
        }
        self.parse_compare()
    }

    // compare = postfix [ compOp postfix ]
    fn parse_compare(&mut self) -> Result<Expr, ParseError> {
        let left = self.parse_postfix()?;
        self.skip_whitespace();

        let Some(op) = self.try_compare_op() else {
            return Ok(left);
        };

        let right = self.parse_postfix()?;
        Ok(Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    fn try_compare_op(&mut self) -> Option<BinaryOp> {
        // Longest match first so ">=" is not read as ">".
        const OPS: [(&str, BinaryOp); 6] = [
            ("==", BinaryOp::Eq),
            ("!=", BinaryOp::Ne),
            (">=", BinaryOp::Ge),
            ("<=", BinaryOp::Le),
            (">", BinaryOp::Gt),
            ("<", BinaryOp::Lt),
        ];
        for (text, op) in OPS {
            if self.try_str(text) {
                return Some(op);
            }
        }
        None
    }

    // postfix = primary { "." IDENT [ "(" args ")" ] }
    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;
        loop {
            self.skip_whitespace();
            if !self.try_char('.') {
                break;
            }
            self.skip_whitespace();
            let Some(name) = self.try_identifier() else {
                return Err(self.error("Expected member name after '.'"));
            };
            self.skip_whitespace();
            if self.try_char('(') {
                let args = self.parse_args()?;
                expr = expr.call(Method::from_name(name), args);
            } else {
                expr = expr.member(name);
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        self.skip_whitespace();

        match self.peek() {
            Some('(') => {
                self.advance();
                self.enter_scope()?;
                let inner = self.parse_or_expr()?;
                self.exit_scope();
                self.skip_whitespace();
                if !self.try_char(')') {
                    return Err(self.error("Expected ')' to close grouped expression"));
                }
                Ok(inner)
            }
            Some('"') => Ok(Expr::Constant(self.parse_string()?)),
            Some(c) if c.is_ascii_digit() || c == '-' => Ok(Expr::Constant(self.parse_number()?)),
            Some(c) if c.is_ascii_alphabetic() || c == '_' => self.parse_identifier_expr(),
            _ => Err(self.error("Expected expression")),
        }
    }

    fn parse_identifier_expr(&mut self) -> Result<Expr, ParseError> {
        let start = self.position;
        let Some(name) = self.try_identifier() else {
            return Err(self.error("Expected identifier"));
        };

        match name {
            "true" => return Ok(Expr::Constant(Constant::Bool(true))),
            "false" => return Ok(Expr::Constant(Constant::Bool(false))),
            "null" => return Ok(Expr::Constant(Constant::Null)),
            _ => {}
        }

        if self.parameter == Some(name) {
            return Ok(Expr::Parameter);
        }

        self.skip_whitespace();
        if self.try_char('(') {
            return match name {
                "datetime" => self.parse_datetime_args(start),
                "decimal" => self.parse_decimal_args(start),
                _ if self.parameter.is_none() => {
                    let args = self.parse_args()?;
                    Ok(Expr::Parameter.call(Method::from_name(name), args))
                }
                _ => Err(ParseError {
                    message: format!("Unknown function '{}'", name),
                    position: start,
                }),
            };
        }

        if self.parameter.is_some() {
            return Err(ParseError {
                message: format!("Unknown identifier '{}'", name),
                position: start,
            });
        }

        Ok(Expr::field(name))
    }

    /// Arguments after an opening '('; consumes the closing ')'.
    fn parse_args(&mut self) -> Result<Vec<Expr>, ParseError> {
        self.enter_scope()?;
        let mut args = Vec::new();
        self.skip_whitespace();
        if !self.try_char(')') {
            loop {
                args.push(self.parse_or_expr()?);
                self.skip_whitespace();
                if self.try_char(')') {
                    break;
                }
                if !self.try_char(',') {
                    return Err(self.error("Expected ',' or ')' in argument list"));
                }
            }
        }
        self.exit_scope();
        Ok(args)
    }

    fn parse_datetime_args(&mut self, start: usize) -> Result<Expr, ParseError> {
        self.skip_whitespace();
        let Constant::String(text) = self.parse_string()? else {
            return Err(self.error("Expected string literal"));
        };
        self.skip_whitespace();
        if !self.try_char(')') {
            return Err(self.error("Expected ')' after datetime literal"));
        }
        let parsed = DateTime::parse_from_rfc3339(&text).map_err(|e| ParseError {
            message: format!("Invalid datetime '{}': {}", text, e),
            position: start,
        })?;
        Ok(Expr::Constant(Constant::DateTime(
            parsed.with_timezone(&Utc),
        )))
    }

    fn parse_decimal_args(&mut self, start: usize) -> Result<Expr, ParseError> {
        self.skip_whitespace();
        let value = match self.parse_number()? {
            Constant::Integer(i) => Decimal::from(i),
            Constant::Decimal { value, .. } => value,
            _ => return Err(self.error("Expected number")),
        };
        self.skip_whitespace();
        if !self.try_char(',') {
            return Err(self.error("Expected ',' before decimal scale"));
        }
        self.skip_whitespace();
        let scale = match self.parse_number()? {
            Constant::Integer(i) if (0..=28).contains(&i) => i as u32,
            _ => {
                return Err(ParseError {
                    message: "Decimal scale must be an integer between 0 and 28".to_string(),
                    position: start,
                });
            }
        };
        self.skip_whitespace();
        if !self.try_char(')') {
            return Err(self.error("Expected ')' after decimal scale"));
        }
        Ok(Expr::Constant(Constant::decimal_with_scale(value, scale)))
    }

    fn parse_string(&mut self) -> Result<Constant, ParseError> {
        if !self.try_char('"') {
            return Err(self.error("Expected '\"' to start string"));
        }

        let mut value = String::new();

        loop {
            match self.peek() {
                None => return Err(self.error("Unterminated string")),
                Some('"') => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    let escaped = match self.peek() {
                        Some('"') => '"',
                        Some('\\') => '\\',
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('r') => '\r',
                        _ => return Err(self.error("Invalid escape sequence")),
                    };
                    value.push(escaped);
                    self.advance();
                }
                Some(c) => {
                    value.push(c);
                    self.advance();
                }
            }
        }

        Ok(Constant::String(value))
    }

    fn parse_number(&mut self) -> Result<Constant, ParseError> {
        let start = self.position;

        if self.peek() == Some('-') {
            self.advance();
        }

        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }

        let mut is_decimal = false;
        if self.peek() == Some('.')
            && self.input[self.position + 1..]
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_digit())
        {
            is_decimal = true;
            self.advance();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }

        let text = &self.input[start..self.position];
        let invalid = || ParseError {
            message: format!("Invalid number: '{}'", text),
            position: start,
        };

        if is_decimal {
            Decimal::from_str(text)
                .map(Constant::decimal)
                .map_err(|_| invalid())
        } else {
            text.parse::<i64>()
                .map(Constant::Integer)
                .map_err(|_| invalid())
        }
    }

    // Helper methods

    fn peek(&self) -> Option<char> {
        self.input[self.position..].chars().next()
    }

    fn advance(&mut self) {
        if let Some(c) = self.peek() {
            self.position += c.len_utf8();
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|c| c.is_whitespace()) {
            self.advance();
        }
    }

    fn try_char(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn try_str(&mut self, expected: &str) -> bool {
        if self.input[self.position..].starts_with(expected) {
            self.position += expected.len();
            true
        } else {
            false
        }
    }

    fn try_identifier(&mut self) -> Option<&'a str> {
        let start = self.position;
        if !self
            .peek()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        {
            return None;
        }
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            self.advance();
        }
        let input = self.input;
        Some(&input[start..self.position])
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use rust_decimal::Decimal;

    use super::*;

    #[test]
    fn test_lambda_and_bare_forms_are_equivalent() {
        let lambda = parse_expr(r#"x => x.Email == "vader@empire.co""#).unwrap();
        let bare = parse_expr(r#"Email == "vader@empire.co""#).unwrap();
        assert_eq!(lambda, bare);
        assert_eq!(lambda, Expr::field("Email").equal_to("vader@empire.co"));
    }

    #[test]
    fn test_method_chain() {
        let expr = parse_expr(r#"a => a.Email.EndsWith("@galacticempire.co")"#).unwrap();
        assert_eq!(expr, Expr::field("Email").ends_with("@galacticempire.co"));
    }

    #[test]
    fn test_conjunction_is_left_associative() {
        let expr = parse_expr(r#"a == "1" && b == "2" && c == "3""#).unwrap();
        let expected = Expr::field("a")
            .equal_to("1")
            .and(Expr::field("b").equal_to("2"))
            .and(Expr::field("c").equal_to("3"));
        assert_eq!(expr, expected);
    }

    #[test]
    fn test_or_binds_looser_than_and() {
        let expr = parse_expr(r#"a == "1" || b == "2" && c == "3""#).unwrap();
        match expr {
            Expr::Binary {
                op: BinaryOp::Or,
                right,
                ..
            } => assert!(matches!(
                *right,
                Expr::Binary {
                    op: BinaryOp::And,
                    ..
                }
            )),
            other => panic!("Expected Or, got {:?}", other),
        }
    }

    #[test]
    fn test_comparison_operators() {
        let ops = [
            ("==", BinaryOp::Eq),
            ("!=", BinaryOp::Ne),
            (">", BinaryOp::Gt),
            (">=", BinaryOp::Ge),
            ("<", BinaryOp::Lt),
            ("<=", BinaryOp::Le),
        ];
        for (text, expected) in ops {
            let expr = parse_expr(&format!("createdAt {} 5", text)).unwrap();
            match expr {
                Expr::Binary { op, .. } => assert_eq!(op, expected, "operator {}", text),
                other => panic!("Expected Binary for {}, got {:?}", text, other),
            }
        }
    }

    #[test]
    fn test_not_operator() {
        let expr = parse_expr(r#"!(status == "ENABLED")"#).unwrap();
        assert!(matches!(expr, Expr::Not(_)));
    }

    #[test]
    fn test_within_arguments() {
        let expr = parse_expr("x => x.CreatedAt.Within(2015, 1, 5)").unwrap();
        assert_eq!(expr, Expr::field("CreatedAt").within(&[2015, 1, 5]));
    }

    #[test]
    fn test_bare_filter_call_targets_parameter() {
        let expr = parse_expr(r#"Filter("vader")"#).unwrap();
        assert_eq!(expr, Expr::free_text("vader"));

        let lambda = parse_expr(r#"x => x.Filter("vader")"#).unwrap();
        assert_eq!(lambda, Expr::free_text("vader"));
    }

    #[test]
    fn test_datetime_literal() {
        let expr = parse_expr(r#"createdAt >= datetime("2015-01-01T00:00:00Z")"#).unwrap();
        let expected = Utc.with_ymd_and_hms(2015, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(expr, Expr::field("createdAt").ge(expected));
    }

    #[test]
    fn test_decimal_literals_keep_scale() {
        let expr = parse_expr("balance == 12.50").unwrap();
        match expr {
            Expr::Binary { right, .. } => match *right {
                Expr::Constant(Constant::Decimal { value, scale }) => {
                    assert_eq!(value, Decimal::new(1250, 2));
                    assert_eq!(value.scale(), 2);
                    assert_eq!(scale, None);
                }
                other => panic!("Expected decimal, got {:?}", other),
            },
            other => panic!("Expected Binary, got {:?}", other),
        }

        let annotated = parse_expr("balance == decimal(12.5, 3)").unwrap();
        assert_eq!(
            annotated,
            Expr::field("balance").equal_to(Constant::decimal_with_scale(Decimal::new(125, 1), 3))
        );
    }

    #[test]
    fn test_escaped_string() {
        let expr = parse_expr(r#"name == "Darth \"Vader\"""#).unwrap();
        assert_eq!(expr, Expr::field("name").equal_to("Darth \"Vader\""));
    }

    #[test]
    fn test_unknown_identifier_with_lambda() {
        let err = parse_expr(r#"x => y.Email == "a""#).unwrap_err();
        assert!(err.message.contains("Unknown identifier"), "{}", err);
    }

    #[test]
    fn test_invalid_datetime() {
        let err = parse_expr(r#"createdAt > datetime("yesterday")"#).unwrap_err();
        assert!(err.message.contains("Invalid datetime"), "{}", err);
    }

    #[test]
    fn test_unterminated_string() {
        let err = parse_expr(r#"email == "vader"#).unwrap_err();
        assert!(err.message.contains("Unterminated string"));
    }

    #[test]
    fn test_trailing_input() {
        let err = parse_expr(r#"email == "a" extra"#).unwrap_err();
        assert!(err.message.contains("Unexpected input"));
    }

    #[test]
    fn test_empty_input() {
        assert!(parse_expr("").is_err());
        assert!(parse_expr("   ").is_err());
    }

    #[test]
    fn test_exceeds_max_length() {
        let value = "x".repeat(MAX_EXPR_LENGTH);
        let err = parse_expr(&format!("email == \"{}\"", value)).unwrap_err();
        assert!(err.message.contains("maximum length"));
    }

    #[test]
    fn test_depth_limit() {
        let mut at_limit = "a == 1".to_string();
        for _ in 0..MAX_EXPR_DEPTH {
            at_limit = format!("({})", at_limit);
        }
        assert!(parse_expr(&at_limit).is_ok());

        let over_limit = format!("({})", at_limit);
        let err = parse_expr(&over_limit).unwrap_err();
        assert!(err.message.contains("maximum nesting depth"));
    }
}
