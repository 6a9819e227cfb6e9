//! Turns one `Where` predicate into attribute terms.

use chrono::{DateTime, Utc};

use super::{
    ast::{BinaryOp, Constant, Expr, Method},
    error::{QueryError, QueryResult},
    model::QueryModel,
    schema::{FieldDef, FieldKind, ResourceSchema},
    terms::{
        AttributeTerm, DateIntervalTerm, DateShorthandTerm, ScalarTerm, ScalarValue, StringMatch,
        StringTerm,
    },
};

/// Walks a predicate against one collection's field table.
///
/// Only conjunctions of field conditions are accepted. Every other shape is
/// rejected, and terms are only added to the model once the whole predicate
/// has been accepted.
pub struct PredicateVisitor<'a> {
    schema: &'a ResourceSchema,
}

impl<'a> PredicateVisitor<'a> {
    pub fn new(schema: &'a ResourceSchema) -> Self {
        Self { schema }
    }

    pub fn visit(&self, predicate: &Expr, model: &mut QueryModel) -> QueryResult<()> {
        let mut terms = Vec::new();
        self.collect(predicate, &mut terms)?;
        for term in terms {
            model.add_term(term)?;
        }
        Ok(())
    }

    fn collect(&self, expr: &Expr, terms: &mut Vec<AttributeTerm>) -> QueryResult<()> {
        match expr {
            Expr::Binary {
                op: BinaryOp::And,
                left,
                right,
            } => {
                self.collect(left, terms)?;
                self.collect(right, terms)
            }
            Expr::Binary {
                op: BinaryOp::Or, ..
            } => Err(QueryError::UnsupportedOperator(
                "|| (only && is supported in Where)".to_string(),
            )),
            Expr::Binary {
                op: BinaryOp::Ne, ..
            } => Err(QueryError::UnsupportedOperator("!=".to_string())),
            Expr::Binary { op, left, right } => {
                terms.push(self.comparison(*op, left, right)?);
                Ok(())
            }
            Expr::Not(_) => Err(QueryError::UnsupportedOperator("!".to_string())),
            Expr::Call {
                target,
                method,
                args,
            } => {
                terms.push(self.call(target, method, args)?);
                Ok(())
            }
            other => Err(QueryError::shape(format!(
                "'{}' is not a boolean condition",
                other
            ))),
        }
    }

    /// Resolve `x.<name>` against the field table.
    fn field(&self, expr: &Expr) -> QueryResult<&'a FieldDef> {
        match expr {
            Expr::Member { target, name } if matches!(**target, Expr::Parameter) => self
                .schema
                .fields
                .lookup(name)
                .ok_or_else(|| QueryError::UnknownField {
                    field: name.clone(),
                    resource: self.schema.kind.to_string(),
                }),
            Expr::Member { .. } => Err(QueryError::shape(format!(
                "'{}' is not a direct field of the queried resource",
                expr
            ))),
            other => Err(QueryError::shape(format!("'{}' is not a field", other))),
        }
    }

    fn comparison(&self, op: BinaryOp, left: &Expr, right: &Expr) -> QueryResult<AttributeTerm> {
        let (member, constant, op) = match (left, right) {
            (_, Expr::Constant(c)) => (left, c, op),
            (Expr::Constant(c), _) => (right, c, op.flipped()),
            _ => {
                return Err(QueryError::shape(format!(
                    "comparison '{} {} {}' needs a constant on one side",
                    left, op, right
                )));
            }
        };
        let field = self.field(member)?;

        match op {
            BinaryOp::Eq => self.equality(field, constant),
            BinaryOp::Gt | BinaryOp::Ge | BinaryOp::Lt | BinaryOp::Le => {
                if field.kind != FieldKind::Date {
                    return Err(QueryError::shape(format!(
                        "'{}' comparison is only supported on date fields, '{}' is not one",
                        op, field.wire
                    )));
                }
                let date = date_constant(field, constant)?;
                let term = match op {
                    BinaryOp::Gt => DateIntervalTerm::starting(&field.wire, date, false),
                    BinaryOp::Ge => DateIntervalTerm::starting(&field.wire, date, true),
                    BinaryOp::Lt => DateIntervalTerm::ending(&field.wire, date, false),
                    _ => DateIntervalTerm::ending(&field.wire, date, true),
                };
                Ok(AttributeTerm::DateInterval(term))
            }
            other => Err(QueryError::UnsupportedOperator(other.to_string())),
        }
    }

    fn equality(&self, field: &FieldDef, constant: &Constant) -> QueryResult<AttributeTerm> {
        let mismatch = || QueryError::UnsupportedConstant {
            field: field.wire.clone(),
            detail: format!(
                "{} value is not comparable with a {:?} field",
                constant.type_name(),
                field.kind
            ),
        };
        let scalar = |value: ScalarValue| -> QueryResult<AttributeTerm> {
            Ok(AttributeTerm::Scalar(ScalarTerm {
                field: field.wire.clone(),
                value,
            }))
        };

        match (field.kind, constant) {
            (FieldKind::String, Constant::String(value)) => Ok(AttributeTerm::String(StringTerm {
                field: field.wire.clone(),
                value: value.clone(),
                match_type: StringMatch::Equals,
            })),
            (FieldKind::Enum, Constant::String(value)) => {
                scalar(ScalarValue::Enum(value.to_ascii_uppercase()))
            }
            (FieldKind::Boolean, Constant::Bool(value)) => scalar(ScalarValue::Bool(*value)),
            (FieldKind::Number, Constant::Integer(value)) => scalar(ScalarValue::Integer(*value)),
            (FieldKind::Number, Constant::Decimal { value, scale }) => {
                scalar(ScalarValue::Decimal {
                    value: *value,
                    scale: *scale,
                })
            }
            (FieldKind::Date, Constant::DateTime(date)) => {
                Ok(AttributeTerm::DateInterval(DateIntervalTerm {
                    field: field.wire.clone(),
                    start: Some(*date),
                    start_inclusive: true,
                    end: Some(*date),
                    end_inclusive: true,
                }))
            }
            _ => Err(mismatch()),
        }
    }

    fn call(&self, target: &Expr, method: &Method, args: &[Expr]) -> QueryResult<AttributeTerm> {
        let match_type = match method {
            Method::StartsWith => StringMatch::StartsWith,
            Method::EndsWith => StringMatch::EndsWith,
            Method::Equals => StringMatch::Equals,
            Method::Contains => StringMatch::Contains,
            Method::Within => return self.within(target, args),
            Method::Filter => {
                return Err(QueryError::shape(
                    "Filter must be the whole Where clause",
                ));
            }
            Method::Other(name) => return Err(QueryError::UnsupportedOperator(name.clone())),
        };

        let field = self.field(target)?;
        if field.kind != FieldKind::String {
            return Err(QueryError::shape(format!(
                "{} is only supported on string fields, '{}' is not one",
                method.name(),
                field.wire
            )));
        }

        match args {
            [Expr::Constant(Constant::String(value))] => Ok(AttributeTerm::String(StringTerm {
                field: field.wire.clone(),
                value: value.clone(),
                match_type,
            })),
            [Expr::Constant(other)] => Err(QueryError::UnsupportedConstant {
                field: field.wire.clone(),
                detail: format!("{} takes a string, got {}", method.name(), other.type_name()),
            }),
            [_] => Err(QueryError::shape(format!(
                "{} argument must be a constant",
                method.name()
            ))),
            _ => Err(QueryError::shape(format!(
                "{} takes exactly one argument, got {}",
                method.name(),
                args.len()
            ))),
        }
    }

    fn within(&self, target: &Expr, args: &[Expr]) -> QueryResult<AttributeTerm> {
        let field = self.field(target)?;
        if field.kind != FieldKind::Date {
            return Err(QueryError::shape(format!(
                "Within is only supported on date fields, '{}' is not one",
                field.wire
            )));
        }

        let components = args
            .iter()
            .map(|arg| match arg {
                Expr::Constant(Constant::Integer(value)) => Ok(*value),
                other => Err(QueryError::UnsupportedConstant {
                    field: field.wire.clone(),
                    detail: format!("Within takes integer components, got '{}'", other),
                }),
            })
            .collect::<QueryResult<Vec<_>>>()?;

        DateShorthandTerm::from_components(&field.wire, &components)
            .map(AttributeTerm::DateShorthand)
    }
}

fn date_constant(field: &FieldDef, constant: &Constant) -> QueryResult<DateTime<Utc>> {
    match constant {
        Constant::DateTime(date) => Ok(*date),
        other => Err(QueryError::UnsupportedConstant {
            field: field.wire.clone(),
            detail: format!("expected a datetime, got {}", other.type_name()),
        }),
    }
}
