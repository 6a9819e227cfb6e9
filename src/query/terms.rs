//! Compiled filter, ordering and expansion terms.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::{
    error::{QueryError, QueryResult},
    schema::ExpansionKind,
};

/// How a string term matches its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringMatch {
    Equals,
    Contains,
    StartsWith,
    EndsWith,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StringTerm {
    pub field: String,
    pub value: String,
    pub match_type: StringMatch,
}

/// A possibly half-open date range.
///
/// Inclusivity flags are meaningful only when the matching bound is set.
#[derive(Debug, Clone, PartialEq)]
pub struct DateIntervalTerm {
    pub field: String,
    pub start: Option<DateTime<Utc>>,
    pub start_inclusive: bool,
    pub end: Option<DateTime<Utc>>,
    pub end_inclusive: bool,
}

impl DateIntervalTerm {
    pub fn starting(field: impl Into<String>, start: DateTime<Utc>, inclusive: bool) -> Self {
        Self {
            field: field.into(),
            start: Some(start),
            start_inclusive: inclusive,
            end: None,
            end_inclusive: false,
        }
    }

    pub fn ending(field: impl Into<String>, end: DateTime<Utc>, inclusive: bool) -> Self {
        Self {
            field: field.into(),
            start: None,
            start_inclusive: false,
            end: Some(end),
            end_inclusive: inclusive,
        }
    }

    /// Merge another contribution for the same field into this one.
    ///
    /// Each half may be populated once.
    pub fn merge(&mut self, other: &DateIntervalTerm) -> QueryResult<()> {
        if other.start.is_some() {
            if self.start.is_some() {
                return Err(QueryError::ConflictingDateTerm {
                    field: self.field.clone(),
                    half: "start",
                });
            }
            self.start = other.start;
            self.start_inclusive = other.start_inclusive;
        }
        if other.end.is_some() {
            if self.end.is_some() {
                return Err(QueryError::ConflictingDateTerm {
                    field: self.field.clone(),
                    half: "end",
                });
            }
            self.end = other.end;
            self.end_inclusive = other.end_inclusive;
        }
        Ok(())
    }
}

/// A truncated-precision date, e.g. "anything in March 2015".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateShorthandTerm {
    pub field: String,
    pub year: i32,
    pub month: Option<u32>,
    pub day: Option<u32>,
    pub hour: Option<u32>,
    pub minute: Option<u32>,
    pub second: Option<u32>,
}

impl DateShorthandTerm {
    /// Build from `[year, month, day, hour, minute, second]` prefix components.
    pub fn from_components(field: impl Into<String>, components: &[i64]) -> QueryResult<Self> {
        let field = field.into();
        let invalid = |detail: String| QueryError::UnsupportedConstant {
            field: field.clone(),
            detail,
        };

        if components.is_empty() || components.len() > 6 {
            return Err(invalid(format!(
                "Within takes 1 to 6 components, got {}",
                components.len()
            )));
        }

        const RANGES: [(&str, i64, i64); 6] = [
            ("year", 1, 9999),
            ("month", 1, 12),
            ("day", 1, 31),
            ("hour", 0, 23),
            ("minute", 0, 59),
            ("second", 0, 59),
        ];
        for (value, (name, min, max)) in components.iter().zip(RANGES) {
            if *value < min || *value > max {
                return Err(invalid(format!(
                    "{} {} is outside {}..={}",
                    name, value, min, max
                )));
            }
        }

        let part = |i: usize| components.get(i).map(|v| *v as u32);
        Ok(Self {
            year: components[0] as i32,
            month: part(1),
            day: part(2),
            hour: part(3),
            minute: part(4),
            second: part(5),
            field,
        })
    }

    /// Number of populated components.
    pub fn precision(&self) -> usize {
        1 + [self.month, self.day, self.hour, self.minute, self.second]
            .iter()
            .take_while(|c| c.is_some())
            .count()
    }
}

/// Equality value for non-string, non-date fields.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    /// Stored uppercased.
    Enum(String),
    Bool(bool),
    Integer(i64),
    Decimal { value: Decimal, scale: Option<u32> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScalarTerm {
    pub field: String,
    pub value: ScalarValue,
}

/// One field-level filter condition.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeTerm {
    String(StringTerm),
    DateInterval(DateIntervalTerm),
    DateShorthand(DateShorthandTerm),
    Scalar(ScalarTerm),
}

impl AttributeTerm {
    pub fn field(&self) -> &str {
        match self {
            AttributeTerm::String(t) => &t.field,
            AttributeTerm::DateInterval(t) => &t.field,
            AttributeTerm::DateShorthand(t) => &t.field,
            AttributeTerm::Scalar(t) => &t.field,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderTerm {
    pub field: String,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpansionTerm {
    pub field: String,
    pub kind: ExpansionKind,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
}

impl ExpansionTerm {
    pub fn has_paging(&self) -> bool {
        self.offset.is_some() || self.limit.is_some()
    }
}
