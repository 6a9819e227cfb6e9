//! Renders a [`QueryModel`] as an ordered list of query-string arguments.
//!
//! Argument order is fixed: `q`, attribute terms in insertion order, `limit`,
//! `offset`, `orderBy`, `expand`. Identical models always render identical
//! bytes, which upstream request signing depends on.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::{
    error::{QueryError, QueryResult},
    model::QueryModel,
    schema::ExpansionKind,
    terms::{
        AttributeTerm, DateIntervalTerm, DateShorthandTerm, ExpansionTerm, OrderTerm, ScalarValue,
        StringMatch, StringTerm,
    },
};

/// One `name=value` pair, unencoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryArg {
    pub name: String,
    pub value: String,
}

impl QueryArg {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

pub fn compile_request(model: &QueryModel) -> QueryResult<Vec<QueryArg>> {
    let mut args = Vec::new();

    if let Some(text) = &model.filter_text {
        args.push(QueryArg::new("q", text));
    }

    for term in &model.attribute_terms {
        args.push(QueryArg::new(term.field(), render_term(term)));
    }

    if let Some(limit) = model.limit {
        args.push(QueryArg::new("limit", limit.to_string()));
    }

    if let Some(offset) = model.offset.filter(|o| *o > 0) {
        args.push(QueryArg::new("offset", offset.to_string()));
    }

    if !model.order_terms.is_empty() {
        args.push(QueryArg::new("orderBy", render_order(&model.order_terms)));
    }

    if !model.expansions.is_empty() {
        args.push(QueryArg::new("expand", render_expansions(&model.expansions)?));
    }

    Ok(args)
}

/// `?a=1&b=2`, form-urlencoded; empty when there are no arguments.
pub fn render_query_string(args: &[QueryArg]) -> String {
    if args.is_empty() {
        return String::new();
    }
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for arg in args {
        serializer.append_pair(&arg.name, &arg.value);
    }
    format!("?{}", serializer.finish())
}

fn render_term(term: &AttributeTerm) -> String {
    match term {
        AttributeTerm::String(t) => render_string(t),
        AttributeTerm::DateInterval(t) => render_interval(t),
        AttributeTerm::DateShorthand(t) => render_shorthand(t),
        AttributeTerm::Scalar(t) => render_scalar(&t.value),
    }
}

fn render_string(term: &StringTerm) -> String {
    match term.match_type {
        StringMatch::Equals => term.value.clone(),
        StringMatch::StartsWith => format!("{}*", term.value),
        StringMatch::EndsWith => format!("*{}", term.value),
        StringMatch::Contains => format!("*{}*", term.value),
    }
}

fn render_interval(term: &DateIntervalTerm) -> String {
    let open = match term.start {
        Some(_) if !term.start_inclusive => '(',
        _ => '[',
    };
    let close = match term.end {
        Some(_) if !term.end_inclusive => ')',
        _ => ']',
    };
    format!(
        "{}{},{}{}",
        open,
        term.start.map(render_date).unwrap_or_default(),
        term.end.map(render_date).unwrap_or_default(),
        close
    )
}

/// UTC, second precision; milliseconds only when the value has them.
pub fn render_date(date: DateTime<Utc>) -> String {
    if date.timestamp_subsec_nanos() == 0 {
        date.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    } else {
        date.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
    }
}

fn render_shorthand(term: &DateShorthandTerm) -> String {
    let mut out = format!("{:04}", term.year);
    let parts = [
        ("-", term.month),
        ("-", term.day),
        ("T", term.hour),
        (":", term.minute),
        (":", term.second),
    ];
    for (separator, part) in parts {
        match part {
            Some(value) => out.push_str(&format!("{}{:02}", separator, value)),
            None => break,
        }
    }
    out
}

fn render_scalar(value: &ScalarValue) -> String {
    match value {
        ScalarValue::Enum(v) => v.to_ascii_uppercase(),
        ScalarValue::Bool(b) => b.to_string(),
        ScalarValue::Integer(i) => i.to_string(),
        ScalarValue::Decimal { value, scale } => render_decimal(*value, *scale),
    }
}

fn render_decimal(value: Decimal, scale: Option<u32>) -> String {
    match scale {
        Some(scale) => {
            let mut scaled = value;
            scaled.rescale(scale);
            scaled.to_string()
        }
        None => value.to_string(),
    }
}

fn render_order(terms: &[OrderTerm]) -> String {
    terms
        .iter()
        .map(|t| {
            if t.descending {
                format!("{} desc", t.field)
            } else {
                t.field.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn render_expansions(terms: &[ExpansionTerm]) -> QueryResult<String> {
    let mut rendered = Vec::with_capacity(terms.len());
    for term in terms {
        if !term.has_paging() {
            rendered.push(term.field.clone());
            continue;
        }
        if term.kind == ExpansionKind::Link {
            return Err(QueryError::ExpansionPaging {
                field: term.field.clone(),
            });
        }
        let mut paging = Vec::with_capacity(2);
        if let Some(offset) = term.offset {
            paging.push(format!("offset:{}", offset));
        }
        if let Some(limit) = term.limit {
            paging.push(format!("limit:{}", limit));
        }
        rendered.push(format!("{}({})", term.field, paging.join(",")));
    }
    Ok(rendered.join(","))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use rstest::rstest;

    use super::*;
    use crate::{
        cache::ResourceKind,
        query::{Query, compile_query},
    };

    fn render(query: Query) -> Vec<(String, String)> {
        let model = compile_query(&query).unwrap();
        compile_request(&model)
            .unwrap()
            .into_iter()
            .map(|a| (a.name, a.value))
            .collect()
    }

    fn pairs(expected: &[(&str, &str)]) -> Vec<(String, String)> {
        expected
            .iter()
            .map(|(n, v)| (n.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_canonical_example() {
        let query = Query::new(ResourceKind::Account)
            .where_(r#"x => x.Email.EndsWith("@galacticempire.co") && x.Status == "Enabled""#)
            .where_("x => x.CreatedAt.Within(2015)")
            .skip(0)
            .take(1);

        assert_eq!(
            render(query.clone()),
            pairs(&[
                ("email", "*@galacticempire.co"),
                ("status", "ENABLED"),
                ("createdAt", "2015"),
                ("limit", "1"),
            ])
        );

        let args = compile_request(&compile_query(&query.filter("vader")).unwrap()).unwrap();
        assert_eq!(
            render_query_string(&args),
            "?q=vader&email=*%40galacticempire.co&status=ENABLED&createdAt=2015&limit=1"
        );
    }

    #[rstest]
    #[case(">=", "<", "[2015-01-01T00:00:00Z,2016-01-01T00:00:00Z)")]
    #[case(">", "<", "(2015-01-01T00:00:00Z,2016-01-01T00:00:00Z)")]
    #[case(">=", "<=", "[2015-01-01T00:00:00Z,2016-01-01T00:00:00Z]")]
    #[case(">", "<=", "(2015-01-01T00:00:00Z,2016-01-01T00:00:00Z]")]
    fn test_interval_brackets(#[case] lower: &str, #[case] upper: &str, #[case] expected: &str) {
        let predicate = format!(
            r#"x => x.CreatedAt {} datetime("2015-01-01T00:00:00Z") && x.CreatedAt {} datetime("2016-01-01T00:00:00Z")"#,
            lower, upper
        );
        let args = render(Query::new(ResourceKind::Account).where_(predicate));
        assert_eq!(args, pairs(&[("createdAt", expected)]));
    }

    #[test]
    fn test_open_ended_intervals() {
        let args = render(
            Query::new(ResourceKind::Account)
                .where_(r#"x => x.CreatedAt > datetime("2015-01-01T00:00:00Z")"#)
                .where_(r#"x => x.ModifiedAt <= datetime("2016-01-01T00:00:00Z")"#),
        );
        assert_eq!(
            args,
            pairs(&[
                ("createdAt", "(2015-01-01T00:00:00Z,]"),
                ("modifiedAt", "[,2016-01-01T00:00:00Z]"),
            ])
        );
    }

    #[test]
    fn test_millisecond_precision_only_when_present() {
        let whole = Utc.with_ymd_and_hms(2015, 1, 1, 12, 30, 0).unwrap();
        assert_eq!(render_date(whole), "2015-01-01T12:30:00Z");

        let fractional = whole + chrono::Duration::milliseconds(250);
        assert_eq!(render_date(fractional), "2015-01-01T12:30:00.250Z");
    }

    #[rstest]
    #[case(vec![2015], "2015")]
    #[case(vec![2015, 3], "2015-03")]
    #[case(vec![2015, 3, 7], "2015-03-07")]
    #[case(vec![2015, 3, 7, 9], "2015-03-07T09")]
    #[case(vec![2015, 3, 7, 9, 5], "2015-03-07T09:05")]
    #[case(vec![2015, 3, 7, 9, 5, 1], "2015-03-07T09:05:01")]
    fn test_shorthand_precision(#[case] components: Vec<i64>, #[case] expected: &str) {
        let term = DateShorthandTerm::from_components("createdAt", &components).unwrap();
        assert_eq!(render_shorthand(&term), expected);
    }

    #[rstest]
    #[case("StartsWith", "vader*")]
    #[case("EndsWith", "*vader")]
    #[case("Contains", "*vader*")]
    #[case("Equals", "vader")]
    fn test_string_match_rendering(#[case] method: &str, #[case] expected: &str) {
        let args = render(
            Query::new(ResourceKind::Account).where_(format!(r#"x => x.Username.{}("vader")"#, method)),
        );
        assert_eq!(args, pairs(&[("username", expected)]));
    }

    #[test]
    fn test_decimal_scale() {
        assert_eq!(render_decimal(Decimal::new(125, 1), Some(3)), "12.500");
        assert_eq!(render_decimal(Decimal::new(125, 1), None), "12.5");
        assert_eq!(render_decimal(Decimal::new(5, 0), Some(2)), "5.00");
    }

    #[test]
    fn test_argument_order() {
        let args = render(
            Query::new(ResourceKind::Account)
                .expand_paged("x => x.Groups", Some(10), Some(5))
                .expand("x => x.Directory")
                .order_by_descending("x => x.CreatedAt")
                .then_by("x => x.Email")
                .skip(20)
                .take(50)
                .where_(r#"x => x.GivenName == "Darth""#)
                .filter("vader"),
        );
        assert_eq!(
            args,
            pairs(&[
                ("q", "vader"),
                ("givenName", "Darth"),
                ("limit", "50"),
                ("offset", "20"),
                ("orderBy", "createdAt desc,email"),
                ("expand", "groups(offset:10,limit:5),directory"),
            ])
        );
    }

    #[test]
    fn test_link_expansion_with_paging_fails_at_render() {
        let mut model = QueryModel::default_for(ResourceKind::Account);
        model.expansions.push(ExpansionTerm {
            field: "directory".to_string(),
            kind: ExpansionKind::Link,
            offset: None,
            limit: Some(3),
        });
        assert_eq!(
            compile_request(&model).unwrap_err(),
            QueryError::ExpansionPaging {
                field: "directory".to_string()
            }
        );
    }

    #[test]
    fn test_empty_model_renders_nothing() {
        let model = QueryModel::default_for(ResourceKind::Group);
        let args = compile_request(&model).unwrap();
        assert!(args.is_empty());
        assert_eq!(render_query_string(&args), "");
    }

    #[test]
    fn test_rendering_is_byte_stable() {
        let query = Query::new(ResourceKind::Account)
            .where_(r#"x => x.Email.StartsWith("tk") && x.CreatedAt >= datetime("2015-01-01T00:00:00Z")"#)
            .order_by("x => x.Surname")
            .take(250);
        let first = render_query_string(&compile_request(&compile_query(&query).unwrap()).unwrap());
        let second = render_query_string(&compile_request(&compile_query(&query).unwrap()).unwrap());
        assert_eq!(first, second);
        assert_eq!(
            first,
            "?email=tk*&createdAt=%5B2015-01-01T00%3A00%3A00Z%2C%5D&limit=100&orderBy=surname"
        );
    }
}
