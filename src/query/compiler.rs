//! Compiles a whole operator chain into a [`QueryModel`].

use std::sync::Arc;

use tracing::trace;

use super::{
    ast::{Constant, Expr, Method, Projection, Query, QueryOp},
    error::{QueryError, QueryResult},
    model::{DEFAULT_PAGE_MAX, QueryModel},
    schema::{ExpansionKind, ResourceSchema, SchemaRegistry},
    terms::{ExpansionTerm, OrderTerm},
    visitor::PredicateVisitor,
};

/// Compiles queries against an explicit schema registry.
///
/// Cheap to clone; the registry is shared.
#[derive(Debug, Clone)]
pub struct QueryCompiler {
    registry: Arc<SchemaRegistry>,
    page_max: u64,
}

impl Default for QueryCompiler {
    fn default() -> Self {
        Self::new(Arc::new(SchemaRegistry::default()))
    }
}

impl QueryCompiler {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self {
            registry,
            page_max: DEFAULT_PAGE_MAX,
        }
    }

    /// Override the server page maximum. Zero is treated as one.
    pub fn with_page_max(mut self, page_max: u64) -> Self {
        self.page_max = page_max.max(1);
        self
    }

    pub fn page_max(&self) -> u64 {
        self.page_max
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Compile every operator of `query`, in order.
    ///
    /// Either the whole chain compiles or an error is returned; no partial
    /// model ever escapes.
    pub fn compile(&self, query: &Query) -> QueryResult<QueryModel> {
        if let Some(err) = query.deferred_error() {
            return Err(err.clone().into());
        }

        let schema = self
            .registry
            .get(query.source())
            .ok_or_else(|| QueryError::UnknownResource(query.source().to_string()))?;

        let mut model = QueryModel::default_for(schema.kind);
        for op in query.ops() {
            self.apply(schema, op, &mut model)?;
        }

        trace!(
            collection = %model.collection_type,
            terms = model.attribute_terms.len(),
            limit = ?model.limit,
            offset = ?model.offset,
            max_items = ?model.execution_plan.max_items,
            "Compiled query"
        );
        Ok(model)
    }

    fn apply(&self, schema: &ResourceSchema, op: &QueryOp, model: &mut QueryModel) -> QueryResult<()> {
        match op {
            QueryOp::Where(predicate) => self.apply_where(schema, predicate, model),
            QueryOp::OrderBy { key, descending } | QueryOp::ThenBy { key, descending } => {
                let field = order_field(schema, key)?;
                model.order_terms.push(OrderTerm {
                    field,
                    descending: *descending,
                });
                Ok(())
            }
            QueryOp::Skip(count) => {
                model.add_offset(*count);
                Ok(())
            }
            QueryOp::Take(count) => {
                model.apply_take(*count, self.page_max);
                Ok(())
            }
            QueryOp::First | QueryOp::Single | QueryOp::Any => {
                model.apply_take(1, self.page_max);
                Ok(())
            }
            QueryOp::Filter(term) => set_filter_text(model, term),
            QueryOp::Expand {
                selector,
                offset,
                limit,
            } => {
                let term = expansion(schema, selector, *offset, *limit)?;
                model.expansions.push(term);
                Ok(())
            }
            QueryOp::Select(Projection::Identity) => Ok(()),
            QueryOp::Select(Projection::Expr(Expr::Parameter)) => Ok(()),
            QueryOp::Select(Projection::Expr(expr)) => Err(QueryError::shape(format!(
                "projection '{}' is not supported",
                expr
            ))),
            QueryOp::Join | QueryOp::GroupJoin | QueryOp::Other(_) => {
                Err(QueryError::UnsupportedOperator(op.name().to_string()))
            }
        }
    }

    fn apply_where(
        &self,
        schema: &ResourceSchema,
        predicate: &Expr,
        model: &mut QueryModel,
    ) -> QueryResult<()> {
        if let Expr::Call {
            target,
            method: Method::Filter,
            args,
        } = predicate
            && matches!(**target, Expr::Parameter)
        {
            return match args.as_slice() {
                [Expr::Constant(Constant::String(term))] => set_filter_text(model, term),
                _ => Err(QueryError::shape(
                    "Filter takes exactly one string constant",
                )),
            };
        }

        PredicateVisitor::new(schema).visit(predicate, model)
    }
}

/// Compile with the default schema registry and page maximum.
pub fn compile_query(query: &Query) -> QueryResult<QueryModel> {
    QueryCompiler::default().compile(query)
}

fn set_filter_text(model: &mut QueryModel, term: &str) -> QueryResult<()> {
    if model.filter_text.is_some() {
        return Err(QueryError::shape("only one free-text Filter is allowed"));
    }
    model.filter_text = Some(term.to_string());
    Ok(())
}

/// Member name of a selector such as `x => x.Email`.
fn selector_name<'e>(selector: &'e Expr, operator: &str) -> QueryResult<&'e str> {
    match selector {
        Expr::Member { target, name } if matches!(**target, Expr::Parameter) => Ok(name.as_str()),
        Expr::Call {
            method: Method::Within,
            ..
        } => Err(QueryError::shape(format!(
            "Within is only allowed inside Where, not {}",
            operator
        ))),
        other => Err(QueryError::shape(format!(
            "{} selector '{}' must be a field of the queried resource",
            operator, other
        ))),
    }
}

fn order_field(schema: &ResourceSchema, key: &Expr) -> QueryResult<String> {
    let name = selector_name(key, "OrderBy")?;
    schema
        .fields
        .lookup(name)
        .map(|def| def.wire.clone())
        .ok_or_else(|| QueryError::UnknownField {
            field: name.to_string(),
            resource: schema.kind.to_string(),
        })
}

fn expansion(
    schema: &ResourceSchema,
    selector: &Expr,
    offset: Option<u64>,
    limit: Option<u64>,
) -> QueryResult<ExpansionTerm> {
    let name = selector_name(selector, "Expand")?;
    let def = schema
        .expansions
        .lookup(name)
        .ok_or_else(|| QueryError::UnknownField {
            field: name.to_string(),
            resource: schema.kind.to_string(),
        })?;

    let term = ExpansionTerm {
        field: def.wire.clone(),
        kind: def.kind,
        offset,
        limit,
    };
    if term.kind == ExpansionKind::Link && term.has_paging() {
        return Err(QueryError::ExpansionPaging { field: term.field });
    }
    Ok(term)
}
