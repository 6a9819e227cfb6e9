//! The compiled form of one query.

use super::{
    error::{QueryError, QueryResult},
    terms::{AttributeTerm, ExpansionTerm, OrderTerm},
};
use crate::cache::ResourceKind;

/// Largest page the server will return.
pub const DEFAULT_PAGE_MAX: u64 = 100;

/// Cap on the total number of items a query may accumulate across pages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionPlan {
    pub max_items: Option<u64>,
}

/// Everything the request compiler needs to render a query string.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryModel {
    pub collection_type: ResourceKind,
    pub filter_text: Option<String>,
    pub attribute_terms: Vec<AttributeTerm>,
    pub order_terms: Vec<OrderTerm>,
    pub expansions: Vec<ExpansionTerm>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub execution_plan: ExecutionPlan,
}

impl QueryModel {
    /// Whole collection, server default page.
    pub fn default_for(collection_type: ResourceKind) -> Self {
        Self {
            collection_type,
            filter_text: None,
            attribute_terms: Vec::new(),
            order_terms: Vec::new(),
            expansions: Vec::new(),
            limit: None,
            offset: None,
            execution_plan: ExecutionPlan::default(),
        }
    }

    /// Add a filter term, merging date halves for the same field.
    ///
    /// A truncated-precision date cannot share its field with any other term.
    pub fn add_term(&mut self, term: AttributeTerm) -> QueryResult<()> {
        let field = term.field().to_string();

        if let Some(existing) = self
            .attribute_terms
            .iter_mut()
            .find(|t| t.field() == field)
        {
            return match (existing, &term) {
                (AttributeTerm::DateInterval(current), AttributeTerm::DateInterval(incoming)) => {
                    current.merge(incoming)
                }
                (AttributeTerm::DateShorthand(_), _) | (_, AttributeTerm::DateShorthand(_)) => {
                    Err(QueryError::shape(format!(
                        "Within on '{}' cannot be combined with another condition on the same field",
                        field
                    )))
                }
                _ => Err(QueryError::shape(format!(
                    "More than one condition on field '{}'",
                    field
                ))),
            };
        }

        self.attribute_terms.push(term);
        Ok(())
    }

    /// Apply a result-count cap: the tightest cap wins, and the per-request
    /// limit never exceeds `page_max`.
    pub fn apply_take(&mut self, count: u64, page_max: u64) {
        let max_items = match self.execution_plan.max_items {
            Some(current) => current.min(count),
            None => count,
        };
        self.execution_plan.max_items = Some(max_items);
        self.limit = Some(max_items.min(page_max));
    }

    pub fn add_offset(&mut self, count: u64) {
        self.offset = Some(self.offset.unwrap_or(0).saturating_add(count));
    }
}
