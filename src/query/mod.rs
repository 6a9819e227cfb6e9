//! Declarative query compilation.
//!
//! A [`Query`] is an ordered chain of operators over one resource collection.
//! [`QueryCompiler`] turns it into a [`QueryModel`] and
//! [`compile_request`] renders that model as ordered query-string arguments:
//!
//! ```text
//! Query::new(Account)
//!     .where_(r#"x => x.Email.EndsWith("@galacticempire.co") && x.Status == "Enabled""#)
//!     .where_("x => x.CreatedAt.Within(2015)")
//!     .take(1)
//!
//! => ?email=*%40galacticempire.co&status=ENABLED&createdAt=2015&limit=1
//! ```
//!
//! Only conjunctions of field conditions, ordering, paging, free text and
//! expansion are supported. Anything else fails compilation; no partial model
//! is ever produced.

pub mod ast;
pub mod compiler;
pub mod error;
pub mod model;
pub mod parser;
pub mod request;
pub mod schema;
pub mod terms;
pub mod visitor;

pub use ast::{BinaryOp, Constant, Expr, IntoExpr, Method, Projection, Query, QueryOp};
pub use compiler::{QueryCompiler, compile_query};
pub use error::{QueryError, QueryResult};
pub use model::{DEFAULT_PAGE_MAX, ExecutionPlan, QueryModel};
pub use parser::{ParseError, parse_expr};
pub use request::{QueryArg, compile_request, render_query_string};
pub use schema::{
    ExpansionKind, ExpansionTable, FieldKind, FieldTable, ResourceSchema, SchemaRegistry,
};
pub use terms::{
    AttributeTerm, DateIntervalTerm, DateShorthandTerm, ExpansionTerm, OrderTerm, ScalarTerm,
    ScalarValue, StringMatch, StringTerm,
};
