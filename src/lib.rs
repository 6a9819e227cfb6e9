//! Client core for an identity-management REST API.
//!
//! Two subsystems live here:
//!
//! - [`query`]: compiles a declarative chain of filter/sort/paging/expansion
//!   operators into a canonical query string, and [`pagination`] drives it
//!   page by page.
//! - [`cache`]: a write-through cache that flattens resource graphs into
//!   per-href entries and invalidates them precisely.
//!
//! Every operation is written once as an async algorithm. Blocking callers
//! reach the same code through the adapters in [`step`], so both calling
//! conventions make identical decisions.
//!
//! HTTP, request signing and the typed resource model are not part of this
//! crate. They plug in through [`transport::Transport`] and
//! [`transport::AsyncTransport`].

pub mod cache;
pub mod config;
pub mod datastore;
pub mod error;
#[cfg(feature = "logging")]
pub mod observability;
pub mod pagination;
pub mod query;
pub mod step;
pub mod transport;

#[cfg(test)]
mod tests;

pub use cache::{CacheProvider, MemoryCache, ResourceKind};
pub use config::ClientConfig;
pub use datastore::DataStore;
pub use error::{ClientError, ClientResult};
pub use pagination::{CursorState, PaginatedCursor};
pub use query::{Expr, Query, QueryError, QueryModel, SchemaRegistry};
