//! Query-driven resource filtering for kubesift
//!
//! This crate compiles jq expressions and uses them as predicates over
//! resource documents fetched through a [`ResourceAccessor`].

mod error;
mod filter;
mod query;
mod select;
mod value;

pub use error::{QueryError, SelectError};
pub use filter::{FilterReport, PredicateFilter, ShapeViolation};
pub use query::CompiledQuery;
pub use select::select_resources;
pub use value::QueryValue;

// Re-export types used in our public API
pub use kubesift_k8s::ResourceAccessor;
pub use kubesift_types::{ResourceCoordinate, ResourceDocument};
