use tokio_util::sync::CancellationToken;

use kubesift_k8s::ResourceAccessor;
use kubesift_types::ResourceCoordinate;

use crate::error::SelectError;
use crate::filter::{FilterReport, PredicateFilter};

/// List a collection and keep the objects the query selects.
///
/// The expression is compiled before anything is fetched, so a malformed
/// query never reaches the cluster.
pub async fn select_resources<A>(
    accessor: &A,
    coordinate: &ResourceCoordinate,
    expression: &str,
    cancel: &CancellationToken,
) -> Result<FilterReport, SelectError>
where
    A: ResourceAccessor,
{
    let filter = PredicateFilter::new(expression)?;
    let documents = accessor.list(coordinate, cancel).await?;

    tracing::info!(%coordinate, count = documents.len(), query = expression, "filtering resources");
    Ok(filter.apply_report(&documents)?)
}
