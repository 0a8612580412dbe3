//! Dynamic access to cluster collections

use std::future::Future;

use kube::Api;
use kube::api::{ApiResource, DeleteParams, DynamicObject, ListParams, PostParams};
use tokio_util::sync::CancellationToken;

use kubesift_types::{ResourceCoordinate, ResourceDocument};

use crate::error::AccessError;
use crate::manifest::ManifestObject;

/// Source of resource collections.
///
/// `list` returns the complete, unfiltered collection in upstream order. An
/// empty collection is `Ok(vec![])`, never an error.
pub trait ResourceAccessor {
    fn list(
        &self,
        coordinate: &ResourceCoordinate,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<Vec<ResourceDocument>, AccessError>> + Send;
}

/// Per-object calls for the objects of a manifest, keyed by coordinate and name
pub trait ObjectAccessor: ResourceAccessor {
    /// Create an object. A name conflict is reported, not raised.
    fn create(
        &self,
        object: &ManifestObject,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<Created, AccessError>> + Send;

    /// Fetch a single object by name
    fn get(
        &self,
        coordinate: &ResourceCoordinate,
        name: &str,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<Lookup, AccessError>> + Send;

    /// Delete a single object by name
    fn delete(
        &self,
        coordinate: &ResourceCoordinate,
        name: &str,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<Deleted, AccessError>> + Send;
}

/// Result of creating an object
#[derive(Debug, Clone, PartialEq)]
pub enum Created {
    Created(ResourceDocument),
    /// The server answered 409: an object with this name exists already
    AlreadyExists,
}

/// Result of looking up one object by name
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Found(ResourceDocument),
    NotFound,
    /// The server answered with a status error other than 404
    Failed(String),
}

/// Result of deleting an object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deleted {
    Deleted,
    /// Accepted, but finalizers are still running
    Pending,
    NotFound,
}

/// Accessor backed by the live cluster through `Api<DynamicObject>`
#[derive(Clone)]
pub struct ClusterAccessor {
    client: kube::Client,
}

impl ClusterAccessor {
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }

    fn api(&self, coordinate: &ResourceCoordinate, kind: &str) -> Api<DynamicObject> {
        let resource = ApiResource {
            group: coordinate.group.clone(),
            version: coordinate.version.clone(),
            api_version: coordinate.api_version(),
            kind: kind.to_string(),
            plural: coordinate.resource.clone(),
        };

        if coordinate.is_namespaced() {
            Api::namespaced_with(self.client.clone(), &coordinate.namespace, &resource)
        } else {
            Api::all_with(self.client.clone(), &resource)
        }
    }
}

impl ObjectAccessor for ClusterAccessor {
    async fn create(
        &self,
        object: &ManifestObject,
        cancel: &CancellationToken,
    ) -> Result<Created, AccessError> {
        object.coordinate.validate()?;
        let api = self.api(&object.coordinate, &object.kind);

        match cancellable(cancel, api.create(&PostParams::default(), &object.object)).await {
            Ok(created) => Ok(Created::Created(to_document(&created)?)),
            Err(err) if err.is_conflict() => {
                tracing::info!(name = %object.name, "object already exists");
                Ok(Created::AlreadyExists)
            }
            Err(err) => Err(err),
        }
    }

    async fn get(
        &self,
        coordinate: &ResourceCoordinate,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<Lookup, AccessError> {
        coordinate.validate()?;
        let api = self.api(coordinate, "");

        match cancellable(cancel, api.get(name)).await {
            Ok(obj) => Ok(Lookup::Found(to_document(&obj)?)),
            Err(AccessError::NotFound(_)) => Ok(Lookup::NotFound),
            Err(AccessError::Api { message, .. }) => Ok(Lookup::Failed(message)),
            Err(err) => Err(err),
        }
    }

    async fn delete(
        &self,
        coordinate: &ResourceCoordinate,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<Deleted, AccessError> {
        coordinate.validate()?;
        let api = self.api(coordinate, "");

        match cancellable(cancel, api.delete(name, &DeleteParams::default())).await {
            // Left carries the object while finalizers run, Right the final status
            Ok(outcome) if outcome.is_left() => Ok(Deleted::Pending),
            Ok(_) => Ok(Deleted::Deleted),
            Err(AccessError::NotFound(_)) => Ok(Deleted::NotFound),
            Err(err) => Err(err),
        }
    }
}

impl ResourceAccessor for ClusterAccessor {
    async fn list(
        &self,
        coordinate: &ResourceCoordinate,
        cancel: &CancellationToken,
    ) -> Result<Vec<ResourceDocument>, AccessError> {
        coordinate.validate()?;
        let api = self.api(coordinate, "");

        let list = cancellable(cancel, api.list(&ListParams::default())).await?;
        tracing::debug!(%coordinate, count = list.items.len(), "listed resources");

        let api_version = coordinate.api_version();
        list.items
            .iter()
            .map(|obj| -> Result<ResourceDocument, AccessError> {
                let mut doc = serde_json::to_value(obj)?;
                // List items come back without apiVersion
                if let Some(fields) = doc.as_object_mut() {
                    fields
                        .entry("apiVersion")
                        .or_insert_with(|| api_version.clone().into());
                }
                Ok(ResourceDocument::new(doc))
            })
            .collect()
    }
}

fn to_document(obj: &DynamicObject) -> Result<ResourceDocument, AccessError> {
    Ok(ResourceDocument::new(serde_json::to_value(obj)?))
}

/// Race a request against the cancellation token
async fn cancellable<T>(
    cancel: &CancellationToken,
    request: impl Future<Output = kube::Result<T>>,
) -> Result<T, AccessError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AccessError::Cancelled),
        result = request => result.map_err(AccessError::from),
    }
}
