//! Kubernetes client for kubesift
//!
//! This crate provides kubeconfig handling, the dynamic resource accessor,
//! manifest loading and container inspection helpers.

mod accessor;
mod client;
mod error;
mod inspect;
mod manifest;

pub use accessor::{ClusterAccessor, Created, Deleted, Lookup, ObjectAccessor, ResourceAccessor};
pub use client::KubeClient;
pub use error::AccessError;
pub use inspect::{InspectError, container_images, containers, first_container_image};
pub use manifest::{Manifest, ManifestError, ManifestObject};

// Re-export types that are used in our public API
pub use kubesift_types::{CoordinateError, ResourceCoordinate, ResourceDocument};
