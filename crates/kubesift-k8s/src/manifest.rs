//! Multi-document YAML manifests

use std::path::{Path, PathBuf};

use kube::api::{ApiResource, DynamicObject};
use kube::core::GroupVersionKind;
use serde::Deserialize;

use kubesift_types::{CoordinateError, ResourceCoordinate};

/// Kinds that never live in a namespace
const CLUSTER_SCOPED_KINDS: &[&str] = &[
    "APIService",
    "ClusterRole",
    "ClusterRoleBinding",
    "CustomResourceDefinition",
    "IngressClass",
    "MutatingWebhookConfiguration",
    "Namespace",
    "Node",
    "PersistentVolume",
    "PriorityClass",
    "RuntimeClass",
    "StorageClass",
    "ValidatingWebhookConfiguration",
];

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("failed to read manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("document {index} has no kind")]
    MissingKind { index: usize },

    #[error("document {index} ({kind}) has no metadata.name")]
    MissingName { index: usize, kind: String },

    #[error("document {index} does not map to a valid resource: {source}")]
    Coordinate {
        index: usize,
        #[source]
        source: CoordinateError,
    },

    #[error("manifest contains no objects")]
    Empty,
}

/// One object from a manifest, resolved to the collection it belongs in
#[derive(Debug, Clone)]
pub struct ManifestObject {
    pub object: DynamicObject,
    pub kind: String,
    pub name: String,
    pub coordinate: ResourceCoordinate,
}

/// Parsed manifest file
#[derive(Debug, Clone)]
pub struct Manifest {
    pub path: Option<PathBuf>,
    pub objects: Vec<ManifestObject>,
}

impl Manifest {
    /// Read and parse a manifest file
    pub fn from_path(path: &Path, default_namespace: &str) -> Result<Self, ManifestError> {
        let text = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut manifest = Self::parse(&text, default_namespace)?;
        manifest.path = Some(path.to_path_buf());
        Ok(manifest)
    }

    /// Parse every `---` separated document. Empty documents are skipped.
    pub fn parse(text: &str, default_namespace: &str) -> Result<Self, ManifestError> {
        let mut objects = Vec::new();

        for (index, de) in serde_yaml::Deserializer::from_str(text).enumerate() {
            let value = serde_yaml::Value::deserialize(de)?;
            if value.is_null() {
                continue;
            }

            let object: DynamicObject = serde_yaml::from_value(value)?;
            objects.push(Self::resolve(index, object, default_namespace)?);
        }

        if objects.is_empty() {
            return Err(ManifestError::Empty);
        }

        tracing::debug!(count = objects.len(), "parsed manifest");
        Ok(Self {
            path: None,
            objects,
        })
    }

    /// Display label for messages: the file path, or `<inline>`
    pub fn source(&self) -> String {
        self.path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<inline>".to_string())
    }

    /// The distinct collections the manifest's objects live in, in first-seen order
    pub fn collections(&self) -> Vec<&ResourceCoordinate> {
        let mut collections: Vec<&ResourceCoordinate> = Vec::new();
        for object in &self.objects {
            if !collections.contains(&&object.coordinate) {
                collections.push(&object.coordinate);
            }
        }
        collections
    }

    fn resolve(
        index: usize,
        mut object: DynamicObject,
        default_namespace: &str,
    ) -> Result<ManifestObject, ManifestError> {
        let (api_version, kind) = match &object.types {
            Some(types) if !types.kind.is_empty() => (types.api_version.clone(), types.kind.clone()),
            _ => return Err(ManifestError::MissingKind { index }),
        };

        let name = match object.metadata.name.as_deref() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => return Err(ManifestError::MissingName { index, kind }),
        };

        let (group, version) = match api_version.split_once('/') {
            Some((group, version)) => (group.to_string(), version.to_string()),
            None => (String::new(), api_version),
        };
        let version = if version.is_empty() {
            "v1".to_string()
        } else {
            version
        };

        let gvk = GroupVersionKind::gvk(&group, &version, &kind);
        let plural = ApiResource::from_gvk(&gvk).plural;

        let namespace = if CLUSTER_SCOPED_KINDS.contains(&kind.as_str()) {
            String::new()
        } else {
            let namespace = object
                .metadata
                .namespace
                .clone()
                .filter(|ns| !ns.is_empty())
                .unwrap_or_else(|| default_namespace.to_string());
            object.metadata.namespace = Some(namespace.clone());
            namespace
        };

        let coordinate = ResourceCoordinate::new(group, version, plural, namespace);
        coordinate
            .validate()
            .map_err(|source| ManifestError::Coordinate { index, source })?;

        Ok(ManifestObject {
            object,
            kind,
            name,
            coordinate,
        })
    }
}
