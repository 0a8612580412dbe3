//! Shared types for kubesift
//!
//! This crate contains the data structures passed between the cluster accessor,
//! the query filter and the command line front end.

use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Resource Coordinates
// ============================================================================

/// RFC 1123 label, used for namespaces and resource path segments
static DNS_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]([-a-z0-9]{0,61}[a-z0-9])?$").unwrap());

/// Longest RFC 1123 subdomain
const DNS_SUBDOMAIN_MAX_LEN: usize = 253;

/// RFC 1123 subdomain, used for API groups (e.g. `apps`, `networking.k8s.io`).
/// The length limit is checked separately.
static DNS_SUBDOMAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$").unwrap()
});

/// Reasons a coordinate is rejected before it reaches the cluster
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoordinateError {
    #[error("resource version must not be empty")]
    EmptyVersion,

    #[error("resource name must not be empty")]
    EmptyResource,

    #[error("invalid API group '{0}'")]
    InvalidGroup(String),

    #[error("invalid API version '{0}'")]
    InvalidVersion(String),

    #[error("invalid resource name '{0}' (expected a lowercase plural like 'deployments')")]
    InvalidResource(String),

    #[error("invalid namespace '{0}'")]
    InvalidNamespace(String),
}

/// Identifies a collection endpoint: group, version, plural resource and namespace.
///
/// An empty `group` addresses the core API group, an empty `namespace`
/// addresses the cluster-scoped collection.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceCoordinate {
    pub group: String,
    pub version: String,
    pub resource: String,
    pub namespace: String,
}

impl ResourceCoordinate {
    pub fn new(
        group: impl Into<String>,
        version: impl Into<String>,
        resource: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            resource: resource.into(),
            namespace: namespace.into(),
        }
    }

    /// Same collection, cluster-wide
    pub fn cluster_scoped(mut self) -> Self {
        self.namespace.clear();
        self
    }

    pub fn is_namespaced(&self) -> bool {
        !self.namespace.is_empty()
    }

    /// The `apiVersion` string for this coordinate (`v1`, `apps/v1`, ...)
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    /// Check the coordinate is well formed before any request is made
    pub fn validate(&self) -> Result<(), CoordinateError> {
        if !self.group.is_empty()
            && (self.group.len() > DNS_SUBDOMAIN_MAX_LEN || !DNS_SUBDOMAIN.is_match(&self.group))
        {
            return Err(CoordinateError::InvalidGroup(self.group.clone()));
        }

        if self.version.is_empty() {
            return Err(CoordinateError::EmptyVersion);
        }
        if !DNS_LABEL.is_match(&self.version) {
            return Err(CoordinateError::InvalidVersion(self.version.clone()));
        }

        if self.resource.is_empty() {
            return Err(CoordinateError::EmptyResource);
        }
        if !DNS_LABEL.is_match(&self.resource) {
            return Err(CoordinateError::InvalidResource(self.resource.clone()));
        }

        if !self.namespace.is_empty() && !DNS_LABEL.is_match(&self.namespace) {
            return Err(CoordinateError::InvalidNamespace(self.namespace.clone()));
        }

        Ok(())
    }
}

impl fmt::Display for ResourceCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.api_version(), self.resource)?;
        if self.is_namespaced() {
            write!(f, " in namespace '{}'", self.namespace)?;
        }
        Ok(())
    }
}

// ============================================================================
// Resource Documents
// ============================================================================

/// One cluster object as an untyped JSON tree.
///
/// Documents are snapshots: nothing here mutates them after they are fetched.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceDocument(Value);

impl ResourceDocument {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Walk a chain of object keys, like `metadata.labels.app`
    pub fn nested(&self, path: &[&str]) -> Option<&Value> {
        path.iter().try_fold(&self.0, |value, key| value.get(key))
    }

    pub fn nested_str(&self, path: &[&str]) -> Option<&str> {
        self.nested(path).and_then(Value::as_str)
    }

    pub fn name(&self) -> Option<&str> {
        self.nested_str(&["metadata", "name"])
    }

    pub fn namespace(&self) -> Option<&str> {
        self.nested_str(&["metadata", "namespace"])
    }

    pub fn kind(&self) -> Option<&str> {
        self.nested_str(&["kind"])
    }

    pub fn api_version(&self) -> Option<&str> {
        self.nested_str(&["apiVersion"])
    }

    /// Label value by key
    pub fn label(&self, key: &str) -> Option<&str> {
        self.nested_str(&["metadata", "labels", key])
    }

    /// Parsed `metadata.creationTimestamp`
    pub fn creation_timestamp(&self) -> Option<DateTime<Utc>> {
        let raw = self.nested_str(&["metadata", "creationTimestamp"])?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|ts| ts.with_timezone(&Utc))
    }

    /// Age relative to `now`, formatted like kubectl (`3d`, `5h`, `12m`)
    pub fn age(&self, now: DateTime<Utc>) -> Option<String> {
        self.creation_timestamp()
            .map(|created| format_age(now.signed_duration_since(created)))
    }

    /// `namespace/name` or just `name` for cluster-scoped objects
    pub fn display_name(&self) -> String {
        let name = self.name().unwrap_or("<unnamed>");
        match self.namespace() {
            Some(ns) if !ns.is_empty() => format!("{}/{}", ns, name),
            _ => name.to_string(),
        }
    }
}

impl From<Value> for ResourceDocument {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

impl From<ResourceDocument> for Value {
    fn from(doc: ResourceDocument) -> Self {
        doc.0
    }
}

/// Format a duration the way kubectl prints ages
pub fn format_age(age: Duration) -> String {
    match (age.num_days(), age.num_hours(), age.num_minutes()) {
        (days, _, _) if days > 0 => format!("{}d", days),
        (_, hours, _) if hours > 0 => format!("{}h", hours),
        (_, _, mins) if mins > 0 => format!("{}m", mins),
        _ => format!("{}s", age.num_seconds().max(0)),
    }
}
