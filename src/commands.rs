//! Command implementations

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use kubesift_k8s::{
    Created, Deleted, Lookup, Manifest, ObjectAccessor, container_images, first_container_image,
};
use kubesift_query::select_resources;
use kubesift_types::ResourceCoordinate;

use crate::output::{self, OutputFormat};

/// Everything a command needs to talk to the cluster
pub struct Session<A> {
    pub accessor: A,
    pub namespace: String,
    pub output: OutputFormat,
    pub cancel: CancellationToken,
}

impl<A: ObjectAccessor> Session<A> {
    pub fn load_manifest(&self, path: &Path) -> Result<Manifest> {
        Manifest::from_path(path, &self.namespace)
            .with_context(|| format!("Failed to load manifest {}", path.display()))
    }

    /// Create every object in the manifest
    ///
    /// Objects the server rejects are reported and skipped, and the call
    /// fails once every object has been tried.
    pub async fn apply(&self, manifest: &Manifest) -> Result<()> {
        let mut failed = 0;
        for object in &manifest.objects {
            match self.accessor.create(object, &self.cancel).await {
                Ok(Created::Created(_)) => {
                    println!("{} {:?} created.", object.kind, object.name)
                }
                Ok(Created::AlreadyExists) => {
                    println!("{} {:?} already exists.", object.kind, object.name)
                }
                Err(err) if err.status_message().is_some() => {
                    // Status errors (invalid object, forbidden) don't stop the rest
                    tracing::error!(name = %object.name, "create failed: {}", err);
                    println!("Failed to create {} {:?}: {}", object.kind, object.name, err);
                    failed += 1;
                }
                Err(err) => return Err(err).context("Failed to apply manifest"),
            }
        }

        if failed > 0 {
            anyhow::bail!(
                "{} of {} objects in manifest {:?} could not be created",
                failed,
                manifest.objects.len(),
                manifest.source()
            );
        }
        println!("Manifest {:?} applied successfully.", manifest.source());
        Ok(())
    }

    /// Look up every object in the manifest
    pub async fn get(&self, manifest: &Manifest) -> Result<()> {
        for object in &manifest.objects {
            let lookup = self
                .accessor
                .get(&object.coordinate, &object.name, &self.cancel)
                .await
                .with_context(|| format!("Failed to get {} {:?}", object.kind, object.name))?;

            let location = scope_label(&object.coordinate);
            match lookup {
                Lookup::Found(_) => println!("Found {} {:?} {}", object.kind, object.name, location),
                Lookup::NotFound => {
                    println!("{} {:?} not found {}", object.kind, object.name, location)
                }
                Lookup::Failed(message) => {
                    println!("Error getting {} {:?}: {}", object.kind, object.name, message)
                }
            }
        }
        Ok(())
    }

    /// Print the container images of every object in a collection, only the
    /// first container's unless `all` is set
    pub async fn images(&self, coordinate: &ResourceCoordinate, all: bool) -> Result<()> {
        let documents = self
            .accessor
            .list(coordinate, &self.cancel)
            .await
            .with_context(|| format!("Failed to list {}", coordinate))?;

        for doc in &documents {
            let images = if all {
                container_images(doc).map(|images| images.join(", "))
            } else {
                first_container_image(doc)
            };

            match images {
                Ok(images) => println!("{}", images),
                Err(err) => println!("{}: {}", doc.display_name(), err),
            }
        }
        Ok(())
    }

    /// Print the objects in a collection the query selects
    pub async fn filter(&self, coordinate: &ResourceCoordinate, query: &str) -> Result<()> {
        let report = select_resources(&self.accessor, coordinate, query, &self.cancel)
            .await
            .with_context(|| format!("Failed to filter {}", coordinate))?;

        for violation in &report.violations {
            println!(
                "Query returned non-boolean value for {}: {}",
                violation.document, violation.value
            );
        }

        print!("{}", output::render(&report.matched, self.output, Utc::now())?);
        Ok(())
    }

    /// Delete every object in the manifest, last document first
    pub async fn delete(&self, manifest: &Manifest) -> Result<()> {
        for object in manifest.objects.iter().rev() {
            let deleted = self
                .accessor
                .delete(&object.coordinate, &object.name, &self.cancel)
                .await
                .with_context(|| format!("Failed to delete {} {:?}", object.kind, object.name))?;

            match deleted {
                Deleted::Deleted => println!("{} {:?} deleted.", object.kind, object.name),
                Deleted::Pending => {
                    println!("{} {:?} is being deleted.", object.kind, object.name)
                }
                Deleted::NotFound => {
                    println!("{} {:?} not found, nothing to delete.", object.kind, object.name)
                }
            }
        }
        println!("Manifest {:?} deleted successfully.", manifest.source());
        Ok(())
    }

    /// Apply, inspect, filter and delete a manifest in one go
    pub async fn run(&self, manifest: &Manifest, query: Option<&str>, keep: bool) -> Result<()> {
        self.apply(manifest).await?;
        self.get(manifest).await?;

        let collections = manifest.collections();

        for coordinate in &collections {
            println!();
            println!("Images in {}:", coordinate);
            self.images(coordinate, false).await?;
        }

        match query {
            Some(query) => {
                for coordinate in &collections {
                    println!();
                    println!("{} matching {}:", coordinate, query);
                    self.filter(coordinate, query).await?;
                }
            }
            None => tracing::info!("no query configured, skipping filter step"),
        }

        if !keep {
            println!();
            self.delete(manifest).await?;
        }
        self.get(manifest).await
    }
}

fn scope_label(coordinate: &ResourceCoordinate) -> String {
    if coordinate.is_namespaced() {
        format!("in namespace {:?}", coordinate.namespace)
    } else {
        "in cluster scope".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use kubesift_k8s::{AccessError, ManifestObject, ResourceAccessor};
    use kubesift_types::ResourceDocument;

    const TWO_DEPLOYMENTS: &str = r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: admin
"#;

    /// In-memory cluster that rejects creates of the named objects with a 403
    #[derive(Default)]
    struct StubAccessor {
        forbidden: Vec<String>,
        creates: AtomicUsize,
        lists: AtomicUsize,
        deletes: AtomicUsize,
    }

    impl StubAccessor {
        fn forbidding(name: &str) -> Self {
            Self {
                forbidden: vec![name.to_string()],
                ..Default::default()
            }
        }
    }

    impl ResourceAccessor for StubAccessor {
        async fn list(
            &self,
            _coordinate: &ResourceCoordinate,
            _cancel: &CancellationToken,
        ) -> Result<Vec<ResourceDocument>, AccessError> {
            self.lists.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }
    }

    impl ObjectAccessor for StubAccessor {
        async fn create(
            &self,
            object: &ManifestObject,
            _cancel: &CancellationToken,
        ) -> Result<Created, AccessError> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            if self.forbidden.contains(&object.name) {
                return Err(AccessError::Api {
                    code: 403,
                    reason: "Forbidden".to_string(),
                    message: format!("deployments.apps {:?} is forbidden", object.name),
                });
            }
            Ok(Created::AlreadyExists)
        }

        async fn get(
            &self,
            _coordinate: &ResourceCoordinate,
            _name: &str,
            _cancel: &CancellationToken,
        ) -> Result<Lookup, AccessError> {
            Ok(Lookup::NotFound)
        }

        async fn delete(
            &self,
            _coordinate: &ResourceCoordinate,
            _name: &str,
            _cancel: &CancellationToken,
        ) -> Result<Deleted, AccessError> {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            Ok(Deleted::Deleted)
        }
    }

    fn session(accessor: StubAccessor) -> Session<StubAccessor> {
        Session {
            accessor,
            namespace: "default".to_string(),
            output: OutputFormat::Name,
            cancel: CancellationToken::new(),
        }
    }

    fn manifest() -> Manifest {
        Manifest::parse(TWO_DEPLOYMENTS, "default").unwrap()
    }

    #[tokio::test]
    async fn test_apply_succeeds_when_every_create_does() {
        let session = session(StubAccessor::default());
        session.apply(&manifest()).await.unwrap();
        assert_eq!(session.accessor.creates.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_apply_fails_after_forbidden_create() {
        let session = session(StubAccessor::forbidding("web"));

        let err = session.apply(&manifest()).await.unwrap_err();
        assert!(err.to_string().contains("1 of 2 objects"), "{err}");
        // The remaining objects are still tried
        assert_eq!(session.accessor.creates.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_run_stops_when_apply_fails() {
        let session = session(StubAccessor::forbidding("admin"));

        assert!(session.run(&manifest(), Some("true"), false).await.is_err());
        assert_eq!(session.accessor.lists.load(Ordering::SeqCst), 0);
        assert_eq!(session.accessor.deletes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_run_reads_each_collection_once() {
        let session = session(StubAccessor::default());

        session.run(&manifest(), Some("true"), false).await.unwrap();
        // One list for images, one for the filter, both deployments share it
        assert_eq!(session.accessor.lists.load(Ordering::SeqCst), 2);
        assert_eq!(session.accessor.deletes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_run_keep_skips_delete() {
        let session = session(StubAccessor::default());

        session.run(&manifest(), None, true).await.unwrap();
        assert_eq!(session.accessor.lists.load(Ordering::SeqCst), 1);
        assert_eq!(session.accessor.deletes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_scope_label() {
        let coord = ResourceCoordinate::new("", "v1", "pods", "default");
        assert_eq!(scope_label(&coord), "in namespace \"default\"");
        assert_eq!(scope_label(&coord.cluster_scoped()), "in cluster scope");
    }
}
