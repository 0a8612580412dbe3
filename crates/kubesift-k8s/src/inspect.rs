//! Container inspection on untyped workload objects

use serde_json::Value;

use kubesift_types::ResourceDocument;

/// Where the container list lives, checked in order
const CONTAINER_PATHS: &[&[&str]] = &[
    // Deployment, StatefulSet, DaemonSet, ReplicaSet, Job
    &["spec", "template", "spec", "containers"],
    // CronJob
    &["spec", "jobTemplate", "spec", "template", "spec", "containers"],
    // Pod
    &["spec", "containers"],
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InspectError {
    #[error("containers slice not found")]
    ContainersNotFound,

    #[error("containers field is not a list")]
    ContainersNotList,

    #[error("containers list is empty")]
    NoContainers,

    #[error("container {0} is not a map")]
    ContainerNotObject(usize),

    #[error("container {0} has no image")]
    ImageNotFound(usize),
}

/// The container list of a pod or pod-template carrying object
pub fn containers(doc: &ResourceDocument) -> Result<&[Value], InspectError> {
    let found = CONTAINER_PATHS
        .iter()
        .find_map(|path| doc.nested(path))
        .ok_or(InspectError::ContainersNotFound)?;

    found
        .as_array()
        .map(Vec::as_slice)
        .ok_or(InspectError::ContainersNotList)
}

/// Image of every container, in declaration order
pub fn container_images(doc: &ResourceDocument) -> Result<Vec<String>, InspectError> {
    let containers = containers(doc)?;
    if containers.is_empty() {
        return Err(InspectError::NoContainers);
    }

    containers
        .iter()
        .enumerate()
        .map(|(index, container)| image_of(index, container))
        .collect()
}

/// Image of the first container
pub fn first_container_image(doc: &ResourceDocument) -> Result<String, InspectError> {
    let first = containers(doc)?
        .first()
        .ok_or(InspectError::NoContainers)?;
    image_of(0, first)
}

fn image_of(index: usize, container: &Value) -> Result<String, InspectError> {
    let container = container
        .as_object()
        .ok_or(InspectError::ContainerNotObject(index))?;

    container
        .get("image")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(InspectError::ImageNotFound(index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> ResourceDocument {
        ResourceDocument::new(value)
    }

    #[test]
    fn test_deployment_images() {
        let deployment = doc(json!({
            "kind": "Deployment",
            "spec": {"template": {"spec": {"containers": [
                {"name": "app", "image": "nginx:1.25"},
                {"name": "sidecar", "image": "envoy:v1.30"}
            ]}}}
        }));

        assert_eq!(first_container_image(&deployment).unwrap(), "nginx:1.25");
        assert_eq!(
            container_images(&deployment).unwrap(),
            vec!["nginx:1.25", "envoy:v1.30"]
        );
    }

    #[test]
    fn test_pod_and_cronjob_images() {
        let pod = doc(json!({"spec": {"containers": [{"image": "busybox"}]}}));
        assert_eq!(first_container_image(&pod).unwrap(), "busybox");

        let cronjob = doc(json!({
            "spec": {"jobTemplate": {"spec": {"template": {"spec": {
                "containers": [{"image": "backup:2"}]
            }}}}}
        }));
        assert_eq!(first_container_image(&cronjob).unwrap(), "backup:2");
    }

    #[test]
    fn test_missing_containers() {
        let svc = doc(json!({"kind": "Service", "spec": {"ports": []}}));
        assert_eq!(
            first_container_image(&svc),
            Err(InspectError::ContainersNotFound)
        );
    }

    #[test]
    fn test_malformed_containers() {
        let not_list = doc(json!({"spec": {"containers": {"image": "x"}}}));
        assert_eq!(
            container_images(&not_list),
            Err(InspectError::ContainersNotList)
        );

        let empty = doc(json!({"spec": {"containers": []}}));
        assert_eq!(first_container_image(&empty), Err(InspectError::NoContainers));
        assert_eq!(container_images(&empty), Err(InspectError::NoContainers));

        let not_map = doc(json!({"spec": {"containers": ["nginx"]}}));
        assert_eq!(
            first_container_image(&not_map),
            Err(InspectError::ContainerNotObject(0))
        );

        let no_image = doc(json!({"spec": {"containers": [{"image": "a"}, {"name": "b"}]}}));
        assert_eq!(container_images(&no_image), Err(InspectError::ImageNotFound(1)));
    }
}
