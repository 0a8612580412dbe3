use jaq_json::Val;

use kubesift_types::ResourceDocument;

use crate::error::QueryError;
use crate::query::CompiledQuery;

/// A query output that was not a boolean. Never causes inclusion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShapeViolation {
    /// Position of the document in the filtered input
    pub index: usize,

    /// `namespace/name` of the document
    pub document: String,

    /// The offending output, as JSON text
    pub value: String,
}

/// Matched documents plus the diagnostics collected while filtering
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FilterReport {
    pub matched: Vec<ResourceDocument>,
    pub violations: Vec<ShapeViolation>,
}

/// Uses a compiled query as a predicate over documents.
///
/// Every output of the query is consumed for every document, even after a
/// `true` has been seen, so later errors and non-boolean outputs are always
/// surfaced. A document is included at most once.
pub struct PredicateFilter {
    query: CompiledQuery,
}

impl PredicateFilter {
    /// Compile an expression into a filter
    pub fn new(expression: &str) -> Result<Self, QueryError> {
        Ok(Self {
            query: CompiledQuery::compile(expression)?,
        })
    }

    /// Check if a single document matches, ignoring non-boolean outputs
    pub fn matches(&self, doc: &ResourceDocument) -> Result<bool, QueryError> {
        let mut violations = Vec::new();
        self.evaluate(0, doc, &mut violations)
    }

    /// Keep the documents the query selects, in input order
    pub fn apply(&self, documents: &[ResourceDocument]) -> Result<Vec<ResourceDocument>, QueryError> {
        Ok(self.apply_report(documents)?.matched)
    }

    /// Like [`apply`](Self::apply), but also return the shape violations.
    ///
    /// An evaluation error on any document fails the whole pass; no partial
    /// result is returned.
    pub fn apply_report(&self, documents: &[ResourceDocument]) -> Result<FilterReport, QueryError> {
        let mut report = FilterReport::default();

        for (index, doc) in documents.iter().enumerate() {
            if self.evaluate(index, doc, &mut report.violations)? {
                report.matched.push(doc.clone());
            }
        }

        tracing::debug!(
            query = self.query.expression(),
            total = documents.len(),
            matched = report.matched.len(),
            violations = report.violations.len(),
            "filtered documents"
        );
        Ok(report)
    }

    fn evaluate(
        &self,
        index: usize,
        doc: &ResourceDocument,
        violations: &mut Vec<ShapeViolation>,
    ) -> Result<bool, QueryError> {
        let mut include = false;

        self.query.evaluate(doc, |value| match value.as_val() {
            Val::Bool(true) => include = true,
            Val::Bool(false) => {}
            _ => {
                tracing::warn!(
                    document = %doc.display_name(),
                    %value,
                    "query returned non-boolean value"
                );
                violations.push(ShapeViolation {
                    index,
                    document: doc.display_name(),
                    value: value.to_string(),
                });
            }
        })?;

        Ok(include)
    }
}

impl std::fmt::Debug for PredicateFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredicateFilter")
            .field("query", &self.query.expression())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn deployment(name: &str, app: &str) -> ResourceDocument {
        ResourceDocument::new(json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": name, "namespace": "default", "labels": {"app": app}},
            "spec": {"replicas": 1}
        }))
    }

    fn names(docs: &[ResourceDocument]) -> Vec<&str> {
        docs.iter().filter_map(|d| d.name()).collect()
    }

    #[test]
    fn test_label_equality_selects_matching() {
        let filter = PredicateFilter::new(r#".metadata.labels["app"] == "nginx""#).unwrap();
        let docs = vec![deployment("web", "nginx"), deployment("api", "other")];

        let matched = filter.apply(&docs).unwrap();
        assert_eq!(matched, vec![docs[0].clone()]);
    }

    #[test]
    fn test_output_preserves_input_order() {
        let filter = PredicateFilter::new(r#".metadata.labels.app == "nginx""#).unwrap();
        let docs = vec![
            deployment("a", "nginx"),
            deployment("b", "redis"),
            deployment("c", "nginx"),
            deployment("d", "nginx"),
        ];

        assert_eq!(names(&filter.apply(&docs).unwrap()), vec!["a", "c", "d"]);
    }

    #[test]
    fn test_apply_is_idempotent() {
        let filter = PredicateFilter::new(r#".metadata.labels.app == "nginx""#).unwrap();
        let docs = vec![deployment("a", "nginx"), deployment("b", "redis")];

        let first = filter.apply_report(&docs).unwrap();
        let second = filter.apply_report(&docs).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_non_boolean_output_is_never_included() {
        let filter = PredicateFilter::new(".metadata.name").unwrap();
        let docs = vec![deployment("web", "nginx"), deployment("api", "other")];

        let report = filter.apply_report(&docs).unwrap();
        assert!(report.matched.is_empty());
        assert_eq!(
            report.violations,
            vec![
                ShapeViolation {
                    index: 0,
                    document: "default/web".to_string(),
                    value: r#""web""#.to_string(),
                },
                ShapeViolation {
                    index: 1,
                    document: "default/api".to_string(),
                    value: r#""api""#.to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_multiple_true_outputs_include_once() {
        let filter = PredicateFilter::new(".a == 1, .b == 2").unwrap();
        let docs: Vec<ResourceDocument> = [
            json!({"a": 1, "b": 2}),
            json!({"a": 1, "b": 3}),
            json!({"a": 0, "b": 2}),
            json!({"a": 0, "b": 0}),
        ]
        .into_iter()
        .map(ResourceDocument::new)
        .collect();

        let matched = filter.apply(&docs).unwrap();
        let values: Vec<&Value> = matched.iter().map(ResourceDocument::as_value).collect();
        assert_eq!(values, vec![docs[0].as_value(), docs[1].as_value(), docs[2].as_value()]);
    }

    #[test]
    fn test_unlabeled_documents_are_skipped() {
        let filter = PredicateFilter::new(r#".metadata.labels["app"] == "nginx""#).unwrap();
        let docs = vec![
            deployment("web", "nginx"),
            ResourceDocument::new(json!({"metadata": {"name": "plain", "namespace": "default"}})),
            deployment("api", "other"),
        ];

        let report = filter.apply_report(&docs).unwrap();
        assert_eq!(names(&report.matched), vec!["web"]);
        assert!(report.violations.is_empty());
    }

    #[test]
    fn test_documents_without_metadata_are_skipped() {
        let filter = PredicateFilter::new(r#".metadata.labels.app == "nginx""#).unwrap();
        let docs = vec![
            ResourceDocument::new(json!({"kind": "Pod"})),
            ResourceDocument::new(json!({})),
            deployment("web", "nginx"),
        ];

        assert_eq!(names(&filter.apply(&docs).unwrap()), vec!["web"]);
    }

    #[test]
    fn test_missing_field_is_null() {
        let filter = PredicateFilter::new(".spec.template.spec.nodeName == null").unwrap();
        assert!(filter.matches(&deployment("web", "nginx")).unwrap());
    }

    #[test]
    fn test_results_drained_after_match() {
        // Shape violation after a `true` is still reported
        let filter = PredicateFilter::new(".metadata.labels.app == \"nginx\", .metadata.name").unwrap();
        let report = filter.apply_report(&[deployment("web", "nginx")]).unwrap();
        assert_eq!(report.matched.len(), 1);
        assert_eq!(report.violations.len(), 1);

        // An error after a `true` still fails the pass
        let filter = PredicateFilter::new(".metadata.labels.app == \"nginx\", .spec.replicas[0]").unwrap();
        let err = filter.apply(&[deployment("web", "nginx")]).unwrap_err();
        assert!(err.is_evaluation());
    }

    #[test]
    fn test_evaluation_error_fails_whole_pass() {
        let filter = PredicateFilter::new(".spec.replicas[0] == 1").unwrap();
        let docs = vec![
            ResourceDocument::new(json!({"metadata": {"name": "ok"}, "spec": {"replicas": [1]}})),
            deployment("broken", "nginx"),
            ResourceDocument::new(json!({"metadata": {"name": "late"}, "spec": {"replicas": [1]}})),
        ];

        let err = filter.apply(&docs).unwrap_err();
        match err {
            QueryError::Evaluation { document, .. } => assert_eq!(document, "default/broken"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_empty_input() {
        let filter = PredicateFilter::new("true").unwrap();
        assert!(filter.apply(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_matches_single_document() {
        let filter = PredicateFilter::new(r#".kind == "Deployment""#).unwrap();
        assert!(filter.matches(&deployment("web", "nginx")).unwrap());
        assert!(!filter.matches(&ResourceDocument::new(json!({"kind": "Pod"}))).unwrap());
    }
}
