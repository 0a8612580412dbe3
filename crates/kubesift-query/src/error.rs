use kubesift_k8s::AccessError;

/// Errors raised while compiling or running a query
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    /// The expression does not parse, or refers to undefined filters
    #[error("invalid query '{expression}': {reason}")]
    Compile { expression: String, reason: String },

    /// The query raised an error on a document; the filter pass is abandoned
    #[error("query '{expression}' failed on {document}: {message}")]
    Evaluation {
        expression: String,
        document: String,
        message: String,
    },
}

impl QueryError {
    pub fn is_compile(&self) -> bool {
        matches!(self, Self::Compile { .. })
    }

    pub fn is_evaluation(&self) -> bool {
        matches!(self, Self::Evaluation { .. })
    }
}

/// Errors from listing a collection and filtering it
#[derive(Debug, thiserror::Error)]
pub enum SelectError {
    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Access(#[from] AccessError),
}
