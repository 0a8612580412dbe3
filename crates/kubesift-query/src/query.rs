use std::fmt::Debug;

use jaq_core::load::{Arena, File, Loader};
use jaq_core::{Compiler, Ctx, Filter, Native, RcIter};

use kubesift_types::ResourceDocument;

use crate::error::QueryError;
use crate::value::{self, QueryValue};

/// A jq expression compiled once and run against any number of documents.
///
/// The compiled filter carries no mutable state, so one instance can be
/// reused across documents and across filter passes.
pub struct CompiledQuery {
    filter: Filter<Native<QueryValue>>,
    expression: String,
}

impl CompiledQuery {
    /// Parse and compile an expression with the jq standard library loaded
    pub fn compile(expression: &str) -> Result<Self, QueryError> {
        let program = File {
            code: expression,
            path: (),
        };

        let loader = Loader::new(jaq_std::defs().chain(jaq_json::defs()));
        let arena = Arena::default();

        let modules = loader
            .load(&arena, program)
            .map_err(|errors| compile_error(expression, errors))?;

        let filter = Compiler::default()
            .with_funs(jaq_std::funs().chain(value::funs()))
            .compile(modules)
            .map_err(|errors| compile_error(expression, errors))?;

        tracing::trace!(expression, "compiled query");
        Ok(Self {
            filter,
            expression: expression.to_string(),
        })
    }

    /// Get the original expression
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Run the query on one document, handing every output to `visit` as it
    /// is produced.
    ///
    /// Stops at the first error output. Returns the number of values visited.
    pub fn evaluate<F>(&self, doc: &ResourceDocument, mut visit: F) -> Result<usize, QueryError>
    where
        F: FnMut(&QueryValue),
    {
        let inputs = RcIter::new(core::iter::empty());
        let input = QueryValue::from(doc.as_value().clone());

        let mut visited = 0;
        for output in self.filter.run((Ctx::new([], &inputs), input)) {
            let value = output.map_err(|err| QueryError::Evaluation {
                expression: self.expression.clone(),
                document: doc.display_name(),
                message: err.to_string(),
            })?;
            visit(&value);
            visited += 1;
        }

        Ok(visited)
    }

    /// Collect every output of the query as JSON text
    pub fn outputs(&self, doc: &ResourceDocument) -> Result<Vec<String>, QueryError> {
        let mut outputs = Vec::new();
        self.evaluate(doc, |value| outputs.push(value.to_string()))?;
        Ok(outputs)
    }
}

impl std::fmt::Debug for CompiledQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledQuery")
            .field("expression", &self.expression)
            .finish()
    }
}

fn compile_error<F, E: Debug>(expression: &str, errors: Vec<(F, E)>) -> QueryError {
    let reason = errors
        .iter()
        .map(|(_, err)| format!("{:?}", err))
        .collect::<Vec<_>>()
        .join("; ");

    QueryError::Compile {
        expression: expression.to_string(),
        reason,
    }
}
