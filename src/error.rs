use indexmap::IndexMap;
use serde_json::Value;
use std::{error, fmt};

/// Result alias used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Per-attribute messages produced by a [`SchemaValidator`](crate::model::validation::SchemaValidator).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FieldErrors(pub IndexMap<String, Vec<String>>);

impl FieldErrors {
    /// Record a message against an attribute.
    pub fn push(&mut self, attribute: impl Into<String>, message: impl Into<String>) {
        self.0
            .entry(attribute.into())
            .or_default()
            .push(message.into());
    }

    /// Whether no attribute failed.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Messages recorded against `attribute`.
    pub fn get(&self, attribute: &str) -> Option<&[String]> {
        self.0.get(attribute).map(Vec::as_slice)
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (attribute, messages) in &self.0 {
            for message in messages {
                if !first {
                    f.write_str("; ")?;
                }
                write!(f, "{attribute}: {message}")?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Errors raised by the model, query and relation layers.
///
/// None of these are retried internally: every variant propagates to the caller,
/// and in-memory entity state is left exactly as it was before the failing call.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The filter set cannot be expressed as a partition/sort key condition.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// The named relation is not declared on the model.
    #[error("model `{model}` has no relation named `{relation}`")]
    InvalidRelation {
        /// Model the relation was looked up on.
        model: String,
        /// Requested relation name.
        relation: String,
    },

    /// No model with this name was registered on the [`Db`](crate::model::Db).
    #[error("no model named `{0}` is registered")]
    UnknownModel(String),

    /// Read of an attribute that is not fillable, or write of one that is
    /// neither fillable nor a relation. Relations are read with
    /// [`Entity::relation`](crate::model::entity::Entity::relation).
    #[error("property `{property}` is not fillable on model `{model}`")]
    PropertyNotFillable {
        /// Model the property was accessed on.
        model: String,
        /// Offending property name.
        property: String,
    },

    /// Persistence attempted without the partition key attribute.
    #[error("partition key `{key}` is not set on model `{model}`")]
    PartitionKeyNotSet {
        /// Model being persisted.
        model: String,
        /// Storage name of the partition key.
        key: String,
    },

    /// Persistence attempted without the sort key attribute.
    #[error("sort key `{key}` is not set on model `{model}`")]
    SortKeyNotSet {
        /// Model being persisted.
        model: String,
        /// Storage name of the sort key.
        key: String,
    },

    /// Inline persistence attempted on a model not declared as an inline child.
    #[error("model `{model}` cannot be persisted inline: {reason}")]
    InvalidInlineModel {
        /// Model being persisted.
        model: String,
        /// What is missing.
        reason: String,
    },

    /// A declared cast could not decode or encode a value.
    #[error("cannot cast attribute `{attribute}`: {reason}")]
    AttributeCast {
        /// Attribute being cast.
        attribute: String,
        /// Description of the failure.
        reason: String,
    },

    /// Schema validator rejected the attribute set.
    #[error("validation failed: {0}")]
    Validation(FieldErrors),

    /// `find_or_fail` found nothing for the key pair.
    #[error("no `{model}` found for partition key {partition_key} and sort key {sort_key}")]
    NotFound {
        /// Model looked up.
        model: String,
        /// Attempted partition key value.
        partition_key: Value,
        /// Attempted sort key value.
        sort_key: Value,
    },

    /// A comparison was evaluated against the wrong number of values.
    #[error("{comparison} comparison takes exactly {expected} values, got {actual}")]
    Arity {
        /// Comparison operator.
        comparison: &'static str,
        /// Number of values required.
        expected: usize,
        /// Number of values supplied.
        actual: usize,
    },

    /// Marshalling between native values and attribute values failed.
    #[error(transparent)]
    Serialization(#[from] serde_dynamo::Error),

    /// The storage client failed to execute a request.
    #[error("{operation} request failed")]
    QueryExecution {
        /// Storage operation that failed.
        operation: &'static str,
        /// Underlying failure.
        #[source]
        source: Box<dyn error::Error + Send + Sync>,
    },
}

impl Error {
    pub(crate) fn query_execution(
        operation: &'static str,
        source: impl Into<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        let source = source.into();
        #[cfg(feature = "tracing")]
        tracing::warn!(operation, error = %source, "storage request failed");
        Self::QueryExecution { operation, source }
    }

    pub(crate) fn cast(attribute: &str, reason: impl fmt::Display) -> Self {
        Self::AttributeCast {
            attribute: attribute.to_string(),
            reason: reason.to_string(),
        }
    }
}
