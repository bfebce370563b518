//! Operations handed to the compiler.

use crate::selection::FieldSelection;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of GraphQL operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

impl OperationKind {
    /// Returns the keyword that opens the document.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Mutation => "mutation",
            Self::Subscription => "subscription",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single operation to compile.
#[derive(Debug, Clone, PartialEq)]
pub struct BuilderOperation {
    /// The operation kind.
    pub kind: OperationKind,
    /// The root selection.
    pub fields: FieldSelection,
    /// Optional operation name.
    pub name: Option<String>,
    /// Directives appended after the variable signature, e.g. `@live`.
    pub directives: Vec<String>,
}

impl BuilderOperation {
    /// Creates an anonymous operation.
    pub fn new(kind: OperationKind, fields: FieldSelection) -> Self {
        Self {
            kind,
            fields,
            name: None,
            directives: Vec::new(),
        }
    }

    /// Creates a query.
    pub fn query(fields: FieldSelection) -> Self {
        Self::new(OperationKind::Query, fields)
    }

    /// Creates a mutation.
    pub fn mutation(fields: FieldSelection) -> Self {
        Self::new(OperationKind::Mutation, fields)
    }

    /// Creates a subscription.
    pub fn subscription(fields: FieldSelection) -> Self {
        Self::new(OperationKind::Subscription, fields)
    }

    /// Sets the operation name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Appends a directive.
    #[must_use]
    pub fn directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }
}
