//! Model and action descriptors.
//!
//! Descriptors are generated alongside the backend schema and consumed here
//! read-only. They carry everything the builders need to shape an operation:
//! operation names, default selections, declared variable types and a few
//! flags describing how the action takes its input.

use indexmap::{IndexMap, IndexSet};
use recordql_syntax::FieldSelection;
use serde::Deserialize;

/// Type name of record id variables.
pub const ID_TYPE: &str = "GadgetID";

/// Describes the read operations of one model.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDescriptor {
    /// Key of the model in records, e.g. `user`.
    pub api_identifier: String,
    /// Root field of the single-record query, e.g. `user`.
    pub find_one_operation: String,
    /// Root field of the connection query, e.g. `users`.
    pub find_many_operation: String,
    /// Selection used when the caller does not pass one.
    #[serde(default)]
    pub default_selection: FieldSelection,
    /// Namespace segments the model lives under.
    #[serde(default)]
    pub namespace: Vec<String>,
}

impl ModelDescriptor {
    /// Creates a descriptor with an empty default selection.
    pub fn new(
        api_identifier: impl Into<String>,
        find_one_operation: impl Into<String>,
        find_many_operation: impl Into<String>,
    ) -> Self {
        Self {
            api_identifier: api_identifier.into(),
            find_one_operation: find_one_operation.into(),
            find_many_operation: find_many_operation.into(),
            default_selection: FieldSelection::new(),
            namespace: Vec::new(),
        }
    }

    /// Sets the default selection.
    #[must_use]
    pub fn with_default_selection(mut self, selection: FieldSelection) -> Self {
        self.default_selection = selection;
        self
    }

    /// Sets the namespace.
    #[must_use]
    pub fn in_namespace<S: Into<String>>(mut self, namespace: impl IntoIterator<Item = S>) -> Self {
        self.namespace = namespace.into_iter().map(Into::into).collect();
        self
    }

    /// Type prefix used for `Sort` and `Filter` input types.
    ///
    /// `user` gives `User`, so sorts are typed `[UserSort!]`.
    pub fn type_name(&self) -> String {
        let mut chars = self.api_identifier.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

/// Describes a model action.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionDescriptor {
    /// Root mutation field, e.g. `updateUser`.
    pub operation_name: String,
    /// Key of the model, e.g. `user`.
    pub model_api_identifier: String,
    /// Field of the result object holding the record(s), e.g. `user`.
    pub model_selection_field: String,
    /// Selection used when the caller does not pass one.
    #[serde(default)]
    pub default_selection: FieldSelection,
    /// Declared variables: name to GraphQL type.
    #[serde(default)]
    pub variables: IndexMap<String, String>,
    /// Variables that are action parameters, not model fields.
    #[serde(default)]
    pub param_only_variables: IndexSet<String>,
    #[serde(default)]
    pub namespace: Vec<String>,
    #[serde(default)]
    pub accepts_model_input: bool,
    #[serde(default)]
    pub has_create_or_update_effect: bool,
    /// A model field shares its name with an action parameter.
    #[serde(default)]
    pub has_ambiguous_identifier: bool,
    #[serde(default)]
    pub is_bulk: bool,
    /// The action returns a custom `result` instead of the record.
    #[serde(default)]
    pub has_return_type: bool,
}

impl ActionDescriptor {
    /// Creates a descriptor for a single-record action with no variables.
    pub fn new(
        operation_name: impl Into<String>,
        model_api_identifier: impl Into<String>,
        model_selection_field: impl Into<String>,
    ) -> Self {
        Self {
            operation_name: operation_name.into(),
            model_api_identifier: model_api_identifier.into(),
            model_selection_field: model_selection_field.into(),
            default_selection: FieldSelection::new(),
            variables: IndexMap::new(),
            param_only_variables: IndexSet::new(),
            namespace: Vec::new(),
            accepts_model_input: false,
            has_create_or_update_effect: false,
            has_ambiguous_identifier: false,
            is_bulk: false,
            has_return_type: false,
        }
    }

    /// Declares a variable.
    #[must_use]
    pub fn variable(mut self, name: impl Into<String>, ty: impl Into<String>) -> Self {
        self.variables.insert(name.into(), ty.into());
        self
    }

    /// Declares a parameter-only variable.
    #[must_use]
    pub fn param_only(mut self, name: impl Into<String>, ty: impl Into<String>) -> Self {
        let name = name.into();
        self.param_only_variables.insert(name.clone());
        self.variables.insert(name, ty.into());
        self
    }

    #[must_use]
    pub fn with_default_selection(mut self, selection: FieldSelection) -> Self {
        self.default_selection = selection;
        self
    }

    #[must_use]
    pub fn in_namespace<S: Into<String>>(mut self, namespace: impl IntoIterator<Item = S>) -> Self {
        self.namespace = namespace.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn accepts_model_input(mut self) -> Self {
        self.accepts_model_input = true;
        self
    }

    #[must_use]
    pub fn create_or_update(mut self) -> Self {
        self.has_create_or_update_effect = true;
        self
    }

    #[must_use]
    pub fn ambiguous_identifier(mut self) -> Self {
        self.has_ambiguous_identifier = true;
        self
    }

    #[must_use]
    pub fn bulk(mut self) -> Self {
        self.is_bulk = true;
        self
    }

    #[must_use]
    pub fn returns_result(mut self) -> Self {
        self.has_return_type = true;
        self
    }

    /// Returns true if `name` is declared with the id type.
    pub fn is_id_variable(&self, name: &str) -> bool {
        self.variables
            .get(name)
            .is_some_and(|ty| ty.trim_end_matches('!') == ID_TYPE)
    }

    /// Returns true if flat input should be wrapped under the model key.
    pub fn wraps_model_input(&self) -> bool {
        self.accepts_model_input || self.has_create_or_update_effect
    }
}

/// Describes an action not bound to a model.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalActionDescriptor {
    /// Root mutation field, e.g. `flipAll`.
    pub operation_name: String,
    #[serde(default)]
    pub variables: IndexMap<String, String>,
    #[serde(default)]
    pub namespace: Vec<String>,
}

impl GlobalActionDescriptor {
    /// Creates a descriptor with no variables.
    pub fn new(operation_name: impl Into<String>) -> Self {
        Self {
            operation_name: operation_name.into(),
            variables: IndexMap::new(),
            namespace: Vec::new(),
        }
    }

    /// Declares a variable.
    #[must_use]
    pub fn variable(mut self, name: impl Into<String>, ty: impl Into<String>) -> Self {
        self.variables.insert(name.into(), ty.into());
        self
    }

    #[must_use]
    pub fn in_namespace<S: Into<String>>(mut self, namespace: impl IntoIterator<Item = S>) -> Self {
        self.namespace = namespace.into_iter().map(Into::into).collect();
        self
    }
}
