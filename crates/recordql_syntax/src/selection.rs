//! Field selections.
//!
//! A [`FieldSelection`] describes which fields of a GraphQL object to fetch.
//! Each entry maps a field name to a [`Selected`] value:
//!
//! ```
//! use recordql_syntax::{FieldCall, FieldSelection, Variable};
//!
//! let selection = FieldSelection::new()
//!     .field("id")
//!     .nested("author", FieldSelection::new().field("name"))
//!     .call(
//!         "comments",
//!         FieldCall::new()
//!             .arg("first", Variable::new("Int").with_value(10))
//!             .with_subselection(FieldSelection::new().field("body")),
//!     );
//!
//! assert_eq!(selection.len(), 3);
//! ```

use crate::error::{json_kind, CompileError, CompileResult};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

/// An ordered mapping from field name to what is selected for it.
///
/// Insertion order is kept so compiled documents are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(try_from = "serde_json::Value")]
pub struct FieldSelection {
    fields: IndexMap<String, Selected>,
}

/// What is selected for a single field.
#[derive(Debug, Clone, PartialEq)]
pub enum Selected {
    /// Include (`true`) or exclude (`false`) a scalar field.
    Bool(bool),
    /// Select sub-fields of an object field.
    Selection(FieldSelection),
    /// Call the field with arguments.
    Call(FieldCall),
}

impl Selected {
    /// Returns true unless this is `Bool(false)`.
    pub fn is_selected(&self) -> bool {
        !matches!(self, Self::Bool(false))
    }

    /// Returns the sub-selection, if any.
    pub fn subselection(&self) -> Option<&FieldSelection> {
        match self {
            Self::Bool(_) => None,
            Self::Selection(selection) => Some(selection),
            Self::Call(call) => call.subselection(),
        }
    }
}

impl From<bool> for Selected {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<FieldSelection> for Selected {
    fn from(value: FieldSelection) -> Self {
        Self::Selection(value)
    }
}

impl From<FieldCall> for Selected {
    fn from(value: FieldCall) -> Self {
        Self::Call(value)
    }
}

impl FieldSelection {
    /// Creates an empty selection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Selects a scalar field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.fields.insert(name.into(), Selected::Bool(true));
        self
    }

    /// Explicitly excludes a field.
    #[must_use]
    pub fn exclude(mut self, name: impl Into<String>) -> Self {
        self.fields.insert(name.into(), Selected::Bool(false));
        self
    }

    /// Selects sub-fields of an object field.
    #[must_use]
    pub fn nested(mut self, name: impl Into<String>, selection: FieldSelection) -> Self {
        self.fields
            .insert(name.into(), Selected::Selection(selection));
        self
    }

    /// Selects a field called with arguments.
    #[must_use]
    pub fn call(mut self, name: impl Into<String>, call: FieldCall) -> Self {
        self.fields.insert(name.into(), Selected::Call(call));
        self
    }

    /// Inserts an entry, returning the previous one.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Selected>) -> Option<Selected> {
        self.fields.insert(name.into(), value.into())
    }

    /// Inserts `name: true` unless the field already has an entry.
    ///
    /// An explicit `false` entry is left alone.
    pub fn ensure(&mut self, name: &str) {
        if !self.fields.contains_key(name) {
            self.fields.insert(name.to_string(), Selected::Bool(true));
        }
    }

    /// Gets the entry for a field.
    pub fn get(&self, name: &str) -> Option<&Selected> {
        self.fields.get(name)
    }

    /// Removes the entry for a field, keeping the order of the others.
    pub fn remove(&mut self, name: &str) -> Option<Selected> {
        self.fields.shift_remove(name)
    }

    /// Returns true if the field is present and not excluded.
    pub fn is_selected(&self, name: &str) -> bool {
        self.fields.get(name).is_some_and(Selected::is_selected)
    }

    /// Iterates over all entries, including excluded ones.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Selected)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Iterates over the names of selected fields.
    pub fn selected_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|(_, v)| v.is_selected())
            .map(|(k, _)| k.as_str())
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Merges another selection into this one.
    ///
    /// Entries from `other` win, except that two nested selections for the
    /// same field are merged recursively.
    pub fn merge(&mut self, other: &FieldSelection) {
        for (name, value) in &other.fields {
            match (self.fields.get_mut(name), value) {
                (Some(Selected::Selection(mine)), Selected::Selection(theirs)) => {
                    mine.merge(theirs);
                }
                _ => {
                    self.fields.insert(name.clone(), value.clone());
                }
            }
        }
    }

    /// Wraps this selection inside the given path of object fields.
    ///
    /// `["a", "b"]` turns `{ x }` into `{ a { b { x } } }`.
    #[must_use]
    pub fn nest_under<S: AsRef<str>>(self, path: &[S]) -> FieldSelection {
        path.iter().rev().fold(self, |inner, segment| {
            FieldSelection::new().nested(segment.as_ref(), inner)
        })
    }

    /// Builds a selection from a JSON object.
    ///
    /// `true`/`false` become boolean entries, `null` is treated as `false`
    /// and objects become nested selections. Any other leaf is rejected.
    pub fn from_json(value: &Value) -> CompileResult<Self> {
        let Value::Object(map) = value else {
            return Err(CompileError::NotAnObject {
                found: json_kind(value),
            });
        };

        let mut fields = IndexMap::with_capacity(map.len());
        for (name, entry) in map {
            let selected = match entry {
                Value::Bool(b) => Selected::Bool(*b),
                Value::Null => Selected::Bool(false),
                Value::Object(_) => Selected::Selection(Self::from_json(entry)?),
                other => {
                    return Err(CompileError::InvalidSelection {
                        field: name.clone(),
                        found: json_kind(other),
                    })
                }
            };
            fields.insert(name.clone(), selected);
        }
        Ok(Self { fields })
    }
}

impl TryFrom<Value> for FieldSelection {
    type Error = CompileError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_json(&value)
    }
}

impl<K: Into<String>, V: Into<Selected>> FromIterator<(K, V)> for FieldSelection {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// A field invoked with arguments, optionally with its own sub-selection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldCall {
    args: IndexMap<String, Argument>,
    subselection: Option<FieldSelection>,
}

impl FieldCall {
    /// Creates a call with no arguments.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a call from an argument list and an optional sub-selection.
    pub fn with_args<K, A>(
        args: impl IntoIterator<Item = (K, A)>,
        subselection: Option<FieldSelection>,
    ) -> Self
    where
        K: Into<String>,
        A: Into<Argument>,
    {
        Self {
            args: args.into_iter().map(|(k, a)| (k.into(), a.into())).collect(),
            subselection,
        }
    }

    /// Adds an argument.
    #[must_use]
    pub fn arg(mut self, name: impl Into<String>, value: impl Into<Argument>) -> Self {
        self.args.insert(name.into(), value.into());
        self
    }

    /// Sets the sub-selection.
    #[must_use]
    pub fn with_subselection(mut self, selection: FieldSelection) -> Self {
        self.subselection = Some(selection);
        self
    }

    /// Returns the arguments in insertion order.
    pub fn args(&self) -> impl Iterator<Item = (&str, &Argument)> {
        self.args.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns the sub-selection.
    pub fn subselection(&self) -> Option<&FieldSelection> {
        self.subselection.as_ref()
    }
}

/// A field call argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    /// A value rendered inline as JSON.
    Literal(Value),
    /// A reference to an operation variable.
    Variable(Variable),
}

impl From<Variable> for Argument {
    fn from(value: Variable) -> Self {
        Self::Variable(value)
    }
}

impl From<Value> for Argument {
    fn from(value: Value) -> Self {
        Self::Literal(value)
    }
}

/// A typed placeholder bound to a concrete value at dispatch time.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    ty: String,
    name: Option<String>,
    value: Option<Value>,
}

impl Variable {
    /// Creates a variable of the given GraphQL type, e.g. `"ID!"`.
    pub fn new(ty: impl Into<String>) -> Self {
        Self {
            ty: ty.into(),
            name: None,
            value: None,
        }
    }

    /// Gives the variable an explicit name instead of the argument's name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Attaches a value. `null` leaves the variable absent.
    #[must_use]
    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        let value = value.into();
        self.value = (!value.is_null()).then_some(value);
        self
    }

    /// Attaches an optional value.
    #[must_use]
    pub fn with_optional_value(self, value: Option<impl Into<Value>>) -> Self {
        match value {
            Some(value) => self.with_value(value),
            None => self,
        }
    }

    /// The declared GraphQL type.
    pub fn ty(&self) -> &str {
        &self.ty
    }

    /// The explicit name, if one was given.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The concrete value, if present.
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// Returns true if a non-null value is attached.
    pub fn is_present(&self) -> bool {
        self.value.is_some()
    }
}
