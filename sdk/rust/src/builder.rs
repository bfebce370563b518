//! Operation builders.
//!
//! Each builder turns a descriptor plus caller options into a compiled
//! [`PreparedOperation`]. Building is synchronous and is the only place
//! selection or variable problems are reported; a prepared operation can
//! always be sent.

use crate::descriptor::{ActionDescriptor, GlobalActionDescriptor, ModelDescriptor};
use crate::error::{BuildError, BuildResult};
use crate::transport::GraphQLRequest;
use indexmap::IndexMap;
use recordql_syntax::{
    compile_with_variable_values, BuilderOperation, CompiledOperation, FieldCall, FieldSelection,
    OperationKind, Variable,
};
use serde_json::{json, Map, Value};
use tracing::warn;

/// Directive that turns a query into a live query.
pub const DEFAULT_LIVE_DIRECTIVE: &str = "@live";

/// Options for single-record reads.
#[derive(Debug, Clone, Default)]
pub struct SelectOptions {
    /// Selection overriding the model's default.
    pub select: Option<FieldSelection>,
    /// Subscribe to updates instead of reading once.
    pub live: bool,
}

impl SelectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn select(mut self, selection: FieldSelection) -> Self {
        self.select = Some(selection);
        self
    }

    #[must_use]
    pub fn live(mut self) -> Self {
        self.live = true;
        self
    }
}

/// Options for connection reads.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindManyOptions {
    pub select: Option<FieldSelection>,
    pub live: bool,
    pub sort: Option<Value>,
    pub filter: Option<Value>,
    pub search: Option<String>,
    pub first: Option<u32>,
    pub last: Option<u32>,
    pub after: Option<String>,
    pub before: Option<String>,
}

impl FindManyOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn select(mut self, selection: FieldSelection) -> Self {
        self.select = Some(selection);
        self
    }

    #[must_use]
    pub fn live(mut self) -> Self {
        self.live = true;
        self
    }

    #[must_use]
    pub fn sort(mut self, sort: Value) -> Self {
        self.sort = Some(sort);
        self
    }

    #[must_use]
    pub fn filter(mut self, filter: Value) -> Self {
        self.filter = Some(filter);
        self
    }

    #[must_use]
    pub fn search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    #[must_use]
    pub fn first(mut self, first: u32) -> Self {
        self.first = Some(first);
        self
    }

    #[must_use]
    pub fn last(mut self, last: u32) -> Self {
        self.last = Some(last);
        self
    }

    #[must_use]
    pub fn after(mut self, cursor: impl Into<String>) -> Self {
        self.after = Some(cursor.into());
        self
    }

    #[must_use]
    pub fn before(mut self, cursor: impl Into<String>) -> Self {
        self.before = Some(cursor.into());
        self
    }

    /// Options for the page after `cursor`, keeping the page size.
    #[must_use]
    pub fn next_page(&self, cursor: impl Into<String>) -> Self {
        Self {
            first: self.first.or(self.last),
            last: None,
            after: Some(cursor.into()),
            before: None,
            ..self.clone()
        }
    }

    /// Options for the page before `cursor`, keeping the page size.
    #[must_use]
    pub fn previous_page(&self, cursor: impl Into<String>) -> Self {
        Self {
            first: None,
            last: self.first.or(self.last),
            after: None,
            before: Some(cursor.into()),
            ..self.clone()
        }
    }
}

/// A compiled operation and what is needed to read its response.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedOperation {
    pub kind: OperationKind,
    pub compiled: CompiledOperation,
    /// Path from `data` to the root field's value.
    pub root_path: Vec<String>,
    /// Selection the returned records are hydrated with.
    pub selection: FieldSelection,
}

impl PreparedOperation {
    /// The request to hand to the transport.
    pub fn request(&self) -> GraphQLRequest {
        GraphQLRequest::from(self.compiled.clone())
    }

    /// Finds the root field's value inside the response `data`.
    ///
    /// A missing segment yields `None`; an explicit `null` yields `Some(Null)`.
    pub fn root<'v>(&self, data: &'v Value) -> Option<&'v Value> {
        self.root_path
            .iter()
            .try_fold(data, |value, segment| value.get(segment))
    }
}

/// Builds operations from descriptors.
#[derive(Debug, Clone)]
pub struct OperationBuilder {
    live_directive: String,
}

impl Default for OperationBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_LIVE_DIRECTIVE)
    }
}

impl OperationBuilder {
    /// Creates a builder that marks live queries with `live_directive`.
    pub fn new(live_directive: impl Into<String>) -> Self {
        Self {
            live_directive: live_directive.into(),
        }
    }

    /// Reads one record by id.
    pub fn find_one(
        &self,
        model: &ModelDescriptor,
        id: &str,
        options: &SelectOptions,
    ) -> BuildResult<PreparedOperation> {
        let selection = effective_selection(options.select.as_ref(), &model.default_selection);
        let call = FieldCall::new()
            .arg("id", Variable::new("GadgetID!").with_value(id))
            .with_subselection(selection.clone());

        self.finish(
            reading(options.live),
            &model.namespace,
            &model.find_one_operation,
            call,
            selection,
            options.live,
        )
    }

    /// Reads a page of records.
    pub fn find_many(
        &self,
        model: &ModelDescriptor,
        options: &FindManyOptions,
    ) -> BuildResult<PreparedOperation> {
        let node = effective_selection(options.select.as_ref(), &model.default_selection);
        let connection = FieldSelection::new()
            .nested(
                "pageInfo",
                FieldSelection::new()
                    .field("hasNextPage")
                    .field("hasPreviousPage")
                    .field("startCursor")
                    .field("endCursor"),
            )
            .nested(
                "edges",
                FieldSelection::new()
                    .field("cursor")
                    .nested("node", node.clone()),
            );

        let type_name = model.type_name();
        let call = FieldCall::new()
            .arg("after", Variable::new("String").with_optional_value(options.after.clone()))
            .arg("first", Variable::new("Int").with_optional_value(options.first))
            .arg("before", Variable::new("String").with_optional_value(options.before.clone()))
            .arg("last", Variable::new("Int").with_optional_value(options.last))
            .arg(
                "sort",
                Variable::new(format!("[{type_name}Sort!]")).with_optional_value(options.sort.clone()),
            )
            .arg(
                "filter",
                Variable::new(format!("[{type_name}Filter!]"))
                    .with_optional_value(options.filter.clone()),
            )
            .arg("search", Variable::new("String").with_optional_value(options.search.clone()))
            .with_subselection(connection);

        self.finish(
            reading(options.live),
            &model.namespace,
            &model.find_many_operation,
            call,
            node,
            options.live,
        )
    }

    /// Reads the first record matching the options.
    pub fn find_first(
        &self,
        model: &ModelDescriptor,
        options: &FindManyOptions,
    ) -> BuildResult<PreparedOperation> {
        let options = FindManyOptions {
            first: Some(1),
            last: None,
            ..options.clone()
        };
        self.find_many(model, &options)
    }

    /// Reads records whose `field` equals `value`.
    ///
    /// Asks for two records so a non-unique match can be detected.
    pub fn find_by_field(
        &self,
        model: &ModelDescriptor,
        field: &str,
        value: &Value,
        options: &SelectOptions,
    ) -> BuildResult<PreparedOperation> {
        let options = FindManyOptions {
            select: options.select.clone(),
            live: options.live,
            filter: Some(json!({ field: { "equals": value } })),
            first: Some(2),
            ..FindManyOptions::default()
        };
        self.find_many(model, &options)
    }

    /// Runs a model action.
    ///
    /// Single actions take an object of variables. Bulk actions take either
    /// a list of ids, a list of per-record inputs, or an object that already
    /// has the `ids`/`inputs` shape.
    pub fn action(
        &self,
        action: &ActionDescriptor,
        variables: Value,
        options: &SelectOptions,
    ) -> BuildResult<PreparedOperation> {
        let variables = if action.is_bulk {
            bulk_variables(action, variables)?
        } else {
            let variables = into_object(&action.operation_name, variables)?;
            disambiguate_action_variables(action, variables)?
        };

        let selection = effective_selection(options.select.as_ref(), &action.default_selection);
        let mut result = action_result_selection();
        if action.has_return_type {
            result = result.field(if action.is_bulk { "results" } else { "result" });
        } else {
            result = result.nested(action.model_selection_field.as_str(), selection.clone());
        }

        let call = declared_arguments(&action.operation_name, &action.variables, variables)
            .with_subselection(result);
        self.finish(
            OperationKind::Mutation,
            &action.namespace,
            &action.operation_name,
            call,
            selection,
            false,
        )
    }

    /// Runs an action that is not bound to a model.
    pub fn global_action(
        &self,
        action: &GlobalActionDescriptor,
        variables: Value,
    ) -> BuildResult<PreparedOperation> {
        let variables = into_object(&action.operation_name, variables)?;
        let result = action_result_selection().field("result");
        let call = declared_arguments(&action.operation_name, &action.variables, variables)
            .with_subselection(result);
        self.finish(
            OperationKind::Mutation,
            &action.namespace,
            &action.operation_name,
            call,
            FieldSelection::new(),
            false,
        )
    }

    fn finish(
        &self,
        kind: OperationKind,
        namespace: &[String],
        root_field: &str,
        call: FieldCall,
        selection: FieldSelection,
        live: bool,
    ) -> BuildResult<PreparedOperation> {
        let fields = FieldSelection::new()
            .call(root_field, call)
            .nest_under(namespace);
        let mut operation = BuilderOperation::new(kind, fields).named(root_field);
        if live {
            operation = operation.directive(self.live_directive.as_str());
        }

        let compiled = compile_with_variable_values(&operation)?;
        let mut root_path = namespace.to_vec();
        root_path.push(root_field.to_string());

        Ok(PreparedOperation {
            kind,
            compiled,
            root_path,
            selection,
        })
    }
}

/// Wraps flat action variables under the model key when the action expects
/// model input.
///
/// `id` variables and param-only variables stay at the top level. Variables
/// that already carry an object under the model key are left alone. When a
/// model field shadows a parameter name, flat input cannot be told apart
/// from parameters and is rejected.
pub fn disambiguate_action_variables(
    action: &ActionDescriptor,
    variables: Map<String, Value>,
) -> BuildResult<Map<String, Value>> {
    let model_key = action.model_api_identifier.as_str();

    if action.has_ambiguous_identifier {
        let unexpected: Vec<String> = variables
            .keys()
            .filter(|key| {
                key.as_str() != model_key
                    && !action.param_only_variables.contains(key.as_str())
                    && !action.is_id_variable(key)
            })
            .cloned()
            .collect();
        if !unexpected.is_empty() {
            return Err(BuildError::VariableMismatch {
                operation: action.operation_name.clone(),
                model: model_key.to_string(),
                unexpected,
            });
        }
    }

    let already_nested = matches!(variables.get(model_key), Some(Value::Object(_)));
    if !action.wraps_model_input() || already_nested || !action.variables.contains_key(model_key) {
        return Ok(variables);
    }

    let mut wrapped = Map::new();
    let mut model_input = Map::new();
    for (key, value) in variables {
        if action.param_only_variables.contains(key.as_str()) || action.is_id_variable(&key) {
            wrapped.insert(key, value);
        } else {
            model_input.insert(key, value);
        }
    }
    wrapped.insert(model_key.to_string(), Value::Object(model_input));
    Ok(wrapped)
}

fn bulk_variables(action: &ActionDescriptor, variables: Value) -> BuildResult<Map<String, Value>> {
    match variables {
        Value::Array(items) if items.iter().all(Value::is_string) => {
            let mut map = Map::new();
            map.insert("ids".into(), Value::Array(items));
            Ok(map)
        }
        Value::Array(items) => {
            let inputs = items
                .into_iter()
                .map(|item| {
                    let item = into_object(&action.operation_name, item)?;
                    disambiguate_action_variables(action, item).map(Value::Object)
                })
                .collect::<BuildResult<Vec<_>>>()?;
            let mut map = Map::new();
            map.insert("inputs".into(), Value::Array(inputs));
            Ok(map)
        }
        other => {
            let mut map = into_object(&action.operation_name, other)?;
            if let Some(Value::Array(inputs)) = map.remove("inputs") {
                let inputs = inputs
                    .into_iter()
                    .map(|item| {
                        let item = into_object(&action.operation_name, item)?;
                        disambiguate_action_variables(action, item).map(Value::Object)
                    })
                    .collect::<BuildResult<Vec<_>>>()?;
                map.insert("inputs".into(), Value::Array(inputs));
            }
            Ok(map)
        }
    }
}

/// One argument per declared variable, valued from `variables`.
///
/// Undeclared keys cannot be sent and are dropped.
fn declared_arguments(
    operation: &str,
    declared: &IndexMap<String, String>,
    mut variables: Map<String, Value>,
) -> FieldCall {
    let call = declared.iter().fold(FieldCall::new(), |call, (name, ty)| {
        call.arg(
            name.as_str(),
            Variable::new(ty.as_str()).with_optional_value(variables.remove(name)),
        )
    });
    if !variables.is_empty() {
        let dropped: Vec<&str> = variables.keys().map(String::as_str).collect();
        warn!(operation, ?dropped, "dropping undeclared variables");
    }
    call
}

fn action_result_selection() -> FieldSelection {
    FieldSelection::new().field("success").nested(
        "errors",
        FieldSelection::new().field("message").field("code").nested(
            "... on InvalidRecordError",
            FieldSelection::new().nested(
                "validationErrors",
                FieldSelection::new().field("message").field("apiIdentifier"),
            ),
        ),
    )
}

fn effective_selection(select: Option<&FieldSelection>, default: &FieldSelection) -> FieldSelection {
    let mut selection = select.unwrap_or(default).clone();
    selection.ensure("id");
    selection
}

fn reading(live: bool) -> OperationKind {
    if live {
        OperationKind::Subscription
    } else {
        OperationKind::Query
    }
}

fn into_object(operation: &str, value: Value) -> BuildResult<Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(BuildError::VariablesNotAnObject {
            operation: operation.to_string(),
            found: match other {
                Value::Bool(_) => "a boolean",
                Value::Number(_) => "a number",
                Value::String(_) => "a string",
                _ => "an array",
            },
        }),
    }
}
