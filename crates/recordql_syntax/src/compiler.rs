//! Compilation of field selections into GraphQL documents.
//!
//! The compiler walks a [`FieldSelection`] in insertion order and renders one
//! line per selected field. Variables found in field call arguments are named
//! as they are encountered, so the same selection always yields the same
//! document.
//!
//! ```
//! use recordql_syntax::{compile_with_variable_values, BuilderOperation};
//! use recordql_syntax::{FieldCall, FieldSelection, Variable};
//!
//! let op = BuilderOperation::query(FieldSelection::new().call(
//!     "user",
//!     FieldCall::new()
//!         .arg("id", Variable::new("ID").with_value("1"))
//!         .with_subselection(FieldSelection::new().field("name")),
//! ));
//!
//! let compiled = compile_with_variable_values(&op).unwrap();
//! assert_eq!(compiled.query, "query($id: ID) {\n  user(id: $id) {\n    name\n  }\n}");
//! assert_eq!(compiled.variables["id"], "1");
//! ```

use crate::error::{CompileError, CompileResult};
use crate::operation::BuilderOperation;
use crate::selection::{Argument, FieldCall, FieldSelection, Selected, Variable};
use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use serde_json::Value;

const INDENT_SIZE: usize = 2;

/// A compiled document together with the values of its declared variables.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledOperation {
    /// The document text.
    pub query: String,
    /// Values keyed by the names declared in the document signature.
    pub variables: IndexMap<String, Value>,
    /// The operation name, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
}

/// Selection to document compiler.
pub struct Compiler {
    only_present_variable_values: bool,
    output: String,
    indent: usize,
    /// Every variable bound so far, in traversal order.
    variables: IndexMap<String, Variable>,
    /// Explicit variable names anywhere in the operation.
    reserved: IndexSet<String>,
}

impl Compiler {
    /// Creates a compiler.
    ///
    /// With `only_present_variable_values`, variables without a value are
    /// left out of the signature and arguments referencing them are dropped.
    pub fn new(only_present_variable_values: bool) -> Self {
        Self {
            only_present_variable_values,
            output: String::new(),
            indent: 0,
            variables: IndexMap::new(),
            reserved: IndexSet::new(),
        }
    }

    /// Compiles an operation.
    pub fn compile(mut self, operation: &BuilderOperation) -> CompileResult<CompiledOperation> {
        self.indent = 1;
        collect_explicit_names(&operation.fields, &mut self.reserved);
        self.format_selection(&operation.fields)?;
        let body = std::mem::take(&mut self.output);

        let only_present = self.only_present_variable_values;
        let declared: IndexMap<String, Variable> = self
            .variables
            .into_iter()
            .filter(|(_, var)| !only_present || var.is_present())
            .collect();

        let mut query = String::from(operation.kind.as_str());
        if let Some(name) = &operation.name {
            query.push(' ');
            query.push_str(name);
        }
        if !declared.is_empty() {
            let signature: Vec<String> = declared
                .iter()
                .map(|(name, var)| format!("${}: {}", name, var.ty()))
                .collect();
            query.push('(');
            query.push_str(&signature.join(", "));
            query.push(')');
        }
        if !operation.directives.is_empty() {
            query.push(' ');
            query.push_str(&operation.directives.join(" "));
        }
        query.push_str(" {\n");
        query.push_str(&body);
        query.push('}');

        let variables = declared
            .into_iter()
            .filter_map(|(name, var)| var.value().cloned().map(|value| (name, value)))
            .collect();

        Ok(CompiledOperation {
            query,
            variables,
            operation_name: operation.name.clone(),
        })
    }

    fn format_selection(&mut self, selection: &FieldSelection) -> CompileResult<()> {
        for (field, value) in selection.iter() {
            match value {
                Selected::Bool(false) => {}
                Selected::Bool(true) => {
                    self.push_indent();
                    self.output.push_str(field);
                    self.output.push('\n');
                }
                Selected::Selection(nested) => {
                    self.push_indent();
                    self.output.push_str(field);
                    self.format_block(nested)?;
                }
                Selected::Call(call) => {
                    self.push_indent();
                    self.output.push_str(field);
                    self.format_arguments(call)?;
                    match call.subselection() {
                        Some(nested) => self.format_block(nested)?,
                        None => self.output.push('\n'),
                    }
                }
            }
        }
        Ok(())
    }

    fn format_block(&mut self, selection: &FieldSelection) -> CompileResult<()> {
        self.output.push_str(" {\n");
        self.indent += 1;
        self.format_selection(selection)?;
        self.indent -= 1;
        self.push_indent();
        self.output.push_str("}\n");
        Ok(())
    }

    fn format_arguments(&mut self, call: &FieldCall) -> CompileResult<()> {
        let mut rendered = Vec::new();
        for (name, arg) in call.args() {
            match arg {
                Argument::Literal(value) => rendered.push(format!("{name}: {value}")),
                Argument::Variable(var) => {
                    let bound = self.bind(name, var)?;
                    if self.only_present_variable_values && !var.is_present() {
                        continue;
                    }
                    rendered.push(format!("{name}: ${bound}"));
                }
            }
        }
        if !rendered.is_empty() {
            self.output.push('(');
            self.output.push_str(&rendered.join(", "));
            self.output.push(')');
        }
        Ok(())
    }

    /// Assigns a document-level name to a variable.
    ///
    /// Implicit names come from the argument and get a numeric suffix when
    /// the name is bound or reserved by an explicit variable. Explicit names
    /// must not collide with a different explicit variable.
    fn bind(&mut self, arg_name: &str, var: &Variable) -> CompileResult<String> {
        if let Some(explicit) = var.name() {
            if let Some(existing) = self.variables.get(explicit) {
                if existing.ty() == var.ty() && existing.value() == var.value() {
                    return Ok(explicit.to_string());
                }
                return Err(CompileError::DuplicateVariable {
                    name: explicit.to_string(),
                });
            }
            self.variables.insert(explicit.to_string(), var.clone());
            return Ok(explicit.to_string());
        }

        let mut name = arg_name.to_string();
        let mut counter = 1;
        while self.variables.contains_key(&name) || self.reserved.contains(&name) {
            name = format!("{arg_name}{counter}");
            counter += 1;
        }
        self.variables.insert(name.clone(), var.clone());
        Ok(name)
    }

    fn push_indent(&mut self) {
        for _ in 0..(self.indent * INDENT_SIZE) {
            self.output.push(' ');
        }
    }
}

fn collect_explicit_names(selection: &FieldSelection, names: &mut IndexSet<String>) {
    for (_, value) in selection.iter() {
        if let Selected::Call(call) = value {
            for (_, arg) in call.args() {
                if let Argument::Variable(var) = arg {
                    if let Some(name) = var.name() {
                        names.insert(name.to_string());
                    }
                }
            }
        }
        if let Some(nested) = value.subselection() {
            collect_explicit_names(nested, names);
        }
    }
}

/// Compiles an operation to document text.
pub fn compile(
    operation: &BuilderOperation,
    only_present_variable_values: bool,
) -> CompileResult<String> {
    Compiler::new(only_present_variable_values)
        .compile(operation)
        .map(|compiled| compiled.query)
}

/// Compiles an operation and collects the values of the variables it declares.
///
/// Variables without a value are neither declared nor sent.
pub fn compile_with_variable_values(operation: &BuilderOperation) -> CompileResult<CompiledOperation> {
    Compiler::new(true).compile(operation)
}
