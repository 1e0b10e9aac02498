//! Live capability instances.

use std::collections::BTreeMap;
use std::sync::Arc;

use rhai::{CallFnOptions, Dynamic, Engine, Scope, AST};
use serde_json::Value;

use super::error::InvokeError;

/// A loaded, instantiated capability module.
///
/// Holds the factory state returned by `create()`; every operation call runs
/// with that state bound as `this`, so mutations persist between calls.
pub struct CapabilityInstance {
    module_name: String,
    engine: Arc<Engine>,
    ast: AST,
    scope: Scope<'static>,
    state: Dynamic,
    operations: BTreeMap<String, Vec<usize>>,
}

impl std::fmt::Debug for CapabilityInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityInstance")
            .field("module_name", &self.module_name)
            .field("operations", &self.operations)
            .finish_non_exhaustive()
    }
}

impl CapabilityInstance {
    pub(crate) fn new(
        module_name: String,
        engine: Arc<Engine>,
        ast: AST,
        scope: Scope<'static>,
        state: Dynamic,
        operations: BTreeMap<String, Vec<usize>>,
    ) -> Self {
        Self {
            module_name,
            engine,
            ast,
            scope,
            state,
            operations,
        }
    }

    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    /// Operation names in lexical order.
    pub fn operation_names(&self) -> Vec<String> {
        self.operations.keys().cloned().collect()
    }

    pub fn has_operation(&self, name: &str) -> bool {
        self.operations.contains_key(name)
    }

    /// Declared arities of `name`, ascending. Overloads share a name.
    pub fn arities(&self, name: &str) -> Option<&[usize]> {
        self.operations.get(name).map(Vec::as_slice)
    }

    /// JSON snapshot of the instance state.
    pub fn state(&self) -> Result<Value, InvokeError> {
        to_json(&self.state)
    }

    /// Invoke `operation` with JSON arguments.
    pub fn call(&mut self, operation: &str, args: &[Value]) -> Result<Value, InvokeError> {
        let arities = self
            .operations
            .get(operation)
            .ok_or_else(|| InvokeError::UnknownOperation(operation.to_string()))?;
        if !arities.contains(&args.len()) {
            return Err(InvokeError::Arity {
                operation: operation.to_string(),
                given: args.len(),
                expected: arities.clone(),
            });
        }

        let dyn_args = args
            .iter()
            .map(|v| rhai::serde::to_dynamic(v).map_err(|e| InvokeError::Conversion(e.to_string())))
            .collect::<Result<Vec<Dynamic>, _>>()?;

        let options = CallFnOptions::new()
            .eval_ast(false)
            .rewind_scope(true)
            .bind_this_ptr(&mut self.state);

        let result = self
            .engine
            .call_fn_with_options::<Dynamic>(options, &mut self.scope, &self.ast, operation, dyn_args)
            .map_err(|e| InvokeError::Script {
                operation: operation.to_string(),
                message: e.to_string(),
            })?;

        to_json(&result)
    }
}

/// Convert a script value to JSON. Values with no JSON shape (function
/// pointers, timestamps) degrade to their display string.
pub(crate) fn to_json(value: &Dynamic) -> Result<Value, InvokeError> {
    match rhai::serde::from_dynamic::<Value>(value) {
        Ok(v) => Ok(v),
        Err(_) if !value.is_map() && !value.is_array() => Ok(Value::String(value.to_string())),
        Err(e) => Err(InvokeError::Conversion(e.to_string())),
    }
}
