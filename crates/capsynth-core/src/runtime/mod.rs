//! Restricted interpreter that hosts generated capabilities.
//!
//! Capabilities are Rhai scripts. Each must define a public, zero-argument
//! factory `fn create()` returning an object map; every other public function
//! not starting with `_` is an operation, invoked with that map bound as
//! `this`. The engine has no module resolver, `eval` is disabled, resource
//! limits bound runaway scripts, and the only host access is the workspace
//! file helpers in [`host`].
//!
//! # Modules
//!
//! - [`error`]: `FaultKind`, `LoadError`, `InvokeError`
//! - [`host`]: workspace-scoped host functions
//! - [`instance`]: `CapabilityInstance`

pub mod error;
pub mod host;
pub mod instance;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rhai::module_resolvers::DummyModuleResolver;
use rhai::{CallFnOptions, Dynamic, Engine, FnAccess, Scope, AST};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub use error::{FaultKind, InvokeError, LoadError};
pub use instance::CapabilityInstance;

/// Name of the factory every capability module must define.
pub const ENTRY_POINT: &str = "create";

/// File extension of persisted capability modules.
pub const MODULE_EXTENSION: &str = "rhai";

/// Interpreter resource limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeLimits {
    pub max_operations: u64,
    pub max_call_levels: usize,
    pub max_string_size: usize,
    pub max_array_size: usize,
    pub max_map_size: usize,
    /// Nesting depth allowed in top-level expressions.
    pub max_expr_depth: usize,
    /// Nesting depth allowed inside function bodies.
    pub max_function_expr_depth: usize,
}

impl Default for RuntimeLimits {
    fn default() -> Self {
        Self {
            max_operations: 1_000_000,
            max_call_levels: 32,
            max_string_size: 1 << 20,
            max_array_size: 10_000,
            max_map_size: 10_000,
            max_expr_depth: 64,
            max_function_expr_depth: 32,
        }
    }
}

/// A compiled module whose top-level statements have run.
pub struct LoadedNamespace {
    pub module_name: String,
    ast: AST,
    scope: Scope<'static>,
}

impl LoadedNamespace {
    /// Public function names defined by the module, including the factory.
    pub fn public_functions(&self) -> Vec<String> {
        self.ast
            .iter_functions()
            .filter(|f| f.access == FnAccess::Public)
            .map(|f| f.name.to_string())
            .collect()
    }
}

/// The shared interpreter used to check, load and instantiate capabilities.
#[derive(Clone)]
pub struct CapabilityRuntime {
    engine: Arc<Engine>,
    workspace: PathBuf,
}

impl std::fmt::Debug for CapabilityRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRuntime")
            .field("workspace", &self.workspace)
            .finish_non_exhaustive()
    }
}

impl CapabilityRuntime {
    pub fn new(workspace: impl Into<PathBuf>, limits: &RuntimeLimits) -> Self {
        let workspace = workspace.into();
        let mut engine = Engine::new();

        engine.set_module_resolver(DummyModuleResolver::new());
        engine.disable_symbol("eval");
        engine
            .set_max_operations(limits.max_operations)
            .set_max_call_levels(limits.max_call_levels)
            .set_max_string_size(limits.max_string_size)
            .set_max_array_size(limits.max_array_size)
            .set_max_map_size(limits.max_map_size)
            .set_max_expr_depths(limits.max_expr_depth, limits.max_function_expr_depth);
        engine.on_print(|text| debug!(target: "capsynth::script", "{text}"));
        engine.on_debug(|text, _source, pos| {
            debug!(target: "capsynth::script", position = %pos, "{text}")
        });

        host::register(&mut engine, &workspace);

        Self {
            engine: Arc::new(engine),
            workspace,
        }
    }

    /// Directory the host file helpers are confined to.
    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Parse `source` without running it.
    pub fn check_syntax(&self, source: &str) -> Result<AST, LoadError> {
        self.engine
            .compile(source)
            .map_err(|e| LoadError::new(FaultKind::Syntax, e.to_string()))
    }

    /// Read, compile and evaluate the top level of a persisted module.
    pub fn load_namespace(&self, module_name: &str, path: &Path) -> Result<LoadedNamespace, LoadError> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            LoadError::new(
                FaultKind::Runtime,
                format!("cannot read {}: {e}", path.display()),
            )
        })?;
        self.load_namespace_from_source(module_name, &source)
    }

    /// Compile and evaluate the top level of `source` already in memory.
    pub fn load_namespace_from_source(
        &self,
        module_name: &str,
        source: &str,
    ) -> Result<LoadedNamespace, LoadError> {
        let ast = self.check_syntax(source)?;

        let mut scope = Scope::new();
        self.engine
            .run_ast_with_scope(&mut scope, &ast)
            .map_err(|e| LoadError::from_eval(&e))?;

        debug!(module = module_name, "namespace loaded");
        Ok(LoadedNamespace {
            module_name: module_name.to_string(),
            ast,
            scope,
        })
    }

    /// Confirm the namespace exposes the factory contract.
    pub fn locate_entry_point(&self, namespace: &LoadedNamespace) -> Result<(), LoadError> {
        let mut factories = namespace
            .ast
            .iter_functions()
            .filter(|f| f.name == ENTRY_POINT);

        let Some(found) = factories.find(|f| f.params.is_empty()) else {
            return Err(LoadError::new(
                FaultKind::MissingEntryPoint,
                format!("module defines no zero-argument `fn {ENTRY_POINT}()` factory"),
            ));
        };
        if found.access != FnAccess::Public {
            return Err(LoadError::new(
                FaultKind::MissingEntryPoint,
                format!("`fn {ENTRY_POINT}()` must be public"),
            ));
        }
        Ok(())
    }

    /// Call the factory and wrap the resulting state in a live instance.
    pub fn instantiate(&self, namespace: LoadedNamespace) -> Result<CapabilityInstance, LoadError> {
        let LoadedNamespace {
            module_name,
            ast,
            mut scope,
        } = namespace;

        let state = self
            .engine
            .call_fn_with_options::<Dynamic>(
                CallFnOptions::new().eval_ast(false),
                &mut scope,
                &ast,
                ENTRY_POINT,
                (),
            )
            .map_err(|e| LoadError::from_eval(&e))?;

        if !state.is_map() {
            return Err(LoadError::new(
                FaultKind::MissingEntryPoint,
                format!(
                    "`{ENTRY_POINT}()` must return an object map, got {}",
                    state.type_name()
                ),
            ));
        }

        let mut operations: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for f in ast.iter_functions() {
            if f.access != FnAccess::Public
                || f.name == ENTRY_POINT
                || f.name.starts_with('_')
                || f.name.contains('$')
            {
                continue;
            }
            operations
                .entry(f.name.to_string())
                .or_default()
                .push(f.params.len());
        }
        for arities in operations.values_mut() {
            arities.sort_unstable();
            arities.dedup();
        }

        debug!(module = %module_name, operations = operations.len(), "instantiated");
        Ok(CapabilityInstance::new(
            module_name,
            Arc::clone(&self.engine),
            ast,
            scope,
            state,
            operations,
        ))
    }

    /// Load, locate and instantiate in one step, without correction.
    pub fn load_instance(&self, module_name: &str, path: &Path) -> Result<CapabilityInstance, LoadError> {
        let namespace = self.load_namespace(module_name, path)?;
        self.locate_entry_point(&namespace)?;
        self.instantiate(namespace)
    }

    /// Like [`Self::load_instance`], for source the caller has already read.
    pub fn load_instance_from_source(
        &self,
        module_name: &str,
        source: &str,
    ) -> Result<CapabilityInstance, LoadError> {
        let namespace = self.load_namespace_from_source(module_name, source)?;
        self.locate_entry_point(&namespace)?;
        self.instantiate(namespace)
    }
}

/// On-disk location of a module inside `dir`.
pub fn module_path(dir: &Path, module_name: &str) -> PathBuf {
    dir.join(format!("{module_name}.{MODULE_EXTENSION}"))
}
