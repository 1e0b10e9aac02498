//! Registry of validated capabilities.
//!
//! An explicitly owned store: the capability directory plus an in-memory map
//! of live instances. Sources stay on disk; [`CapabilityRegistry::recover`]
//! rebuilds the map from them at startup.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::domain::sha256_hex;
use crate::metrics::METRICS;
use crate::obs;
use crate::runtime::{CapabilityInstance, CapabilityRuntime, InvokeError, MODULE_EXTENSION};

/// Default age after which [`CapabilityRegistry::cleanup`] removes modules.
pub const DEFAULT_MAX_AGE_DAYS: i64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("module already registered: {0}")]
    DuplicateModule(String),

    #[error("module not found: {0}")]
    ModuleNotFound(String),

    #[error("operation {operation} not found in module {module}")]
    OperationNotFound { module: String, operation: String },

    #[error("{module}.{operation} failed: {message}")]
    Invocation {
        module: String,
        operation: String,
        message: String,
    },

    #[error("registry io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A registered module and its live instance.
#[derive(Debug)]
pub struct RegisteredModule {
    pub module_name: String,
    pub file_location: PathBuf,
    pub created_at: DateTime<Utc>,
    pub source_digest: String,
    pub instance: CapabilityInstance,
}

/// Listing entry for one generated module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleListing {
    pub created_at: DateTime<Utc>,
    pub file_location: PathBuf,
    pub operations: Vec<String>,
    pub source_digest: String,
}

/// Query surface for the external command router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityListing {
    pub built_in: Vec<String>,
    pub generated: BTreeMap<String, ModuleListing>,
}

#[derive(Debug)]
pub struct CapabilityRegistry {
    dir: PathBuf,
    built_in: Vec<String>,
    modules: BTreeMap<String, RegisteredModule>,
}

impl CapabilityRegistry {
    pub fn new(dir: impl Into<PathBuf>, built_in: Vec<String>) -> Self {
        Self {
            dir: dir.into(),
            built_in,
            modules: BTreeMap::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn contains(&self, module_name: &str) -> bool {
        self.modules.contains_key(module_name)
    }

    /// Registered module names in lexical order.
    pub fn module_names(&self) -> Vec<String> {
        self.modules.keys().cloned().collect()
    }

    pub fn get(&self, module_name: &str) -> Option<&RegisteredModule> {
        self.modules.get(module_name)
    }

    pub fn instance_mut(&mut self, module_name: &str) -> Option<&mut CapabilityInstance> {
        self.modules.get_mut(module_name).map(|m| &mut m.instance)
    }

    /// Register a freshly validated instance.
    pub fn register(
        &mut self,
        instance: CapabilityInstance,
        file_location: PathBuf,
        source: &str,
    ) -> Result<(), RegistryError> {
        self.register_at(instance, file_location, source, Utc::now())
    }

    /// Register with an explicit creation time.
    pub fn register_at(
        &mut self,
        instance: CapabilityInstance,
        file_location: PathBuf,
        source: &str,
        created_at: DateTime<Utc>,
    ) -> Result<(), RegistryError> {
        let module_name = instance.module_name().to_string();
        if self.modules.contains_key(&module_name) {
            return Err(RegistryError::DuplicateModule(module_name));
        }

        obs::emit_module_registered(&module_name, instance.operation_names().len());
        METRICS.inc_registrations();

        self.modules.insert(
            module_name.clone(),
            RegisteredModule {
                module_name,
                file_location,
                created_at,
                source_digest: sha256_hex(source.as_bytes()),
                instance,
            },
        );
        Ok(())
    }

    /// Reload every persisted module not yet registered.
    ///
    /// Modules that fail to load are logged and skipped. Returns the names
    /// that were recovered.
    pub fn recover(&mut self, runtime: &CapabilityRuntime) -> Result<Vec<String>, RegistryError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut paths: Vec<PathBuf> = std::fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some(MODULE_EXTENSION))
            .collect();
        paths.sort();

        let mut recovered = Vec::new();
        for path in paths {
            let Some(module_name) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string)
            else {
                continue;
            };
            if self.modules.contains_key(&module_name) {
                continue;
            }

            let source = match std::fs::read_to_string(&path) {
                Ok(source) => source,
                Err(e) => {
                    obs::emit_recovery_skipped(&module_name, &e);
                    continue;
                }
            };
            let instance = match runtime.load_instance_from_source(&module_name, &source) {
                Ok(instance) => instance,
                Err(e) => {
                    obs::emit_recovery_skipped(&module_name, &e);
                    continue;
                }
            };
            let created_at = std::fs::metadata(&path)
                .and_then(|m| m.modified())
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());

            self.register_at(instance, path, &source, created_at)?;
            recovered.push(module_name);
        }

        info!(recovered = recovered.len(), dir = %self.dir.display(), "registry recovery finished");
        Ok(recovered)
    }

    pub fn list_capabilities(&self) -> CapabilityListing {
        let generated = self
            .modules
            .iter()
            .map(|(name, m)| {
                (
                    name.clone(),
                    ModuleListing {
                        created_at: m.created_at,
                        file_location: m.file_location.clone(),
                        operations: m.instance.operation_names(),
                        source_digest: m.source_digest.clone(),
                    },
                )
            })
            .collect();

        CapabilityListing {
            built_in: self.built_in.clone(),
            generated,
        }
    }

    /// Invoke `operation` on a registered module.
    ///
    /// Unknown modules and operations are errors, never silent no-ops.
    pub fn use_capability(
        &mut self,
        module_name: &str,
        operation: &str,
        args: &[Value],
    ) -> Result<Value, RegistryError> {
        let module = self
            .modules
            .get_mut(module_name)
            .ok_or_else(|| RegistryError::ModuleNotFound(module_name.to_string()))?;

        module
            .instance
            .call(operation, args)
            .map_err(|e| match e {
                InvokeError::UnknownOperation(_) => RegistryError::OperationNotFound {
                    module: module_name.to_string(),
                    operation: operation.to_string(),
                },
                other => RegistryError::Invocation {
                    module: module_name.to_string(),
                    operation: operation.to_string(),
                    message: other.to_string(),
                },
            })
    }

    /// Drop a module from memory and delete its file.
    pub fn unregister(&mut self, module_name: &str) -> Result<RegisteredModule, RegistryError> {
        let module = self
            .modules
            .remove(module_name)
            .ok_or_else(|| RegistryError::ModuleNotFound(module_name.to_string()))?;
        match std::fs::remove_file(&module.file_location) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(module)
    }

    /// Remove modules older than `max_age`. Returns the removed names.
    pub fn cleanup(&mut self, max_age: Duration) -> Vec<String> {
        let cutoff = Utc::now() - max_age;
        let expired: Vec<String> = self
            .modules
            .values()
            .filter(|m| m.created_at < cutoff)
            .map(|m| m.module_name.clone())
            .collect();

        let mut removed = Vec::new();
        for name in expired {
            match self.unregister(&name) {
                Ok(_) => removed.push(name),
                Err(e) => warn!(module = %name, error = %e, "cleanup failed to remove module"),
            }
        }
        info!(removed = removed.len(), "registry cleanup finished");
        removed
    }
}
