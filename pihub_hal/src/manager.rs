//! Module manager.
//!
//! Owns the live table of named module instances, applies initialize batches
//! and routes actions to the right instance.
//!
//! # Locking
//!
//! | Lock                 | Held by                       | Scope                         |
//! |----------------------|-------------------------------|-------------------------------|
//! | `init_gate` (mutex)  | `initialize_modules`          | whole batch                   |
//! | `live` (rwlock)      | swap (write) / lookup (read)  | table access only             |
//! | per-module mutex     | `act`, `stop`                 | one driver call               |
//!
//! An action never holds the table lock while it talks to hardware, so one
//! slow module does not block lookups of the others. Bus-level serialization
//! lives in the resource handles.

use parking_lot::{Mutex, RwLock};
use pihub_common::binder::{ConfigBinder, RawConfig};
use pihub_common::error::ModuleError;
use pihub_common::module::{Module, ModuleSpec, ModuleState};
use pihub_common::resources::ResourceProvider;
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::module_registry::ModuleRegistry;

/// A live module: its name, driver kind and the guarded driver instance.
pub struct ActiveModule {
    name: String,
    source: String,
    slot: Mutex<ModuleSlot>,
}

struct ModuleSlot {
    state: ModuleState,
    instance: Box<dyn Module>,
}

impl ActiveModule {
    /// Module name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Driver kind.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ModuleState {
        self.slot.lock().state
    }

    fn act(&self, action: &str, request: &ConfigBinder<'_>) -> Result<Value, ModuleError> {
        let mut slot = self.slot.lock();
        if slot.state != ModuleState::Ready {
            return Err(ModuleError::InvalidState {
                state: slot.state.to_string(),
                operation: "act",
            });
        }
        slot.instance.act(action, request)
    }

    fn stop(&self) -> Result<(), ModuleError> {
        let mut slot = self.slot.lock();
        if slot.state == ModuleState::Stopped {
            return Ok(());
        }
        slot.state = ModuleState::Stopped;
        slot.instance.stop()
    }
}

/// Summary of one live module.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleInfo {
    /// Module name.
    pub name: String,
    /// Driver kind.
    pub source: String,
    /// Lifecycle state.
    pub state: ModuleState,
}

/// Owner of the live module table.
pub struct ModuleManager {
    registry: ModuleRegistry,
    resources: Arc<ResourceProvider>,
    live: RwLock<HashMap<String, Arc<ActiveModule>>>,
    init_gate: Mutex<()>,
}

impl ModuleManager {
    /// Create a manager with an empty live table.
    pub fn new(registry: ModuleRegistry, resources: Arc<ResourceProvider>) -> Self {
        info!(
            "ModuleManager created with {} sources on platform '{}'",
            registry.list_sources().len(),
            resources.platform_name()
        );
        Self {
            registry,
            resources,
            live: RwLock::new(HashMap::new()),
            init_gate: Mutex::new(()),
        }
    }

    /// Replace the live table with freshly initialized modules.
    ///
    /// The batch is all-or-nothing: if any spec fails to resolve or
    /// initialize, every instance constructed during this call is stopped and
    /// the previous table stays live. On success the new table is swapped in
    /// and every previously-live module is stopped.
    ///
    /// Returns the number of live modules afterwards.
    ///
    /// # Errors
    /// - `Validation` when two specs share a name
    /// - `Initialize { module, source }` naming the spec that failed
    pub fn initialize_modules(&self, specs: Vec<ModuleSpec>) -> Result<usize, ModuleError> {
        let _gate = self.init_gate.lock();
        info!("Initializing batch of {} modules", specs.len());

        let mut names = HashSet::with_capacity(specs.len());
        for spec in &specs {
            if !names.insert(spec.name.as_str()) {
                return Err(ModuleError::Validation(format!(
                    "duplicate module name: {}",
                    spec.name
                )));
            }
        }

        let mut fresh: Vec<Arc<ActiveModule>> = Vec::with_capacity(specs.len());
        for spec in specs {
            match self.build(&spec) {
                Ok(module) => fresh.push(module),
                Err(err) => {
                    warn!("Module '{}' ({}) failed: {}", spec.name, spec.source, err);
                    stop_all("aborted batch", fresh);
                    return Err(ModuleError::Initialize {
                        module: spec.name,
                        source: Box::new(err),
                    });
                }
            }
        }

        let table: HashMap<String, Arc<ActiveModule>> = fresh
            .into_iter()
            .map(|module| (module.name.clone(), module))
            .collect();
        let count = table.len();

        let previous = std::mem::replace(&mut *self.live.write(), table);
        stop_all("replaced table", previous.into_values().collect());

        info!("Live table replaced: {} modules", count);
        Ok(count)
    }

    /// Invoke `action` on the live module `module`.
    ///
    /// # Errors
    /// - `UnknownModule` if `module` is not in the live table (no driver code runs)
    /// - `UnknownAction` naming `module` if the driver rejects `action`
    /// - whatever the driver returns otherwise
    pub fn act(&self, module: &str, action: &str, request: &RawConfig) -> Result<Value, ModuleError> {
        let target = self
            .live
            .read()
            .get(module)
            .cloned()
            .ok_or_else(|| ModuleError::UnknownModule(module.to_string()))?;

        debug!("act {}.{} ({})", module, action, target.source);
        target
            .act(action, &ConfigBinder::new(request))
            .map_err(|err| err.for_module(&target.name))
    }

    /// Summaries of the live table, sorted by name.
    pub fn modules(&self) -> Vec<ModuleInfo> {
        let live: Vec<Arc<ActiveModule>> = self.live.read().values().cloned().collect();
        let mut modules: Vec<ModuleInfo> = live
            .iter()
            .map(|m| ModuleInfo {
                name: m.name.clone(),
                source: m.source.clone(),
                state: m.state(),
            })
            .collect();
        modules.sort_by(|a, b| a.name.cmp(&b.name));
        modules
    }

    /// Number of live modules.
    pub fn len(&self) -> usize {
        self.live.read().len()
    }

    /// True when no module is live.
    pub fn is_empty(&self) -> bool {
        self.live.read().is_empty()
    }

    /// The registry this manager resolves sources with.
    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    /// The shared resource provider.
    pub fn resources(&self) -> &Arc<ResourceProvider> {
        &self.resources
    }

    /// Stop every live module, then close the resource provider.
    ///
    /// Stop failures are logged and do not prevent the remaining modules
    /// from stopping; the first failure is returned.
    pub fn shutdown(&self) -> Result<(), ModuleError> {
        let _gate = self.init_gate.lock();
        info!("Shutting down module manager");

        let previous = std::mem::take(&mut *self.live.write());
        let first_failure = stop_all("shutdown", previous.into_values().collect());

        let closed = self.resources.close().map_err(ModuleError::from);
        match (first_failure, closed) {
            (Some(err), _) => Err(err),
            (None, result) => result,
        }
    }

    fn build(&self, spec: &ModuleSpec) -> Result<Arc<ActiveModule>, ModuleError> {
        let mut instance = self.registry.create_module(&spec.source)?;
        debug!("Constructed '{}' as {}", spec.name, instance.kind());

        if let Err(err) = instance.initialize(&self.resources, &ConfigBinder::new(&spec.config)) {
            if let Err(stop_err) = instance.stop() {
                warn!("Stopping failed module '{}' also failed: {}", spec.name, stop_err);
            }
            return Err(err);
        }

        info!("Initialized module '{}' ({})", spec.name, spec.source);
        Ok(Arc::new(ActiveModule {
            name: spec.name.clone(),
            source: spec.source.clone(),
            slot: Mutex::new(ModuleSlot {
                state: ModuleState::Ready,
                instance,
            }),
        }))
    }
}

/// Stop each module, logging failures. Returns the first failure.
fn stop_all(reason: &str, modules: Vec<Arc<ActiveModule>>) -> Option<ModuleError> {
    let mut first_failure = None;
    for module in modules {
        match module.stop() {
            Ok(()) => debug!("Stopped '{}' ({})", module.name, reason),
            Err(err) => {
                error!("Failed to stop '{}' ({}): {}", module.name, reason, err);
                first_failure.get_or_insert(err);
            }
        }
    }
    first_failure
}
