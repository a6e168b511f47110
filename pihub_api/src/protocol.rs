//! Request and response bodies.
//!
//! ```text
//! POST /initialize  {"modules": {"fan": {"source": "relay", "config": {"pin": "20"}}}}
//!                -> {"num_modules": 1}
//! POST /act         {"module": "fan", "action": "set", "config": {"state": "high"}}
//!                -> {"result": ...}
//! failure        -> {"message": "...", "kind": "input" | "not_found" | "internal" | "timeout"}
//! ```

use pihub_common::binder::RawConfig;
use pihub_common::module::ModuleSpec;
use pihub_hal::ModuleInfo;
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// One entry of the `modules` map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleRequest {
    /// Driver kind.
    pub source: String,
    /// Driver-defined configuration.
    #[serde(default)]
    pub config: RawConfig,
}

/// Body of `POST /initialize`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitializeRequest {
    /// Module name to spec. A name repeated in the JSON object is rejected.
    #[serde(deserialize_with = "unique_modules")]
    pub modules: BTreeMap<String, ModuleRequest>,
}

fn unique_modules<'de, D>(deserializer: D) -> Result<BTreeMap<String, ModuleRequest>, D::Error>
where
    D: Deserializer<'de>,
{
    struct UniqueNames;

    impl<'de> Visitor<'de> for UniqueNames {
        type Value = BTreeMap<String, ModuleRequest>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of module name to {source, config}")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
            let mut modules = BTreeMap::new();
            while let Some((name, module)) = access.next_entry::<String, ModuleRequest>()? {
                if modules.contains_key(&name) {
                    return Err(de::Error::custom(format!("duplicate module name `{name}`")));
                }
                modules.insert(name, module);
            }
            Ok(modules)
        }
    }

    deserializer.deserialize_map(UniqueNames)
}

impl InitializeRequest {
    /// Flatten into manager specs, ordered by name.
    pub fn into_specs(self) -> Vec<ModuleSpec> {
        self.modules
            .into_iter()
            .map(|(name, module)| ModuleSpec::new(name, module.source, module.config))
            .collect()
    }
}

/// Body of a successful initialize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitializeResponse {
    /// Number of live modules after the swap.
    pub num_modules: usize,
}

/// Body of `POST /act`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActRequest {
    /// Target module name.
    pub module: String,
    /// Action name.
    pub action: String,
    /// Action payload.
    #[serde(default)]
    pub config: RawConfig,
}

/// Body of a successful act.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActResponse {
    /// Whatever the driver returned.
    pub result: Value,
}

/// Body of every failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable cause.
    pub message: String,
    /// Coarse classification.
    pub kind: String,
}

/// Body of `GET /modules`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModulesResponse {
    /// Live modules, sorted by name.
    pub modules: Vec<ModuleInfo>,
}

/// Body of `GET /health`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Configured service name.
    pub service: String,
    /// Hardware backend in use.
    pub platform: String,
    /// Live module count.
    pub num_modules: usize,
}
