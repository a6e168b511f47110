//! Echo module: answers every action with the action name and its payload.
//!
//! Useful for checking the transport end to end without hardware.

use pihub_common::prelude::*;
use serde_json::{Value, json};

/// Hardware-free module.
#[derive(Default)]
pub struct EchoModule {
    ready: bool,
}

/// Registry factory.
pub fn create_module() -> Box<dyn Module> {
    Box::new(EchoModule::default())
}

impl Module for EchoModule {
    fn kind(&self) -> &'static str {
        "echo"
    }

    fn initialize(
        &mut self,
        _resources: &ResourceProvider,
        config: &ConfigBinder<'_>,
    ) -> Result<(), ModuleError> {
        // Any JSON is accepted, but it has to be JSON.
        let _: Value = config.bind()?;
        self.ready = true;
        Ok(())
    }

    fn act(&mut self, action: &str, request: &ConfigBinder<'_>) -> Result<Value, ModuleError> {
        if !self.ready {
            return Err(ModuleError::not_initialized("act"));
        }
        Ok(json!({
            "action": action,
            "config": request.payload().as_value(),
        }))
    }

    fn stop(&mut self) -> Result<(), ModuleError> {
        self.ready = false;
        Ok(())
    }
}
