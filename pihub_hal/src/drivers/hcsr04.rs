//! HC-SR04 ultrasonic rangefinder.
//!
//! Config: `{"trigger_pin": "23", "echo_pin": "24", "timeout_ms": 30,
//! "speed_of_sound": 343.0}`. Action `measure` returns
//! `{"distance_m": 0.42, "echo_us": 2449}`.
//!
//! A 10 us trigger pulse starts a ping; the echo line then stays high for the
//! round-trip time of the sound burst.

use pihub_common::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::debug;

const TRIGGER_PULSE: Duration = Duration::from_micros(10);

/// Rangefinder configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hcsr04Config {
    /// Output pin wired to TRIG.
    pub trigger_pin: Option<String>,
    /// Input pin wired to ECHO (through a level shifter).
    pub echo_pin: Option<String>,
    /// Give up on an echo edge after this long.
    pub timeout_ms: u64,
    /// Metres per second.
    pub speed_of_sound: f64,
}

impl Bindable for Hcsr04Config {
    fn defaults() -> Option<Self> {
        Some(Self {
            trigger_pin: None,
            echo_pin: None,
            timeout_ms: 30,
            speed_of_sound: 343.0,
        })
    }

    fn validate(&self) -> Result<(), String> {
        if self.trigger_pin.is_none() || self.echo_pin.is_none() {
            return Err("trigger_pin and echo_pin are required".to_string());
        }
        if self.timeout_ms == 0 {
            return Err("timeout_ms must be positive".to_string());
        }
        if self.speed_of_sound <= 0.0 {
            return Err("speed_of_sound must be positive".to_string());
        }
        Ok(())
    }
}

/// One ping.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Measurement {
    /// Distance to the target.
    pub distance_m: f64,
    /// Echo pulse width.
    pub echo_us: u64,
}

struct Wiring {
    trigger: Arc<SharedPin>,
    echo: Arc<SharedPin>,
    timeout: Duration,
    speed_of_sound: f64,
}

impl Wiring {
    fn ping(&self) -> Result<Measurement, HardwareError> {
        // Both lines are held for the whole ping; lock in name order so two
        // rangefinders with crossed wiring cannot deadlock.
        let (mut trigger_line, mut echo_line) = if self.trigger.name() <= self.echo.name() {
            let trigger_line = self.trigger.lock();
            (trigger_line, self.echo.lock())
        } else {
            let echo_line = self.echo.lock();
            (self.trigger.lock(), echo_line)
        };

        trigger_line.set_output(Level::High)?;
        thread::sleep(TRIGGER_PULSE);
        trigger_line.set_output(Level::Low)?;

        wait_for_level(&mut echo_line, Level::High, self.timeout)?;
        let echo = wait_for_level(&mut echo_line, Level::Low, self.timeout)?;

        Ok(Measurement {
            distance_m: echo.as_secs_f64() * self.speed_of_sound / 2.0,
            echo_us: echo.as_micros() as u64,
        })
    }
}

/// HC-SR04 driver.
#[derive(Default)]
pub struct Hcsr04Module {
    wiring: Option<Wiring>,
}

/// Registry factory.
pub fn create_module() -> Box<dyn Module> {
    Box::new(Hcsr04Module::default())
}

impl Module for Hcsr04Module {
    fn kind(&self) -> &'static str {
        "hcsr04"
    }

    fn initialize(
        &mut self,
        resources: &ResourceProvider,
        config: &ConfigBinder<'_>,
    ) -> Result<(), ModuleError> {
        let config: Hcsr04Config = config.bind()?;
        let trigger = resources.pin_by_name(&config.trigger_pin.unwrap_or_default())?;
        let echo = resources.pin_by_name(&config.echo_pin.unwrap_or_default())?;
        if Arc::ptr_eq(&trigger, &echo) {
            return Err(ModuleError::Validation(format!(
                "trigger and echo both resolve to {}",
                trigger.name()
            )));
        }

        trigger.set_output(Level::Low)?;
        echo.set_input()?;
        self.wiring = Some(Wiring {
            trigger,
            echo,
            timeout: Duration::from_millis(config.timeout_ms),
            speed_of_sound: config.speed_of_sound,
        });
        Ok(())
    }

    fn act(&mut self, action: &str, _request: &ConfigBinder<'_>) -> Result<Value, ModuleError> {
        match action {
            "measure" => {
                let wiring = self
                    .wiring
                    .as_ref()
                    .ok_or_else(|| ModuleError::not_initialized("measure"))?;
                to_result(wiring.ping()?)
            }
            _ => Err(ModuleError::unknown_action(action)),
        }
    }

    fn stop(&mut self) -> Result<(), ModuleError> {
        if let Some(wiring) = self.wiring.take() {
            // A module from the replacing table may already drive this pin.
            if SharedPin::held_elsewhere(&wiring.trigger) {
                debug!("Leaving {} as is, still in use", wiring.trigger.name());
            } else {
                wiring.trigger.set_output(Level::Low)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::simulation::SimulatedPlatform;
    use serde_json::json;

    fn setup(config: Value) -> (SimulatedPlatform, ResourceProvider, Result<Hcsr04Module, ModuleError>) {
        let platform = SimulatedPlatform::new();
        let resources = ResourceProvider::new(Box::new(platform.clone()));
        let mut module = Hcsr04Module::default();
        let result = module
            .initialize(&resources, &ConfigBinder::new(&RawConfig::new(config)))
            .map(|()| module);
        (platform, resources, result)
    }

    fn measure(module: &mut Hcsr04Module) -> Result<Value, ModuleError> {
        module.act("measure", &ConfigBinder::new(&RawConfig::default()))
    }

    #[test]
    fn test_measure_pulses_trigger_and_times_echo() {
        let (platform, _resources, module) =
            setup(json!({ "trigger_pin": "23", "echo_pin": "24" }));
        let mut module = module.unwrap();
        platform
            .script_input("24", [Level::High; 3].into_iter().chain([Level::Low; 3]))
            .unwrap();

        let result = measure(&mut module).unwrap();
        let distance = result["distance_m"].as_f64().unwrap();
        // An echo of under 30 ms is under ~5 m at 343 m/s.
        assert!((0.0..5.2).contains(&distance));
        assert_eq!(
            platform.pin("23").unwrap().history,
            vec![Level::Low, Level::High, Level::Low]
        );
    }

    #[test]
    fn test_no_echo_times_out() {
        let (_platform, _resources, module) =
            setup(json!({ "trigger_pin": "23", "echo_pin": "24", "timeout_ms": 1 }));
        let mut module = module.unwrap();
        assert!(matches!(
            measure(&mut module),
            Err(ModuleError::Hardware(HardwareError::Timeout(_)))
        ));
    }

    #[test]
    fn test_aliased_pins_rejected() {
        let (_, _, result) = setup(json!({ "trigger_pin": "23", "echo_pin": "GPIO23" }));
        assert!(matches!(result.err(), Some(ModuleError::Validation(_))));
    }

    #[test]
    fn test_pins_required() {
        let (_, _, result) = setup(json!({ "trigger_pin": "23" }));
        assert!(matches!(result.err(), Some(ModuleError::Validation(_))));
    }
}
