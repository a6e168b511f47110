//! Hobby servo on a PWM-capable pin.
//!
//! Config: `{"pin": "18", "frequency_hz": 50, "min_pulse_us": 500,
//! "max_pulse_us": 2500, "max_angle": 180}`.
//!
//! Actions: `set {"angle": 90}` returns the applied pulse width and duty
//! cycle; `release` stops the PWM so the horn can be moved by hand.

use pihub_common::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::debug;

/// Servo configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServoConfig {
    /// PWM pin.
    pub pin: Option<String>,
    /// PWM frequency.
    pub frequency_hz: f64,
    /// Pulse width at 0 degrees.
    pub min_pulse_us: f64,
    /// Pulse width at `max_angle`.
    pub max_pulse_us: f64,
    /// Mechanical range in degrees.
    pub max_angle: f64,
}

impl Bindable for ServoConfig {
    fn defaults() -> Option<Self> {
        Some(Self {
            pin: None,
            frequency_hz: 50.0,
            min_pulse_us: 500.0,
            max_pulse_us: 2500.0,
            max_angle: 180.0,
        })
    }

    fn validate(&self) -> Result<(), String> {
        if self.pin.as_deref().is_none_or(|pin| pin.trim().is_empty()) {
            return Err("pin is required".to_string());
        }
        if self.frequency_hz <= 0.0 {
            return Err("frequency_hz must be positive".to_string());
        }
        if self.min_pulse_us < 0.0 || self.min_pulse_us >= self.max_pulse_us {
            return Err("need 0 <= min_pulse_us < max_pulse_us".to_string());
        }
        if self.max_pulse_us > 1_000_000.0 / self.frequency_hz {
            return Err("max_pulse_us does not fit in one PWM period".to_string());
        }
        if self.max_angle <= 0.0 {
            return Err("max_angle must be positive".to_string());
        }
        Ok(())
    }
}

/// Payload of the `set` action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetAngle {
    /// Target angle in degrees.
    pub angle: f64,
}

impl Bindable for SetAngle {}

struct Geometry {
    frequency_hz: f64,
    min_pulse_us: f64,
    max_pulse_us: f64,
    max_angle: f64,
}

impl Geometry {
    /// Pulse width and duty cycle for `angle`.
    fn pulse_for(&self, angle: f64) -> Result<(f64, f64), ModuleError> {
        if !(0.0..=self.max_angle).contains(&angle) {
            return Err(ModuleError::Validation(format!(
                "angle {angle} outside 0..={}",
                self.max_angle
            )));
        }
        let pulse_us =
            self.min_pulse_us + (self.max_pulse_us - self.min_pulse_us) * angle / self.max_angle;
        let period_us = 1_000_000.0 / self.frequency_hz;
        Ok((pulse_us, pulse_us / period_us))
    }
}

/// Servo driver.
#[derive(Default)]
pub struct ServoModule {
    pin: Option<Arc<SharedPin>>,
    geometry: Option<Geometry>,
}

/// Registry factory.
pub fn create_module() -> Box<dyn Module> {
    Box::new(ServoModule::default())
}

impl Module for ServoModule {
    fn kind(&self) -> &'static str {
        "servo"
    }

    fn initialize(
        &mut self,
        resources: &ResourceProvider,
        config: &ConfigBinder<'_>,
    ) -> Result<(), ModuleError> {
        let config: ServoConfig = config.bind()?;
        self.pin = Some(resources.pin_by_name(&config.pin.unwrap_or_default())?);
        self.geometry = Some(Geometry {
            frequency_hz: config.frequency_hz,
            min_pulse_us: config.min_pulse_us,
            max_pulse_us: config.max_pulse_us,
            max_angle: config.max_angle,
        });
        Ok(())
    }

    fn act(&mut self, action: &str, request: &ConfigBinder<'_>) -> Result<Value, ModuleError> {
        let (Some(pin), Some(geometry)) = (&self.pin, &self.geometry) else {
            return match action {
                "set" | "release" => Err(ModuleError::not_initialized("act")),
                _ => Err(ModuleError::unknown_action(action)),
            };
        };

        match action {
            "set" => {
                let request: SetAngle = request.bind()?;
                let (pulse_us, duty) = geometry.pulse_for(request.angle)?;
                pin.set_pwm(geometry.frequency_hz, duty)?;
                debug!("Servo on {} -> {} deg ({:.0} us)", pin.name(), request.angle, pulse_us);
                Ok(json!({ "angle": request.angle, "pulse_us": pulse_us, "duty_cycle": duty }))
            }
            "release" => {
                pin.clear_pwm()?;
                Ok(Value::Null)
            }
            _ => Err(ModuleError::unknown_action(action)),
        }
    }

    fn stop(&mut self) -> Result<(), ModuleError> {
        let result = match self.pin.take() {
            Some(pin) if SharedPin::held_elsewhere(&pin) => {
                debug!("Leaving PWM on {} as is, still in use", pin.name());
                Ok(())
            }
            Some(pin) => pin.clear_pwm().map_err(ModuleError::from),
            None => Ok(()),
        };
        self.geometry = None;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::simulation::SimulatedPlatform;

    fn setup(config: Value) -> (SimulatedPlatform, ResourceProvider, ServoModule) {
        let platform = SimulatedPlatform::new();
        let resources = ResourceProvider::new(Box::new(platform.clone()));
        let mut module = ServoModule::default();
        module
            .initialize(&resources, &ConfigBinder::new(&RawConfig::new(config)))
            .unwrap();
        (platform, resources, module)
    }

    fn set(module: &mut ServoModule, angle: f64) -> Result<Value, ModuleError> {
        module.act("set", &ConfigBinder::new(&RawConfig::new(json!({ "angle": angle }))))
    }

    #[test]
    fn test_angle_to_duty() {
        let (platform, _resources, mut module) = setup(json!({ "pin": "18" }));

        let result = set(&mut module, 90.0).unwrap();
        assert_eq!(result["pulse_us"], json!(1500.0));
        let pwm = platform.pin("18").unwrap().pwm.unwrap();
        assert_eq!(pwm.frequency_hz, 50.0);
        assert!((pwm.duty_cycle - 0.075).abs() < 1e-12);

        set(&mut module, 0.0).unwrap();
        let pwm = platform.pin("18").unwrap().pwm.unwrap();
        assert!((pwm.duty_cycle - 0.025).abs() < 1e-12);
    }

    #[test]
    fn test_angle_out_of_range() {
        let (platform, _resources, mut module) = setup(json!({ "pin": "18", "max_angle": 120 }));
        assert!(matches!(set(&mut module, 121.0), Err(ModuleError::Validation(_))));
        assert!(platform.pin("18").unwrap().pwm.is_none());
    }

    #[test]
    fn test_release_and_stop_clear_pwm() {
        let (platform, _resources, mut module) = setup(json!({ "pin": "18" }));
        set(&mut module, 45.0).unwrap();
        module
            .act("release", &ConfigBinder::new(&RawConfig::default()))
            .unwrap();
        assert!(platform.pin("18").unwrap().pwm.is_none());

        set(&mut module, 45.0).unwrap();
        module.stop().unwrap();
        assert!(platform.pin("18").unwrap().pwm.is_none());
    }

    #[test]
    fn test_pulse_must_fit_period() {
        let resources = ResourceProvider::new(Box::new(SimulatedPlatform::new()));
        let mut module = ServoModule::default();
        let config = RawConfig::new(json!({ "pin": "18", "frequency_hz": 500 }));
        let err = module
            .initialize(&resources, &ConfigBinder::new(&config))
            .unwrap_err();
        assert!(matches!(err, ModuleError::Validation(_)));
    }
}
