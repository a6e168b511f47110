//! Simulated GPIO pins.
//!
//! Each pin keeps its mode, driven level, PWM setting and the history of
//! levels it was driven to. Input reads first drain a scripted sequence so
//! tests can play back edges for bit-banged protocols, then fall back to the
//! pin's current level.

use parking_lot::Mutex;
use pihub_common::error::HardwareError;
use pihub_common::gpio::Level;
use pihub_common::resources::GpioPin;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

/// Direction of a simulated pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PinMode {
    /// Not yet configured or switched to input.
    #[default]
    Input,
    /// Driving a level.
    Output,
}

/// Active PWM setting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PwmSetting {
    /// Frequency in Hz
    pub frequency_hz: f64,
    /// Duty cycle in `0.0..=1.0`
    pub duty_cycle: f64,
}

/// Observable state of one simulated pin.
#[derive(Debug, Clone, Default)]
pub struct PinSnapshot {
    /// Current direction
    pub mode: PinMode,
    /// Current level (driven or externally set)
    pub level: Level,
    /// Active PWM, if any
    pub pwm: Option<PwmSetting>,
    /// Every level the pin was driven to, oldest first
    pub history: Vec<Level>,
    /// `history` with the instant of each write
    pub timeline: Vec<(Instant, Level)>,
}

#[derive(Debug, Default)]
pub(crate) struct PinState {
    snapshot: PinSnapshot,
    script: VecDeque<Level>,
}

impl PinState {
    pub(crate) fn snapshot(&self) -> PinSnapshot {
        self.snapshot.clone()
    }

    pub(crate) fn set_level(&mut self, level: Level) {
        self.snapshot.level = level;
    }

    pub(crate) fn script(&mut self, levels: impl IntoIterator<Item = Level>) {
        self.script.extend(levels);
    }
}

/// `GpioPin` handed to the resource provider.
pub(crate) struct SimPin {
    state: Arc<Mutex<PinState>>,
}

impl SimPin {
    pub(crate) fn new(state: Arc<Mutex<PinState>>) -> Self {
        Self { state }
    }
}

impl GpioPin for SimPin {
    fn set_output(&mut self, level: Level) -> Result<(), HardwareError> {
        let mut state = self.state.lock();
        state.snapshot.mode = PinMode::Output;
        state.snapshot.level = level;
        state.snapshot.history.push(level);
        state.snapshot.timeline.push((Instant::now(), level));
        Ok(())
    }

    fn set_input(&mut self) -> Result<(), HardwareError> {
        self.state.lock().snapshot.mode = PinMode::Input;
        Ok(())
    }

    fn read(&mut self) -> Result<Level, HardwareError> {
        let mut state = self.state.lock();
        match state.script.pop_front() {
            Some(level) => Ok(level),
            None => Ok(state.snapshot.level),
        }
    }

    fn set_pwm(&mut self, frequency_hz: f64, duty_cycle: f64) -> Result<(), HardwareError> {
        if !(0.0..=1.0).contains(&duty_cycle) || frequency_hz <= 0.0 {
            return Err(HardwareError::Platform(format!(
                "invalid PWM setting: {frequency_hz} Hz, duty {duty_cycle}"
            )));
        }
        let mut state = self.state.lock();
        state.snapshot.mode = PinMode::Output;
        state.snapshot.pwm = Some(PwmSetting {
            frequency_hz,
            duty_cycle,
        });
        Ok(())
    }

    fn clear_pwm(&mut self) -> Result<(), HardwareError> {
        self.state.lock().snapshot.pwm = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_then_level() {
        let state = Arc::new(Mutex::new(PinState::default()));
        let mut pin = SimPin::new(Arc::clone(&state));
        state.lock().script([Level::High, Level::Low]);
        state.lock().set_level(Level::High);

        assert_eq!(pin.read().unwrap(), Level::High);
        assert_eq!(pin.read().unwrap(), Level::Low);
        assert_eq!(pin.read().unwrap(), Level::High);
        assert_eq!(pin.read().unwrap(), Level::High);
    }

    #[test]
    fn test_output_history() {
        let state = Arc::new(Mutex::new(PinState::default()));
        let mut pin = SimPin::new(Arc::clone(&state));
        pin.set_output(Level::High).unwrap();
        pin.set_output(Level::Low).unwrap();

        let snap = state.lock().snapshot();
        assert_eq!(snap.mode, PinMode::Output);
        assert_eq!(snap.history, vec![Level::High, Level::Low]);
        assert_eq!(snap.timeline.len(), 2);
        assert!(snap.timeline[0].0 <= snap.timeline[1].0);
    }

    #[test]
    fn test_pwm_bounds() {
        let state = Arc::new(Mutex::new(PinState::default()));
        let mut pin = SimPin::new(Arc::clone(&state));
        assert!(pin.set_pwm(50.0, 1.5).is_err());
        pin.set_pwm(50.0, 0.075).unwrap();
        assert_eq!(
            state.lock().snapshot().pwm,
            Some(PwmSetting {
                frequency_hz: 50.0,
                duty_cycle: 0.075
            })
        );
        pin.clear_pwm().unwrap();
        assert!(state.lock().snapshot().pwm.is_none());
    }
}
