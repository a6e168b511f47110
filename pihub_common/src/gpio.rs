//! GPIO level type and helpers shared by platforms and drivers.

use crate::error::HardwareError;
use crate::resources::PinGuard;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

/// Highest BCM GPIO number exposed on the 40-pin header.
pub const MAX_BCM_PIN: u8 = 27;

/// Logic level of a digital pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Level {
    /// Logic low (0 V).
    #[default]
    Low,
    /// Logic high (3.3 V).
    High,
}

impl Level {
    /// True for [`Level::High`].
    pub fn is_high(self) -> bool {
        self == Level::High
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high { Level::High } else { Level::Low }
    }
}

impl std::ops::Not for Level {
    type Output = Level;

    fn not(self) -> Level {
        match self {
            Level::Low => Level::High,
            Level::High => Level::Low,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Low => f.write_str("low"),
            Level::High => f.write_str("high"),
        }
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Level::Low),
            "high" => Ok(Level::High),
            _ => Err(format!("unexpected level `{s}`, expected HIGH or LOW")),
        }
    }
}

impl TryFrom<String> for Level {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Level> for String {
    fn from(level: Level) -> Self {
        level.to_string()
    }
}

/// Resolve a pin name (`"20"`, `"GPIO20"`, `"BCM20"`) to its BCM number.
pub fn parse_bcm_pin(name: &str) -> Option<u8> {
    let upper = name.trim().to_ascii_uppercase();
    let digits = upper
        .strip_prefix("GPIO")
        .or_else(|| upper.strip_prefix("BCM"))
        .unwrap_or(&upper);
    let number: u8 = digits.parse().ok()?;
    (number <= MAX_BCM_PIN).then_some(number)
}

/// Wait until `pin` reliably reads `level` and return how long that took.
///
/// Takes the guard so the whole edge sequence of a protocol runs while the
/// caller owns the pin.
///
/// A level counts only after three consecutive identical reads, which filters
/// single-sample glitches on bit-banged lines. Fails with
/// [`HardwareError::Timeout`] once `timeout` has elapsed.
pub fn wait_for_level(
    pin: &mut PinGuard<'_>,
    level: Level,
    timeout: Duration,
) -> Result<Duration, HardwareError> {
    let start = Instant::now();
    loop {
        let elapsed = start.elapsed();
        if elapsed > timeout {
            return Err(HardwareError::Timeout(format!(
                "pin {} did not reach {level} within {}us",
                pin.name(),
                timeout.as_micros()
            )));
        }

        let a = pin.read()?;
        let b = pin.read()?;
        let c = pin.read()?;
        if a == level && b == level && c == level {
            return Ok(elapsed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!("HIGH".parse::<Level>(), Ok(Level::High));
        assert_eq!("low".parse::<Level>(), Ok(Level::Low));
        assert!("on".parse::<Level>().is_err());
    }

    #[test]
    fn test_level_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Level::High).unwrap(), "\"high\"");
        let level: Level = serde_json::from_str("\"low\"").unwrap();
        assert_eq!(level, Level::Low);
        let level: Level = serde_json::from_str("\"HIGH\"").unwrap();
        assert_eq!(level, Level::High);
        assert!(serde_json::from_str::<Level>("\"up\"").is_err());
    }

    #[test]
    fn test_level_not_and_bool() {
        assert_eq!(!Level::High, Level::Low);
        assert_eq!(Level::from(true), Level::High);
        assert!(!Level::from(false).is_high());
    }

    #[test]
    fn test_parse_bcm_pin() {
        assert_eq!(parse_bcm_pin("20"), Some(20));
        assert_eq!(parse_bcm_pin("GPIO18"), Some(18));
        assert_eq!(parse_bcm_pin("bcm4"), Some(4));
        assert_eq!(parse_bcm_pin("28"), None);
        assert_eq!(parse_bcm_pin("P1_12"), None);
        assert_eq!(parse_bcm_pin(""), None);
    }
}
