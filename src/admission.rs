//! # Sample Admission
//!
//! Decides whether a fresh position + radio pair is worth logging.
//!
//! Gates, first match wins:
//!
//! 1. a call is in progress: signal and neighbour data lag the call state
//! 2. speed below the minimum: avoids logging the same stationary
//!    position/cell pair over and over
//! 3. speed above the maximum: GPS artifacts, non-terrestrial speeds
//! 4. either snapshot is invalid
//!
//! Both speed bounds are inclusive.

use crate::position::PositionSnapshot;
use crate::radio::RadioSnapshot;

/// Speed window for logging, km/h
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedLimits {
    pub min_kmh: f64,
    pub max_kmh: f64,
}

/// Why a sample was not logged
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rejection {
    CallOngoing,
    BelowMinSpeed { speed_kmh: f64, min_kmh: f64 },
    AboveMaxSpeed { speed_kmh: f64, max_kmh: f64 },
    InvalidData { position_valid: bool, radio_valid: bool },
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::CallOngoing => write!(f, "call in progress"),
            Rejection::BelowMinSpeed { speed_kmh, min_kmh } => {
                write!(f, "speed ({}) is under minimal speed ({})", speed_kmh, min_kmh)
            }
            Rejection::AboveMaxSpeed { speed_kmh, max_kmh } => {
                write!(f, "speed ({}) is over maximal speed ({})", speed_kmh, max_kmh)
            }
            Rejection::InvalidData { position_valid, radio_valid } => write!(
                f,
                "data not valid (gps valid: {}, gsm valid: {})",
                position_valid, radio_valid
            ),
        }
    }
}

/// Outcome of [`admit`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Admission {
    Admitted,
    Rejected(Rejection),
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted)
    }
}

/// Run the admission gates in order
pub fn admit(position: &PositionSnapshot, radio: &RadioSnapshot, limits: SpeedLimits) -> Admission {
    if radio.call_ongoing {
        return Admission::Rejected(Rejection::CallOngoing);
    }
    if position.speed_kmh < limits.min_kmh {
        return Admission::Rejected(Rejection::BelowMinSpeed {
            speed_kmh: position.speed_kmh,
            min_kmh: limits.min_kmh,
        });
    }
    if position.speed_kmh > limits.max_kmh {
        return Admission::Rejected(Rejection::AboveMaxSpeed {
            speed_kmh: position.speed_kmh,
            max_kmh: limits.max_kmh,
        });
    }
    if !position.valid || !radio.is_valid() {
        return Admission::Rejected(Rejection::InvalidData {
            position_valid: position.valid,
            radio_valid: radio.is_valid(),
        });
    }
    Admission::Admitted
}
