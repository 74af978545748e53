//! # Position Module
//!
//! On-demand reads of the GPS fix and course. Nothing is cached: every call
//! queries the receiver, so concurrent readers are safe without a lock.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::capability::{
    PositionCapability, RawCourse, ACCURACY_FIELDS_ALL, COURSE_FIELD_HEADING, COURSE_FIELD_SPEED,
    POSITION_FIELDS_ALL,
};

/// Knots to km/h
pub const KNOTS_TO_KMH: f64 = 1.852;

/// One GPS fix, speed in km/h and heading in decimal degrees
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PositionSnapshot {
    pub valid: bool,
    /// Fix time, seconds since the Unix epoch (UTC)
    pub timestamp: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub speed_kmh: f64,
    pub heading: f64,
    pub pdop: f64,
    pub hdop: f64,
    pub vdop: f64,
}

/// Speed and heading of the current fix
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Course {
    pub valid: bool,
    pub speed_kmh: f64,
    pub heading: f64,
}

/// GPS reader
#[derive(Clone)]
pub struct PositionSource {
    capability: Arc<dyn PositionCapability>,
}

impl std::fmt::Debug for PositionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PositionSource").finish_non_exhaustive()
    }
}

impl PositionSource {
    pub fn new(capability: Arc<dyn PositionCapability>) -> Self {
        Self { capability }
    }

    /// Read position and accuracy.
    ///
    /// Valid only when latitude, longitude, altitude and all three
    /// dilution-of-precision values were reported. Course fields are zero.
    pub fn read_position(&self) -> PositionSnapshot {
        let position = match self.capability.get_position() {
            Ok(position) => position,
            Err(e) => {
                warn!("GPS position query failed: {}", e);
                return PositionSnapshot::default();
            }
        };
        debug!(
            "GPS position: fields ({}), lat ({}), lng ({}), alt ({})",
            position.fields, position.latitude, position.longitude, position.altitude
        );

        let accuracy = match self.capability.get_accuracy() {
            Ok(accuracy) => accuracy,
            Err(e) => {
                warn!("GPS accuracy query failed: {}", e);
                return PositionSnapshot::default();
            }
        };
        debug!(
            "GPS accuracy: fields ({}), pdop ({}), hdop ({}), vdop ({})",
            accuracy.fields, accuracy.pdop, accuracy.hdop, accuracy.vdop
        );

        PositionSnapshot {
            valid: position.fields & POSITION_FIELDS_ALL == POSITION_FIELDS_ALL
                && accuracy.fields & ACCURACY_FIELDS_ALL == ACCURACY_FIELDS_ALL,
            timestamp: position.timestamp,
            latitude: position.latitude,
            longitude: position.longitude,
            altitude: position.altitude,
            speed_kmh: 0.0,
            heading: 0.0,
            pdop: accuracy.pdop,
            hdop: accuracy.hdop,
            vdop: accuracy.vdop,
        }
    }

    /// Read speed (converted from knots) and heading
    pub fn read_course(&self) -> Course {
        match self.capability.get_course() {
            Ok(RawCourse { fields, speed_knots, heading }) => {
                debug!(
                    "GPS course: fields ({}), speed ({} kn), heading ({})",
                    fields, speed_knots, heading
                );
                Course {
                    valid: fields & COURSE_FIELD_SPEED != 0 && fields & COURSE_FIELD_HEADING != 0,
                    speed_kmh: speed_knots * KNOTS_TO_KMH,
                    heading,
                }
            }
            Err(e) => {
                warn!("GPS course query failed: {}", e);
                Course::default()
            }
        }
    }

    /// Position merged with course; valid only when both reads are valid
    pub fn sample(&self) -> PositionSnapshot {
        let position = self.read_position();
        let course = self.read_course();
        PositionSnapshot {
            valid: position.valid && course.valid,
            speed_kmh: course.speed_kmh,
            heading: course.heading,
            ..position
        }
    }
}
