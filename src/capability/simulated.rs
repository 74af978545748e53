//! Canned capability implementations for hosts without a modem or GPS.
//!
//! The values are fixed so that a simulated run produces recognisable,
//! reproducible log files.

use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::debug;

use super::{
    CallEntry, CellInformation, DeviceInfo, NetworkStatus, PositionCapability, RadioCapability,
    RawAccuracy, RawCourse, RawPosition, ResourceLease, ACCURACY_FIELDS_ALL, COURSE_FIELD_HEADING,
    COURSE_FIELD_SPEED, POSITION_FIELDS_ALL,
};
use crate::error::CapabilityError;
use crate::position::KNOTS_TO_KMH;

/// Operator code reported by [`SimulatedRadio`]
pub const SIMULATED_OPERATOR: &str = "20801";

/// Modem registered on a fixed home network
#[derive(Debug, Clone)]
pub struct SimulatedRadio {
    pub status: NetworkStatus,
    pub serving: CellInformation,
    pub neighbours: Vec<CellInformation>,
}

impl Default for SimulatedRadio {
    fn default() -> Self {
        Self {
            status: NetworkStatus {
                registration: "home".to_string(),
                code: Some(SIMULATED_OPERATOR.to_string()),
                lac: Some("0x7B".to_string()),
                cid: Some("0x4".to_string()),
                strength: Some(80),
                act: Some("GSM".to_string()),
            },
            serving: CellInformation {
                lac: Some("7B".to_string()),
                cid: Some("4".to_string()),
                rxlev: Some(42),
                arfcn: Some(62),
                tav: Some(1),
                c1: None,
                c2: None,
            },
            neighbours: vec![
                CellInformation {
                    lac: Some("7B".to_string()),
                    cid: Some("5".to_string()),
                    rxlev: Some(31),
                    arfcn: Some(70),
                    c1: Some(25),
                    c2: Some(25),
                    ..Default::default()
                },
                CellInformation {
                    lac: Some("7C".to_string()),
                    cid: Some("1F".to_string()),
                    rxlev: Some(18),
                    arfcn: Some(81),
                    c1: Some(12),
                    c2: Some(12),
                    ..Default::default()
                },
            ],
        }
    }
}

impl RadioCapability for SimulatedRadio {
    fn get_status(&self) -> Result<NetworkStatus, CapabilityError> {
        Ok(self.status.clone())
    }

    fn get_serving_cell_information(&self) -> Result<CellInformation, CapabilityError> {
        Ok(self.serving.clone())
    }

    fn get_neighbour_cell_information(&self) -> Result<Vec<CellInformation>, CapabilityError> {
        Ok(self.neighbours.clone())
    }

    fn list_calls(&self) -> Result<Vec<CallEntry>, CapabilityError> {
        Ok(Vec::new())
    }

    fn get_device_info(&self) -> Result<DeviceInfo, CapabilityError> {
        Ok(DeviceInfo {
            manufacturer: Some("FIC".to_string()),
            model: Some("GTA02".to_string()),
            revision: Some("HW: GTA02, GSM: gsm_ac_gp_fd_pu_em_cph_ds_vc_cal35_ri_36_amd8_ts0".to_string()),
        })
    }
}

/// GPS with a fixed, fully reported fix moving at 3.456 km/h
#[derive(Debug, Clone, Copy)]
pub struct SimulatedPosition {
    pub position: RawPosition,
    pub accuracy: RawAccuracy,
    pub course: RawCourse,
}

impl Default for SimulatedPosition {
    fn default() -> Self {
        Self {
            position: RawPosition {
                fields: POSITION_FIELDS_ALL,
                timestamp: 345678,
                latitude: 2.989123456923999,
                longitude: 69.989123456123444,
                altitude: 2.896,
            },
            accuracy: RawAccuracy {
                fields: ACCURACY_FIELDS_ALL,
                pdop: 6.123,
                hdop: 2.468,
                vdop: 3.1,
            },
            course: RawCourse {
                fields: COURSE_FIELD_SPEED | COURSE_FIELD_HEADING,
                speed_knots: 3.456 / KNOTS_TO_KMH,
                heading: 10.0,
            },
        }
    }
}

impl PositionCapability for SimulatedPosition {
    fn get_position(&self) -> Result<RawPosition, CapabilityError> {
        Ok(self.position)
    }

    fn get_accuracy(&self) -> Result<RawAccuracy, CapabilityError> {
        Ok(self.accuracy)
    }

    fn get_course(&self) -> Result<RawCourse, CapabilityError> {
        Ok(self.course)
    }
}

/// Resources the simulated usage service knows about
pub const SIMULATED_RESOURCES: [&str; 6] = ["GSM", "GPS", "CPU", "Bluetooth", "WiFi", "Display"];

/// Lease service that grants every request for a known resource
#[derive(Debug, Default)]
pub struct SimulatedLease {
    granted: AtomicUsize,
}

impl SimulatedLease {
    /// Number of requests granted so far
    pub fn granted(&self) -> usize {
        self.granted.load(Ordering::Relaxed)
    }
}

impl ResourceLease for SimulatedLease {
    fn request_resource(&self, name: &str) -> Result<(), CapabilityError> {
        if !SIMULATED_RESOURCES.contains(&name) {
            return Err(CapabilityError::CallFailed {
                call: "RequestResource",
                reason: format!("unknown resource '{}'", name),
            });
        }
        debug!("Simulated lease granted for {}", name);
        self.granted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
