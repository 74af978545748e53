//! # Capability Module
//!
//! Interfaces to the device services the logger consumes: the cellular
//! modem, the GPS receiver and the resource-lease service.
//!
//! The logger never talks to hardware directly. Everything goes through
//! these traits so that tests can substitute mocks and hosts without a
//! modem can run the [`simulated`] implementations.

pub mod simulated;

use crate::error::CapabilityError;

/// Bit set in a position field mask when latitude is reported
pub const POSITION_FIELD_LATITUDE: u32 = 1 << 0;
/// Bit set in a position field mask when longitude is reported
pub const POSITION_FIELD_LONGITUDE: u32 = 1 << 1;
/// Bit set in a position field mask when altitude is reported
pub const POSITION_FIELD_ALTITUDE: u32 = 1 << 2;
/// All position bits
pub const POSITION_FIELDS_ALL: u32 =
    POSITION_FIELD_LATITUDE | POSITION_FIELD_LONGITUDE | POSITION_FIELD_ALTITUDE;

/// Bits of an accuracy field mask (pdop, hdop, vdop)
pub const ACCURACY_FIELD_PDOP: u32 = 1 << 0;
pub const ACCURACY_FIELD_HDOP: u32 = 1 << 1;
pub const ACCURACY_FIELD_VDOP: u32 = 1 << 2;
/// All accuracy bits
pub const ACCURACY_FIELDS_ALL: u32 = ACCURACY_FIELD_PDOP | ACCURACY_FIELD_HDOP | ACCURACY_FIELD_VDOP;

/// Bit set in a course field mask when speed is reported
pub const COURSE_FIELD_SPEED: u32 = 1 << 0;
/// Bit set in a course field mask when heading is reported
pub const COURSE_FIELD_HEADING: u32 = 1 << 1;

/// Network status as pushed by the modem (`Status` signal or `GetStatus`).
///
/// `lac` and `cid` are hexadecimal strings, `code` is the concatenated
/// MCC+MNC and `strength` a 0-100 percentage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkStatus {
    pub registration: String,
    pub code: Option<String>,
    pub lac: Option<String>,
    pub cid: Option<String>,
    pub strength: Option<u8>,
    pub act: Option<String>,
}

/// Cell detail returned by the serving and neighbour cell queries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CellInformation {
    /// Location area code, hexadecimal
    pub lac: Option<String>,
    /// Cell id, hexadecimal
    pub cid: Option<String>,
    pub rxlev: Option<i32>,
    pub arfcn: Option<i32>,
    pub tav: Option<i32>,
    pub c1: Option<i32>,
    pub c2: Option<i32>,
}

/// One entry of the active call list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallEntry {
    pub index: i32,
    pub status: String,
}

/// Manufacturer, model and revision as reported by the modem
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub revision: Option<String>,
}

/// Raw answer of `GetPosition`
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RawPosition {
    pub fields: u32,
    /// Fix time, seconds since the Unix epoch
    pub timestamp: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
}

/// Raw answer of `GetAccuracy`
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RawAccuracy {
    pub fields: u32,
    pub pdop: f64,
    pub hdop: f64,
    pub vdop: f64,
}

/// Raw answer of `GetCourse`; speed is in knots
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RawCourse {
    pub fields: u32,
    pub speed_knots: f64,
    pub heading: f64,
}

/// Synchronous queries against the cellular modem.
#[cfg_attr(test, mockall::automock)]
pub trait RadioCapability: Send + Sync {
    /// Current registration status, as a `Status` notification would carry it
    fn get_status(&self) -> Result<NetworkStatus, CapabilityError>;

    /// Detail of the serving cell
    fn get_serving_cell_information(&self) -> Result<CellInformation, CapabilityError>;

    /// Detail of every neighbour cell the modem currently monitors
    fn get_neighbour_cell_information(&self) -> Result<Vec<CellInformation>, CapabilityError>;

    /// Active call list
    fn list_calls(&self) -> Result<Vec<CallEntry>, CapabilityError>;

    /// Manufacturer, model and revision
    fn get_device_info(&self) -> Result<DeviceInfo, CapabilityError>;
}

/// Synchronous queries against the GPS receiver.
#[cfg_attr(test, mockall::automock)]
pub trait PositionCapability: Send + Sync {
    fn get_position(&self) -> Result<RawPosition, CapabilityError>;
    fn get_accuracy(&self) -> Result<RawAccuracy, CapabilityError>;
    fn get_course(&self) -> Result<RawCourse, CapabilityError>;
}

/// Resource lease service (keeps the GPS powered and the CPU awake).
#[cfg_attr(test, mockall::automock)]
pub trait ResourceLease: Send + Sync {
    fn request_resource(&self, name: &str) -> Result<(), CapabilityError>;
}
